//! Archival raster access and tile generation.
//!
//! - [`archive`]: Zarr V3 and in-memory rasters with strided window reads
//! - [`pyramid`]: full pyramid construction with explicit pixel presence
//! - [`source`]: the on-demand tile generator used as the last provider
//! - [`ingest`]: per-layer build and publication

pub mod archive;
pub mod error;
pub mod ingest;
pub mod pyramid;
pub mod source;

pub use archive::{MemoryArchive, RasterArchive, Window, ZarrArchive};
pub use error::{RasterError, Result};
pub use ingest::{build_layer, ingest_layer, ingest_layers, publish_pyramid, IngestReport, IngestedLayer};
pub use pyramid::{AnyPyramid, Pyramid, TileBlock};
pub use source::SourceTileProvider;
