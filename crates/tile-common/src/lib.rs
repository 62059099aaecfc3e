//! Common types shared by the sky tile crates.

pub mod bbox;
pub mod error;
pub mod geometry;
pub mod grants;
pub mod layer;
pub mod raster;
pub mod tile;

pub use bbox::BoundingBox;
pub use error::{TileError, TileResult};
pub use geometry::PyramidGeometry;
pub use grants::Grants;
pub use layer::{LayerCatalog, LayerConfig, LayerMetadata};
pub use raster::{ElementType, Pixel, Raster, TileData};
pub use tile::{Tile, TileAddress};
