//! Sky tile service: tile reads, cutouts and derived products over an
//! ordered chain of caches backed by on-demand generation.

pub mod config;
pub mod extract;
pub mod products;
pub mod service;

pub use config::{CacheLayerKind, ServiceConfig};
pub use extract::{Cutout, Extractor};
pub use products::{
    ApertureStats, DerivedProduct, Histogram, ProductBuilder, ProductCodec, ProductKey,
    ProductPayload, HISTOGRAM_BINS,
};
pub use service::TileService;
