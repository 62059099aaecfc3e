//! Common test fixtures for sky tile tests.

use std::path::{Path, PathBuf};

use tile_common::{BoundingBox, ElementType, LayerConfig, LayerMetadata};

/// Common bounding box definitions for testing.
pub mod bbox {
    use tile_common::BoundingBox;

    /// The whole sky.
    pub const FULL_SKY: BoundingBox = BoundingBox {
        left: -180.0,
        right: 180.0,
        top: 90.0,
        bottom: -90.0,
    };

    /// The north-east quarter of the sky.
    pub const NORTH_EAST: BoundingBox = BoundingBox {
        left: 0.0,
        right: 180.0,
        top: 90.0,
        bottom: 0.0,
    };

    /// A patch straddling the equator near RA 0.
    pub const EQUATORIAL_PATCH: BoundingBox = BoundingBox {
        left: -10.0,
        right: 10.0,
        top: 5.0,
        bottom: -5.0,
    };
}

/// Config for a public full-sky layer.
pub fn full_sky_config(layer_id: &str, archive: impl AsRef<Path>) -> LayerConfig {
    LayerConfig::new(
        layer_id,
        bbox::FULL_SKY,
        archive.as_ref().to_string_lossy().into_owned(),
    )
}

/// Config for a layer covering `bbox`.
pub fn patch_config(layer_id: &str, bbox: BoundingBox, archive: impl AsRef<Path>) -> LayerConfig {
    LayerConfig::new(layer_id, bbox, archive.as_ref().to_string_lossy().into_owned())
}

/// Metadata for a full-sky single precision layer without touching disk.
pub fn full_sky_metadata(layer_id: &str, width: u32, height: u32) -> LayerMetadata {
    LayerMetadata::from_config(
        &full_sky_config(layer_id, format!("{}.zarr", layer_id)),
        width,
        height,
        ElementType::Float32,
    )
    .expect("full-sky fixture is consistent")
}

/// Path for a Zarr archive inside a temporary directory.
pub fn archive_path(dir: &tempfile::TempDir, name: &str) -> PathBuf {
    dir.path().join(format!("{}.zarr", name))
}
