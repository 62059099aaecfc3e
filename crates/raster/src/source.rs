//! On-demand tile generation straight from archival rasters.
//!
//! This is the provider of last resort. A tile at level `L` samples every
//! `stride(L)`-th archive pixel, so deep levels read at full resolution and
//! shallow ones read decimated data without any pyramid being stored.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use tile_cache::{new_provider_id, Provider};
use tile_common::{
    Grants, LayerCatalog, LayerMetadata, Tile, TileAddress, TileData, TileError, TileResult,
};
use tracing::{debug, info};

use crate::archive::{RasterArchive, Window};
use crate::archive::ZarrArchive;

struct SourceLayer {
    metadata: Arc<LayerMetadata>,
    archive: Arc<dyn RasterArchive>,
}

/// Generates tiles from the archive of each registered layer.
pub struct SourceTileProvider {
    id: String,
    layers: HashMap<String, SourceLayer>,
    subsample: bool,
}

impl Default for SourceTileProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl SourceTileProvider {
    pub fn new() -> Self {
        Self {
            id: new_provider_id(),
            layers: HashMap::new(),
            subsample: true,
        }
    }

    /// Register a layer and its archive.
    pub fn with_layer(mut self, metadata: Arc<LayerMetadata>, archive: Arc<dyn RasterArchive>) -> Self {
        self.layers.insert(
            metadata.layer_id.clone(),
            SourceLayer { metadata, archive },
        );
        self
    }

    /// When disabled, only the finest level is generated; coarser levels
    /// answer `NotFound`.
    pub fn with_subsampling(mut self, subsample: bool) -> Self {
        self.subsample = subsample;
        self
    }

    /// Open the Zarr archive of every layer in a catalog.
    pub fn from_catalog(catalog: &LayerCatalog) -> TileResult<Self> {
        let mut provider = Self::new();
        for layer in catalog.iter() {
            let archive = ZarrArchive::open_path(&layer.archive)?;
            provider = provider.with_layer(layer.clone(), Arc::new(archive));
        }
        info!(layers = provider.layers.len(), "Opened archives for on-demand tiles");
        Ok(provider)
    }

    pub fn layer_count(&self) -> usize {
        self.layers.len()
    }
}

/// Range of tile samples `k` in `0..tile_size` whose world pixel
/// `origin + k * stride` falls inside `[lo, hi)`.
fn sample_range(origin: i64, stride: i64, lo: i64, hi: i64, tile_size: i64) -> (i64, i64) {
    let start = div_ceil(lo - origin, stride).max(0);
    let end = div_ceil(hi - origin, stride).min(tile_size);
    (start, end)
}

fn div_ceil(a: i64, b: i64) -> i64 {
    -((-a).div_euclid(b))
}

#[async_trait]
impl Provider<Tile> for SourceTileProvider {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> &'static str {
        "source"
    }

    async fn pull(&self, address: &TileAddress, grants: &Grants) -> TileResult<Tile> {
        let layer = match self.layers.get(&address.layer_id) {
            Some(layer) if layer.metadata.visible_to(grants) => layer,
            _ => return Err(TileError::not_found(address.hash())),
        };
        let meta = &layer.metadata;
        meta.check_address(address)?;

        let geometry = meta.geometry;
        if !self.subsample && address.level != geometry.finest_level() {
            return Err(TileError::not_found(address.hash()));
        }

        let start = Instant::now();
        let ts = geometry.tile_size as i64;
        let stride = geometry.stride(address.level) as i64;
        let footprint = geometry.footprint_pixels(address.level) as i64;
        let origin_col = address.x as i64 * footprint;
        let origin_row = address.y as i64 * footprint;
        let (off_col, off_row) = meta.raster_offset();
        let (width, height) = (meta.raster_width as i64, meta.raster_height as i64);

        let (c0, c1) = sample_range(origin_col, stride, off_col, off_col + width, ts);
        let (r0, r1) = sample_range(origin_row, stride, off_row, off_row + height, ts);

        if c0 >= c1 || r0 >= r1 {
            debug!(tile = %address, "Tile lies outside the raster");
            return Ok(Tile::new(address.clone(), None, meta.grant.clone()).with_provenance(&self.id));
        }

        let window = Window {
            row0: (origin_row + r0 * stride - off_row) as u64,
            col0: (origin_col + c0 * stride - off_col) as u64,
            rows: (r1 - r0) as usize,
            cols: (c1 - c0) as usize,
            stride: stride as u64,
        };

        let archive = layer.archive.clone();
        let samples = tokio::task::spawn_blocking(move || archive.read_window(window))
            .await
            .map_err(|e| TileError::Internal(format!("archive read task failed: {}", e)))??;

        let size = ts as usize;
        let mut payload = TileData::missing(meta.element_type, size, size);
        payload.copy_region_from(
            &samples,
            0,
            0,
            window.cols,
            window.rows,
            c0 as usize,
            r0 as usize,
        )?;

        debug!(
            tile = %address,
            stride = stride,
            samples = window.rows * window.cols,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Generated tile from archive"
        );

        Ok(Tile::new(address.clone(), Some(payload), meta.grant.clone()).with_provenance(&self.id))
    }

    async fn push(&self, _item: Tile) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_range() {
        // Raster occupies world pixels [5, 13), tile starts at 0 with stride 2.
        assert_eq!(sample_range(0, 2, 5, 13, 8), (3, 7));
        // Tile entirely to the east of the raster.
        let (s, e) = sample_range(16, 2, 5, 13, 8);
        assert!(s >= e);
        // Clamped to the tile.
        assert_eq!(sample_range(0, 1, -10, 100, 8), (0, 8));
    }

    #[test]
    fn test_div_ceil() {
        assert_eq!(div_ceil(5, 2), 3);
        assert_eq!(div_ceil(4, 2), 2);
        assert_eq!(div_ceil(-3, 2), -1);
    }
}
