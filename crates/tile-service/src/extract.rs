//! Cutouts: stitch the finest-level tiles overlapping a world-space box into
//! one contiguous buffer.
//!
//! Buffer row 0 is the southern edge of the box, column 0 the western edge.
//! Regions covered by tiles without a payload keep the buffer's fill: zero
//! for plain cutouts, NaN for [`Extractor::extract_valid`].

use std::sync::Arc;
use std::time::Instant;

use futures::stream::{self, StreamExt};
use tile_cache::ProviderChain;
use tile_common::{
    BoundingBox, Grants, LayerCatalog, LayerMetadata, Tile, TileAddress, TileData, TileError,
    TileResult,
};
use tracing::debug;

/// Result of an extraction.
#[derive(Debug, Clone)]
pub struct Cutout {
    pub data: TileData,
    /// The requested box with reversed edges swapped.
    pub bbox: BoundingBox,
    /// World-grid pixel of the buffer's south-west corner.
    pub origin: (u64, u64),
    pub tiles_touched: usize,
    /// Tiles the faster providers missed. Pushing them back is up to the caller.
    pub promotions: Vec<Tile>,
}

/// Pixel rectangle `[col0, col1) x [row0, row1)` in the finest world grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct PixelRect {
    pub col0: u64,
    pub col1: u64,
    pub row0: u64,
    pub row1: u64,
}

impl PixelRect {
    /// Map a normalized box onto the layer's world grid, clamped to the sky.
    pub(crate) fn from_bbox(layer: &LayerMetadata, bbox: &BoundingBox) -> TileResult<Self> {
        let dpp = layer.degrees_per_pixel();
        let (world_w, world_h) = layer.world_pixels();
        let to_col = |ra: f64| (((ra + 180.0) / dpp).round().max(0.0) as u64).min(world_w);
        let to_row = |dec: f64| (((dec + 90.0) / dpp).round().max(0.0) as u64).min(world_h);

        let rect = Self {
            col0: to_col(bbox.left),
            col1: to_col(bbox.right),
            row0: to_row(bbox.bottom),
            row1: to_row(bbox.top),
        };
        if rect.col0 >= rect.col1 || rect.row0 >= rect.row1 {
            return Err(TileError::InvalidBbox(format!(
                "{} covers no pixel of layer {}",
                bbox.cache_key(),
                layer.layer_id
            )));
        }
        Ok(rect)
    }

    pub(crate) fn width(&self) -> usize {
        (self.col1 - self.col0) as usize
    }

    pub(crate) fn height(&self) -> usize {
        (self.row1 - self.row0) as usize
    }

    /// Finest-level tile columns and rows touching this rectangle.
    fn tile_ranges(&self, tile_size: u64, columns: u32, rows: u32) -> (u32, u32, u32, u32) {
        let x0 = (self.col0 / tile_size) as u32;
        let x1 = (self.col1.div_ceil(tile_size) as u32).min(columns);
        let y0 = (self.row0 / tile_size) as u32;
        let y1 = (self.row1.div_ceil(tile_size) as u32).min(rows);
        (x0, x1, y0, y1)
    }
}

/// Default number of tiles pulled at once for one cutout.
pub const DEFAULT_TILE_CONCURRENCY: usize = 16;

/// What pixels without source data hold in a cutout buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Fill {
    Zero,
    Missing,
}

/// Builds cutouts through a tile chain.
pub struct Extractor {
    catalog: Arc<LayerCatalog>,
    chain: Arc<ProviderChain<Tile>>,
    concurrency: usize,
}

impl Extractor {
    pub fn new(catalog: Arc<LayerCatalog>, chain: Arc<ProviderChain<Tile>>) -> Self {
        Self {
            catalog,
            chain,
            concurrency: DEFAULT_TILE_CONCURRENCY,
        }
    }

    /// Bound the number of tile pulls in flight per cutout.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn catalog(&self) -> &Arc<LayerCatalog> {
        &self.catalog
    }

    pub fn chain(&self) -> &Arc<ProviderChain<Tile>> {
        &self.chain
    }

    pub async fn extract(&self, layer_id: &str, bbox: &BoundingBox, grants: &Grants) -> TileResult<Cutout> {
        self.extract_with_grid(layer_id, bbox, grants, None).await
    }

    /// Extract a cutout, optionally outlining every tile with `grid_value`.
    pub async fn extract_with_grid(
        &self,
        layer_id: &str,
        bbox: &BoundingBox,
        grants: &Grants,
        grid_value: Option<f64>,
    ) -> TileResult<Cutout> {
        self.extract_filled(layer_id, bbox, grants, grid_value, Fill::Zero).await
    }

    /// Extract a cutout where pixels no tile provides are NaN, so that
    /// only real source pixels are finite.
    pub async fn extract_valid(&self, layer_id: &str, bbox: &BoundingBox, grants: &Grants) -> TileResult<Cutout> {
        self.extract_filled(layer_id, bbox, grants, None, Fill::Missing).await
    }

    async fn extract_filled(
        &self,
        layer_id: &str,
        bbox: &BoundingBox,
        grants: &Grants,
        grid_value: Option<f64>,
        fill: Fill,
    ) -> TileResult<Cutout> {
        bbox.validate()?;
        let bbox = bbox.normalized();
        let layer = self.catalog.visible(layer_id, grants)?;

        let start = Instant::now();
        let rect = PixelRect::from_bbox(layer, &bbox)?;
        let geometry = layer.geometry;
        let level = geometry.finest_level();
        let ts = geometry.tile_size as u64;
        let (x0, x1, y0, y1) = rect.tile_ranges(ts, geometry.columns(level), geometry.rows(level));

        let addresses: Vec<TileAddress> = (y0..y1)
            .flat_map(|y| (x0..x1).map(move |x| (x, y)))
            .map(|(x, y)| TileAddress::new(layer_id, level, x, y))
            .collect();

        let tiles_touched = addresses.len();
        let pulls: Vec<_> = stream::iter(addresses)
            .map(|address| async move {
                let pulled = self.chain.pull(&address, grants).await;
                (address, pulled)
            })
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        let mut data = match fill {
            Fill::Zero => TileData::zeros(layer.element_type, rect.width(), rect.height()),
            Fill::Missing => TileData::missing(layer.element_type, rect.width(), rect.height()),
        };
        let mut promotions = Vec::new();

        for (address, pulled) in pulls {
            let pulled = pulled?;
            promotions.extend(pulled.promotions);

            let tile_col = address.x as u64 * ts;
            let tile_row = address.y as u64 * ts;
            let c0 = rect.col0.max(tile_col);
            let c1 = rect.col1.min(tile_col + ts);
            let r0 = rect.row0.max(tile_row);
            let r1 = rect.row1.min(tile_row + ts);
            if c0 >= c1 || r0 >= r1 {
                continue;
            }

            let (width, height) = ((c1 - c0) as usize, (r1 - r0) as usize);
            let (dst_col, dst_row) = ((c0 - rect.col0) as usize, (r0 - rect.row0) as usize);

            if let Some(payload) = &pulled.item.payload {
                data.copy_region_from(
                    payload,
                    (c0 - tile_col) as usize,
                    (r0 - tile_row) as usize,
                    width,
                    height,
                    dst_col,
                    dst_row,
                )?;
            }

            if let Some(value) = grid_value {
                data.paint_border(dst_col, dst_row, width, height, value);
            }
        }

        debug!(
            layer_id = %layer_id,
            width = rect.width(),
            height = rect.height(),
            tiles = tiles_touched,
            promotions = promotions.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Extracted cutout"
        );

        Ok(Cutout {
            data,
            bbox,
            origin: (rect.col0, rect.row0),
            tiles_touched,
            promotions,
        })
    }
}
