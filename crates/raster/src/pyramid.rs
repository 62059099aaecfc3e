//! Tile pyramid construction.
//!
//! The pyramid is a flat array of levels, each a row-major grid of tile
//! slots indexed by `(x, y)`. Parents and children are found by index
//! arithmetic (`child = parent * 2 + {0, 1}`).
//!
//! Only the finest level is cut from the raster. Every coarser level is
//! aggregated from the one below: a parent pixel is the mean of the present
//! pixels among its four children, and is absent only when all four are.
//! Presence is tracked explicitly per pixel; absent pixels never contribute.

use std::sync::Arc;

use tile_common::{
    ElementType, LayerMetadata, Pixel, PyramidGeometry, Raster, Tile, TileAddress, TileData,
};
use tracing::debug;

use crate::error::{RasterError, Result};

/// One tile's pixels plus their presence mask, both `tile_size`² long.
#[derive(Debug, Clone, PartialEq)]
pub struct TileBlock<T> {
    pub data: Vec<T>,
    pub present: Vec<bool>,
}

impl<T: Pixel> TileBlock<T> {
    /// Payload with absent pixels set to NaN.
    pub fn to_raster(&self, tile_size: usize) -> Result<Raster<T>> {
        let data = self
            .data
            .iter()
            .zip(&self.present)
            .map(|(&v, &p)| if p { v } else { T::nan() })
            .collect();
        Raster::new(tile_size, tile_size, data).map_err(|e| RasterError::ShapeMismatch(e.to_string()))
    }

    pub fn present_count(&self) -> usize {
        self.present.iter().filter(|p| **p).count()
    }
}

/// A fully built pyramid for one layer.
#[derive(Debug, Clone)]
pub struct Pyramid<T> {
    geometry: PyramidGeometry,
    levels: Vec<Vec<Option<TileBlock<T>>>>,
}

impl<T: Pixel> Pyramid<T> {
    /// Build a pyramid for a raster placed at `offset` (col, row) in the
    /// world grid.
    ///
    /// Non-finite raster values count as absent.
    pub fn build(raster: &Raster<T>, geometry: PyramidGeometry, offset: (i64, i64)) -> Result<Self> {
        let ts = geometry.tile_size as usize;
        let finest = geometry.finest_level();
        let mut levels: Vec<Vec<Option<TileBlock<T>>>> =
            Vec::with_capacity(geometry.number_of_levels as usize);

        levels.push(cut_finest(raster, geometry, offset));
        for level in (0..finest).rev() {
            let child = levels
                .last()
                .ok_or_else(|| RasterError::ShapeMismatch("empty pyramid".into()))?;
            let parent = aggregate(child, geometry, level, ts);
            levels.push(parent);
        }
        levels.reverse();

        let stored: usize = levels
            .iter()
            .map(|l| l.iter().filter(|t| t.is_some()).count())
            .sum();
        debug!(
            tile_size = ts,
            levels = geometry.number_of_levels,
            tiles_with_data = stored,
            "Built pyramid"
        );

        Ok(Self { geometry, levels })
    }

    pub fn geometry(&self) -> PyramidGeometry {
        self.geometry
    }

    /// Block at an address, `None` when it holds no data or is out of range.
    pub fn block(&self, level: u32, x: u32, y: u32) -> Option<&TileBlock<T>> {
        let columns = self.geometry.columns(level) as usize;
        self.levels
            .get(level as usize)?
            .get(y as usize * columns + x as usize)?
            .as_ref()
    }
}

fn cut_finest<T: Pixel>(
    raster: &Raster<T>,
    geometry: PyramidGeometry,
    offset: (i64, i64),
) -> Vec<Option<TileBlock<T>>> {
    let ts = geometry.tile_size as usize;
    let level = geometry.finest_level();
    let columns = geometry.columns(level) as usize;
    let rows = geometry.rows(level) as usize;
    let (off_col, off_row) = offset;
    let (width, height) = (raster.width() as i64, raster.height() as i64);

    let mut tiles = Vec::with_capacity(columns * rows);
    for y in 0..rows {
        for x in 0..columns {
            let mut block = TileBlock {
                data: vec![T::zero(); ts * ts],
                present: vec![false; ts * ts],
            };
            let mut any = false;
            for r in 0..ts {
                let src_row = (y * ts + r) as i64 - off_row;
                if src_row < 0 || src_row >= height {
                    continue;
                }
                for c in 0..ts {
                    let src_col = (x * ts + c) as i64 - off_col;
                    if src_col < 0 || src_col >= width {
                        continue;
                    }
                    if let Some(v) = raster.get(src_col as usize, src_row as usize) {
                        if v.is_finite() {
                            block.data[r * ts + c] = v;
                            block.present[r * ts + c] = true;
                            any = true;
                        }
                    }
                }
            }
            tiles.push(any.then_some(block));
        }
    }
    tiles
}

fn aggregate<T: Pixel>(
    children: &[Option<TileBlock<T>>],
    geometry: PyramidGeometry,
    level: u32,
    ts: usize,
) -> Vec<Option<TileBlock<T>>> {
    let columns = geometry.columns(level) as usize;
    let rows = geometry.rows(level) as usize;
    let child_columns = geometry.columns(level + 1) as usize;

    let mut tiles = Vec::with_capacity(columns * rows);
    for y in 0..rows {
        for x in 0..columns {
            let quad = [(0, 0), (1, 0), (0, 1), (1, 1)].map(|(dx, dy)| {
                children
                    .get((2 * y + dy) * child_columns + 2 * x + dx)
                    .and_then(Option::as_ref)
            });
            if quad.iter().all(Option::is_none) {
                tiles.push(None);
                continue;
            }

            // Stitch the four children into one 2ts x 2ts buffer, then reduce
            // each 2x2 cell. Odd tile sizes straddle child boundaries cleanly.
            let side = 2 * ts;
            let mut values = vec![0.0f64; side * side];
            let mut present = vec![false; side * side];
            for (i, child) in quad.iter().enumerate() {
                let Some(child) = child else { continue };
                let (dx, dy) = (i % 2, i / 2);
                for r in 0..ts {
                    for c in 0..ts {
                        let src = r * ts + c;
                        if child.present[src] {
                            let dst = (dy * ts + r) * side + dx * ts + c;
                            values[dst] = child.data[src].as_f64();
                            present[dst] = true;
                        }
                    }
                }
            }

            let mut block = TileBlock {
                data: vec![T::zero(); ts * ts],
                present: vec![false; ts * ts],
            };
            for r in 0..ts {
                for c in 0..ts {
                    let mut sum = 0.0;
                    let mut count = 0u32;
                    for (sr, sc) in [(0, 0), (0, 1), (1, 0), (1, 1)] {
                        let idx = (2 * r + sr) * side + 2 * c + sc;
                        if present[idx] {
                            sum += values[idx];
                            count += 1;
                        }
                    }
                    if count > 0 {
                        block.data[r * ts + c] = T::from_f64_lossy(sum / count as f64);
                        block.present[r * ts + c] = true;
                    }
                }
            }
            tiles.push(Some(block));
        }
    }
    tiles
}

/// A pyramid of either supported element type.
#[derive(Debug, Clone)]
pub enum AnyPyramid {
    Float32(Pyramid<f32>),
    Float64(Pyramid<f64>),
}

impl AnyPyramid {
    /// Build from a raster payload placed at `offset` in the world grid.
    pub fn build(data: &TileData, geometry: PyramidGeometry, offset: (i64, i64)) -> Result<Self> {
        Ok(match data {
            TileData::Float32(r) => AnyPyramid::Float32(Pyramid::build(r, geometry, offset)?),
            TileData::Float64(r) => AnyPyramid::Float64(Pyramid::build(r, geometry, offset)?),
        })
    }

    pub fn element_type(&self) -> ElementType {
        match self {
            AnyPyramid::Float32(_) => ElementType::Float32,
            AnyPyramid::Float64(_) => ElementType::Float64,
        }
    }

    pub fn geometry(&self) -> PyramidGeometry {
        match self {
            AnyPyramid::Float32(p) => p.geometry(),
            AnyPyramid::Float64(p) => p.geometry(),
        }
    }

    /// Payload of one tile, `None` when it holds no data.
    pub fn tile_data(&self, level: u32, x: u32, y: u32) -> Result<Option<TileData>> {
        let ts = self.geometry().tile_size as usize;
        Ok(match self {
            AnyPyramid::Float32(p) => match p.block(level, x, y) {
                Some(b) => Some(TileData::Float32(b.to_raster(ts)?)),
                None => None,
            },
            AnyPyramid::Float64(p) => match p.block(level, x, y) {
                Some(b) => Some(TileData::Float64(b.to_raster(ts)?)),
                None => None,
            },
        })
    }

    /// Every tile of the pyramid, including empty ones with a null payload.
    pub fn tiles(&self, layer: &Arc<LayerMetadata>) -> Result<Vec<Tile>> {
        let geometry = self.geometry();
        let mut tiles = Vec::new();
        for level in 0..geometry.number_of_levels {
            for y in 0..geometry.rows(level) {
                for x in 0..geometry.columns(level) {
                    let address = TileAddress::new(layer.layer_id.clone(), level, x, y);
                    let payload = self.tile_data(level, x, y)?;
                    tiles.push(Tile::new(address, payload, layer.grant.clone()));
                }
            }
        }
        Ok(tiles)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn geometry(ts: u32, nl: u32) -> PyramidGeometry {
        PyramidGeometry::new(ts, nl).unwrap()
    }

    #[test]
    fn test_constant_raster_two_roots() {
        let raster = Raster::filled(512, 256, 1.0f32);
        let pyramid = Pyramid::build(&raster, geometry(256, 1), (0, 0)).unwrap();
        for x in 0..2 {
            let block = pyramid.block(0, x, 0).unwrap();
            assert_eq!(block.present_count(), 256 * 256);
            assert!(block.data.iter().all(|v| *v == 1.0));
        }
    }

    #[test]
    fn test_parent_is_presence_weighted_mean() {
        // 16x8 world, 2 pixel tiles, 3 levels. The 8x4 raster fills the
        // south-west quarter; only its first four columns hold values.
        let mut data = vec![f32::NAN; 8 * 4];
        for row in 0..4 {
            for col in 0..4 {
                data[row * 8 + col] = (row * 8 + col) as f32;
            }
        }
        data[0] = f32::NAN;
        let raster = Raster::new(8, 4, data.clone()).unwrap();
        let pyramid = Pyramid::build(&raster, geometry(2, 3), (0, 0)).unwrap();

        // Level 1 tile (0, 0) covers world pixels 0..4 x 0..4.
        let block = pyramid.block(1, 0, 0).unwrap();
        // Pixel (0, 0) aggregates world (0,0) NaN, (1,0)=1, (0,1)=8, (1,1)=9.
        assert_eq!(block.data[0], (1.0 + 8.0 + 9.0) / 3.0);
        assert!(block.present.iter().all(|p| *p));

        // Right half of the world is empty at every level.
        assert!(pyramid.block(2, 3, 0).is_none());
        assert!(pyramid.block(1, 1, 0).is_none());

        // Root covers everything; its left half pixel (0,0) is the mean of level-1 pixels.
        let root = pyramid.block(0, 0, 0).unwrap();
        let l1 = pyramid.block(1, 0, 0).unwrap();
        let expected = (l1.data[0] + l1.data[1] + l1.data[2] + l1.data[3]) / 4.0;
        assert!((root.data[0] - expected).abs() < 1e-5);
        assert!(root.present[0]);
        // Root pixel (1, 0) covers the empty right half.
        assert!(!root.present[1]);
    }

    #[test]
    fn test_offset_raster_places_pixels() {
        let raster = Raster::filled(2, 2, 5.0f64);
        let pyramid = Pyramid::build(&raster, geometry(2, 2), (2, 0)).unwrap();
        assert!(pyramid.block(1, 0, 0).is_none());
        let block = pyramid.block(1, 1, 0).unwrap();
        assert_eq!(block.present_count(), 4);
        let root = pyramid.block(0, 0, 0).unwrap();
        assert_eq!(root.present, vec![false, true, false, false]);
        assert_eq!(root.data[1], 5.0);
    }

    #[test]
    fn test_odd_tile_size_aggregation() {
        let raster = Raster::filled(12, 6, 2.0f32);
        let pyramid = Pyramid::build(&raster, geometry(3, 2), (0, 0)).unwrap();
        for x in 0..2 {
            let block = pyramid.block(0, x, 0).unwrap();
            assert_eq!(block.present_count(), 9);
            assert!(block.data.iter().all(|v| *v == 2.0));
        }
    }

    #[test]
    fn test_absent_pixels_become_nan() {
        let mut data = vec![1.0f32; 4 * 2];
        data[0] = f32::NAN;
        let raster = Raster::new(4, 2, data).unwrap();
        let pyramid = AnyPyramid::build(&TileData::Float32(raster), geometry(2, 1), (0, 0)).unwrap();
        let tile = pyramid.tile_data(0, 0, 0).unwrap().unwrap();
        let values = tile.values_f64();
        assert!(values[0].is_nan());
        assert_eq!(values[1], 1.0);
    }
}
