//! Pyramid geometry derived from the full-resolution world grid.

use serde::{Deserialize, Serialize};

use crate::error::{TileError, TileResult};

/// Preferred tile edge when the world grid allows it.
pub const PREFERRED_TILE_SIZE: u32 = 256;

/// Tile size and depth of one layer's pyramid.
///
/// The finest level is `number_of_levels - 1`; a tile there covers
/// `tile_size` world pixels on each side. Each coarser level halves the
/// resolution, so a tile at level `L` covers `tile_size * stride(L)` world
/// pixels sampled every `stride(L)` pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PyramidGeometry {
    pub tile_size: u32,
    pub number_of_levels: u32,
}

impl PyramidGeometry {
    pub fn new(tile_size: u32, number_of_levels: u32) -> TileResult<Self> {
        if tile_size == 0 {
            return Err(TileError::invalid_parameter("tile_size", "must be positive"));
        }
        if number_of_levels == 0 || number_of_levels > 31 {
            return Err(TileError::invalid_parameter(
                "number_of_levels",
                format!("{} is outside 1..=31", number_of_levels),
            ));
        }
        Ok(Self {
            tile_size,
            number_of_levels,
        })
    }

    /// Derive the geometry for a full-resolution world grid.
    ///
    /// 256 is used when it divides both axes. Otherwise the height is halved
    /// while it stays even and above 512, and the result is the tile size.
    /// The level count is `floor(log2(max(width, height) / tile_size))`.
    pub fn for_world(width: u32, height: u32) -> TileResult<Self> {
        if width == 0 || height == 0 {
            return Err(TileError::invalid_parameter(
                "world",
                format!("empty world grid {}x{}", width, height),
            ));
        }

        let tile_size = if width % PREFERRED_TILE_SIZE == 0 && height % PREFERRED_TILE_SIZE == 0 {
            PREFERRED_TILE_SIZE
        } else {
            let mut size = height;
            while size % 2 == 0 && size > 512 {
                size /= 2;
            }
            size
        };

        let largest = width.max(height) as u64;
        let mut levels = 0u32;
        while (tile_size as u64) << (levels + 1) <= largest {
            levels += 1;
        }

        if levels == 0 {
            return Err(TileError::invalid_parameter(
                "world",
                format!(
                    "{}x{} grid is too small for {} pixel tiles",
                    width, height, tile_size
                ),
            ));
        }

        Self::new(tile_size, levels)
    }

    pub fn finest_level(&self) -> u32 {
        self.number_of_levels - 1
    }

    pub fn contains_level(&self, level: u32) -> bool {
        level < self.number_of_levels
    }

    /// Sampling step, in finest-level pixels, for tiles at `level`.
    pub fn stride(&self, level: u32) -> u64 {
        1u64 << self.finest_level().saturating_sub(level)
    }

    /// Edge of a tile at `level`, measured in finest-level pixels.
    pub fn footprint_pixels(&self, level: u32) -> u64 {
        self.tile_size as u64 * self.stride(level)
    }

    pub fn columns(&self, level: u32) -> u32 {
        1 << (level + 1)
    }

    pub fn rows(&self, level: u32) -> u32 {
        1 << level
    }

    /// Width of the area the pyramid covers, in finest-level pixels.
    pub fn pixel_width(&self) -> u64 {
        self.tile_size as u64 * self.columns(self.finest_level()) as u64
    }

    /// Height of the area the pyramid covers, in finest-level pixels.
    pub fn pixel_height(&self) -> u64 {
        self.tile_size as u64 * self.rows(self.finest_level()) as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefers_256() {
        let g = PyramidGeometry::for_world(512, 256).unwrap();
        assert_eq!(g.tile_size, 256);
        assert_eq!(g.number_of_levels, 1);
        assert_eq!(g.finest_level(), 0);
        assert_eq!(g.stride(0), 1);
    }

    #[test]
    fn test_halves_height_until_odd_or_small() {
        let g = PyramidGeometry::for_world(3600, 1800).unwrap();
        assert_eq!(g.tile_size, 450);
        assert_eq!(g.number_of_levels, 3);
        assert_eq!(g.pixel_width(), 3600);
        assert_eq!(g.pixel_height(), 1800);
    }

    #[test]
    fn test_small_even_height_is_tile_size() {
        let g = PyramidGeometry::for_world(1000, 500).unwrap();
        assert_eq!(g.tile_size, 500);
        assert_eq!(g.number_of_levels, 1);
    }

    #[test]
    fn test_rejects_grid_smaller_than_two_tiles() {
        assert!(PyramidGeometry::for_world(256, 256).is_err());
        assert!(PyramidGeometry::for_world(0, 256).is_err());
    }

    #[test]
    fn test_strides() {
        let g = PyramidGeometry::new(256, 4).unwrap();
        assert_eq!(g.stride(3), 1);
        assert_eq!(g.stride(1), 4);
        assert_eq!(g.stride(0), 8);
        assert_eq!(g.footprint_pixels(0), 2048);
        assert_eq!(g.columns(0), 2);
        assert_eq!(g.rows(3), 8);
    }
}
