//! Synthetic raster generators.
//!
//! These produce predictable, verifiable pixel patterns for the test suite.
//! All rasters are row-major with row 0 at the southern edge.

use tile_common::{Raster, TileData};

/// Creates a test grid with predictable values.
///
/// Each cell value is calculated as: `col * 1000 + row`
///
/// # Example
///
/// ```
/// use test_utils::create_test_grid;
///
/// let grid = create_test_grid(10, 5);
/// assert_eq!(grid.len(), 50); // 10 * 5
/// assert_eq!(grid[0], 0.0);   // col=0, row=0 -> 0*1000 + 0
/// assert_eq!(grid[1], 1000.0); // col=1, row=0 -> 1*1000 + 0
/// assert_eq!(grid[10], 1.0);  // col=0, row=1 -> 0*1000 + 1
/// ```
pub fn create_test_grid(width: usize, height: usize) -> Vec<f32> {
    let mut data = Vec::with_capacity(width * height);
    for row in 0..height {
        for col in 0..width {
            data.push((col * 1000 + row) as f32);
        }
    }
    data
}

/// [`create_test_grid`] wrapped as a raster.
pub fn test_raster(width: usize, height: usize) -> Raster<f32> {
    Raster::new(width, height, create_test_grid(width, height)).expect("grid length matches shape")
}

/// A raster where every pixel equals `value`.
pub fn constant_raster(width: usize, height: usize, value: f32) -> Raster<f32> {
    Raster::filled(width, height, value)
}

/// [`create_test_grid`] with a NaN rectangle punched out.
pub fn raster_with_hole(
    width: usize,
    height: usize,
    hole_col: usize,
    hole_row: usize,
    hole_width: usize,
    hole_height: usize,
) -> Raster<f32> {
    let mut raster = test_raster(width, height);
    for row in hole_row..(hole_row + hole_height).min(height) {
        for col in hole_col..(hole_col + hole_width).min(width) {
            raster.set(col, row, f32::NAN);
        }
    }
    raster
}

/// A double precision raster holding a Gaussian source on a flat background.
pub fn gaussian_blob(
    width: usize,
    height: usize,
    center: (f64, f64),
    sigma: f64,
    amplitude: f64,
    background: f64,
) -> Raster<f64> {
    let mut raster = Raster::filled(width, height, background);
    for row in 0..height {
        for col in 0..width {
            let dx = col as f64 + 0.5 - center.0;
            let dy = row as f64 + 0.5 - center.1;
            let value = background + amplitude * (-(dx * dx + dy * dy) / (2.0 * sigma * sigma)).exp();
            raster.set(col, row, value);
        }
    }
    raster
}

/// Wrap a single precision raster as tile data.
pub fn as_data(raster: Raster<f32>) -> TileData {
    TileData::Float32(raster)
}
