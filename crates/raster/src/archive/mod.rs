//! Access to archival rasters.
//!
//! An archive is a single 2D array, row 0 at the southern edge and column 0
//! at the western edge. Reads are strided so coarse pyramid levels can be
//! served without loading every pixel.

mod memory;
mod zarr;

pub use memory::MemoryArchive;
pub use zarr::ZarrArchive;

use tile_common::{ElementType, Pixel, Raster, TileData};

use crate::error::{RasterError, Result};

/// A strided window into an archive.
///
/// Sample `(c, r)` of the result is raster pixel
/// `(col0 + c * stride, row0 + r * stride)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub row0: u64,
    pub col0: u64,
    pub rows: usize,
    pub cols: usize,
    pub stride: u64,
}

impl Window {
    /// The whole raster at full resolution.
    pub fn full(width: u64, height: u64) -> Self {
        Self {
            row0: 0,
            col0: 0,
            rows: height as usize,
            cols: width as usize,
            stride: 1,
        }
    }

    /// Pixels spanned along a row, from the first to the last sample.
    pub fn col_span(&self) -> u64 {
        span(self.cols, self.stride)
    }

    /// Pixels spanned along a column, from the first to the last sample.
    pub fn row_span(&self) -> u64 {
        span(self.rows, self.stride)
    }

    /// Reject windows that fall outside a `width` x `height` raster.
    pub fn check(&self, width: u64, height: u64) -> Result<()> {
        if self.stride == 0 || self.rows == 0 || self.cols == 0 {
            return Err(RasterError::out_of_bounds(
                format!("{:?}", self),
                "an empty or zero-stride window",
            ));
        }
        if self.col0 + self.col_span() > width || self.row0 + self.row_span() > height {
            return Err(RasterError::out_of_bounds(
                format!("{:?}", self),
                format!("{}x{}", width, height),
            ));
        }
        Ok(())
    }
}

fn span(samples: usize, stride: u64) -> u64 {
    if samples == 0 {
        0
    } else {
        (samples as u64 - 1) * stride + 1
    }
}

/// Read access to one archival raster.
///
/// Reads are blocking; async callers move them onto blocking threads.
pub trait RasterArchive: Send + Sync {
    /// Raster size as (width, height).
    fn shape(&self) -> (u64, u64);

    fn element_type(&self) -> ElementType;

    fn read_window(&self, window: Window) -> Result<TileData>;

    /// Read every pixel.
    fn read_all(&self) -> Result<TileData> {
        let (width, height) = self.shape();
        self.read_window(Window::full(width, height))
    }
}

/// Sample a strided window out of an in-memory raster.
pub(crate) fn sample<T: Pixel>(src: &Raster<T>, window: Window) -> Result<Raster<T>> {
    let stride = window.stride as usize;
    let mut out = Vec::with_capacity(window.rows * window.cols);
    for r in 0..window.rows {
        let row = window.row0 as usize + r * stride;
        let start = row * src.width() + window.col0 as usize;
        out.extend(
            src.data()[start..]
                .iter()
                .step_by(stride)
                .take(window.cols)
                .copied(),
        );
    }
    Raster::new(window.cols, window.rows, out).map_err(|e| RasterError::read_failed(e.to_string()))
}
