//! Typed 2D pixel buffers.
//!
//! Buffers are row-major with row 0 at the southern (bottom) edge and
//! column 0 at the western (left) edge, matching the archive layout.

use std::fmt::Debug;

use bytemuck::Pod;
use num_traits::Float;
use serde::{Deserialize, Serialize};

use crate::error::{TileError, TileResult};

/// Element type tag carried alongside raw payload bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElementType {
    Float32,
    Float64,
}

impl ElementType {
    /// Size of one element in bytes.
    pub fn size_bytes(&self) -> usize {
        match self {
            ElementType::Float32 => 4,
            ElementType::Float64 => 8,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ElementType::Float32 => "float32",
            ElementType::Float64 => "float64",
        }
    }
}

/// A pixel value type that tiles can be built from.
pub trait Pixel: Pod + Float + Debug + Send + Sync + 'static {
    const ELEMENT_TYPE: ElementType;

    fn into_data(raster: Raster<Self>) -> TileData;

    fn as_f64(self) -> f64;

    fn from_f64_lossy(value: f64) -> Self;
}

impl Pixel for f32 {
    const ELEMENT_TYPE: ElementType = ElementType::Float32;

    fn into_data(raster: Raster<Self>) -> TileData {
        TileData::Float32(raster)
    }

    fn as_f64(self) -> f64 {
        self as f64
    }

    fn from_f64_lossy(value: f64) -> Self {
        value as f32
    }
}

impl Pixel for f64 {
    const ELEMENT_TYPE: ElementType = ElementType::Float64;

    fn into_data(raster: Raster<Self>) -> TileData {
        TileData::Float64(raster)
    }

    fn as_f64(self) -> f64 {
        self
    }

    fn from_f64_lossy(value: f64) -> Self {
        value
    }
}

/// A dense 2D buffer of pixels.
#[derive(Debug, Clone, PartialEq)]
pub struct Raster<T> {
    width: usize,
    height: usize,
    data: Vec<T>,
}

impl<T: Pixel> Raster<T> {
    /// Wrap row-major data, checking its length against the dimensions.
    pub fn new(width: usize, height: usize, data: Vec<T>) -> TileResult<Self> {
        if data.len() != width * height {
            return Err(TileError::Internal(format!(
                "raster data has {} elements, expected {}x{}",
                data.len(),
                width,
                height
            )));
        }
        Ok(Self {
            width,
            height,
            data,
        })
    }

    pub fn filled(width: usize, height: usize, value: T) -> Self {
        Self {
            width,
            height,
            data: vec![value; width * height],
        }
    }

    pub fn zeros(width: usize, height: usize) -> Self {
        Self::filled(width, height, T::zero())
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn data(&self) -> &[T] {
        &self.data
    }

    pub fn into_vec(self) -> Vec<T> {
        self.data
    }

    pub fn get(&self, col: usize, row: usize) -> Option<T> {
        if col >= self.width || row >= self.height {
            return None;
        }
        self.data.get(row * self.width + col).copied()
    }

    pub fn set(&mut self, col: usize, row: usize, value: T) {
        if col < self.width && row < self.height {
            self.data[row * self.width + col] = value;
        }
    }

    /// Copy a `width` x `height` window of `src` starting at
    /// (`src_col`, `src_row`) into this buffer at (`dst_col`, `dst_row`).
    ///
    /// The window is clipped to both buffers.
    pub fn copy_region_from(
        &mut self,
        src: &Raster<T>,
        src_col: usize,
        src_row: usize,
        width: usize,
        height: usize,
        dst_col: usize,
        dst_row: usize,
    ) {
        let width = width
            .min(src.width.saturating_sub(src_col))
            .min(self.width.saturating_sub(dst_col));
        let height = height
            .min(src.height.saturating_sub(src_row))
            .min(self.height.saturating_sub(dst_row));
        if width == 0 || height == 0 {
            return;
        }

        for row in 0..height {
            let src_start = (src_row + row) * src.width + src_col;
            let dst_start = (dst_row + row) * self.width + dst_col;
            self.data[dst_start..dst_start + width]
                .copy_from_slice(&src.data[src_start..src_start + width]);
        }
    }

    /// Paint the one-pixel outline of a rectangle.
    pub fn paint_border(&mut self, col: usize, row: usize, width: usize, height: usize, value: T) {
        if width == 0 || height == 0 {
            return;
        }
        let last_col = col + width - 1;
        let last_row = row + height - 1;
        for c in col..=last_col {
            self.set(c, row, value);
            self.set(c, last_row, value);
        }
        for r in row..=last_row {
            self.set(col, r, value);
            self.set(last_col, r, value);
        }
    }
}

macro_rules! dispatch {
    ($value:expr, $raster:ident => $body:expr) => {
        match $value {
            TileData::Float32($raster) => $body,
            TileData::Float64($raster) => $body,
        }
    };
}

/// A 2D pixel buffer with an explicit element type.
#[derive(Debug, Clone, PartialEq)]
pub enum TileData {
    Float32(Raster<f32>),
    Float64(Raster<f64>),
}

impl TileData {
    /// Zero-filled buffer.
    pub fn zeros(element_type: ElementType, width: usize, height: usize) -> Self {
        match element_type {
            ElementType::Float32 => TileData::Float32(Raster::zeros(width, height)),
            ElementType::Float64 => TileData::Float64(Raster::zeros(width, height)),
        }
    }

    /// Buffer where every pixel is absent (NaN).
    pub fn missing(element_type: ElementType, width: usize, height: usize) -> Self {
        match element_type {
            ElementType::Float32 => TileData::Float32(Raster::filled(width, height, f32::NAN)),
            ElementType::Float64 => TileData::Float64(Raster::filled(width, height, f64::NAN)),
        }
    }

    pub fn element_type(&self) -> ElementType {
        match self {
            TileData::Float32(_) => ElementType::Float32,
            TileData::Float64(_) => ElementType::Float64,
        }
    }

    pub fn width(&self) -> usize {
        dispatch!(self, r => r.width())
    }

    pub fn height(&self) -> usize {
        dispatch!(self, r => r.height())
    }

    pub fn len(&self) -> usize {
        self.width() * self.height()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Raw row-major payload in native byte order.
    pub fn to_ne_bytes(&self) -> Vec<u8> {
        dispatch!(self, r => bytemuck::cast_slice(r.data()).to_vec())
    }

    /// Reinterpret a native byte order payload. Shape and element type
    /// travel out of band.
    pub fn from_ne_bytes(
        element_type: ElementType,
        width: usize,
        height: usize,
        bytes: &[u8],
    ) -> TileResult<Self> {
        let expected = width * height * element_type.size_bytes();
        if bytes.len() != expected {
            return Err(TileError::Decode(format!(
                "payload has {} bytes, expected {} for {}x{} {}",
                bytes.len(),
                expected,
                width,
                height,
                element_type.name()
            )));
        }
        Ok(match element_type {
            ElementType::Float32 => {
                TileData::Float32(Raster::new(width, height, bytemuck::pod_collect_to_vec(bytes))?)
            }
            ElementType::Float64 => {
                TileData::Float64(Raster::new(width, height, bytemuck::pod_collect_to_vec(bytes))?)
            }
        })
    }

    /// All pixel values widened to f64, row-major.
    pub fn values_f64(&self) -> Vec<f64> {
        dispatch!(self, r => r.data().iter().map(|v| v.as_f64()).collect())
    }

    /// Value at a pixel widened to f64.
    pub fn get_f64(&self, col: usize, row: usize) -> Option<f64> {
        dispatch!(self, r => r.get(col, row).map(|v| v.as_f64()))
    }

    /// Copy a window of `src` into this buffer; both must share an element type.
    #[allow(clippy::too_many_arguments)]
    pub fn copy_region_from(
        &mut self,
        src: &TileData,
        src_col: usize,
        src_row: usize,
        width: usize,
        height: usize,
        dst_col: usize,
        dst_row: usize,
    ) -> TileResult<()> {
        match (self, src) {
            (TileData::Float32(dst), TileData::Float32(src)) => {
                dst.copy_region_from(src, src_col, src_row, width, height, dst_col, dst_row)
            }
            (TileData::Float64(dst), TileData::Float64(src)) => {
                dst.copy_region_from(src, src_col, src_row, width, height, dst_col, dst_row)
            }
            (dst, src) => {
                return Err(TileError::Internal(format!(
                    "cannot copy {} pixels into a {} buffer",
                    src.element_type().name(),
                    dst.element_type().name()
                )))
            }
        }
        Ok(())
    }

    /// Paint the one-pixel outline of a rectangle.
    pub fn paint_border(&mut self, col: usize, row: usize, width: usize, height: usize, value: f64) {
        match self {
            TileData::Float32(r) => r.paint_border(col, row, width, height, value as f32),
            TileData::Float64(r) => r.paint_border(col, row, width, height, value),
        }
    }

    /// Byte-level equality; NaN pixels compare equal to themselves.
    pub fn bit_eq(&self, other: &TileData) -> bool {
        self.element_type() == other.element_type()
            && self.width() == other.width()
            && self.height() == other.height()
            && self.to_ne_bytes() == other.to_ne_bytes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_copy_region_clips() {
        let src = Raster::new(3, 2, vec![1.0f32, 2.0, 3.0, 4.0, 5.0, 6.0]).unwrap();
        let mut dst = Raster::<f32>::zeros(2, 2);
        dst.copy_region_from(&src, 1, 0, 5, 5, 0, 0);
        assert_eq!(dst.data(), &[2.0, 3.0, 5.0, 6.0]);
    }

    #[test]
    fn test_ne_bytes_reinterpretation() {
        let data = TileData::Float64(Raster::new(2, 1, vec![1.5, -2.0]).unwrap());
        let bytes = data.to_ne_bytes();
        assert_eq!(bytes.len(), 16);
        let back = TileData::from_ne_bytes(ElementType::Float64, 2, 1, &bytes).unwrap();
        assert!(back.bit_eq(&data));
        assert!(TileData::from_ne_bytes(ElementType::Float32, 2, 1, &bytes).is_err());
    }

    #[test]
    fn test_paint_border() {
        let mut r = Raster::<f32>::zeros(4, 3);
        r.paint_border(0, 0, 4, 3, 9.0);
        assert_eq!(r.get(1, 1), Some(0.0));
        assert_eq!(r.get(2, 1), Some(0.0));
        assert_eq!(r.get(0, 1), Some(9.0));
        assert_eq!(r.get(3, 2), Some(9.0));
    }

    #[test]
    fn test_mismatched_copy_fails() {
        let mut dst = TileData::zeros(ElementType::Float32, 2, 2);
        let src = TileData::zeros(ElementType::Float64, 2, 2);
        assert!(dst.copy_region_from(&src, 0, 0, 2, 2, 0, 0).is_err());
    }

    #[test]
    fn test_missing_is_nan() {
        let data = TileData::missing(ElementType::Float32, 2, 2);
        assert!(data.values_f64().iter().all(|v| v.is_nan()));
    }
}
