//! Zarr V3 archives.

use std::path::Path;
use std::sync::Arc;

use tile_common::{ElementType, Raster, TileData};
use tracing::debug;
use zarrs::array::{Array, ArrayBuilder, DataType, ElementOwned, FillValue};
use zarrs::array_subset::ArraySubset;
use zarrs::storage::ReadableStorageTraits;
use zarrs_filesystem::FilesystemStore;

use super::{RasterArchive, Window};
use crate::error::{RasterError, Result};

/// A 2D Zarr array stored as `[row, col]`.
pub struct ZarrArchive<S: ?Sized = FilesystemStore> {
    array: Array<S>,
    width: u64,
    height: u64,
    element_type: ElementType,
}

impl ZarrArchive<FilesystemStore> {
    /// Open an archive directory on the local filesystem.
    pub fn open_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let store = FilesystemStore::new(path)
            .map_err(|e| RasterError::open_failed(format!("{}: {}", path.display(), e)))?;
        Self::open(store, "/")
    }

    /// Write `data` as a new archive directory and open it.
    pub fn create(path: impl AsRef<Path>, data: &TileData, chunk_size: u64) -> Result<Self> {
        let path = path.as_ref();
        std::fs::create_dir_all(path)?;
        let store = Arc::new(
            FilesystemStore::new(path)
                .map_err(|e| RasterError::write_failed(format!("{}: {}", path.display(), e)))?,
        );

        let (data_type, fill_value) = match data.element_type() {
            ElementType::Float32 => (DataType::Float32, FillValue::from(f32::NAN)),
            ElementType::Float64 => (DataType::Float64, FillValue::from(f64::NAN)),
        };
        let (height, width) = (data.height() as u64, data.width() as u64);
        let chunk = chunk_size.max(1);

        let array = ArrayBuilder::new(
            vec![height, width],
            data_type,
            vec![chunk, chunk]
                .try_into()
                .map_err(|e| RasterError::write_failed(format!("invalid chunk shape: {:?}", e)))?,
            fill_value,
        )
        .attributes({
            let mut attrs = serde_json::Map::new();
            attrs.insert("row_origin".to_string(), serde_json::json!("south"));
            attrs.insert("col_origin".to_string(), serde_json::json!("west"));
            attrs
        })
        .build(store.clone(), "/")
        .map_err(|e| RasterError::write_failed(e.to_string()))?;

        array
            .store_metadata()
            .map_err(|e| RasterError::write_failed(e.to_string()))?;

        let subset = ArraySubset::new_with_start_shape(vec![0, 0], vec![height, width])
            .map_err(|e| RasterError::write_failed(e.to_string()))?;
        let stored = match data {
            TileData::Float32(r) => array.store_array_subset_elements(&subset, r.data()),
            TileData::Float64(r) => array.store_array_subset_elements(&subset, r.data()),
        };
        stored.map_err(|e| RasterError::write_failed(e.to_string()))?;

        debug!(path = %path.display(), width = width, height = height, "Wrote raster archive");
        Self::open_path(path)
    }
}

impl<S: ?Sized + ReadableStorageTraits + 'static> ZarrArchive<S> {
    /// Open an array from any readable store.
    pub fn open(storage: impl Into<Arc<S>>, path: &str) -> Result<Self> {
        let array = Array::open(storage.into(), path)
            .map_err(|e| RasterError::open_failed(e.to_string()))?;

        let shape = array.shape();
        if shape.len() != 2 {
            return Err(RasterError::invalid_metadata(format!(
                "expected a 2D array, found {} dimensions",
                shape.len()
            )));
        }
        let (height, width) = (shape[0], shape[1]);

        let element_type = match array.data_type() {
            DataType::Float32 => ElementType::Float32,
            DataType::Float64 => ElementType::Float64,
            other => {
                return Err(RasterError::invalid_metadata(format!(
                    "unsupported element type {:?}",
                    other
                )))
            }
        };

        Ok(Self {
            array,
            width,
            height,
            element_type,
        })
    }

    fn read_rows<T: ElementOwned + tile_common::Pixel>(&self, window: Window) -> Result<Raster<T>> {
        let stride = window.stride as usize;
        let span = window.col_span();

        // Contiguous reads when not decimating, one row per sample otherwise.
        if stride == 1 {
            let subset = ArraySubset::new_with_start_shape(
                vec![window.row0, window.col0],
                vec![window.rows as u64, window.cols as u64],
            )
            .map_err(|e| RasterError::read_failed(e.to_string()))?;
            let data: Vec<T> = self
                .array
                .retrieve_array_subset_elements(&subset)
                .map_err(|e| RasterError::read_failed(e.to_string()))?;
            return Raster::new(window.cols, window.rows, data)
                .map_err(|e| RasterError::read_failed(e.to_string()));
        }

        let mut out = Vec::with_capacity(window.rows * window.cols);
        for r in 0..window.rows as u64 {
            let subset = ArraySubset::new_with_start_shape(
                vec![window.row0 + r * window.stride, window.col0],
                vec![1, span],
            )
            .map_err(|e| RasterError::read_failed(e.to_string()))?;
            let row: Vec<T> = self
                .array
                .retrieve_array_subset_elements(&subset)
                .map_err(|e| RasterError::read_failed(e.to_string()))?;
            out.extend(row.into_iter().step_by(stride));
        }
        Raster::new(window.cols, window.rows, out)
            .map_err(|e| RasterError::read_failed(e.to_string()))
    }
}

impl<S: ?Sized + ReadableStorageTraits + 'static> RasterArchive for ZarrArchive<S> {
    fn shape(&self) -> (u64, u64) {
        (self.width, self.height)
    }

    fn element_type(&self) -> ElementType {
        self.element_type
    }

    fn read_window(&self, window: Window) -> Result<TileData> {
        window.check(self.width, self.height)?;
        Ok(match self.element_type {
            ElementType::Float32 => TileData::Float32(self.read_rows::<f32>(window)?),
            ElementType::Float64 => TileData::Float64(self.read_rows::<f64>(window)?),
        })
    }
}
