use tile_common::{ElementType, TileData};

use super::{sample, RasterArchive, Window};
use crate::error::Result;

/// An archive held entirely in memory.
#[derive(Debug, Clone)]
pub struct MemoryArchive {
    data: TileData,
}

impl MemoryArchive {
    pub fn new(data: TileData) -> Self {
        Self { data }
    }
}

impl RasterArchive for MemoryArchive {
    fn shape(&self) -> (u64, u64) {
        (self.data.width() as u64, self.data.height() as u64)
    }

    fn element_type(&self) -> ElementType {
        self.data.element_type()
    }

    fn read_window(&self, window: Window) -> Result<TileData> {
        let (width, height) = self.shape();
        window.check(width, height)?;
        Ok(match &self.data {
            TileData::Float32(r) => TileData::Float32(sample(r, window)?),
            TileData::Float64(r) => TileData::Float64(sample(r, window)?),
        })
    }
}
