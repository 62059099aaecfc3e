//! Tile addressing within the whole-sky quadtree.
//!
//! Level 0 is two tiles wide and one tile tall. Each level doubles both
//! axes, so level `L` has `2^(L+1)` columns and `2^L` rows. Row 0 is the
//! southernmost row of tiles.

use serde::{Deserialize, Serialize};

use crate::error::{TileError, TileResult};
use crate::raster::TileData;

/// Position of a tile in a layer's pyramid.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TileAddress {
    pub layer_id: String,
    pub level: u32,
    /// Column, counted eastward from RA -180.
    pub x: u32,
    /// Row, counted northward from Dec -90.
    pub y: u32,
}

impl TileAddress {
    pub fn new(layer_id: impl Into<String>, level: u32, x: u32, y: u32) -> Self {
        Self {
            layer_id: layer_id.into(),
            level,
            x,
            y,
        }
    }

    /// Build an address from untrusted request parameters.
    pub fn parse(layer_id: &str, level: i64, x: i64, y: i64) -> TileResult<Self> {
        if layer_id.is_empty() {
            return Err(TileError::invalid_parameter("layer_id", "must not be empty"));
        }
        if level < 0 || level > 30 {
            return Err(TileError::invalid_parameter(
                "level",
                format!("{} is outside 0..=30", level),
            ));
        }
        if x < 0 || y < 0 || x > u32::MAX as i64 || y > u32::MAX as i64 {
            return Err(TileError::InvalidAddress(format!(
                "negative or oversized tile index ({}, {})",
                x, y
            )));
        }
        let address = Self::new(layer_id, level as u32, x as u32, y as u32);
        address.validate()?;
        Ok(address)
    }

    /// Number of tile columns at `level`.
    pub fn columns_at(level: u32) -> u64 {
        1u64 << (level + 1)
    }

    /// Number of tile rows at `level`.
    pub fn rows_at(level: u32) -> u64 {
        1u64 << level
    }

    /// Check the indices against the grid at this address's level.
    pub fn validate(&self) -> TileResult<()> {
        if self.level > 30 {
            return Err(TileError::InvalidAddress(format!(
                "level {} is too deep",
                self.level
            )));
        }
        if (self.x as u64) >= Self::columns_at(self.level)
            || (self.y as u64) >= Self::rows_at(self.level)
        {
            return Err(TileError::InvalidAddress(format!(
                "tile ({}, {}) is outside the {}x{} grid at level {}",
                self.x,
                self.y,
                Self::columns_at(self.level),
                Self::rows_at(self.level),
                self.level
            )));
        }
        Ok(())
    }

    /// Cache key: `{layer_id}-{x}-{y}-{level}`.
    pub fn hash(&self) -> String {
        format!("{}-{}-{}-{}", self.layer_id, self.x, self.y, self.level)
    }

    /// The tile one level up containing this one.
    pub fn parent(&self) -> Option<TileAddress> {
        if self.level == 0 {
            return None;
        }
        Some(Self::new(
            self.layer_id.clone(),
            self.level - 1,
            self.x / 2,
            self.y / 2,
        ))
    }

    /// The four tiles one level down, south-west first.
    pub fn children(&self) -> [TileAddress; 4] {
        let x = self.x * 2;
        let y = self.y * 2;
        let level = self.level + 1;
        let id = &self.layer_id;
        [
            Self::new(id.clone(), level, x, y),
            Self::new(id.clone(), level, x + 1, y),
            Self::new(id.clone(), level, x, y + 1),
            Self::new(id.clone(), level, x + 1, y + 1),
        ]
    }
}

impl std::fmt::Display for TileAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}/{}", self.layer_id, self.level, self.x, self.y)
    }
}

/// A tile with its payload, access grant and provenance.
///
/// `payload == None` is a valid "no data here" answer, distinct from the
/// tile not being found at all.
#[derive(Debug, Clone, PartialEq)]
pub struct Tile {
    pub address: TileAddress,
    pub payload: Option<TileData>,
    pub grant: Option<String>,
    /// Id of the provider that produced this value.
    pub provenance: String,
}

impl Tile {
    pub fn new(address: TileAddress, payload: Option<TileData>, grant: Option<String>) -> Self {
        Self {
            address,
            payload,
            grant,
            provenance: String::new(),
        }
    }

    pub fn with_provenance(mut self, provenance: impl Into<String>) -> Self {
        self.provenance = provenance.into();
        self
    }

    pub fn has_data(&self) -> bool {
        self.payload.is_some()
    }
}
