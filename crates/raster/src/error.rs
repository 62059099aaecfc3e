//! Error types for archival raster access.

use thiserror::Error;
use tile_common::TileError;

/// Errors that can occur while reading rasters or building pyramids.
#[derive(Error, Debug)]
pub enum RasterError {
    /// Failed to open the archive.
    #[error("failed to open raster: {0}")]
    OpenFailed(String),

    /// Failed to read data from the archive.
    #[error("failed to read raster data: {0}")]
    ReadFailed(String),

    /// Failed to write an archive.
    #[error("failed to write raster: {0}")]
    WriteFailed(String),

    /// The requested window is outside the raster.
    #[error("requested window {requested} is outside raster {shape}")]
    OutOfBounds { requested: String, shape: String },

    /// Invalid or unsupported archive metadata.
    #[error("invalid raster metadata: {0}")]
    InvalidMetadata(String),

    /// Raster dimensions disagree with the layer definition.
    #[error("inconsistent raster dimensions: {0}")]
    ShapeMismatch(String),
}

impl RasterError {
    pub fn open_failed(msg: impl Into<String>) -> Self {
        Self::OpenFailed(msg.into())
    }

    pub fn read_failed(msg: impl Into<String>) -> Self {
        Self::ReadFailed(msg.into())
    }

    pub fn write_failed(msg: impl Into<String>) -> Self {
        Self::WriteFailed(msg.into())
    }

    pub fn out_of_bounds(requested: impl Into<String>, shape: impl Into<String>) -> Self {
        Self::OutOfBounds {
            requested: requested.into(),
            shape: shape.into(),
        }
    }

    pub fn invalid_metadata(msg: impl Into<String>) -> Self {
        Self::InvalidMetadata(msg.into())
    }
}

impl From<std::io::Error> for RasterError {
    fn from(err: std::io::Error) -> Self {
        Self::OpenFailed(err.to_string())
    }
}

impl From<RasterError> for TileError {
    fn from(err: RasterError) -> Self {
        match err {
            RasterError::ShapeMismatch(_) | RasterError::InvalidMetadata(_) => {
                TileError::Ingestion(err.to_string())
            }
            _ => TileError::RasterRead(err.to_string()),
        }
    }
}

/// Result type for raster operations.
pub type Result<T> = std::result::Result<T, RasterError>;
