//! Error types for sky tile services.

use thiserror::Error;

/// Result type alias using TileError.
pub type TileResult<T> = Result<T, TileError>;

/// Primary error type for tile, cutout and derived-product operations.
///
/// `NotFound` deliberately covers both "absent" and "present but restricted by
/// grant" so callers can never learn that proprietary data exists.
#[derive(Debug, Error)]
pub enum TileError {
    // === Lookup outcomes ===
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("No data: {0}")]
    NoData(String),

    // === Validation errors ===
    #[error("Invalid parameter value for '{param}': {message}")]
    InvalidParameter { param: String, message: String },

    #[error("Invalid bounding box: {0}")]
    InvalidBbox(String),

    #[error("Invalid grants: {0}")]
    InvalidGrants(String),

    #[error("Invalid tile address: {0}")]
    InvalidAddress(String),

    // === Data errors ===
    #[error("Failed to read raster: {0}")]
    RasterRead(String),

    #[error("Ingestion failed: {0}")]
    Ingestion(String),

    // === Cache errors ===
    #[error("Cache error: {0}")]
    CacheError(String),

    #[error("Failed to decode cached value: {0}")]
    Decode(String),

    // === Infrastructure errors ===
    #[error("Request timeout")]
    Timeout,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl TileError {
    /// Shorthand for a `NotFound` error.
    pub fn not_found(what: impl Into<String>) -> Self {
        TileError::NotFound(what.into())
    }

    /// Shorthand for an `InvalidParameter` error.
    pub fn invalid_parameter(param: impl Into<String>, message: impl Into<String>) -> Self {
        TileError::InvalidParameter {
            param: param.into(),
            message: message.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, TileError::NotFound(_))
    }

    pub fn is_no_data(&self) -> bool {
        matches!(self, TileError::NoData(_))
    }

    /// True for errors raised by boundary validation, before any provider is consulted.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            TileError::InvalidParameter { .. }
                | TileError::InvalidBbox(_)
                | TileError::InvalidGrants(_)
                | TileError::InvalidAddress(_)
        )
    }

    /// Get the HTTP status code the routing layer should answer with.
    ///
    /// `NoData` is a successful response with an empty payload.
    pub fn http_status_code(&self) -> u16 {
        match self {
            TileError::InvalidParameter { .. }
            | TileError::InvalidBbox(_)
            | TileError::InvalidGrants(_)
            | TileError::InvalidAddress(_) => 400,

            TileError::NotFound(_) => 404,

            TileError::NoData(_) => 200,

            TileError::Timeout => 504,

            _ => 500,
        }
    }
}

impl From<std::io::Error> for TileError {
    fn from(err: std::io::Error) -> Self {
        TileError::Internal(err.to_string())
    }
}

impl From<serde_json::Error> for TileError {
    fn from(err: serde_json::Error) -> Self {
        TileError::Decode(format!("JSON error: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(TileError::not_found("tile").http_status_code(), 404);
        assert_eq!(TileError::NoData("aperture".into()).http_status_code(), 200);
        assert_eq!(TileError::InvalidBbox("nan".into()).http_status_code(), 400);
        assert_eq!(TileError::Timeout.http_status_code(), 504);
        assert_eq!(TileError::CacheError("down".into()).http_status_code(), 500);
    }

    #[test]
    fn test_validation_classification() {
        assert!(TileError::invalid_parameter("level", "negative").is_validation());
        assert!(TileError::InvalidGrants("empty".into()).is_validation());
        assert!(!TileError::not_found("x").is_validation());
        assert!(!TileError::NoData("x".into()).is_not_found());
    }
}
