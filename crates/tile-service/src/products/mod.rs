//! Derived products cached through the same provider machinery as tiles.
//!
//! Keys are canonical strings; coordinates are rounded to four decimals
//! before formatting, so equivalent requests share one entry.

mod aperture;
mod builder;
mod codec;
mod histogram;

pub use aperture::{aperture_box, ApertureStats};
pub use builder::ProductBuilder;
pub use codec::ProductCodec;
pub use histogram::{colour_range, quantile, Histogram, HISTOGRAM_BINS, RANGE_EXPANSION};

use serde::{Deserialize, Serialize};
use tile_cache::{CacheKey, Cacheable};
use tile_common::{TileError, TileResult};

/// Identifies a derived product.
#[derive(Debug, Clone, PartialEq)]
pub enum ProductKey {
    Histogram {
        layer_id: String,
    },
    Aperture {
        layer_id: String,
        ra: f64,
        dec: f64,
        radius_arcmin: f64,
    },
}

impl ProductKey {
    pub fn histogram(layer_id: impl Into<String>) -> Self {
        ProductKey::Histogram {
            layer_id: layer_id.into(),
        }
    }

    /// Aperture key with validated, canonicalized coordinates.
    pub fn aperture(layer_id: impl Into<String>, ra: f64, dec: f64, radius_arcmin: f64) -> TileResult<Self> {
        if !ra.is_finite() || !(-180.0..=180.0).contains(&ra) {
            return Err(TileError::invalid_parameter("ra", format!("{} is outside [-180, 180]", ra)));
        }
        if !dec.is_finite() || !(-90.0..=90.0).contains(&dec) {
            return Err(TileError::invalid_parameter("dec", format!("{} is outside [-90, 90]", dec)));
        }
        if !radius_arcmin.is_finite() || radius_arcmin <= 0.0 {
            return Err(TileError::invalid_parameter(
                "radius",
                format!("{} arcmin is not a positive radius", radius_arcmin),
            ));
        }
        Ok(ProductKey::Aperture {
            layer_id: layer_id.into(),
            ra: round4(ra),
            dec: round4(dec),
            radius_arcmin: round4(radius_arcmin),
        })
    }

    pub fn layer_id(&self) -> &str {
        match self {
            ProductKey::Histogram { layer_id } | ProductKey::Aperture { layer_id, .. } => layer_id,
        }
    }

    /// Label used in logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            ProductKey::Histogram { .. } => "histogram",
            ProductKey::Aperture { .. } => "aperture",
        }
    }
}

fn round4(value: f64) -> f64 {
    (value * 1e4).round() / 1e4
}

impl CacheKey for ProductKey {
    fn hash(&self) -> String {
        match self {
            ProductKey::Histogram { layer_id } => format!("hist-{}", layer_id),
            ProductKey::Aperture {
                layer_id,
                ra,
                dec,
                radius_arcmin,
            } => format!("aperture-{}-{:08.4}-{:+07.4}-{:.4}", layer_id, ra, dec, radius_arcmin),
        }
    }
}

/// Computed content of a product.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProductPayload {
    Histogram(Histogram),
    Aperture(ApertureStats),
}

/// A cached analysis artifact.
#[derive(Debug, Clone)]
pub struct DerivedProduct {
    pub key: ProductKey,
    pub payload: ProductPayload,
    pub grant: Option<String>,
    pub provenance: String,
}

impl DerivedProduct {
    pub fn new(key: ProductKey, payload: ProductPayload, grant: Option<String>) -> Self {
        Self {
            key,
            payload,
            grant,
            provenance: String::new(),
        }
    }

    pub fn histogram(&self) -> Option<&Histogram> {
        match &self.payload {
            ProductPayload::Histogram(h) => Some(h),
            _ => None,
        }
    }

    pub fn aperture(&self) -> Option<&ApertureStats> {
        match &self.payload {
            ProductPayload::Aperture(a) => Some(a),
            _ => None,
        }
    }
}

impl Cacheable for DerivedProduct {
    type Key = ProductKey;

    fn key(&self) -> ProductKey {
        self.key.clone()
    }

    fn grant(&self) -> Option<&str> {
        self.grant.as_deref()
    }

    fn provenance(&self) -> &str {
        &self.provenance
    }

    fn with_provenance(mut self, provenance: &str) -> Self {
        self.provenance = provenance.to_string();
        self
    }
}
