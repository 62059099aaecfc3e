//! Sky-space bounding boxes.

use serde::{Deserialize, Serialize};

use crate::error::{TileError, TileResult};

/// A rectangle in world space, in degrees.
///
/// `left`/`right` run along the longitude-like axis (RA, -180 to 180) and
/// `top`/`bottom` along the latitude-like axis (Dec, -90 to 90).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub left: f64,
    pub right: f64,
    pub top: f64,
    pub bottom: f64,
}

impl BoundingBox {
    pub fn new(left: f64, right: f64, top: f64, bottom: f64) -> Self {
        Self {
            left,
            right,
            top,
            bottom,
        }
    }

    /// The whole sky.
    pub fn full_sky() -> Self {
        Self::new(-180.0, 180.0, 90.0, -90.0)
    }

    /// Reject non-finite or zero-area boxes.
    pub fn validate(&self) -> TileResult<()> {
        let edges = [self.left, self.right, self.top, self.bottom];
        if edges.iter().any(|v| !v.is_finite()) {
            return Err(TileError::InvalidBbox(format!(
                "non-finite edge in {}",
                self.cache_key()
            )));
        }
        if self.left == self.right || self.top == self.bottom {
            return Err(TileError::InvalidBbox(format!(
                "degenerate box {}",
                self.cache_key()
            )));
        }
        Ok(())
    }

    /// Swap reversed edges so that `left < right` and `bottom < top`.
    pub fn normalized(&self) -> Self {
        Self {
            left: self.left.min(self.right),
            right: self.left.max(self.right),
            top: self.top.max(self.bottom),
            bottom: self.top.min(self.bottom),
        }
    }

    /// Width in degrees (assumes a normalized box).
    pub fn width(&self) -> f64 {
        self.right - self.left
    }

    /// Height in degrees (assumes a normalized box).
    pub fn height(&self) -> f64 {
        self.top - self.bottom
    }

    /// Check if this box overlaps another with non-zero area.
    pub fn intersects(&self, other: &BoundingBox) -> bool {
        self.left < other.right
            && self.right > other.left
            && self.bottom < other.top
            && self.top > other.bottom
    }

    /// Cache key fragment, quantized to avoid floating point noise.
    pub fn cache_key(&self) -> String {
        format!(
            "{:.6}_{:.6}_{:.6}_{:.6}",
            self.left, self.right, self.top, self.bottom
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_swaps_reversed_edges() {
        let bbox = BoundingBox::new(10.0, -10.0, -5.0, 5.0).normalized();
        assert_eq!(bbox, BoundingBox::new(-10.0, 10.0, 5.0, -5.0));
        assert_eq!(bbox.width(), 20.0);
        assert_eq!(bbox.height(), 10.0);
    }

    #[test]
    fn test_validate() {
        assert!(BoundingBox::full_sky().validate().is_ok());
        assert!(BoundingBox::new(f64::NAN, 1.0, 1.0, 0.0).validate().is_err());
        assert!(BoundingBox::new(0.0, f64::INFINITY, 1.0, 0.0).validate().is_err());
        assert!(BoundingBox::new(1.0, 1.0, 1.0, 0.0).validate().is_err());
    }

    #[test]
    fn test_intersects() {
        let a = BoundingBox::new(0.0, 10.0, 10.0, 0.0);
        let b = BoundingBox::new(5.0, 15.0, 15.0, 5.0);
        let c = BoundingBox::new(10.0, 20.0, 10.0, 0.0);
        assert!(a.intersects(&b));
        assert!(!a.intersects(&c));
    }
}
