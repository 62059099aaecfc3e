//! Statistics inside a circular aperture.

use serde::{Deserialize, Serialize};
use tile_common::{BoundingBox, TileData, TileError, TileResult};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApertureStats {
    pub mean: f64,
    /// Population standard deviation.
    pub std: f64,
    pub min: f64,
    pub max: f64,
    /// Finite pixels inside the mask.
    pub pixels: usize,
}

impl ApertureStats {
    /// Statistics over the finite pixels of `data` inside a centred circle
    /// of radius `rows / 2`. Fails with `NoData` if there are none.
    pub fn measure(data: &TileData) -> TileResult<Self> {
        let (width, height) = (data.width(), data.height());
        let (cx, cy) = (width as f64 / 2.0, height as f64 / 2.0);
        let radius = height as f64 / 2.0;
        let values = data.values_f64();

        let inside: Vec<f64> = values
            .iter()
            .enumerate()
            .filter(|(i, v)| {
                let dx = (i % width) as f64 + 0.5 - cx;
                let dy = (i / width) as f64 + 0.5 - cy;
                v.is_finite() && dx * dx + dy * dy <= radius * radius
            })
            .map(|(_, v)| *v)
            .collect();

        if inside.is_empty() {
            return Err(TileError::NoData("no valid pixels in aperture".to_string()));
        }

        let n = inside.len() as f64;
        let mean = inside.iter().sum::<f64>() / n;
        let variance = inside.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
        let min = inside.iter().copied().fold(f64::INFINITY, f64::min);
        let max = inside.iter().copied().fold(f64::NEG_INFINITY, f64::max);

        Ok(Self {
            mean,
            std: variance.sqrt(),
            min,
            max,
            pixels: inside.len(),
        })
    }
}

/// Square box of half-width `radius_arcmin` around a point.
pub fn aperture_box(ra: f64, dec: f64, radius_arcmin: f64) -> BoundingBox {
    let r = radius_arcmin / 60.0;
    BoundingBox::new(ra - r, ra + r, dec + r, dec - r)
}
