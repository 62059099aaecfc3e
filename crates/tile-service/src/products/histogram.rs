//! Pixel histograms over a layer's colour range.

use serde::{Deserialize, Serialize};
use tile_common::{TileError, TileResult};

/// Number of linear bins.
pub const HISTOGRAM_BINS: usize = 128;

/// Factor by which the colour range is widened about its centre.
pub const RANGE_EXPANSION: f64 = 4.0;

const AUTO_LOW_QUANTILE: f64 = 0.01;
const AUTO_HIGH_QUANTILE: f64 = 0.99;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Histogram {
    /// Colour range the histogram was built around.
    pub vmin: f64,
    pub vmax: f64,
    /// `counts.len() + 1` ascending bin edges.
    pub edges: Vec<f64>,
    pub counts: Vec<u64>,
}

impl Histogram {
    /// Bin finite values over the expanded colour range. Values outside the
    /// outer edges are not counted; the last bin includes its upper edge.
    pub fn build(values: &[f64], vmin: f64, vmax: f64) -> Self {
        let centre = (vmin + vmax) / 2.0;
        let half = (vmax - vmin) / 2.0 * RANGE_EXPANSION;
        let (lo, hi) = (centre - half, centre + half);
        let width = (hi - lo) / HISTOGRAM_BINS as f64;

        let edges: Vec<f64> = (0..=HISTOGRAM_BINS).map(|i| lo + i as f64 * width).collect();
        let mut counts = vec![0u64; HISTOGRAM_BINS];

        for &v in values.iter().filter(|v| v.is_finite()) {
            if v < lo || v > hi {
                continue;
            }
            let bin = (((v - lo) / width) as usize).min(HISTOGRAM_BINS - 1);
            counts[bin] += 1;
        }

        Self {
            vmin,
            vmax,
            edges,
            counts,
        }
    }

    pub fn total(&self) -> u64 {
        self.counts.iter().sum()
    }
}

/// Linearly interpolated quantile of sorted values.
pub fn quantile(sorted: &[f64], q: f64) -> Option<f64> {
    if sorted.is_empty() {
        return None;
    }
    let pos = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let below = pos.floor() as usize;
    let above = pos.ceil() as usize;
    let frac = pos - below as f64;
    Some(sorted[below] + (sorted[above] - sorted[below]) * frac)
}

/// Colour range of a layer: the configured one if complete, otherwise the
/// 1st and 99th percentiles of the finite `values`.
///
/// A zero-width range is widened by one unit on each side.
pub fn colour_range(configured: (Option<f64>, Option<f64>), values: &[f64]) -> TileResult<(f64, f64)> {
    let (lo, hi) = match configured {
        (Some(lo), Some(hi)) => (lo, hi),
        _ => {
            let mut finite: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
            finite.sort_by(f64::total_cmp);
            match (
                quantile(&finite, AUTO_LOW_QUANTILE),
                quantile(&finite, AUTO_HIGH_QUANTILE),
            ) {
                (Some(lo), Some(hi)) => (lo, hi),
                _ => return Err(TileError::NoData("no finite pixels".to_string())),
            }
        }
    };

    if lo == hi {
        Ok((lo - 1.0, hi + 1.0))
    } else {
        Ok((lo.min(hi), lo.max(hi)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quantile_interpolates() {
        let sorted: Vec<f64> = (0..=100).map(f64::from).collect();
        assert_eq!(quantile(&sorted, 0.01), Some(1.0));
        assert_eq!(quantile(&sorted, 0.99), Some(99.0));
        assert_eq!(quantile(&[1.0, 2.0], 0.5), Some(1.5));
        assert_eq!(quantile(&[], 0.5), None);
    }

    #[test]
    fn test_configured_range_wins() {
        let range = colour_range((Some(-5.0), Some(5.0)), &[100.0]).unwrap();
        assert_eq!(range, (-5.0, 5.0));
    }

    #[test]
    fn test_auto_range_ignores_nan() {
        let mut values: Vec<f64> = (0..=100).map(f64::from).collect();
        values.push(f64::NAN);
        let range = colour_range((None, Some(3.0)), &values).unwrap();
        assert_eq!(range, (1.0, 99.0));
    }

    #[test]
    fn test_constant_and_empty_ranges() {
        assert_eq!(colour_range((None, None), &[2.0; 10]).unwrap(), (1.0, 3.0));
        let err = colour_range((None, None), &[f64::NAN]).unwrap_err();
        assert!(err.is_no_data());
    }

    #[test]
    fn test_histogram_spans_expanded_range() {
        let hist = Histogram::build(&[0.0, 0.5, 1.0, 10.0, f64::NAN], 0.0, 1.0);
        assert_eq!(hist.edges.len(), HISTOGRAM_BINS + 1);
        assert_eq!(hist.edges[0], -1.5);
        assert_eq!(hist.edges[HISTOGRAM_BINS], 2.5);
        // 10.0 lies outside, NaN is skipped.
        assert_eq!(hist.total(), 3);
        // 0.5 sits exactly on the centre edge.
        assert_eq!(hist.counts[64], 1);
    }

    #[test]
    fn test_upper_edge_is_inclusive() {
        let hist = Histogram::build(&[2.5], 0.0, 1.0);
        assert_eq!(hist.counts[HISTOGRAM_BINS - 1], 1);
    }
}
