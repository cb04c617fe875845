//! Trend estimation.
//!
//! Two independent least-squares estimators live here:
//! - [`fit`] regresses values on elapsed days and extrapolates when the rising
//!   trend will cross its upper bound;
//! - [`slope_alarm`] regresses values on the raw sample index and raises the
//!   slope alarm flag.
//!
//! They normalise differently (per day vs per sample) and are allowed to disagree.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

const SECONDS_PER_DAY: f64 = 86_400.0;

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct TrendResult {
    /// Value units per day. `None` for degenerate input.
    pub slope: Option<f64>,
    pub intercept: Option<f64>,
    /// Days until the trend line reaches the bound, measured from the last
    /// sample. `None` when the trend is flat/falling or no bound is known.
    pub days_remaining: Option<f64>,
}

/// Ordinary least squares of `ys` on `xs`. Returns `(slope, intercept)`.
fn least_squares(xs: &[f64], ys: &[f64]) -> Option<(f64, f64)> {
    let n = xs.len().min(ys.len());
    if n < 2 {
        return None;
    }
    let nf = n as f64;
    let x_mean = xs[..n].iter().sum::<f64>() / nf;
    let y_mean = ys[..n].iter().sum::<f64>() / nf;

    let (mut sxy, mut sxx) = (0.0, 0.0);
    for (x, y) in xs[..n].iter().zip(&ys[..n]) {
        let dx = x - x_mean;
        sxy += dx * (y - y_mean);
        sxx += dx * dx;
    }
    if sxx == 0.0 || !sxx.is_finite() {
        return None;
    }
    let slope = sxy / sxx;
    Some((slope, y_mean - slope * x_mean))
}

/// Fractional days elapsed since the first timestamp.
pub fn elapsed_days(timestamps: &[NaiveDateTime]) -> Vec<f64> {
    let Some(first) = timestamps.first() else { return Vec::new() };
    timestamps
        .iter()
        .map(|ts| (*ts - *first).num_milliseconds() as f64 / 1000.0 / SECONDS_PER_DAY)
        .collect()
}

/// Regresses `values` on elapsed days and extrapolates towards `upper_bound`.
///
/// Pairs beyond the shorter of the two slices are ignored.
pub fn fit(timestamps: &[NaiveDateTime], values: &[f64], upper_bound: Option<f64>) -> TrendResult {
    let n = timestamps.len().min(values.len());
    let xs = elapsed_days(&timestamps[..n]);
    let Some((slope, intercept)) = least_squares(&xs, &values[..n]) else {
        return TrendResult::default();
    };

    let days_remaining = match upper_bound {
        Some(bound) if slope > 0.0 => {
            let x_cross = (bound - intercept) / slope;
            let x_now = xs.last().copied().unwrap_or(0.0);
            Some((x_cross - x_now).max(0.0))
        }
        _ => None,
    };

    TrendResult { slope: Some(slope), intercept: Some(intercept), days_remaining }
}

/// Slope of `values` against their sample index (0, 1, 2, ...).
pub fn index_slope(values: &[f64]) -> Option<f64> {
    let xs: Vec<f64> = (0..values.len()).map(|i| i as f64).collect();
    least_squares(&xs, values).map(|(slope, _)| slope)
}

/// True when the index slope exceeds `limit`. Fewer than two samples never alarm.
pub fn slope_alarm(values: &[f64], limit: f64) -> bool {
    index_slope(values).is_some_and(|slope| slope > limit)
}
