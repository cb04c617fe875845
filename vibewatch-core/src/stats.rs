//! Summary statistics published with every status report.

use crate::status::Status;
use crate::trend::TrendResult;
use serde::{Deserialize, Serialize};

/// Body of `POST /status`: the outcome of one evaluated cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusReport {
    pub scenario: String,
    pub status: Status,
    #[serde(default)]
    pub stats: Option<WindowStats>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowStats {
    pub label: String,
    pub count: usize,
    pub max: f64,
    pub min: f64,
    pub mean: f64,
    /// Sample standard deviation (n - 1). `None` below two samples.
    pub stddev: Option<f64>,
    pub slope: Option<f64>,
    pub intercept: Option<f64>,
    pub days_remaining: Option<f64>,
    /// Share of samples below the upper bound, in percent (one decimal).
    pub below_ratio_pct: Option<f64>,
    /// Share of samples at or above the upper bound, in percent (one decimal).
    pub above_ratio_pct: Option<f64>,
}

fn round1(v: f64) -> f64 {
    (v * 10.0).round() / 10.0
}

impl WindowStats {
    /// `None` for an empty window.
    pub fn compute(label: &str, values: &[f64], trend: &TrendResult, upper_bound: Option<f64>) -> Option<Self> {
        if values.is_empty() {
            return None;
        }
        let n = values.len() as f64;
        let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let min = values.iter().copied().fold(f64::INFINITY, f64::min);
        let mean = values.iter().sum::<f64>() / n;
        let stddev = (values.len() > 1).then(|| {
            let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0);
            var.sqrt()
        });

        let (below_ratio_pct, above_ratio_pct) = match upper_bound {
            Some(bound) => {
                let above = values.iter().filter(|v| **v >= bound).count() as f64;
                (Some(round1((n - above) / n * 100.0)), Some(round1(above / n * 100.0)))
            }
            None => (None, None),
        };

        Some(Self {
            label: label.to_string(),
            count: values.len(),
            max,
            min,
            mean,
            stddev,
            slope: trend.slope,
            intercept: trend.intercept,
            days_remaining: trend.days_remaining,
            below_ratio_pct,
            above_ratio_pct,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_stats() {
        let trend = TrendResult { slope: Some(0.1), intercept: Some(2.0), days_remaining: Some(3.0) };
        let s = WindowStats::compute("col", &[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0], &trend, Some(5.0)).unwrap();
        assert_eq!(s.count, 8);
        assert_eq!(s.max, 9.0);
        assert_eq!(s.min, 2.0);
        assert_eq!(s.mean, 5.0);
        assert!((s.stddev.unwrap() - (32.0f64 / 7.0).sqrt()).abs() < 1e-12);
        assert_eq!(s.below_ratio_pct, Some(50.0));
        assert_eq!(s.above_ratio_pct, Some(50.0));
        assert_eq!(s.days_remaining, Some(3.0));
    }

    #[test]
    fn test_edge_cases() {
        assert!(WindowStats::compute("col", &[], &TrendResult::default(), None).is_none());
        let s = WindowStats::compute("col", &[1.0], &TrendResult::default(), None).unwrap();
        assert_eq!(s.stddev, None);
        assert_eq!(s.above_ratio_pct, None);
        let s = WindowStats::compute("col", &[1.0, 2.0, 3.0], &TrendResult::default(), Some(2.5)).unwrap();
        assert_eq!(s.below_ratio_pct, Some(66.7));
        assert_eq!(s.above_ratio_pct, Some(33.3));
    }

    #[test]
    fn test_report_accepts_short_status_and_missing_stats() {
        let report: StatusReport = serde_json::from_str(r#"{"scenario":"2","status":"threshold"}"#).unwrap();
        assert_eq!(report.status, Status::ThresholdExceedance);
        assert!(report.stats.is_none());
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["status"], "threshold_exceedance");
    }
}
