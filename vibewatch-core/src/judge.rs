//! Judgment engine: turns a measurement window into a [`Status`].

use crate::scenario::{Band, ThresholdPolicy};
use crate::status::Status;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum JudgeError {
    #[error("insufficient data: {needed} sample(s) needed, {got} available")]
    InsufficientData { needed: usize, got: usize },
}

/// Classifies `values` against the configured limits.
///
/// First match wins: a value outside the range, then (only when no range is
/// configured) a value above the single threshold, then the slope alarm.
pub fn classify(
    values: &[f64],
    threshold: Option<f64>,
    range: Option<Band>,
    slope_alarm: bool,
) -> Result<Status, JudgeError> {
    classify_with(values, ThresholdPolicy::resolve(threshold, range), slope_alarm)
}

pub fn classify_with(values: &[f64], policy: ThresholdPolicy, slope_alarm: bool) -> Result<Status, JudgeError> {
    if values.is_empty() {
        return Err(JudgeError::InsufficientData { needed: 1, got: 0 });
    }

    let exceeded = match policy {
        ThresholdPolicy::Range(band) => values.iter().any(|v| !band.contains(*v)),
        ThresholdPolicy::Single(limit) => values.iter().any(|v| *v > limit),
        ThresholdPolicy::Unbounded => false,
    };

    Ok(if exceeded {
        Status::ThresholdExceedance
    } else if slope_alarm {
        Status::SlopeViolation
    } else {
        Status::Normal
    })
}
