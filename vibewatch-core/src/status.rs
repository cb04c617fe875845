//! Operating-condition status shared by every Vibewatch process.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Result of judging one measurement window.
///
/// The long names are the canonical wire form. The short names written by
/// older deployments (`threshold`, `slope`) are still accepted on input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    #[default]
    Normal,
    #[serde(alias = "threshold")]
    ThresholdExceedance,
    #[serde(alias = "slope")]
    SlopeViolation,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Normal => "normal",
            Status::ThresholdExceedance => "threshold_exceedance",
            Status::SlopeViolation => "slope_violation",
        }
    }

    /// True for every status that raises an alert.
    pub fn is_alarm(&self) -> bool {
        !matches!(self, Status::Normal)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown status: {0}")]
pub struct UnknownStatus(pub String);

impl FromStr for Status {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "normal" => Ok(Status::Normal),
            "threshold_exceedance" | "threshold" => Ok(Status::ThresholdExceedance),
            "slope_violation" | "slope" => Ok(Status::SlopeViolation),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}
