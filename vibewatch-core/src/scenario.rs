//! Scenario catalog: which window of which column is judged against which limits.
//!
//! A scenario is immutable once loaded. The catalog is read from a YAML file
//! shared by the kernel and the monitor; when the file is absent the built-in
//! reference catalog is used.

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use tracing::{info, warn};

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("invalid scenario {id}: {reason}")]
    Invalid { id: String, reason: String },
    #[error("duplicate scenario id: {0}")]
    Duplicate(String),
}

/// Operating phase the measured column belongs to. Each one owns an indicator channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Exhaust,
    Cooling,
}

impl Category {
    pub fn other(&self) -> Category {
        match self {
            Category::Exhaust => Category::Cooling,
            Category::Cooling => Category::Exhaust,
        }
    }
}

/// Closed band `[low, high]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "(f64, f64)", into = "(f64, f64)")]
pub struct Band {
    pub low: f64,
    pub high: f64,
}

impl Band {
    pub fn contains(&self, value: f64) -> bool {
        value >= self.low && value <= self.high
    }
}

impl From<(f64, f64)> for Band {
    fn from((low, high): (f64, f64)) -> Self {
        Band { low, high }
    }
}

impl From<Band> for (f64, f64) {
    fn from(b: Band) -> Self {
        (b.low, b.high)
    }
}

/// Resolved threshold rule. A configured range shadows the single threshold.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ThresholdPolicy {
    Range(Band),
    Single(f64),
    Unbounded,
}

impl ThresholdPolicy {
    pub fn resolve(threshold: Option<f64>, range: Option<Band>) -> Self {
        match (range, threshold) {
            (Some(band), _) => ThresholdPolicy::Range(band),
            (None, Some(t)) => ThresholdPolicy::Single(t),
            (None, None) => ThresholdPolicy::Unbounded,
        }
    }

    /// Value a rising trend is extrapolated towards.
    pub fn upper_bound(&self) -> Option<f64> {
        match self {
            ThresholdPolicy::Range(band) => Some(band.high),
            ThresholdPolicy::Single(t) => Some(*t),
            ThresholdPolicy::Unbounded => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scenario {
    pub id: String,
    /// Inclusive window start.
    pub start: NaiveDateTime,
    /// Exclusive window end.
    pub end: NaiveDateTime,
    /// Zero-based spreadsheet column, used when `label` is not found in the header.
    pub column_index: usize,
    pub label: String,
    pub category: Category,
    #[serde(default)]
    pub threshold: Option<f64>,
    #[serde(default)]
    pub range: Option<Band>,
    /// Index-slope limit above which a slope violation is raised.
    pub slope_limit: f64,
    #[serde(default)]
    pub description: String,
}

impl Scenario {
    pub fn policy(&self) -> ThresholdPolicy {
        ThresholdPolicy::resolve(self.threshold, self.range)
    }

    pub fn contains(&self, ts: NaiveDateTime) -> bool {
        ts >= self.start && ts < self.end
    }

    fn validate(&self) -> Result<(), CatalogError> {
        let invalid = |reason: &str| CatalogError::Invalid { id: self.id.clone(), reason: reason.to_string() };
        if self.id.trim().is_empty() {
            return Err(invalid("empty id"));
        }
        if self.start >= self.end {
            return Err(invalid("window start must precede end"));
        }
        if let Some(band) = self.range {
            if !(band.low <= band.high) {
                return Err(invalid("range low must not exceed high"));
            }
        }
        if !self.slope_limit.is_finite() {
            return Err(invalid("slope limit must be finite"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioCatalog {
    scenarios: Vec<Scenario>,
}

impl ScenarioCatalog {
    pub fn new(scenarios: Vec<Scenario>) -> Result<Self, CatalogError> {
        let mut seen = HashSet::new();
        for s in &scenarios {
            s.validate()?;
            if !seen.insert(s.id.clone()) {
                return Err(CatalogError::Duplicate(s.id.clone()));
            }
        }
        Ok(Self { scenarios })
    }

    pub fn from_yaml(text: &str) -> Result<Self, CatalogError> {
        let parsed: ScenarioCatalog = serde_yaml::from_str(text)?;
        Self::new(parsed.scenarios)
    }

    /// Loads the catalog file, or the built-in catalog when the file does not exist.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, CatalogError> {
        let path = path.as_ref();
        if !path.exists() {
            warn!("no scenario file at {}, using built-in catalog", path.display());
            return Ok(Self::builtin());
        }
        let text = std::fs::read_to_string(path)?;
        let catalog = Self::from_yaml(&text)?;
        info!("loaded {} scenarios from {}", catalog.scenarios.len(), path.display());
        Ok(catalog)
    }

    pub fn get(&self, id: &str) -> Option<&Scenario> {
        self.scenarios.iter().find(|s| s.id == id)
    }

    pub fn list(&self) -> &[Scenario] {
        &self.scenarios
    }

    /// The five reference scenarios of the cna-13 pump.
    pub fn builtin() -> Self {
        const EXHAUST: &str = "[排気] cna-13 AR3D[m/s^2]";
        const COOLING: &str = "[冷却] cna-13 AR3D[m/s^2]";

        let at = |y: i32, m: u32, d: u32, h: u32| {
            NaiveDate::from_ymd_opt(y, m, d)
                .and_then(|date| date.and_hms_opt(h, 0, 0))
                .unwrap_or_default()
        };
        let exhaust = |id: &str, start, end, description: &str| Scenario {
            id: id.to_string(),
            start,
            end,
            column_index: 4,
            label: EXHAUST.to_string(),
            category: Category::Exhaust,
            threshold: Some(4.2),
            range: Some(Band { low: 2.0, high: 4.2 }),
            slope_limit: 0.01,
            description: description.to_string(),
        };
        let cooling = |id: &str, start, end, description: &str| Scenario {
            id: id.to_string(),
            start,
            end,
            column_index: 5,
            label: COOLING.to_string(),
            category: Category::Cooling,
            threshold: Some(5.0),
            range: Some(Band { low: 3.0, high: 5.0 }),
            slope_limit: 0.01,
            description: description.to_string(),
        };

        Self {
            scenarios: vec![
                exhaust("1", at(2025, 2, 10, 10), at(2025, 3, 10, 10),
                    "Out-of-range vibration during roughing; alarms on improper roughing operation."),
                cooling("2", at(2025, 4, 1, 0), at(2025, 5, 1, 0),
                    "Cooling readings creeping upward; alarms before a short-term pump failure."),
                cooling("3", at(2025, 6, 1, 0), at(2025, 7, 1, 0), "Normal operation."),
                exhaust("4", at(2025, 8, 1, 0), at(2025, 9, 1, 0), "August 2025, exhaust phase."),
                cooling("5", at(2025, 8, 1, 0), at(2025, 9, 1, 0), "August 2025, cooling phase."),
            ],
        }
    }
}
