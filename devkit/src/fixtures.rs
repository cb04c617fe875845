/*!
Fixtures for monitoring tests

Builders for measurement series and scenarios, so tests describe the data
they need ("a ramp crossing 5.0") instead of hand-writing CSV files.
*/

use anyhow::Result;
use chrono::{NaiveDate, NaiveDateTime, TimeDelta};
use vibewatch_core::{Band, Category, Scenario, ScenarioCatalog, Series};

/// Timestamp helper, panics on an impossible date.
pub fn ts(year: i32, month: u32, day: u32, hour: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(year, month, day)
        .and_then(|d| d.and_hms_opt(hour, 0, 0))
        .unwrap()
}

/// Single-column measurement series with regularly spaced samples.
#[derive(Debug, Clone)]
pub struct SeriesBuilder {
    label: String,
    start: NaiveDateTime,
    step: TimeDelta,
    values: Vec<Option<f64>>,
}

impl SeriesBuilder {
    /// Starts at `start`, one sample per hour.
    pub fn new<S: Into<String>>(label: S, start: NaiveDateTime) -> Self {
        Self { label: label.into(), start, step: TimeDelta::hours(1), values: Vec::new() }
    }

    pub fn every(mut self, step: TimeDelta) -> Self {
        self.step = step;
        self
    }

    pub fn values<I: IntoIterator<Item = f64>>(mut self, values: I) -> Self {
        self.values.extend(values.into_iter().map(Some));
        self
    }

    pub fn constant(self, count: usize, value: f64) -> Self {
        self.values(std::iter::repeat(value).take(count))
    }

    /// `count` samples starting at `from`, rising by `per_sample` each step.
    pub fn ramp(self, count: usize, from: f64, per_sample: f64) -> Self {
        self.values((0..count).map(|i| from + per_sample * i as f64))
    }

    /// One missing sample.
    pub fn gap(mut self) -> Self {
        self.values.push(None);
        self
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn timestamps(&self) -> Vec<NaiveDateTime> {
        (0..self.values.len()).map(|i| self.start + self.step * i as i32).collect()
    }

    pub fn build(&self) -> Series {
        let rows = self.timestamps().into_iter().zip(self.values.iter().map(|v| vec![*v]));
        Series::from_rows([self.label.clone()], rows)
    }

    /// Spreadsheet-style export: `timestamp_column` then the measured column.
    pub fn to_csv(&self, timestamp_column: &str) -> Result<String> {
        let mut writer = csv::Writer::from_writer(Vec::new());
        writer.write_record([timestamp_column, self.label.as_str()])?;
        for (ts, value) in self.timestamps().iter().zip(&self.values) {
            let cell = value.map(|v| v.to_string()).unwrap_or_default();
            writer.write_record([ts.format("%Y-%m-%d %H:%M:%S").to_string(), cell])?;
        }
        Ok(String::from_utf8(writer.into_inner()?)?)
    }
}

/// Scenario with test-friendly defaults: cooling, no limits, slope limit 0.01.
#[derive(Debug, Clone)]
pub struct ScenarioBuilder {
    scenario: Scenario,
}

impl ScenarioBuilder {
    pub fn new(id: &str, label: &str, start: NaiveDateTime, end: NaiveDateTime) -> Self {
        Self {
            scenario: Scenario {
                id: id.to_string(),
                start,
                end,
                column_index: 0,
                label: label.to_string(),
                category: Category::Cooling,
                threshold: None,
                range: None,
                slope_limit: 0.01,
                description: String::new(),
            },
        }
    }

    pub fn category(mut self, category: Category) -> Self {
        self.scenario.category = category;
        self
    }

    pub fn threshold(mut self, limit: f64) -> Self {
        self.scenario.threshold = Some(limit);
        self
    }

    pub fn range(mut self, low: f64, high: f64) -> Self {
        self.scenario.range = Some(Band { low, high });
        self
    }

    pub fn slope_limit(mut self, limit: f64) -> Self {
        self.scenario.slope_limit = limit;
        self
    }

    pub fn column(mut self, index: usize) -> Self {
        self.scenario.column_index = index;
        self
    }

    pub fn build(self) -> Scenario {
        self.scenario
    }
}

pub fn catalog(scenarios: Vec<Scenario>) -> Result<ScenarioCatalog> {
    Ok(ScenarioCatalog::new(scenarios)?)
}
