//! Measurement series: the spreadsheet export and the per-scenario window cut from it.
//!
//! The export is a CSV table with one timestamp column and one numeric column
//! per measured quantity. Header names are normalised (trimmed, embedded line
//! breaks removed) and cells that are not numbers are treated as missing.

use crate::scenario::Scenario;
use chrono::NaiveDateTime;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Debug, thiserror::Error)]
pub enum SeriesError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("timestamp column '{0}' not found")]
    MissingTimestampColumn(String),
    #[error("column '{label}' (index {index}) not found")]
    ColumnNotFound { label: String, index: usize },
}

const TIMESTAMP_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y/%m/%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y/%m/%d %H:%M",
];

pub fn parse_timestamp(cell: &str) -> Option<NaiveDateTime> {
    let cell = cell.trim();
    TIMESTAMP_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(cell, fmt).ok())
}

fn parse_value(cell: &str) -> Option<f64> {
    cell.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

pub fn normalize_header(name: &str) -> String {
    name.replace(['\n', '\r'], "").trim().to_string()
}

/// Full measurement table, rows in file order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Series {
    headers: Vec<String>,
    timestamps: Vec<NaiveDateTime>,
    /// `columns[c][row]`, aligned with `headers`.
    columns: Vec<Vec<Option<f64>>>,
}

/// Samples of one column inside a scenario window, ordered by time, no gaps.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Window {
    pub timestamps: Vec<NaiveDateTime>,
    pub values: Vec<f64>,
}

impl Window {
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl Series {
    /// Builds a table from already-parsed rows. Every row must have one cell per header.
    pub fn from_rows<S: Into<String>>(
        headers: impl IntoIterator<Item = S>,
        rows: impl IntoIterator<Item = (NaiveDateTime, Vec<Option<f64>>)>,
    ) -> Self {
        let headers: Vec<String> = headers.into_iter().map(|h| normalize_header(&h.into())).collect();
        let mut columns = vec![Vec::new(); headers.len()];
        let mut timestamps = Vec::new();
        for (ts, cells) in rows {
            timestamps.push(ts);
            for (c, column) in columns.iter_mut().enumerate() {
                column.push(cells.get(c).copied().flatten());
            }
        }
        Self { headers, timestamps, columns }
    }

    pub fn from_csv_reader<R: std::io::Read>(reader: R, timestamp_column: &str) -> Result<Self, SeriesError> {
        let mut rdr = csv::ReaderBuilder::new().has_headers(true).flexible(true).from_reader(reader);

        let headers: Vec<String> = rdr.headers()?.iter().map(normalize_header).collect();
        let wanted = normalize_header(timestamp_column);
        let ts_idx = headers
            .iter()
            .position(|h| *h == wanted)
            .ok_or_else(|| SeriesError::MissingTimestampColumn(wanted.clone()))?;

        let mut columns = vec![Vec::new(); headers.len()];
        let mut timestamps = Vec::new();
        let mut skipped = 0usize;

        for record in rdr.records() {
            let record = record?;
            let Some(ts) = record.get(ts_idx).and_then(parse_timestamp) else {
                skipped += 1;
                continue;
            };
            timestamps.push(ts);
            for (c, column) in columns.iter_mut().enumerate() {
                let cell = if c == ts_idx { None } else { record.get(c).and_then(parse_value) };
                column.push(cell);
            }
        }
        if skipped > 0 {
            debug!("skipped {} row(s) without a readable timestamp", skipped);
        }

        Ok(Self { headers, timestamps, columns })
    }

    pub fn from_csv_path<P: AsRef<Path>>(path: P, timestamp_column: &str) -> Result<Self, SeriesError> {
        let file = std::fs::File::open(path)?;
        Self::from_csv_reader(file, timestamp_column)
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn row_count(&self) -> usize {
        self.timestamps.len()
    }

    /// One JSON object per row, keyed by header. Missing cells are `null`,
    /// the timestamp is written as `YYYY-MM-DD HH:MM:SS` under `timestamp_column`.
    pub fn records(&self, timestamp_column: &str) -> Vec<Map<String, Value>> {
        let ts_key = normalize_header(timestamp_column);
        self.timestamps
            .iter()
            .enumerate()
            .map(|(row, ts)| {
                let mut record: Map<String, Value> = self
                    .headers
                    .iter()
                    .zip(&self.columns)
                    .map(|(header, column)| (header.clone(), column[row].map(Value::from).unwrap_or(Value::Null)))
                    .collect();
                record.insert(ts_key.clone(), Value::String(ts.format("%Y-%m-%d %H:%M:%S").to_string()));
                record
            })
            .collect()
    }

    fn column_position(&self, label: &str, index: usize) -> Option<usize> {
        let label = normalize_header(label);
        self.headers
            .iter()
            .position(|h| *h == label)
            .or_else(|| (index < self.headers.len()).then_some(index))
    }

    /// Cuts the scenario's `[start, end)` window out of its column, dropping missing values.
    pub fn window(&self, scenario: &Scenario) -> Result<Window, SeriesError> {
        let col = self
            .column_position(&scenario.label, scenario.column_index)
            .ok_or_else(|| SeriesError::ColumnNotFound {
                label: scenario.label.clone(),
                index: scenario.column_index,
            })?;

        let mut samples: Vec<(NaiveDateTime, f64)> = self
            .timestamps
            .iter()
            .zip(&self.columns[col])
            .filter(|(ts, _)| scenario.contains(**ts))
            .filter_map(|(ts, v)| v.map(|v| (*ts, v)))
            .collect();
        samples.sort_by_key(|(ts, _)| *ts);

        let (timestamps, values) = samples.into_iter().unzip();
        Ok(Window { timestamps, values })
    }
}

/// Where the coordinator pulls the full series from each cycle.
pub trait SeriesSource {
    fn load(&self) -> Result<Series, SeriesError>;
}

/// CSV export on disk, re-read on every call so refreshed files are picked up.
#[derive(Debug, Clone)]
pub struct CsvSource {
    path: PathBuf,
    timestamp_column: String,
}

impl CsvSource {
    pub fn new<P: Into<PathBuf>>(path: P, timestamp_column: &str) -> Self {
        Self { path: path.into(), timestamp_column: timestamp_column.to_string() }
    }
}

impl SeriesSource for CsvSource {
    fn load(&self) -> Result<Series, SeriesError> {
        Series::from_csv_path(&self.path, &self.timestamp_column)
    }
}

impl SeriesSource for Series {
    fn load(&self) -> Result<Series, SeriesError> {
        Ok(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scenario::ScenarioCatalog;

    const CSV: &str = "No,Tag,Timestamp,Note, [排気] cna-13 AR3D[m/s^2] ,\"[冷却] cna-13\nAR3D[m/s^2]\"\n\
1,a,2025-04-02 00:00:00,x,3.1,4.0\n\
2,a,2025-04-03 00:00:00,x,3.2,\n\
3,a,not a date,x,3.3,4.1\n\
4,a,2025/04/04 06:00,x,3.4,n/a\n\
5,a,2025-04-05T00:00:00,x,3.5,4.3\n\
6,a,2025-05-01 00:00:00,x,3.6,9.9\n";

    fn series() -> Series {
        Series::from_csv_reader(CSV.as_bytes(), "Timestamp").unwrap()
    }

    #[test]
    fn test_headers_are_normalised() {
        let s = series();
        assert_eq!(s.headers()[4], "[排気] cna-13 AR3D[m/s^2]");
        assert_eq!(s.headers()[5], "[冷却] cna-13AR3D[m/s^2]");
        assert_eq!(s.row_count(), 5);
    }

    #[test]
    fn test_window_drops_missing_and_respects_end() {
        let s = series();
        let mut scenario = ScenarioCatalog::builtin().get("2").unwrap().clone();
        scenario.label = "[冷却] cna-13AR3D[m/s^2]".into();
        let w = s.window(&scenario).unwrap();
        // 2025-04-03 empty, 2025-04-04 n/a, 2025-05-01 is the exclusive end
        assert_eq!(w.values, vec![4.0, 4.3]);
        assert_eq!(w.len(), 2);
    }

    #[test]
    fn test_column_index_fallback() {
        let s = series();
        let mut scenario = ScenarioCatalog::builtin().get("2").unwrap().clone();
        scenario.label = "missing".into();
        scenario.column_index = 4;
        let w = s.window(&scenario).unwrap();
        assert_eq!(w.values, vec![3.1, 3.2, 3.4, 3.5]);

        scenario.column_index = 42;
        assert!(matches!(s.window(&scenario), Err(SeriesError::ColumnNotFound { .. })));
    }

    #[test]
    fn test_missing_timestamp_column() {
        let err = Series::from_csv_reader("a,b\n1,2\n".as_bytes(), "Timestamp").unwrap_err();
        assert!(matches!(err, SeriesError::MissingTimestampColumn(_)));
    }

    #[test]
    fn test_records_for_display() {
        let s = Series::from_csv_reader(
            "Timestamp,a,b\n2025-04-02 06:30:00,1.5,NaN\n2025/04/03 00:00,inf,\n".as_bytes(),
            "Timestamp",
        )
        .unwrap();
        let records = s.records("Timestamp");
        assert_eq!(records.len(), 2);
        assert_eq!(records[0]["Timestamp"], "2025-04-02 06:30:00");
        assert_eq!(records[0]["a"], 1.5);
        assert!(records[0]["b"].is_null());
        assert_eq!(records[1]["Timestamp"], "2025-04-03 00:00:00");
        assert!(records[1]["a"].is_null());
        assert!(records[1]["b"].is_null());
    }

    #[test]
    fn test_parse_timestamp_formats() {
        assert!(parse_timestamp("2025-04-01 10:00:00").is_some());
        assert!(parse_timestamp("2025-04-01 10:00:00.250").is_some());
        assert!(parse_timestamp("2025/04/01 10:00").is_some());
        assert!(parse_timestamp("01.04.2025").is_none());
    }
}
