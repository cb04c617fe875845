//! Vibewatch core - shared building blocks of the pump vibration monitor
//!
//! Used by both processes of the workspace:
//! - `vibewatch-monitor` judges the measurement window and drives the signal light
//! - `vibewatch-kernel` serves the control plane and persists operator choices
//!
//! Modules:
//! - [`status`]: the one status vocabulary every process agrees on
//! - [`scenario`]: monitored windows, columns and limits
//! - [`judge`], [`trend`], [`stats`]: pure analysis of a measurement window
//! - [`series`]: spreadsheet export loading and window extraction
//! - [`control`]: the shared control file
//! - [`indicator`]: serial protocol of the 8-output signal light

pub mod control;
pub mod indicator;
pub mod judge;
pub mod scenario;
pub mod series;
pub mod stats;
pub mod status;
pub mod trend;

pub use control::{ControlState, ControlStore, MonitorMode, StoreError};
pub use indicator::{Channel, Connector, DeviceError, DriverSettings, IndicatorDriver, SerialConnector, CHANNEL_COUNT};
pub use judge::{classify, JudgeError};
pub use scenario::{Band, CatalogError, Category, Scenario, ScenarioCatalog, ThresholdPolicy};
pub use series::{CsvSource, Series, SeriesError, SeriesSource, Window};
pub use stats::{StatusReport, WindowStats};
pub use status::Status;
pub use trend::TrendResult;
