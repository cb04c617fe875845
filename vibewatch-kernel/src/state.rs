use parking_lot::Mutex;
use std::sync::Arc;
use time::OffsetDateTime;
use vibewatch_core::StatusReport;

pub type Shared<T> = Arc<Mutex<T>>;

pub fn new_state<T>(value: T) -> Shared<T> {
    Arc::new(Mutex::new(value))
}

/// Last report posted by the monitor. Kept in memory only, the control file
/// has no room for statistics.
#[derive(Debug, Clone, Default)]
pub struct ReportBoard {
    pub last: Option<StatusReport>,
    pub received_at: Option<OffsetDateTime>,
}

impl ReportBoard {
    pub fn record(&mut self, report: StatusReport) {
        self.last = Some(report);
        self.received_at = Some(OffsetDateTime::now_utc());
    }

    /// Seconds since the last report, `None` before the first one.
    pub fn age_seconds(&self) -> Option<i64> {
        self.received_at
            .map(|at| (OffsetDateTime::now_utc() - at).whole_seconds().max(0))
    }
}
