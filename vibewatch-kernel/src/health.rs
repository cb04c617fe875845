use crate::state::{ReportBoard, Shared};
use serde::Serialize;
use std::time::Instant;
use time::format_description::well_known::Rfc3339;
use vibewatch_core::{ControlState, ScenarioCatalog};

#[derive(Debug, Serialize)]
pub struct KernelHealth {
    pub uptime_seconds: u64,
    pub scenarios_loaded: u32,
    pub memory_usage_mb: f32,
    pub last_report_at: Option<String>,
    /// `None` until the monitor has reported once.
    pub last_report_age_seconds: Option<i64>,
    pub control: ControlState,
}

#[derive(Clone)]
pub struct HealthTracker {
    start_time: Instant,
}

impl HealthTracker {
    pub fn new() -> Self {
        Self { start_time: Instant::now() }
    }

    pub fn get_health(&self, catalog: &ScenarioCatalog, reports: &Shared<ReportBoard>, control: ControlState) -> KernelHealth {
        let board = reports.lock();
        KernelHealth {
            uptime_seconds: self.start_time.elapsed().as_secs(),
            scenarios_loaded: catalog.list().len() as u32,
            memory_usage_mb: get_memory_usage_mb(),
            last_report_at: board.received_at.and_then(|at| at.format(&Rfc3339).ok()),
            last_report_age_seconds: board.age_seconds(),
            control,
        }
    }
}

impl Default for HealthTracker {
    fn default() -> Self {
        Self::new()
    }
}

fn get_memory_usage_mb() -> f32 {
    #[cfg(target_os = "linux")]
    {
        if let Ok(status) = std::fs::read_to_string("/proc/self/status") {
            let kb = status
                .lines()
                .find(|line| line.starts_with("VmRSS:"))
                .and_then(|line| line.split_whitespace().nth(1))
                .and_then(|kb| kb.parse::<u64>().ok());
            if let Some(kb) = kb {
                return kb as f32 / 1024.0;
            }
        }
    }
    0.0
}
