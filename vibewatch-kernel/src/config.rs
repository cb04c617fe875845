use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::warn;

pub const CONFIG_ENV: &str = "VIBEWATCH_KERNEL_CONFIG";

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct KernelConfig {
    pub listen: String,
    /// Shared with the monitor.
    pub control_file: PathBuf,
    pub scenarios_file: PathBuf,
    /// Measurement export served at `/get_data`.
    pub data_file: PathBuf,
    pub timestamp_column: String,
    /// Scenario selected when the control file does not exist yet.
    pub default_scenario: String,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            listen: "0.0.0.0:8000".into(),
            control_file: PathBuf::from("control.json"),
            scenarios_file: PathBuf::from("scenarios.yaml"),
            data_file: PathBuf::from("data/export.csv"),
            timestamp_column: "Timestamp".into(),
            default_scenario: "1".into(),
        }
    }
}

/// Empty or invalid YAML falls back to the defaults.
pub fn parse_config(txt: &str) -> KernelConfig {
    if txt.trim().is_empty() {
        return KernelConfig::default();
    }
    serde_yaml::from_str(txt).unwrap_or_else(|e| {
        warn!("[kernel] invalid config: {e}");
        KernelConfig::default()
    })
}

pub async fn load_config() -> KernelConfig {
    let path = std::env::var(CONFIG_ENV).unwrap_or_else(|_| "kernel.yaml".into());
    if Path::new(&path).exists() {
        let txt = fs::read_to_string(&path).await.unwrap_or_default();
        parse_config(&txt)
    } else {
        warn!("[kernel] no {path}, using default config");
        KernelConfig::default()
    }
}
