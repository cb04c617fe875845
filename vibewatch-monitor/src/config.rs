//! Monitor configuration
//!
//! Handles:
//! - loop timing and data file locations
//! - serial link to the signal light
//! - indicator channel roles
//! - control-plane endpoint and notifications
//!
//! Read from a TOML file whose path comes from `VIBEWATCH_MONITOR_CONFIG`.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use vibewatch_core::{Category, CHANNEL_COUNT};

pub const CONFIG_ENV: &str = "VIBEWATCH_MONITOR_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "vibewatch-monitor.toml";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Pause between two cycles.
    pub interval_secs: u64,
    /// Shared control file, also read by the kernel.
    pub control_file: PathBuf,
    pub data: DataConfig,
    pub serial: SerialConfig,
    pub channels: ChannelMap,
    pub control_plane: ControlPlaneConfig,
    pub notify: NotifyConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    pub csv_path: PathBuf,
    pub timestamp_column: String,
    pub scenarios_path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialConfig {
    pub port: String,
    pub baud_rate: u32,
    /// Longest blocking read, capped at the poll interval.
    pub timeout_ms: u64,
    /// Reply polls per command.
    pub attempts: u32,
    pub poll_interval_ms: u64,
}

/// Role of each indicator output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelMap {
    pub alarm: u8,
    pub exhaust: u8,
    pub cooling: u8,
    /// Month-report lamp, only driven through stopped-mode overrides.
    pub report: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaneMode {
    #[default]
    Http,
    File,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlPlaneConfig {
    pub mode: PlaneMode,
    pub base_url: String,
    pub request_timeout_ms: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifyConfig {
    /// JSON alerts are POSTed here when set.
    pub webhook_url: Option<String>,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            interval_secs: 5,
            control_file: PathBuf::from("control.json"),
            data: DataConfig::default(),
            serial: SerialConfig::default(),
            channels: ChannelMap::default(),
            control_plane: ControlPlaneConfig::default(),
            notify: NotifyConfig::default(),
        }
    }
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            csv_path: PathBuf::from("data/export.csv"),
            timestamp_column: "Timestamp".to_string(),
            scenarios_path: PathBuf::from("scenarios.yaml"),
        }
    }
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: "/dev/ttyUSB0".to_string(),
            baud_rate: 9600,
            timeout_ms: 1000,
            attempts: 10,
            poll_interval_ms: 200,
        }
    }
}

impl Default for ChannelMap {
    fn default() -> Self {
        Self { alarm: 1, exhaust: 3, cooling: 4, report: 5 }
    }
}

impl Default for ControlPlaneConfig {
    fn default() -> Self {
        Self {
            mode: PlaneMode::Http,
            base_url: "http://127.0.0.1:8000".to_string(),
            request_timeout_ms: 3000,
        }
    }
}

impl ChannelMap {
    pub fn for_category(&self, category: Category) -> u8 {
        match category {
            Category::Exhaust => self.exhaust,
            Category::Cooling => self.cooling,
        }
    }

    /// Role name for logs.
    pub fn role(&self, channel: u8) -> &'static str {
        if channel == self.alarm {
            "alarm"
        } else if channel == self.exhaust {
            "exhaust"
        } else if channel == self.cooling {
            "cooling"
        } else if channel == self.report {
            "report"
        } else {
            "spare"
        }
    }

    /// Every role needs its own output in range.
    fn validate(&self) -> Result<()> {
        let roles = [
            ("alarm", self.alarm),
            ("exhaust", self.exhaust),
            ("cooling", self.cooling),
            ("report", self.report),
        ];
        for (i, (name, channel)) in roles.iter().enumerate() {
            if *channel as usize >= CHANNEL_COUNT {
                anyhow::bail!("channel '{}' = {} is out of range 0..{}", name, channel, CHANNEL_COUNT);
            }
            if let Some((other, _)) = roles[..i].iter().find(|(_, c)| c == channel) {
                anyhow::bail!("channels '{}' and '{}' both use output {}", other, name, channel);
            }
        }
        Ok(())
    }
}

impl MonitorConfig {
    /// Missing file gives the defaults, an unreadable or invalid one is an error.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let config = if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            toml::from_str(&content).with_context(|| format!("Invalid configuration in {}", path.display()))?
        } else {
            tracing::info!("No configuration at {}, using defaults", path.display());
            Self::default()
        };
        config.validate()?;
        Ok(config)
    }

    pub fn from_env() -> Result<Self> {
        let path = std::env::var(CONFIG_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        Self::load(path)
    }

    fn validate(&self) -> Result<()> {
        if self.interval_secs == 0 {
            anyhow::bail!("interval_secs must be at least 1");
        }
        self.channels.validate()
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

impl SerialConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Read timeout of the port. One command then lasts at most about `attempts` poll intervals.
    pub fn read_timeout(&self) -> Duration {
        self.timeout().min(self.poll_interval())
    }
}

impl ControlPlaneConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = MonitorConfig::load(dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.interval_secs, 5);
        assert_eq!(config.serial.baud_rate, 9600);
        assert_eq!(config.serial.attempts, 10);
        assert_eq!(config.channels, ChannelMap { alarm: 1, exhaust: 3, cooling: 4, report: 5 });
        assert_eq!(config.control_plane.mode, PlaneMode::Http);
        assert!(config.notify.webhook_url.is_none());
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("monitor.toml");
        std::fs::write(
            &path,
            r#"
interval_secs = 10

[serial]
port = "COM4"

[control_plane]
mode = "file"

[notify]
webhook_url = "http://hooks.local/pump"
"#,
        )
        .unwrap();

        let config = MonitorConfig::load(&path).unwrap();
        assert_eq!(config.interval(), Duration::from_secs(10));
        assert_eq!(config.serial.port, "COM4");
        assert_eq!(config.serial.timeout(), Duration::from_millis(1000));
        assert_eq!(config.control_plane.mode, PlaneMode::File);
        assert_eq!(config.control_plane.base_url, "http://127.0.0.1:8000");
        assert_eq!(config.notify.webhook_url.as_deref(), Some("http://hooks.local/pump"));
    }

    #[test]
    fn test_invalid_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("monitor.toml");
        std::fs::write(&path, "interval_secs = \"soon\"").unwrap();
        assert!(MonitorConfig::load(&path).is_err());

        std::fs::write(&path, "[channels]\nalarm = 9").unwrap();
        assert!(MonitorConfig::load(&path).is_err());
    }

    #[test]
    fn test_shared_output_or_zero_interval_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("monitor.toml");

        std::fs::write(&path, "[channels]\nalarm = 3\nexhaust = 3").unwrap();
        let err = MonitorConfig::load(&path).unwrap_err();
        assert!(err.to_string().contains("'alarm' and 'exhaust'"), "{err}");

        std::fs::write(&path, "[channels]\nreport = 4").unwrap();
        assert!(MonitorConfig::load(&path).is_err());

        std::fs::write(&path, "interval_secs = 0").unwrap();
        assert!(MonitorConfig::load(&path).is_err());

        std::fs::write(&path, "[channels]\nreport = 6").unwrap();
        assert_eq!(MonitorConfig::load(&path).unwrap().channels.report, 6);
    }

    #[test]
    fn test_read_timeout_capped_by_poll_interval() {
        let mut serial = SerialConfig::default();
        assert_eq!(serial.read_timeout(), Duration::from_millis(200));
        serial.poll_interval_ms = 2000;
        assert_eq!(serial.read_timeout(), Duration::from_millis(1000));
    }

    #[test]
    fn test_channel_roles() {
        let map = ChannelMap::default();
        assert_eq!(map.for_category(Category::Exhaust), 3);
        assert_eq!(map.for_category(Category::Cooling), 4);
        assert_eq!(map.role(5), "report");
        assert_eq!(map.role(7), "spare");
    }
}
