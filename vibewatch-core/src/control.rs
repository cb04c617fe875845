/**
 * SHARED CONTROL STATE - the only channel between kernel, monitor and display
 *
 * ROLE:
 * One small JSON record on disk, read and written by independent processes.
 *
 * HOW IT WORKS:
 * - load(): last persisted record, or the default record if absent/corrupt
 * - save(): write to a temp file in the same directory, then rename over
 * - update(): full load-mutate-save, last writer wins
 *
 * LAYOUT:
 * ```json
 * {
 *   "monitor": "running",
 *   "scenario": "2",
 *   "leds": { "1": true, "5": false },
 *   "alarm_muted": false,
 *   "status": "normal"
 * }
 * ```
 */

use crate::status::Status;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::warn;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("failed to replace {path}: {source}")]
    Persist { path: PathBuf, source: std::io::Error },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MonitorMode {
    #[default]
    Running,
    Stopped,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlState {
    pub monitor: MonitorMode,
    pub scenario: String,
    /// Indicator overrides applied while the monitor is stopped, channel -> on.
    #[serde(default)]
    pub leds: BTreeMap<u8, bool>,
    #[serde(default)]
    pub alarm_muted: bool,
    #[serde(default)]
    pub status: Status,
}

impl ControlState {
    pub fn with_scenario(scenario: &str) -> Self {
        Self {
            monitor: MonitorMode::Running,
            scenario: scenario.to_string(),
            leds: BTreeMap::new(),
            alarm_muted: false,
            status: Status::Normal,
        }
    }

    pub fn is_running(&self) -> bool {
        self.monitor == MonitorMode::Running
    }
}

impl Default for ControlState {
    /// Monitor running, scenario "1", no overrides, not muted, status normal.
    fn default() -> Self {
        Self::with_scenario("1")
    }
}

/// File-backed [`ControlState`]. Cheap to clone; holds only paths.
#[derive(Debug, Clone)]
pub struct ControlStore {
    path: PathBuf,
    defaults: ControlState,
}

impl ControlStore {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self::with_defaults(path, ControlState::default())
    }

    pub fn with_defaults<P: Into<PathBuf>>(path: P, defaults: ControlState) -> Self {
        Self { path: path.into(), defaults }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn defaults(&self) -> &ControlState {
        &self.defaults
    }

    /// Never fails: a missing or unreadable record yields the defaults.
    pub fn load(&self) -> ControlState {
        let text = match std::fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return self.defaults.clone(),
            Err(e) => {
                warn!("control file {} unreadable ({}), using defaults", self.path.display(), e);
                return self.defaults.clone();
            }
        };
        match serde_json::from_str(&text) {
            Ok(state) => state,
            Err(e) => {
                warn!("control file {} corrupt ({}), using defaults", self.path.display(), e);
                self.defaults.clone()
            }
        }
    }

    /// Atomically replaces the persisted record.
    pub fn save(&self, state: &ControlState) -> Result<(), StoreError> {
        let dir = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&dir)?;

        let content = serde_json::to_vec_pretty(state)?;
        let mut tmp = tempfile::NamedTempFile::new_in(&dir)?;
        tmp.write_all(&content)?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path).map_err(|e| StoreError::Persist {
            path: self.path.clone(),
            source: e.error,
        })?;
        Ok(())
    }

    /// Load, apply `f`, save. Returns the record that was written.
    pub fn update<F: FnOnce(&mut ControlState)>(&self, f: F) -> Result<ControlState, StoreError> {
        let mut state = self.load();
        f(&mut state);
        self.save(&state)?;
        Ok(state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> (tempfile::TempDir, ControlStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = ControlStore::new(dir.path().join("control.json"));
        (dir, store)
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let (_dir, store) = store();
        assert_eq!(store.load(), ControlState::default());
        assert!(store.load().is_running());
    }

    #[test]
    fn test_corrupt_file_yields_defaults() {
        let (_dir, store) = store();
        for junk in ["", "{", "[]", "{\"monitor\":\"paused\",\"scenario\":\"1\"}", "stop"] {
            std::fs::write(store.path(), junk).unwrap();
            assert_eq!(store.load(), ControlState::default(), "input {junk:?}");
        }
    }

    #[test]
    fn test_save_then_load() {
        let (_dir, store) = store();
        let mut state = ControlState::with_scenario("3");
        state.monitor = MonitorMode::Stopped;
        state.leds.insert(5, true);
        state.alarm_muted = true;
        state.status = Status::SlopeViolation;
        store.save(&state).unwrap();
        assert_eq!(store.load(), state);
    }

    #[test]
    fn test_persisted_layout() {
        let (_dir, store) = store();
        store.update(|s| {
            s.leds.insert(1, true);
            s.status = Status::ThresholdExceedance;
        }).unwrap();
        let raw: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(store.path()).unwrap()).unwrap();
        assert_eq!(raw["monitor"], "running");
        assert_eq!(raw["leds"]["1"], true);
        assert_eq!(raw["status"], "threshold_exceedance");
        assert_eq!(raw["alarm_muted"], false);
    }

    #[test]
    fn test_partial_record_fills_optional_fields() {
        let (_dir, store) = store();
        std::fs::write(store.path(), r#"{"monitor":"stopped","scenario":"4","status":"threshold"}"#).unwrap();
        let state = store.load();
        assert_eq!(state.monitor, MonitorMode::Stopped);
        assert_eq!(state.scenario, "4");
        assert_eq!(state.status, Status::ThresholdExceedance);
        assert!(state.leds.is_empty());
    }

    #[test]
    fn test_custom_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let store = ControlStore::with_defaults(dir.path().join("c.json"), ControlState::with_scenario("2"));
        assert_eq!(store.load().scenario, "2");
    }
}
