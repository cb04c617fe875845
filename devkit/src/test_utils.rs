/*!
Test harness for monitoring scenarios

Bundles what a monitor test needs:
- a simulated signal light ([`MockIndicator`])
- a control file in a throw-away directory
- expectations on the final indicator outputs
*/

use crate::device_stub::MockIndicator;
use crate::fixtures::SeriesBuilder;
use anyhow::Result;
use serde_json::Value;
use std::collections::HashMap;
use std::path::PathBuf;
use tempfile::TempDir;
use vibewatch_core::{ControlState, ControlStore};

pub struct TestHarness {
    pub device: MockIndicator,
    pub store: ControlStore,
    dir: TempDir,
    expectations: Vec<Expectation>,
}

#[derive(Debug)]
struct Expectation {
    channel: u8,
    on: bool,
}

impl TestHarness {
    pub fn new() -> Result<Self> {
        env_logger::try_init().ok();

        let dir = tempfile::tempdir()?;
        let store = ControlStore::new(dir.path().join("control.json"));
        Ok(Self {
            device: MockIndicator::new(),
            store,
            dir,
            expectations: Vec::new(),
        })
    }

    /// Persists `state` as the starting control record.
    pub fn with_control(self, state: ControlState) -> Result<Self> {
        self.store.save(&state)?;
        log::info!("📝 Control file seeded: scenario {} ({:?})", state.scenario, state.monitor);
        Ok(self)
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    /// Writes the series as a CSV export next to the control file.
    pub fn write_series(&self, name: &str, series: &SeriesBuilder, timestamp_column: &str) -> Result<PathBuf> {
        let path = self.path(name);
        std::fs::write(&path, series.to_csv(timestamp_column)?)?;
        Ok(path)
    }

    pub fn write_file(&self, name: &str, contents: &str) -> Result<PathBuf> {
        let path = self.path(name);
        std::fs::write(&path, contents)?;
        Ok(path)
    }

    pub fn control(&self) -> ControlState {
        self.store.load()
    }

    /// Expects `channel` to end up in state `on`.
    pub fn expect_output(&mut self, channel: u8, on: bool) -> &mut Self {
        self.expectations.push(Expectation { channel, on });
        self
    }

    pub fn verify_expectations(&self) -> Result<()> {
        log::info!("🔍 Verifying {} expectations...", self.expectations.len());
        let outputs = self.device.outputs();

        for expectation in &self.expectations {
            let actual = outputs.get(expectation.channel as usize).copied();
            if actual != Some(expectation.on) {
                anyhow::bail!(
                    "Expectation failed for channel {}: expected {}, got {:?}",
                    expectation.channel, expectation.on, actual
                );
            }
        }
        Ok(())
    }

    /// Asserts a field of the raw control file, `a.b` addresses nested keys.
    pub fn assert_control_field(&self, field_path: &str, expected: &Value) -> Result<()> {
        let raw: Value = serde_json::from_str(&std::fs::read_to_string(self.store.path())?)?;
        match get_nested_field(&raw, field_path) {
            Some(actual) if actual == expected => Ok(()),
            Some(actual) => anyhow::bail!("Field '{}' mismatch: expected {:?}, got {:?}", field_path, expected, actual),
            None => anyhow::bail!("Field '{}' not found in control file", field_path),
        }
    }

    pub fn get_stats(&self) -> TestStats {
        let mut writes_per_channel = HashMap::new();
        for (channel, _) in self.device.writes() {
            *writes_per_channel.entry(channel).or_insert(0) += 1;
        }
        TestStats {
            frames: self.device.events().len(),
            writes_per_channel,
            queries: self.device.query_count(),
            opens: self.device.open_count(),
        }
    }

    /// Forgets traffic and expectations, keeps outputs and the control file.
    pub fn reset(&mut self) {
        self.device.clear();
        self.expectations.clear();
        log::info!("🧹 Test harness reset");
    }
}

fn get_nested_field<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = value;
    for part in path.split('.') {
        current = current.as_object()?.get(part)?;
    }
    Some(current)
}

#[derive(Debug)]
pub struct TestStats {
    pub frames: usize,
    pub writes_per_channel: HashMap<u8, usize>,
    pub queries: usize,
    pub opens: usize,
}
