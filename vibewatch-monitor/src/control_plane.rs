//! Control-plane clients.
//!
//! The coordinator asks the control plane which scenario is active and whether
//! the alarm lamp is muted, and reports each evaluated status back. Two
//! implementations: the kernel's HTTP API, or the shared control file directly.

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;
use vibewatch_core::{ControlStore, StatusReport, StoreError};

#[derive(Debug, thiserror::Error)]
pub enum UpstreamError {
    #[error("control plane unreachable: {0}")]
    Http(#[from] reqwest::Error),
    #[error("unexpected control-plane response: {0}")]
    BadResponse(String),
    #[error("control file error: {0}")]
    Store(#[from] StoreError),
}

#[async_trait]
pub trait ControlPlane: Send + Sync {
    async fn active_scenario(&self) -> Result<String, UpstreamError>;

    async fn alarm_muted(&self) -> Result<bool, UpstreamError>;

    async fn publish(&self, report: &StatusReport) -> Result<(), UpstreamError>;
}

/// Client of the kernel's HTTP endpoints.
#[derive(Debug, Clone)]
pub struct HttpControlPlane {
    client: reqwest::Client,
    base_url: String,
}

#[derive(Deserialize)]
struct PeriodResponse {
    selected: serde_json::Value,
}

#[derive(Deserialize)]
struct MutedResponse {
    #[serde(default)]
    alarm_muted: bool,
}

/// Scenario ids travel as strings, older control planes sent bare numbers.
fn scenario_id(value: &serde_json::Value) -> Result<String, UpstreamError> {
    match value {
        serde_json::Value::String(s) if !s.trim().is_empty() => Ok(s.trim().to_string()),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        other => Err(UpstreamError::BadResponse(format!("invalid scenario id {}", other))),
    }
}

impl HttpControlPlane {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, UpstreamError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client, base_url: base_url.trim_end_matches('/').to_string() })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }
}

#[async_trait]
impl ControlPlane for HttpControlPlane {
    async fn active_scenario(&self) -> Result<String, UpstreamError> {
        let period: PeriodResponse = self
            .client
            .get(self.url("get_period"))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        scenario_id(&period.selected)
    }

    async fn alarm_muted(&self) -> Result<bool, UpstreamError> {
        let muted: MutedResponse = self
            .client
            .get(self.url("get_alarm_muted"))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(muted.alarm_muted)
    }

    async fn publish(&self, report: &StatusReport) -> Result<(), UpstreamError> {
        self.client
            .post(self.url("status"))
            .json(report)
            .send()
            .await?
            .error_for_status()?;
        debug!("status {} published for scenario {}", report.status, report.scenario);
        Ok(())
    }
}

/// Reads and writes the shared control file without going through the kernel.
#[derive(Debug, Clone)]
pub struct FileControlPlane {
    store: ControlStore,
}

impl FileControlPlane {
    pub fn new(store: ControlStore) -> Self {
        Self { store }
    }
}

#[async_trait]
impl ControlPlane for FileControlPlane {
    async fn active_scenario(&self) -> Result<String, UpstreamError> {
        Ok(self.store.load().scenario)
    }

    async fn alarm_muted(&self) -> Result<bool, UpstreamError> {
        Ok(self.store.load().alarm_muted)
    }

    /// Only the status is persisted, the file has no room for statistics.
    async fn publish(&self, report: &StatusReport) -> Result<(), UpstreamError> {
        self.store.update(|state| state.status = report.status)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use vibewatch_core::{ControlState, Status};

    #[test]
    fn test_scenario_id_forms() {
        assert_eq!(scenario_id(&json!("2")).unwrap(), "2");
        assert_eq!(scenario_id(&json!(3)).unwrap(), "3");
        assert!(scenario_id(&json!("")).is_err());
        assert!(scenario_id(&json!(null)).is_err());
    }

    #[test]
    fn test_url_joining() {
        let plane = HttpControlPlane::new("http://127.0.0.1:8000/", Duration::from_secs(1)).unwrap();
        assert_eq!(plane.url("get_period"), "http://127.0.0.1:8000/get_period");
        assert_eq!(plane.url("/status"), "http://127.0.0.1:8000/status");
    }

    #[tokio::test]
    async fn test_unreachable_kernel_is_upstream_error() {
        // nothing listens on the discard port
        let plane = HttpControlPlane::new("http://127.0.0.1:9", Duration::from_millis(500)).unwrap();
        assert!(matches!(plane.active_scenario().await, Err(UpstreamError::Http(_))));
    }

    #[tokio::test]
    async fn test_file_plane_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = ControlStore::new(dir.path().join("control.json"));
        let mut state = ControlState::with_scenario("4");
        state.alarm_muted = true;
        store.save(&state).unwrap();

        let plane = FileControlPlane::new(store.clone());
        assert_eq!(plane.active_scenario().await.unwrap(), "4");
        assert!(plane.alarm_muted().await.unwrap());

        let report = StatusReport { scenario: "4".into(), status: Status::SlopeViolation, stats: None };
        plane.publish(&report).await.unwrap();
        let saved = store.load();
        assert_eq!(saved.status, Status::SlopeViolation);
        assert!(saved.alarm_muted);
    }
}
