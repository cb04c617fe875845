//! Alert notifications.
//!
//! The coordinator hands an [`Alert`] to one [`Notifier`] when an alarm is
//! entered. Failures are reported back but never stop a cycle.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, warn};
use vibewatch_core::{Status, WindowStats};

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("{failed} of {total} notifier(s) failed")]
    Partial { failed: usize, total: usize },
}

/// Alarm entry, as sent to every notifier.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Alert {
    pub scenario: String,
    pub label: String,
    pub status: Status,
    /// Most recent sample of the window.
    pub latest: Option<f64>,
    pub stats: Option<WindowStats>,
    pub raised_at: DateTime<Utc>,
}

impl Alert {
    pub fn message(&self) -> String {
        let what = match self.status {
            Status::ThresholdExceedance => "threshold exceeded",
            Status::SlopeViolation => "rising trend over the slope limit",
            Status::Normal => "back to normal",
        };
        let mut msg = format!("[scenario {}] {}: {}", self.scenario, self.label, what);
        if let Some(v) = self.latest {
            msg.push_str(&format!(", latest {:.3}", v));
        }
        if let Some(days) = self.stats.as_ref().and_then(|s| s.days_remaining) {
            msg.push_str(&format!(", ~{:.1} day(s) to the upper bound", days));
        }
        msg
    }
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, alert: &Alert) -> Result<(), NotifyError>;
}

/// Writes alerts to the log.
#[derive(Debug, Clone, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, alert: &Alert) -> Result<(), NotifyError> {
        warn!("🚨 ALERT {}", alert.message());
        Ok(())
    }
}

/// POSTs the alert as JSON, with a human-readable `text` field.
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
}

#[derive(Serialize)]
struct WebhookBody<'a> {
    text: String,
    #[serde(flatten)]
    alert: &'a Alert,
}

impl WebhookNotifier {
    pub fn new(url: &str, timeout: Duration) -> Result<Self, NotifyError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client, url: url.to_string() })
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, alert: &Alert) -> Result<(), NotifyError> {
        let body = WebhookBody { text: alert.message(), alert };
        self.client.post(&self.url).json(&body).send().await?.error_for_status()?;
        debug!("alert delivered to {}", self.url);
        Ok(())
    }
}

/// Fans out to every inner notifier, even when some of them fail.
#[derive(Default)]
pub struct CompositeNotifier {
    notifiers: Vec<Box<dyn Notifier>>,
}

impl CompositeNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, notifier: impl Notifier + 'static) -> Self {
        self.notifiers.push(Box::new(notifier));
        self
    }

    pub fn len(&self) -> usize {
        self.notifiers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.notifiers.is_empty()
    }
}

#[async_trait]
impl Notifier for CompositeNotifier {
    async fn notify(&self, alert: &Alert) -> Result<(), NotifyError> {
        let mut failed = 0;
        for notifier in &self.notifiers {
            if let Err(e) = notifier.notify(alert).await {
                warn!("notifier failed: {}", e);
                failed += 1;
            }
        }
        if failed > 0 {
            return Err(NotifyError::Partial { failed, total: self.notifiers.len() });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn alert() -> Alert {
        Alert {
            scenario: "2".into(),
            label: "cooling".into(),
            status: Status::ThresholdExceedance,
            latest: Some(5.25),
            stats: None,
            raised_at: Utc::now(),
        }
    }

    struct Counting(Arc<AtomicUsize>, bool);

    #[async_trait]
    impl Notifier for Counting {
        async fn notify(&self, _alert: &Alert) -> Result<(), NotifyError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            if self.1 {
                Err(NotifyError::Partial { failed: 1, total: 1 })
            } else {
                Ok(())
            }
        }
    }

    #[test]
    fn test_message_text() {
        let msg = alert().message();
        assert!(msg.contains("scenario 2"));
        assert!(msg.contains("threshold exceeded"));
        assert!(msg.contains("5.250"));
    }

    #[tokio::test]
    async fn test_composite_reaches_everyone() {
        let calls = Arc::new(AtomicUsize::new(0));
        let composite = CompositeNotifier::new()
            .with(Counting(calls.clone(), true))
            .with(LogNotifier)
            .with(Counting(calls.clone(), false));
        assert_eq!(composite.len(), 3);

        let result = composite.notify(&alert()).await;
        assert!(matches!(result, Err(NotifyError::Partial { failed: 1, total: 3 })));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_webhook_failure_is_reported() {
        let hook = WebhookNotifier::new("http://127.0.0.1:9/hook", Duration::from_millis(500)).unwrap();
        assert!(matches!(hook.notify(&alert()).await, Err(NotifyError::Network(_))));
    }

    #[test]
    fn test_webhook_body_shape() {
        let a = alert();
        let body = serde_json::to_value(WebhookBody { text: a.message(), alert: &a }).unwrap();
        assert_eq!(body["status"], "threshold_exceedance");
        assert_eq!(body["scenario"], "2");
        assert!(body["text"].as_str().unwrap().contains("cooling"));
    }
}
