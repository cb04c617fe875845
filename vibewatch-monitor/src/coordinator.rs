//! Monitoring coordinator.
//!
//! One cycle:
//! 1. read the control file; when stopped, apply indicator overrides and stop there
//! 2. resolve the active scenario and cut its measurement window
//! 3. judge the window and compute its statistics
//! 4. drive the indicator outputs
//! 5. notify on alarm entry
//! 6. publish the status
//!
//! Every failure ends the cycle early and is retried on the next one.

use crate::config::ChannelMap;
use crate::control_plane::{ControlPlane, UpstreamError};
use crate::notifier::{Alert, Notifier};
use chrono::Utc;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use vibewatch_core::{
    judge, trend, Connector, ControlState, ControlStore, IndicatorDriver, JudgeError, ScenarioCatalog, SeriesError,
    SeriesSource, Status, StatusReport, WindowStats, CHANNEL_COUNT,
};

#[derive(Debug, thiserror::Error)]
pub enum CycleError {
    #[error(transparent)]
    Upstream(#[from] UpstreamError),
    #[error("unknown scenario '{0}'")]
    UnknownScenario(String),
    #[error("measurement data unavailable: {0}")]
    Series(#[from] SeriesError),
    #[error(transparent)]
    Judge(#[from] JudgeError),
}

#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    /// Monitor stopped, only overrides were applied.
    Stopped,
    /// No valid sample in the window, nothing changed.
    Skipped { scenario: String },
    Evaluated { scenario: String, status: Status, notified: bool },
}

/// Remembers the last alarm that was notified.
///
/// An alarm is notified once on entry. A different alarm status notifies
/// again, `normal` re-arms the latch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AlarmLatch {
    last_notified: Status,
}

impl AlarmLatch {
    /// Returns `true` when `status` must be notified.
    pub fn observe(&mut self, status: Status) -> bool {
        if !status.is_alarm() {
            self.last_notified = Status::Normal;
            return false;
        }
        if status == self.last_notified {
            return false;
        }
        self.last_notified = status;
        true
    }

    pub fn last_notified(&self) -> Status {
        self.last_notified
    }
}

/// Output states as last read from or acknowledged by the device. `None` is unknown.
#[derive(Debug, Clone, Default)]
struct OutputCache([Option<bool>; CHANNEL_COUNT]);

impl OutputCache {
    fn get(&self, channel: u8) -> Option<bool> {
        self.0.get(channel as usize).copied().flatten()
    }

    fn set(&mut self, channel: u8, on: bool) {
        if let Some(slot) = self.0.get_mut(channel as usize) {
            *slot = Some(on);
        }
    }

    fn forget(&mut self, channel: u8) {
        if let Some(slot) = self.0.get_mut(channel as usize) {
            *slot = None;
        }
    }
}

/// Desired outputs for a judged status, in write order.
pub fn indicator_plan(
    status: Status,
    category: vibewatch_core::Category,
    muted: bool,
    channels: &ChannelMap,
) -> Vec<(u8, bool)> {
    let own = channels.for_category(category);
    let other = channels.for_category(category.other());
    match status {
        Status::ThresholdExceedance => vec![(channels.alarm, !muted), (own, true), (other, false)],
        Status::SlopeViolation => vec![(channels.alarm, true), (own, true), (other, false)],
        Status::Normal => vec![(channels.alarm, false), (channels.exhaust, false), (channels.cooling, false)],
    }
}

pub struct Coordinator<C, P, N, S> {
    driver: IndicatorDriver<C>,
    control: ControlStore,
    plane: P,
    notifier: N,
    source: S,
    catalog: ScenarioCatalog,
    channels: ChannelMap,
    interval: Duration,
    outputs: OutputCache,
    latch: AlarmLatch,
}

impl<C, P, N, S> Coordinator<C, P, N, S>
where
    C: Connector,
    P: ControlPlane,
    N: Notifier,
    S: SeriesSource,
{
    pub fn new(
        driver: IndicatorDriver<C>,
        control: ControlStore,
        plane: P,
        notifier: N,
        source: S,
        catalog: ScenarioCatalog,
    ) -> Self {
        Self {
            driver,
            control,
            plane,
            notifier,
            source,
            catalog,
            channels: ChannelMap::default(),
            interval: Duration::from_secs(5),
            outputs: OutputCache::default(),
            latch: AlarmLatch::default(),
        }
    }

    pub fn with_channels(mut self, channels: ChannelMap) -> Self {
        self.channels = channels;
        self
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn latch(&self) -> AlarmLatch {
        self.latch
    }

    /// Refreshes the output cache from the device. A failed read leaves every output unknown.
    async fn refresh_outputs(&mut self) {
        let driver = self.driver.clone();
        match tokio::task::spawn_blocking(move || driver.try_read_outputs()).await {
            Ok(Ok(state)) => {
                for (channel, on) in state.iter().enumerate() {
                    self.outputs.set(channel as u8, *on);
                }
                debug!("indicator state {:?}", state);
            }
            Ok(Err(e)) => {
                warn!("indicator state unknown, writing every planned output: {}", e);
                self.outputs = OutputCache::default();
            }
            Err(e) => {
                error!("indicator read task failed: {}", e);
                self.outputs = OutputCache::default();
            }
        }
    }

    /// Switches one output unless it is already known to be in that state.
    async fn set_output(&mut self, channel: u8, on: bool) -> bool {
        if self.outputs.get(channel) == Some(on) {
            return true;
        }
        let driver = self.driver.clone();
        let ok = match tokio::task::spawn_blocking(move || driver.write_output(channel, on)).await {
            Ok(ok) => ok,
            Err(e) => {
                error!("indicator write task failed: {}", e);
                false
            }
        };
        if ok {
            self.outputs.set(channel, on);
        } else {
            self.outputs.forget(channel);
        }
        ok
    }

    async fn apply_overrides(&mut self, state: &ControlState) {
        if state.leds.is_empty() {
            return;
        }
        self.refresh_outputs().await;
        for (&channel, &on) in &state.leds {
            if self.outputs.get(channel) == Some(on) {
                continue;
            }
            info!("override: {} lamp (channel {}) {}", self.channels.role(channel), channel, if on { "ON" } else { "OFF" });
            self.set_output(channel, on).await;
        }
    }

    pub async fn run_cycle(&mut self) -> Result<CycleOutcome, CycleError> {
        let state = self.control.load();
        if !state.is_running() {
            self.apply_overrides(&state).await;
            return Ok(CycleOutcome::Stopped);
        }

        let id = self.plane.active_scenario().await?;
        let scenario = self
            .catalog
            .get(&id)
            .cloned()
            .ok_or_else(|| CycleError::UnknownScenario(id.clone()))?;

        let window = self.source.load()?.window(&scenario)?;
        if window.is_empty() {
            info!("scenario {}: no valid sample in window, skipping", id);
            return Ok(CycleOutcome::Skipped { scenario: id });
        }

        let policy = scenario.policy();
        let slope_alarm = trend::slope_alarm(&window.values, scenario.slope_limit);
        let fitted = trend::fit(&window.timestamps, &window.values, policy.upper_bound());
        let status = judge::classify_with(&window.values, policy, slope_alarm)?;
        let stats = WindowStats::compute(&scenario.label, &window.values, &fitted, policy.upper_bound());
        debug!("scenario {}: {} sample(s), status {}, trend {:?}", id, window.len(), status, fitted);

        let muted = self.plane.alarm_muted().await?;

        self.refresh_outputs().await;
        for (channel, on) in indicator_plan(status, scenario.category, muted, &self.channels) {
            self.set_output(channel, on).await;
        }

        let notified = self.latch.observe(status);
        if notified {
            let alert = Alert {
                scenario: id.clone(),
                label: scenario.label.clone(),
                status,
                latest: window.values.last().copied(),
                stats: stats.clone(),
                raised_at: Utc::now(),
            };
            if let Err(e) = self.notifier.notify(&alert).await {
                warn!("alert for scenario {} not delivered: {}", id, e);
            }
        }

        let report = StatusReport { scenario: id.clone(), status, stats };
        self.plane.publish(&report).await?;

        Ok(CycleOutcome::Evaluated { scenario: id, status, notified })
    }

    /// Runs cycles until `shutdown` resolves. Cycle errors are logged, never fatal.
    pub async fn run<F: Future<Output = ()>>(&mut self, shutdown: F) {
        tokio::pin!(shutdown);
        info!("Starting monitoring loop, interval {:?}", self.interval);

        loop {
            match self.run_cycle().await {
                Ok(CycleOutcome::Evaluated { scenario, status, .. }) => info!("scenario {}: {}", scenario, status),
                Ok(outcome) => debug!("cycle outcome {:?}", outcome),
                Err(e) => error!("cycle failed: {}", e),
            }

            tokio::select! {
                _ = &mut shutdown => {
                    info!("Shutdown requested, leaving monitoring loop");
                    break;
                }
                _ = tokio::time::sleep(self.interval) => {}
            }
        }
    }
}
