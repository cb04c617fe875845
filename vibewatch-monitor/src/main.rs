//! Vibewatch Monitor - pump vibration monitoring coordinator
//!
//! Periodically judges the active scenario's measurement window and:
//! - drives the alarm and category lamps of the signal light
//! - notifies once per alarm entry
//! - reports the status and window statistics to the control plane
//!
//! Stops evaluating (but keeps applying lamp overrides) while the shared
//! control file says `"monitor": "stopped"`.

mod config;
mod control_plane;
mod coordinator;
mod notifier;

use anyhow::{Context, Result};
use config::{MonitorConfig, PlaneMode};
use control_plane::{ControlPlane, FileControlPlane, HttpControlPlane};
use coordinator::Coordinator;
use notifier::{CompositeNotifier, LogNotifier, WebhookNotifier};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use vibewatch_core::{
    ControlStore, CsvSource, DriverSettings, IndicatorDriver, ScenarioCatalog, SerialConnector,
};

fn build_notifier(config: &MonitorConfig) -> Result<CompositeNotifier> {
    let mut notifier = CompositeNotifier::new().with(LogNotifier);
    if let Some(url) = &config.notify.webhook_url {
        let webhook = WebhookNotifier::new(url, config.control_plane.request_timeout())
            .context("Failed to create webhook notifier")?;
        notifier = notifier.with(webhook);
        info!("Alerts also posted to {}", url);
    }
    Ok(notifier)
}

async fn monitor<P: ControlPlane>(config: MonitorConfig, plane: P) -> Result<()> {
    let catalog = ScenarioCatalog::load(&config.data.scenarios_path)
        .with_context(|| format!("Failed to load scenarios from {}", config.data.scenarios_path.display()))?;

    let connector = SerialConnector::new(&config.serial.port, config.serial.baud_rate, config.serial.read_timeout());
    let driver = IndicatorDriver::new(
        connector,
        DriverSettings {
            attempts: config.serial.attempts,
            poll_interval: config.serial.poll_interval(),
        },
    );

    let mut coordinator = Coordinator::new(
        driver,
        ControlStore::new(&config.control_file),
        plane,
        build_notifier(&config)?,
        CsvSource::new(&config.data.csv_path, &config.data.timestamp_column),
        catalog,
    )
    .with_channels(config.channels)
    .with_interval(config.interval());

    coordinator
        .run(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("Ctrl-C handler unavailable: {}", e);
                std::future::pending::<()>().await;
            }
        })
        .await;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("📈 Vibewatch Monitor starting...");

    let config = MonitorConfig::from_env().context("Failed to load monitor configuration")?;
    info!(
        "Serial {}@{}, control plane {:?}, interval {}s",
        config.serial.port, config.serial.baud_rate, config.control_plane.mode, config.interval_secs
    );

    match config.control_plane.mode {
        PlaneMode::Http => {
            let plane = HttpControlPlane::new(&config.control_plane.base_url, config.control_plane.request_timeout())
                .context("Failed to create control-plane client")?;
            monitor(config, plane).await
        }
        PlaneMode::File => {
            let plane = FileControlPlane::new(ControlStore::new(&config.control_file));
            monitor(config, plane).await
        }
    }
}
