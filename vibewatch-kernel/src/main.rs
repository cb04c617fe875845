/**
 * VIBEWATCH KERNEL - entry point of the control plane
 *
 * ROLE: loads configuration and the scenario catalog, opens the shared
 * control file and serves the HTTP API used by the dashboard and the monitor.
 *
 * ARCHITECTURE: the kernel never touches the signal light. Operator choices
 * are persisted in the control file; the monitor picks them up on its next cycle.
 */

mod config;
mod health;
mod http;
mod state;

use crate::config::load_config;
use crate::health::HealthTracker;
use crate::http::AppState;
use crate::state::{new_state, ReportBoard};

use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use vibewatch_core::{ControlState, ControlStore, ScenarioCatalog};

#[tokio::main]
async fn main() -> Result<()> {
    // .env is optional
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cfg = load_config().await;

    let catalog = match ScenarioCatalog::load(&cfg.scenarios_file) {
        Ok(catalog) => catalog,
        Err(e) => {
            warn!("[kernel] failed to load {}: {}, using built-in scenarios", cfg.scenarios_file.display(), e);
            ScenarioCatalog::builtin()
        }
    };
    info!("[kernel] {} scenarios available", catalog.list().len());
    if catalog.get(&cfg.default_scenario).is_none() {
        warn!("[kernel] default scenario '{}' is not in the catalog", cfg.default_scenario);
    }

    let store = ControlStore::with_defaults(&cfg.control_file, ControlState::with_scenario(&cfg.default_scenario));
    let current = store.load();
    info!(
        "[kernel] control file {}: monitor {:?}, scenario {}, status {}",
        store.path().display(),
        current.monitor,
        current.scenario,
        current.status
    );

    let app_state = AppState {
        store,
        write_lock: new_state(()),
        catalog: Arc::new(catalog),
        reports: new_state(ReportBoard::default()),
        health_tracker: HealthTracker::new(),
        data_file: cfg.data_file.clone(),
        timestamp_column: cfg.timestamp_column.clone(),
    };

    let app = http::build_router(app_state);

    let listener = TcpListener::bind(&cfg.listen)
        .await
        .with_context(|| format!("failed to bind {}", cfg.listen))?;
    info!("[kernel] listening on http://{}", cfg.listen);
    axum::serve(listener, app).await.context("HTTP server failed")?;
    Ok(())
}
