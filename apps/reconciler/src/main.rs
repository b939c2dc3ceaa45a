//! Tidegate reconciler process: converges remote container resources toward
//! the manifests checked into a directory.

#![forbid(unsafe_code)]

mod reconciler_config;
mod reconciler_services;

use std::time::Duration;

use tidegate_application::{PassReport, ReconcileService};
use tidegate_core::{AppError, AppResult};
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::reconciler_config::ReconcilerConfig;
use crate::reconciler_services::build_reconcile_service;

#[tokio::main]
async fn main() -> Result<(), AppError> {
    dotenvy::dotenv().ok();

    let config = ReconcilerConfig::load()?;
    init_tracing(config.debug);
    config.log_summary();

    let http_client = reqwest::Client::builder()
        .timeout(Duration::from_secs(15))
        .build()
        .map_err(|error| AppError::Internal(format!("failed to build HTTP client: {error}")))?;
    let service = build_reconcile_service(&config, &http_client)?;

    info!(
        location = %config.location,
        reconcile_interval_seconds = config.reconcile_interval_seconds,
        reconcile_once = config.reconcile_once,
        "tidegate-reconciler started"
    );

    if config.reconcile_once {
        return match run_pass(&service).await {
            Some(result) => result.map(|_| ()),
            None => Ok(()),
        };
    }

    let mut interval = tokio::time::interval(Duration::from_secs(config.reconcile_interval_seconds));
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = interval.tick() => {}
            _ = tokio::signal::ctrl_c() => {
                info!("shutdown requested");
                return Ok(());
            }
        }

        if run_pass(&service).await.is_none() {
            return Ok(());
        }
    }
}

/// Runs one pass, returning `None` when shutdown interrupted it.
async fn run_pass(service: &ReconcileService) -> Option<AppResult<PassReport>> {
    let result = tokio::select! {
        result = service.reconcile() => result,
        _ = tokio::signal::ctrl_c() => {
            info!("shutdown requested, cancelling reconciliation pass");
            return None;
        }
    };

    if let Err(error) = &result {
        warn!(error = %error, "reconciliation pass failed");
    }

    Some(result)
}

fn init_tracing(debug: bool) {
    let default_level = if debug { "debug" } else { "info" };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .compact()
        .init();
}
