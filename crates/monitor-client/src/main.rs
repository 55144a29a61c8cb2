//! Monitor Client
//!
//! Dials the Monitor server over mutual TLS and exercises it on a fixed
//! schedule until interrupted.
//!
//! # Startup Flow
//!
//! 1. Load configuration from environment
//! 2. Initialize tracing (OTLP export when a collector is configured)
//! 3. Initialize Prometheus metrics recorder
//! 4. Start the orchestrator (credentials, channel, metrics endpoint, tasks)
//! 5. Wait for shutdown signal, then stop tasks and drain metrics (5s grace)

#![warn(clippy::pedantic)]

use common::observability::init_metrics_recorder;
use common::shutdown::shutdown_signal;
use common::telemetry::{init_tracing, report_startup_error};
use monitor_client::config::Config;
use monitor_client::errors::ClientError;
use monitor_client::lifecycle::{Orchestrator, Schedule};
use tracing::{error, info};

const SERVICE_NAME: &str = "monitor-client";
const DEFAULT_LOG_FILTER: &str = "monitor_client=info,monitor.client=info,common=info";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::from_env().map_err(|e| {
        report_startup_error(SERVICE_NAME, DEFAULT_LOG_FILTER, "Failed to load configuration", &e);
        ClientError::from(e)
    })?;

    let telemetry = init_tracing(
        SERVICE_NAME,
        DEFAULT_LOG_FILTER,
        config.otlp_endpoint.as_deref(),
    )
    .map_err(|e| {
        report_startup_error(SERVICE_NAME, DEFAULT_LOG_FILTER, "Failed to initialize tracing", &e);
        ClientError::from(e)
    })?;

    info!("Starting Monitor client");
    info!(
        server_address = %config.target.address,
        server_name = config.target.server_name.as_deref().unwrap_or("<host>"),
        metrics_bind_address = %config.metrics_bind_address,
        cert_file = %config.tls.cert_file.display(),
        ca_file = %config.tls.ca_file.display(),
        otlp_export = config.otlp_endpoint.is_some(),
        "Configuration loaded successfully"
    );

    // Initialize Prometheus metrics recorder
    // This must happen before any metrics are recorded
    let prometheus_handle = init_metrics_recorder().map_err(|e| {
        error!(error = %e, "Failed to install Prometheus metrics recorder");
        ClientError::Metrics(e)
    })?;

    let orchestrator = Orchestrator::start(&config, prometheus_handle, Schedule::default()).await?;

    info!("Monitor client running - press Ctrl+C to shutdown");
    shutdown_signal().await;

    orchestrator.shutdown().await;

    telemetry.shutdown();
    info!("Monitor client shutdown complete");
    Ok(())
}
