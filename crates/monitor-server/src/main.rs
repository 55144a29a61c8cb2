//! Monitor Server
//!
//! Accepts mutually-authenticated gRPC connections and acknowledges
//! heartbeat requests.
//!
//! # Servers
//!
//! - gRPC over mTLS (default: 0.0.0.0:50051)
//! - HTTP Prometheus metrics (default: 0.0.0.0:2025)
//!
//! # Startup Flow
//!
//! 1. Load configuration from environment
//! 2. Initialize tracing (OTLP export when a collector is configured)
//! 3. Initialize Prometheus metrics recorder
//! 4. Build server TLS credentials (fail fast on bad identity material)
//! 5. Start metrics HTTP server
//! 6. Start gRPC server
//! 7. Wait for shutdown signal, drain metrics (5s grace), stop gRPC

#![warn(clippy::pedantic)]

use std::time::Duration;

use common::observability::{init_metrics_recorder, metrics_router, MetricsEndpoint};
use common::shutdown::shutdown_signal;
use common::telemetry::{init_tracing, report_startup_error};
use common::tls::{build_server_credentials, IdentityMaterial};
use monitor_server::config::Config;
use monitor_server::errors::ServerError;
use monitor_server::grpc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

const SERVICE_NAME: &str = "monitor-server";
const DEFAULT_LOG_FILTER: &str = "monitor_server=info,common=info,tower_http=info";

/// Grace period for in-flight metrics scrapes during shutdown.
const METRICS_SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Configuration comes first: it decides whether traces are exported
    let config = Config::from_env().map_err(|e| {
        report_startup_error(SERVICE_NAME, DEFAULT_LOG_FILTER, "Failed to load configuration", &e);
        ServerError::from(e)
    })?;

    let telemetry = init_tracing(
        SERVICE_NAME,
        DEFAULT_LOG_FILTER,
        config.otlp_endpoint.as_deref(),
    )
    .map_err(|e| {
        report_startup_error(SERVICE_NAME, DEFAULT_LOG_FILTER, "Failed to initialize tracing", &e);
        ServerError::from(e)
    })?;

    info!("Starting Monitor server");
    info!(
        grpc_bind_address = %config.grpc_bind_address,
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
        ServerError::Metrics(e)
    })?;

    let credentials = IdentityMaterial::load(&config.tls)
        .and_then(|material| build_server_credentials(&material))
        .map_err(|e| {
            error!(error = %e, "Failed to build server TLS credentials");
            ServerError::from(e)
        })?;
    info!("Server TLS credentials loaded");

    let metrics_endpoint = MetricsEndpoint::bind(
        config.metrics_bind_address,
        metrics_router(prometheus_handle, Vec::new()),
    )
    .await
    .map_err(|e| {
        error!(error = %e, "Failed to start metrics server");
        ServerError::from(e)
    })?;

    // Bind listener BEFORE spawning to fail fast on bind errors
    let listener = TcpListener::bind(config.grpc_bind_address)
        .await
        .map_err(|source| {
            error!(error = %source, addr = %config.grpc_bind_address, "Failed to bind gRPC listener");
            ServerError::Bind {
                addr: config.grpc_bind_address,
                source,
            }
        })?;

    let shutdown_token = CancellationToken::new();
    let grpc_shutdown_token = shutdown_token.child_token();
    let mut grpc_task = tokio::spawn(async move {
        grpc::serve(listener, &credentials, async move {
            grpc_shutdown_token.cancelled().await;
            info!("gRPC server shutting down");
        })
        .await
    });
    info!(addr = %config.grpc_bind_address, "gRPC server started");

    info!("Monitor server running - press Ctrl+C to shutdown");
    let early_exit = tokio::select! {
        () = shutdown_signal() => None,
        result = &mut grpc_task => Some(result),
    };

    info!("Initiating graceful shutdown...");
    metrics_endpoint.shutdown(METRICS_SHUTDOWN_GRACE).await;
    shutdown_token.cancel();

    let result = match early_exit {
        Some(result) => result,
        None => grpc_task.await,
    };
    let outcome: Result<(), Box<dyn std::error::Error>> = match result {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => {
            error!(error = %e, "gRPC server failed");
            Err(e.into())
        }
        Err(e) => {
            error!(error = %e, "gRPC server task panicked");
            Err(e.into())
        }
    };

    telemetry.shutdown();
    info!("Monitor server shutdown complete");
    outcome
}
