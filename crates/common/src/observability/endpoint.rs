//! Prometheus `/metrics` HTTP endpoint.
//!
//! The endpoint runs on its own listener, independent of the gRPC port,
//! and stops through a bounded graceful shutdown: in-flight scrapes get up
//! to the grace period, then the server task is aborted.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::routing::get;
use axum::Router;
use metrics_exporter_prometheus::PrometheusHandle;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

/// Something that pushes its current values into the metrics recorder
/// right before a scrape renders.
pub trait MetricsSource: Send + Sync {
    /// Record current values. Called once per `/metrics` request.
    fn publish(&self);
}

#[derive(Debug, Error)]
pub enum MetricsEndpointError {
    #[error("failed to bind metrics endpoint on {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },
}

/// How [`MetricsEndpoint::shutdown`] finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownOutcome {
    /// All connections closed within the grace period.
    Drained,
    /// The grace period elapsed and the server was aborted.
    GracePeriodElapsed,
}

/// Build the `/metrics` router.
///
/// Each scrape calls [`MetricsSource::publish`] on every source, then
/// renders the Prometheus text exposition from `handle`.
pub fn metrics_router(handle: PrometheusHandle, sources: Vec<Arc<dyn MetricsSource>>) -> Router {
    let sources: Arc<[Arc<dyn MetricsSource>]> = sources.into();

    Router::new()
        .route(
            "/metrics",
            get(move || {
                let handle = handle.clone();
                let sources = Arc::clone(&sources);
                async move {
                    for source in sources.iter() {
                        source.publish();
                    }
                    handle.render()
                }
            }),
        )
        .layer(TraceLayer::new_for_http())
}

/// A running metrics HTTP server.
#[derive(Debug)]
pub struct MetricsEndpoint {
    local_addr: SocketAddr,
    shutdown_token: CancellationToken,
    task: JoinHandle<std::io::Result<()>>,
}

impl MetricsEndpoint {
    /// Bind `addr` and start serving `router`.
    ///
    /// The listener is bound before the task is spawned so bind errors are
    /// reported to the caller.
    ///
    /// # Errors
    ///
    /// Returns `MetricsEndpointError::Bind` if the address cannot be bound.
    pub async fn bind(addr: SocketAddr, router: Router) -> Result<Self, MetricsEndpointError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| MetricsEndpointError::Bind { addr, source })?;
        let local_addr = listener
            .local_addr()
            .map_err(|source| MetricsEndpointError::Bind { addr, source })?;

        let shutdown_token = CancellationToken::new();
        let server_token = shutdown_token.clone();
        let task = tokio::spawn(async move {
            axum::serve(listener, router)
                .with_graceful_shutdown(async move {
                    server_token.cancelled().await;
                    info!("Metrics server shutting down");
                })
                .await
        });

        info!(addr = %local_addr, "Metrics server started");

        Ok(Self {
            local_addr,
            shutdown_token,
            task,
        })
    }

    /// Address actually bound, with the resolved port when bound to `:0`.
    #[must_use]
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stop accepting scrapes and wait up to `grace` for open ones.
    pub async fn shutdown(self, grace: Duration) -> ShutdownOutcome {
        self.shutdown_token.cancel();

        let mut task = self.task;
        match tokio::time::timeout(grace, &mut task).await {
            Ok(Ok(Ok(()))) => {
                info!("Metrics server stopped");
                ShutdownOutcome::Drained
            }
            Ok(Ok(Err(e))) => {
                error!(error = %e, "Metrics server failed");
                ShutdownOutcome::Drained
            }
            Ok(Err(e)) => {
                error!(error = %e, "Metrics server task panicked");
                ShutdownOutcome::Drained
            }
            Err(_) => {
                warn!(
                    grace_secs = grace.as_secs(),
                    "Metrics server did not drain in time, aborting"
                );
                task.abort();
                ShutdownOutcome::GracePeriodElapsed
            }
        }
    }
}
