//! Metrics definitions shared by the Monitor client and server.
//!
//! All metrics follow Prometheus naming conventions:
//! - `grpc_server_` / `grpc_client_` prefix by side of the call
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Cardinality
//!
//! Labels are bounded:
//! - `grpc_service`, `grpc_method`: known methods only, anything else is `unknown`
//! - `grpc_code`: the 17 gRPC status codes

use metrics::{counter, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::time::Duration;

/// Which side of an RPC is being recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RpcSide {
    Server,
    Client,
}

impl RpcSide {
    #[must_use]
    pub const fn handled_total(self) -> &'static str {
        match self {
            RpcSide::Server => "grpc_server_handled_total",
            RpcSide::Client => "grpc_client_handled_total",
        }
    }

    #[must_use]
    pub const fn handling_seconds(self) -> &'static str {
        match self {
            RpcSide::Server => "grpc_server_handling_seconds",
            RpcSide::Client => "grpc_client_handling_seconds",
        }
    }
}

/// Label used for methods outside the known set.
pub const UNKNOWN_LABEL: &str = "unknown";

/// Prometheus builder with histogram buckets configured.
///
/// # Errors
///
/// Returns error if a bucket set is rejected.
pub fn metrics_builder() -> Result<PrometheusBuilder, String> {
    PrometheusBuilder::new()
        // Unary calls over a warm channel complete in low milliseconds;
        // the tail covers reconnects and the 10s client deadline.
        .set_buckets_for_metric(
            Matcher::Suffix("handling_seconds".to_string()),
            &[
                0.001, 0.0025, 0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.000, 2.500,
                5.000, 10.000,
            ],
        )
        .map_err(|e| format!("Failed to set gRPC handling buckets: {e}"))
}

/// Initialize Prometheus metrics recorder and return the handle
/// for serving metrics via HTTP.
///
/// Must be called before any metrics are recorded.
///
/// # Errors
///
/// Returns error if Prometheus recorder fails to install (e.g., already installed).
pub fn init_metrics_recorder() -> Result<PrometheusHandle, String> {
    metrics_builder()?
        .install_recorder()
        .map_err(|e| format!("Failed to install Prometheus recorder: {e}"))
}

/// Record completion of one RPC.
///
/// Metric: `grpc_{side}_handled_total`, `grpc_{side}_handling_seconds`
/// Labels: `grpc_service`, `grpc_method`, `grpc_code` (counter only)
pub fn record_grpc_call(
    side: RpcSide,
    service: &str,
    method: &str,
    code: tonic::Code,
    duration: Duration,
) {
    histogram!(side.handling_seconds(),
        "grpc_service" => service.to_string(),
        "grpc_method" => method.to_string()
    )
    .record(duration.as_secs_f64());

    counter!(side.handled_total(),
        "grpc_service" => service.to_string(),
        "grpc_method" => method.to_string(),
        "grpc_code" => format!("{code:?}")
    )
    .increment(1);
}

/// Split a gRPC request path into `(service, method)` labels.
///
/// Paths not listed in `known` map to [`UNKNOWN_LABEL`] for both labels so
/// arbitrary client input cannot create new series.
#[must_use]
pub fn method_labels<'a>(known: &[&str], path: &'a str) -> (&'a str, &'a str) {
    if !known.contains(&path) {
        return (UNKNOWN_LABEL, UNKNOWN_LABEL);
    }
    path.trim_start_matches('/')
        .split_once('/')
        .unwrap_or((UNKNOWN_LABEL, UNKNOWN_LABEL))
}
