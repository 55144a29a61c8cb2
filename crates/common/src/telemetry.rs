//! Tracing subscriber setup with optional OTLP trace export.
//!
//! Every process logs through `tracing` with an `EnvFilter` (`RUST_LOG`
//! overrides the per-binary default). When an OTLP collector endpoint is
//! configured, spans are also exported over gRPC with a batch processor.
//! An empty endpoint disables export; logging is unaffected either way.

use opentelemetry::trace::{TraceError, TracerProvider as _};
use opentelemetry::KeyValue;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::trace::TracerProvider;
use opentelemetry_sdk::Resource;
use thiserror::Error;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("failed to create OTLP trace exporter: {0}")]
    Exporter(#[from] TraceError),

    #[error("failed to install tracing subscriber: {0}")]
    Subscriber(String),
}

/// Keeps trace export alive for the life of the process.
///
/// Call [`TelemetryGuard::shutdown`] before exit so buffered spans are
/// flushed to the collector.
#[derive(Debug)]
#[must_use = "dropping the guard without calling shutdown loses buffered spans"]
pub struct TelemetryGuard {
    provider: Option<TracerProvider>,
}

impl TelemetryGuard {
    /// Whether spans are being exported.
    #[must_use]
    pub fn exporting(&self) -> bool {
        self.provider.is_some()
    }

    /// Flush and stop trace export.
    pub fn shutdown(self) {
        if let Some(provider) = self.provider {
            for result in provider.force_flush() {
                if let Err(e) = result {
                    warn!(error = %e, "Failed to flush spans");
                }
            }
            opentelemetry::global::shutdown_tracer_provider();
            info!("Trace exporter shut down");
        }
    }
}

/// Install the global tracing subscriber.
///
/// `default_filter` applies when `RUST_LOG` is unset. `otlp_endpoint`
/// enables span export to that collector.
///
/// # Errors
///
/// Returns `TelemetryError::Exporter` if the OTLP pipeline cannot be built,
/// or `TelemetryError::Subscriber` if a global subscriber is already set.
pub fn init_tracing(
    service_name: &'static str,
    default_filter: &str,
    otlp_endpoint: Option<&str>,
) -> Result<TelemetryGuard, TelemetryError> {
    let provider = otlp_endpoint
        .map(|endpoint| otlp_provider(service_name, endpoint))
        .transpose()?;

    let otel_layer = provider.as_ref().map(|provider| {
        tracing_opentelemetry::layer().with_tracer(provider.tracer(service_name))
    });

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter.into()))
        .with(tracing_subscriber::fmt::layer())
        .with(otel_layer)
        .try_init()
        .map_err(|e| TelemetryError::Subscriber(e.to_string()))?;

    if let Some(provider) = &provider {
        opentelemetry::global::set_tracer_provider(provider.clone());
        info!(
            service = service_name,
            endpoint = otlp_endpoint.unwrap_or_default(),
            "OTLP trace export enabled"
        );
    }

    Ok(TelemetryGuard { provider })
}

/// Log a failure that happens before [`init_tracing`] has run.
///
/// Installs a local-only subscriber with `default_filter` (unless one is
/// already set) and logs `error` at `ERROR` level under `context`.
pub fn report_startup_error(
    service_name: &'static str,
    default_filter: &str,
    context: &str,
    error: &dyn std::fmt::Display,
) {
    // Keep any subscriber that is already installed
    if let Ok(guard) = init_tracing(service_name, default_filter, None) {
        guard.shutdown();
    }
    error!(service = service_name, error = %error, "{context}");
}

fn otlp_provider(service_name: &'static str, endpoint: &str) -> Result<TracerProvider, TraceError> {
    opentelemetry_otlp::new_pipeline()
        .tracing()
        .with_exporter(
            opentelemetry_otlp::new_exporter()
                .tonic()
                .with_endpoint(endpoint),
        )
        .with_trace_config(
            opentelemetry_sdk::trace::Config::default()
                .with_resource(Resource::new(vec![KeyValue::new("service.name", service_name)])),
        )
        .install_batch(opentelemetry_sdk::runtime::Tokio)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_init_without_endpoint_logs_only() {
        let guard = init_tracing("common-test", "info", None).unwrap();
        assert!(!guard.exporting());
        guard.shutdown();

        // Only one global subscriber per process
        let err = init_tracing("common-test", "info", None).unwrap_err();
        assert!(matches!(err, TelemetryError::Subscriber(_)));
    }
}
