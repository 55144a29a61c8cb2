//! Monitor server error types.
//!
//! `ValidationError` is returned to callers as `InvalidArgument` with the
//! error's display text as the status message. `ServerError` covers startup
//! and transport failures and is only ever logged.

use common::config::ConfigError;
use common::error::CredentialError;
use common::observability::MetricsEndpointError;
use common::telemetry::TelemetryError;
use std::net::SocketAddr;
use thiserror::Error;
use tonic::Status;

/// Reasons a `Monitor` request is rejected, in the order they are checked.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("client_request must not be nil")]
    MissingClientRequest,

    #[error("request_date must not be nil")]
    MissingRequestDate,

    #[error("request_date is not a valid timestamp")]
    InvalidRequestDate,

    #[error("invalid message: {0:?} (expected \"ping\")")]
    UnexpectedMessage(String),
}

impl From<ValidationError> for Status {
    fn from(err: ValidationError) -> Self {
        Status::invalid_argument(err.to_string())
    }
}

/// Monitor server startup and runtime errors.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Credential error: {0}")]
    Credential(#[from] CredentialError),

    #[error("Failed to bind gRPC listener on {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("gRPC transport error: {0}")]
    Transport(#[from] tonic::transport::Error),

    #[error("Failed to build reflection service: {0}")]
    Reflection(#[from] tonic_reflection::server::Error),

    #[error("Telemetry error: {0}")]
    Telemetry(#[from] TelemetryError),

    #[error("Metrics error: {0}")]
    Metrics(String),
}

impl From<MetricsEndpointError> for ServerError {
    fn from(err: MetricsEndpointError) -> Self {
        ServerError::Metrics(err.to_string())
    }
}
