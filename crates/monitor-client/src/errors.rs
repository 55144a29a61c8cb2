//! Monitor client error types.

use common::config::ConfigError;
use common::error::CredentialError;
use common::observability::MetricsEndpointError;
use common::telemetry::TelemetryError;
use thiserror::Error;
use tonic::Status;

/// The server target cannot be dialled. Raised before any network attempt.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConnectionError {
    #[error("invalid server address {address:?}: {reason}")]
    InvalidAddress { address: String, reason: String },

    #[error("invalid TLS server name {0:?}")]
    InvalidServerName(String),
}

/// Monitor client error type.
///
/// Per-call errors (`Rpc`, `ProbeAccepted`) are logged by the periodic
/// tasks and never stop the schedule. The rest are startup failures.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Credential error: {0}")]
    Credential(#[from] CredentialError),

    #[error("Connection error: {0}")]
    Connection(#[from] ConnectionError),

    /// The call failed; transport failures carry `Unavailable`.
    #[error("RPC failed: {0}")]
    Rpc(Status),

    /// The server accepted a request it must reject.
    #[error("probe was accepted by the server: {0:?}")]
    ProbeAccepted(String),

    #[error("Metrics error: {0}")]
    Metrics(String),

    #[error("Telemetry error: {0}")]
    Telemetry(#[from] TelemetryError),
}

impl From<MetricsEndpointError> for ClientError {
    fn from(err: MetricsEndpointError) -> Self {
        ClientError::Metrics(err.to_string())
    }
}

impl ClientError {
    /// gRPC status code of a failed call, if this error came from one.
    #[must_use]
    pub fn code(&self) -> Option<tonic::Code> {
        match self {
            ClientError::Rpc(status) => Some(status.code()),
            _ => None,
        }
    }
}
