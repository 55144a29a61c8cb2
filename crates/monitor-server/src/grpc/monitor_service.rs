//! `MonitoringService` implementation.
//!
//! [`acknowledge`] holds all validation and formatting; the tonic handler
//! only adds logging around it.

use chrono::{DateTime, Utc};
use proto_gen::contract::{HEARTBEAT_MESSAGE, REPLY, TIMESTAMP_FORMAT};
use proto_gen::monitoring::monitoring_service_server::MonitoringService;
use proto_gen::monitoring::{MonitorRequest, MonitorResponse};
use tonic::{Request, Response, Status};
use tracing::{debug, info, instrument, warn};

use crate::errors::ValidationError;

/// Earliest second representable by `google.protobuf.Timestamp` (0001-01-01T00:00:00Z).
const MIN_TIMESTAMP_SECONDS: i64 = -62_135_596_800;

/// Latest second representable by `google.protobuf.Timestamp` (9999-12-31T23:59:59Z).
const MAX_TIMESTAMP_SECONDS: i64 = 253_402_300_799;

/// Validate `request` and build the acknowledgement text.
///
/// Checks run in order and the first failure is returned: missing
/// `client_request`, missing `request_date`, a message other than `"ping"`,
/// then an out-of-range `request_date`.
///
/// # Errors
///
/// Returns the `ValidationError` for the first failed check.
pub fn acknowledge(request: &MonitorRequest) -> Result<String, ValidationError> {
    let client_request = request
        .client_request
        .as_ref()
        .ok_or(ValidationError::MissingClientRequest)?;

    let request_date = client_request
        .request_date
        .as_ref()
        .ok_or(ValidationError::MissingRequestDate)?;

    if client_request.message != HEARTBEAT_MESSAGE {
        return Err(ValidationError::UnexpectedMessage(
            client_request.message.clone(),
        ));
    }

    let request_date = to_utc(request_date).ok_or(ValidationError::InvalidRequestDate)?;

    Ok(format!(
        "{} on {}, response: {REPLY}",
        client_request.message,
        request_date.format(TIMESTAMP_FORMAT)
    ))
}

fn to_utc(timestamp: &prost_types::Timestamp) -> Option<DateTime<Utc>> {
    if !(MIN_TIMESTAMP_SECONDS..=MAX_TIMESTAMP_SECONDS).contains(&timestamp.seconds) {
        return None;
    }
    let nanos = u32::try_from(timestamp.nanos)
        .ok()
        .filter(|n| *n < 1_000_000_000)?;
    DateTime::from_timestamp(timestamp.seconds, nanos)
}

/// gRPC handler for `monitoring.MonitoringService`.
#[derive(Debug, Default, Clone, Copy)]
pub struct MonitorHandler;

#[tonic::async_trait]
impl MonitoringService for MonitorHandler {
    #[instrument(skip_all, name = "monitor.grpc.monitor")]
    async fn monitor(
        &self,
        request: Request<MonitorRequest>,
    ) -> Result<Response<MonitorResponse>, Status> {
        let peer_certs = request.peer_certs().map_or(0, |certs| certs.len());
        debug!(
            target: "monitor.grpc",
            remote_addr = ?request.remote_addr(),
            peer_certs = peer_certs,
            "Monitor request received"
        );

        match acknowledge(request.get_ref()) {
            Ok(message) => {
                info!(target: "monitor.grpc", response = %message, "Request acknowledged");
                Ok(Response::new(MonitorResponse { message }))
            }
            Err(e) => {
                warn!(target: "monitor.grpc", error = %e, "Request rejected");
                Err(e.into())
            }
        }
    }
}
