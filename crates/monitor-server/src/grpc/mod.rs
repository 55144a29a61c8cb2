//! gRPC service for the Monitor server.
//!
//! [`serve`] runs `MonitoringService` and the gRPC reflection service over
//! the TLS accept loop from [`crate::transport`], wrapped in the gRPC
//! metrics layer.

mod monitor_service;

pub use monitor_service::{acknowledge, MonitorHandler};

use std::future::Future;

use common::observability::GrpcMetricsLayer;
use common::tls::ServerCredentials;
use proto_gen::contract::MONITOR_PATH;
use proto_gen::monitoring::monitoring_service_server::MonitoringServiceServer;
use proto_gen::FILE_DESCRIPTOR_SET;
use tokio::net::TcpListener;
use tonic::transport::Server;
use tracing::info;

use crate::errors::ServerError;
use crate::transport::tls_incoming;

/// Serve `Monitor` on `listener` until `shutdown` resolves.
///
/// In-flight calls are allowed to finish after `shutdown` fires.
///
/// # Errors
///
/// Returns `ServerError::Reflection` if the descriptor set cannot be
/// loaded, or `ServerError::Transport` if the HTTP/2 server fails.
pub async fn serve<F>(
    listener: TcpListener,
    credentials: &ServerCredentials,
    shutdown: F,
) -> Result<(), ServerError>
where
    F: Future<Output = ()> + Send,
{
    let reflection = tonic_reflection::server::Builder::configure()
        .register_encoded_file_descriptor_set(FILE_DESCRIPTOR_SET)
        .build_v1()?;

    let local_addr = listener.local_addr().ok();
    let incoming = tls_incoming(listener, credentials);

    info!(target: "monitor.grpc", addr = ?local_addr, "gRPC server starting");

    Server::builder()
        .layer(GrpcMetricsLayer::server(&[MONITOR_PATH]))
        .add_service(MonitoringServiceServer::new(MonitorHandler))
        .add_service(reflection)
        .serve_with_incoming_shutdown(incoming, shutdown)
        .await?;

    info!(target: "monitor.grpc", "gRPC server stopped");
    Ok(())
}
