//! Monitor gRPC client.
//!
//! Owns the single secured channel to the server and issues the two call
//! kinds:
//! - heartbeat: `"ping"`, expected to be acknowledged
//! - probe: `"wrong"`, expected to be rejected with `InvalidArgument`
//!
//! # Connection Pattern
//!
//! The channel connects lazily through a custom connector that always
//! performs the mTLS handshake, so there is no plaintext path. tonic's
//! `Channel` reconnects internally and supports concurrent in-flight calls,
//! so the heartbeat and probe tasks share one `MonitorClient` via `Arc`
//! and clone the cheap client handle per call.

use std::sync::Arc;
use std::time::{Duration, SystemTime};

use common::observability::grpc::GrpcMetricsService;
use common::observability::GrpcMetricsLayer;
use common::tls::ClientCredentials;
use hyper_util::rt::TokioIo;
use proto_gen::contract::{HEARTBEAT_MESSAGE, MONITOR_PATH, PROBE_MESSAGE};
use proto_gen::monitoring::monitoring_service_client::MonitoringServiceClient;
use proto_gen::monitoring::{ClientRequest, MonitorRequest, MonitorResponse};
use tokio::net::TcpStream;
use tokio_rustls::rustls::pki_types::ServerName;
use tokio_rustls::TlsConnector;
use tonic::transport::{Channel, Endpoint, Uri};
use tonic::{Code, Status};
use tower::Layer;
use tracing::{debug, info, instrument, warn};

use crate::config::ChannelTarget;
use crate::counters::CallCounters;
use crate::errors::{ClientError, ConnectionError};

/// Timeout for establishing TCP + TLS to the server.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Deadline for a single `Monitor` call.
pub const RPC_TIMEOUT: Duration = Duration::from_secs(10);

type MeteredChannel = GrpcMetricsService<Channel>;

/// Validated dial parameters.
#[derive(Debug, Clone)]
struct ResolvedTarget {
    uri: String,
    host: String,
    port: u16,
    server_name: ServerName<'static>,
}

/// Client for the `Monitor` RPC over one secured channel.
#[derive(Debug)]
pub struct MonitorClient {
    client: MonitoringServiceClient<MeteredChannel>,
    counters: Arc<CallCounters>,
    address: String,
}

impl MonitorClient {
    /// Configure the secured channel to `target`.
    ///
    /// No network traffic happens here; the first call connects. Must be
    /// called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns `ConnectionError` if the address is not `host:port` or the
    /// TLS server name is not a valid DNS name or IP address.
    pub fn open(
        target: &ChannelTarget,
        credentials: &ClientCredentials,
        counters: Arc<CallCounters>,
    ) -> Result<Self, ConnectionError> {
        let ResolvedTarget {
            uri,
            host,
            port,
            server_name,
        } = resolve_target(target)?;

        let endpoint = Endpoint::from_shared(uri).map_err(|e| ConnectionError::InvalidAddress {
            address: target.address.clone(),
            reason: e.to_string(),
        })?;

        let connector = TlsConnector::from(credentials.config());
        let channel = endpoint
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(RPC_TIMEOUT)
            .connect_with_connector_lazy(tower::service_fn(move |_: Uri| {
                let connector = connector.clone();
                let host = host.clone();
                let server_name = server_name.clone();
                async move {
                    let connect = async {
                        let tcp = TcpStream::connect((host.as_str(), port)).await?;
                        tcp.set_nodelay(true)?;
                        connector.connect(server_name, tcp).await
                    };
                    let tls = tokio::time::timeout(CONNECT_TIMEOUT, connect)
                        .await
                        .map_err(|_| {
                            std::io::Error::new(std::io::ErrorKind::TimedOut, "connect timed out")
                        })??;
                    debug!(target: "monitor.client", host = %host, port = port, "Secured channel established");
                    Ok::<_, std::io::Error>(TokioIo::new(tls))
                }
            }));

        let metered = GrpcMetricsLayer::client(&[MONITOR_PATH]).layer(channel);

        info!(target: "monitor.client", address = %target.address, "Channel configured");

        Ok(Self {
            client: MonitoringServiceClient::new(metered),
            counters,
            address: target.address.clone(),
        })
    }

    /// Send a well-formed heartbeat and return the acknowledgement text.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Rpc` with the server or transport status.
    #[instrument(skip_all, name = "monitor.client.heartbeat", fields(address = %self.address))]
    pub async fn send_heartbeat(&self) -> Result<String, ClientError> {
        self.counters.record_attempt();

        match self.call(HEARTBEAT_MESSAGE).await {
            Ok(response) => {
                self.counters.record_success();
                debug!(target: "monitor.client", response = %response.message, "Heartbeat acknowledged");
                Ok(response.message)
            }
            Err(status) => {
                self.counters.record_failure();
                debug!(target: "monitor.client", code = ?status.code(), "Heartbeat failed");
                Err(ClientError::Rpc(status))
            }
        }
    }

    /// Send the deliberately invalid probe.
    ///
    /// A rejection with `InvalidArgument` is the expected outcome: it is
    /// counted as a failed call but returns `Ok(())`.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Rpc` for any other failure, or
    /// `ClientError::ProbeAccepted` if the server acknowledged the probe.
    #[instrument(skip_all, name = "monitor.client.probe", fields(address = %self.address))]
    pub async fn send_probe(&self) -> Result<(), ClientError> {
        self.counters.record_attempt();

        match self.call(PROBE_MESSAGE).await {
            Err(status) if status.code() == Code::InvalidArgument => {
                self.counters.record_failure();
                debug!(target: "monitor.client", message = status.message(), "Probe rejected as expected");
                Ok(())
            }
            Err(status) => {
                self.counters.record_failure();
                debug!(target: "monitor.client", code = ?status.code(), "Probe failed");
                Err(ClientError::Rpc(status))
            }
            Ok(response) => {
                self.counters.record_success();
                warn!(target: "monitor.client", response = %response.message, "Probe was accepted");
                Err(ClientError::ProbeAccepted(response.message))
            }
        }
    }

    /// Shared handle to this client's outcome counters.
    #[must_use]
    pub fn counters(&self) -> Arc<CallCounters> {
        Arc::clone(&self.counters)
    }

    /// Release the channel.
    pub fn close(self) {
        drop(self.client);
        info!(target: "monitor.client", address = %self.address, "Channel closed");
    }

    async fn call(&self, message: &str) -> Result<MonitorResponse, Status> {
        let request = MonitorRequest {
            client_request: Some(ClientRequest {
                message: message.to_string(),
                request_date: Some(prost_types::Timestamp::from(SystemTime::now())),
            }),
        };

        let mut client = self.client.clone();
        client
            .monitor(request)
            .await
            .map(tonic::Response::into_inner)
    }
}

/// Parse `host:port` and derive the TLS server name.
fn resolve_target(target: &ChannelTarget) -> Result<ResolvedTarget, ConnectionError> {
    let invalid = |reason: &str| ConnectionError::InvalidAddress {
        address: target.address.clone(),
        reason: reason.to_string(),
    };

    let address = target.address.trim();
    if address.is_empty() {
        return Err(invalid("address is empty"));
    }
    if address.contains("://") {
        return Err(invalid("expected host:port without a scheme"));
    }

    let uri = format!("http://{address}");
    let parsed: Uri = uri.parse().map_err(|e: tonic::codegen::http::uri::InvalidUri| {
        invalid(&e.to_string())
    })?;
    if !matches!(parsed.path(), "" | "/") {
        return Err(invalid("unexpected path"));
    }

    let host = parsed
        .host()
        .map(|h| h.trim_start_matches('[').trim_end_matches(']'))
        .filter(|h| !h.is_empty())
        .ok_or_else(|| invalid("missing host"))?
        .to_string();
    let port = parsed.port_u16().ok_or_else(|| invalid("missing port"))?;

    let name = target.server_name.clone().unwrap_or_else(|| host.clone());
    let server_name = ServerName::try_from(name.clone())
        .map_err(|_| ConnectionError::InvalidServerName(name))?;

    Ok(ResolvedTarget {
        uri,
        host,
        port,
        server_name,
    })
}
