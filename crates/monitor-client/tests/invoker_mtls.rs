//! `MonitorClient` against real servers over mTLS on loopback.
//!
//! Covers the real Monitor server (heartbeat acknowledged, probe rejected),
//! an unreachable port, and a misbehaving server that accepts everything.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::net::SocketAddr;

use common::testing::TestPki;
use monitor_client::config::ChannelTarget;
use monitor_client::counters::{CallCounters, CounterSnapshot};
use monitor_client::errors::{ClientError, ConnectionError};
use monitor_client::invoker::MonitorClient;
use monitor_server::transport::tls_incoming;
use proto_gen::monitoring::monitoring_service_server::{MonitoringService, MonitoringServiceServer};
use proto_gen::monitoring::{MonitorRequest, MonitorResponse};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tonic::{Code, Request, Response, Status};

struct TestServer {
    addr: SocketAddr,
    shutdown: CancellationToken,
    task: JoinHandle<()>,
}

impl TestServer {
    /// The real Monitor server.
    async fn monitor(pki: &TestPki) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let credentials = pki.server_credentials();
        let shutdown = CancellationToken::new();
        let token = shutdown.clone();

        let task = tokio::spawn(async move {
            monitor_server::grpc::serve(listener, &credentials, async move {
                token.cancelled().await;
            })
            .await
            .unwrap();
        });

        Self {
            addr,
            shutdown,
            task,
        }
    }

    /// A server that acknowledges every request, including the probe.
    async fn accepting(pki: &TestPki) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let credentials = pki.server_credentials();
        let shutdown = CancellationToken::new();
        let token = shutdown.clone();

        let task = tokio::spawn(async move {
            tonic::transport::Server::builder()
                .add_service(MonitoringServiceServer::new(AcceptEverything))
                .serve_with_incoming_shutdown(tls_incoming(listener, &credentials), async move {
                    token.cancelled().await;
                })
                .await
                .unwrap();
        });

        Self {
            addr,
            shutdown,
            task,
        }
    }

    fn target(&self) -> ChannelTarget {
        ChannelTarget::new(format!("localhost:{}", self.addr.port()))
    }

    async fn stop(self) {
        self.shutdown.cancel();
        self.task.await.unwrap();
    }
}

struct AcceptEverything;

#[tonic::async_trait]
impl MonitoringService for AcceptEverything {
    async fn monitor(
        &self,
        request: Request<MonitorRequest>,
    ) -> Result<Response<MonitorResponse>, Status> {
        let message = request
            .into_inner()
            .client_request
            .map(|r| r.message)
            .unwrap_or_default();
        Ok(Response::new(MonitorResponse {
            message: format!("{message}, response: pong"),
        }))
    }
}

#[tokio::test]
async fn test_heartbeat_is_acknowledged() {
    let pki = TestPki::new("client-heartbeat");
    let server = TestServer::monitor(&pki).await;
    let counters = CallCounters::new();
    let client = MonitorClient::open(&server.target(), &pki.client_credentials(), counters.clone())
        .unwrap();

    let response = client.send_heartbeat().await.unwrap();

    assert!(response.starts_with("ping on "), "{response}");
    assert!(response.ends_with(", response: pong"), "{response}");
    assert_eq!(
        counters.snapshot(),
        CounterSnapshot {
            total: 1,
            success: 1,
            failure: 0,
        }
    );

    client.close();
    server.stop().await;
}

#[tokio::test]
async fn test_probe_rejection_is_the_expected_outcome() {
    let pki = TestPki::new("client-probe");
    let server = TestServer::monitor(&pki).await;
    let counters = CallCounters::new();
    let client = MonitorClient::open(&server.target(), &pki.client_credentials(), counters.clone())
        .unwrap();

    client.send_probe().await.unwrap();

    assert_eq!(
        counters.snapshot(),
        CounterSnapshot {
            total: 1,
            success: 0,
            failure: 1,
        }
    );

    client.close();
    server.stop().await;
}

#[tokio::test]
async fn test_heartbeat_and_probe_share_the_channel() {
    let pki = TestPki::new("client-shared");
    let server = TestServer::monitor(&pki).await;
    let counters = CallCounters::new();
    let client = MonitorClient::open(&server.target(), &pki.client_credentials(), counters.clone())
        .unwrap();

    let (heartbeat, probe) = tokio::join!(client.send_heartbeat(), client.send_probe());

    assert!(heartbeat.is_ok());
    assert!(probe.is_ok());
    assert_eq!(
        counters.snapshot(),
        CounterSnapshot {
            total: 2,
            success: 1,
            failure: 1,
        }
    );

    client.close();
    server.stop().await;
}

#[tokio::test]
async fn test_unreachable_server_counts_as_failure() {
    let pki = TestPki::new("client-unreachable");
    // Reserve a port, then free it so nothing listens there
    let port = {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap().port()
    };
    let counters = CallCounters::new();
    let client = MonitorClient::open(
        &ChannelTarget::new(format!("localhost:{port}")),
        &pki.client_credentials(),
        counters.clone(),
    )
    .unwrap();

    let err = client.send_heartbeat().await.unwrap_err();

    assert_eq!(err.code(), Some(Code::Unavailable), "{err}");
    assert_eq!(
        counters.snapshot(),
        CounterSnapshot {
            total: 1,
            success: 0,
            failure: 1,
        }
    );
    client.close();
}

#[tokio::test]
async fn test_unreachable_server_is_not_the_expected_rejection() {
    let pki = TestPki::new("client-rejection-unreachable");
    let port = {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap().port()
    };
    let counters = CallCounters::new();
    let client = MonitorClient::open(
        &ChannelTarget::new(format!("localhost:{port}")),
        &pki.client_credentials(),
        counters.clone(),
    )
    .unwrap();

    // Only InvalidArgument counts as the expected rejection
    let err = client.send_probe().await.unwrap_err();

    assert!(matches!(err, ClientError::Rpc(_)), "{err}");
    assert_eq!(err.code(), Some(Code::Unavailable), "{err}");
    assert_eq!(
        counters.snapshot(),
        CounterSnapshot {
            total: 1,
            success: 0,
            failure: 1,
        }
    );
    client.close();
}

#[tokio::test]
async fn test_untrusted_server_is_refused() {
    let client_pki = TestPki::new("client-trust");
    let server_pki = TestPki::new("client-rogue");
    let server = TestServer::monitor(&server_pki).await;
    let counters = CallCounters::new();
    let client = MonitorClient::open(
        &server.target(),
        &client_pki.client_credentials(),
        counters.clone(),
    )
    .unwrap();

    let err = client.send_heartbeat().await.unwrap_err();

    assert!(matches!(err, ClientError::Rpc(_)), "{err}");
    assert_eq!(counters.snapshot().failure, 1);

    client.close();
    server.stop().await;
}

#[tokio::test]
async fn test_accepted_probe_is_reported() {
    let pki = TestPki::new("client-accepting");
    let server = TestServer::accepting(&pki).await;
    let counters = CallCounters::new();
    let client = MonitorClient::open(&server.target(), &pki.client_credentials(), counters.clone())
        .unwrap();

    let err = client.send_probe().await.unwrap_err();

    assert!(
        matches!(&err, ClientError::ProbeAccepted(message) if message == "wrong, response: pong"),
        "{err}"
    );
    assert_eq!(
        counters.snapshot(),
        CounterSnapshot {
            total: 1,
            success: 1,
            failure: 0,
        }
    );

    client.close();
    server.stop().await;
}

#[tokio::test]
async fn test_server_name_mismatch_is_refused() {
    let pki = TestPki::new("client-sni");
    let server = TestServer::monitor(&pki).await;
    let counters = CallCounters::new();
    let target = server.target().with_server_name("not-the-server.internal");
    let client = MonitorClient::open(&target, &pki.client_credentials(), counters.clone()).unwrap();

    let err = client.send_heartbeat().await.unwrap_err();

    assert!(matches!(err, ClientError::Rpc(_)), "{err}");
    client.close();
    server.stop().await;
}

#[tokio::test]
async fn test_invalid_address_fails_before_dialing() {
    let pki = TestPki::new("client-invalid");

    let err = MonitorClient::open(
        &ChannelTarget::new("localhost"),
        &pki.client_credentials(),
        CallCounters::new(),
    )
    .unwrap_err();

    assert!(matches!(err, ConnectionError::InvalidAddress { .. }));
}
