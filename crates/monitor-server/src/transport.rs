//! TLS accept loop.
//!
//! Turns a `TcpListener` into a stream of established TLS connections for
//! `Server::serve_with_incoming_shutdown`. Handshakes run in their own tasks
//! so a slow or hostile peer cannot stall other accepts. Connections whose
//! handshake fails (no client certificate, untrusted chain, wrong protocol
//! version) are logged and dropped before reaching the gRPC layer.
//!
//! The loop stops once the receiving stream is dropped, which tonic does
//! when its shutdown signal fires.

use std::io;
use std::time::Duration;

use common::tls::ServerCredentials;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_rustls::server::TlsStream;
use tokio_rustls::TlsAcceptor;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, warn};

/// Maximum time a peer gets to complete the TLS handshake.
pub const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Pause after a failed `accept` (e.g. file descriptor exhaustion).
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(100);

/// Established connections waiting for the gRPC server.
const ACCEPT_BACKLOG: usize = 64;

/// Stream of established TLS connections.
pub type TlsIncoming = ReceiverStream<io::Result<TlsStream<TcpStream>>>;

/// Accept TCP connections on `listener` and complete the mTLS handshake.
///
/// Must be called from within a tokio runtime.
pub fn tls_incoming(listener: TcpListener, credentials: &ServerCredentials) -> TlsIncoming {
    let acceptor = TlsAcceptor::from(credentials.config());
    let (tx, rx) = mpsc::channel(ACCEPT_BACKLOG);

    tokio::spawn(accept_loop(listener, acceptor, tx));

    ReceiverStream::new(rx)
}

async fn accept_loop(
    listener: TcpListener,
    acceptor: TlsAcceptor,
    tx: mpsc::Sender<io::Result<TlsStream<TcpStream>>>,
) {
    loop {
        let (stream, peer) = tokio::select! {
            () = tx.closed() => {
                debug!(target: "monitor.transport", "Accept loop stopped");
                return;
            }
            accepted = listener.accept() => match accepted {
                Ok(conn) => conn,
                Err(e) => {
                    warn!(target: "monitor.transport", error = %e, "Failed to accept connection");
                    tokio::time::sleep(ACCEPT_ERROR_BACKOFF).await;
                    continue;
                }
            }
        };

        let acceptor = acceptor.clone();
        let tx = tx.clone();
        tokio::spawn(async move {
            match tokio::time::timeout(HANDSHAKE_TIMEOUT, acceptor.accept(stream)).await {
                Ok(Ok(tls)) => {
                    if tx.send(Ok(tls)).await.is_err() {
                        debug!(target: "monitor.transport", peer = %peer, "Server stopped before connection was handed over");
                    }
                }
                Ok(Err(e)) => {
                    warn!(target: "monitor.transport", peer = %peer, error = %e, "TLS handshake failed");
                }
                Err(_) => {
                    warn!(
                        target: "monitor.transport",
                        peer = %peer,
                        timeout_secs = HANDSHAKE_TIMEOUT.as_secs(),
                        "TLS handshake timed out"
                    );
                }
            }
        });
    }
}
