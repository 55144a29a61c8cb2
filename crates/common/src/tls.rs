//! Mutual-TLS credential construction.
//!
//! Turns PEM identity material (own certificate chain, private key, trust
//! bundle) into immutable rustls configurations for either side of the
//! Monitor channel.
//!
//! Both roles enforce:
//! - TLS 1.3 only (no downgrade)
//! - Ring crypto provider, selected explicitly
//! - Certificate/key consistency checked before any config is built
//! - Peer verification against the trust bundle (webpki)
//! - ALPN `h2`, since the channel carries gRPC
//!
//! The server role additionally requires a client certificate; a peer that
//! does not present one chaining to the trust bundle fails the handshake.

use std::fmt;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use rustls::crypto::CryptoProvider;
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::server::WebPkiClientVerifier;
use rustls::sign::CertifiedKey;
use rustls::{ClientConfig, InconsistentKeys, RootCertStore, ServerConfig};
use tracing::{debug, info, warn};

use crate::config::TlsPaths;
use crate::error::{CredentialError, Result};
use crate::secret::{ExposeSecret, SecretSlice};

/// ALPN identifier for HTTP/2.
pub const ALPN_H2: &[u8] = b"h2";

/// Which end of the channel the credentials are for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Dials the server and presents a client certificate.
    Client,
    /// Accepts connections and demands a client certificate.
    Server,
}

impl Role {
    /// Returns the role as a string for log fields.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Role::Client => "client",
            Role::Server => "server",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raw PEM identity material for one process.
///
/// The private key is held in a [`SecretSlice`] so `Debug` output never
/// contains key bytes.
#[derive(Debug)]
pub struct IdentityMaterial {
    cert_pem: Vec<u8>,
    key_pem: SecretSlice<u8>,
    trust_pem: Vec<u8>,
}

impl IdentityMaterial {
    /// Wrap PEM bytes already in memory.
    pub fn from_pem(
        cert_pem: impl Into<Vec<u8>>,
        key_pem: impl Into<Vec<u8>>,
        trust_pem: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            cert_pem: cert_pem.into(),
            key_pem: SecretSlice::from(key_pem.into()),
            trust_pem: trust_pem.into(),
        }
    }

    /// Read the certificate, key and trust bundle files.
    ///
    /// # Errors
    ///
    /// Returns `CredentialError::Read` naming the first file that could not be read.
    pub fn load(paths: &TlsPaths) -> Result<Self> {
        let cert_pem = read_file("certificate", &paths.cert_file)?;
        let key_pem = read_file("private key", &paths.key_file)?;
        let trust_pem = read_file("trust bundle", &paths.ca_file)?;
        Ok(Self::from_pem(cert_pem, key_pem, trust_pem))
    }
}

/// Server-side mTLS configuration.
#[derive(Clone)]
pub struct ServerCredentials {
    config: Arc<ServerConfig>,
}

impl ServerCredentials {
    /// Shared rustls configuration for the acceptor.
    #[must_use]
    pub fn config(&self) -> Arc<ServerConfig> {
        Arc::clone(&self.config)
    }
}

impl fmt::Debug for ServerCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerCredentials")
            .field("alpn_protocols", &self.config.alpn_protocols)
            .finish_non_exhaustive()
    }
}

/// Client-side mTLS configuration.
#[derive(Clone)]
pub struct ClientCredentials {
    config: Arc<ClientConfig>,
}

impl ClientCredentials {
    /// Shared rustls configuration for the connector.
    #[must_use]
    pub fn config(&self) -> Arc<ClientConfig> {
        Arc::clone(&self.config)
    }
}

impl fmt::Debug for ClientCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientCredentials")
            .field("alpn_protocols", &self.config.alpn_protocols)
            .finish_non_exhaustive()
    }
}

/// Credentials for either role, as returned by [`build_credentials`].
#[derive(Debug, Clone)]
pub enum TransportCredentials {
    /// Acceptor side; requires and verifies a client certificate.
    Server(ServerCredentials),
    /// Dialer side; presents the client certificate.
    Client(ClientCredentials),
}

impl TransportCredentials {
    /// The role these credentials were built for.
    #[must_use]
    pub fn role(&self) -> Role {
        match self {
            TransportCredentials::Server(_) => Role::Server,
            TransportCredentials::Client(_) => Role::Client,
        }
    }

    /// Server credentials, or `None` if these are client credentials.
    #[must_use]
    pub fn into_server(self) -> Option<ServerCredentials> {
        match self {
            TransportCredentials::Server(creds) => Some(creds),
            TransportCredentials::Client(_) => None,
        }
    }

    /// Client credentials, or `None` if these are server credentials.
    #[must_use]
    pub fn into_client(self) -> Option<ClientCredentials> {
        match self {
            TransportCredentials::Client(creds) => Some(creds),
            TransportCredentials::Server(_) => None,
        }
    }
}

/// Build mTLS credentials for `role` from `material`.
///
/// # Errors
///
/// Returns a `CredentialError` if the certificate or key cannot be parsed,
/// they do not form a key pair, the trust bundle has no usable anchor, or
/// rustls rejects the configuration.
pub fn build_credentials(material: &IdentityMaterial, role: Role) -> Result<TransportCredentials> {
    let provider = Arc::new(rustls::crypto::ring::default_provider());

    let chain = parse_certificates(&material.cert_pem)?;
    let key = parse_private_key(material.key_pem.expose_secret())?;
    verify_key_pair(&provider, &chain, &key)?;
    let roots = parse_trust_anchors(&material.trust_pem)?;
    let anchors = roots.len();

    let credentials = match role {
        Role::Server => TransportCredentials::Server(ServerCredentials {
            config: Arc::new(server_config(provider, roots, chain, key)?),
        }),
        Role::Client => TransportCredentials::Client(ClientCredentials {
            config: Arc::new(client_config(provider, roots, chain, key)?),
        }),
    };

    info!(
        target: "common.tls",
        role = %role,
        trust_anchors = anchors,
        "mTLS credentials built"
    );

    Ok(credentials)
}

/// Build server credentials from `material`.
///
/// # Errors
///
/// See [`build_credentials`].
pub fn build_server_credentials(material: &IdentityMaterial) -> Result<ServerCredentials> {
    build_credentials(material, Role::Server)?
        .into_server()
        .ok_or_else(|| CredentialError::Tls("server role produced client credentials".to_string()))
}

/// Build client credentials from `material`.
///
/// # Errors
///
/// See [`build_credentials`].
pub fn build_client_credentials(material: &IdentityMaterial) -> Result<ClientCredentials> {
    build_credentials(material, Role::Client)?
        .into_client()
        .ok_or_else(|| CredentialError::Tls("client role produced server credentials".to_string()))
}

fn read_file(kind: &'static str, path: &Path) -> Result<Vec<u8>> {
    fs::read(path).map_err(|source| CredentialError::Read {
        kind,
        path: path.to_path_buf(),
        source,
    })
}

fn parse_certificates(mut pem: &[u8]) -> Result<Vec<CertificateDer<'static>>> {
    let chain = rustls_pemfile::certs(&mut pem)
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| CredentialError::MalformedPem {
            kind: "certificate",
            reason: e.to_string(),
        })?;

    if chain.is_empty() {
        return Err(CredentialError::NoCertificate);
    }
    Ok(chain)
}

fn parse_private_key(mut pem: &[u8]) -> Result<PrivateKeyDer<'static>> {
    rustls_pemfile::private_key(&mut pem)
        .map_err(|e| CredentialError::MalformedPem {
            kind: "private key",
            reason: e.to_string(),
        })?
        .ok_or(CredentialError::NoPrivateKey)
}

/// Check that `key` signs for the leaf of `chain`.
fn verify_key_pair(
    provider: &CryptoProvider,
    chain: &[CertificateDer<'static>],
    key: &PrivateKeyDer<'static>,
) -> Result<()> {
    let signing_key = provider
        .key_provider
        .load_private_key(key.clone_key())
        .map_err(|e| CredentialError::InvalidPrivateKey(e.to_string()))?;

    match CertifiedKey::new(chain.to_vec(), signing_key).keys_match() {
        Ok(()) => Ok(()),
        Err(rustls::Error::InconsistentKeys(InconsistentKeys::Unknown)) => {
            // Key type does not expose its public half; rustls re-checks on use.
            debug!(target: "common.tls", "Key pair consistency could not be determined");
            Ok(())
        }
        Err(e) => Err(map_tls_error(e)),
    }
}

fn parse_trust_anchors(mut pem: &[u8]) -> Result<RootCertStore> {
    // Malformed sections are skipped; only the anchor count matters.
    let candidates: Vec<CertificateDer<'static>> =
        rustls_pemfile::certs(&mut pem).filter_map(std::result::Result::ok).collect();

    let mut roots = RootCertStore::empty();
    let (added, ignored) = roots.add_parsable_certificates(candidates);

    if ignored > 0 {
        warn!(
            target: "common.tls",
            ignored = ignored,
            "Ignored unparseable certificates in trust bundle"
        );
    }
    if added == 0 {
        return Err(CredentialError::NoTrustAnchors);
    }
    Ok(roots)
}

fn server_config(
    provider: Arc<CryptoProvider>,
    roots: RootCertStore,
    chain: Vec<CertificateDer<'static>>,
    key: PrivateKeyDer<'static>,
) -> Result<ServerConfig> {
    let verifier = WebPkiClientVerifier::builder_with_provider(Arc::new(roots), Arc::clone(&provider))
        .build()
        .map_err(|e| CredentialError::Tls(format!("client certificate verifier: {e}")))?;

    let mut config = ServerConfig::builder_with_provider(provider)
        .with_protocol_versions(&[&rustls::version::TLS13])
        .map_err(|e| CredentialError::Tls(format!("TLS version config: {e}")))?
        .with_client_cert_verifier(verifier)
        .with_single_cert(chain, key)
        .map_err(map_tls_error)?;

    config.alpn_protocols = vec![ALPN_H2.to_vec()];
    Ok(config)
}

fn client_config(
    provider: Arc<CryptoProvider>,
    roots: RootCertStore,
    chain: Vec<CertificateDer<'static>>,
    key: PrivateKeyDer<'static>,
) -> Result<ClientConfig> {
    let mut config = ClientConfig::builder_with_provider(provider)
        .with_protocol_versions(&[&rustls::version::TLS13])
        .map_err(|e| CredentialError::Tls(format!("TLS version config: {e}")))?
        .with_root_certificates(roots)
        .with_client_auth_cert(chain, key)
        .map_err(map_tls_error)?;

    config.alpn_protocols = vec![ALPN_H2.to_vec()];
    Ok(config)
}

fn map_tls_error(err: rustls::Error) -> CredentialError {
    match err {
        rustls::Error::InconsistentKeys(InconsistentKeys::KeyMismatch) => {
            CredentialError::KeyMismatch
        }
        other => CredentialError::Tls(other.to_string()),
    }
}
