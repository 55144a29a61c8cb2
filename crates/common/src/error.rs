//! Common error types for Monitor components.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while turning identity material into TLS credentials.
///
/// Every variant is fatal at startup: a process must not serve or dial
/// without a usable identity.
#[derive(Error, Debug)]
pub enum CredentialError {
    /// A certificate, key or trust bundle file could not be read
    #[error("could not read {kind} file {path}: {source}")]
    Read {
        kind: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A PEM section could not be decoded
    #[error("malformed {kind} PEM: {reason}")]
    MalformedPem { kind: &'static str, reason: String },

    /// The certificate source contained no PEM certificate
    #[error("no certificate found in certificate source")]
    NoCertificate,

    /// The key source contained no PEM private key
    #[error("no private key found in key source")]
    NoPrivateKey,

    /// The private key could not be parsed or uses an unsupported algorithm
    #[error("invalid private key: {0}")]
    InvalidPrivateKey(String),

    /// The private key does not belong to the leaf certificate
    #[error("certificate and private key do not match")]
    KeyMismatch,

    /// The trust bundle yielded no usable trust anchor
    #[error("trust bundle contains no usable trust anchor")]
    NoTrustAnchors,

    /// rustls rejected the assembled configuration
    #[error("TLS configuration error: {0}")]
    Tls(String),
}

/// Result type alias using `CredentialError`
pub type Result<T> = std::result::Result<T, CredentialError>;
