//! Monitor server configuration.
//!
//! Configuration is loaded from environment variables. Only file paths are
//! held here, so `Debug` output is safe to log.

use common::config::{optional_var, port_or, ConfigError, TlsPaths};
use std::collections::HashMap;
use std::env;
use std::net::{Ipv4Addr, SocketAddr};

/// Default gRPC listen port.
pub const DEFAULT_GRPC_PORT: u16 = 50051;

/// Default Prometheus metrics port.
pub const DEFAULT_METRICS_PORT: u16 = 2025;

/// Default server certificate path.
pub const DEFAULT_TLS_CERT_FILE: &str = "certs/server.crt";

/// Default server private key path.
pub const DEFAULT_TLS_KEY_FILE: &str = "certs/server.key";

/// Default trust bundle path.
pub const DEFAULT_TLS_CA_FILE: &str = "certs/ca.crt";

/// Monitor server configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// gRPC listen address (default: "0.0.0.0:50051").
    pub grpc_bind_address: SocketAddr,

    /// Metrics endpoint listen address (default: "0.0.0.0:2025").
    pub metrics_bind_address: SocketAddr,

    /// Server identity and client trust bundle.
    pub tls: TlsPaths,

    /// OTLP collector endpoint; `None` disables trace export.
    pub otlp_endpoint: Option<String>,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if a port is not a valid `u16`.
    pub fn from_env() -> Result<Self, ConfigError> {
        let vars: HashMap<String, String> = env::vars().collect();
        Self::from_vars(&vars)
    }

    /// Load configuration from a map of variables.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if a port is not a valid `u16`.
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let grpc_port = port_or(vars, "GRPC_PORT", DEFAULT_GRPC_PORT)?;
        let metrics_port = port_or(vars, "METRICS_PORT", DEFAULT_METRICS_PORT)?;

        Ok(Self {
            grpc_bind_address: SocketAddr::from((Ipv4Addr::UNSPECIFIED, grpc_port)),
            metrics_bind_address: SocketAddr::from((Ipv4Addr::UNSPECIFIED, metrics_port)),
            tls: TlsPaths::from_vars(
                vars,
                DEFAULT_TLS_CERT_FILE,
                DEFAULT_TLS_KEY_FILE,
                DEFAULT_TLS_CA_FILE,
            ),
            otlp_endpoint: optional_var(vars, "OTLP_COLLECTOR_ENDPOINT"),
        })
    }
}
