//! Monitor client configuration.
//!
//! Configuration is loaded from environment variables. Only addresses and
//! file paths are held here, so `Debug` output is safe to log.

use common::config::{optional_var, port_or, var_or, ConfigError, TlsPaths};
use std::collections::HashMap;
use std::env;
use std::net::{Ipv4Addr, SocketAddr};

/// Default server address (`host:port`).
pub const DEFAULT_GRPC_SERVER_ADDRESS: &str = "server:50059";

/// Default Prometheus metrics port.
pub const DEFAULT_METRICS_PORT: u16 = 2024;

/// Default client certificate path.
pub const DEFAULT_TLS_CERT_FILE: &str = "certs/client.crt.pem";

/// Default client private key path.
pub const DEFAULT_TLS_KEY_FILE: &str = "certs/client.key.pem";

/// Default trust bundle path.
pub const DEFAULT_TLS_CA_FILE: &str = "certs/ca.crt.pem";

/// Where the client dials and which name it expects on the server certificate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelTarget {
    /// Server address as `host:port`.
    pub address: String,
    /// Name verified against the server certificate. Defaults to the host
    /// part of `address`.
    pub server_name: Option<String>,
}

impl ChannelTarget {
    /// Target for `address` (`host:port`), verifying the server certificate
    /// against its host.
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            server_name: None,
        }
    }

    #[must_use]
    pub fn with_server_name(mut self, server_name: impl Into<String>) -> Self {
        self.server_name = Some(server_name.into());
        self
    }
}

/// Monitor client configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Server to dial (default: "server:50059").
    pub target: ChannelTarget,

    /// Metrics endpoint listen address (default: "0.0.0.0:2024").
    pub metrics_bind_address: SocketAddr,

    /// Client identity and server trust bundle.
    pub tls: TlsPaths,

    /// OTLP collector endpoint; `None` disables trace export.
    pub otlp_endpoint: Option<String>,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if the metrics port is not a valid `u16`.
    pub fn from_env() -> Result<Self, ConfigError> {
        let vars: HashMap<String, String> = env::vars().collect();
        Self::from_vars(&vars)
    }

    /// Load configuration from a map of variables.
    ///
    /// The server address itself is validated when the channel is opened.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if the metrics port is not a valid `u16`.
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let metrics_port = port_or(vars, "METRICS_PORT", DEFAULT_METRICS_PORT)?;

        Ok(Self {
            target: ChannelTarget {
                address: var_or(vars, "GRPC_SERVER_ADDRESS", DEFAULT_GRPC_SERVER_ADDRESS),
                server_name: optional_var(vars, "TLS_SERVER_NAME"),
            },
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
