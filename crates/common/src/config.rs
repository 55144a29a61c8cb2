//! Common configuration types for Monitor components.
//!
//! Both binaries read their settings once from environment variables.
//! Empty values are treated as unset so that `FOO=` in a compose file
//! falls back to the default instead of producing an empty path.

use std::collections::HashMap;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration value for {key}: {reason}")]
    InvalidValue { key: String, reason: String },
}

/// Locations of the identity material for one process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsPaths {
    /// PEM certificate chain presented to the peer.
    pub cert_file: PathBuf,
    /// PEM private key matching `cert_file`.
    pub key_file: PathBuf,
    /// PEM bundle of trust anchors used to verify the peer.
    pub ca_file: PathBuf,
}

impl TlsPaths {
    /// Read `TLS_CERT_FILE`, `TLS_KEY_FILE` and `TLS_CA_FILE`, falling back
    /// to the given defaults.
    pub fn from_vars(
        vars: &HashMap<String, String>,
        default_cert: &str,
        default_key: &str,
        default_ca: &str,
    ) -> Self {
        Self {
            cert_file: PathBuf::from(var_or(vars, "TLS_CERT_FILE", default_cert)),
            key_file: PathBuf::from(var_or(vars, "TLS_KEY_FILE", default_key)),
            ca_file: PathBuf::from(var_or(vars, "TLS_CA_FILE", default_ca)),
        }
    }
}

/// Look up `key`, returning `default` when it is missing or empty.
pub fn var_or(vars: &HashMap<String, String>, key: &str, default: &str) -> String {
    optional_var(vars, key).unwrap_or_else(|| default.to_string())
}

/// Look up `key`, returning `None` when it is missing or empty.
pub fn optional_var(vars: &HashMap<String, String>, key: &str) -> Option<String> {
    vars.get(key)
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Look up a TCP port, returning `default` when it is missing or empty.
///
/// # Errors
///
/// Returns `ConfigError::InvalidValue` if the value is not a valid `u16`.
pub fn port_or(vars: &HashMap<String, String>, key: &str, default: u16) -> Result<u16, ConfigError> {
    match optional_var(vars, key) {
        None => Ok(default),
        Some(raw) => raw.parse().map_err(|e| ConfigError::InvalidValue {
            key: key.to_string(),
            reason: format!("{raw:?} is not a port number: {e}"),
        }),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_var_or_treats_empty_as_unset() {
        let vars = HashMap::from([
            ("SET".to_string(), "value".to_string()),
            ("EMPTY".to_string(), "  ".to_string()),
        ]);

        assert_eq!(var_or(&vars, "SET", "default"), "value");
        assert_eq!(var_or(&vars, "EMPTY", "default"), "default");
        assert_eq!(var_or(&vars, "MISSING", "default"), "default");
        assert_eq!(optional_var(&vars, "EMPTY"), None);
    }

    #[test]
    fn test_port_or() {
        let vars = HashMap::from([
            ("GOOD".to_string(), "2024".to_string()),
            ("BAD".to_string(), "http".to_string()),
            ("TOO_BIG".to_string(), "70000".to_string()),
        ]);

        assert_eq!(port_or(&vars, "GOOD", 1).unwrap(), 2024);
        assert_eq!(port_or(&vars, "MISSING", 1).unwrap(), 1);
        assert!(matches!(
            port_or(&vars, "BAD", 1),
            Err(ConfigError::InvalidValue { key, .. }) if key == "BAD"
        ));
        assert!(port_or(&vars, "TOO_BIG", 1).is_err());
    }

    #[test]
    fn test_tls_paths_from_vars() {
        let vars = HashMap::from([("TLS_CA_FILE".to_string(), "/etc/pki/ca.pem".to_string())]);

        let paths = TlsPaths::from_vars(&vars, "a.crt", "a.key", "ca.crt");

        assert_eq!(paths.cert_file, PathBuf::from("a.crt"));
        assert_eq!(paths.key_file, PathBuf::from("a.key"));
        assert_eq!(paths.ca_file, PathBuf::from("/etc/pki/ca.pem"));
    }
}
