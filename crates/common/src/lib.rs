//! Common utilities and types shared by the Monitor client and server.

#![warn(clippy::pedantic)]

/// Module for common error types
pub mod error;

/// Module for common configuration
pub mod config;

/// Module for secret types that prevent accidental logging
pub mod secret;

/// Module for mutual-TLS credential construction
pub mod tls;

/// Module for tracing subscriber and OTLP trace export setup
pub mod telemetry;

/// Module for metrics recording and the Prometheus endpoint
pub mod observability;

/// Module for process signal handling
pub mod shutdown;

/// Module for throwaway PKI fixtures used by tests
#[cfg(any(test, feature = "test-utils"))]
pub mod testing;
