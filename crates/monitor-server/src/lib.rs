//! Monitor Server Library
//!
//! Serves the single `Monitor` RPC over mutually-authenticated TLS:
//!
//! - Every connection must present a client certificate chaining to the
//!   configured trust bundle
//! - Requests are validated and acknowledged with a formatted echo
//! - Invalid requests are rejected with `InvalidArgument`
//!
//! # Modules
//!
//! - [`config`] - Server configuration from environment
//! - [`errors`] - Validation and startup error types
//! - [`grpc`] - `MonitoringService` implementation and server runner
//! - [`transport`] - TLS accept loop feeding the gRPC server

#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod errors;
pub mod grpc;
pub mod transport;
