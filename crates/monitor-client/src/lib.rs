//! Monitor Client Library
//!
//! Keeps one mutually-authenticated channel to the Monitor server and
//! exercises it on a fixed schedule:
//!
//! - Heartbeat (every 15s): a well-formed `"ping"` that must be acknowledged
//! - Probe (every 120s): a deliberately invalid `"wrong"` that must be rejected
//!
//! Outcomes are counted and published on the Prometheus `/metrics` endpoint.
//!
//! # Modules
//!
//! - [`config`] - Client configuration from environment
//! - [`counters`] - Call outcome counters
//! - [`errors`] - Client error types
//! - [`invoker`] - `MonitorClient`, the channel owner
//! - [`lifecycle`] - Periodic tasks and graceful shutdown

#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod counters;
pub mod errors;
pub mod invoker;
pub mod lifecycle;
