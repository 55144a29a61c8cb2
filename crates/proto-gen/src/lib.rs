//! Generated Protocol Buffer code for the Monitor service.
//!
//! This crate contains the compiled `monitoring.proto` definitions shared by
//! the client and the server, plus the literal values both sides agree on.

#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::doc_markdown)] // Generated code has various doc formatting

// Re-export prost traits for convenience
pub use prost::Message;

// Generated protobuf modules
pub mod monitoring {
    //! `Monitor` request/response messages and service stubs
    tonic::include_proto!("monitoring");
}

/// Encoded `FileDescriptorSet` for `monitoring.proto` and its imports.
pub const FILE_DESCRIPTOR_SET: &[u8] = tonic::include_file_descriptor_set!("monitoring_descriptor");

/// Values fixed by the `Monitor` contract.
pub mod contract {
    /// Fully-qualified gRPC service name.
    pub const SERVICE_NAME: &str = "monitoring.MonitoringService";

    /// HTTP/2 path of the `Monitor` method.
    pub const MONITOR_PATH: &str = "/monitoring.MonitoringService/Monitor";

    /// The only message the server accepts.
    pub const HEARTBEAT_MESSAGE: &str = "ping";

    /// Message the client sends to exercise the rejection path.
    pub const PROBE_MESSAGE: &str = "wrong";

    /// Reply appended to every acknowledgement.
    pub const REPLY: &str = "pong";

    /// `strftime` layout of the echoed request timestamp (always UTC).
    pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
}
