//! Observability for Monitor processes.
//!
//! Provides metrics definitions, the gRPC metrics layer and the
//! Prometheus scrape endpoint.

pub mod endpoint;
pub mod grpc;
pub mod metrics;

pub use self::endpoint::{metrics_router, MetricsEndpoint, MetricsEndpointError, MetricsSource, ShutdownOutcome};
pub use self::grpc::GrpcMetricsLayer;
pub use self::metrics::{init_metrics_recorder, RpcSide};
