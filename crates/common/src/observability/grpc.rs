//! Tower layer recording per-RPC metrics.
//!
//! Wraps either the tonic server router or a client channel. The status
//! code is read from the `grpc-status` header: tonic sends error statuses
//! as trailers-only responses, so the header is present for every failure.
//! A plain HTTP 200 without it is a successful unary call whose status
//! arrives in the trailers.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Instant;

use tonic::codegen::http;
use tonic::Code;
use tower::{Layer, Service};

use super::metrics::{method_labels, record_grpc_call, RpcSide};

/// Tower layer recording `grpc_{side}_handled_total` and
/// `grpc_{side}_handling_seconds`.
#[derive(Debug, Clone)]
pub struct GrpcMetricsLayer {
    side: RpcSide,
    known_methods: Arc<[&'static str]>,
}

impl GrpcMetricsLayer {
    /// Layer for the serving side. `known_methods` are full gRPC paths.
    #[must_use]
    pub fn server(known_methods: &[&'static str]) -> Self {
        Self {
            side: RpcSide::Server,
            known_methods: known_methods.into(),
        }
    }

    /// Layer for the calling side. `known_methods` are full gRPC paths.
    #[must_use]
    pub fn client(known_methods: &[&'static str]) -> Self {
        Self {
            side: RpcSide::Client,
            known_methods: known_methods.into(),
        }
    }
}

impl<S> Layer<S> for GrpcMetricsLayer {
    type Service = GrpcMetricsService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        GrpcMetricsService {
            inner,
            side: self.side,
            known_methods: Arc::clone(&self.known_methods),
        }
    }
}

/// Service produced by [`GrpcMetricsLayer`].
#[derive(Debug, Clone)]
pub struct GrpcMetricsService<S> {
    inner: S,
    side: RpcSide,
    known_methods: Arc<[&'static str]>,
}

impl<S, ReqBody, ResBody> Service<http::Request<ReqBody>> for GrpcMetricsService<S>
where
    S: Service<http::Request<ReqBody>, Response = http::Response<ResBody>>
        + Clone
        + Send
        + 'static,
    S::Future: Send + 'static,
    ReqBody: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: http::Request<ReqBody>) -> Self::Future {
        // The instance that was polled ready must serve this call.
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);

        let side = self.side;
        let (service, method) = method_labels(&self.known_methods, req.uri().path());
        let (service, method) = (service.to_string(), method.to_string());

        Box::pin(async move {
            let start = Instant::now();
            let result = inner.call(req).await;

            let code = match &result {
                Ok(response) => response_code(response),
                Err(_) => Code::Unavailable,
            };
            record_grpc_call(side, &service, &method, code, start.elapsed());

            result
        })
    }
}

/// gRPC status carried in the response headers.
fn response_code<B>(response: &http::Response<B>) -> Code {
    match response.headers().get("grpc-status") {
        Some(value) => Code::from_bytes(value.as_bytes()),
        None if response.status() == http::StatusCode::OK => Code::Ok,
        None => Code::Unknown,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use metrics_util::debugging::{DebugValue, DebuggingRecorder};
    use std::convert::Infallible;
    use tower::{service_fn, ServiceExt};

    const MONITOR: &str = "/monitoring.MonitoringService/Monitor";

    fn reply(grpc_status: Option<&'static str>) -> http::Response<()> {
        let mut builder = http::Response::builder().status(200);
        if let Some(code) = grpc_status {
            builder = builder.header("grpc-status", code);
        }
        builder.body(()).unwrap()
    }

    #[test]
    fn test_response_code() {
        assert_eq!(response_code(&reply(None)), Code::Ok);
        assert_eq!(response_code(&reply(Some("3"))), Code::InvalidArgument);
        assert_eq!(response_code(&reply(Some("14"))), Code::Unavailable);

        let bad_gateway = http::Response::builder().status(502).body(()).unwrap();
        assert_eq!(response_code(&bad_gateway), Code::Unknown);
    }

    fn recorded_codes(recorder: &DebuggingRecorder) -> Vec<(String, String, u64)> {
        recorder
            .snapshotter()
            .snapshot()
            .into_vec()
            .into_iter()
            .filter_map(|(key, _, _, value)| {
                let DebugValue::Counter(count) = value else {
                    return None;
                };
                let label = |name: &str| {
                    key.key()
                        .labels()
                        .find(|l| l.key() == name)
                        .map(|l| l.value().to_string())
                        .unwrap_or_default()
                };
                Some((label("grpc_method"), label("grpc_code"), count))
            })
            .collect()
    }

    #[tokio::test]
    async fn test_layer_records_status_from_headers() {
        let recorder = DebuggingRecorder::new();
        let _guard = metrics::set_default_local_recorder(&recorder);

        let inner = service_fn(|_req: http::Request<()>| async {
            Ok::<_, Infallible>(reply(Some("3")))
        });
        let svc = GrpcMetricsLayer::server(&[MONITOR]).layer(inner);

        let req = http::Request::builder().uri(MONITOR).body(()).unwrap();
        let response = svc.oneshot(req).await.unwrap();
        assert_eq!(response.status(), http::StatusCode::OK);

        assert_eq!(
            recorded_codes(&recorder),
            vec![("Monitor".to_string(), "InvalidArgument".to_string(), 1)]
        );
    }

    #[tokio::test]
    async fn test_layer_maps_unknown_paths_and_inner_errors() {
        let recorder = DebuggingRecorder::new();
        let _guard = metrics::set_default_local_recorder(&recorder);

        let inner = service_fn(|_req: http::Request<()>| async {
            Err::<http::Response<()>, _>("connection refused")
        });
        let svc = GrpcMetricsLayer::client(&[MONITOR]).layer(inner);

        let req = http::Request::builder()
            .uri("/scanner.Probe/Anything")
            .body(())
            .unwrap();
        assert!(svc.oneshot(req).await.is_err());

        assert_eq!(
            recorded_codes(&recorder),
            vec![("unknown".to_string(), "Unavailable".to_string(), 1)]
        );
    }
}
