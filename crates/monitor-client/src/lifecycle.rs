//! Client lifecycle: periodic call tasks and graceful shutdown.
//!
//! # States
//!
//! `Starting -> Running -> ShuttingDown -> Stopped`, published on a
//! `tokio::sync::watch` channel.
//!
//! # Tasks
//!
//! Two independent tasks share one [`MonitorCalls`] implementation:
//!
//! - heartbeat, every [`HEARTBEAT_PERIOD`]
//! - probe, every [`PROBE_PERIOD`]
//!
//! Each task fires one period after start and skips missed ticks. A call
//! finishes (or is abandoned on cancellation) before the same task ticks
//! again. Failures are logged; the schedule continues.
//!
//! # Shutdown
//!
//! The metrics endpoint drains (bounded by the grace period) concurrently
//! with cancelling the tasks and closing the channel.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use common::observability::{metrics_router, MetricsEndpoint, MetricsSource, ShutdownOutcome};
use common::tls::{build_client_credentials, IdentityMaterial};
use metrics_exporter_prometheus::PrometheusHandle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::counters::CallCounters;
use crate::errors::ClientError;
use crate::invoker::MonitorClient;

/// Heartbeat cadence.
pub const HEARTBEAT_PERIOD: Duration = Duration::from_secs(15);

/// Probe cadence.
pub const PROBE_PERIOD: Duration = Duration::from_secs(120);

/// Upper bound on draining in-flight metrics scrapes.
pub const METRICS_SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// The calls the periodic tasks make.
#[async_trait]
pub trait MonitorCalls: Send + Sync + 'static {
    /// Send a heartbeat; returns the acknowledgement text.
    async fn send_heartbeat(&self) -> Result<String, ClientError>;

    /// Send the probe; `Ok(())` means it was rejected as expected.
    async fn send_probe(&self) -> Result<(), ClientError>;

    /// Release underlying resources.
    fn close(self)
    where
        Self: Sized;
}

#[async_trait]
impl MonitorCalls for MonitorClient {
    async fn send_heartbeat(&self) -> Result<String, ClientError> {
        MonitorClient::send_heartbeat(self).await
    }

    async fn send_probe(&self) -> Result<(), ClientError> {
        MonitorClient::send_probe(self).await
    }

    fn close(self) {
        MonitorClient::close(self);
    }
}

/// Task periods and the metrics drain bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Schedule {
    /// Delay between heartbeats, starting one period after launch.
    pub heartbeat_period: Duration,
    /// Delay between probes, starting one period after launch.
    pub probe_period: Duration,
    /// How long shutdown waits for open metrics scrapes.
    pub metrics_grace: Duration,
}

impl Default for Schedule {
    fn default() -> Self {
        Self {
            heartbeat_period: HEARTBEAT_PERIOD,
            probe_period: PROBE_PERIOD,
            metrics_grace: METRICS_SHUTDOWN_GRACE,
        }
    }
}

/// Orchestrator phase, published on [`Orchestrator::state`].
///
/// Moves forward only: `Starting`, `Running`, `ShuttingDown`, `Stopped`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    /// Credentials, channel and metrics endpoint are being set up.
    Starting,
    /// Periodic tasks are firing.
    Running,
    /// Tasks are cancelled and the metrics endpoint is draining.
    ShuttingDown,
    /// Channel closed and metrics endpoint gone.
    Stopped,
}

/// Owns the periodic tasks, the metrics endpoint and the calls
/// implementation until [`Orchestrator::shutdown`].
///
/// Dropping an orchestrator without calling `shutdown` still cancels the
/// tasks.
pub struct Orchestrator<C: MonitorCalls> {
    calls: Arc<C>,
    metrics_endpoint: Option<MetricsEndpoint>,
    schedule: Schedule,
    tasks: Vec<JoinHandle<()>>,
    state_tx: watch::Sender<LifecycleState>,
    drop_guard: DropGuard,
}

impl Orchestrator<MonitorClient> {
    /// Build credentials, open the channel, bind the metrics endpoint and
    /// start both periodic tasks.
    ///
    /// # Errors
    ///
    /// Returns `ClientError` if the identity material cannot be loaded, the
    /// server address is invalid, or the metrics port cannot be bound.
    pub async fn start(
        config: &Config,
        prometheus_handle: PrometheusHandle,
        schedule: Schedule,
    ) -> Result<Self, ClientError> {
        let credentials = IdentityMaterial::load(&config.tls)
            .and_then(|material| build_client_credentials(&material))
            .map_err(|e| {
                error!(target: "monitor.client", error = %e, "Failed to build client TLS credentials");
                ClientError::from(e)
            })?;
        info!(target: "monitor.client", "Client TLS credentials loaded");

        let counters = CallCounters::new();
        let client = MonitorClient::open(&config.target, &credentials, Arc::clone(&counters))
            .map_err(|e| {
                error!(target: "monitor.client", error = %e, "Failed to configure channel");
                ClientError::from(e)
            })?;

        let sources: Vec<Arc<dyn MetricsSource>> = vec![counters];
        let metrics_endpoint = MetricsEndpoint::bind(
            config.metrics_bind_address,
            metrics_router(prometheus_handle, sources),
        )
        .await
        .map_err(|e| {
            error!(target: "monitor.client", error = %e, "Failed to start metrics server");
            ClientError::from(e)
        })?;

        Ok(Self::with_parts(client, Some(metrics_endpoint), schedule))
    }
}

impl<C: MonitorCalls> Orchestrator<C> {
    /// Start the periodic tasks over an already-built calls implementation.
    ///
    /// Must be called from within a tokio runtime.
    pub fn with_parts(
        calls: C,
        metrics_endpoint: Option<MetricsEndpoint>,
        schedule: Schedule,
    ) -> Self {
        let (state_tx, _) = watch::channel(LifecycleState::Starting);
        let calls = Arc::new(calls);
        let shutdown_token = CancellationToken::new();

        let heartbeat_calls = Arc::clone(&calls);
        let heartbeat = tokio::spawn(run_periodic(
            "heartbeat",
            schedule.heartbeat_period,
            shutdown_token.child_token(),
            move || {
                let calls = Arc::clone(&heartbeat_calls);
                async move {
                    match calls.send_heartbeat().await {
                        Ok(response) => {
                            info!(target: "monitor.client", response = %response, "Heartbeat acknowledged");
                        }
                        Err(e) => {
                            warn!(target: "monitor.client", error = %e, "Heartbeat failed");
                        }
                    }
                }
            },
        ));

        let probe_calls = Arc::clone(&calls);
        let probe = tokio::spawn(run_periodic(
            "probe",
            schedule.probe_period,
            shutdown_token.child_token(),
            move || {
                let calls = Arc::clone(&probe_calls);
                async move {
                    match calls.send_probe().await {
                        Ok(()) => {
                            info!(target: "monitor.client", "Probe rejected as expected");
                        }
                        Err(e) => {
                            warn!(target: "monitor.client", error = %e, "Probe produced an unexpected outcome");
                        }
                    }
                }
            },
        ));

        info!(
            target: "monitor.client",
            heartbeat_period_secs = schedule.heartbeat_period.as_secs_f64(),
            probe_period_secs = schedule.probe_period.as_secs_f64(),
            "Periodic tasks started"
        );
        state_tx.send_replace(LifecycleState::Running);

        Self {
            calls,
            metrics_endpoint,
            schedule,
            drop_guard: shutdown_token.drop_guard(),
            tasks: vec![heartbeat, probe],
            state_tx,
        }
    }

    /// Subscribe to state changes.
    #[must_use]
    pub fn state(&self) -> watch::Receiver<LifecycleState> {
        self.state_tx.subscribe()
    }

    /// Address the metrics endpoint is listening on, if one was started.
    #[must_use]
    pub fn metrics_addr(&self) -> Option<std::net::SocketAddr> {
        self.metrics_endpoint.as_ref().map(MetricsEndpoint::local_addr)
    }

    /// Stop everything and close the calls implementation exactly once.
    pub async fn shutdown(self) {
        let Self {
            calls,
            metrics_endpoint,
            schedule,
            tasks,
            state_tx,
            drop_guard,
        } = self;

        state_tx.send_replace(LifecycleState::ShuttingDown);
        info!(target: "monitor.client", "Initiating graceful shutdown...");

        let drain_metrics = async move {
            if let Some(endpoint) = metrics_endpoint {
                if endpoint.shutdown(schedule.metrics_grace).await
                    == ShutdownOutcome::GracePeriodElapsed
                {
                    warn!(target: "monitor.client", "Metrics server did not drain within grace period");
                }
            }
        };

        let stop_tasks = async move {
            drop_guard.disarm().cancel();
            for task in tasks {
                if let Err(e) = task.await {
                    error!(target: "monitor.client", error = %e, "Periodic task panicked");
                }
            }
            match Arc::try_unwrap(calls) {
                Ok(calls) => calls.close(),
                Err(_) => {
                    warn!(target: "monitor.client", "Channel still shared at shutdown, not closed");
                }
            }
        };

        tokio::join!(drain_metrics, stop_tasks);

        state_tx.send_replace(LifecycleState::Stopped);
        info!(target: "monitor.client", "Client shutdown complete");
    }
}

/// Run `tick` every `period` until `token` is cancelled.
async fn run_periodic<F, Fut>(name: &'static str, period: Duration, token: CancellationToken, mut tick: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = ()>,
{
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            biased;
            () = token.cancelled() => break,
            _ = ticker.tick() => {
                tokio::select! {
                    biased;
                    () = token.cancelled() => {
                        debug!(target: "monitor.client", task = name, "In-flight call abandoned");
                        break;
                    }
                    () = tick() => {}
                }
            }
        }
    }

    info!(target: "monitor.client", task = name, "Periodic task stopped");
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use common::observability::metrics::metrics_builder;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::{mpsc, Mutex};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;
    use tonic::Status;

    #[derive(Default)]
    struct CallLog {
        heartbeats: AtomicUsize,
        probes: AtomicUsize,
        closed: AtomicBool,
    }

    struct MockCalls {
        record: Arc<CallLog>,
        fail: bool,
        hang: bool,
    }

    impl MockCalls {
        fn new(record: &Arc<CallLog>) -> Self {
            Self {
                record: Arc::clone(record),
                fail: false,
                hang: false,
            }
        }
    }

    #[async_trait]
    impl MonitorCalls for MockCalls {
        async fn send_heartbeat(&self) -> Result<String, ClientError> {
            self.record.heartbeats.fetch_add(1, Ordering::SeqCst);
            if self.hang {
                std::future::pending::<()>().await;
            }
            if self.fail {
                return Err(ClientError::Rpc(Status::unavailable("connection refused")));
            }
            Ok("ping on 2025-05-31 14:23:00, response: pong".to_string())
        }

        async fn send_probe(&self) -> Result<(), ClientError> {
            self.record.probes.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(ClientError::Rpc(Status::unavailable("connection refused")));
            }
            Ok(())
        }

        fn close(self) {
            self.record.closed.store(true, Ordering::SeqCst);
        }
    }

    /// Blocks a scrape until the test releases it.
    struct GatedSource {
        entered: AtomicBool,
        release: Mutex<mpsc::Receiver<()>>,
    }

    impl MetricsSource for GatedSource {
        fn publish(&self) {
            self.entered.store(true, Ordering::SeqCst);
            let _ = self
                .release
                .lock()
                .unwrap()
                .recv_timeout(Duration::from_secs(10));
        }
    }

    #[test]
    fn test_default_schedule() {
        let schedule = Schedule::default();

        assert_eq!(schedule.heartbeat_period, Duration::from_secs(15));
        assert_eq!(schedule.probe_period, Duration::from_secs(120));
        assert_eq!(schedule.metrics_grace, Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn test_tasks_fire_on_their_periods() {
        let record = Arc::new(CallLog::default());
        let orchestrator =
            Orchestrator::with_parts(MockCalls::new(&record), None, Schedule::default());

        // Nothing fires at start
        tokio::time::sleep(Duration::from_secs(14)).await;
        assert_eq!(record.heartbeats.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_millis(106_500)).await;
        assert_eq!(record.heartbeats.load(Ordering::SeqCst), 8);
        assert_eq!(record.probes.load(Ordering::SeqCst), 1);

        orchestrator.shutdown().await;
        assert!(record.closed.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failures_do_not_stop_schedule() {
        let record = Arc::new(CallLog::default());
        let mut calls = MockCalls::new(&record);
        calls.fail = true;
        let orchestrator = Orchestrator::with_parts(calls, None, Schedule::default());

        tokio::time::sleep(Duration::from_millis(240_500)).await;

        assert_eq!(record.heartbeats.load(Ordering::SeqCst), 16);
        assert_eq!(record.probes.load(Ordering::SeqCst), 2);

        orchestrator.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_abandons_in_flight_call() {
        let record = Arc::new(CallLog::default());
        let mut calls = MockCalls::new(&record);
        calls.hang = true;
        let orchestrator = Orchestrator::with_parts(calls, None, Schedule::default());

        tokio::time::sleep(Duration::from_millis(15_500)).await;
        assert_eq!(record.heartbeats.load(Ordering::SeqCst), 1);

        orchestrator.shutdown().await;

        assert!(record.closed.load(Ordering::SeqCst));
        // The hung heartbeat blocked further ticks of its own task
        assert_eq!(record.heartbeats.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_state_transitions() {
        let record = Arc::new(CallLog::default());
        let orchestrator =
            Orchestrator::with_parts(MockCalls::new(&record), None, Schedule::default());
        let state = orchestrator.state();
        assert_eq!(*state.borrow(), LifecycleState::Running);
        assert_eq!(orchestrator.metrics_addr(), None);

        orchestrator.shutdown().await;

        assert_eq!(*state.borrow(), LifecycleState::Stopped);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_state_is_shutting_down_while_metrics_drain() {
        let (release_tx, release_rx) = mpsc::channel();
        let source = Arc::new(GatedSource {
            entered: AtomicBool::new(false),
            release: Mutex::new(release_rx),
        });
        let sources: Vec<Arc<dyn MetricsSource>> = vec![source.clone()];
        let handle = metrics_builder().unwrap().build_recorder().handle();
        let endpoint = MetricsEndpoint::bind(
            "127.0.0.1:0".parse().unwrap(),
            metrics_router(handle, sources),
        )
        .await
        .unwrap();
        let metrics_addr = endpoint.local_addr();

        let record = Arc::new(CallLog::default());
        let orchestrator =
            Orchestrator::with_parts(MockCalls::new(&record), Some(endpoint), Schedule::default());
        let mut state = orchestrator.state();
        assert_eq!(*state.borrow(), LifecycleState::Running);

        // An in-flight scrape keeps the metrics drain, and so shutdown, open
        let scrape = tokio::spawn(async move {
            let mut stream = TcpStream::connect(metrics_addr).await.unwrap();
            stream
                .write_all(b"GET /metrics HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
                .await
                .unwrap();
            let mut response = Vec::new();
            stream.read_to_end(&mut response).await.unwrap();
            response
        });
        while !source.entered.load(Ordering::SeqCst) {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        let shutdown = tokio::spawn(orchestrator.shutdown());
        state
            .wait_for(|s| *s == LifecycleState::ShuttingDown)
            .await
            .unwrap();
        assert!(!shutdown.is_finished());

        release_tx.send(()).unwrap();
        shutdown.await.unwrap();

        assert_eq!(*state.borrow(), LifecycleState::Stopped);
        assert!(record.closed.load(Ordering::SeqCst));
        assert!(scrape.await.unwrap().starts_with(b"HTTP/1.1 200"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_cancels_tasks() {
        let record = Arc::new(CallLog::default());
        let orchestrator =
            Orchestrator::with_parts(MockCalls::new(&record), None, Schedule::default());

        drop(orchestrator);
        tokio::time::sleep(Duration::from_secs(60)).await;

        assert_eq!(record.heartbeats.load(Ordering::SeqCst), 0);
    }
}
