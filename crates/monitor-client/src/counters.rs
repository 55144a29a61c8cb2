//! Call outcome counters.
//!
//! Owned by one `MonitorClient` and mutated only by it. Every call bumps
//! `total` and then exactly one of `success` / `failure`. Values only grow;
//! they reset when the process restarts.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use common::observability::MetricsSource;
use metrics::counter;

/// Prometheus name of the total call counter.
pub const TOTAL_REQUESTS: &str = "grpc_client_total_requests";

/// Prometheus name of the successful call counter.
pub const SUCCESS_REQUESTS: &str = "grpc_client_success_requests";

/// Prometheus name of the failed call counter.
pub const FAILED_REQUESTS: &str = "grpc_client_failed_requests";

/// Outcome counters for calls made through one invoker.
#[derive(Debug, Default)]
pub struct CallCounters {
    total: AtomicU64,
    success: AtomicU64,
    failure: AtomicU64,
}

/// Point-in-time copy of [`CallCounters`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CounterSnapshot {
    pub total: u64,
    pub success: u64,
    pub failure: u64,
}

impl CallCounters {
    /// Create a new shared counter set.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn record_attempt(&self) {
        self.total.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn record_success(&self) {
        self.success.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn record_failure(&self) {
        self.failure.fetch_add(1, Ordering::SeqCst);
    }

    #[must_use]
    pub fn snapshot(&self) -> CounterSnapshot {
        CounterSnapshot {
            total: self.total.load(Ordering::SeqCst),
            success: self.success.load(Ordering::SeqCst),
            failure: self.failure.load(Ordering::SeqCst),
        }
    }
}

impl MetricsSource for CallCounters {
    fn publish(&self) {
        let snapshot = self.snapshot();
        counter!(TOTAL_REQUESTS).absolute(snapshot.total);
        counter!(SUCCESS_REQUESTS).absolute(snapshot.success);
        counter!(FAILED_REQUESTS).absolute(snapshot.failure);
    }
}
