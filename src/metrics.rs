//! Counters and derived gauges (§6), updated lock-free via atomics — the
//! same atomic-counter style `sqlx`'s pool uses for `size`/`closed`, applied
//! here to the full metrics surface since every counter here is read far
//! more often than it's written under the pool's coarse mutex.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crate::registry::Registry;

/// A point-in-time snapshot of pool metrics, returned by `GetMetrics`.
/// Deliberately not `Serialize`: wire serialization is a caller concern
/// (see Non-goals).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PoolMetrics {
    /// Number of connections currently managed by the pool.
    pub total_connections: u32,
    /// Number of connections with `active = true`.
    pub active_connections: u32,
    /// Number of connections currently checked out.
    pub busy_connections: u32,
    /// Number of active, non-busy connections.
    pub idle_connections: u32,
    /// Total `Acquire` calls that returned a connection.
    pub total_requests: u64,
    /// `Acquire` calls that returned a connection.
    pub successful_requests: u64,
    /// `Acquire` calls that failed (timeout, draining, destroyed).
    pub failed_requests: u64,
    /// EMA (α=0.1) of `Acquire` latency, in milliseconds.
    pub average_response_time_ms: f64,
    /// `busy / total`, as a percentage; `0.0` if the pool is empty.
    pub pool_utilization: f64,
    /// Total connections ever created.
    pub connections_created: u64,
    /// Total connections ever destroyed.
    pub connections_destroyed: u64,
    /// Total successful health probes.
    pub health_checks_passed: u64,
    /// Total failed health probes.
    pub health_checks_failed: u64,
}

/// Lock-free counters, sampled under the pool mutex together with a
/// `Registry` reference to produce a [`PoolMetrics`] snapshot.
#[derive(Debug, Default)]
pub(crate) struct Metrics {
    total_requests: AtomicU64,
    successful_requests: AtomicU64,
    failed_requests: AtomicU64,
    connections_created: AtomicU64,
    connections_destroyed: AtomicU64,
    health_checks_passed: AtomicU64,
    health_checks_failed: AtomicU64,
    // f64 bit pattern; EMA over Acquire latencies, α=0.1 (§6).
    average_response_time_ms_bits: AtomicU64,
}

impl Metrics {
    pub(crate) fn new() -> Metrics {
        Metrics::default()
    }

    pub(crate) fn record_acquire_success(&self, latency: Duration) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
        self.successful_requests.fetch_add(1, Ordering::Relaxed);
        self.update_average_response_time(latency);
    }

    pub(crate) fn record_acquire_failure(&self) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
        self.failed_requests.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_connection_created(&self) {
        self.connections_created.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_connection_destroyed(&self) {
        self.connections_destroyed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_health_check_passed(&self) {
        self.health_checks_passed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_health_check_failed(&self) {
        self.health_checks_failed.fetch_add(1, Ordering::Relaxed);
    }

    fn update_average_response_time(&self, latency: Duration) {
        let t = latency.as_secs_f64() * 1000.0;
        let mut current_bits = self.average_response_time_ms_bits.load(Ordering::Relaxed);
        loop {
            let current = f64::from_bits(current_bits);
            let updated = 0.9 * current + 0.1 * t;
            match self.average_response_time_ms_bits.compare_exchange_weak(
                current_bits,
                updated.to_bits(),
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(observed) => current_bits = observed,
            }
        }
    }

    /// Combines the atomic counters with a live `Registry` scan to produce
    /// the full metrics surface. Must be called with the pool mutex held so
    /// the gauges reflect a consistent snapshot (§5).
    pub(crate) fn snapshot(&self, registry: &Registry) -> PoolMetrics {
        let total_connections = registry.len() as u32;
        let busy_connections = registry.busy_count() as u32;
        let active_connections = registry.active_count() as u32;
        let idle_connections = active_connections.saturating_sub(busy_connections);

        let pool_utilization = if total_connections == 0 {
            0.0
        } else {
            (busy_connections as f64 / total_connections as f64) * 100.0
        };

        PoolMetrics {
            total_connections,
            active_connections,
            busy_connections,
            idle_connections,
            total_requests: self.total_requests.load(Ordering::Relaxed),
            successful_requests: self.successful_requests.load(Ordering::Relaxed),
            failed_requests: self.failed_requests.load(Ordering::Relaxed),
            average_response_time_ms: f64::from_bits(
                self.average_response_time_ms_bits.load(Ordering::Relaxed),
            ),
            pool_utilization,
            connections_created: self.connections_created.load(Ordering::Relaxed),
            connections_destroyed: self.connections_destroyed.load(Ordering::Relaxed),
            health_checks_passed: self.health_checks_passed.load(Ordering::Relaxed),
            health_checks_failed: self.health_checks_failed.load(Ordering::Relaxed),
        }
    }
}

/// Utilization `busy / total * 100`, `0.0` if `total == 0` (§4.6).
pub(crate) fn utilization(busy: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        (busy as f64 / total as f64) * 100.0
    }
}
