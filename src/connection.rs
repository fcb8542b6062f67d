//! The `Connection` record and its identifiers.

use std::fmt;
use std::time::Duration;

use rand::Rng;
use tokio::time::Instant;

use crate::ProviderId;

/// Opaque unique identifier for a [`Connection`], unique across the process
/// lifetime of the pool that created it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Derives a fresh id from a provider and a random suffix, sufficient
    /// for process-lifetime uniqueness (§4.4).
    pub(crate) fn generate() -> ConnectionId {
        // A random u64 is astronomically unlikely to collide within one
        // process's lifetime; the provider itself is tracked separately on
        // `Connection::provider_id`, so it need not be folded into the id.
        ConnectionId(rand::thread_rng().gen())
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{:016x}", self.0)
    }
}

/// A connection's externally observable status (§6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    /// Currently held by a caller.
    Busy,
    /// Active and available for selection.
    Idle,
    /// Deactivated by the health monitor; awaiting reap.
    Unhealthy,
}

/// A logical handle to one upstream provider endpoint.
///
/// Field invariants are documented in the data model; this type itself does
/// not enforce cross-connection invariants (uniqueness, provider-index
/// consistency) — that is the [`crate::registry::Registry`]'s job.
#[derive(Debug, Clone)]
pub struct Connection {
    id: ConnectionId,
    provider_id: ProviderId,
    active: bool,
    busy: bool,
    created_at: Instant,
    last_used: Instant,
    request_count: u64,
    error_count: u64,
    avg_response_time_ms: f64,
    consecutive_errors: u32,
    max_consecutive_errors: u32,
    health_score: u8,
}

impl Connection {
    pub(crate) fn new(provider_id: ProviderId, max_consecutive_errors: u32) -> Connection {
        let now = Instant::now();
        Connection {
            id: ConnectionId::generate(),
            provider_id,
            active: true,
            busy: false,
            created_at: now,
            last_used: now,
            request_count: 0,
            error_count: 0,
            avg_response_time_ms: 0.0,
            consecutive_errors: 0,
            max_consecutive_errors,
            health_score: 100,
        }
    }

    /// Opaque unique identifier.
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Which provider this connection serves.
    pub fn provider_id(&self) -> &ProviderId {
        &self.provider_id
    }

    /// May be selected for new work.
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Currently held by a caller.
    pub fn is_busy(&self) -> bool {
        self.busy
    }

    /// Wall-clock creation time.
    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    /// Last time marked busy.
    pub fn last_used(&self) -> Instant {
        self.last_used
    }

    /// Number of acquisitions.
    pub fn request_count(&self) -> u64 {
        self.request_count
    }

    /// Total probe failures.
    pub fn error_count(&self) -> u64 {
        self.error_count
    }

    /// EMA of probe latency, in milliseconds.
    pub fn avg_response_time_ms(&self) -> f64 {
        self.avg_response_time_ms
    }

    /// Probe failures since the last success.
    pub fn consecutive_errors(&self) -> u32 {
        self.consecutive_errors
    }

    /// Integer health score in `[0, 100]`.
    pub fn health_score(&self) -> u8 {
        self.health_score
    }

    /// True once `consecutive_errors` has reached the deactivation
    /// threshold, i.e. the connection is in quarantine even if the health
    /// monitor hasn't run its next tick yet.
    pub fn is_quarantined(&self) -> bool {
        self.consecutive_errors >= self.max_consecutive_errors
    }

    /// `busy`/`idle`/`unhealthy` classification (§6).
    pub fn status(&self) -> ConnectionStatus {
        if !self.active {
            ConnectionStatus::Unhealthy
        } else if self.busy {
            ConnectionStatus::Busy
        } else {
            ConnectionStatus::Idle
        }
    }

    /// Eligible for selection: active, not busy, not quarantined.
    pub(crate) fn is_selectable(&self) -> bool {
        self.active && !self.busy && !self.is_quarantined()
    }

    pub(crate) fn mark_busy(&mut self) {
        debug_assert!(self.active, "busy ⇒ active at time of acquisition");
        self.busy = true;
        self.last_used = Instant::now();
        self.request_count += 1;
    }

    pub(crate) fn mark_idle(&mut self) {
        self.busy = false;
        self.last_used = Instant::now();
    }

    pub(crate) fn record_probe_success(&mut self, elapsed: Duration) {
        let t = elapsed.as_secs_f64() * 1000.0;
        self.avg_response_time_ms = 0.8 * self.avg_response_time_ms + 0.2 * t;
        self.consecutive_errors = 0;
        self.health_score = (self.health_score as i32 + 10).min(100) as u8;
    }

    /// Returns `true` if this failure pushed the connection into
    /// quarantine for the first time (i.e. the health monitor should
    /// deactivate it and emit `connectionUnhealthy`).
    pub(crate) fn record_probe_failure(&mut self) -> bool {
        self.consecutive_errors += 1;
        self.error_count += 1;
        self.health_score = (self.health_score as i32 - 20).max(0) as u8;
        if self.consecutive_errors >= self.max_consecutive_errors {
            self.active = false;
            true
        } else {
            false
        }
    }

    pub(crate) fn deactivate(&mut self) {
        self.active = false;
    }
}
