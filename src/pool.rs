//! The Pool itself: Acquirer, Queue Pump, and lifecycle operations
//! (Warmup/Drain/Destroy), all guarded by one coarse mutex (§5).
//!
//! Structurally this is an `Arc<SharedPool<P>>` behind a cheap-to-clone
//! `Pool<P>`, with a oneshot-based wait path and a single mutex-guarded
//! `Internals`, extended with a selector, waiter priority, and three
//! background tasks to serve many providers instead of one backend.

use std::fmt;
use std::sync::{Arc, Mutex as StdMutex, Weak};
use std::time::Duration;

use tokio::sync::{Mutex, Notify};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::config::PoolConfig;
use crate::connection::{Connection, ConnectionId, ConnectionStatus};
use crate::error::PoolError;
use crate::events::{Event, EventSink, NopEventSink};
use crate::metrics::{Metrics, PoolMetrics};
use crate::probe::ProbeProvider;
use crate::registry::Registry;
use crate::selector::Selector;
use crate::waiter::{WaiterQueue, WaiterResolution};
use crate::ProviderId;

/// Per-provider counts returned by `GetProviderStats`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProviderStats {
    /// Total connections registered for this provider.
    pub total: u32,
    /// Connections with `active = true`.
    pub active: u32,
    /// Connections currently checked out.
    pub busy: u32,
    /// Active, non-busy connections.
    pub idle: u32,
}

/// The pool data protected by the single logical mutex (§5): the Registry,
/// Provider Index (inside `Registry`), Waiter Queue, and the Selector's
/// rolling round-robin index.
struct Internals<E> {
    registry: Registry,
    waiters: WaiterQueue<E>,
    selector: Selector,
    draining: bool,
    destroyed: bool,
}

impl<E> Internals<E> {
    fn new() -> Internals<E> {
        Internals {
            registry: Registry::new(),
            waiters: WaiterQueue::new(),
            selector: Selector::new(),
            draining: false,
            destroyed: false,
        }
    }
}

/// The guts of a `Pool`, shared behind an `Arc`. The three background tasks
/// (`health`, `scaler`, `janitor`) hold only a `Weak` reference to this and
/// drive it through the tick methods below.
pub(crate) struct SharedPool<P>
where
    P: ProbeProvider,
{
    config: PoolConfig,
    provider: P,
    event_sink: StdMutex<Box<dyn EventSink>>,
    metrics: Metrics,
    internals: Mutex<Internals<P::Error>>,
    drain_notify: Notify,
    health_handle: StdMutex<Option<JoinHandle<()>>>,
    scaler_handle: StdMutex<Option<JoinHandle<()>>>,
    janitor_handle: StdMutex<Option<JoinHandle<()>>>,
}

impl<P> fmt::Debug for SharedPool<P>
where
    P: ProbeProvider,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedPool").finish_non_exhaustive()
    }
}

impl<P> SharedPool<P>
where
    P: ProbeProvider,
{
    fn emit(&self, event: Event) {
        log_event(&event);
        let sink = self.event_sink.lock().unwrap().boxed_clone();
        sink.sink(event);
    }

    pub(crate) fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Probes every registered connection concurrently and folds the
    /// results back into per-connection health state (§4.5). Never
    /// destroys a connection itself — that's the Janitor's job once
    /// `active` goes false.
    pub(crate) async fn run_health_tick(&self) {
        let targets: Vec<(ConnectionId, ProviderId)> = {
            let internals = self.internals.lock().await;
            internals
                .registry
                .iter()
                .map(|c| (c.id(), c.provider_id().clone()))
                .collect()
        };

        if targets.is_empty() {
            return;
        }

        let mut probes = futures::stream::FuturesUnordered::new();
        for (id, provider_id) in targets {
            probes.push(async move {
                let (result, elapsed) = crate::probe::timed_probe(&self.provider, &provider_id).await;
                (id, provider_id, result, elapsed)
            });
        }

        use futures::StreamExt;
        while let Some((id, provider_id, result, elapsed)) = probes.next().await {
            let mut internals = self.internals.lock().await;
            let Some(conn) = internals.registry.get_mut(id) else {
                continue;
            };
            match result {
                Ok(()) => {
                    conn.record_probe_success(elapsed);
                    self.metrics.record_health_check_passed();
                }
                Err(_) => {
                    let newly_deactivated = conn.record_probe_failure();
                    let consecutive_errors = conn.consecutive_errors();
                    self.metrics.record_health_check_failed();
                    if newly_deactivated {
                        self.emit(Event::ConnectionUnhealthy {
                            id,
                            provider_id,
                            consecutive_errors,
                        });
                    }
                }
            }
        }
    }

    /// One auto-scaling decision per call: scale up the provider with the
    /// highest local load, or scale down the longest-idle connection,
    /// depending on overall utilization (§4.6).
    pub(crate) async fn run_scaler_tick(&self) {
        let mut internals = self.internals.lock().await;
        let total = internals.registry.len();
        let busy = internals.registry.busy_count();
        let utilization = crate::metrics::utilization(busy, total);

        if utilization > self.config.scale_up_threshold {
            let providers: Vec<ProviderId> = internals.registry.providers_in_order().cloned().collect();
            let mut best: Option<(ProviderId, f64)> = None;
            for provider_id in &providers {
                let provider_len = internals.registry.provider_len(provider_id);
                if provider_len == 0 {
                    continue;
                }
                let provider_busy = internals
                    .registry
                    .connection_ids_for(provider_id)
                    .iter()
                    .filter_map(|&id| internals.registry.get(id))
                    .filter(|c| c.is_busy())
                    .count();
                let load = provider_busy as f64 / provider_len as f64;
                if best.as_ref().map_or(true, |(_, best_load)| load > *best_load) {
                    best = Some((provider_id.clone(), load));
                }
            }

            match best {
                Some((provider_id, _))
                    if internals.registry.len() < self.config.max_connections as usize
                        && internals.registry.provider_len(&provider_id)
                            < self.config.max_connections as usize =>
                {
                    let conn = Connection::new(provider_id.clone(), self.config.max_consecutive_errors);
                    let id = conn.id();
                    internals.registry.insert(conn);
                    self.metrics.record_connection_created();
                    drop(internals);
                    self.emit(Event::ScaledUp { provider_id, id });
                }
                Some((provider_id, _)) => {
                    drop(internals);
                    self.emit(Event::ScaledUpFailed { provider_id });
                }
                None => {}
            }
        } else if utilization < self.config.scale_down_threshold {
            let candidate = internals
                .registry
                .iter()
                .filter(|c| c.is_active() && !c.is_busy())
                .min_by_key(|c| c.last_used())
                .map(|c| (c.id(), c.provider_id().clone()));

            if let Some((id, provider_id)) = candidate {
                if total.saturating_sub(1) >= self.config.min_connections as usize {
                    internals.registry.remove(id);
                    self.metrics.record_connection_destroyed();
                    drop(internals);
                    self.emit(Event::ScaledDown { provider_id, id });
                }
            }
        }
    }

    /// Reaps connections past their max age, idle past their timeout, or
    /// already inactive (§4.7). Busy connections are always exempt.
    pub(crate) async fn run_janitor_tick(&self) {
        let mut internals = self.internals.lock().await;
        let now = Instant::now();

        let doomed: Vec<ConnectionId> = internals
            .registry
            .iter()
            .filter(|c| !c.is_busy())
            .filter(|c| {
                now.duration_since(c.created_at()) > self.config.max_connection_age
                    || now.duration_since(c.last_used()) > self.config.idle_timeout
                    || !c.is_active()
            })
            .map(Connection::id)
            .collect();

        let mut count = 0u32;
        for id in doomed {
            if internals.registry.remove(id).is_some() {
                self.metrics.record_connection_destroyed();
                count += 1;
            }
        }

        let resolutions = if count > 0 {
            queue_pump(self, &mut internals)
        } else {
            Vec::new()
        };
        drop(internals);
        send_resolutions(resolutions);

        if count > 0 {
            self.emit(Event::CleanupCompleted { count });
        }
    }
}

fn log_event(event: &Event) {
    match event {
        Event::ConnectionCreated { id, provider_id } => {
            tracing::debug!(%id, %provider_id, "connection created")
        }
        Event::ConnectionDestroyed { id, provider_id } => {
            tracing::debug!(%id, %provider_id, "connection destroyed")
        }
        Event::ConnectionUnhealthy {
            id,
            provider_id,
            consecutive_errors,
        } => {
            tracing::warn!(%id, %provider_id, consecutive_errors, "connection deactivated")
        }
        Event::ScaledUp { provider_id, id } => {
            tracing::info!(%provider_id, %id, "auto-scaler grew pool")
        }
        Event::ScaledUpFailed { provider_id } => {
            tracing::warn!(%provider_id, "auto-scaler failed to grow pool")
        }
        Event::ScaledDown { provider_id, id } => {
            tracing::info!(%provider_id, %id, "auto-scaler shrank pool")
        }
        Event::CleanupCompleted { count } => {
            tracing::info!(count, "janitor swept connections")
        }
        Event::WarmupCompleted { provider_id, count } => {
            tracing::info!(%provider_id, count, "warmup completed")
        }
    }
}

/// A generic, multi-provider connection pool.
pub struct Pool<P>
where
    P: ProbeProvider,
{
    inner: Arc<SharedPool<P>>,
}

impl<P> Clone for Pool<P>
where
    P: ProbeProvider,
{
    fn clone(&self) -> Self {
        Pool {
            inner: self.inner.clone(),
        }
    }
}

impl<P> fmt::Debug for Pool<P>
where
    P: ProbeProvider,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_fmt(format_args!("Pool({:p})", self.inner))
    }
}

// Advances the queue: while waiters remain, try to satisfy the head with an
// idle candidate or a freshly created connection (§4.2). Must be called with
// `internals` locked. Computes resolutions under the mutex but does not send
// them -- the caller must drop its `internals` guard first, then send each
// pair. This breaks the lock-held-across-send cycle: a waiter's task can
// resume and re-acquire the very mutex its `send` is racing against.
fn queue_pump<P>(
    pool: &SharedPool<P>,
    internals: &mut Internals<P::Error>,
) -> Vec<(tokio::sync::oneshot::Sender<WaiterResolution<P::Error>>, ConnectionId)>
where
    P: ProbeProvider,
{
    let mut resolutions = Vec::new();
    loop {
        // Step 1: an idle candidate from any provider, in insertion order.
        // This iterates providers rather than matching a waiter's
        // originating provider -- preserved from the source (§9): a
        // provider-specific waiter can be starved if another provider has
        // idle capacity.
        let providers: Vec<ProviderId> = internals.registry.providers_in_order().cloned().collect();

        let mut found = providers.iter().find_map(|provider_id| {
            internals
                .selector
                .select(&internals.registry, &pool.config, provider_id)
        });

        // Step 2: no idle candidate anywhere -- try to create one for the
        // first provider that still has room.
        if found.is_none() {
            for provider_id in &providers {
                if internals.registry.len() < pool.config.max_connections as usize
                    && internals.registry.provider_len(provider_id)
                        < pool.config.max_connections as usize
                {
                    let conn = Connection::new(provider_id.clone(), pool.config.max_consecutive_errors);
                    let id = conn.id();
                    internals.registry.insert(conn);
                    pool.metrics.record_connection_created();
                    pool.emit(Event::ConnectionCreated {
                        id,
                        provider_id: provider_id.clone(),
                    });
                    found = Some(id);
                    break;
                }
            }
        }

        // Step 3: neither yielded a connection -- stop pumping.
        let Some(id) = found else {
            break;
        };

        // Step 4: hand it to the highest-priority live waiter.
        match internals.waiters.pop_next() {
            Some(sender) => {
                internals
                    .registry
                    .get_mut(id)
                    .expect("just inserted or selected")
                    .mark_busy();
                resolutions.push((sender, id));
            }
            None => break,
        }
    }
    resolutions
}

/// Sends every `(sender, id)` pair `queue_pump` computed. Callers must have
/// already dropped the `internals` guard before calling this.
fn send_resolutions<E>(resolutions: Vec<(tokio::sync::oneshot::Sender<WaiterResolution<E>>, ConnectionId)>) {
    for (sender, id) in resolutions {
        let _ = sender.send(Ok(id));
    }
}

impl<P> Pool<P>
where
    P: ProbeProvider,
{
    /// Builds a new pool with a no-op event sink.
    pub fn new(config: PoolConfig, provider: P) -> Pool<P> {
        Pool::with_event_sink(config, provider, Box::new(NopEventSink))
    }

    /// Builds a new pool with a custom event sink, receiving every event
    /// named in the external interface contract.
    pub fn with_event_sink(config: PoolConfig, provider: P, event_sink: Box<dyn EventSink>) -> Pool<P> {
        let shared = Arc::new(SharedPool {
            config,
            provider,
            event_sink: StdMutex::new(event_sink),
            metrics: Metrics::new(),
            internals: Mutex::new(Internals::new()),
            drain_notify: Notify::new(),
            health_handle: StdMutex::new(None),
            scaler_handle: StdMutex::new(None),
            janitor_handle: StdMutex::new(None),
        });

        let weak: Weak<SharedPool<P>> = Arc::downgrade(&shared);
        *shared.health_handle.lock().unwrap() = Some(crate::health::spawn(weak.clone()));
        *shared.scaler_handle.lock().unwrap() = Some(crate::scaler::spawn(weak.clone()));
        *shared.janitor_handle.lock().unwrap() = Some(crate::janitor::spawn(weak));

        Pool { inner: shared }
    }

    /// Retrieves a connection for `provider_id`, waiting up to
    /// `connectionTimeout` if the pool is at capacity (§4.1).
    pub async fn acquire(
        &self,
        provider_id: ProviderId,
        priority: i32,
    ) -> Result<PooledConnection<P>, PoolError<P::Error>> {
        let start = Instant::now();
        match self.acquire_inner(provider_id, priority, start).await {
            Ok(id) => {
                self.inner.metrics.record_acquire_success(start.elapsed());
                Ok(PooledConnection {
                    pool: self.clone(),
                    id,
                    released: false,
                })
            }
            Err(e) => {
                self.inner.metrics.record_acquire_failure();
                Err(e)
            }
        }
    }

    async fn acquire_inner(
        &self,
        provider_id: ProviderId,
        priority: i32,
        start: Instant,
    ) -> Result<ConnectionId, PoolError<P::Error>> {
        let rx = {
            let mut internals = self.inner.internals.lock().await;

            if internals.destroyed {
                return Err(PoolError::Destroyed);
            }
            if internals.draining {
                return Err(PoolError::Draining);
            }

            // Fast path.
            if let Some(id) =
                internals
                    .selector
                    .select(&internals.registry, &self.inner.config, &provider_id)
            {
                internals.registry.get_mut(id).unwrap().mark_busy();
                return Ok(id);
            }

            // Grow path.
            let cfg = &self.inner.config;
            if internals.registry.len() < cfg.max_connections as usize
                && internals.registry.provider_len(&provider_id) < cfg.max_connections as usize
            {
                let mut conn = Connection::new(provider_id.clone(), cfg.max_consecutive_errors);
                conn.mark_busy();
                let id = conn.id();
                internals.registry.insert(conn);
                self.inner.metrics.record_connection_created();
                self.inner.emit(Event::ConnectionCreated {
                    id,
                    provider_id: provider_id.clone(),
                });
                return Ok(id);
            }

            // Wait path.
            internals.waiters.push(priority)
        };

        let remaining = self
            .inner
            .config
            .connection_timeout
            .checked_sub(start.elapsed())
            .unwrap_or(Duration::from_secs(0));

        match tokio::time::timeout(remaining, rx).await {
            Ok(Ok(Ok(id))) => Ok(id),
            Ok(Ok(Err(e))) => Err(e),
            // Sender dropped without sending: only happens if `Destroy()`
            // tore down internals without resolving every waiter, which
            // `reject_all` is meant to prevent; treat defensively as
            // destroyed rather than panicking a caller's await.
            Ok(Err(_recv_error)) => Err(PoolError::Destroyed),
            Err(_elapsed) => Err(PoolError::AcquireTimeout),
        }
    }

    /// Returns a connection to the pool.
    pub async fn release(&self, id: ConnectionId) -> Result<(), PoolError<P::Error>> {
        let mut internals = self.inner.internals.lock().await;
        let conn = internals
            .registry
            .get_mut(id)
            .ok_or(PoolError::UnknownConnection(id))?;
        conn.mark_idle();
        let resolutions = queue_pump(&self.inner, &mut internals);
        drop(internals);
        send_resolutions(resolutions);
        self.inner.drain_notify.notify_waiters();
        Ok(())
    }

    /// Removes a connection from the registry. Idempotent: an unknown id is
    /// a no-op (§4.1).
    pub async fn destroy_connection(&self, id: ConnectionId) {
        let mut internals = self.inner.internals.lock().await;
        let resolutions = if let Some(conn) = internals.registry.remove(id) {
            self.inner.metrics.record_connection_destroyed();
            self.inner.emit(Event::ConnectionDestroyed {
                id,
                provider_id: conn.provider_id().clone(),
            });
            queue_pump(&self.inner, &mut internals)
        } else {
            Vec::new()
        };
        drop(internals);
        send_resolutions(resolutions);
        self.inner.drain_notify.notify_waiters();
    }

    /// Creates up to `n - existing` connections for `provider_id`.
    pub async fn warmup(&self, provider_id: ProviderId, n: u32) {
        let mut internals = self.inner.internals.lock().await;
        let existing = internals.registry.provider_len(&provider_id) as u32;
        let target = n.saturating_sub(existing);
        let mut created = 0u32;

        for _ in 0..target {
            if internals.registry.len() >= self.inner.config.max_connections as usize
                || internals.registry.provider_len(&provider_id)
                    >= self.inner.config.max_connections as usize
            {
                break;
            }
            let conn = Connection::new(provider_id.clone(), self.inner.config.max_consecutive_errors);
            let id = conn.id();
            internals.registry.insert(conn);
            self.inner.metrics.record_connection_created();
            self.inner.emit(Event::ConnectionCreated {
                id,
                provider_id: provider_id.clone(),
            });
            created += 1;
        }

        drop(internals);
        self.inner.emit(Event::WarmupCompleted {
            provider_id,
            count: created,
        });
    }

    /// Rejects all waiters, refuses further `acquire` calls, and resolves
    /// once no connection is busy.
    pub async fn drain(&self) {
        {
            let mut internals = self.inner.internals.lock().await;
            internals.draining = true;
            internals.waiters.reject_all(|| PoolError::Draining);
        }
        self.inner.drain_notify.notify_waiters();

        loop {
            let notified = self.inner.drain_notify.notified();
            let quiescent = {
                let internals = self.inner.internals.lock().await;
                internals.registry.busy_count() == 0
            };
            if quiescent {
                return;
            }
            notified.await;
        }
    }

    /// Terminal shutdown: cancels all background timers, rejects all
    /// waiters, clears all state, and detaches event subscribers.
    pub async fn shutdown(&self) {
        {
            let mut internals = self.inner.internals.lock().await;
            if internals.destroyed {
                return;
            }
            internals.destroyed = true;
            internals.waiters.reject_all(|| PoolError::Destroyed);
            internals.registry = Registry::new();
        }

        if let Some(h) = self.inner.health_handle.lock().unwrap().take() {
            h.abort();
        }
        if let Some(h) = self.inner.scaler_handle.lock().unwrap().take() {
            h.abort();
        }
        if let Some(h) = self.inner.janitor_handle.lock().unwrap().take() {
            h.abort();
        }
        *self.inner.event_sink.lock().unwrap() = Box::new(NopEventSink);
        self.inner.drain_notify.notify_waiters();
    }

    /// A point-in-time metrics snapshot.
    pub async fn metrics(&self) -> PoolMetrics {
        let internals = self.inner.internals.lock().await;
        self.inner.metrics.snapshot(&internals.registry)
    }

    /// The externally observable status of one connection, or `None` if
    /// the id is unknown.
    pub async fn connection_status(&self, id: ConnectionId) -> Option<ConnectionStatus> {
        let internals = self.inner.internals.lock().await;
        internals.registry.get(id).map(Connection::status)
    }

    /// Per-provider connection counts.
    pub async fn provider_stats(&self, provider_id: &ProviderId) -> ProviderStats {
        let internals = self.inner.internals.lock().await;
        let ids = internals.registry.connection_ids_for(provider_id);
        let mut stats = ProviderStats {
            total: 0,
            active: 0,
            busy: 0,
            idle: 0,
        };
        for &id in ids {
            let Some(conn) = internals.registry.get(id) else {
                continue;
            };
            stats.total += 1;
            if conn.is_active() {
                stats.active += 1;
            }
            if conn.is_busy() {
                stats.busy += 1;
            } else if conn.is_active() {
                stats.idle += 1;
            }
        }
        stats
    }
}

/// A smart handle to an acquired connection. Returns the connection to the
/// pool on `Drop` if `release` wasn't already called, firing the return via
/// a detached `tokio::spawn` rather than a blocking call: this pool is
/// tokio-only, and `release` never touches a live socket, so there's no
/// need to block the dropping thread on it.
pub struct PooledConnection<P>
where
    P: ProbeProvider,
{
    pool: Pool<P>,
    id: ConnectionId,
    released: bool,
}

impl<P> PooledConnection<P>
where
    P: ProbeProvider,
{
    /// The id of the underlying connection, usable with `GetConnectionStatus`
    /// or for logging.
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Returns the connection to the pool immediately, awaiting completion.
    pub async fn release(mut self) -> Result<(), PoolError<P::Error>> {
        self.released = true;
        self.pool.release(self.id).await
    }
}

impl<P> fmt::Debug for PooledConnection<P>
where
    P: ProbeProvider,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledConnection").field("id", &self.id).finish()
    }
}

impl<P> Drop for PooledConnection<P>
where
    P: ProbeProvider,
{
    fn drop(&mut self) {
        if self.released {
            return;
        }
        let pool = self.pool.clone();
        let id = self.id;
        tokio::spawn(async move {
            let _ = pool.release(id).await;
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};

    #[derive(Debug, Clone)]
    struct MockProvider {
        healthy: Arc<AtomicBool>,
    }

    impl MockProvider {
        fn new() -> MockProvider {
            MockProvider {
                healthy: Arc::new(AtomicBool::new(true)),
            }
        }
    }

    #[async_trait]
    impl ProbeProvider for MockProvider {
        type Error = std::io::Error;

        async fn probe(&self, _provider_id: &ProviderId) -> Result<(), Self::Error> {
            if self.healthy.load(AtomicOrdering::SeqCst) {
                Ok(())
            } else {
                Err(std::io::Error::new(std::io::ErrorKind::Other, "probe failed"))
            }
        }
    }

    fn provider(name: &str) -> ProviderId {
        ProviderId::new(name)
    }

    #[derive(Debug, Clone, Default)]
    struct RecordingEventSink {
        events: Arc<StdMutex<Vec<Event>>>,
    }

    impl RecordingEventSink {
        fn events(&self) -> Vec<Event> {
            self.events.lock().unwrap().clone()
        }
    }

    impl EventSink for RecordingEventSink {
        fn sink(&self, event: Event) {
            self.events.lock().unwrap().push(event);
        }

        fn boxed_clone(&self) -> Box<dyn EventSink> {
            Box::new(self.clone())
        }
    }

    #[tokio::test]
    async fn acquire_then_release_reuses_connection() {
        let pool = Pool::new(
            PoolConfig::builder().max_connections(2).build(),
            MockProvider::new(),
        );
        let conn = pool.acquire(provider("A"), 0).await.unwrap();
        let id = conn.id();
        conn.release().await.unwrap();

        let conn2 = pool.acquire(provider("A"), 0).await.unwrap();
        assert_eq!(conn2.id(), id);
        pool.shutdown().await;
    }

    #[tokio::test]
    async fn grows_up_to_max_connections_per_provider() {
        let pool = Pool::new(
            PoolConfig::builder().max_connections(2).build(),
            MockProvider::new(),
        );
        let c1 = pool.acquire(provider("A"), 0).await.unwrap();
        let c2 = pool.acquire(provider("A"), 0).await.unwrap();
        assert_ne!(c1.id(), c2.id());
        pool.shutdown().await;
    }

    #[tokio::test]
    async fn acquire_times_out_when_pool_is_saturated() {
        let cfg = PoolConfig::builder()
            .max_connections(1)
            .connection_timeout(Duration::from_millis(50))
            .build();
        let pool = Pool::new(cfg, MockProvider::new());
        let _held = pool.acquire(provider("A"), 0).await.unwrap();

        let err = pool.acquire(provider("A"), 0).await.unwrap_err();
        assert!(matches!(err, PoolError::AcquireTimeout));
        pool.shutdown().await;
    }

    #[tokio::test]
    async fn higher_priority_waiter_is_served_first() {
        let cfg = PoolConfig::builder()
            .max_connections(1)
            .connection_timeout(Duration::from_secs(5))
            .build();
        let pool = Pool::new(cfg, MockProvider::new());
        let held = pool.acquire(provider("A"), 0).await.unwrap();

        let low_pool = pool.clone();
        let low = tokio::spawn(async move { low_pool.acquire(provider("A"), 1).await });
        tokio::time::sleep(Duration::from_millis(20)).await;

        let high_pool = pool.clone();
        let high = tokio::spawn(async move { high_pool.acquire(provider("A"), 9).await });
        tokio::time::sleep(Duration::from_millis(20)).await;

        held.release().await.unwrap();

        let high_conn = high.await.unwrap().unwrap();
        assert!(!low.is_finished());
        high_conn.release().await.unwrap();

        let low_conn = low.await.unwrap().unwrap();
        low_conn.release().await.unwrap();
        pool.shutdown().await;
    }

    #[tokio::test]
    async fn drain_waits_for_busy_connections_to_clear() {
        let pool = Pool::new(
            PoolConfig::builder().max_connections(1).build(),
            MockProvider::new(),
        );
        let conn = pool.acquire(provider("A"), 0).await.unwrap();

        let drain_pool = pool.clone();
        let drain = tokio::spawn(async move { drain_pool.drain().await });
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!drain.is_finished());

        conn.release().await.unwrap();
        drain.await.unwrap();

        let err = pool.acquire(provider("A"), 0).await.unwrap_err();
        assert!(matches!(err, PoolError::Draining));
    }

    #[tokio::test]
    async fn unknown_connection_release_is_rejected() {
        let pool = Pool::new(PoolConfig::default(), MockProvider::new());
        let bogus = ConnectionId::generate();
        let err = pool.release(bogus).await.unwrap_err();
        assert!(matches!(err, PoolError::UnknownConnection(_)));
        pool.shutdown().await;
    }

    #[tokio::test]
    async fn warmup_creates_connections_without_marking_them_busy() {
        let pool = Pool::new(
            PoolConfig::builder().max_connections(5).build(),
            MockProvider::new(),
        );
        pool.warmup(provider("A"), 3).await;

        let stats = pool.provider_stats(&provider("A")).await;
        assert_eq!(stats.total, 3);
        assert_eq!(stats.busy, 0);
        pool.shutdown().await;
    }

    #[tokio::test]
    async fn health_tick_deactivates_connection_after_consecutive_failures() {
        let mock = MockProvider::new();
        let cfg = PoolConfig::builder().max_connections(1).build();
        let pool = Pool::new(cfg, mock.clone());
        let conn = pool.acquire(provider("A"), 0).await.unwrap();
        let id = conn.id();
        conn.release().await.unwrap();

        mock.healthy.store(false, AtomicOrdering::SeqCst);
        for _ in 0..3 {
            pool.inner.run_health_tick().await;
        }

        assert_eq!(
            pool.connection_status(id).await,
            Some(ConnectionStatus::Unhealthy)
        );
        pool.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn scaler_tick_grows_pool_past_utilization_threshold() {
        let sink = RecordingEventSink::default();
        let cfg = PoolConfig::builder()
            .max_connections(4)
            .scale_up_threshold(70.0)
            .build();
        let pool = Pool::with_event_sink(cfg, MockProvider::new(), Box::new(sink.clone()));

        let c1 = pool.acquire(provider("A"), 0).await.unwrap();
        let c2 = pool.acquire(provider("A"), 0).await.unwrap();
        let c3 = pool.acquire(provider("A"), 0).await.unwrap();

        pool.inner.run_scaler_tick().await;

        let stats = pool.provider_stats(&provider("A")).await;
        assert_eq!(stats.total, 4);
        assert!(sink
            .events()
            .iter()
            .any(|e| matches!(e, Event::ScaledUp { provider_id, .. } if *provider_id == provider("A"))));

        c1.release().await.unwrap();
        c2.release().await.unwrap();
        c3.release().await.unwrap();
        pool.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn scaler_tick_shrinks_pool_but_respects_min_connections() {
        let sink = RecordingEventSink::default();
        let cfg = PoolConfig::builder()
            .max_connections(5)
            .min_connections(1)
            .scale_down_threshold(50.0)
            .build();
        let pool = Pool::with_event_sink(cfg, MockProvider::new(), Box::new(sink.clone()));

        let c1 = pool.acquire(provider("A"), 0).await.unwrap();
        let c2 = pool.acquire(provider("A"), 0).await.unwrap();
        c1.release().await.unwrap();
        tokio::time::advance(Duration::from_millis(10)).await;
        c2.release().await.unwrap();

        pool.inner.run_scaler_tick().await;
        let stats = pool.provider_stats(&provider("A")).await;
        assert_eq!(stats.total, 1);
        assert!(sink
            .events()
            .iter()
            .any(|e| matches!(e, Event::ScaledDown { provider_id, .. } if *provider_id == provider("A"))));

        // At the floor now; another tick must not shrink further.
        pool.inner.run_scaler_tick().await;
        let stats = pool.provider_stats(&provider("A")).await;
        assert_eq!(stats.total, 1);

        pool.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn janitor_tick_reaps_idle_connection_past_idle_timeout() {
        let cfg = PoolConfig::builder()
            .max_connections(5)
            .idle_timeout(Duration::from_millis(50))
            .max_connection_age(Duration::from_secs(3600))
            .build();
        let pool = Pool::new(cfg, MockProvider::new());
        pool.warmup(provider("A"), 1).await;
        let warm_stats = pool.provider_stats(&provider("A")).await;
        assert_eq!(warm_stats.total, 1);

        tokio::time::advance(Duration::from_millis(60)).await;
        pool.inner.run_janitor_tick().await;

        let stats = pool.provider_stats(&provider("A")).await;
        assert_eq!(stats.total, 0);
        pool.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn janitor_tick_reaps_connection_past_max_age_even_if_recently_used() {
        let cfg = PoolConfig::builder()
            .max_connections(5)
            .max_connection_age(Duration::from_millis(100))
            .idle_timeout(Duration::from_secs(3600))
            .build();
        let pool = Pool::new(cfg, MockProvider::new());

        let conn = pool.acquire(provider("A"), 0).await.unwrap();
        let id = conn.id();
        tokio::time::advance(Duration::from_millis(50)).await;
        conn.release().await.unwrap();
        tokio::time::advance(Duration::from_millis(60)).await;

        pool.inner.run_janitor_tick().await;

        assert_eq!(pool.connection_status(id).await, None);
        pool.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn janitor_tick_never_reaps_a_busy_connection() {
        let cfg = PoolConfig::builder()
            .max_connections(5)
            .max_connection_age(Duration::from_millis(10))
            .build();
        let pool = Pool::new(cfg, MockProvider::new());

        let conn = pool.acquire(provider("A"), 0).await.unwrap();
        let id = conn.id();
        tokio::time::advance(Duration::from_millis(50)).await;

        pool.inner.run_janitor_tick().await;

        assert_eq!(pool.connection_status(id).await, Some(ConnectionStatus::Busy));
        conn.release().await.unwrap();
        pool.shutdown().await;
    }
}
