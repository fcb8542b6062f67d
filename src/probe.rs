//! The opaque external collaborator: something that knows how to probe a
//! provider connection's health. Concrete RPC wiring lives outside this
//! crate, the same way bb8 ships `ManageConnection` but no backends.

use std::time::Duration;

use async_trait::async_trait;

use crate::ProviderId;

/// Implemented by callers to let the pool probe connection health.
///
/// The pool never performs network I/O itself (see the Creator, §4.4); all
/// real RPC traffic to a provider happens inside `probe`.
#[async_trait]
pub trait ProbeProvider: Send + Sync + 'static {
    /// The error type returned by a failed probe.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Probe the given provider. Returning `Ok` records the elapsed time as
    /// a health signal; returning `Err` counts as a probe failure.
    ///
    /// The pool does not pass a connection handle here: probing is scoped
    /// to a provider, not an individual connection, since the Creator does
    /// not perform a handshake and a `Connection` record carries no live
    /// socket for the prober to exercise.
    async fn probe(&self, provider_id: &ProviderId) -> Result<(), Self::Error>;
}

/// Measures the wall-clock duration of a probe, used by the health monitor
/// to update `avgResponseTime`.
pub(crate) async fn timed_probe<P: ProbeProvider>(
    provider: &P,
    provider_id: &ProviderId,
) -> (Result<(), P::Error>, Duration) {
    let start = std::time::Instant::now();
    let result = provider.probe(provider_id).await;
    (result, start.elapsed())
}
