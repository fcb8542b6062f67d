//! Pluggable event emission: a typed event bus a caller can subscribe to
//! without touching the pool's internal locking.

use std::fmt;

use crate::connection::ConnectionId;
use crate::ProviderId;

/// A typed lifecycle event. Variants correspond 1:1 to the event names in
/// the external interface contract.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// A new connection was created for a provider.
    ConnectionCreated {
        /// Id of the new connection.
        id: ConnectionId,
        /// Provider the connection serves.
        provider_id: ProviderId,
    },
    /// A connection was removed from the registry.
    ConnectionDestroyed {
        /// Id of the removed connection.
        id: ConnectionId,
        /// Provider the connection served.
        provider_id: ProviderId,
    },
    /// The health monitor deactivated a connection after too many
    /// consecutive probe failures.
    ConnectionUnhealthy {
        /// Id of the deactivated connection.
        id: ConnectionId,
        /// Provider the connection serves.
        provider_id: ProviderId,
        /// Consecutive failure count that triggered deactivation.
        consecutive_errors: u32,
    },
    /// The auto-scaler grew the pool for a provider.
    ScaledUp {
        /// Provider that was grown.
        provider_id: ProviderId,
        /// Id of the newly created connection.
        id: ConnectionId,
    },
    /// The auto-scaler attempted to grow the pool but creation failed.
    ScaledUpFailed {
        /// Provider that failed to grow.
        provider_id: ProviderId,
    },
    /// The auto-scaler shrank the pool.
    ScaledDown {
        /// Provider the removed connection served.
        provider_id: ProviderId,
        /// Id of the destroyed connection.
        id: ConnectionId,
    },
    /// The janitor completed a sweep that removed at least one connection.
    CleanupCompleted {
        /// Number of connections removed.
        count: u32,
    },
    /// `Warmup` finished creating connections for a provider.
    WarmupCompleted {
        /// Provider that was warmed up.
        provider_id: ProviderId,
        /// Number of connections created.
        count: u32,
    },
}

/// A trait to receive events emitted by the pool that aren't tied to any
/// particular caller.
pub trait EventSink: fmt::Debug + Send + Sync + 'static {
    /// Receive an event.
    fn sink(&self, event: Event);

    /// Clone this sink.
    fn boxed_clone(&self) -> Box<dyn EventSink>;
}

/// An `EventSink` implementation that discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NopEventSink;

impl EventSink for NopEventSink {
    fn sink(&self, _: Event) {}

    fn boxed_clone(&self) -> Box<dyn EventSink> {
        Box::new(*self)
    }
}
