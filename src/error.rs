//! Error kinds surfaced by the pool to callers.
//!
//! `ProbeFailed` never crosses this boundary: probe failures stay local to
//! the health monitor and are folded into a connection's health score
//! instead (see [`crate::health`]).

use thiserror::Error;

use crate::connection::ConnectionId;

/// Errors returned by [`crate::Pool`] operations.
#[derive(Debug, Error)]
pub enum PoolError<E> {
    /// A waiter exceeded `connectionTimeout` while waiting for a connection.
    #[error("timed out waiting for a connection")]
    AcquireTimeout,

    /// `Release` was called with an id that is not in the registry.
    #[error("unknown connection id: {0:?}")]
    UnknownConnection(ConnectionId),

    /// The pool is draining and is refusing new acquisitions.
    #[error("pool is draining")]
    Draining,

    /// The pool has been destroyed; it is terminal.
    #[error("pool has been destroyed")]
    Destroyed,

    /// The creator could not allocate a new connection.
    #[error("failed to create connection: {0}")]
    CreateFailed(#[source] E),
}

impl<E> PoolError<E> {
    /// True for the lifecycle-rejection kinds (`Draining`/`Destroyed`).
    pub fn is_lifecycle_rejection(&self) -> bool {
        matches!(self, PoolError::Draining | PoolError::Destroyed)
    }
}

// Manual `Clone`/`PartialEq` so callers that never compare or clone errors
// aren't forced to bound their `ProbeProvider::Error` on `Clone`/`PartialEq`;
// `thiserror`'s derive would otherwise require it unconditionally.
impl<E: Clone> Clone for PoolError<E> {
    fn clone(&self) -> Self {
        match self {
            PoolError::AcquireTimeout => PoolError::AcquireTimeout,
            PoolError::UnknownConnection(id) => PoolError::UnknownConnection(*id),
            PoolError::Draining => PoolError::Draining,
            PoolError::Destroyed => PoolError::Destroyed,
            PoolError::CreateFailed(e) => PoolError::CreateFailed(e.clone()),
        }
    }
}

impl<E: PartialEq> PartialEq for PoolError<E> {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (PoolError::AcquireTimeout, PoolError::AcquireTimeout) => true,
            (PoolError::UnknownConnection(a), PoolError::UnknownConnection(b)) => a == b,
            (PoolError::Draining, PoolError::Draining) => true,
            (PoolError::Destroyed, PoolError::Destroyed) => true,
            (PoolError::CreateFailed(a), PoolError::CreateFailed(b)) => a == b,
            _ => false,
        }
    }
}
