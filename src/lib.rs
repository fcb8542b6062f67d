//! A generic, multi-provider connection pool for upstream RPC providers
//! (e.g. blockchain node endpoints).
//!
//! This is an asynchronous, tokio-based pool in the lineage of `bb8`:
//! opening a new provider connection every time one is needed is wasteful
//! and can exhaust upstream capacity under load. Unlike `bb8`, this pool
//! fans out over many providers from one engine, load-balances among them,
//! scores connection health from periodic probes, and auto-scales capacity
//! to observed utilization.
//!
//! The pool is agnostic to how a provider is actually probed.
//! Implementors of [`ProbeProvider`] supply the provider-specific health
//! check; this crate ships no concrete RPC client.
//!
//! # Example
//!
//! ```no_run
//! use rpc_pool::{Pool, PoolConfig, ProviderId, ProbeProvider};
//! use async_trait::async_trait;
//!
//! #[derive(Debug)]
//! struct AlwaysHealthy;
//!
//! #[async_trait]
//! impl ProbeProvider for AlwaysHealthy {
//!     type Error = std::convert::Infallible;
//!
//!     async fn probe(&self, _provider_id: &ProviderId) -> Result<(), Self::Error> {
//!         Ok(())
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() {
//!     let pool = Pool::new(PoolConfig::default(), AlwaysHealthy);
//!     let conn = pool.acquire(ProviderId::new("mainnet"), 1).await.unwrap();
//!     // use the connection id to route an RPC call...
//!     pool.release(conn.id()).await.unwrap();
//! }
//! ```
#![deny(missing_debug_implementations)]

use std::fmt;
use std::sync::Arc;

mod config;
mod connection;
mod error;
mod events;
mod health;
mod janitor;
mod metrics;
mod pool;
mod probe;
mod registry;
mod scaler;
mod selector;
mod waiter;

pub use config::{Builder, LoadBalancerStrategy, PoolConfig};
pub use connection::{Connection, ConnectionId, ConnectionStatus};
pub use error::PoolError;
pub use events::{Event, EventSink, NopEventSink};
pub use metrics::PoolMetrics;
pub use pool::{Pool, PooledConnection, ProviderStats};
pub use probe::ProbeProvider;

/// Identifies an upstream RPC provider (e.g. `"mainnet"`, `"fallback-1"`).
///
/// Cheaply cloneable: internally an `Arc<str>`, since a `ProviderId` is
/// copied into the provider index, every `Connection` record it owns, and
/// every event mentioning it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProviderId(Arc<str>);

impl ProviderId {
    /// Creates a new provider id from any string-like value.
    pub fn new(id: impl Into<Arc<str>>) -> ProviderId {
        ProviderId(id.into())
    }

    /// Borrows the underlying provider name.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ProviderId {
    fn from(s: &str) -> ProviderId {
        ProviderId::new(s)
    }
}

impl From<String> for ProviderId {
    fn from(s: String) -> ProviderId {
        ProviderId::new(s)
    }
}
