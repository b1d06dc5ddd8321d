//! Caching of parsed and validated query documents.
//!
//! The executor looks documents up by their raw query text through a [`QueryCache`]. Only
//! documents that passed validation are ever added.

use async_trait::async_trait;

pub(crate) mod coalescing;
mod storage;

pub use storage::InMemoryCache;
pub use storage::LruQueryCache;
pub use storage::NoCache;

/// A key/value store for query documents, keyed by raw query text.
///
/// Implementations must be safe for concurrent use.
#[async_trait]
pub trait QueryCache<V>: Send + Sync + 'static {
    /// Looks up the value stored under `key`.
    async fn get(&self, key: &str) -> Option<V>;

    /// Stores `value` under `key`, replacing any previous value.
    async fn add(&self, key: String, value: V);
}
