//! Shared state store interface.
//!
//! Circuit state is mirrored in a key-value store reachable by every replica
//! of a service (typically a distributed cache). The resilience layer needs
//! exactly three operations from it, captured by [`SharedStateStore`]:
//!
//! - `get(key)`
//! - `set_with_ttl(key, value, ttl)`
//! - `compare_and_set(key, expected, new, ttl)`
//!
//! The store is treated as a best-effort cache, not a source of truth.
//! Callers must survive every [`StoreError`] by falling back to local state;
//! no store error is ever surfaced to the code calling a dependency.
//!
//! [`InMemoryStore`] is a complete adapter for single-process deployments and
//! tests. Adapters for a real distributed cache implement the same trait.
//!
//! # Example
//!
//! ```rust
//! use svc_resilience_store::{InMemoryStore, SharedStateStore};
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), svc_resilience_store::StoreError> {
//! let store = InMemoryStore::new();
//! store.set_with_ttl("circuit:appointments", "{}".to_string(), Some(Duration::from_secs(60))).await?;
//!
//! let swapped = store
//!     .compare_and_set("circuit:appointments", Some("{}"), "{\"x\":1}".to_string(), None)
//!     .await?;
//! assert!(swapped);
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

mod memory;

pub use memory::InMemoryStore;

/// Errors reported by a shared state store.
#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    /// The store could not be reached.
    #[error("shared state store unavailable: {0}")]
    Unavailable(String),
    /// A stored value could not be encoded or decoded.
    #[error("shared state codec error: {0}")]
    Codec(String),
    /// The store reached but rejected the operation.
    #[error("shared state store error: {0}")]
    Backend(String),
}

/// Key-value store with TTL and compare-and-set semantics shared by replicas.
#[async_trait]
pub trait SharedStateStore: Send + Sync + 'static {
    /// Reads the value stored under `key`, or `None` if it is absent or expired.
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Writes `value` under `key`. With `ttl`, the key expires after that
    /// long; without, it persists until overwritten.
    async fn set_with_ttl(
        &self,
        key: &str,
        value: String,
        ttl: Option<Duration>,
    ) -> Result<(), StoreError>;

    /// Atomically replaces the value under `key` with `new` only if the
    /// current value equals `expected` (`None` meaning absent). Returns
    /// whether the swap happened.
    async fn compare_and_set(
        &self,
        key: &str,
        expected: Option<&str>,
        new: String,
        ttl: Option<Duration>,
    ) -> Result<bool, StoreError>;
}

/// Shared handle to a store.
pub type SharedStore = Arc<dyn SharedStateStore>;

#[async_trait]
impl<T: SharedStateStore + ?Sized> SharedStateStore for Arc<T> {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        (**self).get(key).await
    }

    async fn set_with_ttl(
        &self,
        key: &str,
        value: String,
        ttl: Option<Duration>,
    ) -> Result<(), StoreError> {
        (**self).set_with_ttl(key, value, ttl).await
    }

    async fn compare_and_set(
        &self,
        key: &str,
        expected: Option<&str>,
        new: String,
        ttl: Option<Duration>,
    ) -> Result<bool, StoreError> {
        (**self).compare_and_set(key, expected, new, ttl).await
    }
}

/// Key under which a dependency's circuit record is stored.
pub fn circuit_key(dependency: &str) -> String {
    format!("circuit:{dependency}")
}
