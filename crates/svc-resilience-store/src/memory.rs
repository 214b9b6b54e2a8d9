//! In-process store adapter.

use crate::{SharedStateStore, StoreError};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use svc_resilience_core::{Clock, SharedClock, SystemClock};

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at_millis: Option<u64>,
}

impl Entry {
    fn is_live(&self, now_millis: u64) -> bool {
        self.expires_at_millis
            .map(|expires| now_millis < expires)
            .unwrap_or(true)
    }
}

/// A [`SharedStateStore`] kept in process memory.
///
/// Clones share the same data, so handing one clone to several policies
/// simulates replicas talking to one cache. TTLs are evaluated against the
/// store's [`Clock`], and expired keys are dropped lazily on access.
///
/// [`set_available`](InMemoryStore::set_available) turns every operation
/// into [`StoreError::Unavailable`], which is how outage handling is
/// exercised without a real network.
#[derive(Clone)]
pub struct InMemoryStore {
    entries: Arc<Mutex<HashMap<String, Entry>>>,
    available: Arc<AtomicBool>,
    clock: SharedClock,
}

impl InMemoryStore {
    /// Creates an empty store using the system clock.
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Creates an empty store evaluating TTLs against `clock`.
    pub fn with_clock(clock: SharedClock) -> Self {
        Self {
            entries: Arc::new(Mutex::new(HashMap::new())),
            available: Arc::new(AtomicBool::new(true)),
            clock,
        }
    }

    /// Simulates the store going down (`false`) or coming back (`true`).
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
        tracing::debug!(available, "in-memory store availability changed");
    }

    /// Number of live keys.
    pub fn len(&self) -> usize {
        let now = self.clock.now_millis();
        self.entries
            .lock()
            .values()
            .filter(|entry| entry.is_live(now))
            .count()
    }

    /// Returns true if no live key is stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(StoreError::Unavailable("in-memory store offline".into()))
        }
    }

    fn expiry(&self, ttl: Option<Duration>) -> Option<u64> {
        ttl.map(|ttl| {
            self.clock
                .now_millis()
                .saturating_add(u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX))
        })
    }

    fn live_value(entries: &mut HashMap<String, Entry>, key: &str, now: u64) -> Option<String> {
        match entries.get(key) {
            Some(entry) if entry.is_live(now) => Some(entry.value.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for InMemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryStore")
            .field("keys", &self.entries.lock().len())
            .field("available", &self.available.load(Ordering::SeqCst))
            .finish()
    }
}

#[async_trait]
impl SharedStateStore for InMemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.check_available()?;
        let now = self.clock.now_millis();
        let mut entries = self.entries.lock();
        Ok(Self::live_value(&mut entries, key, now))
    }

    async fn set_with_ttl(
        &self,
        key: &str,
        value: String,
        ttl: Option<Duration>,
    ) -> Result<(), StoreError> {
        self.check_available()?;
        let entry = Entry {
            value,
            expires_at_millis: self.expiry(ttl),
        };
        self.entries.lock().insert(key.to_string(), entry);
        Ok(())
    }

    async fn compare_and_set(
        &self,
        key: &str,
        expected: Option<&str>,
        new: String,
        ttl: Option<Duration>,
    ) -> Result<bool, StoreError> {
        self.check_available()?;
        let now = self.clock.now_millis();
        let expires_at_millis = self.expiry(ttl);

        let mut entries = self.entries.lock();
        let current = Self::live_value(&mut entries, key, now);
        if current.as_deref() != expected {
            return Ok(false);
        }
        entries.insert(
            key.to_string(),
            Entry {
                value: new,
                expires_at_millis,
            },
        );
        Ok(true)
    }
}
