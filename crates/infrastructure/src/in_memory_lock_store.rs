//! In-memory lock store implementation.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fenceline_application::LockStore;
use fenceline_core::{AppError, AppResult};
use tokio::sync::RwLock;


#[derive(Debug, Clone)]
enum StoreEntry {
    Lease {
        value: String,
        expires_at: DateTime<Utc>,
    },
    Counter(i64),
}

/// In-memory lock store backing the store daemon and tests.
///
/// Counters and leases share one keyspace; an operation against a key of
/// the wrong kind is rejected the way a real backend rejects a type
/// mismatch. Expired leases are treated as absent on access and physically
/// removed by [`purge_expired`].
///
/// [`purge_expired`]: InMemoryLockStore::purge_expired
#[derive(Debug)]
pub struct InMemoryLockStore {
    name: String,
    entries: RwLock<HashMap<String, StoreEntry>>,
}

impl InMemoryLockStore {
    /// Creates an empty in-memory store.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Removes expired leases and returns how many were evicted.
    ///
    /// Intended for a periodic sweep; correctness does not depend on it
    /// because every operation already treats expired leases as absent.
    pub async fn purge_expired(&self) -> usize {
        let now = Utc::now();
        let mut entries = self.entries.write().await;
        let before = entries.len();

        entries.retain(|_, entry| match entry {
            StoreEntry::Lease { expires_at, .. } => *expires_at > now,
            StoreEntry::Counter(_) => true,
        });

        let purged = before - entries.len();
        if purged > 0 {
            tracing::debug!(store = self.name.as_str(), purged, "evicted expired leases");
        }
        purged
    }
}

fn lease_ttl(ttl: Duration) -> AppResult<chrono::Duration> {
    chrono::Duration::from_std(ttl)
        .map_err(|error| AppError::Validation(format!("lease ttl out of range: {error}")))
}

#[async_trait]
impl LockStore for InMemoryLockStore {
    fn name(&self) -> &str {
        self.name.as_str()
    }

    async fn try_create(&self, key: &str, value: &str, ttl: Duration) -> AppResult<bool> {
        let ttl = lease_ttl(ttl)?;
        let now = Utc::now();
        let mut entries = self.entries.write().await;

        match entries.get(key) {
            Some(StoreEntry::Lease { expires_at, .. }) if *expires_at > now => return Ok(false),
            Some(StoreEntry::Counter(_)) => {
                return Err(AppError::Conflict(format!(
                    "key '{key}' holds a counter, not a lease"
                )));
            }
            _ => {}
        }

        entries.insert(
            key.to_owned(),
            StoreEntry::Lease {
                value: value.to_owned(),
                expires_at: now + ttl,
            },
        );
        Ok(true)
    }

    async fn compare_and_delete(&self, key: &str, expected: &str) -> AppResult<bool> {
        let now = Utc::now();
        let mut entries = self.entries.write().await;

        let matches_expected = matches!(
            entries.get(key),
            Some(StoreEntry::Lease { value, expires_at })
                if value == expected && *expires_at > now
        );

        if matches_expected {
            entries.remove(key);
        }
        Ok(matches_expected)
    }

    async fn compare_and_extend(
        &self,
        key: &str,
        expected: &str,
        new_ttl: Duration,
    ) -> AppResult<bool> {
        let new_ttl = lease_ttl(new_ttl)?;
        let now = Utc::now();
        let mut entries = self.entries.write().await;

        if let Some(StoreEntry::Lease { value, expires_at }) = entries.get_mut(key) {
            if value == expected && *expires_at > now {
                *expires_at = now + new_ttl;
                return Ok(true);
            }
        }
        Ok(false)
    }

    async fn atomic_increment(&self, key: &str) -> AppResult<i64> {
        let mut entries = self.entries.write().await;

        match entries.get_mut(key) {
            Some(StoreEntry::Counter(value)) => {
                *value += 1;
                Ok(*value)
            }
            Some(StoreEntry::Lease { .. }) => Err(AppError::Conflict(format!(
                "key '{key}' holds a lease, not a counter"
            ))),
            None => {
                entries.insert(key.to_owned(), StoreEntry::Counter(1));
                Ok(1)
            }
        }
    }
}
