use std::time::Duration;

use async_trait::async_trait;
use fenceline_core::{AppError, AppResult};

/// Coordination port for one independent lock store backend.
///
/// Every operation is a single atomic step on the backend side. Clients
/// never compose two calls into a read-modify-write; the whole design rests
/// on the backend deciding each operation alone.
#[async_trait]
pub trait LockStore: Send + Sync {
    /// Stable identifier used in logs and vote accounting.
    fn name(&self) -> &str;

    /// Creates the key with a TTL only if it is absent.
    ///
    /// Returns `Ok(false)` when the key already exists. A conflict is an
    /// expected outcome, not an error.
    async fn try_create(&self, key: &str, value: &str, ttl: Duration) -> AppResult<bool>;

    /// Deletes the key only while its current value equals `expected`.
    ///
    /// Returns `Ok(false)` on mismatch or absence.
    async fn compare_and_delete(&self, key: &str, expected: &str) -> AppResult<bool>;

    /// Resets the key TTL only while its current value equals `expected`.
    ///
    /// Returns `Ok(false)` on mismatch or absence.
    async fn compare_and_extend(
        &self,
        key: &str,
        expected: &str,
        new_ttl: Duration,
    ) -> AppResult<bool>;

    /// Increments the counter at `key` and returns the post-increment value.
    ///
    /// The counter starts at zero when absent, so the first returned value
    /// is one.
    async fn atomic_increment(&self, key: &str) -> AppResult<i64>;
}

/// Address of one coordination store instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreEndpoint {
    /// Stable name used in logs and vote accounting.
    pub name: String,
    /// Base URL of the store daemon.
    pub url: String,
}

impl StoreEndpoint {
    /// Creates a validated store endpoint.
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> AppResult<Self> {
        let name = name.into();
        let url = url.into();

        if name.trim().is_empty() {
            return Err(AppError::Validation(
                "store endpoint name must not be empty".to_owned(),
            ));
        }

        if url.trim().is_empty() {
            return Err(AppError::Validation(
                "store endpoint url must not be empty".to_owned(),
            ));
        }

        Ok(Self { name, url })
    }
}
