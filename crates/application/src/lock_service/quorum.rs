use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use fenceline_core::{AppError, AppResult, OwnerToken, ResourceKey};
use fenceline_domain::{LockHandle, acquire_validity, majority_of};
use tokio::task::JoinSet;
use tracing::warn;

use super::config::LockClientConfig;
use crate::coordination_ports::LockStore;

/// One operation broadcast to every store in a round.
#[derive(Clone)]
enum StoreCall {
    Create { value: String, ttl: Duration },
    Delete { expected: String },
    Extend { expected: String, new_ttl: Duration },
}

/// Redlock-style lock client over M independent coordination stores.
///
/// An operation succeeds when a majority of stores votes for it and the
/// TTL budget survives the wall-clock cost of the round plus the configured
/// clock-drift margin. A store that errors or times out is one negative
/// vote, never an abort: exactly floor(M/2)+1 reachable, agreeing stores
/// grant a lease even while the minority is unreachable.
///
/// Acquire success is a contention-reduction optimization, not a safety
/// proof. The fencing token check at the write boundary is what rejects a
/// superseded holder's late write.
#[derive(Clone)]
pub struct QuorumLockClient {
    stores: Vec<Arc<dyn LockStore>>,
    config: LockClientConfig,
}

impl QuorumLockClient {
    /// Creates a client over at least three independent stores.
    pub fn new(stores: Vec<Arc<dyn LockStore>>, config: LockClientConfig) -> AppResult<Self> {
        if stores.len() < 3 {
            return Err(AppError::Validation(format!(
                "quorum lock client requires at least 3 stores, got {}",
                stores.len()
            )));
        }

        if stores.len() % 2 == 0 {
            warn!(
                store_count = stores.len(),
                "even store count weakens the quorum trade-off, prefer an odd fleet"
            );
        }

        Ok(Self { stores, config })
    }

    /// Returns the client configuration.
    #[must_use]
    pub fn config(&self) -> &LockClientConfig {
        &self.config
    }

    /// Attempts to acquire a majority lease on the resource.
    ///
    /// One fresh owner token is shared across all stores. On a failed round,
    /// every store that did vote yes receives a best-effort compare-and-
    /// delete; cleanup failures are logged and left to expire via TTL.
    /// Returns `Ok(None)` on a lost round; the caller owns retry and
    /// backoff.
    pub async fn acquire(&self, resource: &ResourceKey) -> AppResult<Option<LockHandle>> {
        let owner_token = OwnerToken::new();
        let token_value = owner_token.to_string();

        let started = Instant::now();
        let votes = self
            .broadcast(
                resource.as_str(),
                StoreCall::Create {
                    value: token_value.clone(),
                    ttl: self.config.ttl,
                },
            )
            .await;
        let elapsed = started.elapsed();

        let affirmative = votes.iter().filter(|vote| **vote).count();
        let validity = acquire_validity(self.config.ttl, elapsed, self.config.clock_drift_margin);

        if affirmative >= majority_of(self.stores.len()) {
            if let Some(validity) = validity {
                let valid_until = Utc::now()
                    + chrono::Duration::from_std(validity).map_err(|error| {
                        AppError::Internal(format!("lease validity out of range: {error}"))
                    })?;

                return Ok(Some(LockHandle {
                    resource_key: resource.clone(),
                    owner_token,
                    valid_until,
                }));
            }

            warn!(
                resource = resource.as_str(),
                elapsed_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
                "majority reached but ttl budget exhausted, rolling back"
            );
        }

        self.rollback(resource.as_str(), token_value.as_str(), &votes)
            .await;
        Ok(None)
    }

    /// Releases the lease on every store.
    ///
    /// Idempotent by construction: compare-and-delete is a no-op wherever
    /// the lease already expired or was superseded, and individual store
    /// failures are logged only, since TTL bounds any orphan's lifetime.
    pub async fn release(&self, handle: &LockHandle) -> AppResult<()> {
        self.broadcast(
            handle.resource_key.as_str(),
            StoreCall::Delete {
                expected: handle.owner_token.to_string(),
            },
        )
        .await;

        Ok(())
    }

    /// Extends the lease under the same majority and budget rule as acquire.
    ///
    /// Returns a refreshed handle on success. On a lost round the old handle
    /// keeps whatever validity it had; stores that did extend simply carry a
    /// longer TTL until it lapses, so nothing is rolled back here.
    pub async fn extend(
        &self,
        handle: &LockHandle,
        new_ttl: Duration,
    ) -> AppResult<Option<LockHandle>> {
        if new_ttl.is_zero() {
            return Err(AppError::Validation(
                "lease ttl must be greater than zero".to_owned(),
            ));
        }

        let started = Instant::now();
        let votes = self
            .broadcast(
                handle.resource_key.as_str(),
                StoreCall::Extend {
                    expected: handle.owner_token.to_string(),
                    new_ttl,
                },
            )
            .await;
        let elapsed = started.elapsed();

        let affirmative = votes.iter().filter(|vote| **vote).count();
        let validity = acquire_validity(new_ttl, elapsed, self.config.clock_drift_margin);

        if affirmative >= majority_of(self.stores.len()) {
            if let Some(validity) = validity {
                let valid_until = Utc::now()
                    + chrono::Duration::from_std(validity).map_err(|error| {
                        AppError::Internal(format!("lease validity out of range: {error}"))
                    })?;

                return Ok(Some(LockHandle {
                    resource_key: handle.resource_key.clone(),
                    owner_token: handle.owner_token,
                    valid_until,
                }));
            }
        }

        Ok(None)
    }

    /// Issues one call per store concurrently and gathers votes by index.
    ///
    /// Each call is bounded by the per-store timeout, so one slow store can
    /// delay the round by at most that much. A timed-out call is abandoned
    /// and counted as a negative vote.
    async fn broadcast(&self, key: &str, call: StoreCall) -> Vec<bool> {
        let mut tasks: JoinSet<(usize, bool)> = JoinSet::new();

        for (index, store) in self.stores.iter().enumerate() {
            let store = Arc::clone(store);
            let key = key.to_owned();
            let call = call.clone();
            let per_store_timeout = self.config.per_store_timeout;

            tasks.spawn(async move {
                let operation = async {
                    match call {
                        StoreCall::Create { value, ttl } => {
                            store.try_create(key.as_str(), value.as_str(), ttl).await
                        }
                        StoreCall::Delete { expected } => {
                            store
                                .compare_and_delete(key.as_str(), expected.as_str())
                                .await
                        }
                        StoreCall::Extend { expected, new_ttl } => {
                            store
                                .compare_and_extend(key.as_str(), expected.as_str(), new_ttl)
                                .await
                        }
                    }
                };

                match tokio::time::timeout(per_store_timeout, operation).await {
                    Ok(Ok(vote)) => (index, vote),
                    Ok(Err(error)) => {
                        warn!(
                            store = store.name(),
                            key = key.as_str(),
                            error = %error,
                            "store call failed"
                        );
                        (index, false)
                    }
                    Err(_) => {
                        warn!(
                            store = store.name(),
                            key = key.as_str(),
                            "store call exceeded its timeout"
                        );
                        (index, false)
                    }
                }
            });
        }

        let mut votes = vec![false; self.stores.len()];
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, vote)) => votes[index] = vote,
                Err(error) => warn!(error = %error, "store call task failed to join"),
            }
        }

        votes
    }

    /// Best-effort compare-and-delete against the stores that voted yes in
    /// a failed acquire round.
    async fn rollback(&self, key: &str, expected: &str, votes: &[bool]) {
        let mut tasks = JoinSet::new();

        for (store, voted) in self.stores.iter().zip(votes) {
            if !voted {
                continue;
            }

            let store = Arc::clone(store);
            let key = key.to_owned();
            let expected = expected.to_owned();
            let per_store_timeout = self.config.per_store_timeout;

            tasks.spawn(async move {
                let outcome = tokio::time::timeout(
                    per_store_timeout,
                    store.compare_and_delete(key.as_str(), expected.as_str()),
                )
                .await;

                match outcome {
                    Ok(Ok(_)) => {}
                    Ok(Err(error)) => warn!(
                        store = store.name(),
                        key = key.as_str(),
                        error = %error,
                        "failed to roll back minority lease"
                    ),
                    Err(_) => warn!(
                        store = store.name(),
                        key = key.as_str(),
                        "timed out rolling back minority lease"
                    ),
                }
            });
        }

        while tasks.join_next().await.is_some() {}
    }
}
