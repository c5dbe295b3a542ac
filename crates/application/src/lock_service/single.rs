use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use fenceline_core::{AppError, AppResult, OwnerToken, ResourceKey};
use fenceline_domain::Lease;

use crate::coordination_ports::LockStore;

/// Lock client bound to exactly one coordination store.
///
/// Suitable when the store itself is the availability boundary. Acquire
/// never blocks or retries; contention and backoff are the caller's
/// responsibility.
#[derive(Clone)]
pub struct SingleNodeLockClient {
    store: Arc<dyn LockStore>,
}

impl SingleNodeLockClient {
    /// Creates a client over one store.
    #[must_use]
    pub fn new(store: Arc<dyn LockStore>) -> Self {
        Self { store }
    }

    /// Attempts to acquire a lease on the resource.
    ///
    /// Returns `Ok(None)` when another holder owns the lease. The owner
    /// token is freshly generated per call, so a failed caller can simply
    /// call again later without cleanup.
    pub async fn acquire(&self, resource: &ResourceKey, ttl: Duration) -> AppResult<Option<Lease>> {
        if ttl.is_zero() {
            return Err(AppError::Validation(
                "lease ttl must be greater than zero".to_owned(),
            ));
        }

        let owner_token = OwnerToken::new();
        let created = self
            .store
            .try_create(resource.as_str(), owner_token.to_string().as_str(), ttl)
            .await?;

        if !created {
            return Ok(None);
        }

        let expires_at = Utc::now()
            + chrono::Duration::from_std(ttl).map_err(|error| {
                AppError::Validation(format!("lease ttl out of range: {error}"))
            })?;

        Ok(Some(Lease {
            resource_key: resource.clone(),
            owner_token,
            expires_at,
        }))
    }

    /// Releases the lease using compare-and-delete semantics.
    ///
    /// Idempotent: releasing twice, or after expiry, returns `Ok(false)`
    /// without error and never touches a newer holder's lease.
    pub async fn release(&self, lease: &Lease) -> AppResult<bool> {
        self.store
            .compare_and_delete(
                lease.resource_key.as_str(),
                lease.owner_token.to_string().as_str(),
            )
            .await
    }

    /// Extends the lease TTL while this holder still owns it.
    ///
    /// Returns `Ok(false)` once ownership has changed or the lease expired.
    pub async fn extend(&self, lease: &Lease, new_ttl: Duration) -> AppResult<bool> {
        if new_ttl.is_zero() {
            return Err(AppError::Validation(
                "lease ttl must be greater than zero".to_owned(),
            ));
        }

        self.store
            .compare_and_extend(
                lease.resource_key.as_str(),
                lease.owner_token.to_string().as_str(),
                new_ttl,
            )
            .await
    }
}
