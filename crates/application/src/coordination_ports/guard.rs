use async_trait::async_trait;
use fenceline_core::{AppResult, ResourceKey};
use fenceline_domain::FencingToken;
use serde_json::Value;

/// One mutation submitted to a guarded resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mutation {
    /// JSON document replacing the resource's guarded state.
    pub payload: Value,
}

impl Mutation {
    /// Creates a mutation carrying the given payload.
    #[must_use]
    pub fn new(payload: Value) -> Self {
        Self { payload }
    }
}

/// Write-target port that enforces fencing at the commit boundary.
///
/// Holding a lease is advisory only: a holder can stall arbitrarily long
/// between acquiring and writing. The high-water-mark comparison here is
/// the check that actually rejects a superseded holder's late write, and it
/// must happen in the same atomic step as the write itself.
#[async_trait]
pub trait GuardedResource: Send + Sync {
    /// Validates `token` against the persisted high-water-mark, then applies
    /// the mutation and advances the mark atomically.
    ///
    /// Fails with [`fenceline_core::AppError::StaleToken`] when `token` is
    /// below the mark. That failure is fatal to the write and must never be
    /// swallowed; the caller re-acquires and retries with a fresh token if
    /// the work is still relevant.
    async fn validate_and_commit(
        &self,
        resource: &ResourceKey,
        token: FencingToken,
        mutation: Mutation,
    ) -> AppResult<()>;
}
