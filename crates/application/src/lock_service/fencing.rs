use std::sync::Arc;

use fenceline_core::{AppResult, ResourceKey};
use fenceline_domain::FencingToken;

use crate::coordination_ports::LockStore;

/// Issues strictly increasing fencing tokens per resource.
///
/// The counter lives in the backing store, never in allocator memory, so
/// values keep increasing across process restarts and across any number of
/// allocator instances pointed at the same store.
///
/// By convention only the current lease holder calls [`next`]. The
/// allocator deliberately does not verify that: checking lease ownership
/// here would be a read separate from the commit and would reintroduce the
/// stale-holder race the token exists to close.
///
/// [`next`]: FencingTokenAllocator::next
#[derive(Clone)]
pub struct FencingTokenAllocator {
    store: Arc<dyn LockStore>,
}

impl FencingTokenAllocator {
    /// Creates an allocator over one counter store.
    #[must_use]
    pub fn new(store: Arc<dyn LockStore>) -> Self {
        Self { store }
    }

    /// Allocates the next token for the resource.
    pub async fn next(&self, resource: &ResourceKey) -> AppResult<FencingToken> {
        let key = counter_key(resource);
        let value = self.store.atomic_increment(key.as_str()).await?;
        FencingToken::from_counter(value)
    }
}

/// Counter keys live beside lease keys in the same store, so they get their
/// own prefix to keep the two keyspaces from colliding.
fn counter_key(resource: &ResourceKey) -> String {
    format!("fence:{resource}")
}
