use std::sync::Arc;

use fenceline_infrastructure::InMemoryLockStore;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// The store instance this daemon exposes.
    pub store: Arc<InMemoryLockStore>,
}
