//! Lease and lock-handle types.

use chrono::{DateTime, Utc};
use fenceline_core::{OwnerToken, ResourceKey};
use serde::{Deserialize, Serialize};

/// One time-bounded exclusive marker on a resource key, as held against a
/// single coordination store.
///
/// Per store and key, at most one lease exists at any instant; the store's
/// conditional-create primitive enforces this. A lease moves from free to
/// held and back to free on release or TTL expiry. Ownership never transfers
/// directly between holders.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lease {
    /// Resource key the lease covers.
    pub resource_key: ResourceKey,
    /// Opaque token identifying the holder of this lease.
    pub owner_token: OwnerToken,
    /// Instant after which the store may evict the lease.
    pub expires_at: DateTime<Utc>,
}

impl Lease {
    /// Returns true once the lease TTL has elapsed at the given instant.
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// The caller-facing result of a successful quorum acquisition.
///
/// `valid_until` already discounts the wall-clock time the acquisition
/// itself consumed plus the configured clock-drift margin, so holding a
/// handle past this instant gives no authority at all. The fencing token
/// check at the write boundary is what protects against a holder that keeps
/// going anyway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockHandle {
    /// Resource key the handle covers.
    pub resource_key: ResourceKey,
    /// Owner token shared by every store that voted for this acquisition.
    pub owner_token: OwnerToken,
    /// Conservative end of the validity window.
    pub valid_until: DateTime<Utc>,
}

impl LockHandle {
    /// Returns true while the validity window is still open.
    #[must_use]
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        now < self.valid_until
    }
}
