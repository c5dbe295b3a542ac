//! Quorum arithmetic shared by the lock clients.

use std::time::Duration;

/// Number of affirmative votes required for a majority of `store_count`
/// independent stores.
#[must_use]
pub fn majority_of(store_count: usize) -> usize {
    store_count / 2 + 1
}

/// Remaining validity of a lease after an acquisition round.
///
/// The wall-clock time the round consumed and the configured clock-drift
/// margin are both charged against the TTL. Returns `None` when the budget
/// is exhausted, in which case the acquisition must be treated as failed
/// even if a majority voted for it: the minority of time left cannot be
/// distinguished from drift between store clocks.
#[must_use]
pub fn acquire_validity(ttl: Duration, elapsed: Duration, margin: Duration) -> Option<Duration> {
    let remaining = ttl.checked_sub(elapsed)?.checked_sub(margin)?;
    if remaining.is_zero() {
        return None;
    }

    Some(remaining)
}
