//! Fencing token and high-water-mark invariants.

use std::fmt::{Display, Formatter};

use fenceline_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};

/// Monotonically increasing token issued per resource.
///
/// Tokens come from a durable backend counter, so they keep increasing
/// across allocator restarts and across any number of allocator instances.
/// A write presenting a lower token than the resource has already accepted
/// is a stale write from a superseded holder.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub struct FencingToken(u64);

impl FencingToken {
    /// Wraps a raw counter value.
    #[must_use]
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    /// Converts a backend counter value, which is signed on the wire.
    pub fn from_counter(value: i64) -> AppResult<Self> {
        let value = u64::try_from(value).map_err(|_| {
            AppError::Internal(format!("fencing counter regressed below zero: {value}"))
        })?;

        Ok(Self(value))
    }

    /// Returns the raw token value.
    #[must_use]
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Display for FencingToken {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "{}", self.0)
    }
}

/// Highest fencing token a protected resource has ever accepted for one key.
///
/// The mark only moves forward, and it must be advanced in the same atomic
/// step as the write it admits. A mark of zero admits every token, matching
/// a resource that has never accepted a fenced write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct HighWaterMark(u64);

impl HighWaterMark {
    /// Restores a mark from persisted state.
    #[must_use]
    pub fn new(highest_accepted: u64) -> Self {
        Self(highest_accepted)
    }

    /// Returns the persisted mark value.
    #[must_use]
    pub fn as_u64(&self) -> u64 {
        self.0
    }

    /// Returns true when a write carrying `token` may commit.
    ///
    /// Equal tokens are admitted: the same holder may perform several writes
    /// under one allocation.
    #[must_use]
    pub fn admits(&self, token: FencingToken) -> bool {
        token.as_u64() >= self.0
    }

    /// Advances the mark after an admitted write.
    ///
    /// Rejects regressions so a buggy adapter cannot silently reopen the
    /// window for stale writes.
    pub fn advance(&mut self, token: FencingToken) -> AppResult<()> {
        if !self.admits(token) {
            return Err(AppError::StaleToken(format!(
                "token {token} is below the recorded high-water-mark {}",
                self.0
            )));
        }

        self.0 = token.as_u64();
        Ok(())
    }
}
