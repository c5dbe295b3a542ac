//! Shared primitives for all Rust crates in Fenceline.

#![forbid(unsafe_code)]

use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Result type used across Fenceline crates.
pub type AppResult<T> = Result<T, AppError>;

/// A validated, non-empty key naming one protected resource.
///
/// Resource keys partition every coordination primitive: leases, fencing
/// counters, and high-water-marks are all scoped to exactly one key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceKey(String);

impl ResourceKey {
    /// Creates a validated resource key.
    pub fn new(value: impl Into<String>) -> AppResult<Self> {
        let value = value.into();
        if value.trim().is_empty() {
            return Err(AppError::Validation(
                "resource key must not be empty or whitespace".to_owned(),
            ));
        }

        Ok(Self(value))
    }

    /// Returns the underlying string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl From<ResourceKey> for String {
    fn from(value: ResourceKey) -> Self {
        value.0
    }
}

impl Display for ResourceKey {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "{}", self.0)
    }
}

/// Opaque identity of one lease acquisition attempt.
///
/// A fresh token is generated per acquire call and shared by every store that
/// votes on it. Release and extend compare against this value, so a token
/// never authorizes operations on a lease it did not create.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OwnerToken(Uuid);

impl OwnerToken {
    /// Creates a fresh random owner token.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates an owner token from an existing UUID value.
    #[must_use]
    pub fn from_uuid(value: Uuid) -> Self {
        Self(value)
    }

    /// Returns the underlying UUID value.
    #[must_use]
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for OwnerToken {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for OwnerToken {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "{}", self.0)
    }
}

/// Common application error categories.
#[derive(Debug, Error)]
pub enum AppError {
    /// Invalid input or violated invariant.
    #[error("validation error: {0}")]
    Validation(String),

    /// Conditional write lost to existing state.
    #[error("conflict: {0}")]
    Conflict(String),

    /// A write carried a fencing token below the recorded high-water-mark.
    ///
    /// Fatal to that write. Callers must abort and, if the work is still
    /// relevant, re-acquire the lease and retry with a fresh token.
    #[error("stale fencing token: {0}")]
    StaleToken(String),

    /// A coordination store could not be reached or timed out.
    ///
    /// Quorum operations count this as one negative vote rather than
    /// aborting the overall call.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// Internal unexpected error.
    #[error("internal error: {0}")]
    Internal(String),
}
