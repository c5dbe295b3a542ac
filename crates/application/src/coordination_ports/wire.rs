use serde::{Deserialize, Serialize};

/// Operation discriminator of the store wire contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreOpKind {
    /// Conditional create with TTL.
    Create,
    /// Compare-and-delete.
    Cdelete,
    /// Compare-and-extend.
    Cextend,
    /// Atomic counter increment.
    Incr,
}

/// One request against a remote coordination store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreOpRequest {
    /// Requested operation.
    pub op: StoreOpKind,
    /// Target key.
    pub key: String,
    /// Value for conditional create.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    /// TTL in milliseconds for create and extend.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttl_ms: Option<i64>,
    /// Expected current value for compare-and-delete and compare-and-extend.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected: Option<String>,
}

impl StoreOpRequest {
    /// Builds a conditional create request.
    #[must_use]
    pub fn create(key: impl Into<String>, value: impl Into<String>, ttl_ms: i64) -> Self {
        Self {
            op: StoreOpKind::Create,
            key: key.into(),
            value: Some(value.into()),
            ttl_ms: Some(ttl_ms),
            expected: None,
        }
    }

    /// Builds a compare-and-delete request.
    #[must_use]
    pub fn cdelete(key: impl Into<String>, expected: impl Into<String>) -> Self {
        Self {
            op: StoreOpKind::Cdelete,
            key: key.into(),
            value: None,
            ttl_ms: None,
            expected: Some(expected.into()),
        }
    }

    /// Builds a compare-and-extend request.
    #[must_use]
    pub fn cextend(key: impl Into<String>, expected: impl Into<String>, ttl_ms: i64) -> Self {
        Self {
            op: StoreOpKind::Cextend,
            key: key.into(),
            value: None,
            ttl_ms: Some(ttl_ms),
            expected: Some(expected.into()),
        }
    }

    /// Builds an atomic increment request.
    #[must_use]
    pub fn incr(key: impl Into<String>) -> Self {
        Self {
            op: StoreOpKind::Incr,
            key: key.into(),
            value: None,
            ttl_ms: None,
            expected: None,
        }
    }
}

/// Result of one store operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreOpResponse {
    /// Whether the conditional operation took effect.
    pub ok: bool,
    /// Post-increment counter value for increments.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<i64>,
    /// Error detail when the backend rejected the request.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub err: Option<String>,
}

impl StoreOpResponse {
    /// Builds a response for a conditional operation outcome.
    #[must_use]
    pub fn decided(ok: bool) -> Self {
        Self {
            ok,
            value: None,
            err: None,
        }
    }

    /// Builds a response carrying a counter value.
    #[must_use]
    pub fn counted(value: i64) -> Self {
        Self {
            ok: true,
            value: Some(value),
            err: None,
        }
    }

    /// Builds a rejection response.
    #[must_use]
    pub fn rejected(err: impl Into<String>) -> Self {
        Self {
            ok: false,
            value: None,
            err: Some(err.into()),
        }
    }
}
