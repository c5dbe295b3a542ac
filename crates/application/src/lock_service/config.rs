use std::time::Duration;

use fenceline_core::{AppError, AppResult};

use crate::coordination_ports::StoreEndpoint;

/// Configuration for the quorum lock client.
///
/// Every knob is caller-supplied. In particular the clock-drift margin has
/// no default: it bounds drift and scheduling pauses across the deployment's
/// store fleet, and only the operator knows that bound.
#[derive(Debug, Clone)]
pub struct LockClientConfig {
    /// Lease TTL requested from every store.
    pub ttl: Duration,
    /// Timeout applied independently to each store call.
    pub per_store_timeout: Duration,
    /// Bound on clock drift and pauses charged against the TTL budget.
    pub clock_drift_margin: Duration,
    /// Store fleet the client coordinates.
    pub endpoints: Vec<StoreEndpoint>,
    /// Backoff policy handed to callers that retry failed acquisitions.
    pub retry_backoff: RetryBackoffPolicy,
}

impl LockClientConfig {
    /// Creates a validated configuration.
    pub fn new(
        ttl: Duration,
        per_store_timeout: Duration,
        clock_drift_margin: Duration,
        endpoints: Vec<StoreEndpoint>,
        retry_backoff: RetryBackoffPolicy,
    ) -> AppResult<Self> {
        if ttl.is_zero() {
            return Err(AppError::Validation(
                "lease ttl must be greater than zero".to_owned(),
            ));
        }

        if per_store_timeout.is_zero() {
            return Err(AppError::Validation(
                "per-store timeout must be greater than zero".to_owned(),
            ));
        }

        if clock_drift_margin >= ttl {
            return Err(AppError::Validation(
                "clock drift margin must be smaller than the lease ttl".to_owned(),
            ));
        }

        Ok(Self {
            ttl,
            per_store_timeout,
            clock_drift_margin,
            endpoints,
            retry_backoff,
        })
    }
}

/// Randomized exponential backoff for caller-side retry loops.
///
/// The lock clients never retry internally. Callers that do retry must
/// spread their attempts out, otherwise every contender for a hot resource
/// wakes up at the same instant and storms the stores again. Full jitter
/// draws each delay uniformly from zero up to the exponential ceiling.
#[derive(Debug, Clone)]
pub struct RetryBackoffPolicy {
    /// Ceiling of the first delay.
    pub initial_delay: Duration,
    /// Upper bound on any delay ceiling.
    pub max_delay: Duration,
}

impl RetryBackoffPolicy {
    /// Creates a validated backoff policy.
    pub fn new(initial_delay: Duration, max_delay: Duration) -> AppResult<Self> {
        if initial_delay.is_zero() {
            return Err(AppError::Validation(
                "initial backoff delay must be greater than zero".to_owned(),
            ));
        }

        if max_delay < initial_delay {
            return Err(AppError::Validation(
                "max backoff delay must not be smaller than the initial delay".to_owned(),
            ));
        }

        Ok(Self {
            initial_delay,
            max_delay,
        })
    }

    /// Returns the jittered delay for the given zero-based attempt.
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let ceiling = self
            .initial_delay
            .saturating_mul(2_u32.saturating_pow(attempt))
            .min(self.max_delay);

        let ceiling_ms = u64::try_from(ceiling.as_millis()).unwrap_or(u64::MAX);
        if ceiling_ms == 0 {
            return ceiling;
        }

        Duration::from_millis(random_u64() % (ceiling_ms + 1))
    }
}

fn random_u64() -> u64 {
    // getrandom should not fail on supported platforms.
    let mut bytes = [0_u8; 8];
    getrandom::fill(&mut bytes).unwrap_or(());
    u64::from_le_bytes(bytes)
}
