//! Postgres-backed guarded resource implementation.

use async_trait::async_trait;
use fenceline_application::{GuardedResource, Mutation};
use fenceline_core::{AppError, AppResult, ResourceKey};
use fenceline_domain::FencingToken;
use serde_json::Value;
use sqlx::PgPool;
use sqlx::Row;

/// Postgres implementation of the guarded resource port.
///
/// The high-water-mark column lives in the same row as the guarded payload,
/// so one conditional upsert both validates the token and commits the
/// write. There is no separate read: a stale token simply matches zero
/// rows, which keeps the check and the mutation in a single atomic
/// statement under the row lock.
#[derive(Clone)]
pub struct PostgresGuardedStore {
    pool: PgPool,
}

impl PostgresGuardedStore {
    /// Creates a store over a configured connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Returns the last committed payload and its token, if any.
    pub async fn read(&self, resource: &ResourceKey) -> AppResult<Option<(u64, Value)>> {
        let row = sqlx::query(
            r#"
            SELECT high_water_mark, payload
            FROM guarded_records
            WHERE resource_key = $1
            "#,
        )
        .bind(resource.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!(
                "failed to read guarded record '{resource}': {error}"
            ))
        })?;

        row.map(|row| {
            let mark: i64 = row.get("high_water_mark");
            let payload: Value = row.get("payload");
            let mark = u64::try_from(mark).map_err(|_| {
                AppError::Internal(format!(
                    "guarded record '{resource}' carries a negative high-water-mark"
                ))
            })?;
            Ok((mark, payload))
        })
        .transpose()
    }
}

#[async_trait]
impl GuardedResource for PostgresGuardedStore {
    async fn validate_and_commit(
        &self,
        resource: &ResourceKey,
        token: FencingToken,
        mutation: Mutation,
    ) -> AppResult<()> {
        let token_value = i64::try_from(token.as_u64()).map_err(|_| {
            AppError::Validation(format!("fencing token {token} exceeds the storable range"))
        })?;

        let result = sqlx::query(
            r#"
            INSERT INTO guarded_records (resource_key, high_water_mark, payload, committed_at)
            VALUES ($1, $2, $3, now())
            ON CONFLICT (resource_key) DO UPDATE
            SET high_water_mark = EXCLUDED.high_water_mark,
                payload = EXCLUDED.payload,
                committed_at = now()
            WHERE guarded_records.high_water_mark <= EXCLUDED.high_water_mark
            "#,
        )
        .bind(resource.as_str())
        .bind(token_value)
        .bind(mutation.payload)
        .execute(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!(
                "failed to commit guarded write '{resource}': {error}"
            ))
        })?;

        if result.rows_affected() == 0 {
            return Err(AppError::StaleToken(format!(
                "token {token} is below the recorded high-water-mark for '{resource}'"
            )));
        }

        Ok(())
    }
}
