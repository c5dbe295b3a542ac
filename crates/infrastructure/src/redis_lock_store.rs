//! Redis-backed lock store implementation.

use std::time::Duration;

use async_trait::async_trait;
use fenceline_application::LockStore;
use fenceline_core::{AppError, AppResult};
use redis::{AsyncCommands, Script};

const TRY_CREATE_SCRIPT: &str = r#"
if redis.call('SET', KEYS[1], ARGV[1], 'NX', 'PX', ARGV[2]) then
  return 1
else
  return 0
end
"#;

const COMPARE_AND_DELETE_SCRIPT: &str = r#"
if redis.call('GET', KEYS[1]) == ARGV[1] then
  return redis.call('DEL', KEYS[1])
else
  return 0
end
"#;

const COMPARE_AND_EXTEND_SCRIPT: &str = r#"
if redis.call('GET', KEYS[1]) == ARGV[1] then
  return redis.call('PEXPIRE', KEYS[1], ARGV[2])
else
  return 0
end
"#;

/// Redis implementation of the lock store port.
///
/// Every operation runs server-side in one step: conditional create as a
/// single `SET NX PX`, the compare operations as Lua scripts, and the
/// fencing counter as `INCR`.
#[derive(Clone)]
pub struct RedisLockStore {
    name: String,
    client: redis::Client,
    key_prefix: String,
}

impl RedisLockStore {
    /// Creates one store adapter with a configured client and key prefix.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        client: redis::Client,
        key_prefix: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            client,
            key_prefix: key_prefix.into(),
        }
    }

    fn key_for(&self, key: &str) -> String {
        format!("{}:{key}", self.key_prefix)
    }

    async fn connection(&self) -> AppResult<redis::aio::MultiplexedConnection> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(|error| {
                AppError::Unavailable(format!(
                    "failed to connect to redis store '{}': {error}",
                    self.name
                ))
            })
    }
}

fn ttl_millis(ttl: Duration) -> AppResult<i64> {
    let millis = i64::try_from(ttl.as_millis())
        .map_err(|error| AppError::Validation(format!("lease ttl out of range: {error}")))?;

    if millis == 0 {
        return Err(AppError::Validation(
            "lease ttl must be at least one millisecond".to_owned(),
        ));
    }

    Ok(millis)
}

#[async_trait]
impl LockStore for RedisLockStore {
    fn name(&self) -> &str {
        self.name.as_str()
    }

    async fn try_create(&self, key: &str, value: &str, ttl: Duration) -> AppResult<bool> {
        let redis_key = self.key_for(key);
        let ttl_ms = ttl_millis(ttl)?;
        let mut connection = self.connection().await?;

        let created: i32 = Script::new(TRY_CREATE_SCRIPT)
            .key(redis_key)
            .arg(value)
            .arg(ttl_ms)
            .invoke_async(&mut connection)
            .await
            .map_err(|error| {
                AppError::Internal(format!("failed to create lease on '{}': {error}", self.name))
            })?;

        Ok(created > 0)
    }

    async fn compare_and_delete(&self, key: &str, expected: &str) -> AppResult<bool> {
        let redis_key = self.key_for(key);
        let mut connection = self.connection().await?;

        let deleted: i32 = Script::new(COMPARE_AND_DELETE_SCRIPT)
            .key(redis_key)
            .arg(expected)
            .invoke_async(&mut connection)
            .await
            .map_err(|error| {
                AppError::Internal(format!(
                    "failed to delete lease on '{}': {error}",
                    self.name
                ))
            })?;

        Ok(deleted > 0)
    }

    async fn compare_and_extend(
        &self,
        key: &str,
        expected: &str,
        new_ttl: Duration,
    ) -> AppResult<bool> {
        let redis_key = self.key_for(key);
        let ttl_ms = ttl_millis(new_ttl)?;
        let mut connection = self.connection().await?;

        let extended: i32 = Script::new(COMPARE_AND_EXTEND_SCRIPT)
            .key(redis_key)
            .arg(expected)
            .arg(ttl_ms)
            .invoke_async(&mut connection)
            .await
            .map_err(|error| {
                AppError::Internal(format!(
                    "failed to extend lease on '{}': {error}",
                    self.name
                ))
            })?;

        Ok(extended > 0)
    }

    async fn atomic_increment(&self, key: &str) -> AppResult<i64> {
        let redis_key = self.key_for(key);
        let mut connection = self.connection().await?;

        connection.incr(redis_key, 1).await.map_err(|error| {
            AppError::Internal(format!(
                "failed to increment counter on '{}': {error}",
                self.name
            ))
        })
    }
}
