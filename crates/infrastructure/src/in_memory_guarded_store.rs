//! In-memory guarded resource implementation.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fenceline_application::{GuardedResource, Mutation};
use fenceline_core::{AppResult, ResourceKey};
use fenceline_domain::{FencingToken, HighWaterMark};
use serde_json::Value;
use tokio::sync::RwLock;

#[derive(Debug, Clone)]
struct GuardedRecord {
    mark: HighWaterMark,
    payload: Value,
    committed_at: DateTime<Utc>,
}

/// In-memory guarded resource for tests and single-process deployments.
///
/// One write lock spans the token comparison and the mutation, which is
/// this adapter's version of committing the high-water-mark in the same
/// atomic step as the write.
#[derive(Debug, Default)]
pub struct InMemoryGuardedStore {
    records: RwLock<HashMap<String, GuardedRecord>>,
}

impl InMemoryGuardedStore {
    /// Creates an empty guarded store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
        }
    }

    /// Returns the last committed payload and its token, if any.
    pub async fn read(&self, resource: &ResourceKey) -> Option<(u64, Value)> {
        let records = self.records.read().await;
        records
            .get(resource.as_str())
            .map(|record| (record.mark.as_u64(), record.payload.clone()))
    }

    /// Returns when the resource last accepted a write, if ever.
    pub async fn committed_at(&self, resource: &ResourceKey) -> Option<DateTime<Utc>> {
        let records = self.records.read().await;
        records
            .get(resource.as_str())
            .map(|record| record.committed_at)
    }
}

#[async_trait]
impl GuardedResource for InMemoryGuardedStore {
    async fn validate_and_commit(
        &self,
        resource: &ResourceKey,
        token: FencingToken,
        mutation: Mutation,
    ) -> AppResult<()> {
        let mut records = self.records.write().await;
        let record = records
            .entry(resource.as_str().to_owned())
            .or_insert_with(|| GuardedRecord {
                mark: HighWaterMark::default(),
                payload: Value::Null,
                committed_at: Utc::now(),
            });

        record.mark.advance(token)?;
        record.payload = mutation.payload;
        record.committed_at = Utc::now();
        Ok(())
    }
}
