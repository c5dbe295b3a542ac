use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::json;
use tokio::sync::Mutex;

use fenceline_core::{AppError, AppResult, OwnerToken, ResourceKey};
use fenceline_domain::{FencingToken, HighWaterMark, Lease};

use crate::coordination_ports::{GuardedResource, LockStore, Mutation};

use super::{
    FencingTokenAllocator, LockClientConfig, QuorumLockClient, RetryBackoffPolicy,
    SingleNodeLockClient,
};

#[derive(Debug, Clone)]
enum FakeEntry {
    Lease { value: String, expires_at: Instant },
    Counter(i64),
}

struct FakeLockStore {
    name: String,
    entries: Mutex<HashMap<String, FakeEntry>>,
    unreachable: Mutex<bool>,
    response_delay: Mutex<Option<Duration>>,
}

impl FakeLockStore {
    fn named(name: &str) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_owned(),
            entries: Mutex::new(HashMap::new()),
            unreachable: Mutex::new(false),
            response_delay: Mutex::new(None),
        })
    }

    async fn set_unreachable(&self, value: bool) {
        *self.unreachable.lock().await = value;
    }

    async fn set_response_delay(&self, delay: Duration) {
        *self.response_delay.lock().await = Some(delay);
    }

    async fn holds_lease(&self, key: &str) -> bool {
        let entries = self.entries.lock().await;
        matches!(
            entries.get(key),
            Some(FakeEntry::Lease { expires_at, .. }) if *expires_at > Instant::now()
        )
    }

    async fn gate(&self) -> AppResult<()> {
        let delay = *self.response_delay.lock().await;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if *self.unreachable.lock().await {
            return Err(AppError::Unavailable(format!(
                "{} is unreachable",
                self.name
            )));
        }

        Ok(())
    }
}

#[async_trait]
impl LockStore for FakeLockStore {
    fn name(&self) -> &str {
        self.name.as_str()
    }

    async fn try_create(&self, key: &str, value: &str, ttl: Duration) -> AppResult<bool> {
        self.gate().await?;

        let mut entries = self.entries.lock().await;
        let now = Instant::now();
        match entries.get(key) {
            Some(FakeEntry::Lease { expires_at, .. }) if *expires_at > now => return Ok(false),
            Some(FakeEntry::Counter(_)) => {
                return Err(AppError::Conflict(format!(
                    "key '{key}' holds a counter, not a lease"
                )));
            }
            _ => {}
        }

        entries.insert(
            key.to_owned(),
            FakeEntry::Lease {
                value: value.to_owned(),
                expires_at: now + ttl,
            },
        );
        Ok(true)
    }

    async fn compare_and_delete(&self, key: &str, expected: &str) -> AppResult<bool> {
        self.gate().await?;

        let mut entries = self.entries.lock().await;
        let matches_expected = matches!(
            entries.get(key),
            Some(FakeEntry::Lease { value, expires_at })
                if value == expected && *expires_at > Instant::now()
        );

        if matches_expected {
            entries.remove(key);
        }
        Ok(matches_expected)
    }

    async fn compare_and_extend(
        &self,
        key: &str,
        expected: &str,
        new_ttl: Duration,
    ) -> AppResult<bool> {
        self.gate().await?;

        let mut entries = self.entries.lock().await;
        let now = Instant::now();
        if let Some(FakeEntry::Lease { value, expires_at }) = entries.get_mut(key) {
            if value == expected && *expires_at > now {
                *expires_at = now + new_ttl;
                return Ok(true);
            }
        }
        Ok(false)
    }

    async fn atomic_increment(&self, key: &str) -> AppResult<i64> {
        self.gate().await?;

        let mut entries = self.entries.lock().await;
        match entries.get_mut(key) {
            Some(FakeEntry::Counter(value)) => {
                *value += 1;
                Ok(*value)
            }
            Some(FakeEntry::Lease { .. }) => Err(AppError::Conflict(format!(
                "key '{key}' holds a lease, not a counter"
            ))),
            None => {
                entries.insert(key.to_owned(), FakeEntry::Counter(1));
                Ok(1)
            }
        }
    }
}

#[derive(Default)]
struct FakeGuardedResource {
    state: Mutex<HashMap<String, (HighWaterMark, serde_json::Value)>>,
}

#[async_trait]
impl GuardedResource for FakeGuardedResource {
    async fn validate_and_commit(
        &self,
        resource: &ResourceKey,
        token: FencingToken,
        mutation: Mutation,
    ) -> AppResult<()> {
        let mut state = self.state.lock().await;
        let entry = state.entry(resource.as_str().to_owned()).or_default();

        entry.0.advance(token)?;
        entry.1 = mutation.payload;
        Ok(())
    }
}

fn resource(value: &str) -> ResourceKey {
    ResourceKey::new(value).unwrap_or_else(|_| unreachable!())
}

fn fleet(count: usize) -> Vec<Arc<FakeLockStore>> {
    (0..count)
        .map(|index| FakeLockStore::named(format!("store-{index}").as_str()))
        .collect()
}

fn as_stores(fleet: &[Arc<FakeLockStore>]) -> Vec<Arc<dyn LockStore>> {
    fleet
        .iter()
        .map(|store| Arc::clone(store) as Arc<dyn LockStore>)
        .collect()
}

fn config(ttl_ms: u64, timeout_ms: u64, margin_ms: u64) -> LockClientConfig {
    let backoff = RetryBackoffPolicy::new(Duration::from_millis(10), Duration::from_millis(100))
        .unwrap_or_else(|_| unreachable!());

    LockClientConfig::new(
        Duration::from_millis(ttl_ms),
        Duration::from_millis(timeout_ms),
        Duration::from_millis(margin_ms),
        Vec::new(),
        backoff,
    )
    .unwrap_or_else(|_| unreachable!())
}

fn quorum_client(stores: &[Arc<FakeLockStore>], config: LockClientConfig) -> QuorumLockClient {
    QuorumLockClient::new(as_stores(stores), config).unwrap_or_else(|_| unreachable!())
}

#[tokio::test]
async fn single_store_grants_at_most_one_lease_under_contention() {
    let store = FakeLockStore::named("store-0");
    let client = SingleNodeLockClient::new(store as Arc<dyn LockStore>);
    let resource = resource("jobs:nightly");

    let mut attempts = Vec::new();
    for _ in 0..16 {
        let client = client.clone();
        let resource = resource.clone();
        attempts.push(tokio::spawn(async move {
            client.acquire(&resource, Duration::from_secs(5)).await
        }));
    }

    let mut granted = 0;
    for attempt in attempts {
        if matches!(attempt.await, Ok(Ok(Some(_)))) {
            granted += 1;
        }
    }

    assert_eq!(granted, 1);
}

#[tokio::test]
async fn single_store_release_is_idempotent() {
    let store = FakeLockStore::named("store-0");
    let client = SingleNodeLockClient::new(Arc::clone(&store) as Arc<dyn LockStore>);
    let resource = resource("jobs:nightly");

    let lease = client.acquire(&resource, Duration::from_secs(5)).await;
    let lease = lease.ok().flatten().unwrap_or_else(|| unreachable!());

    assert!(matches!(client.release(&lease).await, Ok(true)));
    assert!(matches!(client.release(&lease).await, Ok(false)));
    assert!(!store.holds_lease(resource.as_str()).await);
}

#[tokio::test]
async fn stale_release_never_disturbs_the_newer_owner() {
    let store = FakeLockStore::named("store-0");
    let client = SingleNodeLockClient::new(Arc::clone(&store) as Arc<dyn LockStore>);
    let resource = resource("jobs:nightly");

    let stale = client.acquire(&resource, Duration::from_millis(40)).await;
    let stale = stale.ok().flatten().unwrap_or_else(|| unreachable!());

    tokio::time::sleep(Duration::from_millis(60)).await;

    let newer = client.acquire(&resource, Duration::from_secs(5)).await;
    let newer = newer.ok().flatten().unwrap_or_else(|| unreachable!());

    assert!(matches!(client.release(&stale).await, Ok(false)));
    assert!(store.holds_lease(resource.as_str()).await);
    assert!(matches!(client.release(&newer).await, Ok(true)));
}

#[tokio::test]
async fn extend_requires_current_ownership() {
    let store = FakeLockStore::named("store-0");
    let client = SingleNodeLockClient::new(store as Arc<dyn LockStore>);
    let resource = resource("jobs:nightly");

    let lease = client.acquire(&resource, Duration::from_secs(5)).await;
    let lease = lease.ok().flatten().unwrap_or_else(|| unreachable!());
    assert!(matches!(
        client.extend(&lease, Duration::from_secs(10)).await,
        Ok(true)
    ));

    let forged = Lease {
        resource_key: resource,
        owner_token: OwnerToken::new(),
        expires_at: lease.expires_at,
    };
    assert!(matches!(
        client.extend(&forged, Duration::from_secs(10)).await,
        Ok(false)
    ));
}

#[tokio::test]
async fn quorum_requires_at_least_three_stores() {
    let stores = fleet(2);
    let result = QuorumLockClient::new(as_stores(&stores), config(5_000, 200, 50));
    assert!(result.is_err());
}

#[tokio::test]
async fn quorum_acquires_while_a_minority_is_unreachable() {
    let stores = fleet(5);
    stores[3].set_unreachable(true).await;
    stores[4].set_unreachable(true).await;

    let client = quorum_client(&stores, config(5_000, 200, 50));
    let handle = client.acquire(&resource("jobs:nightly")).await;

    let handle = handle.ok().flatten().unwrap_or_else(|| unreachable!());
    assert!(handle.is_valid_at(chrono::Utc::now()));
}

#[tokio::test]
async fn quorum_fails_without_majority_and_rolls_back_partial_leases() {
    let stores = fleet(5);
    stores[2].set_unreachable(true).await;
    stores[3].set_unreachable(true).await;
    stores[4].set_unreachable(true).await;

    let client = quorum_client(&stores, config(5_000, 200, 50));
    let resource = resource("jobs:nightly");

    let handle = client.acquire(&resource).await;
    assert!(matches!(handle, Ok(None)));

    assert!(!stores[0].holds_lease(resource.as_str()).await);
    assert!(!stores[1].holds_lease(resource.as_str()).await);
}

#[tokio::test]
async fn slow_store_costs_at_most_its_own_timeout() {
    let stores = fleet(3);
    stores[2].set_response_delay(Duration::from_millis(500)).await;

    let client = quorum_client(&stores, config(5_000, 80, 20));
    let started = Instant::now();
    let handle = client.acquire(&resource("jobs:nightly")).await;

    assert!(matches!(handle, Ok(Some(_))));
    assert!(started.elapsed() < Duration::from_millis(400));
}

#[tokio::test]
async fn exhausted_ttl_budget_fails_and_rolls_back_despite_unanimity() {
    let stores = fleet(3);
    for store in &stores {
        store.set_response_delay(Duration::from_millis(30)).await;
    }

    let client = quorum_client(&stores, config(100, 200, 80));
    let resource = resource("jobs:nightly");

    let handle = client.acquire(&resource).await;
    assert!(matches!(handle, Ok(None)));

    for store in &stores {
        assert!(!store.holds_lease(resource.as_str()).await);
    }
}

#[tokio::test]
async fn quorum_release_frees_every_store() {
    let stores = fleet(3);
    let client = quorum_client(&stores, config(5_000, 200, 50));
    let resource = resource("jobs:nightly");

    let handle = client.acquire(&resource).await;
    let handle = handle.ok().flatten().unwrap_or_else(|| unreachable!());

    assert!(client.release(&handle).await.is_ok());
    for store in &stores {
        assert!(!store.holds_lease(resource.as_str()).await);
    }

    // A second release finds nothing to delete and stays silent.
    assert!(client.release(&handle).await.is_ok());
}

#[tokio::test]
async fn quorum_extend_refreshes_the_handle_for_the_owner_only() {
    let stores = fleet(3);
    let client = quorum_client(&stores, config(5_000, 200, 50));
    let resource = resource("jobs:nightly");

    let handle = client.acquire(&resource).await;
    let handle = handle.ok().flatten().unwrap_or_else(|| unreachable!());

    let refreshed = client.extend(&handle, Duration::from_secs(10)).await;
    let refreshed = refreshed.ok().flatten().unwrap_or_else(|| unreachable!());
    assert!(refreshed.valid_until >= handle.valid_until);

    let forged = fenceline_domain::LockHandle {
        resource_key: handle.resource_key.clone(),
        owner_token: OwnerToken::new(),
        valid_until: handle.valid_until,
    };
    assert!(matches!(
        client.extend(&forged, Duration::from_secs(10)).await,
        Ok(None)
    ));
}

#[tokio::test]
async fn fencing_tokens_increase_across_allocator_instances() {
    let store = FakeLockStore::named("store-0");
    let resource = resource("billing:close");

    let first = FencingTokenAllocator::new(Arc::clone(&store) as Arc<dyn LockStore>);
    let mut issued = Vec::new();
    for _ in 0..3 {
        if let Ok(token) = first.next(&resource).await {
            issued.push(token);
        }
    }
    drop(first);

    // A new allocator over the same store continues the sequence.
    let second = FencingTokenAllocator::new(Arc::clone(&store) as Arc<dyn LockStore>);
    if let Ok(token) = second.next(&resource).await {
        issued.push(token);
    }

    assert_eq!(issued.len(), 4);
    assert!(issued.windows(2).all(|pair| pair[0] < pair[1]));

    // Counters are independent per resource.
    let other_resource = ResourceKey::new("billing:open").unwrap_or_else(|_| unreachable!());
    let other = second.next(&other_resource).await;
    assert_eq!(other.ok().map(|token| token.as_u64()), Some(1));
}

#[tokio::test]
async fn stale_holder_write_is_rejected_after_supersession() {
    let stores = fleet(3);
    let client = quorum_client(&stores, config(80, 50, 10));
    let allocator = FencingTokenAllocator::new(Arc::clone(&stores[0]) as Arc<dyn LockStore>);
    let guarded = FakeGuardedResource::default();
    let resource = resource("billing:close");

    let handle_a = client.acquire(&resource).await;
    assert!(matches!(handle_a, Ok(Some(_))));
    let token_a = allocator.next(&resource).await;
    let token_a = token_a.unwrap_or_else(|_| unreachable!());

    // Holder A stalls past its TTL without writing.
    tokio::time::sleep(Duration::from_millis(120)).await;

    let handle_b = client.acquire(&resource).await;
    assert!(matches!(handle_b, Ok(Some(_))));
    let token_b = allocator.next(&resource).await;
    let token_b = token_b.unwrap_or_else(|_| unreachable!());
    assert!(token_b > token_a);

    let committed = guarded
        .validate_and_commit(&resource, token_b, Mutation::new(json!({"writer": "b"})))
        .await;
    assert!(committed.is_ok());

    let rejected = guarded
        .validate_and_commit(&resource, token_a, Mutation::new(json!({"writer": "a"})))
        .await;
    assert!(matches!(rejected, Err(AppError::StaleToken(_))));
}
