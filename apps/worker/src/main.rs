//! Fenceline example worker runtime.
//!
//! Competes for one quorum lease, allocates a fencing token, and commits a
//! guarded checkpoint row to Postgres. Running several copies against the
//! same store fleet demonstrates the whole mechanism: only one worker
//! holds the lease at a time, and a worker that stalls past its TTL gets
//! its late write rejected by the token check regardless of what it
//! believes about the lease.

#![forbid(unsafe_code)]

use std::env;
use std::sync::Arc;
use std::time::Duration;

use fenceline_application::{
    FencingTokenAllocator, GuardedResource, LockClientConfig, LockStore, Mutation,
    QuorumLockClient, RetryBackoffPolicy, StoreEndpoint,
};
use fenceline_core::{AppError, AppResult, ResourceKey};
use fenceline_infrastructure::{HttpLockStore, PostgresGuardedStore};
use serde_json::json;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use url::Url;

#[derive(Debug, Clone)]
struct WorkerConfig {
    database_url: String,
    worker_id: String,
    resource_key: String,
    endpoints: Vec<StoreEndpoint>,
    ttl: Duration,
    per_store_timeout: Duration,
    clock_drift_margin: Duration,
    work_interval: Duration,
}

#[tokio::main]
async fn main() -> Result<(), AppError> {
    dotenvy::dotenv().ok();
    init_tracing();

    let config = WorkerConfig::load()?;
    let pool = connect_pool(config.database_url.as_str()).await?;

    sqlx::migrate!("../../crates/infrastructure/migrations")
        .run(&pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to run migrations: {error}")))?;

    let stores = build_stores(&config)?;
    let counter_store = Arc::clone(&stores[0]);

    let lock_config = LockClientConfig::new(
        config.ttl,
        config.per_store_timeout,
        config.clock_drift_margin,
        config.endpoints.clone(),
        RetryBackoffPolicy::new(Duration::from_millis(50), Duration::from_millis(2_000))?,
    )?;
    let lock_client = QuorumLockClient::new(stores, lock_config)?;
    let allocator = FencingTokenAllocator::new(counter_store);
    let guarded = PostgresGuardedStore::new(pool);

    let resource = ResourceKey::new(config.resource_key.clone())?;

    info!(
        worker_id = config.worker_id.as_str(),
        resource = resource.as_str(),
        store_count = config.endpoints.len(),
        "fenceline-worker started"
    );

    let mut failed_attempts: u32 = 0;
    let mut checkpoint: u64 = 0;

    loop {
        match lock_client.acquire(&resource).await {
            Ok(Some(handle)) => {
                failed_attempts = 0;

                match run_guarded_write(&allocator, &guarded, &resource, &config, checkpoint).await
                {
                    Ok(token_value) => {
                        checkpoint = checkpoint.saturating_add(1);
                        info!(
                            worker_id = config.worker_id.as_str(),
                            resource = resource.as_str(),
                            token = token_value,
                            checkpoint,
                            "guarded checkpoint committed"
                        );
                    }
                    Err(AppError::StaleToken(detail)) => {
                        // A newer holder has written since our token was cut.
                        // The write is dead; the loop re-acquires with a
                        // fresh token.
                        error!(
                            worker_id = config.worker_id.as_str(),
                            resource = resource.as_str(),
                            detail = detail.as_str(),
                            "guarded write rejected as stale"
                        );
                    }
                    Err(error) => {
                        warn!(
                            worker_id = config.worker_id.as_str(),
                            resource = resource.as_str(),
                            error = %error,
                            "guarded write failed"
                        );
                    }
                }

                if let Err(release_error) = lock_client.release(&handle).await {
                    warn!(
                        worker_id = config.worker_id.as_str(),
                        resource = resource.as_str(),
                        error = %release_error,
                        "failed to release lease, leaving it to expire"
                    );
                }

                tokio::time::sleep(config.work_interval).await;
            }
            Ok(None) => {
                let delay = lock_client
                    .config()
                    .retry_backoff
                    .delay_for_attempt(failed_attempts);
                failed_attempts = failed_attempts.saturating_add(1);
                tokio::time::sleep(delay).await;
            }
            Err(acquire_error) => {
                warn!(
                    worker_id = config.worker_id.as_str(),
                    resource = resource.as_str(),
                    error = %acquire_error,
                    "lease acquisition errored"
                );
                tokio::time::sleep(config.work_interval).await;
            }
        }
    }
}

async fn run_guarded_write(
    allocator: &FencingTokenAllocator,
    guarded: &PostgresGuardedStore,
    resource: &ResourceKey,
    config: &WorkerConfig,
    checkpoint: u64,
) -> AppResult<u64> {
    let token = allocator.next(resource).await?;

    let mutation = Mutation::new(json!({
        "worker_id": config.worker_id,
        "checkpoint": checkpoint,
    }));

    guarded.validate_and_commit(resource, token, mutation).await?;
    Ok(token.as_u64())
}

fn build_stores(config: &WorkerConfig) -> AppResult<Vec<Arc<dyn LockStore>>> {
    config
        .endpoints
        .iter()
        .map(|endpoint| {
            HttpLockStore::new(endpoint, config.per_store_timeout)
                .map(|store| Arc::new(store) as Arc<dyn LockStore>)
        })
        .collect()
}

async fn connect_pool(database_url: &str) -> AppResult<PgPool> {
    PgPoolOptions::new()
        .max_connections(5)
        .connect(database_url)
        .await
        .map_err(|error| AppError::Internal(format!("failed to connect to database: {error}")))
}

impl WorkerConfig {
    fn load() -> AppResult<Self> {
        let database_url = required_env("DATABASE_URL")?;
        let worker_id = env::var("WORKER_ID")
            .ok()
            .map(|value| value.trim().to_owned())
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| format!("worker-{}", std::process::id()));
        let resource_key =
            env::var("RESOURCE_KEY").unwrap_or_else(|_| "checkpoints:primary".to_owned());
        let endpoints = parse_endpoints(required_env("STORE_ENDPOINTS")?.as_str())?;
        let ttl = Duration::from_millis(parse_env_u64("LOCK_TTL_MS", 5_000)?);
        let per_store_timeout = Duration::from_millis(parse_env_u64("PER_STORE_TIMEOUT_MS", 500)?);
        let clock_drift_margin = required_margin()?;
        let work_interval = Duration::from_millis(parse_env_u64("WORK_INTERVAL_MS", 2_000)?);

        Ok(Self {
            database_url,
            worker_id,
            resource_key,
            endpoints,
            ttl,
            per_store_timeout,
            clock_drift_margin,
            work_interval,
        })
    }
}

fn parse_endpoints(raw: &str) -> AppResult<Vec<StoreEndpoint>> {
    let endpoints: Vec<StoreEndpoint> = raw
        .split(',')
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .enumerate()
        .map(|(index, value)| {
            let url = Url::parse(value).map_err(|error| {
                AppError::Validation(format!("invalid store endpoint '{value}': {error}"))
            })?;
            StoreEndpoint::new(format!("store-{index}"), url.as_str())
        })
        .collect::<AppResult<_>>()?;

    if endpoints.is_empty() {
        return Err(AppError::Validation(
            "STORE_ENDPOINTS must list at least one store url".to_owned(),
        ));
    }

    Ok(endpoints)
}

fn required_margin() -> AppResult<Duration> {
    // Deliberately no fallback: the drift bound depends on the deployment's
    // clock discipline and only the operator can supply it.
    let raw = required_env("CLOCK_DRIFT_MARGIN_MS")?;
    let millis = raw.parse::<u64>().map_err(|error| {
        AppError::Validation(format!("invalid CLOCK_DRIFT_MARGIN_MS '{raw}': {error}"))
    })?;
    Ok(Duration::from_millis(millis))
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .compact()
        .init();
}

fn required_env(name: &str) -> AppResult<String> {
    env::var(name).map_err(|_| AppError::Validation(format!("{name} is required")))
}

fn parse_env_u64(name: &str, default: u64) -> AppResult<u64> {
    match env::var(name) {
        Ok(value) => value.parse::<u64>().map_err(|error| {
            AppError::Validation(format!("invalid {name} value '{value}': {error}"))
        }),
        Err(_) => Ok(default),
    }
}
