//! Fenceline store daemon composition root.
//!
//! Exposes one independent coordination store over the wire contract. A
//! quorum deployment runs several of these on isolated failure domains and
//! points every lock client at the full fleet.

#![forbid(unsafe_code)]

mod handlers;
mod state;

use std::env;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::routing::{get, post};
use fenceline_core::{AppError, AppResult};
use fenceline_infrastructure::InMemoryLockStore;
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<(), AppError> {
    dotenvy::dotenv().ok();
    init_tracing();

    let store_name = env::var("STORE_NAME")
        .ok()
        .map(|value| value.trim().to_owned())
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| format!("stored-{}", std::process::id()));
    let host = env::var("STORE_HOST").unwrap_or_else(|_| "127.0.0.1".to_owned());
    let port = env::var("STORE_PORT")
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(7600);
    let purge_interval_ms = parse_env_u64("STORE_PURGE_INTERVAL_MS", 1_000)?;

    if purge_interval_ms == 0 {
        return Err(AppError::Validation(
            "STORE_PURGE_INTERVAL_MS must be greater than zero".to_owned(),
        ));
    }

    let store = Arc::new(InMemoryLockStore::new(store_name.clone()));

    let sweeper = Arc::clone(&store);
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_millis(purge_interval_ms));
        loop {
            ticker.tick().await;
            sweeper.purge_expired().await;
        }
    });

    let app = Router::new()
        .route("/v1/op", post(handlers::op_handler))
        .route("/health", get(handlers::health_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(AppState { store });

    let ip = IpAddr::from_str(host.as_str())
        .map_err(|error| AppError::Validation(format!("invalid STORE_HOST '{host}': {error}")))?;
    let address = SocketAddr::new(ip, port);

    let listener = tokio::net::TcpListener::bind(address)
        .await
        .map_err(|error| AppError::Internal(format!("failed to bind listener: {error}")))?;

    info!(store = store_name.as_str(), %address, "fenceline-stored listening");

    axum::serve(listener, app)
        .await
        .map_err(|error| AppError::Internal(format!("store daemon error: {error}")))
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .compact()
        .init();
}

fn parse_env_u64(name: &str, default: u64) -> AppResult<u64> {
    match env::var(name) {
        Ok(value) => value.parse::<u64>().map_err(|error| {
            AppError::Validation(format!("invalid {name} value '{value}': {error}"))
        }),
        Err(_) => Ok(default),
    }
}
