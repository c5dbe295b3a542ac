use std::time::Duration;

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use fenceline_application::{LockStore, StoreOpKind, StoreOpRequest, StoreOpResponse};
use fenceline_core::{AppError, AppResult};
use serde::Serialize;

use crate::state::AppState;

/// Store daemon health payload.
#[derive(Serialize)]
pub struct HealthResponse {
    /// Liveness indicator.
    pub status: &'static str,
    /// Name this store reports in vote accounting.
    pub store: String,
}

pub async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        store: state.store.name().to_owned(),
    })
}

pub async fn op_handler(
    State(state): State<AppState>,
    Json(request): Json<StoreOpRequest>,
) -> (StatusCode, Json<StoreOpResponse>) {
    match execute(&state, request).await {
        Ok(response) => (StatusCode::OK, Json(response)),
        Err(error) => (
            StatusCode::BAD_REQUEST,
            Json(StoreOpResponse::rejected(error.to_string())),
        ),
    }
}

async fn execute(state: &AppState, request: StoreOpRequest) -> AppResult<StoreOpResponse> {
    let store = state.store.as_ref();
    let key = request.key.as_str();

    match request.op {
        StoreOpKind::Create => {
            let value = request
                .value
                .ok_or_else(|| AppError::Validation("create requires a value".to_owned()))?;
            let ttl = required_ttl(request.ttl_ms)?;
            let created = store.try_create(key, value.as_str(), ttl).await?;
            Ok(StoreOpResponse::decided(created))
        }
        StoreOpKind::Cdelete => {
            let expected = request.expected.ok_or_else(|| {
                AppError::Validation("cdelete requires an expected value".to_owned())
            })?;
            let deleted = store.compare_and_delete(key, expected.as_str()).await?;
            Ok(StoreOpResponse::decided(deleted))
        }
        StoreOpKind::Cextend => {
            let expected = request.expected.ok_or_else(|| {
                AppError::Validation("cextend requires an expected value".to_owned())
            })?;
            let ttl = required_ttl(request.ttl_ms)?;
            let extended = store
                .compare_and_extend(key, expected.as_str(), ttl)
                .await?;
            Ok(StoreOpResponse::decided(extended))
        }
        StoreOpKind::Incr => {
            let value = store.atomic_increment(key).await?;
            Ok(StoreOpResponse::counted(value))
        }
    }
}

fn required_ttl(ttl_ms: Option<i64>) -> AppResult<Duration> {
    let ttl_ms = ttl_ms
        .ok_or_else(|| AppError::Validation("operation requires ttl_ms".to_owned()))?;
    let ttl_ms = u64::try_from(ttl_ms)
        .map_err(|_| AppError::Validation("ttl_ms must not be negative".to_owned()))?;

    if ttl_ms == 0 {
        return Err(AppError::Validation(
            "ttl_ms must be greater than zero".to_owned(),
        ));
    }

    Ok(Duration::from_millis(ttl_ms))
}
