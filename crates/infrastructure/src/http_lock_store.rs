//! HTTP client for a remote store daemon.

use std::time::Duration;

use async_trait::async_trait;
use fenceline_application::{LockStore, StoreEndpoint, StoreOpRequest, StoreOpResponse};
use fenceline_core::{AppError, AppResult};

/// Lock store adapter speaking the store daemon wire contract.
///
/// Transport failures surface as [`AppError::Unavailable`] so the quorum
/// client counts the store as one negative vote. The request timeout here
/// is a transport-level floor; the quorum client applies its own per-store
/// timeout on top.
#[derive(Clone)]
pub struct HttpLockStore {
    name: String,
    base_url: String,
    http_client: reqwest::Client,
}

impl HttpLockStore {
    /// Creates a client for one store endpoint.
    pub fn new(endpoint: &StoreEndpoint, request_timeout: Duration) -> AppResult<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|error| AppError::Internal(format!("failed to build HTTP client: {error}")))?;

        Ok(Self {
            name: endpoint.name.clone(),
            base_url: endpoint.url.trim_end_matches('/').to_owned(),
            http_client,
        })
    }

    async fn execute(&self, request: StoreOpRequest) -> AppResult<StoreOpResponse> {
        let endpoint = format!("{}/v1/op", self.base_url);
        let response = self
            .http_client
            .post(endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|error| {
                AppError::Unavailable(format!("store '{}' unreachable: {error}", self.name))
            })?;

        let body = response.json::<StoreOpResponse>().await.map_err(|error| {
            AppError::Internal(format!(
                "store '{}' returned an invalid response body: {error}",
                self.name
            ))
        })?;

        if let Some(err) = body.err {
            return Err(AppError::Internal(format!(
                "store '{}' rejected the request: {err}",
                self.name
            )));
        }

        Ok(body)
    }
}

fn ttl_millis(ttl: Duration) -> AppResult<i64> {
    i64::try_from(ttl.as_millis())
        .map_err(|error| AppError::Validation(format!("lease ttl out of range: {error}")))
}

#[async_trait]
impl LockStore for HttpLockStore {
    fn name(&self) -> &str {
        self.name.as_str()
    }

    async fn try_create(&self, key: &str, value: &str, ttl: Duration) -> AppResult<bool> {
        let request = StoreOpRequest::create(key, value, ttl_millis(ttl)?);
        Ok(self.execute(request).await?.ok)
    }

    async fn compare_and_delete(&self, key: &str, expected: &str) -> AppResult<bool> {
        let request = StoreOpRequest::cdelete(key, expected);
        Ok(self.execute(request).await?.ok)
    }

    async fn compare_and_extend(
        &self,
        key: &str,
        expected: &str,
        new_ttl: Duration,
    ) -> AppResult<bool> {
        let request = StoreOpRequest::cextend(key, expected, ttl_millis(new_ttl)?);
        Ok(self.execute(request).await?.ok)
    }

    async fn atomic_increment(&self, key: &str) -> AppResult<i64> {
        let response = self.execute(StoreOpRequest::incr(key)).await?;
        response.value.ok_or_else(|| {
            AppError::Internal(format!(
                "store '{}' omitted the counter value",
                self.name
            ))
        })
    }
}
