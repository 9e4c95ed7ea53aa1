//! HTTP client for the remote store.
//!
//! Single point of entry for every network call the engine makes. Retries
//! 429/5xx and transport errors with exponential backoff; the vote committer
//! still bounds each call with its own outer timeout.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method, StatusCode, Url};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::{debug, warn};

use super::{BackendError, TelemetrySource, VoteBackend};
use crate::models::telemetry::FlagTelemetry;
use crate::models::vote::{EntityId, VoteType, VoteableEntity};

const MAX_ATTEMPTS: u32 = 3;
const BASE_BACKOFF_MS: u64 = 250;

#[derive(Debug, Serialize, Deserialize)]
struct VoteBody {
    vote: VoteType,
}

#[derive(Clone)]
pub struct HttpBackend {
    client: Client,
    base_url: Url,
    api_key: Option<String>,
}

impl HttpBackend {
    pub fn new(
        base_url: &str,
        api_key: Option<String>,
        request_timeout: Duration,
    ) -> Result<Self, BackendError> {
        let base_url = Url::parse(base_url)
            .map_err(|e| BackendError::Terminal(format!("invalid store URL '{base_url}': {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(BackendError::Terminal(format!(
                "store URL '{base_url}' cannot be used as a base"
            )));
        }
        Ok(Self {
            client: Client::builder().timeout(request_timeout).build()?,
            base_url,
            api_key,
        })
    }

    /// Appends percent-encoded path segments to the base URL.
    fn endpoint(&self, segments: &[&str]) -> Result<Url, BackendError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| BackendError::Terminal(format!("store URL '{}' cannot be a base", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// Sends one request, retrying retryable failures. `Ok(None)` means 404.
    async fn send<T: DeserializeOwned>(
        &self,
        method: Method,
        url: Url,
        body: Option<&VoteBody>,
    ) -> Result<Option<T>, BackendError> {
        let mut last_error: Option<BackendError> = None;

        for attempt in 0..MAX_ATTEMPTS {
            if attempt > 0 {
                // 250ms, 500ms
                let delay = Duration::from_millis(BASE_BACKOFF_MS << (attempt - 1));
                warn!(
                    "Store call {} {} attempt {} failed, retrying after {}ms...",
                    method,
                    url,
                    attempt,
                    delay.as_millis()
                );
                tokio::time::sleep(delay).await;
            }

            let mut request = self.client.request(method.clone(), url.clone());
            if let Some(key) = &self.api_key {
                request = request.bearer_auth(key);
            }
            if let Some(body) = body {
                request = request.json(body);
            }

            let response = match request.send().await {
                Ok(r) => r,
                Err(e) => {
                    last_error = Some(BackendError::Http(e));
                    continue;
                }
            };

            let status = response.status();

            if status == StatusCode::NOT_FOUND {
                return Ok(None);
            }

            if !status.is_success() {
                let message = response.text().await.unwrap_or_default();
                let error = BackendError::Api {
                    status: status.as_u16(),
                    message,
                };
                if error.is_retryable() {
                    warn!("Store call {} {} failed: {}", method, url, error);
                    last_error = Some(error);
                    continue;
                }
                return Err(error);
            }

            let text = response.text().await?;
            debug!("Store call {} {} succeeded", method, url);
            return Ok(Some(serde_json::from_str(&text)?));
        }

        Err(last_error.unwrap_or_else(|| {
            BackendError::Retryable(format!("{url} failed after {MAX_ATTEMPTS} attempts"))
        }))
    }
}

#[async_trait]
impl TelemetrySource for HttpBackend {
    async fn fetch_flag_telemetry(
        &self,
        resource_key: &str,
    ) -> Result<Option<FlagTelemetry>, BackendError> {
        let url = self.endpoint(&["telemetry", resource_key])?;
        let telemetry: Option<FlagTelemetry> = self.send(Method::GET, url, None).await?;
        Ok(telemetry.map(FlagTelemetry::with_derived_weight))
    }
}

#[async_trait]
impl VoteBackend for HttpBackend {
    async fn fetch_voteable_entity(&self, id: &EntityId) -> Result<VoteableEntity, BackendError> {
        let url = self.endpoint(&["entities", id.as_str()])?;
        self.send(Method::GET, url, None)
            .await?
            .ok_or_else(|| BackendError::NotFound(format!("entity {id}")))
    }

    async fn fetch_viewer_vote(&self, id: &EntityId) -> Result<VoteType, BackendError> {
        let url = self.endpoint(&["entities", id.as_str(), "vote"])?;
        // No vote document means the viewer never voted.
        let body: Option<VoteBody> = self.send(Method::GET, url, None).await?;
        Ok(body.map(|b| b.vote).unwrap_or_default())
    }

    async fn commit_vote(&self, id: &EntityId, vote: VoteType) -> Result<VoteType, BackendError> {
        let url = self.endpoint(&["entities", id.as_str(), "vote"])?;
        let body: Option<VoteBody> = self.send(Method::PUT, url, Some(&VoteBody { vote })).await?;
        body.map(|b| b.vote)
            .ok_or_else(|| BackendError::NotFound(format!("entity {id}")))
    }
}
