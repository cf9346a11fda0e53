//! Outbound HTTP for third-party JSON APIs, with cached GETs.

use reqwest::StatusCode;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::{sync::Arc, time::Duration};
use tracing::{debug, error};

use crate::{cache::CacheService, config::Config, errors::PredictorError};

/// Shared HTTP client with a TTL cache in front of JSON GETs.
#[derive(Clone)]
pub struct ApiClient {
    client: reqwest::Client,
    cache: Arc<CacheService>,
    cache_ttl: Duration,
}

impl ApiClient {
    pub fn new(config: &Config, cache: Arc<CacheService>) -> Result<Self, PredictorError> {
        let client = reqwest::Client::builder()
            .timeout(config.availability_api_timeout())
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            cache,
            cache_ttl: Duration::from_secs(config.api_cache_ttl_seconds),
        })
    }

    /// GETs `url` and decodes the JSON body, serving repeat calls from the cache.
    ///
    /// Only a 200 response is cached. `cache_key` defaults to [`cache_key_for`].
    pub async fn get_json(&self, url: &str, cache_key: Option<&str>) -> Result<serde_json::Value, PredictorError> {
        let key = cache_key.map(str::to_string).unwrap_or_else(|| cache_key_for(url));

        if let Some(cached) = self.cache.get(&key).await {
            return Ok(cached);
        }

        let response = self.client.get(url).send().await.map_err(|e| {
            error!("API GET error for {}: {}", url, e);
            PredictorError::Upstream(format!("GET {} failed: {}", url, e))
        })?;

        let status = response.status();
        if status != StatusCode::OK {
            error!("API GET error: unexpected response code {} from {}", status, url);
            return Err(PredictorError::Upstream(format!("GET {} returned {}", url, status)));
        }

        let body = response.text().await?;
        let value: serde_json::Value = serde_json::from_str(&body).map_err(|e| {
            error!("API GET error: {} returned invalid JSON: {}", url, e);
            PredictorError::Upstream(format!("GET {} returned invalid JSON", url))
        })?;

        self.cache.set(&key, value.clone(), self.cache_ttl).await;
        Ok(value)
    }

    /// POSTs a JSON body with bearer auth. Any HTTP status is returned to the caller.
    pub async fn post_json<T: Serialize + ?Sized>(
        &self,
        url: &str,
        bearer: &str,
        body: &T,
        timeout: Duration,
    ) -> Result<(StatusCode, String), PredictorError> {
        let response = tokio::time::timeout(
            timeout,
            self.client.post(url).bearer_auth(bearer).json(body).send(),
        )
        .await??;

        let status = response.status();
        let text = response.text().await?;
        debug!("POST {} answered {} ({} bytes)", url, status, text.len());
        Ok((status, text))
    }

    /// Drops one cached GET, or the whole cache when `cache_key` is `None`.
    pub async fn clear_cache(&self, cache_key: Option<&str>) {
        match cache_key {
            Some(key) => self.cache.invalidate(key).await,
            None => self.cache.clear(),
        }
    }
}

pub fn cache_key_for(url: &str) -> String {
    format!("api_{:x}", Sha256::digest(url.as_bytes()))
}
