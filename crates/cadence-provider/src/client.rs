//! HTTP adapter for the music-generation provider.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method};
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use tracing::{debug, info, warn};

use cadence_core::defaults::{PROVIDER_BASE_URL, PROVIDER_SUCCESS_CODE, PROVIDER_TIMEOUT_SECS};
use cadence_core::{
    Error, GenerationProvider, JobKind, ProviderApiError, ProviderResult, RawTaskStatus, Result,
};

use crate::types::{decode_record_info, CreditsData, Envelope, TaskCreated};

/// Code used when a 2xx response carries an unreadable envelope.
const MALFORMED_RESPONSE_CODE: i64 = 502;

/// Configuration for the provider client.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    /// Base URL including the API version prefix.
    pub base_url: String,
    /// Bearer token; requests are sent unauthenticated when unset.
    pub api_key: Option<String>,
    /// Per-request timeout in seconds.
    pub timeout_seconds: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: PROVIDER_BASE_URL.to_string(),
            api_key: None,
            timeout_seconds: PROVIDER_TIMEOUT_SECS,
        }
    }
}

impl ProviderConfig {
    /// Create config from environment variables.
    ///
    /// | Variable | Default |
    /// |----------|---------|
    /// | `PROVIDER_BASE_URL` | `https://api.sunoapi.org/api/v1` |
    /// | `PROVIDER_API_KEY` | (none) |
    /// | `PROVIDER_TIMEOUT_SECS` | `30` |
    pub fn from_env() -> Self {
        Self {
            base_url: std::env::var("PROVIDER_BASE_URL")
                .unwrap_or_else(|_| PROVIDER_BASE_URL.to_string()),
            api_key: std::env::var("PROVIDER_API_KEY")
                .ok()
                .filter(|k| !k.trim().is_empty()),
            timeout_seconds: std::env::var("PROVIDER_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(PROVIDER_TIMEOUT_SECS),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_timeout(mut self, seconds: u64) -> Self {
        self.timeout_seconds = seconds;
        self
    }
}

/// Submission endpoint for a job kind.
pub fn submit_endpoint(kind: JobKind) -> &'static str {
    match kind {
        JobKind::Music => "/generate",
        JobKind::MusicVideo => "/mp4/generate",
        JobKind::Lyrics => "/lyrics",
        JobKind::VocalSeparation => "/vocal-removal/generate",
    }
}

/// Status (record-info) endpoint for a job kind.
pub fn status_endpoint(kind: JobKind) -> &'static str {
    match kind {
        JobKind::Music => "/generate/record-info",
        JobKind::MusicVideo => "/mp4/record-info",
        JobKind::Lyrics => "/lyrics/record-info",
        JobKind::VocalSeparation => "/vocal-removal/record-info",
    }
}

pub const CREDITS_ENDPOINT: &str = "/get-credits";

/// Provider client.
///
/// Every call goes through [`ProviderClient::request`], which turns transport
/// failures, non-2xx responses and non-success envelope codes into a
/// [`ProviderApiError`].
pub struct ProviderClient {
    client: Client,
    config: ProviderConfig,
}

impl ProviderClient {
    pub fn new(config: ProviderConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| Error::Config(format!("Failed to create HTTP client: {}", e)))?;

        info!(
            subsystem = "provider",
            component = "client",
            base_url = %config.base_url,
            authenticated = config.api_key.is_some(),
            timeout_secs = config.timeout_seconds,
            "Initializing provider client"
        );

        Ok(Self { client, config })
    }

    pub fn from_env() -> Result<Self> {
        Self::new(ProviderConfig::from_env())
    }

    pub fn config(&self) -> &ProviderConfig {
        &self.config
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), endpoint)
    }

    /// Issue one request and unwrap the envelope, returning its `data`.
    async fn request(
        &self,
        method: Method,
        endpoint: &str,
        query: &[(&str, &str)],
        body: Option<&JsonValue>,
    ) -> ProviderResult<JsonValue> {
        let mut req = self.client.request(method.clone(), self.url(endpoint));
        if let Some(ref api_key) = self.config.api_key {
            req = req.bearer_auth(api_key);
        }
        if !query.is_empty() {
            req = req.query(query);
        }
        if let Some(body) = body {
            req = req.json(body);
        }

        debug!(
            subsystem = "provider",
            op = "request",
            method = %method,
            endpoint,
            "Calling provider"
        );

        let response = req.send().await.map_err(transport_error)?;
        let status = response.status();
        let text = response.text().await.map_err(transport_error)?;
        let parsed: Option<JsonValue> = serde_json::from_str(&text).ok();
        let envelope: Option<Envelope> = parsed
            .as_ref()
            .and_then(|v| serde_json::from_value(v.clone()).ok());
        let details = parsed
            .clone()
            .unwrap_or_else(|| serde_json::json!({ "body": truncate(&text, 512) }));

        if !status.is_success() {
            let http_code = status.as_u16() as i64;
            let (code, message) = match envelope {
                Some(env) if env.code != PROVIDER_SUCCESS_CODE => (
                    env.code,
                    env.msg.unwrap_or_else(|| format!("HTTP {}", status)),
                ),
                Some(env) => (http_code, env.msg.unwrap_or_else(|| format!("HTTP {}", status))),
                None => (http_code, format!("HTTP {}", status)),
            };
            warn!(
                subsystem = "provider",
                endpoint,
                error_code = code,
                error = %message,
                "Provider returned HTTP error"
            );
            return Err(ProviderApiError::new(code, message).with_details(details));
        }

        let envelope = envelope.ok_or_else(|| {
            ProviderApiError::new(MALFORMED_RESPONSE_CODE, "Malformed provider response")
                .with_details(details.clone())
        })?;

        if envelope.code != PROVIDER_SUCCESS_CODE {
            let message = envelope
                .msg
                .unwrap_or_else(|| "Provider request failed".to_string());
            warn!(
                subsystem = "provider",
                endpoint,
                error_code = envelope.code,
                error = %message,
                "Provider rejected request"
            );
            return Err(ProviderApiError::new(envelope.code, message).with_details(details));
        }

        Ok(envelope.data.unwrap_or(JsonValue::Null))
    }

    fn decode<T: DeserializeOwned>(endpoint: &str, data: JsonValue) -> ProviderResult<T> {
        serde_json::from_value(data.clone()).map_err(|e| {
            ProviderApiError::new(
                MALFORMED_RESPONSE_CODE,
                format!("Unexpected payload from {}: {}", endpoint, e),
            )
            .with_details(data)
        })
    }
}

#[async_trait]
impl GenerationProvider for ProviderClient {
    async fn submit(&self, kind: JobKind, params: &JsonValue) -> ProviderResult<String> {
        let endpoint = submit_endpoint(kind);
        let data = self.request(Method::POST, endpoint, &[], Some(params)).await?;
        let created: TaskCreated = Self::decode(endpoint, data)?;

        let task_id = created
            .task_id
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| {
                ProviderApiError::new(MALFORMED_RESPONSE_CODE, "Provider response missing taskId")
            })?;

        info!(
            subsystem = "provider",
            op = "submit",
            job_kind = %kind,
            task_id = %task_id,
            "Generation submitted"
        );
        Ok(task_id)
    }

    async fn task_status(&self, kind: JobKind, task_id: &str) -> ProviderResult<RawTaskStatus> {
        let endpoint = status_endpoint(kind);
        let data = self
            .request(Method::GET, endpoint, &[("taskId", task_id)], None)
            .await?;

        let raw = decode_record_info(kind, task_id, data.clone()).map_err(|e| {
            ProviderApiError::new(
                MALFORMED_RESPONSE_CODE,
                format!("Unexpected payload from {}: {}", endpoint, e),
            )
            .with_details(data)
        })?;

        debug!(
            subsystem = "provider",
            op = "task_status",
            job_kind = %kind,
            task_id,
            provider_status = %raw.status,
            artifact_count = raw.artifacts.len(),
            "Fetched task status"
        );
        Ok(raw)
    }

    async fn credits(&self) -> ProviderResult<i64> {
        let data = self.request(Method::GET, CREDITS_ENDPOINT, &[], None).await?;
        let credits: CreditsData = Self::decode(CREDITS_ENDPOINT, data)?;
        Ok(credits.credits())
    }
}

fn transport_error(e: reqwest::Error) -> ProviderApiError {
    if e.is_timeout() {
        ProviderApiError::timeout(format!("Request timed out: {}", e))
    } else {
        ProviderApiError::transport(format!("Network error: {}", e))
    }
}

fn truncate(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_builder() {
        let config = ProviderConfig::default()
            .with_base_url("http://localhost:9999/api/v1/")
            .with_api_key("key")
            .with_timeout(5);
        assert_eq!(config.timeout_seconds, 5);
        assert_eq!(config.api_key.as_deref(), Some("key"));

        let client = ProviderClient::new(config).unwrap();
        assert_eq!(client.url("/generate"), "http://localhost:9999/api/v1/generate");
    }

    #[test]
    fn test_endpoints_per_kind() {
        assert_eq!(submit_endpoint(JobKind::Music), "/generate");
        assert_eq!(status_endpoint(JobKind::MusicVideo), "/mp4/record-info");
        assert_eq!(status_endpoint(JobKind::VocalSeparation), "/vocal-removal/record-info");
    }
}
