//! HTTP artifact fetcher.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::debug;

use cadence_core::defaults::ARTIFACT_FETCH_TIMEOUT_SECS;
use cadence_core::{ArtifactFetcher, Error, Result};

/// Downloads artifact bytes from provider CDN URLs.
pub struct HttpArtifactFetcher {
    client: Client,
}

impl HttpArtifactFetcher {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Config(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self { client })
    }

    /// Fetcher with `ARTIFACT_FETCH_TIMEOUT_SECS` (default 60) as request timeout.
    pub fn from_env() -> Result<Self> {
        let secs = std::env::var("ARTIFACT_FETCH_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(ARTIFACT_FETCH_TIMEOUT_SECS);
        Self::new(Duration::from_secs(secs))
    }
}

#[async_trait]
impl ArtifactFetcher for HttpArtifactFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| Error::Request(format!("Download failed for {}: {}", url, e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::Request(format!("Download failed for {}: HTTP {}", url, status)));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| Error::Request(format!("Download interrupted for {}: {}", url, e)))?;

        debug!(
            subsystem = "provider",
            op = "fetch_artifact",
            size_bytes = bytes.len(),
            "Artifact downloaded"
        );
        Ok(bytes.to_vec())
    }
}
