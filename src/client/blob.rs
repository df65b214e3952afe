//! Blob reference resolution
//!
//! Large answers are not sent inline; the response carries a URL to a stored
//! [`CachedEntry`](super::CachedEntry) document instead.

use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::error::{ClientError, Result};

#[async_trait]
pub trait BlobFetcher: Send + Sync {
    /// Download the document at `url` as text
    async fn fetch(&self, url: &str) -> Result<String>;
}

/// Fetches blob references over HTTP(S)
pub struct HttpBlobFetcher {
    http_client: reqwest::Client,
}

impl HttpBlobFetcher {
    pub fn new(timeout: Duration) -> Self {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("llm-stream/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_default();

        Self { http_client }
    }
}

impl Default for HttpBlobFetcher {
    fn default() -> Self {
        Self::new(Duration::from_secs(60))
    }
}

#[async_trait]
impl BlobFetcher for HttpBlobFetcher {
    async fn fetch(&self, url: &str) -> Result<String> {
        debug!("Fetching answer blob");

        let response = self
            .http_client
            .get(url)
            .send()
            .await
            .map_err(|e| ClientError::Blob(format!("request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ClientError::Blob(format!("HTTP {}", status)));
        }

        response
            .text()
            .await
            .map_err(|e| ClientError::Blob(format!("failed to read body: {}", e)))
    }
}
