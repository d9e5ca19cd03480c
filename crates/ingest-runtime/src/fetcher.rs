//! Remote content retrieval for pasted URLs.

use std::time::Duration;

use async_trait::async_trait;

use ingest_kernel::UploadError;

use super::config::ExecutorConfig;

/// Fetches the raw bytes behind a remote reference.
#[async_trait]
pub trait ContentFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, UploadError>;
}

/// HTTP(S) fetcher backed by `reqwest`.
#[derive(Debug, Clone)]
pub struct HttpContentFetcher {
    client: reqwest::Client,
    max_bytes: usize,
}

impl HttpContentFetcher {
    pub fn new(timeout: Duration, max_bytes: usize) -> Result<Self, UploadError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| UploadError::Fetch(format!("failed to create HTTP client: {}", e)))?;
        Ok(Self { client, max_bytes })
    }

    pub fn from_config(config: &ExecutorConfig) -> Result<Self, UploadError> {
        Self::new(config.fetch_timeout, config.max_upload_bytes)
    }

    fn too_large(&self, url: &str) -> UploadError {
        UploadError::Fetch(format!("{} exceeds the {} byte upload limit", url, self.max_bytes))
    }
}

#[async_trait]
impl ContentFetcher for HttpContentFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, UploadError> {
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(UploadError::Fetch(format!("unsupported URL scheme: {}", url)));
        }
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| UploadError::Fetch(format!("request to {} failed: {}", url, e)))?;
        if !response.status().is_success() {
            return Err(UploadError::Fetch(format!(
                "{} returned HTTP {}",
                url,
                response.status()
            )));
        }
        if response
            .content_length()
            .is_some_and(|length| length > self.max_bytes as u64)
        {
            return Err(self.too_large(url));
        }
        let bytes = response
            .bytes()
            .await
            .map_err(|e| UploadError::Fetch(format!("reading {} failed: {}", url, e)))?;
        if bytes.len() > self.max_bytes {
            return Err(self.too_large(url));
        }
        Ok(bytes.to_vec())
    }
}
