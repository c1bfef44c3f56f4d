//! Remote resource fetching
//!
//! The engine never talks to the network directly; it goes through a
//! [`ResourceFetcher`] chosen when the engine is built. [`HttpFetcher`] is the
//! default, tests and embedders can supply their own.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::{SheetfillError, SheetfillResult};
use crate::types::DEFAULT_FETCH_TIMEOUT_SECS;

#[async_trait]
pub trait ResourceFetcher: Send + Sync {
    /// Fetch the full body behind `url`
    async fn fetch(&self, url: &str) -> SheetfillResult<Vec<u8>>;
}

/// HTTP(S) fetcher with a fixed per-request timeout and no retries. The
/// timeout covers the whole request, from connecting to the last body byte.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> SheetfillResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SheetfillError::Fetch(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { client })
    }
}

impl Default for HttpFetcher {
    fn default() -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(DEFAULT_FETCH_TIMEOUT_SECS))
                .build()
                .unwrap_or_default(),
        }
    }
}

#[async_trait]
impl ResourceFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> SheetfillResult<Vec<u8>> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| SheetfillError::Fetch(format!("Error fetching {}: {}", url, e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SheetfillError::Fetch(format!(
                "Failed to fetch {}, status code: {}",
                url,
                status.as_u16()
            )));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| SheetfillError::Fetch(format!("Error reading {}: {}", url, e)))?;
        Ok(body.to_vec())
    }
}
