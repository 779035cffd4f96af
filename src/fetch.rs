//! Shared HTTP page fetcher.
//!
//! One `reqwest` client is built per process and handed (via `Arc`) to the
//! classifier and every handler, so all page downloads share the same
//! timeout, user agent, and connection pool. The classifier's raw-content
//! cache guarantees at most one fetch per URL per run; this type only does
//! the actual I/O.

use std::time::Duration;

use anyhow::{Context, Result};

use crate::config::FetchConfig;
use crate::error::FetchError;

pub struct PageFetcher {
    client: reqwest::Client,
}

impl PageFetcher {
    pub fn new(config: &FetchConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(config.user_agent.clone())
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self { client })
    }

    /// Download a page body as text.
    ///
    /// Non-2xx responses are errors; the pipeline treats an error page the
    /// same as an unreachable one.
    pub async fn fetch_text(&self, url: &str) -> std::result::Result<String, FetchError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| FetchError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }

        response
            .text()
            .await
            .map_err(|e| FetchError::Network(e.to_string()))
    }
}
