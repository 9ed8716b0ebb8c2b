//! URL fetch collaborator: one web page → markdown content.
//!
//! The default implementation fetches the page and returns the body as-is.
//! Markdown conversion quality is the collaborator's concern, not the
//! pipeline's: a response that is not markdown (raw HTML, plain text) is
//! still wrapped into the `url` record unchanged rather than failing the
//! run.

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

/// Errors from the URL fetch collaborator.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The URL could not be reached at all.
    #[error("failed to fetch '{url}': {detail}")]
    Unavailable { url: String, detail: String },

    /// The fetch exceeded the configured timeout.
    #[error("fetch timed out after {secs}s for '{url}'")]
    Timeout { url: String, secs: u64 },

    /// The server answered with a non-success status.
    #[error("'{url}' returned HTTP {status}")]
    Http { url: String, status: u16 },
}

/// Fetches one URL and returns its content as markdown.
#[async_trait]
pub trait UrlFetcher: Send + Sync {
    async fn fetch_markdown(&self, url: &str) -> Result<String, FetchError>;
}

/// Default fetcher: plain HTTP GET with a timeout, body passed through.
pub struct HttpFetcher {
    http: reqwest::Client,
    timeout_secs: u64,
}

impl HttpFetcher {
    pub fn new(timeout_secs: u64) -> Self {
        let http = reqwest::Client::builder()
            .user_agent(concat!("extract2json/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(timeout_secs.max(1)))
            .build()
            .expect("Failed to construct reqwest::Client for fetcher");
        Self { http, timeout_secs }
    }
}

#[async_trait]
impl UrlFetcher for HttpFetcher {
    async fn fetch_markdown(&self, url: &str) -> Result<String, FetchError> {
        info!("Fetching URL: {url}");

        let response = self.http.get(url).send().await.map_err(|e| {
            if e.is_timeout() {
                FetchError::Timeout {
                    url: url.to_string(),
                    secs: self.timeout_secs,
                }
            } else {
                FetchError::Unavailable {
                    url: url.to_string(),
                    detail: e.to_string(),
                }
            }
        })?;

        if !response.status().is_success() {
            return Err(FetchError::Http {
                url: url.to_string(),
                status: response.status().as_u16(),
            });
        }

        let body = response.text().await.map_err(|e| FetchError::Unavailable {
            url: url.to_string(),
            detail: e.to_string(),
        })?;

        debug!("Fetched {} bytes from {url}", body.len());
        Ok(body)
    }
}
