//! Gateway retrieval of content blobs. Each fetch is one bounded-timeout GET;
//! there are no retries here, a failed reference simply waits for a later pass.

use crate::content::payload::Payload;
use crate::runtime::config::MonitorConfig;
use anyhow::{bail, Context, Result};
use futures::future::BoxFuture;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

const USER_AGENT: &str = concat!("ledgerwatch/", env!("CARGO_PKG_VERSION"));
pub const DEFAULT_MAX_CONTENT_BYTES: usize = 16 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("content fetch timed out after {after:?}")]
    Timeout { after: Duration },
    #[error("content transport failed: {0}")]
    Transport(#[source] reqwest::Error),
    #[error("gateway returned HTTP {status}")]
    Status { status: u16 },
    #[error("content payload is malformed: {reason}")]
    Malformed { reason: String },
    #[error("content body exceeds {limit} bytes")]
    TooLarge { limit: usize },
}

/// Retrieves and parses the payload behind a content reference.
pub trait ContentFetcher: Send + Sync {
    fn fetch<'a>(&'a self, content_ref: &'a str) -> BoxFuture<'a, Result<Payload, FetchError>>;
}

#[derive(Debug, Clone)]
pub struct GatewayFetcher {
    base_url: Arc<String>,
    client: reqwest::Client,
    timeout: Duration,
    max_content_bytes: usize,
}

impl ContentFetcher for GatewayFetcher {
    fn fetch<'a>(&'a self, content_ref: &'a str) -> BoxFuture<'a, Result<Payload, FetchError>> {
        Box::pin(self.fetch_payload(content_ref))
    }
}

impl GatewayFetcher {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        if timeout.is_zero() {
            bail!("fetch timeout must be greater than 0");
        }

        let base_url = base_url.into().trim().to_owned();
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            bail!("gateway url must start with http:// or https://");
        }

        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .context("failed to build gateway HTTP client")?;

        Ok(Self {
            base_url: Arc::new(base_url),
            client,
            timeout,
            max_content_bytes: DEFAULT_MAX_CONTENT_BYTES,
        })
    }

    pub fn from_config(config: &MonitorConfig) -> Result<Self> {
        Self::new(config.gateway_url().to_owned(), config.fetch_timeout())?
            .with_max_content_bytes(config.max_content_bytes())
    }

    /// Caps the body size accepted from the gateway.
    pub fn with_max_content_bytes(mut self, limit: usize) -> Result<Self> {
        if limit == 0 {
            bail!("max content bytes must be greater than 0");
        }
        self.max_content_bytes = limit;
        Ok(self)
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn max_content_bytes(&self) -> usize {
        self.max_content_bytes
    }

    /// Full URL of the blob behind `content_ref`.
    pub fn content_url(&self, content_ref: &str) -> String {
        let content_ref = content_ref.trim().trim_start_matches('/');
        if self.base_url.ends_with('/') {
            format!("{}{content_ref}", self.base_url)
        } else {
            format!("{}/{content_ref}", self.base_url)
        }
    }

    pub async fn fetch_payload(&self, content_ref: &str) -> Result<Payload, FetchError> {
        let url = self.content_url(content_ref);
        let body = tokio::time::timeout(self.timeout, self.download(&url))
            .await
            .map_err(|_| FetchError::Timeout {
                after: self.timeout,
            })??;

        Payload::from_slice(&body).map_err(|err| FetchError::Malformed {
            reason: err.to_string(),
        })
    }

    async fn download(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let mut response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|err| self.map_transport(err))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
            });
        }

        let limit = self.max_content_bytes;
        let declared = response.content_length().unwrap_or(0);
        if declared > limit as u64 {
            return Err(FetchError::TooLarge { limit });
        }

        let mut body = Vec::with_capacity(declared as usize);
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|err| self.map_transport(err))?
        {
            if body.len() + chunk.len() > limit {
                return Err(FetchError::TooLarge { limit });
            }
            body.extend_from_slice(&chunk);
        }
        Ok(body)
    }

    fn map_transport(&self, err: reqwest::Error) -> FetchError {
        if err.is_timeout() {
            FetchError::Timeout {
                after: self.timeout,
            }
        } else {
            FetchError::Transport(err)
        }
    }
}
