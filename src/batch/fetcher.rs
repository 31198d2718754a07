//! Outbound fetches for batch work items.

use async_trait::async_trait;
use reqwest::StatusCode;
use tracing::trace;

use super::item::WorkItem;
use crate::config::BatchConfig;
use crate::error::{Result, SluiceError};

/// What came back from a single fetch.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    /// The remote side answered with a payload.
    Data(serde_json::Value),
    /// The remote side is over quota; the item should be requeued.
    Throttled,
}

/// Trait for performing the one outbound call behind a work item.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, item: &WorkItem) -> Result<FetchOutcome>;
}

/// Fetches JSON documents over HTTP.
///
/// `429 Too Many Requests` maps to [`FetchOutcome::Throttled`]. Any other
/// non-success status is an error.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    /// Create a fetcher using the batch request settings.
    pub fn new(config: &BatchConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .user_agent(config.user_agent.as_str())
            .build()?;
        Ok(Self { client })
    }

    /// Create a fetcher around an existing client.
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, item: &WorkItem) -> Result<FetchOutcome> {
        let response = self.client.get(&item.url).send().await?;
        let status = response.status();

        trace!(item = %item, status = status.as_u16(), "Fetched");

        if status == StatusCode::TOO_MANY_REQUESTS {
            return Ok(FetchOutcome::Throttled);
        }
        if !status.is_success() {
            return Err(SluiceError::Status {
                url: item.url.clone(),
                status: status.as_u16(),
            });
        }

        let data = response.json::<serde_json::Value>().await?;
        Ok(FetchOutcome::Data(data))
    }
}
