use super::IncidentFeed;
use super::types::{Incident, StatusPageResult};
use crate::config::FeedConfig;
use crate::error::FeedError;
use async_trait::async_trait;
use std::time::Duration;

pub struct StatusPageClient {
    client: reqwest::Client,
    incidents_url: String,
}

impl StatusPageClient {
    pub fn new(api_base: &str, timeout: Duration) -> Result<Self, FeedError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("incident-mirror/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|error| FeedError::Request {
                url: api_base.to_string(),
                message: error.to_string(),
            })?;

        Ok(Self {
            client,
            incidents_url: format!("{}/incidents.json", api_base.trim_end_matches('/')),
        })
    }

    pub fn from_config(config: &FeedConfig) -> Result<Self, FeedError> {
        Self::new(&config.api_base, Duration::from_secs(config.timeout_secs.max(1)))
    }
}

#[async_trait]
impl IncidentFeed for StatusPageClient {
    async fn fetch_incidents(&self) -> Result<Vec<Incident>, FeedError> {
        let url = &self.incidents_url;
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|error| FeedError::Request {
                url: url.clone(),
                message: error.to_string(),
            })?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response
                .text()
                .await
                .unwrap_or_else(|error| format!("<failed to read response body: {error}>"));
            return Err(FeedError::Status {
                url: url.clone(),
                status,
                body,
            });
        }

        let result: StatusPageResult = response
            .json()
            .await
            .map_err(|error| FeedError::Decode(error.to_string()))?;

        tracing::debug!(count = result.incidents.len(), "fetched incident feed");
        Ok(result.incidents)
    }
}
