//! Status-page incident feed: wire models and the HTTP client that fetches them.

pub mod client;
pub mod types;

pub use client::StatusPageClient;
pub use types::{
    Component, Impact, Incident, IncidentStatus, IncidentUpdate, StatusPageResult,
    parse_feed_timestamp,
};

use crate::error::FeedError;
use async_trait::async_trait;

/// Source of the current incident list.
#[async_trait]
pub trait IncidentFeed: Send + Sync {
    /// Incidents in feed order (the status page lists newest first).
    async fn fetch_incidents(&self) -> Result<Vec<Incident>, FeedError>;
}
