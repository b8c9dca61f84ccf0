//! Local incident → message mapping and its durable archive.

pub mod archive;
pub mod sqlite;

pub use archive::{ArchiveStore, ArchivedIncident, SqlArchiveStore};
pub use sqlite::SqliteIncidentStore;

use crate::error::StoreError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Which chat message mirrors an incident, and when it was last refreshed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncidentRecord {
    pub incident_id: String,
    pub message_id: String,
    pub last_update: DateTime<Utc>,
    pub resolved: bool,
}

/// Key-value store owned by the reconciler. Records are overwritten in
/// place and never deleted.
#[async_trait]
pub trait IncidentStore: Send + Sync {
    async fn get(&self, incident_id: &str) -> Result<Option<IncidentRecord>, StoreError>;

    async fn set(&self, record: &IncidentRecord) -> Result<(), StoreError>;

    /// Every record, ordered by incident id.
    async fn fetch_all(&self) -> Result<Vec<IncidentRecord>, StoreError>;
}

pub(crate) fn parse_stored_timestamp(key: &str, raw: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|parsed| parsed.with_timezone(&Utc))
        .map_err(|error| StoreError::Corrupt {
            key: key.to_string(),
            message: format!("invalid timestamp {raw:?}: {error}"),
        })
}
