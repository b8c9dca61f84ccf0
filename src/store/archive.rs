use super::{IncidentRecord, parse_stored_timestamp};
use crate::error::{ConfigError, MirrorError, StoreError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use uuid::Uuid;

/// Archived copy of an [`IncidentRecord`], addressed by its own document id
/// and looked up by incident id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchivedIncident {
    pub id: String,
    pub incident_id: String,
    pub last_update: DateTime<Utc>,
    pub message_id: String,
    pub resolved: bool,
}

impl ArchivedIncident {
    pub fn from_record(record: &IncidentRecord) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            incident_id: record.incident_id.clone(),
            last_update: record.last_update,
            message_id: record.message_id.clone(),
            resolved: record.resolved,
        }
    }

    /// Overwrites every mirrored field; the document id is kept.
    pub fn overwrite_from(&mut self, record: &IncidentRecord) {
        self.incident_id.clone_from(&record.incident_id);
        self.last_update = record.last_update;
        self.message_id.clone_from(&record.message_id);
        self.resolved = record.resolved;
    }
}

#[async_trait]
pub trait ArchiveStore: Send + Sync {
    async fn find_one(&self, incident_id: &str) -> Result<Option<ArchivedIncident>, StoreError>;

    /// Creates the document, or overwrites the one with the same incident id.
    async fn save(&self, doc: &ArchivedIncident) -> Result<(), StoreError>;
}

/// Document collection kept in a SQL database, one table per collection.
pub struct SqlArchiveStore {
    pool: SqlitePool,
    collection: String,
}

pub fn is_valid_collection_name(name: &str) -> bool {
    let mut chars = name.chars();
    chars
        .next()
        .is_some_and(|first| first.is_ascii_alphabetic() || first == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

impl SqlArchiveStore {
    /// Connects to `url` and selects the `database` collection, creating it
    /// when absent.
    pub async fn connect(url: &str, database: &str) -> Result<Self, MirrorError> {
        if !is_valid_collection_name(database) {
            return Err(ConfigError::Validation(format!(
                "archive collection must be a plain identifier, got {database:?}"
            ))
            .into());
        }

        let options = SqliteConnectOptions::from_str(url)
            .map_err(|error| StoreError::Open {
                what: "archive".into(),
                message: error.to_string(),
            })?
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(2)
            .connect_with(options)
            .await
            .map_err(|error| StoreError::Open {
                what: "archive".into(),
                message: error.to_string(),
            })?;

        let store = Self {
            pool,
            collection: database.to_string(),
        };
        store.ensure_collection().await?;
        tracing::info!(collection = %store.collection, "connected to archive store");
        Ok(store)
    }

    async fn ensure_collection(&self) -> Result<(), StoreError> {
        let table = &self.collection;
        sqlx::query(&format!(
            "CREATE TABLE IF NOT EXISTS {table} (
                id          TEXT PRIMARY KEY,
                incident_id TEXT NOT NULL UNIQUE,
                last_update TEXT NOT NULL,
                message_id  TEXT NOT NULL,
                resolved    INTEGER NOT NULL
            )"
        ))
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

fn row_to_doc(row: &SqliteRow) -> Result<ArchivedIncident, StoreError> {
    let incident_id: String = row.try_get("incident_id")?;
    let last_update_raw: String = row.try_get("last_update")?;
    Ok(ArchivedIncident {
        id: row.try_get("id")?,
        last_update: parse_stored_timestamp(&incident_id, &last_update_raw)?,
        message_id: row.try_get("message_id")?,
        resolved: row.try_get::<i64, _>("resolved")? != 0,
        incident_id,
    })
}

#[async_trait]
impl ArchiveStore for SqlArchiveStore {
    async fn find_one(&self, incident_id: &str) -> Result<Option<ArchivedIncident>, StoreError> {
        let table = &self.collection;
        let row = sqlx::query(&format!(
            "SELECT id, incident_id, last_update, message_id, resolved
             FROM {table} WHERE incident_id = ?"
        ))
        .bind(incident_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_doc).transpose()
    }

    async fn save(&self, doc: &ArchivedIncident) -> Result<(), StoreError> {
        let table = &self.collection;
        sqlx::query(&format!(
            "INSERT INTO {table} (id, incident_id, last_update, message_id, resolved)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT(incident_id) DO UPDATE SET
                last_update = excluded.last_update,
                message_id = excluded.message_id,
                resolved = excluded.resolved"
        ))
        .bind(&doc.id)
        .bind(&doc.incident_id)
        .bind(doc.last_update.to_rfc3339())
        .bind(&doc.message_id)
        .bind(i64::from(doc.resolved))
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
