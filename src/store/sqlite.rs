use super::{IncidentRecord, IncidentStore, parse_stored_timestamp};
use crate::error::StoreError;
use async_trait::async_trait;
use sqlx::sqlite::{SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use std::path::Path;

pub struct SqliteIncidentStore {
    pool: SqlitePool,
}

impl SqliteIncidentStore {
    pub async fn open(db_path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = db_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|error| StoreError::Open {
                    what: parent.display().to_string(),
                    message: error.to_string(),
                })?;
        }

        let url = format!("sqlite://{}?mode=rwc", db_path.display());
        let pool = SqlitePoolOptions::new()
            .max_connections(2)
            .connect(&url)
            .await
            .map_err(|error| StoreError::Open {
                what: db_path.display().to_string(),
                message: error.to_string(),
            })?;

        ensure_schema(&pool).await?;
        Ok(Self { pool })
    }
}

async fn ensure_schema(pool: &SqlitePool) -> Result<(), StoreError> {
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS incidents (
            incident_id TEXT PRIMARY KEY,
            message_id  TEXT NOT NULL,
            last_update TEXT NOT NULL,
            resolved    INTEGER NOT NULL DEFAULT 0
        )",
    )
    .execute(pool)
    .await?;
    Ok(())
}

fn row_to_record(row: &SqliteRow) -> Result<IncidentRecord, StoreError> {
    let incident_id: String = row.try_get("incident_id")?;
    let last_update_raw: String = row.try_get("last_update")?;
    Ok(IncidentRecord {
        last_update: parse_stored_timestamp(&incident_id, &last_update_raw)?,
        message_id: row.try_get("message_id")?,
        resolved: row.try_get::<i64, _>("resolved")? != 0,
        incident_id,
    })
}

#[async_trait]
impl IncidentStore for SqliteIncidentStore {
    async fn get(&self, incident_id: &str) -> Result<Option<IncidentRecord>, StoreError> {
        let row = sqlx::query(
            "SELECT incident_id, message_id, last_update, resolved
             FROM incidents WHERE incident_id = ?",
        )
        .bind(incident_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_record).transpose()
    }

    async fn set(&self, record: &IncidentRecord) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO incidents (incident_id, message_id, last_update, resolved)
             VALUES (?, ?, ?, ?)
             ON CONFLICT(incident_id) DO UPDATE SET
                message_id = excluded.message_id,
                last_update = excluded.last_update,
                resolved = excluded.resolved",
        )
        .bind(&record.incident_id)
        .bind(&record.message_id)
        .bind(record.last_update.to_rfc3339())
        .bind(i64::from(record.resolved))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn fetch_all(&self) -> Result<Vec<IncidentRecord>, StoreError> {
        let rows = sqlx::query(
            "SELECT incident_id, message_id, last_update, resolved
             FROM incidents ORDER BY incident_id ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_record).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use tempfile::TempDir;

    fn record(id: &str, message: &str) -> IncidentRecord {
        IncidentRecord {
            incident_id: id.into(),
            message_id: message.into(),
            last_update: Utc::now(),
            resolved: false,
        }
    }

    #[tokio::test]
    async fn get_missing_returns_none() {
        let tmp = TempDir::new().unwrap();
        let store = SqliteIncidentStore::open(&tmp.path().join("state/incidents.db"))
            .await
            .unwrap();

        assert!(store.get("nope").await.unwrap().is_none());
        assert!(store.fetch_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn set_overwrites_in_place() {
        let tmp = TempDir::new().unwrap();
        let store = SqliteIncidentStore::open(&tmp.path().join("incidents.db"))
            .await
            .unwrap();

        store.set(&record("inc-1", "m-1")).await.unwrap();
        let mut updated = record("inc-1", "m-1");
        updated.resolved = true;
        updated.last_update = Utc::now() + Duration::minutes(5);
        store.set(&updated).await.unwrap();

        let all = store.fetch_all().await.unwrap();
        assert_eq!(all.len(), 1);
        assert!(all[0].resolved);
        assert_eq!(
            all[0].last_update.timestamp_millis(),
            updated.last_update.timestamp_millis()
        );
    }

    #[tokio::test]
    async fn records_survive_reopen() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("incidents.db");
        {
            let store = SqliteIncidentStore::open(&path).await.unwrap();
            store.set(&record("b", "m-b")).await.unwrap();
            store.set(&record("a", "m-a")).await.unwrap();
        }

        let store = SqliteIncidentStore::open(&path).await.unwrap();
        let ids: Vec<_> = store
            .fetch_all()
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.incident_id)
            .collect();
        assert_eq!(ids, ["a", "b"]);
        assert_eq!(store.get("b").await.unwrap().unwrap().message_id, "m-b");
    }
}
