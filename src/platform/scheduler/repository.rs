use super::expression::next_run_for;
use super::types::{JobDefinition, JobStatus};
use crate::error::{SchedulerError, StoreError};
use crate::store::parse_stored_timestamp;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::{SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use std::path::Path;

/// Job definitions persisted across restarts.
#[derive(Clone)]
pub struct JobStore {
    pool: SqlitePool,
}

impl JobStore {
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

    /// Registers `name` to run on `schedule`.
    ///
    /// An existing job with the same schedule keeps its `next_run`, so a
    /// restart does not push timers back. A new or rescheduled job first
    /// runs one period after `now`.
    pub async fn every(
        &self,
        name: &str,
        schedule: &str,
        priority: i32,
        now: DateTime<Utc>,
    ) -> Result<JobDefinition, SchedulerError> {
        if let Some(existing) = self.get(name).await?
            && existing.schedule == schedule
        {
            sqlx::query("UPDATE scheduled_jobs SET priority = ? WHERE name = ?")
                .bind(priority)
                .bind(name)
                .execute(&self.pool)
                .await
                .map_err(StoreError::from)?;
            return Ok(JobDefinition {
                priority,
                ..existing
            });
        }

        let next_run = next_run_for(schedule, now)?;
        sqlx::query(
            "INSERT INTO scheduled_jobs (name, schedule, priority, created_at, next_run)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT(name) DO UPDATE SET
                schedule = excluded.schedule,
                priority = excluded.priority,
                next_run = excluded.next_run",
        )
        .bind(name)
        .bind(schedule)
        .bind(priority)
        .bind(db_time(now))
        .bind(db_time(next_run))
        .execute(&self.pool)
        .await
        .map_err(StoreError::from)?;

        tracing::info!(job = name, schedule, next_run = %next_run, "registered job");
        self.get(name).await?.ok_or_else(|| {
            StoreError::Query(format!("job {name} missing right after insert")).into()
        })
    }

    pub async fn get(&self, name: &str) -> Result<Option<JobDefinition>, StoreError> {
        let row = sqlx::query(
            "SELECT name, schedule, priority, next_run, last_run, last_status
             FROM scheduled_jobs WHERE name = ?",
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_job).transpose()
    }

    pub async fn list(&self) -> Result<Vec<JobDefinition>, StoreError> {
        let rows = sqlx::query(
            "SELECT name, schedule, priority, next_run, last_run, last_status
             FROM scheduled_jobs ORDER BY next_run ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_job).collect()
    }

    /// Jobs whose `next_run` has passed, highest priority first.
    pub async fn due(&self, now: DateTime<Utc>) -> Result<Vec<JobDefinition>, StoreError> {
        let rows = sqlx::query(
            "SELECT name, schedule, priority, next_run, last_run, last_status
             FROM scheduled_jobs
             WHERE next_run <= ?
             ORDER BY priority DESC, next_run ASC",
        )
        .bind(db_time(now))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_job).collect()
    }

    pub async fn reschedule_after_run(
        &self,
        job: &JobDefinition,
        status: JobStatus,
        output: &str,
        finished_at: DateTime<Utc>,
    ) -> Result<DateTime<Utc>, SchedulerError> {
        let next_run = next_run_for(&job.schedule, finished_at)?;
        sqlx::query(
            "UPDATE scheduled_jobs
             SET next_run = ?, last_run = ?, last_status = ?, last_output = ?
             WHERE name = ?",
        )
        .bind(db_time(next_run))
        .bind(db_time(finished_at))
        .bind(status.as_db())
        .bind(output)
        .bind(&job.name)
        .execute(&self.pool)
        .await
        .map_err(StoreError::from)?;
        Ok(next_run)
    }
}

/// Fixed-width UTC so `next_run` compares correctly as text.
fn db_time(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

async fn ensure_schema(pool: &SqlitePool) -> Result<(), StoreError> {
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS scheduled_jobs (
            name        TEXT PRIMARY KEY,
            schedule    TEXT NOT NULL,
            priority    INTEGER NOT NULL DEFAULT 0,
            created_at  TEXT NOT NULL,
            next_run    TEXT NOT NULL,
            last_run    TEXT,
            last_status TEXT,
            last_output TEXT
        )",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_scheduled_jobs_next_run ON scheduled_jobs(next_run)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

fn row_to_job(row: &SqliteRow) -> Result<JobDefinition, StoreError> {
    let name: String = row.try_get("name")?;
    let next_run_raw: String = row.try_get("next_run")?;
    let last_run_raw: Option<String> = row.try_get("last_run")?;
    let last_status_raw: Option<String> = row.try_get("last_status")?;

    Ok(JobDefinition {
        schedule: row.try_get("schedule")?,
        priority: row.try_get("priority")?,
        next_run: parse_stored_timestamp(&name, &next_run_raw)?,
        last_run: match last_run_raw {
            Some(raw) => Some(parse_stored_timestamp(&name, &raw)?),
            None => None,
        },
        last_status: last_status_raw.as_deref().map(JobStatus::from_db),
        name,
    })
}
