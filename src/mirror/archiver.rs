use crate::config::Config;
use crate::diagnostics::health;
use crate::error::{Result, StoreError};
use crate::platform::scheduler::JobHandler;
use crate::store::{
    ArchiveStore, ArchivedIncident, IncidentRecord, IncidentStore, SqlArchiveStore,
};
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

const COMPONENT: &str = "archiver";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ArchiveReport {
    pub archived: usize,
    pub failed: usize,
}

impl fmt::Display for ArchiveReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} archived, {} failed", self.archived, self.failed)
    }
}

/// Copies every local record into the archive, one entry at a time with a
/// fixed pause before each.
pub struct Archiver {
    store: Arc<dyn IncidentStore>,
    archive: Arc<dyn ArchiveStore>,
    entry_delay: Duration,
}

impl Archiver {
    pub fn new(
        store: Arc<dyn IncidentStore>,
        archive: Arc<dyn ArchiveStore>,
        entry_delay: Duration,
    ) -> Self {
        Self {
            store,
            archive,
            entry_delay,
        }
    }

    /// Connects to the configured archive.
    pub async fn connect(config: &Config, store: Arc<dyn IncidentStore>) -> Result<Self> {
        let url = config.require_archive_url()?;
        let archive = SqlArchiveStore::connect(url, &config.archive.database).await?;
        Ok(Self::new(
            store,
            Arc::new(archive),
            Duration::from_millis(config.archive.entry_delay_ms),
        ))
    }

    pub async fn archive(&self) -> Result<ArchiveReport> {
        let records = self.store.fetch_all().await.inspect_err(|error| {
            health::mark_component_error(COMPONENT, error.to_string());
        })?;

        let mut report = ArchiveReport::default();
        for record in &records {
            tokio::time::sleep(self.entry_delay).await;
            match self.archive_one(record).await {
                Ok(()) => report.archived += 1,
                Err(error) => {
                    tracing::warn!(incident_id = %record.incident_id, error = %error, "failed to archive incident");
                    report.failed += 1;
                }
            }
        }

        health::record_run(COMPONENT, &report, report.failed);
        tracing::info!(archived = report.archived, failed = report.failed, "archive run finished");
        Ok(report)
    }

    async fn archive_one(&self, record: &IncidentRecord) -> std::result::Result<(), StoreError> {
        let doc = match self.archive.find_one(&record.incident_id).await? {
            Some(mut existing) => {
                existing.overwrite_from(record);
                existing
            }
            None => ArchivedIncident::from_record(record),
        };
        self.archive.save(&doc).await
    }
}

#[async_trait]
impl JobHandler for Archiver {
    async fn run(&self) -> anyhow::Result<String> {
        Ok(self.archive().await?.to_string())
    }
}
