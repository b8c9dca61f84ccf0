use super::repository::JobStore;
use super::types::{JobDefinition, JobStatus};
use crate::diagnostics::health;
use crate::error::SchedulerError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::time::{self, Duration, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

const MIN_POLL_SECONDS: u64 = 5;
const COMPONENT: &str = "scheduler";

/// Work bound to a named job. The returned string is stored as the run's
/// output.
#[async_trait]
pub trait JobHandler: Send + Sync {
    async fn run(&self) -> anyhow::Result<String>;
}

pub struct Scheduler {
    store: JobStore,
    handlers: HashMap<String, Arc<dyn JobHandler>>,
    poll: Duration,
}

impl Scheduler {
    pub fn new(store: JobStore, poll_secs: u64) -> Self {
        Self {
            store,
            handlers: HashMap::new(),
            poll: Duration::from_secs(poll_secs.max(MIN_POLL_SECONDS)),
        }
    }

    /// Persists the job definition and binds `handler` to it.
    pub async fn every(
        &mut self,
        name: &str,
        schedule: &str,
        priority: i32,
        handler: Arc<dyn JobHandler>,
    ) -> Result<JobDefinition, SchedulerError> {
        let job = self.store.every(name, schedule, priority, Utc::now()).await?;
        self.handlers.insert(name.to_string(), handler);
        Ok(job)
    }

    pub fn store(&self) -> &JobStore {
        &self.store
    }

    /// Runs every job due at `now`, one after another, and returns how many
    /// ran. Jobs with no registered handler are left untouched.
    pub async fn run_due(&self, now: DateTime<Utc>) -> Result<usize, SchedulerError> {
        let jobs = self.store.due(now).await?;
        let mut ran = 0;

        for job in jobs {
            let Some(handler) = self.handlers.get(&job.name) else {
                tracing::warn!(job = %job.name, "due job has no handler in this process");
                continue;
            };

            tracing::debug!(job = %job.name, "running job");
            let (status, output) = match handler.run().await {
                Ok(output) => {
                    tracing::info!(job = %job.name, %output, "job finished");
                    (JobStatus::Ok, output)
                }
                Err(error) => {
                    tracing::error!(job = %job.name, error = %error, "job failed");
                    health::mark_component_error(COMPONENT, format!("job {} failed", job.name));
                    (JobStatus::Error, format!("{error:#}"))
                }
            };
            ran += 1;

            let next_run = self
                .store
                .reschedule_after_run(&job, status, &output, Utc::now())
                .await?;
            tracing::debug!(job = %job.name, next_run = %next_run, "rescheduled");
        }

        Ok(ran)
    }

    /// Polls for due jobs until `shutdown` fires.
    pub async fn run(&self, shutdown: CancellationToken) -> anyhow::Result<()> {
        let mut interval = time::interval(self.poll);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        health::mark_component_ok(COMPONENT);

        loop {
            tokio::select! {
                biased;
                () = shutdown.cancelled() => {
                    tracing::info!("scheduler stopping");
                    return Ok(());
                }
                _ = interval.tick() => {}
            }

            match self.run_due(Utc::now()).await {
                Ok(_) => health::mark_component_ok(COMPONENT),
                Err(error) => {
                    health::mark_component_error(COMPONENT, error.to_string());
                    tracing::warn!("Scheduler query failed: {error}");
                }
            }
        }
    }
}
