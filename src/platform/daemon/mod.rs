//! Long-running mirror process.

use crate::config::Config;
use crate::diagnostics::health;
use crate::mirror::{Archiver, Reconciler};
use crate::platform::scheduler::{ARCHIVE_JOB, CHECK_JOB, JobStore, Scheduler};
use crate::store::SqliteIncidentStore;
use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

mod state;
mod supervisor;

pub use state::DaemonStatus;
use state::spawn_state_writer;
use supervisor::spawn_component_supervisor;

const STATUS_FLUSH_SECONDS: u64 = 5;
const CHECK_PRIORITY: i32 = 10;
const ARCHIVE_PRIORITY: i32 = 0;

pub async fn run(config: Arc<Config>) -> Result<()> {
    let initial_backoff = config.reliability.initial_backoff_secs.max(1);
    let max_backoff = config.reliability.max_backoff_secs.max(initial_backoff);

    health::mark_component_ok("daemon");
    let scheduler = Arc::new(start(&config).await?);

    let shutdown = CancellationToken::new();
    let scheduler_token = shutdown.clone();
    let handles: Vec<(&'static str, JoinHandle<()>)> = vec![
        (
            "state-writer",
            spawn_state_writer(Arc::clone(&config), shutdown.clone()),
        ),
        (
            "scheduler",
            spawn_component_supervisor(
                "scheduler",
                initial_backoff,
                max_backoff,
                config.reliability.max_restarts,
                shutdown.clone(),
                move || {
                    let scheduler = Arc::clone(&scheduler);
                    let token = scheduler_token.clone();
                    async move { scheduler.run(token).await }
                },
            ),
        ),
    ];

    println!("◆ incident-mirror running");
    println!("   feed: {}", config.feed.api_base);
    println!(
        "   jobs: {CHECK_JOB} ({}), {ARCHIVE_JOB} ({})",
        config.scheduler.check_schedule, config.scheduler.archive_schedule
    );
    println!("   Ctrl+C to stop");

    tokio::signal::ctrl_c().await?;
    health::mark_component_error("daemon", "shutdown requested");
    tracing::info!("shutting down");

    shutdown.cancel();
    join_tasks(handles).await;

    Ok(())
}

/// Awaits every task and returns how many ended in a panic or cancellation.
async fn join_tasks(handles: Vec<(&'static str, JoinHandle<()>)>) -> usize {
    let mut failed = 0;
    for (name, handle) in handles {
        if let Err(error) = handle.await {
            tracing::warn!(task = name, error = %error, "daemon task did not exit cleanly");
            failed += 1;
        }
    }
    failed
}

/// Startup sequence up to a ready scheduler: one immediate check, then the
/// archive connection, then job registration. A failed initial check is
/// logged and startup continues.
pub async fn start(config: &Config) -> Result<Scheduler> {
    let store = Arc::new(
        SqliteIncidentStore::open(&config.incidents_db_path())
            .await
            .context("Failed to open incident store")?,
    );
    let reconciler = Arc::new(Reconciler::from_config(config, store.clone())?);

    match reconciler.check().await {
        Ok(report) => tracing::info!(%report, "initial check finished"),
        Err(error) => tracing::warn!(error = %error, "initial check failed"),
    }

    let archiver = Arc::new(Archiver::connect(config, store).await?);

    let jobs = JobStore::open(&config.jobs_db_path())
        .await
        .context("Failed to open job store")?;
    let mut scheduler = Scheduler::new(jobs, config.scheduler.poll_secs);
    scheduler
        .every(
            CHECK_JOB,
            &config.scheduler.check_schedule,
            CHECK_PRIORITY,
            reconciler,
        )
        .await?;
    scheduler
        .every(
            ARCHIVE_JOB,
            &config.scheduler.archive_schedule,
            ARCHIVE_PRIORITY,
            archiver,
        )
        .await?;
    Ok(scheduler)
}

pub fn state_file_path(config: &Config) -> PathBuf {
    state::state_file_path(config)
}
