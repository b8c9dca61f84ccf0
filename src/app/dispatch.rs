use crate::app::status::{render_incidents, render_jobs, render_status};
use crate::cli::commands::{Cli, Commands};
use anyhow::{Context, Result};
use incident_mirror::Config;
use incident_mirror::mirror::{Archiver, Reconciler};
use incident_mirror::platform::daemon::{self, DaemonStatus};
use incident_mirror::platform::scheduler::JobStore;
use incident_mirror::store::{IncidentStore, SqliteIncidentStore};
use std::sync::Arc;
use tracing::info;

async fn open_store(config: &Config) -> Result<Arc<SqliteIncidentStore>> {
    let store = SqliteIncidentStore::open(&config.incidents_db_path())
        .await
        .context("Failed to open incident store")?;
    Ok(Arc::new(store))
}

fn read_daemon_state(config: &Config) -> Option<DaemonStatus> {
    let raw = std::fs::read_to_string(daemon::state_file_path(config)).ok()?;
    serde_json::from_str(&raw)
        .inspect_err(|error| tracing::warn!(%error, "ignoring unreadable daemon state file"))
        .ok()
}

pub async fn dispatch(cli: Cli, config: Config) -> Result<()> {
    let config = Arc::new(config);

    match cli.command {
        Commands::Run => daemon::run(config).await,

        Commands::Check => {
            let store = open_store(&config).await?;
            let reconciler = Reconciler::from_config(&config, store)?;
            let report = reconciler.check().await?;
            info!(%report, "check finished");
            println!("{report}");
            Ok(())
        }

        Commands::Archive => {
            let store = open_store(&config).await?;
            let archiver = Archiver::connect(&config, store).await?;
            let report = archiver.archive().await?;
            info!(%report, "archive finished");
            println!("{report}");
            Ok(())
        }

        Commands::Incidents => {
            let store = open_store(&config).await?;
            let records = store.fetch_all().await?;
            println!("{}", render_incidents(&records));
            Ok(())
        }

        Commands::Jobs => {
            let jobs = JobStore::open(&config.jobs_db_path())
                .await
                .context("Failed to open job store")?;
            println!("{}", render_jobs(&jobs.list().await?));
            Ok(())
        }

        Commands::Status => {
            let state = read_daemon_state(&config);
            println!("{}", render_status(&config, state.as_ref()));
            Ok(())
        }
    }
}
