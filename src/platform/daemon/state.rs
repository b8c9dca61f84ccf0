use crate::config::Config;
use crate::diagnostics::health::{self, HealthSnapshot};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::Duration;
use tokio_util::sync::CancellationToken;

/// Contents of `daemon_state.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonStatus {
    #[serde(flatten)]
    pub snapshot: HealthSnapshot,
    pub written_at: String,
}

pub(super) fn state_file_path(config: &Config) -> PathBuf {
    config
        .config_path
        .parent()
        .map_or_else(|| PathBuf::from("."), PathBuf::from)
        .join("daemon_state.json")
}

async fn write_state(path: &Path) {
    let status = DaemonStatus {
        snapshot: health::snapshot(),
        written_at: Utc::now().to_rfc3339(),
    };
    let data = serde_json::to_vec_pretty(&status).unwrap_or_else(|_| b"{}".to_vec());
    if let Err(error) = tokio::fs::write(path, data).await {
        tracing::warn!(%error, "failed to write daemon state file");
    }
}

pub(super) fn spawn_state_writer(
    config: Arc<Config>,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let path = state_file_path(&config);
        if let Some(parent) = path.parent()
            && let Err(error) = tokio::fs::create_dir_all(parent).await
        {
            tracing::warn!(%error, "failed to create state file directory");
        }

        let mut interval = tokio::time::interval(Duration::from_secs(super::STATUS_FLUSH_SECONDS));
        loop {
            tokio::select! {
                () = shutdown.cancelled() => break,
                _ = interval.tick() => write_state(&path).await,
            }
        }
        // final flush so `status` shows the shutdown
        write_state(&path).await;
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn test_config(tmp: &TempDir) -> Config {
        Config {
            workspace_dir: tmp.path().join("workspace"),
            config_path: tmp.path().join("config.toml"),
            ..Config::default()
        }
    }

    #[test]
    fn state_file_path_uses_config_directory() {
        let tmp = TempDir::new().unwrap();
        let config = test_config(&tmp);

        let path = state_file_path(&config);
        assert_eq!(path, tmp.path().join("daemon_state.json"));
    }

    #[tokio::test]
    async fn writer_flushes_snapshot_on_shutdown() {
        let tmp = TempDir::new().unwrap();
        let config = Arc::new(test_config(&tmp));
        health::mark_component_ok("state-writer-test");

        let shutdown = CancellationToken::new();
        let handle = spawn_state_writer(Arc::clone(&config), shutdown.clone());
        shutdown.cancel();
        handle.await.unwrap();

        let raw = std::fs::read_to_string(state_file_path(&config)).unwrap();
        let status: DaemonStatus = serde_json::from_str(&raw).unwrap();
        assert_eq!(status.snapshot.pid, std::process::id());
        assert!(status.snapshot.components.contains_key("state-writer-test"));
    }
}
