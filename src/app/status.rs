use incident_mirror::Config;
use incident_mirror::platform::daemon::DaemonStatus;
use incident_mirror::platform::scheduler::JobDefinition;
use incident_mirror::store::IncidentRecord;

fn configured(present: bool) -> &'static str {
    if present { "configured" } else { "missing" }
}

pub fn render_status(config: &Config, daemon: Option<&DaemonStatus>) -> String {
    let mut lines = vec![
        "◆ incident-mirror status".to_string(),
        String::new(),
        format!("Version     {}", env!("CARGO_PKG_VERSION")),
        format!("Workspace   {}", config.workspace_dir.display()),
        format!("Config      {}", config.config_path.display()),
        String::new(),
        format!("  Feed      {}", config.feed.api_base),
        format!(
            "  Webhook   {}",
            configured(config.require_webhook().is_ok())
        ),
        format!(
            "  Archive   {} (collection {})",
            configured(config.require_archive_url().is_ok()),
            config.archive.database
        ),
        format!("  Check     every {}", config.scheduler.check_schedule),
        format!("  Archive   every {}", config.scheduler.archive_schedule),
        String::new(),
    ];

    match daemon {
        None => lines.push("Daemon      no state file (not running?)".into()),
        Some(status) => {
            lines.push(format!(
                "Daemon      pid {} written {} (up {}s)",
                status.snapshot.pid, status.written_at, status.snapshot.uptime_seconds
            ));
            for (name, component) in &status.snapshot.components {
                let mut line = format!(
                    "  {name:<11} {} (runs: {}, restarts: {})",
                    component.state, component.runs, component.restart_count
                );
                if let Some(error) = &component.last_error {
                    line.push_str(&format!(" - {error}"));
                }
                lines.push(line);
                if let (Some(at), Some(summary)) =
                    (&component.last_run_at, &component.last_summary)
                {
                    lines.push(format!("              last run {at}: {summary}"));
                }
            }
        }
    }

    lines.join("\n")
}

pub fn render_incidents(records: &[IncidentRecord]) -> String {
    if records.is_empty() {
        return "No incidents tracked yet.".into();
    }
    records
        .iter()
        .map(|record| {
            format!(
                "{}  message={}  last_update={}  {}",
                record.incident_id,
                record.message_id,
                record.last_update.to_rfc3339(),
                if record.resolved { "resolved" } else { "open" }
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn render_jobs(jobs: &[JobDefinition]) -> String {
    if jobs.is_empty() {
        return "No jobs scheduled. Start the daemon with `incident-mirror run`.".into();
    }
    jobs.iter()
        .map(|job| {
            let last = match (job.last_run, job.last_status) {
                (Some(at), Some(status)) => format!("{at} ({status:?})"),
                (Some(at), None) => at.to_string(),
                _ => "never".into(),
            };
            format!(
                "{:<18} every {:<10} priority={:<3} next={}  last={last}",
                job.name, job.schedule, job.priority, job.next_run
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use incident_mirror::platform::scheduler::JobStatus;

    #[test]
    fn status_reports_missing_credentials() {
        let out = render_status(&Config::default(), None);
        assert!(out.contains("Webhook   missing"));
        assert!(out.contains("no state file"));
    }

    #[test]
    fn status_shows_last_run_summary() {
        let status: DaemonStatus = serde_json::from_value(serde_json::json!({
            "pid": 4242,
            "uptime_seconds": 60,
            "written_at": "2024-03-01T18:01:00+00:00",
            "components": {
                "reconciler": {
                    "state": "ok",
                    "updated_at": "2024-03-01T18:00:00+00:00",
                    "runs": 3,
                    "last_run_at": "2024-03-01T18:00:00+00:00",
                    "last_summary": "1 created, 0 updated, 4 unchanged, 0 failed"
                }
            }
        }))
        .unwrap();

        let out = render_status(&Config::default(), Some(&status));
        assert!(out.contains("pid 4242"));
        assert!(out.contains("reconciler  ok (runs: 3, restarts: 0)"));
        assert!(out.contains(
            "last run 2024-03-01T18:00:00+00:00: 1 created, 0 updated, 4 unchanged, 0 failed"
        ));
    }

    #[test]
    fn incidents_listing() {
        assert_eq!(render_incidents(&[]), "No incidents tracked yet.");

        let out = render_incidents(&[IncidentRecord {
            incident_id: "inc-1".into(),
            message_id: "m-1".into(),
            last_update: Utc.with_ymd_and_hms(2024, 3, 1, 18, 0, 0).unwrap(),
            resolved: true,
        }]);
        assert_eq!(
            out,
            "inc-1  message=m-1  last_update=2024-03-01T18:00:00+00:00  resolved"
        );
    }

    #[test]
    fn jobs_listing_shows_last_status() {
        let at = Utc.with_ymd_and_hms(2024, 3, 1, 18, 0, 0).unwrap();
        let out = render_jobs(&[JobDefinition {
            name: "check update".into(),
            schedule: "5 minutes".into(),
            priority: 10,
            next_run: at,
            last_run: Some(at),
            last_status: Some(JobStatus::Error),
        }]);
        assert!(out.starts_with("check update"));
        assert!(out.contains("(Error)"));
    }
}
