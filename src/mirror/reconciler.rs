use super::formatter::embed_from_incident;
use crate::config::Config;
use crate::diagnostics::health;
use crate::error::{MirrorError, Result};
use crate::feed::{Incident, IncidentFeed, StatusPageClient};
use crate::platform::scheduler::JobHandler;
use crate::store::{IncidentRecord, IncidentStore};
use crate::webhook::{DiscordWebhookClient, MessageSink};
use async_trait::async_trait;
use chrono::Utc;
use std::fmt;
use std::sync::Arc;

const COMPONENT: &str = "reconciler";

/// Outcome counts of one reconciliation cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CheckReport {
    pub created: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub failed: usize,
}

impl fmt::Display for CheckReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} created, {} updated, {} unchanged, {} failed",
            self.created, self.updated, self.unchanged, self.failed
        )
    }
}

enum Outcome {
    Created,
    Updated,
    Unchanged,
}

/// Brings the channel in line with the feed: one message per incident,
/// edited whenever the incident changes.
pub struct Reconciler {
    feed: Arc<dyn IncidentFeed>,
    sink: Arc<dyn MessageSink>,
    store: Arc<dyn IncidentStore>,
}

impl Reconciler {
    pub fn new(
        feed: Arc<dyn IncidentFeed>,
        sink: Arc<dyn MessageSink>,
        store: Arc<dyn IncidentStore>,
    ) -> Self {
        Self { feed, sink, store }
    }

    /// Wires the status-page client and webhook from config. Fails when the
    /// webhook credentials are missing.
    pub fn from_config(config: &Config, store: Arc<dyn IncidentStore>) -> Result<Self> {
        let feed = StatusPageClient::from_config(&config.feed)?;
        let sink = DiscordWebhookClient::from_config(config)?;
        Ok(Self::new(Arc::new(feed), Arc::new(sink), store))
    }

    /// Runs one cycle. Only a feed failure is returned as an error; a failure
    /// on a single incident is logged, counted, and leaves its record as is.
    pub async fn check(&self) -> Result<CheckReport> {
        tracing::info!("heartbeat");

        let incidents = match self.feed.fetch_incidents().await {
            Ok(incidents) => incidents,
            Err(error) => {
                health::mark_component_error(COMPONENT, error.to_string());
                tracing::error!(error = %error, "failed to fetch incidents");
                return Err(error.into());
            }
        };

        let mut report = CheckReport::default();
        for incident in incidents.iter().rev() {
            match self.reconcile(incident).await {
                Ok(Outcome::Created) => report.created += 1,
                Ok(Outcome::Updated) => report.updated += 1,
                Ok(Outcome::Unchanged) => report.unchanged += 1,
                Err(error) => {
                    tracing::error!(incident_id = %incident.id, error = %error, "failed to mirror incident");
                    report.failed += 1;
                }
            }
        }

        health::record_run(COMPONENT, &report, report.failed);
        Ok(report)
    }

    async fn reconcile(&self, incident: &Incident) -> std::result::Result<Outcome, MirrorError> {
        let Some(record) = self.store.get(&incident.id).await? else {
            let message_id = self.sink.send(&embed_from_incident(incident)).await?;
            tracing::info!(incident_id = %incident.id, %message_id, "posted incident");
            self.store
                .set(&IncidentRecord {
                    incident_id: incident.id.clone(),
                    message_id,
                    last_update: Utc::now(),
                    resolved: incident.is_resolved(),
                })
                .await?;
            return Ok(Outcome::Created);
        };

        let newer = incident
            .effective_update_time()
            .is_some_and(|remote| remote > record.last_update);
        if !newer {
            return Ok(Outcome::Unchanged);
        }

        self.sink
            .edit(&record.message_id, &embed_from_incident(incident))
            .await?;
        tracing::info!(
            incident_id = %incident.id,
            message_id = %record.message_id,
            status = %incident.status,
            "updated incident"
        );
        self.store
            .set(&IncidentRecord {
                last_update: Utc::now(),
                resolved: incident.is_resolved(),
                ..record
            })
            .await?;
        Ok(Outcome::Updated)
    }
}

#[async_trait]
impl JobHandler for Reconciler {
    async fn run(&self) -> anyhow::Result<String> {
        Ok(self.check().await?.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{FeedError, WebhookError};
    use crate::feed::{Impact, IncidentStatus, IncidentUpdate};
    use crate::mirror::formatter::{COLOR_GREEN, COLOR_RED};
    use crate::store::SqliteIncidentStore;
    use crate::webhook::Embed;
    use chrono::{DateTime, Duration};
    use std::sync::Mutex;
    use tempfile::TempDir;

    #[derive(Default)]
    struct FakeFeed {
        incidents: Mutex<Vec<Incident>>,
        down: Mutex<bool>,
    }

    impl FakeFeed {
        fn publish(&self, incidents: Vec<Incident>) {
            *self.incidents.lock().unwrap() = incidents;
        }
    }

    #[async_trait]
    impl IncidentFeed for FakeFeed {
        async fn fetch_incidents(&self) -> std::result::Result<Vec<Incident>, FeedError> {
            if *self.down.lock().unwrap() {
                return Err(FeedError::Status {
                    url: "https://status.test/api/v2/incidents.json".into(),
                    status: 503,
                    body: "unavailable".into(),
                });
            }
            Ok(self.incidents.lock().unwrap().clone())
        }
    }

    #[derive(Debug, Clone, PartialEq)]
    enum Call {
        Send { title: String, color: Option<u32> },
        Edit { message_id: String, color: Option<u32> },
    }

    #[derive(Default)]
    struct RecordingSink {
        calls: Mutex<Vec<Call>>,
        reject_titles: Mutex<Vec<String>>,
    }

    impl RecordingSink {
        fn calls(&self) -> Vec<Call> {
            self.calls.lock().unwrap().clone()
        }

        fn rejects(&self, embed: &Embed) -> bool {
            let title = embed.title.clone().unwrap_or_default();
            self.reject_titles.lock().unwrap().contains(&title)
        }
    }

    #[async_trait]
    impl MessageSink for RecordingSink {
        async fn send(&self, embed: &Embed) -> std::result::Result<String, WebhookError> {
            if self.rejects(embed) {
                return Err(WebhookError::Status {
                    method: "POST".into(),
                    route: "/webhooks/1/[token]".into(),
                    status: 400,
                    body: "bad embed".into(),
                });
            }
            let mut calls = self.calls.lock().unwrap();
            calls.push(Call::Send {
                title: embed.title.clone().unwrap_or_default(),
                color: embed.color,
            });
            Ok(format!("msg-{}", calls.len()))
        }

        async fn edit(
            &self,
            message_id: &str,
            embed: &Embed,
        ) -> std::result::Result<String, WebhookError> {
            if self.rejects(embed) {
                return Err(WebhookError::Status {
                    method: "PATCH".into(),
                    route: format!("/webhooks/1/[token]/messages/{message_id}"),
                    status: 404,
                    body: "Unknown Message".into(),
                });
            }
            self.calls.lock().unwrap().push(Call::Edit {
                message_id: message_id.into(),
                color: embed.color,
            });
            Ok(message_id.into())
        }
    }

    struct Harness {
        _tmp: TempDir,
        feed: Arc<FakeFeed>,
        sink: Arc<RecordingSink>,
        store: Arc<SqliteIncidentStore>,
        reconciler: Reconciler,
    }

    async fn harness() -> Harness {
        let tmp = TempDir::new().unwrap();
        let store = Arc::new(
            SqliteIncidentStore::open(&tmp.path().join("incidents.db"))
                .await
                .unwrap(),
        );
        let feed = Arc::new(FakeFeed::default());
        let sink = Arc::new(RecordingSink::default());
        let reconciler = Reconciler::new(feed.clone(), sink.clone(), store.clone());
        Harness {
            _tmp: tmp,
            feed,
            sink,
            store,
            reconciler,
        }
    }

    fn incident(id: &str, status: IncidentStatus, updated_at: DateTime<Utc>) -> Incident {
        Incident {
            id: id.into(),
            name: format!("Incident {id}"),
            shortlink: None,
            impact: Impact::Critical,
            status,
            started_at: Some("2024-03-01T18:00:00Z".into()),
            created_at: "2024-03-01T18:00:00Z".into(),
            updated_at: Some(updated_at.to_rfc3339()),
            components: vec![],
            incident_updates: vec![IncidentUpdate {
                status: status.to_string(),
                body: "Details.".into(),
                created_at: "2024-03-01T18:00:00Z".into(),
            }],
        }
    }

    fn past() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2024-03-01T18:05:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    #[tokio::test]
    async fn new_incidents_are_sent_once_and_recorded() {
        let h = harness().await;
        h.feed.publish(vec![
            incident("newest", IncidentStatus::Investigating, past()),
            incident("oldest", IncidentStatus::Investigating, past()),
        ]);

        let report = h.reconciler.check().await.unwrap();
        assert_eq!(report.created, 2);

        let titles: Vec<_> = h
            .sink
            .calls()
            .into_iter()
            .map(|call| match call {
                Call::Send { title, .. } => title,
                Call::Edit { .. } => panic!("unexpected edit"),
            })
            .collect();
        assert_eq!(titles, ["Incident oldest", "Incident newest"]);

        let oldest = h.store.get("oldest").await.unwrap().unwrap();
        assert_eq!(oldest.message_id, "msg-1");
        assert!(!oldest.resolved);
        assert_eq!(h.store.get("newest").await.unwrap().unwrap().message_id, "msg-2");
    }

    #[tokio::test]
    async fn second_run_without_changes_is_a_no_op() {
        let h = harness().await;
        h.feed
            .publish(vec![incident("a", IncidentStatus::Identified, past())]);

        h.reconciler.check().await.unwrap();
        let before = h.store.fetch_all().await.unwrap();

        let report = h.reconciler.check().await.unwrap();
        assert_eq!(report, CheckReport {
            unchanged: 1,
            ..CheckReport::default()
        });
        assert_eq!(h.sink.calls().len(), 1);
        assert_eq!(h.store.fetch_all().await.unwrap(), before);
    }

    #[tokio::test]
    async fn newer_update_edits_stored_message() {
        let h = harness().await;
        h.feed
            .publish(vec![incident("a", IncidentStatus::Investigating, past())]);
        h.reconciler.check().await.unwrap();
        let first = h.store.get("a").await.unwrap().unwrap();

        let later = Utc::now() + Duration::hours(1);
        h.feed
            .publish(vec![incident("a", IncidentStatus::Resolved, later)]);
        let report = h.reconciler.check().await.unwrap();
        assert_eq!(report.updated, 1);

        assert_eq!(h.sink.calls(), [
            Call::Send {
                title: "Incident a".into(),
                color: Some(COLOR_RED),
            },
            Call::Edit {
                message_id: first.message_id.clone(),
                color: Some(COLOR_GREEN),
            },
        ]);

        let stored = h.store.get("a").await.unwrap().unwrap();
        assert_eq!(stored.message_id, first.message_id);
        assert!(stored.resolved);
        assert!(stored.last_update >= first.last_update);
    }

    #[tokio::test]
    async fn equal_or_older_update_time_is_ignored() {
        let h = harness().await;
        h.store
            .set(&IncidentRecord {
                incident_id: "a".into(),
                message_id: "m-a".into(),
                last_update: past(),
                resolved: false,
            })
            .await
            .unwrap();

        h.feed
            .publish(vec![incident("a", IncidentStatus::Monitoring, past())]);
        let report = h.reconciler.check().await.unwrap();

        assert_eq!(report.unchanged, 1);
        assert!(h.sink.calls().is_empty());
    }

    #[tokio::test]
    async fn unparseable_update_time_counts_as_not_newer() {
        let h = harness().await;
        h.store
            .set(&IncidentRecord {
                incident_id: "a".into(),
                message_id: "m-a".into(),
                last_update: past(),
                resolved: false,
            })
            .await
            .unwrap();

        let mut broken = incident("a", IncidentStatus::Monitoring, past());
        broken.updated_at = Some("not a date".into());
        h.feed.publish(vec![broken]);

        assert_eq!(h.reconciler.check().await.unwrap().unchanged, 1);
        assert!(h.sink.calls().is_empty());
    }

    #[tokio::test]
    async fn minute_precision_update_time_triggers_edit() {
        let h = harness().await;
        h.store
            .set(&IncidentRecord {
                incident_id: "a".into(),
                message_id: "m-a".into(),
                last_update: past(),
                resolved: false,
            })
            .await
            .unwrap();

        let mut coarse = incident("a", IncidentStatus::Monitoring, past());
        coarse.updated_at = Some("2099-01-01T09:30".into());
        h.feed.publish(vec![coarse]);

        assert_eq!(h.reconciler.check().await.unwrap().updated, 1);
        assert!(matches!(&h.sink.calls()[..], [Call::Edit { message_id, .. }] if message_id == "m-a"));
    }

    #[tokio::test]
    async fn feed_failure_aborts_cycle() {
        let h = harness().await;
        *h.feed.down.lock().unwrap() = true;

        let err = h.reconciler.check().await.unwrap_err();
        assert!(matches!(err, MirrorError::Feed(_)));
        assert!(h.sink.calls().is_empty());
    }

    #[tokio::test]
    async fn failed_edit_leaves_record_and_continues() {
        let h = harness().await;
        let stale = IncidentRecord {
            incident_id: "a".into(),
            message_id: "deleted-message".into(),
            last_update: past(),
            resolved: false,
        };
        h.store.set(&stale).await.unwrap();
        h.sink
            .reject_titles
            .lock()
            .unwrap()
            .push("Incident a".into());

        let later = Utc::now() + Duration::hours(1);
        h.feed.publish(vec![
            incident("b", IncidentStatus::Investigating, past()),
            incident("a", IncidentStatus::Resolved, later),
        ]);

        let report = h.reconciler.check().await.unwrap();
        assert_eq!(report.failed, 1);
        assert_eq!(report.created, 1);
        assert_eq!(h.store.get("a").await.unwrap().unwrap(), stale);
        assert!(h.store.get("b").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn failed_send_creates_no_record() {
        let h = harness().await;
        h.sink
            .reject_titles
            .lock()
            .unwrap()
            .push("Incident a".into());
        h.feed
            .publish(vec![incident("a", IncidentStatus::Investigating, past())]);

        assert_eq!(h.reconciler.check().await.unwrap().failed, 1);
        assert!(h.store.get("a").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn job_output_is_the_report() {
        let h = harness().await;
        h.feed
            .publish(vec![incident("a", IncidentStatus::Resolved, past())]);

        let output = h.reconciler.run().await.unwrap();
        assert_eq!(output, "1 created, 0 updated, 0 unchanged, 0 failed");
        assert!(h.store.get("a").await.unwrap().unwrap().resolved);
    }
}
