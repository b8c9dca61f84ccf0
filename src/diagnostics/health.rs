//! In-process component health, flushed to `daemon_state.json` by the daemon
//! and read back by `incident-mirror status`.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Display;
use std::sync::{OnceLock, RwLock};
use std::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ComponentState {
    Starting,
    Ok,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub state: ComponentState,
    pub updated_at: String,
    #[serde(default)]
    pub last_error: Option<String>,
    /// Completed passes (check cycles, archive runs).
    #[serde(default)]
    pub runs: u64,
    #[serde(default)]
    pub last_run_at: Option<String>,
    /// Outcome counts of the latest pass, e.g. `2 created, 0 updated, ...`
    #[serde(default)]
    pub last_summary: Option<String>,
    #[serde(default)]
    pub restart_count: u64,
}

impl ComponentHealth {
    fn starting(now: String) -> Self {
        Self {
            state: ComponentState::Starting,
            updated_at: now,
            last_error: None,
            runs: 0,
            last_run_at: None,
            last_summary: None,
            restart_count: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthSnapshot {
    pub pid: u32,
    pub uptime_seconds: u64,
    pub components: BTreeMap<String, ComponentHealth>,
}

struct HealthRegistry {
    started_at: Instant,
    components: RwLock<BTreeMap<String, ComponentHealth>>,
}

static REGISTRY: OnceLock<HealthRegistry> = OnceLock::new();

fn registry() -> &'static HealthRegistry {
    REGISTRY.get_or_init(|| HealthRegistry {
        started_at: Instant::now(),
        components: RwLock::new(BTreeMap::new()),
    })
}

fn update(component: &str, apply: impl FnOnce(&mut ComponentHealth, &str)) {
    let Ok(mut map) = registry().components.write() else {
        return;
    };
    let now = Utc::now().to_rfc3339();
    let entry = map
        .entry(component.to_string())
        .or_insert_with(|| ComponentHealth::starting(now.clone()));
    apply(entry, &now);
    entry.updated_at = now;
}

pub fn mark_component_ok(component: &str) {
    update(component, |entry, _| {
        entry.state = ComponentState::Ok;
        entry.last_error = None;
    });
}

#[allow(clippy::needless_pass_by_value)]
pub fn mark_component_error(component: &str, error: impl ToString) {
    let error = error.to_string();
    update(component, move |entry, _| {
        entry.state = ComponentState::Error;
        entry.last_error = Some(error);
    });
}

/// Records a finished pass. `failed` entries turn the component to error
/// while still counting the run.
pub fn record_run(component: &str, summary: &impl Display, failed: usize) {
    let summary = summary.to_string();
    update(component, move |entry, now| {
        entry.runs = entry.runs.saturating_add(1);
        entry.last_run_at = Some(now.to_string());
        if failed == 0 {
            entry.state = ComponentState::Ok;
            entry.last_error = None;
        } else {
            entry.state = ComponentState::Error;
            entry.last_error = Some(format!("{failed} failed in last run"));
        }
        entry.last_summary = Some(summary);
    });
}

pub fn bump_component_restart(component: &str) {
    update(component, |entry, _| {
        entry.restart_count = entry.restart_count.saturating_add(1);
    });
}

pub fn snapshot() -> HealthSnapshot {
    let components = registry()
        .components
        .read()
        .map_or_else(|_| BTreeMap::new(), |map| map.clone());

    HealthSnapshot {
        pid: std::process::id(),
        uptime_seconds: registry().started_at.elapsed().as_secs(),
        components,
    }
}
