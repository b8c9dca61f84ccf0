//! Status page API v2 incident models.

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Offset applied to feed timestamps that carry no offset of their own.
const FEED_DEFAULT_OFFSET_SECS: i32 = 7 * 3600;

/// Body of `GET /incidents.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusPageResult {
    #[serde(default)]
    pub incidents: Vec<Incident>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Impact {
    None,
    Minor,
    Major,
    Critical,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum IncidentStatus {
    Investigating,
    Identified,
    Monitoring,
    Resolved,
    Postmortem,
    Scheduled,
    InProgress,
    Verifying,
    Completed,
    #[serde(other)]
    Unknown,
}

impl IncidentStatus {
    /// Resolved and postmortem incidents are done; they render green and
    /// mark the local record resolved.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Resolved | Self::Postmortem)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Component {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncidentUpdate {
    /// Free-form status label, e.g. `investigating`
    pub status: String,
    #[serde(default)]
    pub body: String,
    pub created_at: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Incident {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub shortlink: Option<String>,
    pub impact: Impact,
    pub status: IncidentStatus,
    #[serde(default)]
    pub started_at: Option<String>,
    pub created_at: String,
    #[serde(default)]
    pub updated_at: Option<String>,
    #[serde(default)]
    pub components: Vec<Component>,
    /// Newest first, as served by the status page
    #[serde(default)]
    pub incident_updates: Vec<IncidentUpdate>,
}

impl Incident {
    /// When the incident last changed: `updated_at`, else `created_at`.
    ///
    /// `None` when the timestamp cannot be parsed; callers treat that as
    /// "nothing newer to report".
    pub fn effective_update_time(&self) -> Option<DateTime<Utc>> {
        let raw = self.updated_at.as_deref().unwrap_or(&self.created_at);
        parse_feed_timestamp(raw)
    }

    /// Moment the embed is stamped with.
    pub fn started_time(&self) -> Option<DateTime<Utc>> {
        self.started_at
            .as_deref()
            .and_then(parse_feed_timestamp)
            .or_else(|| parse_feed_timestamp(&self.created_at))
    }

    pub fn is_resolved(&self) -> bool {
        self.status.is_terminal()
    }
}

/// Offset-less layouts, most precise first.
const NAIVE_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M"];

/// Parses an ISO 8601 feed timestamp: full RFC 3339, minute precision
/// (`2024-03-01T17:00`, with or without an offset) or a bare date.
/// Timestamps without an offset are read in UTC+07:00.
pub fn parse_feed_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }
    if let Some(parsed) = parse_minute_with_offset(raw) {
        return Some(parsed);
    }

    let naive = NAIVE_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .ok()
                .and_then(|date| date.and_hms_opt(0, 0, 0))
        })?;
    FixedOffset::east_opt(FEED_DEFAULT_OFFSET_SECS)?
        .from_local_datetime(&naive)
        .single()
        .map(|local| local.with_timezone(&Utc))
}

/// `2024-03-01T17:00Z` or `2024-03-01T17:00+02:00`.
fn parse_minute_with_offset(raw: &str) -> Option<DateTime<Utc>> {
    let normalized = match raw.strip_suffix(['Z', 'z']) {
        Some(rest) => format!("{rest}+00:00"),
        None => raw.to_string(),
    };
    DateTime::parse_from_str(&normalized, "%Y-%m-%dT%H:%M%:z")
        .ok()
        .map(|parsed| parsed.with_timezone(&Utc))
}
