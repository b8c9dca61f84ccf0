use chrono::{DateTime, Utc};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobDefinition {
    pub name: String,
    pub schedule: String,
    /// Higher runs first when several jobs are due together
    pub priority: i32,
    pub next_run: DateTime<Utc>,
    pub last_run: Option<DateTime<Utc>>,
    pub last_status: Option<JobStatus>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Ok,
    Error,
}

impl JobStatus {
    pub(crate) fn as_db(self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::Error => "error",
        }
    }

    pub(crate) fn from_db(value: &str) -> Self {
        if value.eq_ignore_ascii_case("ok") {
            Self::Ok
        } else {
            Self::Error
        }
    }
}
