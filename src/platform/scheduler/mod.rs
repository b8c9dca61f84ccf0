//! Persistent periodic jobs.
//!
//! Job definitions live in SQLite so their timers survive restarts; the
//! handlers that run them are registered in-process under the job's name.

mod expression;
mod repository;
mod runner;
mod types;

pub use expression::validate_schedule;
pub use repository::JobStore;
pub use runner::{JobHandler, Scheduler};
pub use types::{JobDefinition, JobStatus};

/// Reconciles the feed against the channel.
pub const CHECK_JOB: &str = "check update";
/// Copies the local mapping into the archive.
pub const ARCHIVE_JOB: &str = "archive incidents";
