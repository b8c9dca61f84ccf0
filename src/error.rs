use thiserror::Error;

// ─── Top-level error hierarchy ───────────────────────────────────────────────

/// Structured error hierarchy for `incident-mirror`.
///
/// Each subsystem defines its own error variant. The reconciler and archiver
/// match on these to decide whether a failure aborts a whole cycle or a
/// single entry; application glue continues to use `anyhow::Result` for
/// ad-hoc context chains.
#[derive(Debug, Error)]
pub enum MirrorError {
    // ── Config ───────────────────────────────────────────────────────────
    #[error("config: {0}")]
    Config(#[from] ConfigError),

    // ── Status-page feed ────────────────────────────────────────────────
    #[error("feed: {0}")]
    Feed(#[from] FeedError),

    // ── Chat webhook ────────────────────────────────────────────────────
    #[error("webhook: {0}")]
    Webhook(#[from] WebhookError),

    // ── Local store / archive ───────────────────────────────────────────
    #[error("store: {0}")]
    Store(#[from] StoreError),

    // ── Scheduler ───────────────────────────────────────────────────────
    #[error("scheduler: {0}")]
    Scheduler(#[from] SchedulerError),
}

// ─── Config errors ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load config: {0}")]
    Load(String),

    #[error("failed to save config: {0}")]
    Save(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("missing setting {name} (set {env} or edit config.toml)")]
    Missing { name: &'static str, env: &'static str },

    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

// ─── Feed errors ─────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("request to {url} failed: {message}")]
    Request { url: String, message: String },

    #[error("{url} returned {status}: {body}")]
    Status {
        url: String,
        status: u16,
        body: String,
    },

    #[error("failed to decode incident list: {0}")]
    Decode(String),
}

// ─── Webhook errors ──────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum WebhookError {
    #[error("{method} {route} failed: {message}")]
    Request {
        method: String,
        route: String,
        message: String,
    },

    #[error("{method} {route} failed ({status}): {body}")]
    Status {
        method: String,
        route: String,
        status: u16,
        body: String,
    },

    #[error("{method} {route} exceeded rate limit after {retries} retries")]
    RateLimited {
        method: String,
        route: String,
        retries: u8,
    },

    #[error("response carried no message id")]
    MissingMessageId,
}

// ─── Store errors ────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to open {what}: {message}")]
    Open { what: String, message: String },

    #[error("query failed: {0}")]
    Query(String),

    #[error("corrupt row for {key}: {message}")]
    Corrupt { key: String, message: String },
}

impl From<sqlx::Error> for StoreError {
    fn from(error: sqlx::Error) -> Self {
        Self::Query(error.to_string())
    }
}

// ─── Scheduler errors ────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("invalid schedule {expression:?}: {reason}")]
    InvalidSchedule { expression: String, reason: String },

    #[error("job store: {0}")]
    Store(#[from] StoreError),
}

// ─── Convenience re-exports ─────────────────────────────────────────────────

/// Shorthand result type for the crate.
pub type Result<T> = std::result::Result<T, MirrorError>;
