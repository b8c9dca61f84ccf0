pub mod schema;

pub use schema::{
    ArchiveConfig, Config, FeedConfig, ReliabilityConfig, SchedulerConfig, WebhookConfig,
};
