//! Outbound chat delivery through a Discord webhook.

pub mod client;
pub mod embed;

pub use client::DiscordWebhookClient;
pub use embed::{Embed, EmbedField, EmbedFooter};

use crate::error::WebhookError;
use async_trait::async_trait;

/// Destination for rendered incident embeds.
#[async_trait]
pub trait MessageSink: Send + Sync {
    /// Posts a new message and returns its id.
    async fn send(&self, embed: &Embed) -> Result<String, WebhookError>;

    /// Replaces the embed of an existing message and returns its id.
    async fn edit(&self, message_id: &str, embed: &Embed) -> Result<String, WebhookError>;
}
