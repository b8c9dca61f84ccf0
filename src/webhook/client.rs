use std::{
    collections::HashMap,
    sync::Arc,
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use async_trait::async_trait;
use reqwest::{Method, Response, header::HeaderMap};
use serde::Deserialize;
use serde_json::json;
use tokio::{sync::Mutex, time::sleep};

use super::{Embed, MessageSink};
use crate::config::Config;
use crate::error::{ConfigError, WebhookError};

const MAX_RATE_LIMIT_RETRIES: u8 = 3;
const MAX_RATE_LIMIT_WAIT: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
struct RateLimitBucket {
    remaining: u32,
    reset_at: f64,
}

#[derive(Debug, Deserialize)]
struct WebhookMessage {
    id: String,
}

/// Executes and edits messages through one Discord webhook.
///
/// The webhook token authenticates every call, so it only ever appears in
/// the request URL; logs and errors carry the normalized route instead.
pub struct DiscordWebhookClient {
    client: reqwest::Client,
    api_base: String,
    webhook_id: String,
    token: String,
    buckets: Arc<Mutex<HashMap<String, RateLimitBucket>>>,
    global_reset_at: Arc<Mutex<Option<f64>>>,
    max_wait: Duration,
}

impl DiscordWebhookClient {
    #[must_use]
    pub fn new(api_base: &str, webhook_id: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_base: api_base.trim_end_matches('/').to_string(),
            webhook_id: webhook_id.into(),
            token: token.into(),
            buckets: Arc::new(Mutex::new(HashMap::new())),
            global_reset_at: Arc::new(Mutex::new(None)),
            max_wait: MAX_RATE_LIMIT_WAIT,
        }
    }

    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        let (id, token) = config.require_webhook()?;
        Ok(Self::new(&config.webhook.api_base, id, token))
    }

    fn webhook_url(&self) -> String {
        format!("{}/webhooks/{}/{}", self.api_base, self.webhook_id, self.token)
    }

    pub async fn execute(&self, embed: &Embed) -> Result<String, WebhookError> {
        let url = self.webhook_url();
        let response = self
            .request(
                Method::POST,
                &url,
                &[("wait", "true")],
                json!({ "embeds": [embed] }),
            )
            .await?;
        Self::message_id(response).await
    }

    pub async fn edit_message(
        &self,
        message_id: &str,
        embed: &Embed,
    ) -> Result<String, WebhookError> {
        let url = format!("{}/messages/{message_id}", self.webhook_url());
        let response = self
            .request(Method::PATCH, &url, &[], json!({ "embeds": [embed] }))
            .await?;
        Self::message_id(response).await
    }

    async fn message_id(response: Response) -> Result<String, WebhookError> {
        let message: WebhookMessage = response
            .json()
            .await
            .map_err(|_| WebhookError::MissingMessageId)?;
        if message.id.is_empty() {
            return Err(WebhookError::MissingMessageId);
        }
        Ok(message.id)
    }

    async fn request(
        &self,
        method: Method,
        url: &str,
        query: &[(&str, &str)],
        body: serde_json::Value,
    ) -> Result<Response, WebhookError> {
        let route_key = Self::bucket_key_from_url(url);
        self.wait_for_limits(&route_key).await;

        for attempt in 0..=MAX_RATE_LIMIT_RETRIES {
            let response = self
                .client
                .request(method.clone(), url)
                .query(query)
                .json(&body)
                .send()
                .await
                .map_err(|error| WebhookError::Request {
                    method: method.to_string(),
                    route: route_key.clone(),
                    message: error.without_url().to_string(),
                })?;

            self.update_bucket_from_headers(&route_key, response.headers())
                .await;

            if response.status().as_u16() == 429 {
                if attempt == MAX_RATE_LIMIT_RETRIES {
                    return Err(WebhookError::RateLimited {
                        method: method.to_string(),
                        route: route_key,
                        retries: MAX_RATE_LIMIT_RETRIES,
                    });
                }
                let is_global = Self::is_global_limit(response.headers());
                let retry_after = Self::parse_retry_after(response.headers(), self.max_wait)
                    .unwrap_or_else(|| Duration::from_secs(1).min(self.max_wait));
                tracing::warn!(
                    route = %route_key,
                    retry_after_ms = retry_after.as_millis(),
                    is_global,
                    "webhook rate limited"
                );
                self.handle_429_wait(is_global, retry_after, &route_key)
                    .await;
                continue;
            }

            if !response.status().is_success() {
                let status = response.status().as_u16();
                let body_text = response
                    .text()
                    .await
                    .unwrap_or_else(|error| format!("<failed to read response body: {error}>"));
                return Err(WebhookError::Status {
                    method: method.to_string(),
                    route: route_key,
                    status,
                    body: body_text,
                });
            }

            return Ok(response);
        }

        Err(WebhookError::RateLimited {
            method: method.to_string(),
            route: route_key,
            retries: MAX_RATE_LIMIT_RETRIES,
        })
    }

    fn parse_header_u32(headers: &HeaderMap, name: &str) -> Option<u32> {
        headers
            .get(name)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.parse::<u32>().ok())
    }

    fn parse_header_f64(headers: &HeaderMap, name: &str) -> Option<f64> {
        headers
            .get(name)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.parse::<f64>().ok())
    }

    fn parse_retry_after(headers: &HeaderMap, max_wait: Duration) -> Option<Duration> {
        let seconds = Self::parse_header_f64(headers, "Retry-After")?;
        Self::bounded_wait(seconds, max_wait)
    }

    /// Header-supplied wait, capped at `max_wait`. `None` for NaN or infinity.
    fn bounded_wait(seconds: f64, max_wait: Duration) -> Option<Duration> {
        if !seconds.is_finite() {
            return None;
        }
        if seconds <= 0.0 {
            return Some(Duration::ZERO);
        }
        Some(Duration::try_from_secs_f64(seconds).map_or(max_wait, |wait| wait.min(max_wait)))
    }

    fn is_global_limit(headers: &HeaderMap) -> bool {
        headers
            .get("X-RateLimit-Global")
            .and_then(|value| value.to_str().ok())
            .is_some_and(|value| value.eq_ignore_ascii_case("true"))
    }

    fn now_unix_timestamp() -> f64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs_f64()
    }

    /// Route key for rate-limit buckets: API prefix stripped, snowflakes
    /// replaced by `{id}` and the webhook token by `{token}`.
    fn bucket_key_from_url(url: &str) -> String {
        let path = reqwest::Url::parse(url)
            .map_or_else(|_| url.to_string(), |parsed| parsed.path().to_string());
        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        let start = segments
            .iter()
            .position(|segment| *segment == "webhooks")
            .unwrap_or(0);

        let normalized = segments[start..]
            .iter()
            .enumerate()
            .map(|(idx, segment)| {
                if segments[start] == "webhooks" && idx == 2 {
                    "{token}".to_string()
                } else if segment.chars().all(|character| character.is_ascii_digit()) {
                    "{id}".to_string()
                } else {
                    (*segment).to_string()
                }
            })
            .collect::<Vec<_>>()
            .join("/");

        format!("/{normalized}")
    }

    async fn wait_for_limits(&self, route_key: &str) {
        let now = Self::now_unix_timestamp();
        let global_wait = {
            let global_guard = self.global_reset_at.lock().await;
            global_guard.and_then(|reset_at| (reset_at > now).then_some(reset_at - now))
        };
        if let Some(wait) = global_wait.and_then(|secs| Self::bounded_wait(secs, self.max_wait)) {
            sleep(wait).await;
        }

        let route_wait = {
            let buckets = self.buckets.lock().await;
            buckets.get(route_key).and_then(|bucket| {
                if bucket.remaining == 0 && bucket.reset_at > now {
                    Some(bucket.reset_at - now)
                } else {
                    None
                }
            })
        };
        if let Some(wait) = route_wait.and_then(|secs| Self::bounded_wait(secs, self.max_wait)) {
            tracing::debug!(route = %route_key, wait_ms = wait.as_millis(), "waiting for webhook bucket reset");
            sleep(wait).await;
        }
    }

    async fn handle_429_wait(&self, is_global: bool, retry_after: Duration, route_key: &str) {
        let now = Self::now_unix_timestamp();
        let reset_at = now + retry_after.as_secs_f64();
        if is_global {
            let mut global = self.global_reset_at.lock().await;
            *global = Some(reset_at);
        } else {
            let mut buckets = self.buckets.lock().await;
            buckets.insert(
                route_key.to_string(),
                RateLimitBucket {
                    remaining: 0,
                    reset_at,
                },
            );
        }
        sleep(retry_after).await;
    }

    async fn update_bucket_from_headers(&self, route_key: &str, headers: &HeaderMap) {
        let remaining = Self::parse_header_u32(headers, "X-RateLimit-Remaining");
        let reset_at = Self::parse_header_f64(headers, "X-RateLimit-Reset");

        if let (Some(remaining), Some(reset_at)) = (remaining, reset_at) {
            let mut buckets = self.buckets.lock().await;
            buckets.insert(
                route_key.to_string(),
                RateLimitBucket {
                    remaining,
                    reset_at,
                },
            );
        }
    }
}

#[async_trait]
impl MessageSink for DiscordWebhookClient {
    async fn send(&self, embed: &Embed) -> Result<String, WebhookError> {
        self.execute(embed).await
    }

    async fn edit(&self, message_id: &str, embed: &Embed) -> Result<String, WebhookError> {
        self.edit_message(message_id, embed).await
    }
}
