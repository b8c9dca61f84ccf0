use crate::error::ConfigError;
use directories::UserDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

// ── Top-level config ──────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Workspace directory - computed from home, not serialized
    #[serde(skip)]
    pub workspace_dir: PathBuf,
    /// Path to config.toml - computed from home, not serialized
    #[serde(skip)]
    pub config_path: PathBuf,

    #[serde(default)]
    pub feed: FeedConfig,

    #[serde(default)]
    pub webhook: WebhookConfig,

    #[serde(default)]
    pub archive: ArchiveConfig,

    #[serde(default)]
    pub scheduler: SchedulerConfig,

    #[serde(default)]
    pub reliability: ReliabilityConfig,
}

// ── Status-page feed ─────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedConfig {
    /// Status page API root; `/incidents.json` is appended
    #[serde(default = "default_feed_api_base")]
    pub api_base: String,
    /// Per-request timeout in seconds
    #[serde(default = "default_feed_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_feed_api_base() -> String {
    "https://discordstatus.com/api/v2".into()
}

fn default_feed_timeout_secs() -> u64 {
    30
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            api_base: default_feed_api_base(),
            timeout_secs: default_feed_timeout_secs(),
        }
    }
}

// ── Discord webhook ──────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookConfig {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default = "default_discord_api_base")]
    pub api_base: String,
}

fn default_discord_api_base() -> String {
    "https://discord.com/api/v10".into()
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            id: None,
            token: None,
            api_base: default_discord_api_base(),
        }
    }
}

// ── Durable archive ──────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchiveConfig {
    /// Connection URL of the archive database
    #[serde(default)]
    pub url: Option<String>,
    /// Collection the archived incidents live in
    #[serde(default = "default_archive_database")]
    pub database: String,
    /// Pause before each archived entry, in milliseconds
    #[serde(default = "default_archive_entry_delay_ms")]
    pub entry_delay_ms: u64,
}

fn default_archive_database() -> String {
    "incidents".into()
}

fn default_archive_entry_delay_ms() -> u64 {
    500
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            url: None,
            database: default_archive_database(),
            entry_delay_ms: default_archive_entry_delay_ms(),
        }
    }
}

// ── Scheduler ────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default = "default_scheduler_poll_secs")]
    pub poll_secs: u64,
    #[serde(default = "default_check_schedule")]
    pub check_schedule: String,
    #[serde(default = "default_archive_schedule")]
    pub archive_schedule: String,
}

fn default_scheduler_poll_secs() -> u64 {
    5
}

fn default_check_schedule() -> String {
    "5 minutes".into()
}

fn default_archive_schedule() -> String {
    "1 day".into()
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            poll_secs: default_scheduler_poll_secs(),
            check_schedule: default_check_schedule(),
            archive_schedule: default_archive_schedule(),
        }
    }
}

// ── Reliability (component supervisor) ──────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReliabilityConfig {
    #[serde(default = "default_initial_backoff_secs")]
    pub initial_backoff_secs: u64,
    #[serde(default = "default_max_backoff_secs")]
    pub max_backoff_secs: u64,
    /// 0 disables the restart cap
    #[serde(default = "default_max_restarts")]
    pub max_restarts: u32,
}

fn default_initial_backoff_secs() -> u64 {
    2
}

fn default_max_backoff_secs() -> u64 {
    60
}

fn default_max_restarts() -> u32 {
    10
}

impl Default for ReliabilityConfig {
    fn default() -> Self {
        Self {
            initial_backoff_secs: default_initial_backoff_secs(),
            max_backoff_secs: default_max_backoff_secs(),
            max_restarts: default_max_restarts(),
        }
    }
}

// ── Loading ──────────────────────────────────────────────────────

const WEBHOOK_ID_ENV: &[&str] = &["INCIDENT_MIRROR_WEBHOOK_ID", "DISCORD_WEBHOOK_ID"];
const WEBHOOK_TOKEN_ENV: &[&str] = &["INCIDENT_MIRROR_WEBHOOK_TOKEN", "DISCORD_WEBHOOK_TOKEN"];
const ARCHIVE_URL_ENV: &[&str] = &["INCIDENT_MIRROR_ARCHIVE_URL", "ARCHIVE_URL"];
const FEED_URL_ENV: &[&str] = &["INCIDENT_MIRROR_FEED_URL"];
const WORKSPACE_ENV: &[&str] = &["INCIDENT_MIRROR_WORKSPACE"];

impl Config {
    pub fn load_or_init() -> Result<Self, ConfigError> {
        let home = UserDirs::new()
            .map(|u| u.home_dir().to_path_buf())
            .ok_or_else(|| ConfigError::Load("could not find home directory".into()))?;
        Self::load_or_init_in(&home.join(".incident-mirror"))
    }

    pub fn load_or_init_in(root: &Path) -> Result<Self, ConfigError> {
        let config_path = root.join("config.toml");

        fs::create_dir_all(root.join("workspace"))?;

        let mut config = if config_path.exists() {
            let contents = fs::read_to_string(&config_path)?;
            let mut config: Config = toml::from_str(&contents).map_err(|error| {
                ConfigError::Load(format!("{}: {error}", config_path.display()))
            })?;
            config.config_path.clone_from(&config_path);
            config
        } else {
            let config = Self {
                config_path: config_path.clone(),
                ..Self::default()
            };
            config.save()?;
            config
        };
        config.workspace_dir = root.join("workspace");

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    /// Applies overrides from `lookup`; empty values are ignored.
    pub fn apply_overrides_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let first = |keys: &[&str]| {
            keys.iter()
                .find_map(|key| lookup(key).filter(|value| !value.is_empty()))
        };

        if let Some(id) = first(WEBHOOK_ID_ENV) {
            self.webhook.id = Some(id);
        }
        if let Some(token) = first(WEBHOOK_TOKEN_ENV) {
            self.webhook.token = Some(token);
        }
        if let Some(url) = first(ARCHIVE_URL_ENV) {
            self.archive.url = Some(url);
        }
        if let Some(url) = first(FEED_URL_ENV) {
            self.feed.api_base = url;
        }
        if let Some(workspace) = first(WORKSPACE_ENV) {
            self.workspace_dir = PathBuf::from(workspace);
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_http_url("feed.api_base", &self.feed.api_base)?;
        validate_http_url("webhook.api_base", &self.webhook.api_base)?;

        if !crate::store::archive::is_valid_collection_name(&self.archive.database) {
            return Err(ConfigError::Validation(format!(
                "archive.database must be a plain identifier, got {:?}",
                self.archive.database
            )));
        }

        for (name, expression) in [
            ("scheduler.check_schedule", &self.scheduler.check_schedule),
            ("scheduler.archive_schedule", &self.scheduler.archive_schedule),
        ] {
            crate::platform::scheduler::validate_schedule(expression)
                .map_err(|error| ConfigError::Validation(format!("{name}: {error}")))?;
        }

        Ok(())
    }

    /// Webhook id and token, required by anything that posts messages.
    pub fn require_webhook(&self) -> Result<(&str, &str), ConfigError> {
        let id = self
            .webhook
            .id
            .as_deref()
            .filter(|id| !id.is_empty())
            .ok_or(ConfigError::Missing {
                name: "webhook.id",
                env: WEBHOOK_ID_ENV[0],
            })?;
        let token = self
            .webhook
            .token
            .as_deref()
            .filter(|token| !token.is_empty())
            .ok_or(ConfigError::Missing {
                name: "webhook.token",
                env: WEBHOOK_TOKEN_ENV[0],
            })?;
        Ok((id, token))
    }

    pub fn require_archive_url(&self) -> Result<&str, ConfigError> {
        self.archive
            .url
            .as_deref()
            .filter(|url| !url.is_empty())
            .ok_or(ConfigError::Missing {
                name: "archive.url",
                env: ARCHIVE_URL_ENV[0],
            })
    }

    pub fn incidents_db_path(&self) -> PathBuf {
        self.workspace_dir.join("state").join("incidents.db")
    }

    pub fn jobs_db_path(&self) -> PathBuf {
        self.workspace_dir.join("scheduler").join("jobs.db")
    }

    pub fn save(&self) -> Result<(), ConfigError> {
        let toml_str =
            toml::to_string_pretty(self).map_err(|error| ConfigError::Save(error.to_string()))?;
        if let Some(parent) = self.config_path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.config_path, toml_str)?;
        Ok(())
    }
}

fn validate_http_url(name: &str, raw: &str) -> Result<(), ConfigError> {
    let parsed = url::Url::parse(raw)
        .map_err(|error| ConfigError::Validation(format!("{name}: {error}")))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(ConfigError::Validation(format!(
            "{name}: unsupported scheme {}",
            parsed.scheme()
        )));
    }
    Ok(())
}
