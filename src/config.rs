//! Configuration module for Agora.

use serde::Deserialize;
use std::path::Path;

use crate::render::ContentParser;
use crate::{AgoraError, Result};

/// Database configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_db_path")]
    pub path: String,
}

fn default_db_path() -> String {
    "data/agora.db".to_string()
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Path to the log file.
    #[serde(default = "default_log_file")]
    pub file: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_file() -> String {
    "logs/agora.log".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: default_log_file(),
        }
    }
}

/// Forum behaviour configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ForumConfig {
    /// Posts shown per thread page, unless a forum overrides it.
    #[serde(default = "default_posts_per_page")]
    pub posts_per_page: i64,
    /// Markup language used for post content.
    #[serde(default)]
    pub content_parser: ContentParser,
    /// New posts start as Awaiting instead of Moderated.
    #[serde(default)]
    pub require_approval: bool,
    /// Timezone used for date-only checks such as suspensions (e.g., "UTC", "Europe/Berlin").
    #[serde(default = "default_timezone")]
    pub timezone: String,
    /// Maximum length for thread titles (in characters).
    #[serde(default = "default_max_title_length")]
    pub max_title_length: usize,
    /// Maximum length for post content (in characters).
    #[serde(default = "default_max_body_length")]
    pub max_body_length: usize,
    /// Words censored in rendered content.
    #[serde(default)]
    pub forbidden_words: Vec<String>,
}

fn default_posts_per_page() -> i64 {
    8
}

fn default_timezone() -> String {
    "UTC".to_string()
}

fn default_max_title_length() -> usize {
    255
}

fn default_max_body_length() -> usize {
    20_000
}

impl Default for ForumConfig {
    fn default() -> Self {
        Self {
            posts_per_page: default_posts_per_page(),
            content_parser: ContentParser::default(),
            require_approval: false,
            timezone: default_timezone(),
            max_title_length: default_max_title_length(),
            max_body_length: default_max_body_length(),
            forbidden_words: Vec::new(),
        }
    }
}

/// Thread subscription notification configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct NotificationConfig {
    /// Enable notifications on new posts.
    #[serde(default = "default_notifications_enabled")]
    pub enabled: bool,
    /// Sender address for notifications.
    #[serde(default = "default_from_address")]
    pub from_address: String,
    /// Base URL used to build links in notifications.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Maximum number of deliveries in flight at once.
    #[serde(default = "default_max_concurrent_deliveries")]
    pub max_concurrent_deliveries: usize,
    /// Also notify the forum's moderators about every new post.
    #[serde(default)]
    pub notify_moderators: bool,
    /// Contact address shown to suspended members.
    #[serde(default)]
    pub admin_email: Option<String>,
}

fn default_notifications_enabled() -> bool {
    true
}

fn default_from_address() -> String {
    "forum@localhost".to_string()
}

fn default_base_url() -> String {
    "http://localhost".to_string()
}

fn default_max_concurrent_deliveries() -> usize {
    4
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            enabled: default_notifications_enabled(),
            from_address: default_from_address(),
            base_url: default_base_url(),
            max_concurrent_deliveries: default_max_concurrent_deliveries(),
            notify_moderators: false,
            admin_email: None,
        }
    }
}

/// Attachment storage configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct AttachmentsConfig {
    /// Path to the attachment storage directory.
    #[serde(default = "default_storage_path")]
    pub storage_path: String,
    /// Maximum attachment size in megabytes.
    #[serde(default = "default_max_size")]
    pub max_size_mb: u64,
}

fn default_storage_path() -> String {
    "data/attachments".to_string()
}

fn default_max_size() -> u64 {
    10
}

impl Default for AttachmentsConfig {
    fn default() -> Self {
        Self {
            storage_path: default_storage_path(),
            max_size_mb: default_max_size(),
        }
    }
}

/// Main configuration structure.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    /// Database configuration.
    #[serde(default)]
    pub database: DatabaseConfig,
    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Forum configuration.
    #[serde(default)]
    pub forum: ForumConfig,
    /// Notification configuration.
    #[serde(default)]
    pub notifications: NotificationConfig,
    /// Attachment configuration.
    #[serde(default)]
    pub attachments: AttachmentsConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(AgoraError::Io)?;
        Self::parse(&content)
    }

    /// Load configuration from a TOML file and apply environment variable overrides.
    pub fn load_with_env<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(s: &str) -> Result<Self> {
        toml::from_str(s).map_err(|e| AgoraError::Config(format!("config parse error: {e}")))
    }

    /// Apply environment variable overrides to the configuration.
    ///
    /// Supported environment variables:
    /// - `AGORA_DATABASE_PATH`: Override the database path
    /// - `AGORA_LOG_LEVEL`: Override the log level
    /// - `AGORA_BASE_URL`: Override the base URL used in notification links
    pub fn apply_env_overrides(&mut self) {
        if let Some(path) = non_empty_env("AGORA_DATABASE_PATH") {
            self.database.path = path;
        }
        if let Some(level) = non_empty_env("AGORA_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(url) = non_empty_env("AGORA_BASE_URL") {
            self.notifications.base_url = url;
        }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.forum.posts_per_page <= 0 {
            return Err(AgoraError::Config(
                "forum.posts_per_page must be greater than zero".to_string(),
            ));
        }
        if self.forum.timezone.parse::<chrono_tz::Tz>().is_err() {
            return Err(AgoraError::Config(format!(
                "unknown timezone: {}",
                self.forum.timezone
            )));
        }
        if self.notifications.max_concurrent_deliveries == 0 {
            return Err(AgoraError::Config(
                "notifications.max_concurrent_deliveries must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}
