//! TOML Configuration File Support
//!
//! Loads the bot configuration from `~/.config/trello-notifier/notifier.toml`
//! (or an explicit path).
//!
//! # Configuration Priority
//!
//! Values are applied with the following priority (highest first):
//! 1. CLI arguments ([`ConfigOverrides`])
//! 2. Environment variables
//! 3. TOML configuration file
//! 4. Default values
//!
//! # Example Configuration
//!
//! ```toml
//! owner_chat_id = 123456789
//!
//! [telegram]
//! bot_token = "123:abc"
//! poll_timeout_secs = 25
//!
//! [trello]
//! api_key = "key"
//! api_token = "token"
//! max_concurrent_requests = 4
//!
//! [schedule]
//! times = ["09:00", "18:30"]
//! # interval_secs = 60
//! tick_ms = 1000
//!
//! [conversation]
//! timeout_secs = 900
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::board::{TrelloConfig, DEFAULT_TRELLO_API_BASE};
use crate::conversation::DEFAULT_CONVERSATION_TIMEOUT;
use crate::dates::parse_trigger_time;
use crate::messages::ChatId;
use crate::scheduler::{TriggerPolicy, DEFAULT_TICK};
use crate::transport::{TelegramConfig, DEFAULT_TELEGRAM_API_BASE};

/// Environment variable overriding the Telegram bot token
pub const ENV_TELEGRAM_TOKEN: &str = "NOTIFIER_TELEGRAM_TOKEN";
/// Environment variable overriding the owner chat id
pub const ENV_OWNER_CHAT_ID: &str = "NOTIFIER_OWNER_CHAT_ID";
/// Environment variable overriding the Trello API key
pub const ENV_TRELLO_KEY: &str = "TRELLO_API_KEY";
/// Environment variable overriding the Trello API token
pub const ENV_TRELLO_TOKEN: &str = "TRELLO_API_TOKEN";
/// Environment variable switching to the interval trigger policy
pub const ENV_INTERVAL_SECS: &str = "NOTIFIER_INTERVAL_SECS";

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur when loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read config file
    #[error("Failed to read config file at {path}: {source}")]
    ReadError {
        /// The path that was attempted
        path: PathBuf,
        /// The underlying IO error
        source: std::io::Error,
    },

    /// Failed to parse TOML
    #[error("Failed to parse TOML config: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Invalid configuration value
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Tracks where the configuration last got a value from
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfigSource {
    /// Command-line argument
    Cli,
    /// Environment variable
    Env,
    /// TOML configuration file
    File,
    /// Default value
    Default,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cli => write!(f, "CLI"),
            Self::Env => write!(f, "environment"),
            Self::File => write!(f, "config file"),
            Self::Default => write!(f, "default"),
        }
    }
}

// =============================================================================
// TOML Configuration Structures
// =============================================================================

/// `[telegram]` section
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TelegramToml {
    /// Bot token from @BotFather
    pub bot_token: Option<String>,
    /// Long-poll timeout in seconds
    pub poll_timeout_secs: Option<u64>,
    /// API base URL
    pub api_base: Option<String>,
}

/// `[trello]` section
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TrelloToml {
    /// API key
    pub api_key: Option<String>,
    /// API token
    pub api_token: Option<String>,
    /// API base URL
    pub api_base: Option<String>,
    /// Maximum requests in flight
    pub max_concurrent_requests: Option<usize>,
}

/// `[schedule]` section
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleToml {
    /// Daily `HH:MM` trigger times
    pub times: Option<Vec<String>>,
    /// Fixed scan period; replaces the daily times when set
    pub interval_secs: Option<u64>,
    /// Scheduler loop tick in milliseconds
    pub tick_ms: Option<u64>,
}

/// `[conversation]` section
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversationToml {
    /// Inactivity timeout in seconds
    pub timeout_secs: Option<u64>,
}

/// Root of the TOML file
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifierToml {
    /// Chat the bot serves and reminds
    pub owner_chat_id: Option<i64>,
    /// Telegram settings
    pub telegram: TelegramToml,
    /// Trello settings
    pub trello: TrelloToml,
    /// Schedule settings
    pub schedule: ScheduleToml,
    /// Conversation settings
    pub conversation: ConversationToml,
}

// =============================================================================
// Resolved Configuration
// =============================================================================

/// Resolved bot configuration
#[derive(Clone, Debug)]
pub struct NotifierConfig {
    /// Chat the bot serves and reminds (0 = unset)
    pub owner_chat_id: i64,
    /// Telegram bot token
    pub telegram_token: String,
    /// Telegram long-poll timeout in seconds
    pub poll_timeout_secs: u64,
    /// Telegram API base URL
    pub telegram_api_base: String,
    /// Trello API key
    pub trello_key: String,
    /// Trello API token
    pub trello_token: String,
    /// Trello API base URL
    pub trello_api_base: String,
    /// Maximum outbound requests in flight per service
    pub max_concurrent_requests: usize,
    /// Daily trigger times as written
    pub trigger_times: Vec<String>,
    /// Fixed scan period, if any
    pub interval_secs: Option<u64>,
    /// Scheduler tick in milliseconds
    pub tick_ms: u64,
    /// Conversation inactivity timeout in seconds
    pub conversation_timeout_secs: u64,
    /// File the values were loaded from
    pub config_file_path: Option<PathBuf>,
    source: ConfigSource,
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            owner_chat_id: 0,
            telegram_token: String::new(),
            poll_timeout_secs: 25,
            telegram_api_base: DEFAULT_TELEGRAM_API_BASE.to_string(),
            trello_key: String::new(),
            trello_token: String::new(),
            trello_api_base: DEFAULT_TRELLO_API_BASE.to_string(),
            max_concurrent_requests: 4,
            trigger_times: vec!["09:00".to_string()],
            interval_secs: None,
            tick_ms: u64::try_from(DEFAULT_TICK.as_millis()).unwrap_or(1000),
            conversation_timeout_secs: DEFAULT_CONVERSATION_TIMEOUT.as_secs(),
            config_file_path: None,
            source: ConfigSource::Default,
        }
    }
}

impl NotifierConfig {
    /// Where the last applied value came from
    #[must_use]
    pub fn source(&self) -> ConfigSource {
        self.source
    }

    /// Check every value the bot depends on
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ValidationError`] naming the first bad value.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let required = [
            ("telegram.bot_token", &self.telegram_token),
            ("trello.api_key", &self.trello_key),
            ("trello.api_token", &self.trello_token),
        ];
        for (name, value) in required {
            if value.trim().is_empty() {
                return Err(ConfigError::ValidationError(format!("{name} is required")));
            }
        }
        if self.owner_chat_id == 0 {
            return Err(ConfigError::ValidationError("owner_chat_id is required".to_string()));
        }
        if self.tick_ms == 0 {
            return Err(ConfigError::ValidationError("schedule.tick_ms must be positive".to_string()));
        }
        if self.max_concurrent_requests == 0 {
            return Err(ConfigError::ValidationError(
                "trello.max_concurrent_requests must be positive".to_string(),
            ));
        }
        self.trigger_policy().map(drop)
    }

    /// Trigger policy; a configured interval wins over daily times
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ValidationError`] for a zero interval, a
    /// malformed time, or an empty time list.
    pub fn trigger_policy(&self) -> Result<TriggerPolicy, ConfigError> {
        if let Some(secs) = self.interval_secs {
            if secs == 0 {
                return Err(ConfigError::ValidationError(
                    "schedule.interval_secs must be positive".to_string(),
                ));
            }
            return Ok(TriggerPolicy::Interval(Duration::from_secs(secs)));
        }

        if self.trigger_times.is_empty() {
            return Err(ConfigError::ValidationError(
                "schedule.times is empty and no interval is set".to_string(),
            ));
        }
        let times = self
            .trigger_times
            .iter()
            .map(|t| parse_trigger_time(t))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| ConfigError::ValidationError(format!("schedule.times: {e}")))?;
        Ok(TriggerPolicy::Daily(times))
    }

    /// Owner chat
    #[must_use]
    pub fn owner_chat(&self) -> ChatId {
        ChatId(self.owner_chat_id)
    }

    /// Scheduler tick
    #[must_use]
    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_ms)
    }

    /// Conversation inactivity timeout
    #[must_use]
    pub fn conversation_timeout(&self) -> Duration {
        Duration::from_secs(self.conversation_timeout_secs)
    }

    /// Telegram client settings
    #[must_use]
    pub fn telegram_config(&self) -> TelegramConfig {
        let mut config = TelegramConfig::new(self.telegram_token.clone())
            .with_api_base(self.telegram_api_base.clone())
            .with_poll_timeout(Duration::from_secs(self.poll_timeout_secs));
        config.max_concurrent_requests = self.max_concurrent_requests;
        config
    }

    /// Trello client settings
    #[must_use]
    pub fn trello_config(&self) -> TrelloConfig {
        let mut config = TrelloConfig::new(self.trello_key.clone(), self.trello_token.clone())
            .with_api_base(self.trello_api_base.clone());
        config.max_concurrent_requests = self.max_concurrent_requests;
        config
    }

    /// One-line-per-value summary with secrets masked
    #[must_use]
    pub fn summary(&self) -> String {
        let schedule = match self.interval_secs {
            Some(secs) => format!("every {secs}s"),
            None => format!("daily at {}", self.trigger_times.join(", ")),
        };
        let file = self
            .config_file_path
            .as_deref()
            .map_or_else(|| "(none)".to_string(), |p| p.display().to_string());
        format!(
            "config file: {file}\n\
             owner chat: {}\n\
             telegram token: {}\n\
             trello key: {}\n\
             schedule: {schedule}\n\
             conversation timeout: {}s",
            self.owner_chat_id,
            mask(&self.telegram_token),
            mask(&self.trello_key),
            self.conversation_timeout_secs,
        )
    }
}

fn mask(secret: &str) -> String {
    let tail: String = secret.chars().rev().take(4).collect::<Vec<_>>().into_iter().rev().collect();
    if secret.chars().count() <= 4 {
        "****".to_string()
    } else {
        format!("****{tail}")
    }
}

// =============================================================================
// Loading
// =============================================================================

/// Default configuration file path
///
/// Returns `$XDG_CONFIG_HOME/trello-notifier/notifier.toml` (typically
/// `~/.config/trello-notifier/notifier.toml`).
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("trello-notifier").join("notifier.toml"))
}

/// Load configuration from `path`, then apply environment variables
///
/// A missing file is not an error; the defaults and environment are used.
///
/// # Errors
///
/// Returns an error if the file exists but cannot be read or parsed.
pub fn load_config_from_path(path: Option<&Path>) -> Result<NotifierConfig, ConfigError> {
    load_config_with_env(path, |key| std::env::var(key).ok())
}

/// Load a configuration file the user named explicitly
///
/// Unlike [`load_config_from_path`], a missing file is an error.
///
/// # Errors
///
/// Returns [`ConfigError::ReadError`] if the file does not exist or cannot be
/// read, and a parse error if it is not valid TOML.
pub fn load_config_file(path: &Path) -> Result<NotifierConfig, ConfigError> {
    if !path.is_file() {
        return Err(ConfigError::ReadError {
            path: path.to_path_buf(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "config file not found"),
        });
    }
    load_config_from_path(Some(path))
}

/// [`load_config_from_path`] with an explicit environment lookup
///
/// # Errors
///
/// Returns an error if the file exists but cannot be read or parsed.
pub fn load_config_with_env<F>(path: Option<&Path>, env: F) -> Result<NotifierConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut config = NotifierConfig::default();

    if let Some(config_path) = path {
        if config_path.exists() {
            let content = std::fs::read_to_string(config_path).map_err(|e| ConfigError::ReadError {
                path: config_path.to_path_buf(),
                source: e,
            })?;
            let toml_config: NotifierToml = toml::from_str(&content)?;
            apply_toml_config(&mut config, &toml_config);
            config.config_file_path = Some(config_path.to_path_buf());
            config.source = ConfigSource::File;

            tracing::info!(path = %config_path.display(), "Loaded configuration from file");
        } else {
            tracing::debug!(path = %config_path.display(), "Config file not found, using defaults");
        }
    }

    apply_env_config(&mut config, env);
    Ok(config)
}

fn apply_toml_config(config: &mut NotifierConfig, toml: &NotifierToml) {
    if let Some(id) = toml.owner_chat_id {
        config.owner_chat_id = id;
    }

    let telegram = &toml.telegram;
    if let Some(ref token) = telegram.bot_token {
        config.telegram_token.clone_from(token);
    }
    if let Some(secs) = telegram.poll_timeout_secs {
        config.poll_timeout_secs = secs;
    }
    if let Some(ref base) = telegram.api_base {
        config.telegram_api_base.clone_from(base);
    }

    let trello = &toml.trello;
    if let Some(ref key) = trello.api_key {
        config.trello_key.clone_from(key);
    }
    if let Some(ref token) = trello.api_token {
        config.trello_token.clone_from(token);
    }
    if let Some(ref base) = trello.api_base {
        config.trello_api_base.clone_from(base);
    }
    if let Some(max) = trello.max_concurrent_requests {
        config.max_concurrent_requests = max;
    }

    let schedule = &toml.schedule;
    if let Some(ref times) = schedule.times {
        config.trigger_times.clone_from(times);
    }
    if schedule.interval_secs.is_some() {
        config.interval_secs = schedule.interval_secs;
    }
    if let Some(tick) = schedule.tick_ms {
        config.tick_ms = tick;
    }

    if let Some(secs) = toml.conversation.timeout_secs {
        config.conversation_timeout_secs = secs;
    }
}

fn apply_env_config<F>(config: &mut NotifierConfig, env: F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(token) = env(ENV_TELEGRAM_TOKEN) {
        config.telegram_token = token;
        config.source = ConfigSource::Env;
    }
    if let Some(key) = env(ENV_TRELLO_KEY) {
        config.trello_key = key;
        config.source = ConfigSource::Env;
    }
    if let Some(token) = env(ENV_TRELLO_TOKEN) {
        config.trello_token = token;
        config.source = ConfigSource::Env;
    }
    if let Some(raw) = env(ENV_OWNER_CHAT_ID) {
        match raw.trim().parse::<i64>() {
            Ok(id) => {
                config.owner_chat_id = id;
                config.source = ConfigSource::Env;
            }
            Err(_) => tracing::warn!(var = ENV_OWNER_CHAT_ID, value = %raw, "Ignoring non-numeric chat id"),
        }
    }
    if let Some(raw) = env(ENV_INTERVAL_SECS) {
        match raw.trim().parse::<u64>() {
            Ok(secs) => {
                config.interval_secs = Some(secs);
                config.source = ConfigSource::Env;
            }
            Err(_) => tracing::warn!(var = ENV_INTERVAL_SECS, value = %raw, "Ignoring non-numeric interval"),
        }
    }
}

/// CLI overrides, applied last
#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    /// Switch to the interval trigger policy
    pub interval_secs: Option<u64>,
}

impl ConfigOverrides {
    /// Apply the overrides
    pub fn apply(&self, config: &mut NotifierConfig) {
        if let Some(secs) = self.interval_secs {
            config.interval_secs = Some(secs);
            config.source = ConfigSource::Cli;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::io::Write;

    use chrono::NaiveTime;
    use tempfile::NamedTempFile;

    use super::*;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    fn write_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    const FULL: &str = r#"
owner_chat_id = 42

[telegram]
bot_token = "123:abc"
poll_timeout_secs = 10

[trello]
api_key = "key"
api_token = "token"
max_concurrent_requests = 2

[schedule]
times = ["09:00", "18:30"]

[conversation]
timeout_secs = 60
"#;

    #[test]
    fn test_load_full_file() {
        let file = write_config(FULL);
        let config = load_config_with_env(Some(file.path()), no_env).unwrap();

        assert_eq!(config.source(), ConfigSource::File);
        assert_eq!(config.owner_chat(), ChatId(42));
        assert_eq!(config.poll_timeout_secs, 10);
        assert_eq!(config.trello_config().max_concurrent_requests, 2);
        assert_eq!(config.conversation_timeout(), Duration::from_secs(60));
        config.validate().unwrap();

        assert_eq!(
            config.trigger_policy().unwrap(),
            TriggerPolicy::Daily(vec![
                NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
                NaiveTime::from_hms_opt(18, 30, 0).unwrap(),
            ])
        );
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let config = load_config_with_env(Some(Path::new("/nonexistent/notifier.toml")), no_env).unwrap();
        assert_eq!(config.source(), ConfigSource::Default);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_named_file_must_exist() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("notifier.toml");

        let err = load_config_file(&missing).unwrap_err();
        assert!(matches!(err, ConfigError::ReadError { ref path, .. } if *path == missing));

        let file = write_config(FULL);
        let config = load_config_file(file.path()).unwrap();
        assert_eq!(config.config_file_path.as_deref(), Some(file.path()));
    }

    #[test]
    fn test_env_overrides_file() {
        let file = write_config(FULL);
        let env: HashMap<&str, &str> = [(ENV_TELEGRAM_TOKEN, "999:zzz"), (ENV_INTERVAL_SECS, "30")].into();
        let config =
            load_config_with_env(Some(file.path()), |k| env.get(k).map(|v| (*v).to_string())).unwrap();

        assert_eq!(config.source(), ConfigSource::Env);
        assert_eq!(config.telegram_token, "999:zzz");
        assert_eq!(
            config.trigger_policy().unwrap(),
            TriggerPolicy::Interval(Duration::from_secs(30))
        );
    }

    #[test]
    fn test_cli_override_wins() {
        let file = write_config(FULL);
        let mut config = load_config_with_env(Some(file.path()), no_env).unwrap();
        ConfigOverrides {
            interval_secs: Some(5),
        }
        .apply(&mut config);

        assert_eq!(config.source(), ConfigSource::Cli);
        assert_eq!(config.interval_secs, Some(5));
    }

    #[test]
    fn test_malformed_trigger_time_rejected() {
        let file = write_config(&FULL.replace("\"18:30\"", "\"6pm\""));
        let config = load_config_with_env(Some(file.path()), no_env).unwrap();

        match config.validate() {
            Err(ConfigError::ValidationError(msg)) => assert!(msg.contains("6pm")),
            other => panic!("Expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn test_zero_interval_and_empty_times_rejected() {
        let mut config = load_config_with_env(Some(write_config(FULL).path()), no_env).unwrap();
        config.interval_secs = Some(0);
        assert!(config.validate().is_err());

        config.interval_secs = None;
        config.trigger_times.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_toml_is_parse_error() {
        let file = write_config("owner_chat_id = [");
        assert!(matches!(
            load_config_with_env(Some(file.path()), no_env),
            Err(ConfigError::ParseError(_))
        ));
    }

    #[test]
    fn test_summary_masks_secrets() {
        let config = load_config_with_env(Some(write_config(FULL).path()), no_env).unwrap();
        let summary = config.summary();
        assert!(summary.contains("****:abc"));
        assert!(!summary.contains("123:abc"));
        assert!(summary.contains("daily at 09:00, 18:30"));
    }
}
