use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::error::{RelayError, Result};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Path to the SQLite database holding users and invite records.
    /// Empty means `<data_dir>/chat-relay.db`.
    #[serde(default)]
    pub database_path: String,

    #[serde(default)]
    pub telegram: TelegramConfig,

    #[serde(default)]
    pub llm: LlmConfig,

    #[serde(default)]
    pub quota: QuotaConfig,
}

// -- Telegram ------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct TelegramConfig {
    /// Long-poll timeout passed to `getUpdates`, in seconds.
    #[serde(default = "default_poll_timeout_secs")]
    pub poll_timeout_secs: u32,

    /// Idle tick of the fetch and worker loops, in seconds.
    #[serde(default = "default_idle_tick_secs")]
    pub idle_tick_secs: u64,

    /// Delay before a failed update stream is closed and reopened.
    #[serde(default = "default_stream_retry_secs")]
    pub stream_retry_secs: u64,

    /// Channel a private-chat user must have joined (e.g. "@my_channel").
    /// Can be overridden with the `TELEGRAM_CHANNEL_NAME` env var.
    #[serde(default)]
    pub channel_name: String,

    /// Group a private-chat user must have joined (e.g. "@my_group").
    /// Can be overridden with the `TELEGRAM_GROUP_NAME` env var.
    #[serde(default)]
    pub group_name: String,

    /// Telegram user IDs allowed to run admin commands.
    #[serde(default)]
    pub admin_ids: Vec<i64>,

    /// Bot username used to build invite links. Resolved from `getMe` when
    /// empty.
    #[serde(default)]
    pub bot_username: String,
}

// -- LLM -----------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct LlmConfig {
    /// OpenAI-compatible API base URL.
    /// Can be overridden with the `OPENAI_BASE_URL` env var.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// API key. Can be overridden with the `OPENAI_API_KEY` env var.
    #[serde(default)]
    pub api_key: String,

    /// Model used for completions.
    /// Can be overridden with the `OPENAI_MODEL` env var.
    #[serde(default = "default_model")]
    pub model: String,

    /// Model used while downgrade mode is on.
    #[serde(default = "default_downgrade_model")]
    pub downgrade_model: String,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: usize,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Request timeout in seconds (0 = 300).
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Delay before the single retry of a failed completion.
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
}

// -- Quota ---------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct QuotaConfig {
    /// Whether the per-user remaining-count limiter starts enabled.
    /// Admins can flip it at runtime with `/limiter`.
    #[serde(default)]
    pub enabled: bool,

    /// Remaining count granted to a newly created user.
    #[serde(default = "default_initial_count")]
    pub initial_count: i64,

    /// Count credited to a user for every friend they invite.
    #[serde(default = "default_invite_bonus")]
    pub invite_bonus: i64,
}

fn default_poll_timeout_secs() -> u32 {
    60
}
fn default_idle_tick_secs() -> u64 {
    30
}
fn default_stream_retry_secs() -> u64 {
    3
}
fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}
fn default_model() -> String {
    "gpt-4o-mini".to_string()
}
fn default_downgrade_model() -> String {
    "gpt-3.5-turbo".to_string()
}
fn default_max_tokens() -> usize {
    2048
}
fn default_temperature() -> f32 {
    0.7
}
fn default_timeout_secs() -> u64 {
    120
}
fn default_retry_delay_ms() -> u64 {
    1000
}
fn default_initial_count() -> i64 {
    10
}
fn default_invite_bonus() -> i64 {
    5
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            poll_timeout_secs: default_poll_timeout_secs(),
            idle_tick_secs: default_idle_tick_secs(),
            stream_retry_secs: default_stream_retry_secs(),
            channel_name: String::new(),
            group_name: String::new(),
            admin_ids: Vec::new(),
            bot_username: String::new(),
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_key: String::new(),
            model: default_model(),
            downgrade_model: default_downgrade_model(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            timeout_secs: default_timeout_secs(),
            retry_delay_ms: default_retry_delay_ms(),
        }
    }
}

impl Default for QuotaConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            initial_count: default_initial_count(),
            invite_bonus: default_invite_bonus(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_path: String::new(),
            telegram: TelegramConfig::default(),
            llm: LlmConfig::default(),
            quota: QuotaConfig::default(),
        }
    }
}

// -- Config impl ---------------------------------------------------------

impl Config {
    /// Load config from the given path, or the default XDG config location.
    /// Environment overrides are applied on top of the file contents.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config_path = match path {
            Some(p) => p.to_path_buf(),
            None => Self::default_config_path(),
        };

        let mut config = if config_path.exists() {
            info!("loading config from {}", config_path.display());
            let contents = std::fs::read_to_string(&config_path).map_err(RelayError::Io)?;
            toml::from_str(&contents)
                .map_err(|e| RelayError::Config(format!("parse error: {e}")))?
        } else {
            info!("no config file found, using defaults");
            Config::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        override_from_env(&mut self.telegram.channel_name, "TELEGRAM_CHANNEL_NAME");
        override_from_env(&mut self.telegram.group_name, "TELEGRAM_GROUP_NAME");
        override_from_env(&mut self.llm.api_key, "OPENAI_API_KEY");
        override_from_env(&mut self.llm.base_url, "OPENAI_BASE_URL");
        override_from_env(&mut self.llm.model, "OPENAI_MODEL");
    }

    /// Returns the default config file path: `$XDG_CONFIG_HOME/chat-relay/config.toml`
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from(".config"))
            .join("chat-relay")
            .join("config.toml")
    }

    /// Returns the data directory: `$XDG_DATA_HOME/chat-relay/`
    pub fn data_dir() -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from(".local/share"))
            .join("chat-relay")
    }

    /// Resolved database location.
    pub fn database_path(&self) -> PathBuf {
        if self.database_path.is_empty() {
            Self::data_dir().join("chat-relay.db")
        } else {
            PathBuf::from(&self.database_path)
        }
    }

    /// Get the Telegram bot token from the environment.
    pub fn telegram_bot_token() -> Result<String> {
        std::env::var("TELEGRAM_BOT_TOKEN")
            .map_err(|_| RelayError::Config("TELEGRAM_BOT_TOKEN environment variable not set".into()))
    }

    /// Check the values the relay cannot run without.
    pub fn validate(&self) -> Result<()> {
        if self.telegram.channel_name.is_empty() || self.telegram.group_name.is_empty() {
            return Err(RelayError::Config(
                "telegram.channel_name and telegram.group_name are required \
                 (or TELEGRAM_CHANNEL_NAME / TELEGRAM_GROUP_NAME)"
                    .into(),
            ));
        }
        if self.llm.api_key.is_empty() {
            return Err(RelayError::Config(
                "LLM API key required: set OPENAI_API_KEY env var or llm.api_key in config".into(),
            ));
        }
        if self.telegram.poll_timeout_secs == 0 || self.telegram.idle_tick_secs == 0 {
            return Err(RelayError::Config(
                "telegram.poll_timeout_secs and telegram.idle_tick_secs must be positive".into(),
            ));
        }
        Ok(())
    }

    /// Generate the default config file contents.
    pub fn default_config_contents() -> &'static str {
        include_str!("../config.example.toml")
    }
}

fn override_from_env(field: &mut String, key: &str) {
    if let Ok(value) = std::env::var(key) {
        if !value.is_empty() {
            *field = value;
        }
    }
}
