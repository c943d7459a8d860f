use config::{Config, Environment, File};
use serde::Deserialize;

use crate::error::ParleyError;

#[derive(Debug, Deserialize, Clone)]
pub struct ParleyConfig {
    #[serde(default)]
    pub service: ServiceConfig,
    pub database: DatabaseConfig,
    pub telegram: TelegramConfig,
    pub completion: CompletionConfig,
    #[serde(default)]
    pub quota: QuotaConfig,
    #[serde(default)]
    pub chat: ChatConfig,
    #[serde(default)]
    pub http: HttpConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServiceConfig {
    pub log_level: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct TelegramConfig {
    #[serde(default)]
    pub token: String,
    /// Username used to match `/command@bot_username` in group chats.
    pub bot_username: String,
    #[serde(default = "default_telegram_api_base")]
    pub api_base: String,
    #[serde(default = "default_poll_timeout")]
    pub poll_timeout_seconds: u64,
}

fn default_telegram_api_base() -> String {
    "https://api.telegram.org".to_string()
}

fn default_poll_timeout() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct CompletionConfig {
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_completion_base_url")]
    pub base_url: String,
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub timeout_seconds: u64,
}

fn default_completion_base_url() -> String {
    "https://api.openai.com".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct QuotaConfig {
    /// Exchanges allowed per user per UTC day.
    pub daily_limit: i32,
}

impl Default for QuotaConfig {
    fn default() -> Self {
        Self { daily_limit: 100 }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChatConfig {
    /// Longest transcript excerpt, in characters, echoed back with a reply.
    pub display_ceiling: usize,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            display_ceiling: 3800,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct HttpConfig {
    pub enabled: bool,
    pub host: String,
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            host: "127.0.0.1".to_string(),
            port: 8767,
        }
    }
}

impl ParleyConfig {
    /// Load from a TOML file, then apply `PARLEY__SECTION__KEY` overrides.
    ///
    /// Empty secrets fall back to `TELEGRAM_KEY` and `OPENAI_KEY`.
    pub fn load(path: &str) -> Result<Self, ParleyError> {
        let s = Config::builder()
            .add_source(File::with_name(path))
            .add_source(Environment::with_prefix("PARLEY").separator("__"))
            .build()?;
        let mut config: Self = s.try_deserialize()?;
        config.apply_secret_fallbacks();
        config.validate()?;
        Ok(config)
    }

    /// Reject values the relay cannot run with. Secrets are checked later by
    /// the clients that need them.
    pub fn validate(&self) -> Result<(), ParleyError> {
        let invalid = |key, reason: &str| {
            Err(ParleyError::InvalidSetting {
                key,
                reason: reason.to_string(),
            })
        };

        if self.telegram.bot_username.trim().is_empty() {
            return invalid("telegram.bot_username", "must not be empty");
        }
        if self.quota.daily_limit <= 0 {
            return invalid("quota.daily_limit", "must be positive");
        }
        if self.chat.display_ceiling == 0 {
            return invalid("chat.display_ceiling", "must be positive");
        }
        if self.completion.timeout_seconds == 0 {
            return invalid("completion.timeout_seconds", "must be positive");
        }
        if !(0.0..=2.0).contains(&self.completion.temperature) {
            return invalid("completion.temperature", "must be between 0 and 2");
        }
        Ok(())
    }

    fn apply_secret_fallbacks(&mut self) {
        self.apply_secret_fallbacks_from(|key| std::env::var(key).ok());
    }

    fn apply_secret_fallbacks_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if self.telegram.token.is_empty() {
            self.telegram.token = lookup("TELEGRAM_KEY").unwrap_or_default();
        }
        if self.completion.api_key.is_empty() {
            self.completion.api_key = lookup("OPENAI_KEY").unwrap_or_default();
        }
    }
}
