//! Configuration and settings management
//!
//! Loads settings from config files and environment variables and defines
//! the tunables of the dispatch core.

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Application settings loaded from config files and the environment
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Settings {
    /// Telegram Bot API token
    pub bot_token: String,

    /// `OpenAI` API key. AI features report "not connected" when absent.
    pub openai_api_key: Option<String>,
    /// Base URL of the `OpenAI` REST API
    #[serde(default = "default_openai_base_url")]
    pub openai_base_url: String,
    /// Chat completion model
    #[serde(default = "default_openai_model")]
    pub openai_model: String,
    /// Maximum completion tokens
    #[serde(default = "default_openai_max_tokens")]
    pub openai_max_tokens: u32,
    /// Sampling temperature
    #[serde(default = "default_openai_temperature")]
    pub openai_temperature: f32,
    /// Speech synthesis model
    #[serde(default = "default_openai_tts_model")]
    pub openai_tts_model: String,
    /// Image generation model
    #[serde(default = "default_openai_image_model")]
    pub openai_image_model: String,

    /// Public base URL for webhook delivery. Long polling is used when unset.
    pub webhook_url: Option<String>,
    /// Path component the webhook is served on
    #[serde(default = "default_webhook_path")]
    pub webhook_path: String,
    /// Local port of the webhook server
    #[serde(default = "default_port")]
    pub port: u16,

    /// Administrator user id, informational only
    pub admin_user_id: Option<String>,
}

fn default_openai_base_url() -> String {
    OPENAI_BASE_URL.to_string()
}

fn default_openai_model() -> String {
    "gpt-3.5-turbo".to_string()
}

const fn default_openai_max_tokens() -> u32 {
    1000
}

const fn default_openai_temperature() -> f32 {
    0.7
}

fn default_openai_tts_model() -> String {
    "gpt-4o-mini-tts".to_string()
}

fn default_openai_image_model() -> String {
    "gpt-image-1".to_string()
}

fn default_webhook_path() -> String {
    "/webhook".to_string()
}

const fn default_port() -> u16 {
    8080
}

impl Settings {
    /// Create new settings by loading from config files and the environment
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use ai_studio_bot::config::Settings;
    ///
    /// let settings = Settings::new().expect("Failed to load configuration");
    /// ```
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if loading fails or `BOT_TOKEN` is missing.
    pub fn new() -> Result<Self, ConfigError> {
        let run_mode = std::env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = Config::builder()
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{run_mode}")).required(false))
            // Local overrides, not checked into git
            .add_source(File::with_name("config/local").required(false))
            // `APP__OPENAI_MODEL=gpt-4o` style overrides
            .add_source(Environment::with_prefix("APP").separator("__"))
            // Plain `BOT_TOKEN`, `OPENAI_API_KEY`, ...; empty values count as unset
            .add_source(Environment::default().ignore_empty(true))
            .build()?;

        let mut settings: Self = s.try_deserialize()?;

        if settings
            .openai_api_key
            .as_ref()
            .is_some_and(|key| key.trim().is_empty())
        {
            settings.openai_api_key = None;
        }
        if settings
            .webhook_url
            .as_ref()
            .is_some_and(|url| url.trim().is_empty())
        {
            settings.webhook_url = None;
        }

        Ok(settings)
    }

    /// Whether an `OpenAI` key is configured
    #[must_use]
    pub const fn openai_enabled(&self) -> bool {
        self.openai_api_key.is_some()
    }

    /// Full webhook URL (`webhook_url` + `webhook_path`), if webhooks are enabled
    #[must_use]
    pub fn webhook_endpoint(&self) -> Option<String> {
        self.webhook_url.as_ref().map(|base| {
            let base = base.trim_end_matches('/');
            if self.webhook_path.starts_with('/') {
                format!("{base}{}", self.webhook_path)
            } else {
                format!("{base}/{}", self.webhook_path)
            }
        })
    }
}

/// Default `OpenAI` REST endpoint
pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

// Resilient call wrapper
/// Counted attempts per outbound call
pub const RETRY_MAX_ATTEMPTS: u32 = 3;
/// Linear backoff unit for transient failures
pub const RETRY_BASE_DELAY_MS: u64 = 700;
/// Bound on uncounted waits for explicit `retry_after` signals
pub const RATE_LIMIT_MAX_WAITS: u32 = 5;
/// Wait used when a rate limit arrives without `retry_after`
pub const RATE_LIMIT_FALLBACK_DELAY_MS: u64 = 1000;

// Provider HTTP
/// Connect timeout for provider requests
pub const HTTP_CONNECT_TIMEOUT_SECS: u64 = 10;
/// Whole-request timeout for provider requests (speech and images are slow)
pub const HTTP_REQUEST_TIMEOUT_SECS: u64 = 180;
/// Timeout for fetching option hints attached to failure reports
pub const HINT_FETCH_TIMEOUT_MS: u64 = 1500;

// Startup
/// Attempts for webhook registration and other startup calls
pub const STARTUP_MAX_RETRIES: usize = 5;
/// Initial backoff for startup calls
pub const STARTUP_INITIAL_BACKOFF_MS: u64 = 500;
/// Maximum backoff for startup calls
pub const STARTUP_MAX_BACKOFF_MS: u64 = 8000;

fn env_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

/// Get counted retry attempts from env or default.
///
/// Environment variable: `RETRY_MAX_ATTEMPTS`.
#[must_use]
pub fn get_retry_max_attempts() -> u32 {
    env_or("RETRY_MAX_ATTEMPTS", RETRY_MAX_ATTEMPTS).max(1)
}

/// Get the linear backoff unit from env or default.
///
/// Environment variable: `RETRY_BASE_DELAY_MS`.
#[must_use]
pub fn get_retry_base_delay() -> Duration {
    Duration::from_millis(env_or("RETRY_BASE_DELAY_MS", RETRY_BASE_DELAY_MS))
}

/// Get the bound on uncounted rate-limit waits from env or default.
///
/// Environment variable: `RATE_LIMIT_MAX_WAITS`.
#[must_use]
pub fn get_rate_limit_max_waits() -> u32 {
    env_or("RATE_LIMIT_MAX_WAITS", RATE_LIMIT_MAX_WAITS)
}

/// Get the rate-limit fallback delay from env or default.
///
/// Environment variable: `RATE_LIMIT_FALLBACK_DELAY_MS`.
#[must_use]
pub fn get_rate_limit_fallback_delay() -> Duration {
    Duration::from_millis(env_or(
        "RATE_LIMIT_FALLBACK_DELAY_MS",
        RATE_LIMIT_FALLBACK_DELAY_MS,
    ))
}

/// Get the provider connect timeout from env or default.
///
/// Environment variable: `HTTP_CONNECT_TIMEOUT_SECS`.
#[must_use]
pub fn get_http_connect_timeout() -> Duration {
    Duration::from_secs(env_or("HTTP_CONNECT_TIMEOUT_SECS", HTTP_CONNECT_TIMEOUT_SECS))
}

/// Get the provider request timeout from env or default.
///
/// Environment variable: `HTTP_REQUEST_TIMEOUT_SECS`.
#[must_use]
pub fn get_http_request_timeout() -> Duration {
    Duration::from_secs(env_or("HTTP_REQUEST_TIMEOUT_SECS", HTTP_REQUEST_TIMEOUT_SECS))
}

/// Get the hint fetch timeout from env or default.
///
/// Environment variable: `HINT_FETCH_TIMEOUT_MS`.
#[must_use]
pub fn get_hint_fetch_timeout() -> Duration {
    Duration::from_millis(env_or("HINT_FETCH_TIMEOUT_MS", HINT_FETCH_TIMEOUT_MS))
}
