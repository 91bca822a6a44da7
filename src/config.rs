use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;
use validator::{Validate, ValidationError};

/// Default values for configuration
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_ENV: &str = "development";
const DEFAULT_PORT: u16 = 8080;
const CONFIG_DIR: &str = "config";
const DEFAULT_EVENT_CHANNEL_CAPACITY: usize = 1024;
const DEFAULT_PROCESSOR_TIMEOUT_SECS: u64 = 10;
const DEFAULT_WEBHOOK_TOLERANCE_SECS: i64 = 300;
const DEFAULT_TOKEN_REFRESH_MARGIN_SECS: i64 = 60;
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Card processor (payment-intent rail) settings.
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct CardProcessorConfig {
    /// Base URL of the card processor API
    pub base_url: String,

    /// API secret key used as a bearer token on outbound calls
    #[validate(length(min = 8))]
    pub secret_key: String,

    /// Shared secret for inbound webhook signature verification
    #[validate(length(min = 8))]
    pub webhook_secret: String,

    /// Outbound call timeout (seconds)
    #[serde(default = "default_processor_timeout_secs")]
    pub timeout_secs: u64,

    /// Allowed clock skew for webhook timestamps (seconds)
    #[serde(default = "default_webhook_tolerance_secs")]
    pub webhook_tolerance_secs: i64,
}

/// Wallet processor (redirect rail) settings.
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct WalletProcessorConfig {
    /// Base URL of the wallet processor API
    pub base_url: String,

    /// OAuth client id
    #[validate(length(min = 4))]
    pub client_id: String,

    /// OAuth client secret
    #[validate(length(min = 8))]
    pub client_secret: String,

    /// Shared secret for inbound webhook signature verification
    #[validate(length(min = 8))]
    pub webhook_secret: String,

    /// Outbound call timeout (seconds)
    #[serde(default = "default_processor_timeout_secs")]
    pub timeout_secs: u64,

    /// Allowed clock skew for webhook timestamps (seconds)
    #[serde(default = "default_webhook_tolerance_secs")]
    pub webhook_tolerance_secs: i64,

    /// Refresh the cached access token this many seconds before it expires
    #[serde(default = "default_token_refresh_margin_secs")]
    pub token_refresh_margin_secs: i64,

    /// Where the wallet processor redirects the buyer after approval
    #[validate(url)]
    pub return_url: String,

    /// Where the wallet processor redirects the buyer after cancelling
    #[validate(url)]
    pub cancel_url: String,
}

/// Application configuration with validation.
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    /// Server host address
    #[serde(default = "default_host")]
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Application environment
    #[serde(default = "default_environment")]
    pub environment: String,

    /// Logging level
    #[serde(default = "default_log_level")]
    #[validate(custom = "validate_log_level")]
    pub log_level: String,

    /// Log in JSON format (structured logging)
    #[serde(default)]
    pub log_json: bool,

    /// CORS: comma-separated list of allowed origins (production)
    #[serde(default)]
    pub cors_allowed_origins: Option<String>,

    /// Request timeout for the HTTP surface (seconds)
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Capacity of the in-process event channel
    #[serde(default = "default_event_channel_capacity")]
    #[validate(custom = "validate_event_channel_capacity")]
    pub event_channel_capacity: usize,

    /// Card processor settings
    #[validate]
    pub card: CardProcessorConfig,

    /// Wallet processor settings
    #[validate]
    pub wallet: WalletProcessorConfig,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_environment() -> String {
    DEFAULT_ENV.to_string()
}
fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}
fn default_event_channel_capacity() -> usize {
    DEFAULT_EVENT_CHANNEL_CAPACITY
}
fn default_processor_timeout_secs() -> u64 {
    DEFAULT_PROCESSOR_TIMEOUT_SECS
}
fn default_webhook_tolerance_secs() -> i64 {
    DEFAULT_WEBHOOK_TOLERANCE_SECS
}
fn default_token_refresh_margin_secs() -> i64 {
    DEFAULT_TOKEN_REFRESH_MARGIN_SECS
}
fn default_request_timeout_secs() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_SECS
}

impl AppConfig {
    pub fn is_development(&self) -> bool {
        self.environment.eq_ignore_ascii_case("development")
    }

    pub fn log_level(&self) -> &str {
        &self.log_level
    }
}

fn validate_log_level(level: &str) -> Result<(), ValidationError> {
    let valid_levels = ["trace", "debug", "info", "warn", "error"];
    if valid_levels.contains(&level.to_lowercase().as_str()) {
        Ok(())
    } else {
        let mut err = ValidationError::new("log_level");
        err.message = Some("Must be one of: trace, debug, info, warn, error".into());
        Err(err)
    }
}

fn validate_event_channel_capacity(capacity: usize) -> Result<(), ValidationError> {
    if capacity == 0 {
        let mut err = ValidationError::new("event_channel_capacity");
        err.message = Some("event_channel_capacity must be greater than 0".into());
        return Err(err);
    }
    Ok(())
}

/// Loads application configuration.
///
/// Layers configuration sources in this order:
/// 1. Default config (config/default.toml)
/// 2. Environment-specific config (config/{env}.toml)
/// 3. Environment variables (APP__*)
pub fn load_config() -> Result<AppConfig, ConfigError> {
    let environment = env::var("APP_ENV").unwrap_or_else(|_| DEFAULT_ENV.to_string());

    let settings = Config::builder()
        .add_source(File::with_name(&format!("{}/default", CONFIG_DIR)).required(false))
        .add_source(File::with_name(&format!("{}/{}", CONFIG_DIR, environment)).required(false))
        .add_source(Environment::with_prefix("APP").separator("__"))
        .set_default("environment", environment.clone())?
        .build()?;

    let cfg: AppConfig = settings.try_deserialize()?;

    cfg.validate()
        .map_err(|e| ConfigError::Message(format!("invalid configuration: {}", e)))?;

    Ok(cfg)
}

/// Initializes tracing using the provided log level as the default filter
pub fn init_tracing(level: &str, json: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default_directive = format!("diehard_api={},tower_http=debug", level);
    let filter_directive = env::var("RUST_LOG")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or(default_directive);

    if json {
        let _ = fmt().with_env_filter(filter_directive).json().try_init();
    } else {
        let _ = fmt().with_env_filter(filter_directive).try_init();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_config() -> AppConfig {
        AppConfig {
            host: default_host(),
            port: DEFAULT_PORT,
            environment: DEFAULT_ENV.to_string(),
            log_level: DEFAULT_LOG_LEVEL.to_string(),
            log_json: false,
            cors_allowed_origins: None,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            event_channel_capacity: DEFAULT_EVENT_CHANNEL_CAPACITY,
            card: CardProcessorConfig {
                base_url: "https://cards.example".to_string(),
                secret_key: "sk_test_1234567890".to_string(),
                webhook_secret: "whsec_card_test_secret".to_string(),
                timeout_secs: DEFAULT_PROCESSOR_TIMEOUT_SECS,
                webhook_tolerance_secs: DEFAULT_WEBHOOK_TOLERANCE_SECS,
            },
            wallet: WalletProcessorConfig {
                base_url: "https://wallet.example".to_string(),
                client_id: "wallet-client".to_string(),
                client_secret: "wallet-secret-123".to_string(),
                webhook_secret: "whsec_wallet_test_secret".to_string(),
                timeout_secs: DEFAULT_PROCESSOR_TIMEOUT_SECS,
                webhook_tolerance_secs: DEFAULT_WEBHOOK_TOLERANCE_SECS,
                token_refresh_margin_secs: DEFAULT_TOKEN_REFRESH_MARGIN_SECS,
                return_url: "https://diehard.community/checkout/return".to_string(),
                cancel_url: "https://diehard.community/checkout/cancel".to_string(),
            },
        }
    }

    #[test]
    fn sample_config_validates() {
        assert!(sample_config().validate().is_ok());
    }

    #[test]
    fn rejects_bad_log_level() {
        let mut cfg = sample_config();
        cfg.log_level = "verbose".to_string();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_zero_event_channel_capacity() {
        let mut cfg = sample_config();
        cfg.event_channel_capacity = 0;
        assert!(cfg.validate().is_err());
    }
}
