use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use config::{
    Config as ConfigLib, ConfigBuilder, ConfigError, Environment, File, builder::DefaultState,
};
use serde::{Deserialize, Serialize};

use crate::outbound::webhook::retry_strategy::RetryStrategy;

/// Optional config file, any format the `config` crate understands
const CONFIG_FILE: &str = "config/xtsystems-bridge";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub gateway: GatewayConfig,
    pub delivery: DeliveryConfig,
    #[serde(default)]
    pub channels: ChannelsConfig,
    pub discord: DiscordConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Inbound webhook endpoint
#[derive(Clone, Deserialize)]
pub struct GatewayConfig {
    pub path: String,

    /// Shared secret; the endpoint is not mounted without one
    #[serde(default)]
    pub secret: Option<String>,

    pub freshness_window_secs: u64,
    pub rate_limit_max_requests: usize,
    pub rate_limit_window_secs: u64,
    pub max_body_bytes: usize,
}

impl std::fmt::Debug for GatewayConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayConfig")
            .field("path", &self.path)
            .field("secret", &self.secret.as_ref().map(|_| "<redacted>"))
            .field("freshness_window_secs", &self.freshness_window_secs)
            .field("rate_limit_max_requests", &self.rate_limit_max_requests)
            .field("rate_limit_window_secs", &self.rate_limit_window_secs)
            .field("max_body_bytes", &self.max_body_bytes)
            .finish()
    }
}

/// Outbound delivery defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryConfig {
    /// Default for subscriptions registered without one
    pub retry_limit: u32,

    /// Default for subscriptions registered without one
    pub timeout_seconds: u64,

    pub backoff_unit_ms: u64,

    #[serde(default)]
    pub max_backoff_ms: Option<u64>,

    pub response_body_limit: usize,

    /// JSON-lines delivery log; history is kept in memory when unset
    #[serde(default)]
    pub log_path: Option<PathBuf>,
}

impl DeliveryConfig {
    pub fn retry_strategy(&self) -> RetryStrategy {
        let strategy = RetryStrategy::new(Duration::from_millis(self.backoff_unit_ms));
        match self.max_backoff_ms {
            Some(cap) => strategy.with_max_delay(Duration::from_millis(cap)),
            None => strategy,
        }
    }
}

/// Event type to channel mapping
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChannelsConfig {
    #[serde(default)]
    pub default: Vec<String>,

    #[serde(default)]
    pub events: HashMap<String, Vec<String>>,

    /// `{"default": [...], "events": {...}}` merged over the fields above
    #[serde(default)]
    pub mapping_json: Option<String>,
}

#[derive(Clone, Deserialize)]
pub struct DiscordConfig {
    #[serde(default)]
    pub bot_token: Option<String>,

    pub api_base: String,
}

impl std::fmt::Debug for DiscordConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiscordConfig")
            .field("bot_token", &self.bot_token.as_ref().map(|_| "<redacted>"))
            .field("api_base", &self.api_base)
            .finish()
    }
}

impl Config {
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_with_sources(None)
    }

    pub fn load_with_sources(env_vars: Option<HashMap<String, String>>) -> Result<Self, ConfigError> {
        let mut builder = Self::set_defaults()?;
        // If env_vars is provided, we use it instead of the config file and
        // system environment, to avoid pollution across tests
        if let Some(vars) = env_vars {
            for (key, value) in vars {
                builder = builder.set_override(&key, value)?;
            }
        } else {
            builder = builder.add_source(File::with_name(CONFIG_FILE).required(false));
            // Should be in the format APP_SERVER__PORT or APP_GATEWAY__SECRET
            builder = builder.add_source(
                Environment::with_prefix("APP")
                    .prefix_separator("_")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("channels.default"),
            );
        }

        builder.build()?.try_deserialize()
    }

    /// Set default values for the configuration.
    /// This is used when no environment variables or config file are provided
    fn set_defaults() -> Result<ConfigBuilder<DefaultState>, ConfigError> {
        ConfigLib::builder()
            .set_default("server.host", "127.0.0.1")?
            .set_default("server.port", 3000)?
            .set_default("gateway.path", "/webhooks/xtsystems")?
            .set_default("gateway.freshness_window_secs", 300)?
            .set_default("gateway.rate_limit_max_requests", 100)?
            .set_default("gateway.rate_limit_window_secs", 900)?
            .set_default("gateway.max_body_bytes", 1024 * 1024)?
            .set_default("delivery.retry_limit", 3)?
            .set_default("delivery.timeout_seconds", 30)?
            .set_default("delivery.backoff_unit_ms", 1000)?
            .set_default("delivery.response_body_limit", 1024)?
            .set_default("discord.api_base", "https://discord.com/api/v10")
    }
}
