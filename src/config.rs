//! Configuration management for the weather dashboard
//!
//! Handles loading configuration from files, environment variables,
//! and provides validation for all configuration settings.

use crate::WeatherError;
use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Environment variable pointing at an explicit config file
pub const CONFIG_PATH_ENV: &str = "WEATHERDASH_CONFIG";

/// Root configuration structure for the dashboard
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeatherDashConfig {
    /// Weather provider configuration
    #[serde(default)]
    pub provider: ProviderConfig,
    /// Database configuration
    #[serde(default)]
    pub database: DatabaseConfig,
    /// Cache reuse configuration
    #[serde(default)]
    pub cache: CacheConfig,
    /// HTTP server configuration
    #[serde(default)]
    pub server: ServerConfig,
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Weather provider (OpenWeatherMap) settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// OpenWeatherMap API key
    pub api_key: Option<String>,
    /// Base URL for the provider API
    #[serde(default = "default_provider_base_url")]
    pub base_url: String,
    /// Request timeout in seconds
    #[serde(default = "default_provider_timeout")]
    pub timeout_seconds: u32,
    /// Outbound request budget per minute
    #[serde(default = "default_requests_per_minute")]
    pub requests_per_minute: u32,
    /// Maximum number of days fetched by one history call
    #[serde(default = "default_max_history_days")]
    pub max_history_days: u32,
    /// Concurrent day requests during a history fetch
    #[serde(default = "default_history_concurrency")]
    pub history_concurrency: u32,
}

/// Database settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// sqlx connection URL
    #[serde(default = "default_database_url")]
    pub url: String,
    /// Maximum pool size
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// Seconds to wait for a free connection
    #[serde(default = "default_acquire_timeout")]
    pub acquire_timeout_secs: u64,
}

/// Reuse policy for persisted readings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// How long a stored current reading is served instead of refetching
    #[serde(default = "default_current_ttl")]
    pub current_ttl_minutes: u32,
}

/// HTTP server settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind host
    #[serde(default = "default_server_host")]
    pub host: String,
    /// Bind port
    #[serde(default = "default_server_port")]
    pub port: u16,
    /// Per-request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u32,
}

/// Logging configuration settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Log format (pretty or json)
    #[serde(default = "default_log_format")]
    pub format: String,
}

// Default value functions
fn default_provider_base_url() -> String {
    "https://api.openweathermap.org".to_string()
}

fn default_provider_timeout() -> u32 {
    30
}

fn default_requests_per_minute() -> u32 {
    60
}

fn default_max_history_days() -> u32 {
    240
}

fn default_history_concurrency() -> u32 {
    10
}

fn default_database_url() -> String {
    "sqlite://weatherdash.db?mode=rwc".to_string()
}

fn default_max_connections() -> u32 {
    5
}

fn default_acquire_timeout() -> u64 {
    10
}

fn default_current_ttl() -> u32 {
    720
}

fn default_server_host() -> String {
    "0.0.0.0".to_string()
}

fn default_server_port() -> u16 {
    8501
}

fn default_request_timeout() -> u32 {
    120
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: default_provider_base_url(),
            timeout_seconds: default_provider_timeout(),
            requests_per_minute: default_requests_per_minute(),
            max_history_days: default_max_history_days(),
            history_concurrency: default_history_concurrency(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_database_url(),
            max_connections: default_max_connections(),
            acquire_timeout_secs: default_acquire_timeout(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            current_ttl_minutes: default_current_ttl(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_server_host(),
            port: default_server_port(),
            request_timeout_seconds: default_request_timeout(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Default for WeatherDashConfig {
    fn default() -> Self {
        Self {
            provider: ProviderConfig::default(),
            database: DatabaseConfig::default(),
            cache: CacheConfig::default(),
            server: ServerConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl WeatherDashConfig {
    /// Load configuration from file and environment variables
    pub fn load() -> Result<Self> {
        let path = std::env::var_os(CONFIG_PATH_ENV).map(PathBuf::from);
        Self::load_from_path(path)
    }

    /// Load configuration from specified path
    pub fn load_from_path(config_path: Option<PathBuf>) -> Result<Self> {
        let mut builder = Config::builder();

        let config_file = config_path.or_else(Self::get_config_path);

        if let Some(config_file) = config_file.filter(|path| path.exists()) {
            tracing::debug!("Using config from: {}", config_file.display());
            builder = builder.add_source(
                File::from(config_file)
                    .required(false)
                    .format(config::FileFormat::Toml),
            );
        }

        // Environment overrides: WEATHERDASH__PROVIDER__API_KEY and friends
        builder = builder.add_source(
            Environment::with_prefix("WEATHERDASH")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let settings = builder
            .build()
            .with_context(|| "Failed to build configuration")?;

        let mut config: WeatherDashConfig = settings
            .try_deserialize()
            .with_context(|| "Failed to deserialize configuration")?;

        config.apply_env_overrides();
        config.apply_defaults();
        config.validate()?;

        Ok(config)
    }

    /// Get the default configuration file path
    ///
    /// `config.toml` in the working directory wins over the per-user file.
    #[must_use]
    pub fn get_config_path() -> Option<PathBuf> {
        let local = PathBuf::from("config.toml");
        if local.exists() {
            return Some(local);
        }
        dirs::config_dir().map(|dir| dir.join("weatherdash").join("config.toml"))
    }

    /// Apply the conventional `.env` variable names on top of the layered config
    pub fn apply_env_overrides(&mut self) {
        if let Ok(api_key) = std::env::var("OPENWEATHER_API_KEY") {
            if !api_key.trim().is_empty() {
                self.provider.api_key = Some(api_key.trim().to_string());
            }
        }
        if let Ok(url) = std::env::var("DATABASE_URL") {
            if !url.trim().is_empty() {
                self.database.url = url.trim().to_string();
            }
        }
    }

    /// Apply default values to missing configuration fields
    pub fn apply_defaults(&mut self) {
        if self.provider.base_url.is_empty() {
            self.provider.base_url = default_provider_base_url();
        }
        if self.provider.timeout_seconds == 0 {
            self.provider.timeout_seconds = default_provider_timeout();
        }
        if self.provider.requests_per_minute == 0 {
            self.provider.requests_per_minute = default_requests_per_minute();
        }
        if self.provider.max_history_days == 0 {
            self.provider.max_history_days = default_max_history_days();
        }
        if self.provider.history_concurrency == 0 {
            self.provider.history_concurrency = default_history_concurrency();
        }
        if self.database.url.is_empty() {
            self.database.url = default_database_url();
        }
        if self.database.max_connections == 0 {
            self.database.max_connections = default_max_connections();
        }
        if self.cache.current_ttl_minutes == 0 {
            self.cache.current_ttl_minutes = default_current_ttl();
        }
        if self.server.host.is_empty() {
            self.server.host = default_server_host();
        }
        if self.server.request_timeout_seconds == 0 {
            self.server.request_timeout_seconds = default_request_timeout();
        }
        if self.logging.level.is_empty() {
            self.logging.level = default_log_level();
        }
        if self.logging.format.is_empty() {
            self.logging.format = default_log_format();
        }
    }

    /// Validate all configuration settings
    pub fn validate(&self) -> Result<()> {
        self.validate_api_keys()?;
        self.validate_numeric_ranges()?;
        self.validate_string_values()?;
        Ok(())
    }

    /// Validate API keys and credentials
    pub fn validate_api_keys(&self) -> Result<()> {
        let Some(api_key) = &self.provider.api_key else {
            return Err(WeatherError::config(
                "OpenWeatherMap API key is required. Set OPENWEATHER_API_KEY in your environment or .env file.",
            )
            .into());
        };

        if api_key.is_empty() {
            return Err(WeatherError::config("OpenWeatherMap API key cannot be empty.").into());
        }

        if api_key.len() < 8 {
            return Err(WeatherError::config(
                "OpenWeatherMap API key appears to be invalid (too short). Please check your API key.",
            )
            .into());
        }

        if api_key.len() > 100 {
            return Err(WeatherError::config(
                "OpenWeatherMap API key appears to be invalid (too long). Please check your API key.",
            )
            .into());
        }

        Ok(())
    }

    /// Validate numeric configuration ranges
    fn validate_numeric_ranges(&self) -> Result<()> {
        if self.provider.timeout_seconds > 300 {
            return Err(
                WeatherError::config("Provider timeout cannot exceed 300 seconds").into(),
            );
        }

        if self.provider.requests_per_minute > 3000 {
            return Err(WeatherError::config(
                "Provider requests per minute cannot exceed 3000",
            )
            .into());
        }

        if self.provider.max_history_days > 1000 {
            return Err(
                WeatherError::config("History range cannot exceed 1000 days").into(),
            );
        }

        if self.provider.history_concurrency > 64 {
            return Err(
                WeatherError::config("History concurrency cannot exceed 64").into(),
            );
        }

        if self.database.max_connections > 100 {
            return Err(
                WeatherError::config("Database pool cannot exceed 100 connections").into(),
            );
        }

        if self.cache.current_ttl_minutes > 10_080 {
            return Err(WeatherError::config(
                "Current reading TTL cannot exceed 10080 minutes (1 week)",
            )
            .into());
        }

        Ok(())
    }

    /// Validate string configuration values
    fn validate_string_values(&self) -> Result<()> {
        let valid_log_levels = ["error", "warn", "info", "debug", "trace"];
        if !valid_log_levels.contains(&self.logging.level.as_str()) {
            return Err(WeatherError::config(format!(
                "Invalid log level '{}'. Must be one of: {}",
                self.logging.level,
                valid_log_levels.join(", ")
            ))
            .into());
        }

        let valid_log_formats = ["pretty", "json"];
        if !valid_log_formats.contains(&self.logging.format.as_str()) {
            return Err(WeatherError::config(format!(
                "Invalid log format '{}'. Must be one of: {}",
                self.logging.format,
                valid_log_formats.join(", ")
            ))
            .into());
        }

        if !self.provider.base_url.starts_with("http://")
            && !self.provider.base_url.starts_with("https://")
        {
            return Err(WeatherError::config(
                "Provider base URL must be a valid HTTP or HTTPS URL",
            )
            .into());
        }

        if !self.database.url.starts_with("sqlite:") {
            return Err(WeatherError::config(
                "Database URL must be a sqlite: connection string",
            )
            .into());
        }

        Ok(())
    }
}

impl ServerConfig {
    /// Address the HTTP server binds to
    #[must_use]
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
