use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub api: ApiConfig,
    #[serde(default)]
    pub monitor: MonitorConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    /// REST base URL for the battle-log API
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Bearer token for the API (BATTLEWATCH__API__TOKEN)
    pub token: String,
    /// Request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_base_url() -> String {
    "https://api.clashroyale.com/v1".to_string()
}

fn default_request_timeout() -> u64 {
    30
}

#[derive(Debug, Clone, Deserialize)]
pub struct MonitorConfig {
    /// Seconds between polling cycles for one subject
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
    /// Shared outbound request budget: sustained requests per second
    #[serde(default = "default_requests_per_sec")]
    pub requests_per_sec: f64,
    /// Shared outbound request budget: burst capacity
    #[serde(default = "default_burst")]
    pub burst: u32,
    /// Base delay for exponential backoff (seconds)
    #[serde(default = "default_backoff_base")]
    pub backoff_base_secs: u64,
    /// Cap for exponential backoff (seconds)
    #[serde(default = "default_backoff_cap")]
    pub backoff_cap_secs: u64,
    /// Consecutive transient failures before a subject is reported unreachable
    #[serde(default = "default_max_transient_failures")]
    pub max_transient_failures: u32,
    /// Consecutive state-store failures before escalating to alert level
    #[serde(default = "default_max_store_failures")]
    pub max_store_failures: u32,
    /// Encounters required before an opponent counts as a rival
    #[serde(default = "default_min_rival_encounters")]
    pub min_rival_encounters: u64,
    /// Refresh the subject profile (name, arena) every N cycles; 0 disables
    #[serde(default = "default_profile_refresh_cycles")]
    pub profile_refresh_cycles: u64,
}

fn default_poll_interval() -> u64 {
    60
}

fn default_requests_per_sec() -> f64 {
    2.0
}

fn default_burst() -> u32 {
    4
}

fn default_backoff_base() -> u64 {
    5
}

fn default_backoff_cap() -> u64 {
    300
}

fn default_max_transient_failures() -> u32 {
    5
}

fn default_max_store_failures() -> u32 {
    3
}

fn default_min_rival_encounters() -> u64 {
    2
}

fn default_profile_refresh_cycles() -> u64 {
    5
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval(),
            requests_per_sec: default_requests_per_sec(),
            burst: default_burst(),
            backoff_base_secs: default_backoff_base(),
            backoff_cap_secs: default_backoff_cap(),
            max_transient_failures: default_max_transient_failures(),
            max_store_failures: default_max_store_failures(),
            min_rival_encounters: default_min_rival_encounters(),
            profile_refresh_cycles: default_profile_refresh_cycles(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    /// Directory holding one snapshot file per monitored subject
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("battlewatch")
        .join("monitoring")
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Enable JSON formatted logs
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl AppConfig {
    /// Load configuration from files and environment
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from("config")
    }

    /// Load configuration from a specific directory
    pub fn load_from<P: AsRef<Path>>(config_dir: P) -> Result<Self, ConfigError> {
        let config_dir = config_dir.as_ref();

        let builder = Config::builder()
            // Start with default values
            .set_default("api.base_url", default_base_url())?
            .set_default("api.request_timeout_secs", 30)?
            .set_default("logging.level", "info")?
            .set_default("logging.json", false)?
            // Load default config file
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            // Load environment-specific config (e.g., config/production.toml)
            .add_source(
                File::from(config_dir.join(
                    std::env::var("BATTLEWATCH_ENV").unwrap_or_else(|_| "development".to_string()),
                ))
                .required(false),
            )
            // Override with environment variables (BATTLEWATCH__API__TOKEN, etc.)
            .add_source(
                Environment::with_prefix("BATTLEWATCH")
                    .separator("__")
                    .try_parsing(true),
            );

        builder.build()?.try_deserialize()
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.api.token.trim().is_empty() {
            errors.push("api.token must be set".to_string());
        }

        if self.monitor.poll_interval_secs == 0 {
            errors.push("monitor.poll_interval_secs must be positive".to_string());
        }

        if self.monitor.requests_per_sec <= 0.0 {
            errors.push("monitor.requests_per_sec must be positive".to_string());
        }

        if self.monitor.burst == 0 {
            errors.push("monitor.burst must be at least 1".to_string());
        }

        if self.monitor.backoff_base_secs == 0 {
            errors.push("monitor.backoff_base_secs must be positive".to_string());
        }

        if self.monitor.backoff_cap_secs < self.monitor.backoff_base_secs {
            errors.push("monitor.backoff_cap_secs must be >= backoff_base_secs".to_string());
        }

        if self.monitor.min_rival_encounters < 2 {
            errors.push("monitor.min_rival_encounters must be at least 2".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
