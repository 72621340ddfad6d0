//! Configuration loading for the Aula client.
//!
//! All fields are required unless explicitly marked optional. No defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use aula_cache::{CacheConfig, RetryPolicy};
use aula_core::Role;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AulaConfig {
    pub api_base_url: String,
    pub request_timeout_ms: u64,
    pub auth: AuthConfig,
    pub persistence_path: PathBuf,
    pub cache: CacheSettings,
    pub retry: RetryConfig,
    pub log: LogConfig,
}

/// Static session used by the command-line client.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AuthConfig {
    pub access_token: Option<String>,
    pub user_id: uuid::Uuid,
    pub role: Role,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CacheSettings {
    pub default_stale_time_ms: u64,
    pub default_gc_time_ms: u64,
    pub gc_interval_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RetryConfig {
    pub read_retries: u32,
    pub initial_ms: u64,
    pub max_ms: u64,
    pub multiplier: f64,
    pub jitter_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LogConfig {
    /// `EnvFilter` directives; `RUST_LOG` takes precedence.
    pub filter: String,
    pub json: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing configuration file path (use --config or AULA_CONFIG)")]
    MissingConfigPath,
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Invalid config value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

impl AulaConfig {
    pub fn load() -> Result<Self, ConfigError> {
        let path = config_path_from_args().or_else(config_path_from_env);
        let path = path.ok_or(ConfigError::MissingConfigPath)?;
        let config = Self::from_path(&path)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        let config: AulaConfig = toml::from_str(contents)?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let base = self.api_base_url.trim();
        if base.is_empty() {
            return Err(invalid("api_base_url", "must not be empty"));
        }
        if !(base.starts_with("http://") || base.starts_with("https://")) {
            return Err(invalid("api_base_url", "must start with http:// or https://"));
        }
        if self.request_timeout_ms == 0 {
            return Err(invalid("request_timeout_ms", "must be > 0"));
        }
        if let Some(token) = &self.auth.access_token {
            if token.trim().is_empty() {
                return Err(invalid("auth.access_token", "must not be blank when set"));
            }
        }
        if self.auth.user_id.is_nil() {
            return Err(invalid("auth.user_id", "must not be the nil uuid"));
        }
        if self.persistence_path.as_os_str().is_empty() {
            return Err(invalid("persistence_path", "must not be empty"));
        }
        if self.cache.default_gc_time_ms < self.cache.default_stale_time_ms {
            return Err(invalid("cache.default_gc_time_ms", "must be >= default_stale_time_ms"));
        }
        if self.cache.gc_interval_ms == 0 {
            return Err(invalid("cache.gc_interval_ms", "must be > 0"));
        }
        if self.retry.read_retries > 5 {
            return Err(invalid("retry.read_retries", "must be <= 5"));
        }
        if self.retry.initial_ms == 0 {
            return Err(invalid("retry.initial_ms", "must be > 0"));
        }
        if self.retry.max_ms < self.retry.initial_ms {
            return Err(invalid("retry.max_ms", "must be >= initial_ms"));
        }
        if self.retry.multiplier < 1.0 {
            return Err(invalid("retry.multiplier", "must be >= 1.0"));
        }
        if self.log.filter.trim().is_empty() {
            return Err(invalid("log.filter", "must not be empty"));
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn gc_interval(&self) -> Duration {
        Duration::from_millis(self.cache.gc_interval_ms)
    }

    pub fn read_retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.retry.read_retries,
            initial_delay: Duration::from_millis(self.retry.initial_ms),
            max_delay: Duration::from_millis(self.retry.max_ms),
            multiplier: self.retry.multiplier,
            jitter: Duration::from_millis(self.retry.jitter_ms),
        }
    }

    pub fn cache_config(&self) -> CacheConfig {
        CacheConfig::new()
            .with_stale_time(Duration::from_millis(self.cache.default_stale_time_ms))
            .with_gc_time(Duration::from_millis(self.cache.default_gc_time_ms))
            .with_read_retry(self.read_retry_policy())
    }
}

fn invalid(field: &'static str, reason: &str) -> ConfigError {
    ConfigError::InvalidValue {
        field,
        reason: reason.to_string(),
    }
}

fn config_path_from_env() -> Option<PathBuf> {
    std::env::var("AULA_CONFIG").ok().map(PathBuf::from)
}

fn config_path_from_args() -> Option<PathBuf> {
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        if arg == "--config" {
            return args.next().map(PathBuf::from);
        }
    }
    None
}
