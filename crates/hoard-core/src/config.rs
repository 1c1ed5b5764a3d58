//! Configuration for hoard
//!
//! Mirrors the `cache.*` / `logging.*` property tree:
//!
//! ```toml
//! [cache]
//! enabled = true
//!
//! [cache.refresh]
//! enabled = true
//! intervalMinutes = 60
//! delayMinutes = 60
//!
//! [logging]
//! enabled = true
//! level = "INFO"
//! ```

use crate::error::HoardError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use tracing::level_filters::LevelFilter;

/// Root configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HoardConfig {
    pub cache: CacheConfig,
    pub logging: LoggingConfig,
}

/// Cache behaviour
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CacheConfig {
    /// Gates all preload and refresh activity
    pub enabled: bool,
    pub refresh: RefreshConfig,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            refresh: RefreshConfig::default(),
        }
    }
}

/// Periodic refresh settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RefreshConfig {
    pub enabled: bool,
    /// Fixed interval between refresh cycles
    pub interval_minutes: u64,
    /// Initial delay before the first cycle
    pub delay_minutes: u64,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            interval_minutes: 60,
            delay_minutes: 60,
        }
    }
}

/// Upper bound for `intervalMinutes` and `delayMinutes` (one year)
pub const MAX_REFRESH_MINUTES: u64 = 365 * 24 * 60;

impl RefreshConfig {
    pub fn interval(&self) -> Duration {
        minutes(self.interval_minutes)
    }

    pub fn delay(&self) -> Duration {
        minutes(self.delay_minutes)
    }
}

fn minutes(value: u64) -> Duration {
    Duration::from_secs(value.saturating_mul(60))
}

/// Log level, ordered TRACE < DEBUG < INFO < WARN < ERROR
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl FromStr for LogLevel {
    type Err = HoardError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "TRACE" => Ok(LogLevel::Trace),
            "DEBUG" => Ok(LogLevel::Debug),
            "INFO" => Ok(LogLevel::Info),
            "WARN" => Ok(LogLevel::Warn),
            "ERROR" => Ok(LogLevel::Error),
            other => Err(HoardError::InvalidConfig {
                message: format!("unknown log level '{}'", other),
            }),
        }
    }
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => LevelFilter::TRACE,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Error => LevelFilter::ERROR,
        }
    }
}

/// Logging settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub enabled: bool,
    pub level: LogLevel,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            level: LogLevel::Info,
        }
    }
}

impl LoggingConfig {
    /// A message at `level` is emitted only if logging is on and `level >= self.level`
    pub fn allows(&self, level: LogLevel) -> bool {
        self.enabled && level >= self.level
    }

    /// Max level for a tracing subscriber (`OFF` when logging is disabled)
    pub fn level_filter(&self) -> LevelFilter {
        if self.enabled {
            self.level.into()
        } else {
            LevelFilter::OFF
        }
    }
}

impl HoardConfig {
    /// Parse from a TOML document
    pub fn from_toml_str(content: &str) -> Result<Self, HoardError> {
        Self::parse(content, PathBuf::from("<inline>"))
    }

    /// Load from a TOML file; a missing file yields defaults
    pub fn load(path: &Path) -> Result<Self, HoardError> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No config file, using defaults");
                return Ok(Self::default());
            }
            Err(source) => {
                return Err(HoardError::ConfigRead {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };

        Self::parse(&content, path.to_path_buf())
    }

    fn parse(content: &str, path: PathBuf) -> Result<Self, HoardError> {
        let config: Self = toml::from_str(content).map_err(|source| HoardError::ConfigParse {
            path,
            message: source.message().to_string(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `HOARD_*` environment overrides
    ///
    /// - `HOARD_CACHE_ENABLED`
    /// - `HOARD_REFRESH_ENABLED`
    /// - `HOARD_REFRESH_INTERVAL_MINUTES`
    /// - `HOARD_REFRESH_DELAY_MINUTES`
    /// - `HOARD_LOG_ENABLED`
    /// - `HOARD_LOG_LEVEL`
    pub fn apply_env(&mut self) -> Result<(), HoardError> {
        self.apply_overrides(|name| std::env::var(name).ok())
    }

    fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), HoardError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("HOARD_CACHE_ENABLED") {
            self.cache.enabled = parse_bool("HOARD_CACHE_ENABLED", &v)?;
        }
        if let Some(v) = lookup("HOARD_REFRESH_ENABLED") {
            self.cache.refresh.enabled = parse_bool("HOARD_REFRESH_ENABLED", &v)?;
        }
        if let Some(v) = lookup("HOARD_REFRESH_INTERVAL_MINUTES") {
            self.cache.refresh.interval_minutes = parse_u64("HOARD_REFRESH_INTERVAL_MINUTES", &v)?;
        }
        if let Some(v) = lookup("HOARD_REFRESH_DELAY_MINUTES") {
            self.cache.refresh.delay_minutes = parse_u64("HOARD_REFRESH_DELAY_MINUTES", &v)?;
        }
        if let Some(v) = lookup("HOARD_LOG_ENABLED") {
            self.logging.enabled = parse_bool("HOARD_LOG_ENABLED", &v)?;
        }
        if let Some(v) = lookup("HOARD_LOG_LEVEL") {
            self.logging.level = v.parse()?;
        }
        self.validate()
    }

    pub fn validate(&self) -> Result<(), HoardError> {
        let refresh = &self.cache.refresh;
        if refresh.enabled && refresh.interval_minutes == 0 {
            return Err(HoardError::InvalidConfig {
                message: "cache.refresh.intervalMinutes must be greater than 0".to_string(),
            });
        }
        for (key, value) in [
            ("cache.refresh.intervalMinutes", refresh.interval_minutes),
            ("cache.refresh.delayMinutes", refresh.delay_minutes),
        ] {
            if value > MAX_REFRESH_MINUTES {
                return Err(HoardError::InvalidConfig {
                    message: format!("{} must be at most {}, got {}", key, MAX_REFRESH_MINUTES, value),
                });
            }
        }
        Ok(())
    }
}

fn parse_bool(name: &str, value: &str) -> Result<bool, HoardError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(HoardError::InvalidConfig {
            message: format!("{} must be a boolean, got '{}'", name, value),
        }),
    }
}

fn parse_u64(name: &str, value: &str) -> Result<u64, HoardError> {
    value.trim().parse().map_err(|_| HoardError::InvalidConfig {
        message: format!("{} must be a non-negative integer, got '{}'", name, value),
    })
}
