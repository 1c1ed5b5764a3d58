//! Error types for hoard-core
//!
//! Provides the error hierarchy (thiserror) and the load report used for
//! graceful degradation during cache warm-up.

use std::path::PathBuf;
use thiserror::Error;

/// Core error type for hoard operations
#[derive(Error, Debug)]
pub enum HoardError {
    // ===================
    // Config Errors
    // ===================
    #[error("Failed to read config file: {path}")]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config in {path}: {message}")]
    ConfigParse {
        path: PathBuf,
        message: String,
        #[source]
        source: toml::de::Error,
    },

    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    // ===================
    // Registry Errors
    // ===================
    #[error("Entity type not registered: {entity}")]
    MissingRegistration { entity: &'static str },

    #[error("No identifier accessor registered for entity: {entity}")]
    MissingIdAccessor { entity: &'static str },

    // ===================
    // Load / Refresh Errors
    // ===================
    #[error("Failed to fetch records for {entity}: {reason}")]
    Fetch { entity: &'static str, reason: String },

    #[error("Loading {entity} panicked: {reason}")]
    Panicked { entity: &'static str, reason: String },

    #[error("Refresh scheduler is already running")]
    SchedulerAlreadyRunning,
}

impl HoardError {
    /// Wrap a collaborator fetch error, keeping the full context chain
    pub fn fetch(entity: &'static str, error: &anyhow::Error) -> Self {
        HoardError::Fetch {
            entity,
            reason: format!("{:#}", error),
        }
    }
}

/// Severity level for errors during load
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    /// Entity skipped for a recoverable reason (e.g. no identifier accessor)
    Warning,
    /// Entity skipped entirely
    Error,
}

/// Individual error entry in a load report
#[derive(Debug, Clone)]
pub struct LoadError {
    pub entity: String,
    pub message: String,
    pub severity: ErrorSeverity,
}

impl LoadError {
    pub fn warning(entity: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            entity: entity.into(),
            message: message.into(),
            severity: ErrorSeverity::Warning,
        }
    }

    pub fn error(entity: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            entity: entity.into(),
            message: message.into(),
            severity: ErrorSeverity::Error,
        }
    }

    /// Classify a HoardError: missing registrations/accessors are warnings, everything else an error
    pub fn from_hoard_error(entity: impl Into<String>, error: &HoardError) -> Self {
        match error {
            HoardError::MissingIdAccessor { .. } | HoardError::MissingRegistration { .. } => {
                Self::warning(entity, error.to_string())
            }
            _ => Self::error(entity, error.to_string()),
        }
    }
}

/// Report of a cache warm-up pass
///
/// Tracks partial failures instead of failing the whole initialization.
#[derive(Debug, Default)]
pub struct LoadReport {
    pub errors: Vec<LoadError>,
    /// False when `cache.enabled` gated the load off
    pub enabled: bool,
    pub entities_processed: usize,
    pub records_cached: usize,
    pub columns_cached: usize,
}

impl LoadReport {
    pub fn new() -> Self {
        Self {
            enabled: true,
            ..Self::default()
        }
    }

    /// Report for a load skipped by configuration
    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn add_error(&mut self, error: LoadError) {
        self.errors.push(error);
    }

    /// Returns true if there are any errors (including warnings)
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// Returns (warnings, errors)
    pub fn error_count(&self) -> (usize, usize) {
        let warnings = self
            .errors
            .iter()
            .filter(|e| e.severity == ErrorSeverity::Warning)
            .count();
        (warnings, self.errors.len() - warnings)
    }
}
