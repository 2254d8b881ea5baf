//! Managed object configuration.
//!
//! Defaults can be overridden in code (`with_*` builders), from a JSON file,
//! or from environment variables:
//!
//! - `FILEDAO_AUTO_SAVE`: `true`/`false` (also `1`/`0`, `yes`/`no`)
//! - `FILEDAO_BACKUP_COUNT`: number of backup generations to keep
//! - `FILEDAO_INITIAL_WRITE_FAILURE`: `continue` or `abort`

use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{PersistenceError, Result};
use crate::handlers::ExceptionHandlers;
use crate::lifecycle::DEFAULT_AUTO_SAVE_ENABLED;

/// Environment variable overriding [`DaoConfig::auto_save_enabled`].
pub const AUTO_SAVE_ENV: &str = "FILEDAO_AUTO_SAVE";

/// Environment variable overriding [`DaoConfig::backup_count`].
pub const BACKUP_COUNT_ENV: &str = "FILEDAO_BACKUP_COUNT";

/// Environment variable overriding [`DaoConfig::initial_write_failure`].
pub const INITIAL_WRITE_FAILURE_ENV: &str = "FILEDAO_INITIAL_WRITE_FAILURE";

/// By default the last 3 generations are kept.
pub const DEFAULT_BACKUP_COUNT: usize = 3;

/// Upper bound for the backup count.
pub const MAX_BACKUP_COUNT: usize = 999;

/// What to do when the write triggered by the initial read fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InitialWriteFailure {
    /// Log a warning and keep running with pending changes.
    #[default]
    Continue,
    /// Fail construction.
    Abort,
}

impl FromStr for InitialWriteFailure {
    type Err = PersistenceError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "continue" => Ok(InitialWriteFailure::Continue),
            "abort" => Ok(InitialWriteFailure::Abort),
            other => Err(PersistenceError::Config(format!(
                "unknown initial write failure policy: {}",
                other
            ))),
        }
    }
}

impl fmt::Display for InitialWriteFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InitialWriteFailure::Continue => f.write_str("continue"),
            InitialWriteFailure::Abort => f.write_str("abort"),
        }
    }
}

/// Configuration of a managed object.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DaoConfig {
    /// Whether changes are written immediately.
    pub auto_save_enabled: bool,
    /// Number of backup generations kept by content objects.
    pub backup_count: usize,
    /// Policy for a failed write during the initial read.
    pub initial_write_failure: InitialWriteFailure,
    /// Registry receiving read and write failures.
    #[serde(skip, default = "ExceptionHandlers::process_wide")]
    pub handlers: Arc<ExceptionHandlers>,
}

impl Default for DaoConfig {
    fn default() -> Self {
        Self {
            auto_save_enabled: DEFAULT_AUTO_SAVE_ENABLED,
            backup_count: DEFAULT_BACKUP_COUNT,
            initial_write_failure: InitialWriteFailure::default(),
            handlers: ExceptionHandlers::process_wide(),
        }
    }
}

impl DaoConfig {
    /// Creates a config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets whether auto-save is initially enabled.
    pub fn with_auto_save(mut self, enabled: bool) -> Self {
        self.auto_save_enabled = enabled;
        self
    }

    /// Sets the number of backup generations.
    pub fn with_backup_count(mut self, count: usize) -> Self {
        self.backup_count = count;
        self
    }

    /// Sets the initial write failure policy.
    pub fn with_initial_write_failure(mut self, policy: InitialWriteFailure) -> Self {
        self.initial_write_failure = policy;
        self
    }

    /// Sets the exception handler registry.
    pub fn with_handlers(mut self, handlers: Arc<ExceptionHandlers>) -> Self {
        self.handlers = handlers;
        self
    }

    /// Checks the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.backup_count > MAX_BACKUP_COUNT {
            return Err(PersistenceError::Config(format!(
                "backup count {} exceeds the maximum of {}",
                self.backup_count, MAX_BACKUP_COUNT
            )));
        }
        Ok(())
    }

    /// Parses a JSON config. Missing fields take their default.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: DaoConfig = serde_json::from_str(json)
            .map_err(|e| PersistenceError::Config(format!("invalid config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Reads a JSON config file.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path).map_err(|e| {
            PersistenceError::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_json(&json)
    }

    /// Default config with environment overrides applied.
    pub fn from_env() -> Result<Self> {
        Self::default().with_overrides(|key| std::env::var(key).ok())
    }

    /// Applies overrides looked up by environment variable name.
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        if let Some(value) = lookup(AUTO_SAVE_ENV) {
            self.auto_save_enabled = parse_bool(AUTO_SAVE_ENV, &value)?;
        }
        if let Some(value) = lookup(BACKUP_COUNT_ENV) {
            self.backup_count = value.trim().parse().map_err(|_| {
                PersistenceError::Config(format!(
                    "{} must be a non-negative number: {}",
                    BACKUP_COUNT_ENV, value
                ))
            })?;
        }
        if let Some(value) = lookup(INITIAL_WRITE_FAILURE_ENV) {
            self.initial_write_failure = value.parse()?;
        }
        self.validate()?;
        Ok(self)
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(PersistenceError::Config(format!(
            "{} must be a boolean: {}",
            key, value
        ))),
    }
}
