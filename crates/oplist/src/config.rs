#![forbid(unsafe_code)]

//! History size configuration.
//!
//! The maximum number of operations kept in a history is a process-wide
//! setting shared by every [`OperationList`](crate::OperationList): changing
//! it with [`set_maximum_size`] affects all open documents at their next
//! registration. An individual list may override it through
//! [`OperationListConfig::max_size`].
//!
//! # Loading
//!
//! ```toml
//! # oplist.toml
//! max_size = 250
//! ```
//!
//! ```rust,ignore
//! let config = OperationListConfig::from_toml_file("oplist.toml")?;
//! config.apply_globally()?;
//! ```

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Maximum history length used until [`set_maximum_size`] is called.
pub const DEFAULT_MAXIMUM_SIZE: usize = 500;

static MAXIMUM_SIZE: AtomicUsize = AtomicUsize::new(DEFAULT_MAXIMUM_SIZE);

/// Set the process-wide maximum history length.
pub fn set_maximum_size(max: usize) -> Result<(), ConfigError> {
    if max == 0 {
        return Err(ConfigError::ZeroMaximumSize);
    }
    MAXIMUM_SIZE.store(max, Ordering::Relaxed);
    tracing::debug!(target: "oplist.history", max_size = max, "maximum history size set");
    Ok(())
}

/// Current process-wide maximum history length.
#[must_use]
pub fn maximum_size() -> usize {
    MAXIMUM_SIZE.load(Ordering::Relaxed)
}

/// Errors raised while building or loading a configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("maximum history size must be greater than zero")]
    ZeroMaximumSize,

    #[error("failed to read configuration: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid TOML configuration: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("invalid JSON configuration: {0}")]
    Json(#[from] serde_json::Error),
}

/// Per-list configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OperationListConfig {
    /// History length for this list. `None` follows the process-wide value.
    pub max_size: Option<usize>,
}

impl OperationListConfig {
    /// Configuration that follows the process-wide maximum.
    #[must_use]
    pub fn process_wide() -> Self {
        Self::default()
    }

    /// Override the maximum history length for one list.
    #[must_use]
    pub fn with_max_size(mut self, max: usize) -> Self {
        self.max_size = Some(max);
        self
    }

    /// Create an unlimited configuration (for testing).
    #[must_use]
    pub fn unlimited() -> Self {
        Self {
            max_size: Some(usize::MAX),
        }
    }

    /// Maximum length in effect right now.
    #[must_use]
    pub fn effective_max_size(&self) -> usize {
        self.max_size.unwrap_or_else(maximum_size).max(1)
    }

    /// Load from a TOML string.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(s)?;
        config.check()
    }

    /// Load from a TOML file on disk.
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&content)
    }

    /// Load from a JSON string.
    pub fn from_json_str(s: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(s)?;
        config.check()
    }

    /// Validate all parameters are within acceptable ranges.
    ///
    /// Returns a list of validation errors. An empty list means the config
    /// is valid.
    #[must_use]
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        if self.max_size == Some(0) {
            errors.push("max_size must be greater than zero".to_string());
        }
        errors
    }

    /// Install this configuration's `max_size` as the process-wide value.
    ///
    /// A configuration without `max_size` leaves the global untouched.
    pub fn apply_globally(&self) -> Result<(), ConfigError> {
        match self.max_size {
            Some(max) => set_maximum_size(max),
            None => Ok(()),
        }
    }

    fn check(self) -> Result<Self, ConfigError> {
        if self.max_size == Some(0) {
            return Err(ConfigError::ZeroMaximumSize);
        }
        Ok(self)
    }
}
