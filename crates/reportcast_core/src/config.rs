//! Proxy configuration recognised by report sessions.
//!
//! Where the options come from is the host's business; this module only
//! defines their shape, their defaults, and how to check them.

use crate::error::CoreError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Configuration errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// A glob pattern could not be compiled
    #[error("Invalid pattern {pattern:?} in {field}: {reason}")]
    InvalidPattern {
        /// Option holding the pattern
        field: &'static str,
        /// The pattern text
        pattern: String,
        /// Compiler message
        reason: String,
    },

    /// The document could not be parsed
    #[error("Malformed config: {0}")]
    Malformed(String),

    /// The file could not be read
    #[error("Could not read config {path}: {reason}")]
    Unreadable {
        /// File path
        path: String,
        /// IO message
        reason: String,
    },
}

impl From<ConfigError> for CoreError {
    fn from(err: ConfigError) -> Self {
        let field = match &err {
            ConfigError::InvalidPattern { field, .. } => (*field).to_string(),
            ConfigError::Malformed(_) | ConfigError::Unreadable { .. } => "config".to_string(),
        };
        CoreError::InvalidConfig {
            field,
            reason: err.to_string(),
        }
    }
}

/// Options controlling a report session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProxyConfig {
    /// Watch the source directory and re-run the report on edits
    pub watch_file_system: bool,
    /// Prefer watching the whole tree below the source directory
    pub watch_updates_recursively: bool,
    /// Paths that may trigger a re-run
    pub watch_patterns: Vec<String>,
    /// Paths that never trigger a re-run
    pub ignore_patterns: Vec<String>,
    /// Seconds after creation before an unattended session may be torn down
    pub grace_period_secs: u64,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            watch_file_system: true,
            watch_updates_recursively: true,
            watch_patterns: vec!["*.py".to_string()],
            ignore_patterns: vec![
                "*/.*".to_string(),
                "*/anaconda3/*".to_string(),
                "*/anaconda2/*".to_string(),
                "*/miniconda3/*".to_string(),
                "*/miniconda2/*".to_string(),
                "*/*-env/*".to_string(),
            ],
            grace_period_secs: 60,
        }
    }
}

impl ProxyConfig {
    /// Parse from a JSON document; missing keys take their defaults
    ///
    /// # Errors
    ///
    /// Returns error if the document is not valid JSON for this shape
    pub fn from_json_str(text: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(text).map_err(|e| ConfigError::Malformed(e.to_string()))
    }

    /// Read and parse a JSON file
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read or parsed
    pub fn from_json_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|e| ConfigError::Unreadable {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Self::from_json_str(&text)
    }

    /// Disable file watching
    #[must_use]
    pub fn without_watching(mut self) -> Self {
        self.watch_file_system = false;
        self
    }

    /// Set the preferred watch mode
    #[must_use]
    pub fn with_recursive(mut self, recursive: bool) -> Self {
        self.watch_updates_recursively = recursive;
        self
    }

    /// Set allow-list patterns
    #[must_use]
    pub fn with_watch_patterns(mut self, patterns: Vec<String>) -> Self {
        self.watch_patterns = patterns;
        self
    }

    /// Set deny-list patterns
    #[must_use]
    pub fn with_ignore_patterns(mut self, patterns: Vec<String>) -> Self {
        self.ignore_patterns = patterns;
        self
    }

    /// Grace period as a duration
    #[must_use]
    pub fn grace_period(&self) -> Duration {
        Duration::from_secs(self.grace_period_secs)
    }

    /// Check that every pattern compiles
    ///
    /// # Errors
    ///
    /// Returns the first pattern that fails to compile
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_patterns("watchPatterns", &self.watch_patterns)?;
        check_patterns("ignorePatterns", &self.ignore_patterns)
    }
}

fn check_patterns(field: &'static str, patterns: &[String]) -> Result<(), ConfigError> {
    for pattern in patterns {
        glob::Pattern::new(pattern).map_err(|e| ConfigError::InvalidPattern {
            field,
            pattern: pattern.clone(),
            reason: e.msg.to_string(),
        })?;
    }
    Ok(())
}
