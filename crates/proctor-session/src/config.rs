//! Configuration types for Proctor.
//!
//! This module provides the configuration loaded from `proctor.json`,
//! covering the backend connection, the signed-in user, and the timing
//! parameters of an exam session.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ProctorError, Result};

/// The default config file name.
pub const CONFIG_FILE_NAME: &str = "proctor.json";

/// Default base URL of the exam REST backend.
fn default_backend_url() -> String {
    "http://localhost:8000/api".to_string()
}

/// Default timeout in seconds for a single backend request.
const fn default_request_timeout() -> u32 {
    30
}

/// Default quiet period before a free-text answer is persisted.
const fn default_debounce_ms() -> u64 {
    1000
}

/// Default countdown tick period.
const fn default_tick_millis() -> u64 {
    1000
}

/// Default output directory for result reports.
fn default_output_dir() -> String {
    ".".to_string()
}

/// Default value for boolean options that default to true.
const fn default_true() -> bool {
    true
}

/// Main configuration for Proctor.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Base URL of the exam REST backend.
    #[serde(default = "default_backend_url")]
    pub backend_url: String,

    /// Identifier of the signed-in user.
    #[serde(default)]
    pub user_id: Option<String>,

    /// Bearer token sent with every backend request.
    #[serde(default)]
    pub auth_token: Option<String>,

    /// Exam to open when none is given on the command line.
    #[serde(default)]
    pub exam_id: Option<String>,

    /// Timeout for a single backend request in seconds.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u32,

    /// Quiet period in milliseconds before a free-text answer is saved.
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,

    /// Countdown tick period in milliseconds.
    #[serde(default = "default_tick_millis")]
    pub tick_millis: u64,

    /// Ask for confirmation before submitting with unanswered questions.
    #[serde(default = "default_true")]
    pub confirm_incomplete_submit: bool,

    /// Output directory for result reports.
    #[serde(default = "default_output_dir")]
    pub output_dir: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            backend_url: default_backend_url(),
            user_id: None,
            auth_token: None,
            exam_id: None,
            request_timeout_secs: default_request_timeout(),
            debounce_ms: default_debounce_ms(),
            tick_millis: default_tick_millis(),
            confirm_incomplete_submit: default_true(),
            output_dir: default_output_dir(),
        }
    }
}

impl Config {
    /// Loads configuration from the current working directory.
    ///
    /// Looks for `proctor.json` in the current directory. If not found,
    /// returns the default configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but contains invalid JSON.
    pub fn load() -> Result<Self> {
        let current_dir = std::env::current_dir().map_err(|e| {
            ProctorError::config_parse(
                "<current directory>",
                format!("cannot determine current directory: {e}"),
            )
        })?;
        Self::load_from_dir(&current_dir)
    }

    /// Loads configuration from `proctor.json` in a specific directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but contains invalid JSON.
    pub fn load_from_dir(dir: &Path) -> Result<Self> {
        let config_path = dir.join(CONFIG_FILE_NAME);
        Self::load_from_file(&config_path)
    }

    /// Loads configuration from a specific file path.
    ///
    /// If the file does not exist, returns default configuration.
    ///
    /// # Errors
    ///
    /// Returns `ProctorError::ConfigParseError` if the file exists but contains
    /// invalid JSON.
    ///
    /// Returns `ProctorError::ConfigValidationError` if the configuration values
    /// are invalid.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let config = Self::default();
                config.validate()?;
                return Ok(config);
            }
            Err(e) => {
                return Err(ProctorError::config_parse(
                    path,
                    format!("failed to read file: {e}"),
                ));
            }
        };

        let config: Self = serde_json::from_str(&contents)
            .map_err(|e| ProctorError::config_parse(path, e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration values.
    ///
    /// # Errors
    ///
    /// Returns `ProctorError::ConfigValidationError` if any validation check fails.
    pub fn validate(&self) -> Result<()> {
        let url = self.backend_url.trim();
        if url.is_empty() {
            return Err(ProctorError::config_validation(
                "backendUrl must not be empty",
                "Set backendUrl to the exam service address in your proctor.json",
            ));
        }

        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(ProctorError::config_validation(
                format!("backendUrl '{url}' must start with http:// or https://"),
                "Use a full URL such as https://exams.example.com/api",
            ));
        }

        if self.request_timeout_secs == 0 {
            return Err(ProctorError::config_validation(
                "requestTimeoutSecs must be greater than 0",
                "Set requestTimeoutSecs to at least 1 second in your proctor.json",
            ));
        }

        if self.debounce_ms == 0 {
            return Err(ProctorError::config_validation(
                "debounceMs must be greater than 0",
                "Set debounceMs to the typing pause after which answers are saved (e.g. 1000)",
            ));
        }

        if self.tick_millis == 0 {
            return Err(ProctorError::config_validation(
                "tickMillis must be greater than 0",
                "Remove tickMillis from your proctor.json to use the one-second default",
            ));
        }

        if self.output_dir.trim().is_empty() {
            return Err(ProctorError::config_validation(
                "outputDir must not be empty",
                "Provide a valid output directory path in your proctor.json (use '.' for current directory)",
            ));
        }

        Ok(())
    }

    /// Returns the timing parameters used by an exam session.
    #[must_use]
    pub const fn session_settings(&self) -> SessionSettings {
        SessionSettings {
            debounce: Duration::from_millis(self.debounce_ms),
            tick_period: Duration::from_millis(self.tick_millis),
        }
    }

    /// Returns the backend request timeout.
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(u64::from(self.request_timeout_secs))
    }
}

/// Timing parameters of an exam session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionSettings {
    /// Quiet period before a free-text answer is persisted.
    pub debounce: Duration,
    /// Period of one countdown tick.
    pub tick_period: Duration,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Config::default().session_settings()
    }
}
