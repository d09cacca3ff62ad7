//! Configuration management for snail
//!
//! Settings for new sessions, background jobs, the REPL prompts and
//! logging. Files are TOML or JSON; every section and field is optional
//! and falls back to its default.

pub mod loader;

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub use loader::{ConfigFormat, ConfigLoader, LoadOptions};

/// Upper bound for `jobs.kill_grace_period_ms`
pub const MAX_KILL_GRACE_PERIOD_MS: u64 = 60_000;

/// Main configuration structure for snail
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Initial state of new sessions
    pub session: SessionConfig,

    /// Background job handling
    pub jobs: JobsConfig,

    /// REPL prompts
    pub prompt: PromptConfig,

    /// Log output
    pub logging: LoggingConfig,
}

/// Initial state of a new session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Starting directory; the process working directory when unset
    pub working_directory: Option<PathBuf>,

    /// Whether the session starts with the process environment exported
    pub inherit_environment: bool,

    /// Extra exported variables, applied after inheritance
    pub environment: HashMap<String, String>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            working_directory: None,
            inherit_environment: true,
            environment: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JobsConfig {
    /// Time between SIGTERM and SIGKILL when terminating a job
    pub kill_grace_period_ms: u64,

    /// Print `[n] Done` lines when background jobs finish
    pub notify_on_completion: bool,
}

impl JobsConfig {
    pub fn kill_grace_period(&self) -> Duration {
        Duration::from_millis(self.kill_grace_period_ms)
    }
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            kill_grace_period_ms: 2000,
            notify_on_completion: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PromptConfig {
    /// Shown when the session is idle
    pub primary: String,

    /// Shown while input is being accumulated
    pub continuation: String,
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            primary: "$ ".to_string(),
            continuation: "> ".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default `tracing` filter directive when `RUST_LOG` is unset
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Configuration utilities
pub mod utils {
    use super::*;

    /// Determine the configuration format from a file extension
    pub fn get_config_format(path: &Path) -> Option<ConfigFormat> {
        match path.extension()?.to_str()? {
            "toml" => Some(ConfigFormat::Toml),
            "json" => Some(ConfigFormat::Json),
            _ => None,
        }
    }

    /// Serialized default configuration, e.g. for `snail --print-config`
    pub fn create_default_config_content(format: ConfigFormat) -> Result<String> {
        let config = Config::default();
        match format {
            ConfigFormat::Toml => {
                toml::to_string_pretty(&config).map_err(|e| Error::ConfigSerializationFailed {
                    format: "TOML".to_string(),
                    reason: e.to_string(),
                })
            }
            ConfigFormat::Json => {
                serde_json::to_string_pretty(&config).map_err(|e| {
                    Error::ConfigSerializationFailed {
                        format: "JSON".to_string(),
                        reason: e.to_string(),
                    }
                })
            }
        }
    }
}
