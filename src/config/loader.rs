//! Configuration File Loading
//!
//! Handles loading and saving configuration files from various locations
//! with support for multiple formats and fallback to defaults.

use super::{Config, MAX_KILL_GRACE_PERIOD_MS};
use crate::error::{Error, Result};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

/// Directory name used under every search root
const APP_DIR: &str = "snail";

/// Configuration file loader
pub struct ConfigLoader {
    /// Directories searched for `config.toml` / `config.json`
    search_paths: Vec<PathBuf>,
    /// Supported configuration file formats, in lookup order
    supported_formats: Vec<ConfigFormat>,
    /// Current configuration file path (if loaded)
    current_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Toml,
    Json,
}

impl ConfigFormat {
    fn extension(self) -> &'static str {
        match self {
            ConfigFormat::Toml => "toml",
            ConfigFormat::Json => "json",
        }
    }

    fn name(self) -> &'static str {
        match self {
            ConfigFormat::Toml => "TOML",
            ConfigFormat::Json => "JSON",
        }
    }
}

#[derive(Debug, Clone)]
pub struct LoadOptions {
    /// Whether to fall back to the default config if none exists
    pub create_default: bool,
    /// Whether to validate configuration after loading
    pub validate: bool,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            create_default: true,
            validate: true,
        }
    }
}

impl ConfigLoader {
    /// Create a new configuration loader
    pub fn new() -> Self {
        Self {
            search_paths: Self::get_search_paths(),
            supported_formats: vec![ConfigFormat::Toml, ConfigFormat::Json],
            current_path: None,
        }
    }

    /// Load configuration with default options
    pub fn load() -> Result<Config> {
        Self::new().load_with_options(LoadOptions::default())
    }

    /// Load configuration from this loader's search paths
    pub fn load_with_options(&mut self, options: LoadOptions) -> Result<Config> {
        if let Some((path, config)) = self.find_and_load_config()? {
            debug!("Loaded configuration from {}", path.display());
            self.current_path = Some(path);
            if options.validate {
                Self::validate_config(&config)?;
            }
            return Ok(config);
        }

        if options.create_default {
            debug!("No configuration file found, using defaults");
            let config = Config::default();
            if options.validate {
                Self::validate_config(&config)?;
            }
            Ok(config)
        } else {
            Err(Error::ConfigNotFound)
        }
    }

    /// Load and validate one specific file
    pub fn load_from_path(path: &Path) -> Result<Config> {
        if !path.exists() {
            return Err(Error::ConfigLoadFailed {
                path: path.to_path_buf(),
                reason: "file does not exist".to_string(),
            });
        }
        let format = super::utils::get_config_format(path).unwrap_or(ConfigFormat::Toml);
        let config = Self::load_config_file(path, format)?;
        Self::validate_config(&config)?;
        Ok(config)
    }

    /// Save configuration to the current path or default location
    pub fn save(&self, config: &Config) -> Result<PathBuf> {
        let path = self
            .current_path
            .clone()
            .unwrap_or_else(Self::get_default_config_path);
        self.save_to_path(config, &path)?;
        Ok(path)
    }

    /// Save configuration to a specific path; the extension picks the format
    pub fn save_to_path(&self, config: &Config, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| Error::ConfigSaveFailed {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;
        }

        let format = super::utils::get_config_format(path).unwrap_or(ConfigFormat::Toml);
        let content = match format {
            ConfigFormat::Json => serde_json::to_string_pretty(config).map_err(|e| {
                Error::ConfigSerializationFailed {
                    format: format.name().to_string(),
                    reason: e.to_string(),
                }
            })?,
            ConfigFormat::Toml => {
                toml::to_string_pretty(config).map_err(|e| Error::ConfigSerializationFailed {
                    format: format.name().to_string(),
                    reason: e.to_string(),
                })?
            }
        };

        fs::write(path, content).map_err(|e| Error::ConfigSaveFailed {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        info!("Saved configuration to {}", path.display());
        Ok(())
    }

    /// Find and load configuration from search paths
    fn find_and_load_config(&self) -> Result<Option<(PathBuf, Config)>> {
        for dir in &self.search_paths {
            for format in &self.supported_formats {
                let config_path = Self::get_config_path_for_format(dir, *format);
                if !config_path.exists() {
                    continue;
                }
                match Self::load_config_file(&config_path, *format) {
                    Ok(config) => return Ok(Some((config_path, config))),
                    Err(e) => {
                        // Keep searching; a broken file should not block startup
                        warn!("Failed to load config from {}: {}", config_path.display(), e);
                    }
                }
            }
        }
        Ok(None)
    }

    /// Load a specific configuration file
    fn load_config_file(path: &Path, format: ConfigFormat) -> Result<Config> {
        let content = fs::read_to_string(path).map_err(|e| Error::ConfigLoadFailed {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        match format {
            ConfigFormat::Toml => toml::from_str(&content).map_err(|e| Error::ConfigParseFailed {
                format: format.name().to_string(),
                reason: e.to_string(),
            }),
            ConfigFormat::Json => {
                serde_json::from_str(&content).map_err(|e| Error::ConfigParseFailed {
                    format: format.name().to_string(),
                    reason: e.to_string(),
                })
            }
        }
    }

    fn get_config_path_for_format(dir: &Path, format: ConfigFormat) -> PathBuf {
        dir.join("config").with_extension(format.extension())
    }

    /// Default search directories, most specific first
    fn get_search_paths() -> Vec<PathBuf> {
        let mut paths = Vec::new();

        if let Ok(xdg_config) = env::var("XDG_CONFIG_HOME") {
            if !xdg_config.is_empty() {
                paths.push(PathBuf::from(xdg_config).join(APP_DIR));
            }
        }

        if let Some(config_dir) = dirs::config_dir() {
            paths.push(config_dir.join(APP_DIR));
        }

        if let Some(home) = dirs::home_dir() {
            paths.push(home.join(".snail"));
            paths.push(home.join(".config").join(APP_DIR));
        }

        if let Ok(cwd) = env::current_dir() {
            paths.push(cwd.join(".snail"));
        }

        paths.dedup();
        paths
    }

    /// Get the default configuration path
    fn get_default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_DIR)
            .join("config.toml")
    }

    /// Validate configuration
    pub fn validate_config(config: &Config) -> Result<()> {
        if config.jobs.kill_grace_period_ms > MAX_KILL_GRACE_PERIOD_MS {
            return Err(Error::ConfigValidationFailed {
                field: "jobs.kill_grace_period_ms".to_string(),
                reason: format!(
                    "Kill grace period cannot exceed {} ms",
                    MAX_KILL_GRACE_PERIOD_MS
                ),
            });
        }

        if let Some(dir) = &config.session.working_directory {
            if dir.as_os_str().is_empty() {
                return Err(Error::ConfigValidationFailed {
                    field: "session.working_directory".to_string(),
                    reason: "Working directory cannot be empty".to_string(),
                });
            }
        }

        for name in config.session.environment.keys() {
            if !crate::shell::is_valid_name(name) {
                return Err(Error::ConfigValidationFailed {
                    field: format!("session.environment.{}", name),
                    reason: "Not a valid variable name".to_string(),
                });
            }
        }

        if config.prompt.primary.contains('\n') || config.prompt.continuation.contains('\n') {
            return Err(Error::ConfigValidationFailed {
                field: "prompt".to_string(),
                reason: "Prompts must fit on one line".to_string(),
            });
        }

        if config.logging.level.trim().is_empty() {
            return Err(Error::ConfigValidationFailed {
                field: "logging.level".to_string(),
                reason: "Log level cannot be empty".to_string(),
            });
        }

        Ok(())
    }

    /// Get the current configuration file path
    pub fn current_path(&self) -> Option<&Path> {
        self.current_path.as_deref()
    }

    /// List all search paths
    pub fn search_paths(&self) -> &[PathBuf] {
        &self.search_paths
    }

    /// Add a custom search path
    pub fn add_search_path(&mut self, path: PathBuf) {
        self.search_paths.push(path);
    }

    /// Clear all search paths and add a single path
    pub fn set_search_path(&mut self, path: PathBuf) {
        self.search_paths = vec![path];
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}
