//! Reset tool configuration management

use crate::driver::{DEFAULT_MAX_OPEN_ATTEMPTS, RetryPolicy};
use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Longest accepted pause between busy open attempts
pub const MAX_RETRY_INTERVAL_MS: u64 = 60_000;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResetConfig {
    #[serde(default)]
    pub general: GeneralSettings,
    #[serde(default)]
    pub reset: ResetSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralSettings {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "GeneralSettings::default_log_level")]
    pub log_level: String,
}

impl Default for GeneralSettings {
    fn default() -> Self {
        Self {
            log_level: Self::default_log_level(),
        }
    }
}

impl GeneralSettings {
    fn default_log_level() -> String {
        "warn".to_string()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResetSettings {
    /// Open attempts while the device is held by another process
    #[serde(default = "ResetSettings::default_max_open_attempts")]
    pub max_open_attempts: u32,
    /// Pause after each busy open attempt, in milliseconds
    #[serde(default = "ResetSettings::default_retry_interval_ms")]
    pub retry_interval_ms: u64,
    /// Detach kernel drivers before applying the configuration
    #[serde(default = "ResetSettings::default_detach_kernel_drivers")]
    pub detach_kernel_drivers: bool,
}

impl Default for ResetSettings {
    fn default() -> Self {
        Self {
            max_open_attempts: Self::default_max_open_attempts(),
            retry_interval_ms: Self::default_retry_interval_ms(),
            detach_kernel_drivers: Self::default_detach_kernel_drivers(),
        }
    }
}

impl ResetSettings {
    fn default_max_open_attempts() -> u32 {
        DEFAULT_MAX_OPEN_ATTEMPTS
    }

    fn default_retry_interval_ms() -> u64 {
        1000 // 1 second
    }

    fn default_detach_kernel_drivers() -> bool {
        true
    }

    /// Retry policy for the exclusive open
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_open_attempts,
            interval: Duration::from_millis(self.retry_interval_ms),
        }
    }
}

impl ResetConfig {
    /// Load configuration from the specified path
    ///
    /// With `None` the standard locations are searched instead.
    pub fn load(path: Option<PathBuf>) -> Result<Self> {
        match path {
            Some(p) => Self::load_file(&p),
            None => Self::load_first_existing(&Self::candidate_paths()),
        }
    }

    /// Load configuration from a path given on the command line (`~` is expanded)
    pub fn load_from(path: &str) -> Result<Self> {
        Self::load(Some(expand_path(path)))
    }

    /// Load configuration from the standard locations, or defaults if none exists
    ///
    /// A file that exists but cannot be read, parsed or validated is an error.
    pub fn load_or_default() -> Result<Self> {
        Self::load(None)
    }

    /// Load the first of `candidates` that exists
    ///
    /// Defaults are used only when none of them exists.
    pub fn load_first_existing(candidates: &[PathBuf]) -> Result<Self> {
        match candidates.iter().find(|p| p.exists()) {
            Some(path) => Self::load_file(path),
            None => {
                tracing::debug!("No configuration file found, using defaults");
                Ok(Self::default())
            }
        }
    }

    /// Standard configuration locations, in search order
    pub fn candidate_paths() -> Vec<PathBuf> {
        vec![
            Self::default_path(),
            PathBuf::from("/etc/devreset/config.toml"),
        ]
    }

    fn load_file(config_path: &Path) -> Result<Self> {
        let content = fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        let config = Self::from_toml(&content)
            .with_context(|| format!("Failed to parse config file: {}", config_path.display()))?;

        tracing::info!("Loaded configuration from: {}", config_path.display());
        Ok(config)
    }

    /// Parse and validate a TOML document
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: ResetConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to the specified path
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize configuration")?;

        // Create parent directories if they don't exist
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        tracing::info!("Saved configuration to: {}", path.display());
        Ok(())
    }

    /// Get the default configuration file path
    pub fn default_path() -> PathBuf {
        if let Some(config_dir) = dirs::config_dir() {
            config_dir.join("devreset").join("config.toml")
        } else {
            PathBuf::from(".config/devreset/config.toml")
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.general.log_level.as_str()) {
            return Err(anyhow!(
                "Invalid log level '{}', must be one of: {}",
                self.general.log_level,
                valid_levels.join(", ")
            ));
        }

        if self.reset.max_open_attempts == 0 {
            return Err(anyhow!("max_open_attempts must be at least 1"));
        }

        if self.reset.retry_interval_ms > MAX_RETRY_INTERVAL_MS {
            return Err(anyhow!(
                "retry_interval_ms must be at most {} (got {})",
                MAX_RETRY_INTERVAL_MS,
                self.reset.retry_interval_ms
            ));
        }

        Ok(())
    }
}

/// Expand a leading `~` in a user-supplied path
pub fn expand_path(path: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(path).as_ref())
}
