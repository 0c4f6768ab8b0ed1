//! Configuration management
//!
//! Handles loading, validation, and merging of configuration from:
//! - TOML files (`~/.config/lamco-selection/config.toml` by default)
//! - CLI arguments

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub mod types;

pub use types::{BackendKind, LoggingConfig, Scheduling, SelectionConfig};

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Selection engine configuration
    #[serde(default)]
    pub selection: SelectionConfig,
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content).context("Failed to parse config file")?;

        config.validate()?;
        Ok(config)
    }

    /// Create default configuration
    pub fn default_config() -> Self {
        Self::default()
    }

    /// Default config file location
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("lamco-selection").join("config.toml"))
    }

    /// Load `path` if given, else the default file if it exists, else defaults
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path {
            return Self::load(path);
        }
        match Self::default_path() {
            Some(default) if default.exists() => Self::load(&default),
            _ => Ok(Self::default_config()),
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        let selection = &self.selection;

        if selection.fetch_timeout_ms == 0 {
            anyhow::bail!("fetch_timeout_ms must be greater than zero");
        }
        if selection.clipboard_manager_handover && selection.handover_timeout_ms == 0 {
            anyhow::bail!("handover_timeout_ms must be greater than zero when handover is enabled");
        }
        if selection.max_transfer_size == 0 {
            anyhow::bail!("max_transfer_size must be greater than zero");
        }

        match self.logging.level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => anyhow::bail!("Invalid log level: {}", self.logging.level),
        }

        match self.logging.format.as_str() {
            "pretty" | "compact" | "json" => {}
            _ => anyhow::bail!("Invalid log format: {}", self.logging.format),
        }

        Ok(())
    }

    /// Override config with CLI arguments
    pub fn with_overrides(mut self, backend: Option<BackendKind>, timeout_ms: Option<u64>) -> Self {
        if let Some(backend) = backend {
            self.selection.backend = backend;
        }
        if let Some(timeout_ms) = timeout_ms {
            self.selection.fetch_timeout_ms = timeout_ms;
        }
        self
    }
}

impl SelectionConfig {
    /// Per-hop fetch bound
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }

    /// Clipboard manager handover bound
    pub fn handover_timeout(&self) -> Duration {
        Duration::from_millis(self.handover_timeout_ms)
    }
}
