//! Configuration management for membank.
//!
//! Configuration is loaded from multiple sources with precedence:
//! 1. Environment variables (MEMBANK_*)
//! 2. Config file (~/.membank/config.toml)
//! 3. Default values

use anyhow::{Context, Result};
use membank_sdk::{OptimizerConfig, SamplingConfig, SnapshotConfig, StrategyTable};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// SQLite database (default: ~/.membank/membank.db)
    pub database_path: Option<PathBuf>,

    /// Separate versioned strategy file; replaces `[strategies]` when set
    pub strategies_file: Option<PathBuf>,

    /// Strategy bounds
    pub strategies: StrategyTable,

    /// Sampling settings
    pub sampling: SamplingConfig,

    /// Snapshot settings
    pub snapshots: SnapshotConfig,
}

fn default_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".membank")
}

impl Config {
    /// Load configuration from file and environment.
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path())
    }

    /// Load configuration from a specific file; a missing file yields defaults.
    pub fn load_from(config_path: &Path) -> Result<Self> {
        let mut config: Config = if config_path.exists() {
            let content = std::fs::read_to_string(config_path)
                .context("Failed to read config file")?;
            toml::from_str(&content).context("Failed to parse config file")?
        } else {
            Config::default()
        };

        if let Some(file) = config.strategies_file.clone() {
            // Relative paths are resolved against the config file
            let file = match config_path.parent() {
                Some(dir) if file.is_relative() => dir.join(file),
                _ => file,
            };
            let content = std::fs::read_to_string(&file)
                .with_context(|| format!("Failed to read strategies file {}", file.display()))?;
            config.strategies = toml::from_str(&content)
                .with_context(|| format!("Failed to parse strategies file {}", file.display()))?;
        }

        Ok(config)
    }

    /// Get the config file path.
    pub fn config_path() -> PathBuf {
        if let Ok(path) = std::env::var("MEMBANK_CONFIG") {
            PathBuf::from(path)
        } else {
            default_data_dir().join("config.toml")
        }
    }

    /// Database path: `MEMBANK_DATABASE_PATH`, then the config file, then the default.
    pub fn database_path(&self) -> PathBuf {
        self.resolve_database_path(std::env::var("MEMBANK_DATABASE_PATH").ok())
    }

    fn resolve_database_path(&self, from_env: Option<String>) -> PathBuf {
        from_env
            .filter(|p| !p.trim().is_empty())
            .map(PathBuf::from)
            .or_else(|| self.database_path.clone())
            .unwrap_or_else(|| default_data_dir().join("membank.db"))
    }

    /// Optimizer settings with the resolved database path.
    pub fn optimizer_config(&self) -> OptimizerConfig {
        OptimizerConfig::new(self.database_path())
            .with_strategies(self.strategies.clone())
            .with_sampling(self.sampling.clone())
            .with_snapshots(self.snapshots.clone())
    }

    /// Ensure the database directory exists.
    pub fn ensure_dirs(&self) -> Result<()> {
        if let Some(parent) = self.database_path().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).context("Failed to create data directory")?;
            }
        }
        Ok(())
    }
}
