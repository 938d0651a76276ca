//! SDK Configuration
//!
//! Defines configuration options for the membank optimizer. Every section
//! deserializes with defaults, so a partial TOML file is valid.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::optimizer::types::{SamplingStrategy, SnapshotFailurePolicy, Strategy};

/// Optimizer configuration options
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizerConfig {
    /// Path to the SQLite database file
    pub database_path: PathBuf,

    /// Strategy bounds
    pub strategies: StrategyTable,

    /// Sampling configuration
    pub sampling: SamplingConfig,

    /// Snapshot configuration
    pub snapshots: SnapshotConfig,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("membank.db"),
            strategies: StrategyTable::default(),
            sampling: SamplingConfig::default(),
            snapshots: SnapshotConfig::default(),
        }
    }
}

/// Bounds for one strategy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyConfig {
    /// Maximum number of actions a validated plan may keep
    pub max_deletions: usize,

    /// Force confirmation before execution
    pub requires_confirmation: bool,

    /// Entities younger than this many days are not considered stale
    pub preserve_recent_entities: u32,

    /// Focus areas the strategy favors
    #[serde(default)]
    pub focus_areas: Vec<String>,

    #[serde(default)]
    pub description: String,
}

/// Versioned set of strategy bounds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StrategyTable {
    pub version: String,
    pub conservative: StrategyConfig,
    pub balanced: StrategyConfig,
    pub aggressive: StrategyConfig,
}

impl Default for StrategyTable {
    fn default() -> Self {
        Self {
            version: "1.0.0".to_string(),
            conservative: StrategyConfig {
                max_deletions: 5,
                requires_confirmation: true,
                preserve_recent_entities: 30,
                focus_areas: vec!["stale-detection".into(), "orphan-removal".into()],
                description: "Minimal changes, only clearly stale or orphaned entities".into(),
            },
            balanced: StrategyConfig {
                max_deletions: 20,
                requires_confirmation: true,
                preserve_recent_entities: 14,
                focus_areas: vec![
                    "stale-detection".into(),
                    "redundancy-removal".into(),
                    "orphan-removal".into(),
                ],
                description: "Moderate cleanup of stale and redundant knowledge".into(),
            },
            aggressive: StrategyConfig {
                max_deletions: 50,
                requires_confirmation: true,
                preserve_recent_entities: 7,
                focus_areas: vec![
                    "stale-detection".into(),
                    "redundancy-removal".into(),
                    "orphan-removal".into(),
                    "relationship-cleanup".into(),
                    "tag-consolidation".into(),
                ],
                description: "Extensive consolidation for large or legacy graphs".into(),
            },
        }
    }
}

impl StrategyTable {
    /// Bounds for a strategy
    pub fn get(&self, strategy: Strategy) -> &StrategyConfig {
        match strategy {
            Strategy::Conservative => &self.conservative,
            Strategy::Balanced => &self.balanced,
            Strategy::Aggressive => &self.aggressive,
        }
    }
}

/// Sampling configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplingConfig {
    /// Sampling strategy when the caller does not pick one (default: representative)
    pub default_strategy: SamplingStrategy,

    /// Maximum sampled entities (default: 50)
    pub default_sample_size: usize,

    /// Maximum relationships fetched for a sample (default: 100)
    pub relationship_cap: usize,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            default_strategy: SamplingStrategy::Representative,
            default_sample_size: 50,
            relationship_cap: 100,
        }
    }
}

/// Snapshot configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SnapshotConfig {
    /// Snapshot before every non-dry-run execution (default: true)
    pub create_by_default: bool,

    /// Policy when snapshot creation fails (default: warn)
    pub failure_policy: SnapshotFailurePolicy,
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            create_by_default: true,
            failure_policy: SnapshotFailurePolicy::Warn,
        }
    }
}

impl OptimizerConfig {
    /// Create a new config with the given database path
    pub fn new(database_path: impl Into<PathBuf>) -> Self {
        Self {
            database_path: database_path.into(),
            ..Default::default()
        }
    }

    /// Set strategy bounds
    pub fn with_strategies(mut self, strategies: StrategyTable) -> Self {
        self.strategies = strategies;
        self
    }

    /// Set sampling configuration
    pub fn with_sampling(mut self, sampling: SamplingConfig) -> Self {
        self.sampling = sampling;
        self
    }

    /// Set snapshot configuration
    pub fn with_snapshots(mut self, snapshots: SnapshotConfig) -> Self {
        self.snapshots = snapshots;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        if self.database_path.as_os_str().is_empty() {
            return Err(ConfigValidationError::MissingDatabasePath);
        }

        if self.strategies.version.trim().is_empty() {
            return Err(ConfigValidationError::InvalidValue {
                field: "strategies.version".into(),
                message: "must not be empty".into(),
            });
        }

        if self.sampling.default_sample_size == 0 {
            return Err(ConfigValidationError::InvalidValue {
                field: "sampling.default_sample_size".into(),
                message: "must be greater than 0".into(),
            });
        }

        if self.sampling.relationship_cap == 0 {
            return Err(ConfigValidationError::InvalidValue {
                field: "sampling.relationship_cap".into(),
                message: "must be greater than 0".into(),
            });
        }

        Ok(())
    }
}

/// Configuration validation errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigValidationError {
    #[error("database_path is required")]
    MissingDatabasePath,

    #[error("invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = OptimizerConfig::default();
        assert_eq!(config.strategies.conservative.max_deletions, 5);
        assert_eq!(config.strategies.balanced.max_deletions, 20);
        assert_eq!(config.strategies.aggressive.max_deletions, 50);
        assert_eq!(config.strategies.balanced.preserve_recent_entities, 14);
        assert_eq!(config.sampling.default_sample_size, 50);
        assert_eq!(config.sampling.relationship_cap, 100);
        assert_eq!(config.snapshots.failure_policy, SnapshotFailurePolicy::Warn);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_strategy_lookup() {
        let table = StrategyTable::default();
        assert_eq!(table.get(Strategy::Conservative).max_deletions, 5);
        assert!(table.get(Strategy::Aggressive).requires_confirmation);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: OptimizerConfig = toml::from_str(
            r#"
            database_path = "/tmp/graph.db"

            [strategies.conservative]
            max_deletions = 2
            requires_confirmation = false
            preserve_recent_entities = 60

            [snapshots]
            failure_policy = "abort"
            "#,
        )
        .unwrap();

        assert_eq!(config.database_path, PathBuf::from("/tmp/graph.db"));
        assert_eq!(config.strategies.conservative.max_deletions, 2);
        assert!(!config.strategies.conservative.requires_confirmation);
        assert_eq!(config.strategies.balanced.max_deletions, 20);
        assert_eq!(config.snapshots.failure_policy, SnapshotFailurePolicy::Abort);
        assert!(config.snapshots.create_by_default);
    }

    #[test]
    fn test_config_validation() {
        let mut config = OptimizerConfig::new("");
        assert!(config.validate().is_err());

        config.database_path = PathBuf::from("membank.db");
        assert!(config.validate().is_ok());

        config.sampling.default_sample_size = 0;
        assert!(config.validate().is_err());
    }
}
