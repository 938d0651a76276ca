//! Command implementations for the membank CLI.
//!
//! Each submodule implements the logic for one command.

pub mod analyze;
pub mod import;
pub mod optimize;
pub mod rollback;
pub mod snapshots;

use anyhow::{Context, Result};
use membank_sdk::MemoryOptimizer;
use serde::Serialize;

use crate::config::Config;

/// Open the optimizer on the configured database.
pub(crate) fn open_optimizer(config: &Config) -> Result<MemoryOptimizer> {
    config.ensure_dirs()?;
    let optimizer_config = config.optimizer_config();
    let path = optimizer_config.database_path.clone();
    tracing::debug!("Opening memory bank at {}", path.display());
    MemoryOptimizer::open(optimizer_config)
        .with_context(|| format!("Failed to open memory bank at {}", path.display()))
}

pub(crate) fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!(
        "{}",
        serde_json::to_string_pretty(value).context("Failed to serialize output")?
    );
    Ok(())
}

/// Parse a comma- or flag-separated list, dropping empties.
pub(crate) fn split_list(values: &[String]) -> Vec<String> {
    values
        .iter()
        .flat_map(|v| v.split(','))
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(String::from)
        .collect()
}
