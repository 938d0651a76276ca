//! Import command: load entities and relationships into a branch.

use anyhow::{Context, Result};
use colored::Colorize;
use membank_core::{BranchScope, GraphDocument, SqliteGraphStore};

use crate::cli::ImportCommand;
use crate::config::Config;

/// Execute import command.
pub async fn execute(cmd: ImportCommand, config: &Config) -> Result<()> {
    let content = std::fs::read_to_string(&cmd.file)
        .with_context(|| format!("Failed to read {}", cmd.file.display()))?;
    let document: GraphDocument = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse {}", cmd.file.display()))?;

    config.ensure_dirs()?;
    let store = SqliteGraphStore::open(config.database_path()).context("Failed to open database")?;
    let scope = BranchScope::new(cmd.scope.repository, cmd.scope.branch);

    let summary = store
        .import(&scope, &document)
        .await
        .with_context(|| format!("Failed to import into {}", scope))?;

    println!(
        "{} Imported {} entities and {} relationships into {}",
        "✓".green(),
        summary.entities,
        summary.relationships,
        scope.to_string().cyan()
    );
    Ok(())
}
