//! Snapshot maintenance commands.

use anyhow::Result;
use colored::Colorize;
use membank_sdk::OperationParams;

use super::{open_optimizer, print_json};
use crate::cli::{SnapshotsAction, SnapshotsCommand};
use crate::config::Config;

/// Execute snapshots command.
pub async fn execute(cmd: SnapshotsCommand, config: &Config) -> Result<()> {
    let optimizer = open_optimizer(config)?;

    match cmd.action {
        SnapshotsAction::List {
            repository,
            branch,
            json,
        } => {
            let params = OperationParams::new(repository, branch.unwrap_or_default());
            let snapshots = optimizer.list_snapshots(&params).await?;
            if json {
                return print_json(&snapshots);
            }
            if snapshots.is_empty() {
                println!("No snapshots for {}", params.repository.cyan());
                return Ok(());
            }
            for snapshot in &snapshots {
                println!(
                    "{}  {}  {}  {} entities, {} relationships",
                    snapshot.snapshot_id.cyan(),
                    snapshot.created.format("%Y-%m-%d %H:%M:%S"),
                    snapshot.branch,
                    snapshot.entities_count,
                    snapshot.relationships_count
                );
                if !snapshot.description.is_empty() {
                    println!("    {}", snapshot.description.dimmed());
                }
            }
        }

        SnapshotsAction::Validate { snapshot_id, json } => {
            let validation = optimizer.validate_snapshot(&snapshot_id).await?;
            if json {
                return print_json(&validation);
            }
            if validation.valid {
                println!(
                    "{} {} is valid ({} entities, {} relationships)",
                    "✓".green(),
                    snapshot_id,
                    validation.entity_count.unwrap_or(0),
                    validation.relationship_count.unwrap_or(0)
                );
            } else {
                println!("{} {} is invalid", "✗".red(), snapshot_id);
                for issue in &validation.issues {
                    println!("  - {}", issue);
                }
            }
        }

        SnapshotsAction::Delete { snapshot_id } => {
            optimizer.delete_snapshot(&snapshot_id).await?;
            println!("{} Deleted snapshot {}", "✓".green(), snapshot_id);
        }
    }

    Ok(())
}
