//! Rollback command: restore a branch from a snapshot.

use std::io::IsTerminal;

use anyhow::{Context, Result, bail};
use colored::Colorize;
use dialoguer::{Confirm, theme::ColorfulTheme};
use membank_sdk::OperationParams;

use super::{open_optimizer, print_json};
use crate::cli::RollbackCommand;
use crate::config::Config;

/// Execute rollback command.
pub async fn execute(cmd: RollbackCommand, config: &Config) -> Result<()> {
    let optimizer = open_optimizer(config)?;

    let params = OperationParams::new(
        cmd.repository.clone().unwrap_or_default(),
        cmd.branch.clone().unwrap_or_default(),
    )
    .with_snapshot_id(&cmd.snapshot_id);

    if !cmd.confirm {
        if !std::io::stdin().is_terminal() {
            bail!("Refusing to restore a snapshot without --confirm");
        }

        let validation = optimizer.validate_snapshot(&cmd.snapshot_id).await?;
        if !validation.valid {
            bail!(
                "Snapshot {} is invalid: {}",
                cmd.snapshot_id,
                validation.issues.join("; ")
            );
        }
        let proceed = Confirm::with_theme(&ColorfulTheme::default())
            .with_prompt(format!(
                "Replace the current branch state with snapshot {} ({} entities, {} relationships)?",
                cmd.snapshot_id,
                validation.entity_count.unwrap_or(0),
                validation.relationship_count.unwrap_or(0)
            ))
            .default(false)
            .interact()
            .context("Failed to read confirmation")?;
        if !proceed {
            println!("{} Aborted, nothing changed", "✗".red());
            return Ok(());
        }
    }

    let report = optimizer.rollback(&params).await?;

    if cmd.json {
        return print_json(&report);
    }
    println!("{} {}", "✓".green(), report.message);
    println!("  Took {} ms", report.outcome.rollback_time);
    Ok(())
}
