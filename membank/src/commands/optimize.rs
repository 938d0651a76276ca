//! Optimize command: plan, confirm and apply an optimization.

use std::io::IsTerminal;

use anyhow::{Context, Result, bail};
use colored::Colorize;
use dialoguer::{Confirm, theme::ColorfulTheme};
use membank_core::EntityType;
use membank_sdk::optimizer::{ActionStatus, RunStatus};
use membank_sdk::{OperationParams, OptimizationReport, SnapshotFailurePolicy, Strategy};

use super::{open_optimizer, print_json, split_list};
use crate::cli::OptimizeCommand;
use crate::config::Config;

/// Execute optimize command.
pub async fn execute(cmd: OptimizeCommand, config: &Config) -> Result<()> {
    let optimizer = open_optimizer(config)?;
    let mut params = build_params(&cmd)?;

    if !params.dry_run && !params.confirm {
        if !std::io::stdin().is_terminal() {
            bail!("Refusing to modify the memory bank without --confirm (use --dry-run to preview)");
        }

        let preview = optimizer
            .optimize(&OperationParams {
                dry_run: true,
                ..params.clone()
            })
            .await?;
        print_plan(&preview);
        if preview.plan.actions.is_empty() {
            println!("{} Nothing to do", "✓".green());
            return Ok(());
        }

        let proceed = Confirm::with_theme(&ColorfulTheme::default())
            .with_prompt(format!(
                "Apply {} actions to {}:{}?",
                preview.plan.actions.len(),
                params.repository,
                params.branch
            ))
            .default(false)
            .interact()
            .context("Failed to read confirmation")?;
        if !proceed {
            println!("{} Aborted, nothing changed", "✗".red());
            return Ok(());
        }

        params.confirm = true;
        params.analysis_id = Some(preview.analysis_id);
    }

    let report = optimizer.optimize(&params).await?;

    if cmd.json {
        return print_json(&report);
    }
    if params.dry_run {
        print_plan(&report);
        println!();
        println!("{} Dry run, nothing changed", "ℹ".blue());
    } else {
        print_result(&report);
    }
    Ok(())
}

fn build_params(cmd: &OptimizeCommand) -> Result<OperationParams> {
    let mut params = OperationParams::new(&cmd.scope.repository, &cmd.scope.branch)
        .with_focus_areas(split_list(&cmd.focus));
    params.dry_run = cmd.dry_run;
    params.confirm = cmd.confirm;
    params.max_deletions = cmd.max_deletions;
    params.analysis_id = cmd.analysis_id.clone();

    if let Some(strategy) = &cmd.strategy {
        params.strategy = Some(strategy.parse::<Strategy>()?);
    }
    if let Some(policy) = &cmd.snapshot_policy {
        params.snapshot_failure_policy = Some(policy.parse::<SnapshotFailurePolicy>()?);
    }
    params.preserve_categories = split_list(&cmd.preserve)
        .iter()
        .map(|c| c.parse::<EntityType>())
        .collect::<Result<Vec<_>, _>>()?;

    Ok(params)
}

fn print_plan(report: &OptimizationReport) {
    let plan = &report.plan;
    println!(
        "{} {} ({} strategy, {} actions)",
        "Plan".bold(),
        plan.id.dimmed(),
        plan.strategy,
        plan.actions.len()
    );
    for entity_id in &plan.execution_order {
        let Some(action) = plan.actions.iter().find(|a| &a.entity_id == entity_id) else {
            continue;
        };
        let target = action
            .target_entity_id
            .as_deref()
            .map(|t| format!(" → {}", t))
            .unwrap_or_default();
        println!(
            "  {:<6} {}{}  {}",
            action.action_type.as_str().cyan(),
            action.entity_id,
            target,
            action.reason.dimmed()
        );
    }
}

fn print_result(report: &OptimizationReport) {
    let result = &report.result;
    let status = match result.status {
        RunStatus::Success => "success".green(),
        RunStatus::Partial => "partial".yellow(),
    };
    println!("{} {} {}", "Optimization".bold(), result.plan_id.dimmed(), status);

    for executed in &result.executed_actions {
        match executed.status {
            ActionStatus::Success => println!("  {} {}", "✓".green(), executed.action_id),
            ActionStatus::Skipped => println!("  {} {} (skipped)", "-".dimmed(), executed.action_id),
            ActionStatus::Failed => println!(
                "  {} {}: {}",
                "✗".red(),
                executed.action_id,
                executed.error.as_deref().unwrap_or("unknown error")
            ),
        }
    }

    println!();
    println!(
        "  Deleted: {}  Merged: {}  Updated: {}",
        result.summary.entities_deleted, result.summary.entities_merged, result.summary.entities_updated
    );
    match &result.snapshot_id {
        Some(id) => println!("  Snapshot: {} (membank rollback {})", id.cyan(), id),
        None => println!("  Snapshot: {}", "none, rollback unavailable".yellow()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::{Cli, Commands};
    use clap::Parser;

    fn parse(args: &[&str]) -> OptimizeCommand {
        let mut argv = vec!["membank", "optimize", "-r", "repo"];
        argv.extend_from_slice(args);
        match Cli::try_parse_from(argv).unwrap().command {
            Commands::Optimize(cmd) => cmd,
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_build_params() {
        let cmd = parse(&[
            "--strategy", "aggressive", "--preserve", "Decision,rule", "--snapshot-policy", "abort",
            "--focus", "orphan-removal", "-y",
        ]);
        let params = build_params(&cmd).unwrap();

        assert_eq!(params.strategy, Some(Strategy::Aggressive));
        assert_eq!(params.preserve_categories, vec![EntityType::Decision, EntityType::Rule]);
        assert_eq!(params.snapshot_failure_policy, Some(SnapshotFailurePolicy::Abort));
        assert_eq!(params.focus_areas, vec!["orphan-removal".to_string()]);
        assert!(params.confirm);
        assert!(!params.dry_run);
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        assert!(build_params(&parse(&["--strategy", "reckless"])).is_err());
        assert!(build_params(&parse(&["--preserve", "widget"])).is_err());
        assert!(build_params(&parse(&["--snapshot-policy", "ignore"])).is_err());
    }
}
