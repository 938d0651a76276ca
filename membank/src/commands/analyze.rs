//! Analyze command: report stale and redundant knowledge without changing anything.

use anyhow::Result;
use colored::Colorize;
use membank_sdk::{AnalysisReport, OperationParams, SamplingStrategy, Strategy};

use super::{open_optimizer, print_json, split_list};
use crate::cli::AnalyzeCommand;
use crate::config::Config;

/// Execute analyze command.
pub async fn execute(cmd: AnalyzeCommand, config: &Config) -> Result<()> {
    let optimizer = open_optimizer(config)?;

    let mut params = OperationParams::new(&cmd.scope.repository, &cmd.scope.branch)
        .with_focus_areas(split_list(&cmd.focus));
    if let Some(strategy) = &cmd.strategy {
        params = params.with_strategy(strategy.parse::<Strategy>()?);
    }
    if let Some(sampling) = &cmd.sampling {
        params.sampling_strategy = Some(sampling.parse::<SamplingStrategy>()?);
    }
    params.sample_size = cmd.sample_size;

    let report = optimizer.analyze(&params).await?;

    if cmd.json {
        return print_json(&report);
    }
    print_report(&report);
    Ok(())
}

fn print_report(report: &AnalysisReport) {
    let summary = &report.analysis.summary;
    let health = format!("{:.2}", summary.overall_health_score);
    let health = if summary.overall_health_score >= 0.8 {
        health.green()
    } else if summary.overall_health_score >= 0.5 {
        health.yellow()
    } else {
        health.red()
    };

    println!(
        "{} {}:{}",
        "Memory bank".bold(),
        report.repository.cyan(),
        report.branch.cyan()
    );
    println!("  Analysis:      {}", report.analysis_id.dimmed());
    println!(
        "  Entities:      {} ({} relationships)",
        report.memory_context.total_entities, report.memory_context.total_relationships
    );
    println!(
        "  Sampled:       {} via {}",
        summary.total_entities_analyzed,
        report.sampling_strategy.as_str()
    );
    println!(
        "  Complexity:    {} ({:?})",
        report.context_analysis.complexity_score,
        report.context_analysis.project_characteristics.maturity
    );
    println!(
        "  Strategy:      {} (recommended: {})",
        report.strategy,
        report.context_analysis.recommended_strategy
    );
    println!("  Health:        {}", health);

    if !report.analysis.stale_entities.is_empty() {
        println!();
        println!("{} ({})", "Stale entities".bold(), report.analysis.stale_entities.len());
        for stale in &report.analysis.stale_entities {
            let marker = if stale.safe_to_delete {
                "•".green()
            } else {
                "!".yellow()
            };
            println!(
                "  {} {} [{}] {:.2} - {}",
                marker, stale.id, stale.entity_type, stale.staleness, stale.reason
            );
        }
    }

    if !report.analysis.redundancies.is_empty() {
        println!();
        println!("{} ({})", "Redundancy groups".bold(), report.analysis.redundancies.len());
        for group in &report.analysis.redundancies {
            let primary = group.primary_entity.as_deref().unwrap_or("-");
            println!(
                "  • {} (keep {}, similarity {:.2})",
                group.entities.join(", "),
                primary.cyan(),
                group.similarity
            );
        }
    }

    if !report.analysis.recommendations.is_empty() {
        println!();
        println!("{}", "Recommendations".bold());
        for recommendation in &report.analysis.recommendations {
            println!("  - {}", recommendation);
        }
    }
}
