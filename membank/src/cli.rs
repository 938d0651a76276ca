//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// membank - Memory bank maintenance CLI
///
/// Keeps branch-scoped architecture knowledge lean: analyze, optimize,
/// snapshot and roll back.
#[derive(Parser, Debug)]
#[command(name = "membank")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Analyze a branch for stale and redundant knowledge
    Analyze(AnalyzeCommand),

    /// Plan and apply an optimization (use --dry-run to preview)
    Optimize(OptimizeCommand),

    /// Restore a branch from a snapshot
    Rollback(RollbackCommand),

    /// Snapshot maintenance (list, validate, delete)
    Snapshots(SnapshotsCommand),

    /// Import entities and relationships from a JSON document
    Import(ImportCommand),

    /// Show version information
    Version,
}

/// Repository and branch selection.
#[derive(Args, Debug, Clone)]
pub struct ScopeArgs {
    /// Repository name
    #[arg(short, long, env = "MEMBANK_REPOSITORY")]
    pub repository: String,

    /// Branch name
    #[arg(short, long, default_value = "main")]
    pub branch: String,
}

// ─────────────────────────────────────────────────────────────────────────────
// Analyze / Optimize
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Args, Debug)]
pub struct AnalyzeCommand {
    #[command(flatten)]
    pub scope: ScopeArgs,

    /// Strategy: conservative, balanced or aggressive (default: recommended)
    #[arg(short, long)]
    pub strategy: Option<String>,

    /// Sampling strategy: representative, problematic, recent or diverse
    #[arg(long)]
    pub sampling: Option<String>,

    /// Maximum sampled entities
    #[arg(long)]
    pub sample_size: Option<usize>,

    /// Focus areas (repeatable)
    #[arg(long = "focus", action = clap::ArgAction::Append)]
    pub focus: Vec<String>,

    /// Print JSON instead of a summary
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug)]
pub struct OptimizeCommand {
    #[command(flatten)]
    pub scope: ScopeArgs,

    /// Strategy: conservative, balanced or aggressive (default: recommended)
    #[arg(short, long)]
    pub strategy: Option<String>,

    /// Plan and report without modifying the graph
    #[arg(long)]
    pub dry_run: bool,

    /// Apply without prompting
    #[arg(short = 'y', long)]
    pub confirm: bool,

    /// Lower the strategy's action limit
    #[arg(long)]
    pub max_deletions: Option<usize>,

    /// Entity types that must not be touched (repeatable)
    #[arg(long = "preserve", action = clap::ArgAction::Append)]
    pub preserve: Vec<String>,

    /// Focus areas (repeatable)
    #[arg(long = "focus", action = clap::ArgAction::Append)]
    pub focus: Vec<String>,

    /// Reuse a previous analysis from this process
    #[arg(long)]
    pub analysis_id: Option<String>,

    /// What to do when the pre-run snapshot fails: abort, continue or warn
    #[arg(long)]
    pub snapshot_policy: Option<String>,

    /// Print JSON instead of a summary
    #[arg(long)]
    pub json: bool,
}

// ─────────────────────────────────────────────────────────────────────────────
// Rollback / Snapshots
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Args, Debug)]
pub struct RollbackCommand {
    /// Snapshot to restore
    pub snapshot_id: String,

    /// Expected repository of the snapshot
    #[arg(short, long)]
    pub repository: Option<String>,

    /// Expected branch of the snapshot
    #[arg(short, long)]
    pub branch: Option<String>,

    /// Restore without prompting
    #[arg(short = 'y', long)]
    pub confirm: bool,

    /// Print JSON instead of a summary
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug)]
pub struct SnapshotsCommand {
    #[command(subcommand)]
    pub action: SnapshotsAction,
}

#[derive(Subcommand, Debug)]
pub enum SnapshotsAction {
    /// List snapshots, newest first
    List {
        /// Repository name
        #[arg(short, long, env = "MEMBANK_REPOSITORY")]
        repository: String,

        /// Only this branch
        #[arg(short, long)]
        branch: Option<String>,

        /// Print JSON
        #[arg(long)]
        json: bool,
    },

    /// Check a snapshot's integrity
    Validate {
        snapshot_id: String,

        /// Print JSON
        #[arg(long)]
        json: bool,
    },

    /// Delete a snapshot
    Delete { snapshot_id: String },
}

// ─────────────────────────────────────────────────────────────────────────────
// Import
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Args, Debug)]
pub struct ImportCommand {
    #[command(flatten)]
    pub scope: ScopeArgs,

    /// JSON file with `entities` and `relationships` arrays
    pub file: PathBuf,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_optimize_flags() {
        let cli = Cli::try_parse_from([
            "membank", "optimize", "-r", "repo", "--dry-run", "--preserve", "decision",
            "--preserve", "rule", "--max-deletions", "3",
        ])
        .unwrap();

        let Commands::Optimize(cmd) = cli.command else {
            panic!("expected optimize");
        };
        assert_eq!(cmd.scope.repository, "repo");
        assert_eq!(cmd.scope.branch, "main");
        assert!(cmd.dry_run);
        assert!(!cmd.confirm);
        assert_eq!(cmd.preserve, vec!["decision", "rule"]);
        assert_eq!(cmd.max_deletions, Some(3));
    }

    #[test]
    fn test_snapshot_subcommands() {
        let cli = Cli::try_parse_from(["membank", "snapshots", "validate", "snap-1", "--json"]).unwrap();
        match cli.command {
            Commands::Snapshots(SnapshotsCommand {
                action: SnapshotsAction::Validate { snapshot_id, json },
            }) => {
                assert_eq!(snapshot_id, "snap-1");
                assert!(json);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_rollback_requires_snapshot() {
        assert!(Cli::try_parse_from(["membank", "rollback"]).is_err());
    }
}
