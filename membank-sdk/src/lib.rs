//! membank SDK - Memory Graph Optimization
//!
//! Keeps a branch-scoped memory bank from growing without bound. A run
//! samples the graph, asks a collaborator for an analysis and a plan,
//! clamps the plan to a risk strategy, snapshots the branch and then
//! applies the plan one action at a time. Any snapshot can be restored.
//!
//! # Modules
//!
//! - **optimizer** - the pipeline: context, sampling, collaborators,
//!   validation, snapshots, execution
//! - **config** - strategy bounds, sampling and snapshot settings
//! - **utils** - timestamp parsing and hashing helpers
//!
//! # Example
//!
//! ```rust,no_run
//! use membank_sdk::{MemoryOptimizer, OperationParams, OptimizerConfig};
//!
//! async fn example() -> anyhow::Result<()> {
//!     let optimizer = MemoryOptimizer::open(OptimizerConfig::new("membank.db"))?;
//!
//!     let report = optimizer.analyze(&OperationParams::new("my-repo", "main")).await?;
//!     println!(
//!         "health {:.2}, {} stale entities",
//!         report.analysis.summary.overall_health_score,
//!         report.analysis.summary.stale_entities_found
//!     );
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod optimizer;
pub mod utils;

mod error;
mod sdk;

pub use config::{
    ConfigValidationError, OptimizerConfig, SamplingConfig, SnapshotConfig, StrategyConfig,
    StrategyTable,
};
pub use error::{SDKError, SDKResult};
pub use optimizer::{
    AnalysisCollaborator, AnalysisResult, CompletionClient, ExecutionOptions,
    ExecutionOrchestrator, LlmCollaborator, OptimizationAction, OptimizationPlan,
    OptimizationResult, PlanCollaborator, RollbackReport, RuleBasedCollaborator,
    SamplingStrategy, SnapshotFailurePolicy, SnapshotValidation, Strategy,
};
pub use sdk::{AnalysisReport, MemoryOptimizer, OperationParams, OptimizationReport};
