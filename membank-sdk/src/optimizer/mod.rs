//! Memory graph optimization pipeline.
//!
//! - **context** - whole-branch statistics
//! - **sampling** - bounded entity samples and descriptive metrics
//! - **collaborator** - analysis and plan producers
//! - **validator** - strategy bounds for proposed plans
//! - **snapshot** - point-in-time captures and rollback
//! - **executor** - single mutation actions
//! - **orchestrator** - one safe run of a plan

pub mod collaborator;
pub mod context;
pub mod executor;
pub mod orchestrator;
pub mod sampling;
pub mod snapshot;
pub mod types;
pub mod validator;

pub use collaborator::{
    AnalysisCollaborator, AnalysisRequest, CompletionClient, LlmCollaborator, PlanCollaborator,
    PlanRequest, RuleBasedCollaborator,
};
pub use context::ContextBuilder;
pub use executor::{ActionExecutor, UPDATABLE_FIELDS};
pub use orchestrator::ExecutionOrchestrator;
pub use sampling::SamplingEngine;
pub use snapshot::SnapshotManager;
pub use types::*;
pub use validator::validate_plan;
