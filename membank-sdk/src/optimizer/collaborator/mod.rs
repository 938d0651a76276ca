//! Analysis and plan collaborators.
//!
//! A collaborator decides *what* to optimize. The pipeline only relies on
//! the data contracts of [`AnalysisResult`] and [`OptimizationPlan`]; every
//! output is validated before use.

mod llm;
mod rule_based;

pub use llm::{CompletionClient, LlmCollaborator};
pub use rule_based::RuleBasedCollaborator;

use async_trait::async_trait;

use super::types::{
    AnalysisResult, ContextAnalysis, MemoryContext, MemorySample, OptimizationPlan, Strategy,
};
use crate::config::StrategyConfig;
use crate::error::SDKResult;

/// Input to an analysis.
#[derive(Debug, Clone)]
pub struct AnalysisRequest {
    pub memory_context: MemoryContext,
    pub sample: Option<MemorySample>,
    pub context_analysis: Option<ContextAnalysis>,
    pub strategy: Strategy,
    pub strategy_config: StrategyConfig,
    /// Caller-requested focus; empty means the strategy's own focus areas.
    pub focus_areas: Vec<String>,
}

impl AnalysisRequest {
    pub fn effective_focus_areas(&self) -> &[String] {
        effective_focus(&self.focus_areas, &self.strategy_config)
    }
}

/// Input to plan generation.
#[derive(Debug, Clone)]
pub struct PlanRequest {
    pub memory_context: MemoryContext,
    pub analysis_result: AnalysisResult,
    pub analysis_id: Option<String>,
    pub strategy: Strategy,
    pub strategy_config: StrategyConfig,
    pub focus_areas: Vec<String>,
}

impl PlanRequest {
    pub fn effective_focus_areas(&self) -> &[String] {
        effective_focus(&self.focus_areas, &self.strategy_config)
    }
}

fn effective_focus<'a>(requested: &'a [String], config: &'a StrategyConfig) -> &'a [String] {
    if requested.is_empty() {
        &config.focus_areas
    } else {
        requested
    }
}

/// Produces an [`AnalysisResult`] for a branch.
#[async_trait]
pub trait AnalysisCollaborator: Send + Sync {
    async fn analyze(&self, request: &AnalysisRequest) -> SDKResult<AnalysisResult>;
}

/// Produces an [`OptimizationPlan`] from an analysis.
#[async_trait]
pub trait PlanCollaborator: Send + Sync {
    async fn plan(&self, request: &PlanRequest) -> SDKResult<OptimizationPlan>;
}
