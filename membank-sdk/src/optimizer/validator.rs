//! Plan Validator
//!
//! Clamps a proposed plan to the bounds of a strategy.

use super::types::OptimizationPlan;
use crate::config::StrategyConfig;

/// Clamp `plan` to `config`.
///
/// Only the action count, `estimatedImpact.entitiesAffected` and
/// `safetyMeasures.confirmationRequired` can change. Action content and
/// `executionOrder` are left as proposed.
pub fn validate_plan(mut plan: OptimizationPlan, config: &StrategyConfig) -> OptimizationPlan {
    if plan.actions.len() > config.max_deletions {
        tracing::info!(
            "Plan {} proposes {} actions; keeping the first {}",
            plan.id,
            plan.actions.len(),
            config.max_deletions
        );
        plan.actions.truncate(config.max_deletions);
        plan.estimated_impact.entities_affected = plan.actions.len();
    }

    if config.requires_confirmation {
        plan.safety_measures.confirmation_required = true;
    }

    plan
}
