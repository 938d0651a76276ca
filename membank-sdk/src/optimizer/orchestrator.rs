//! Execution Orchestrator
//!
//! Runs one validated plan against a branch:
//!
//! 1. Snapshot phase (skipped for dry runs or when disabled), governed by the
//!    snapshot failure policy.
//! 2. Execution phase: actions in `executionOrder`, strictly one after another.
//!    A failing action is recorded and the loop moves on.
//! 3. Aggregation into an [`OptimizationResult`].
//!
//! Rollback is a separate flow: validate the snapshot, then restore it.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::Utc;
use membank_core::{BranchScope, EntityStore, GraphQuery, OptimizationRunRecord, SnapshotStore};

use super::executor::ActionExecutor;
use super::snapshot::SnapshotManager;
use super::types::{
    ActionStatus, ActionType, ExecutedAction, ExecutionOptions, OptimizationAction,
    OptimizationPlan, OptimizationResult, OptimizationSummary, RollbackReport, RunStatus,
    SnapshotFailurePolicy,
};
use crate::error::{SDKError, SDKResult};

pub struct ExecutionOrchestrator {
    executor: ActionExecutor,
    snapshots: SnapshotManager,
    history: Arc<dyn EntityStore>,
    default_failure_policy: SnapshotFailurePolicy,
}

impl ExecutionOrchestrator {
    pub fn new(
        graph: Arc<dyn GraphQuery>,
        entities: Arc<dyn EntityStore>,
        snapshots: Arc<dyn SnapshotStore>,
    ) -> Self {
        Self {
            executor: ActionExecutor::new(entities.clone()),
            snapshots: SnapshotManager::new(graph, snapshots),
            history: entities,
            default_failure_policy: SnapshotFailurePolicy::default(),
        }
    }

    /// Policy used when the options do not name one.
    pub fn with_snapshot_failure_policy(mut self, policy: SnapshotFailurePolicy) -> Self {
        self.default_failure_policy = policy;
        self
    }

    pub fn snapshots(&self) -> &SnapshotManager {
        &self.snapshots
    }

    /// Execute `plan` inside `scope`.
    ///
    /// Only setup failures are returned as errors. Action failures are
    /// recorded in the result.
    pub async fn execute_optimization_plan(
        &self,
        scope: &BranchScope,
        plan: &OptimizationPlan,
        options: &ExecutionOptions,
    ) -> SDKResult<OptimizationResult> {
        if !options.dry_run && options.require_confirmation && !options.confirmed {
            return Err(SDKError::operation("Optimization", SDKError::ConfirmationRequired));
        }

        let snapshot_id = if options.dry_run || !options.create_snapshot {
            None
        } else {
            self.snapshot_phase(scope, plan, options).await?
        };

        let mut lookup: HashMap<&str, &OptimizationAction> = HashMap::with_capacity(plan.actions.len());
        for action in &plan.actions {
            lookup.entry(action.entity_id.as_str()).or_insert(action);
        }

        tracing::info!(
            "Executing plan {} on {} ({} actions{})",
            plan.id,
            scope,
            plan.execution_order.len(),
            if options.dry_run { ", dry run" } else { "" }
        );

        let mut executed_actions = Vec::with_capacity(plan.execution_order.len());
        let mut summary = OptimizationSummary::default();
        let mut seen: HashSet<&str> = HashSet::new();

        for entity_id in &plan.execution_order {
            let Some(action) = lookup.get(entity_id.as_str()).copied() else {
                tracing::warn!("No action for {} in plan {}; skipping", entity_id, plan.id);
                continue;
            };

            if !seen.insert(entity_id.as_str()) {
                executed_actions.push(ExecutedAction {
                    action_id: action.id(),
                    status: ActionStatus::Skipped,
                    error: Some(format!("{} appears more than once in executionOrder", entity_id)),
                });
                continue;
            }

            if options.dry_run {
                executed_actions.push(ExecutedAction {
                    action_id: action.id(),
                    status: ActionStatus::Success,
                    error: None,
                });
                continue;
            }

            match self.executor.execute_action(scope, action).await {
                Ok(()) => {
                    match action.action_type {
                        ActionType::Delete => summary.entities_deleted += 1,
                        ActionType::Merge => summary.entities_merged += 1,
                        ActionType::Update => summary.entities_updated += 1,
                        ActionType::Move => {}
                    }
                    executed_actions.push(ExecutedAction {
                        action_id: action.id(),
                        status: ActionStatus::Success,
                        error: None,
                    });
                }
                Err(e) => {
                    tracing::warn!("Action {} failed: {}", action.id(), e);
                    executed_actions.push(ExecutedAction {
                        action_id: action.id(),
                        status: ActionStatus::Failed,
                        error: Some(e.to_string()),
                    });
                }
            }
        }

        let status = if executed_actions
            .iter()
            .all(|a| a.status == ActionStatus::Success)
        {
            RunStatus::Success
        } else {
            RunStatus::Partial
        };

        let result = OptimizationResult {
            plan_id: plan.id.clone(),
            status,
            executed_actions,
            summary,
            snapshot_id,
        };

        if !options.dry_run {
            self.record_run(scope, plan, &result).await;
        }

        tracing::info!(
            "Plan {} finished: {} ({} deleted, {} merged, {} updated)",
            plan.id,
            result.status.as_str(),
            result.summary.entities_deleted,
            result.summary.entities_merged,
            result.summary.entities_updated
        );
        Ok(result)
    }

    /// Validate then restore a snapshot, returning a readable summary.
    pub async fn rollback_to_snapshot(&self, snapshot_id: &str) -> SDKResult<RollbackReport> {
        let outcome = self
            .snapshots
            .rollback_to_snapshot(snapshot_id)
            .await
            .map_err(|e| SDKError::operation("Rollback", e))?;

        let message = format!(
            "Rolled back to snapshot {}: restored {} entities and {} relationships",
            outcome.snapshot_id, outcome.restored_entities, outcome.restored_relationships
        );
        Ok(RollbackReport { message, outcome })
    }

    async fn snapshot_phase(
        &self,
        scope: &BranchScope,
        plan: &OptimizationPlan,
        options: &ExecutionOptions,
    ) -> SDKResult<Option<String>> {
        let description = format!("Before optimization plan {} ({})", plan.id, plan.strategy);
        let error = match self.snapshots.create_snapshot(scope, description).await {
            Ok(snapshot) => return Ok(Some(snapshot.snapshot_id)),
            Err(e) => e,
        };

        let policy = options
            .snapshot_failure_policy
            .unwrap_or(self.default_failure_policy);
        match policy {
            SnapshotFailurePolicy::Abort => Err(SDKError::operation(
                "Optimization",
                SDKError::snapshot_failure(format!(
                    "{}; aborting because rollback would be unavailable",
                    error
                )),
            )),
            SnapshotFailurePolicy::Continue => Ok(None),
            SnapshotFailurePolicy::Warn => {
                tracing::warn!(
                    "Snapshot for plan {} failed ({}); continuing, rollback will be unavailable",
                    plan.id,
                    error
                );
                Ok(None)
            }
        }
    }

    async fn record_run(&self, scope: &BranchScope, plan: &OptimizationPlan, result: &OptimizationResult) {
        let record = OptimizationRunRecord {
            plan_id: plan.id.clone(),
            repository: scope.repository.clone(),
            branch: scope.branch.clone(),
            strategy: plan.strategy.to_string(),
            status: result.status.as_str().to_string(),
            entities_deleted: result.summary.entities_deleted,
            entities_merged: result.summary.entities_merged,
            entities_updated: result.summary.entities_updated,
            snapshot_id: result.snapshot_id.clone(),
            executed_at: Utc::now(),
        };
        if let Err(e) = self.history.record_optimization_run(&record).await {
            tracing::warn!("Failed to record optimization run {}: {}", plan.id, e);
        }
    }
}
