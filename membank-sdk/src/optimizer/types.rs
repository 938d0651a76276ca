//! Optimization Pipeline Types
//!
//! Wire shapes exchanged with collaborators and callers. All records
//! serialize in camelCase.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use membank_core::{Entity, EntityRef, EntityType, Relationship};
use serde::{Deserialize, Serialize};

use crate::error::{SDKError, SDKResult};

// ─────────────────────────────────────────────────────────────────────────────
// Strategies and Policies
// ─────────────────────────────────────────────────────────────────────────────

/// Named risk profile bounding how aggressively a run may mutate the graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    Conservative,
    Balanced,
    Aggressive,
}

impl Strategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::Conservative => "conservative",
            Strategy::Balanced => "balanced",
            Strategy::Aggressive => "aggressive",
        }
    }
}

impl std::fmt::Display for Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Strategy {
    type Err = SDKError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "conservative" => Ok(Strategy::Conservative),
            "balanced" => Ok(Strategy::Balanced),
            "aggressive" => Ok(Strategy::Aggressive),
            other => Err(SDKError::validation(format!(
                "unknown strategy '{}' (expected conservative, balanced or aggressive)",
                other
            ))),
        }
    }
}

/// Deterministic entity selection policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SamplingStrategy {
    #[default]
    Representative,
    Problematic,
    Recent,
    Diverse,
}

impl SamplingStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            SamplingStrategy::Representative => "representative",
            SamplingStrategy::Problematic => "problematic",
            SamplingStrategy::Recent => "recent",
            SamplingStrategy::Diverse => "diverse",
        }
    }
}

impl std::fmt::Display for SamplingStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for SamplingStrategy {
    type Err = SDKError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "representative" => Ok(SamplingStrategy::Representative),
            "problematic" => Ok(SamplingStrategy::Problematic),
            "recent" => Ok(SamplingStrategy::Recent),
            "diverse" => Ok(SamplingStrategy::Diverse),
            other => Err(SDKError::validation(format!(
                "unknown sampling strategy '{}'",
                other
            ))),
        }
    }
}

/// What to do when the pre-execution snapshot cannot be created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SnapshotFailurePolicy {
    /// Stop the run before any action executes.
    Abort,
    /// Proceed silently without a snapshot.
    Continue,
    /// Proceed without a snapshot and log a warning.
    #[default]
    Warn,
}

impl std::str::FromStr for SnapshotFailurePolicy {
    type Err = SDKError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "abort" => Ok(SnapshotFailurePolicy::Abort),
            "continue" => Ok(SnapshotFailurePolicy::Continue),
            "warn" => Ok(SnapshotFailurePolicy::Warn),
            other => Err(SDKError::validation(format!(
                "unknown snapshot failure policy '{}' (expected abort, continue or warn)",
                other
            ))),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Context and Sampling
// ─────────────────────────────────────────────────────────────────────────────

/// Whole-graph statistics for one repository+branch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryContext {
    pub repository: String,
    pub branch: String,
    /// Entity counts keyed by type label.
    pub entity_counts: BTreeMap<String, usize>,
    pub total_entities: usize,
    pub total_relationships: usize,
    /// Mean age in days over entities with a parseable creation timestamp.
    pub average_entity_age_days: f64,
    pub last_optimization: Option<DateTime<Utc>>,
}

/// Bounded subset of a branch used as collaborator input.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemorySample {
    pub entities: Vec<Entity>,
    /// Edges touching the sampled entities, possibly capped.
    pub relationships: Vec<Relationship>,
    /// Full incident relationship count per sampled entity, keyed by
    /// `"<type>:<id>"`. Unlike `relationships`, never truncated.
    #[serde(default)]
    pub degrees: BTreeMap<String, usize>,
    pub sampling_strategy: SamplingStrategy,
    pub sample_size: usize,
    pub metadata: SampleMetadata,
}

impl MemorySample {
    /// A sample with no content.
    pub fn empty() -> Self {
        Self {
            entities: Vec::new(),
            relationships: Vec::new(),
            degrees: BTreeMap::new(),
            sampling_strategy: SamplingStrategy::default(),
            sample_size: 0,
            metadata: SampleMetadata {
                total_entities: 0,
                total_relationships: 0,
                sampling_ratio: 0.0,
            },
        }
    }

    /// Record the full degree of each entity.
    pub fn with_degrees(mut self, degrees: HashMap<EntityRef, usize>) -> Self {
        self.degrees = degrees
            .into_iter()
            .map(|(entity, degree)| (entity.to_string(), degree))
            .collect();
        self
    }

    /// Full incident relationship count, when the sample carries one.
    pub fn degree_of(&self, entity: &EntityRef) -> Option<usize> {
        self.degrees.get(&entity.to_string()).copied()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SampleMetadata {
    pub total_entities: usize,
    pub total_relationships: usize,
    pub sampling_ratio: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AgeDistribution {
    pub recent: usize,
    pub medium: usize,
    pub old: usize,
}

impl AgeDistribution {
    pub fn total(&self) -> usize {
        self.recent + self.medium + self.old
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Maturity {
    New,
    Developing,
    Mature,
    Legacy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Activity {
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComplexityLevel {
    Simple,
    Moderate,
    Complex,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectCharacteristics {
    pub maturity: Maturity,
    pub activity: Activity,
    pub complexity: ComplexityLevel,
}

/// Descriptive metrics derived from a [`MemorySample`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextAnalysis {
    pub entity_types: BTreeMap<String, usize>,
    pub relationship_density: f64,
    pub age_distribution: AgeDistribution,
    pub complexity_score: u32,
    pub project_characteristics: ProjectCharacteristics,
    pub recommended_strategy: Strategy,
    pub focus_areas: Vec<String>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Analysis Result
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    #[default]
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisSummary {
    pub total_entities_analyzed: usize,
    pub stale_entities_found: usize,
    pub redundancy_groups_found: usize,
    pub optimization_opportunities: usize,
    pub overall_health_score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StaleEntity {
    pub id: String,
    #[serde(rename = "type")]
    pub entity_type: EntityType,
    #[serde(default)]
    pub name: String,
    pub staleness: f64,
    pub reason: String,
    pub safe_to_delete: bool,
    /// Entities that reference this one.
    #[serde(default)]
    pub dependencies: Vec<String>,
    /// Entities this one references.
    #[serde(default)]
    pub depends_on: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RedundancyGroup {
    pub entities: Vec<String>,
    pub similarity: f64,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub merge_recommendation: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_entity: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptimizationOpportunity {
    #[serde(rename = "type")]
    pub kind: String,
    pub description: String,
    #[serde(default)]
    pub entities: Vec<String>,
    #[serde(default)]
    pub priority: Priority,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct RiskAssessment {
    pub overall_risk: RiskLevel,
    #[serde(default)]
    pub critical_entities_at_risk: Vec<String>,
    #[serde(default)]
    pub safeguards_recommended: Vec<String>,
}

/// Analysis produced once per analyze call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    pub summary: AnalysisSummary,
    #[serde(default)]
    pub stale_entities: Vec<StaleEntity>,
    #[serde(default)]
    pub redundancies: Vec<RedundancyGroup>,
    #[serde(default)]
    pub optimization_opportunities: Vec<OptimizationOpportunity>,
    #[serde(default)]
    pub recommendations: Vec<String>,
    #[serde(default)]
    pub risk_assessment: RiskAssessment,
}

fn unit_interval(value: f64) -> bool {
    value.is_finite() && (0.0..=1.0).contains(&value)
}

impl AnalysisResult {
    /// Check the data contract. Violations are hard errors.
    pub fn validate(&self) -> SDKResult<()> {
        let violation = |message: String| Err(SDKError::schema("AnalysisResult", message));

        if !unit_interval(self.summary.overall_health_score) {
            return violation(format!(
                "summary.overallHealthScore {} is outside [0, 1]",
                self.summary.overall_health_score
            ));
        }

        for (i, stale) in self.stale_entities.iter().enumerate() {
            if stale.id.trim().is_empty() {
                return violation(format!("staleEntities[{}].id is empty", i));
            }
            if !unit_interval(stale.staleness) {
                return violation(format!(
                    "staleEntities[{}].staleness {} is outside [0, 1]",
                    i, stale.staleness
                ));
            }
        }

        for (i, group) in self.redundancies.iter().enumerate() {
            if group.entities.len() < 2 {
                return violation(format!(
                    "redundancies[{}] lists {} entities, at least 2 are required",
                    i,
                    group.entities.len()
                ));
            }
            if !unit_interval(group.similarity) {
                return violation(format!(
                    "redundancies[{}].similarity {} is outside [0, 1]",
                    i, group.similarity
                ));
            }
            if let Some(primary) = &group.primary_entity {
                if !group.entities.contains(primary) {
                    return violation(format!(
                        "redundancies[{}].primaryEntity {} is not a member of the group",
                        i, primary
                    ));
                }
            }
        }

        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Optimization Plan
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionType {
    Delete,
    Merge,
    Update,
    Move,
}

impl ActionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionType::Delete => "delete",
            ActionType::Merge => "merge",
            ActionType::Update => "update",
            ActionType::Move => "move",
        }
    }
}

impl std::fmt::Display for ActionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One proposed graph mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptimizationAction {
    #[serde(rename = "type")]
    pub action_type: ActionType,
    pub entity_id: String,
    /// Entity type when known; otherwise it is resolved from the store.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_type: Option<EntityType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_entity_id: Option<String>,
    /// Field updates for `update` actions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updates: Option<serde_json::Map<String, serde_json::Value>>,
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub safety_checks: Vec<String>,
}

impl OptimizationAction {
    pub fn new(action_type: ActionType, entity_id: impl Into<String>) -> Self {
        Self {
            action_type,
            entity_id: entity_id.into(),
            entity_type: None,
            target_entity_id: None,
            updates: None,
            reason: String::new(),
            priority: Priority::default(),
            safety_checks: Vec::new(),
        }
    }

    pub fn delete(entity_id: impl Into<String>) -> Self {
        Self::new(ActionType::Delete, entity_id)
    }

    pub fn merge(entity_id: impl Into<String>, target: impl Into<String>) -> Self {
        Self::new(ActionType::Merge, entity_id).with_target(target)
    }

    pub fn update(
        entity_id: impl Into<String>,
        updates: serde_json::Map<String, serde_json::Value>,
    ) -> Self {
        let mut action = Self::new(ActionType::Update, entity_id);
        action.updates = Some(updates);
        action
    }

    pub fn relocate(entity_id: impl Into<String>, target: impl Into<String>) -> Self {
        Self::new(ActionType::Move, entity_id).with_target(target)
    }

    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target_entity_id = Some(target.into());
        self
    }

    pub fn with_entity_type(mut self, entity_type: EntityType) -> Self {
        self.entity_type = Some(entity_type);
        self
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = reason.into();
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Stable identifier used in execution results.
    pub fn id(&self) -> String {
        format!("{}-{}", self.action_type, self.entity_id)
    }

    /// Entity type from the action, or from the id prefix.
    pub fn known_entity_type(&self) -> Option<EntityType> {
        self.entity_type
            .or_else(|| EntityType::from_id_prefix(&self.entity_id))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct EstimatedImpact {
    pub entities_affected: usize,
    #[serde(default)]
    pub relationships_affected: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SafetyMeasures {
    pub snapshot_required: bool,
    pub confirmation_required: bool,
    #[serde(default)]
    pub rollback_plan: String,
}

impl Default for SafetyMeasures {
    fn default() -> Self {
        Self {
            snapshot_required: true,
            confirmation_required: true,
            rollback_plan: String::new(),
        }
    }
}

/// Bounded mutation plan for one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptimizationPlan {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analysis_id: Option<String>,
    pub strategy: Strategy,
    pub actions: Vec<OptimizationAction>,
    #[serde(default)]
    pub estimated_impact: EstimatedImpact,
    #[serde(default)]
    pub safety_measures: SafetyMeasures,
    /// Entity ids in iteration order, looked up against `actions` by `entityId`.
    #[serde(default)]
    pub execution_order: Vec<String>,
}

impl OptimizationPlan {
    /// Check the data contract. Violations are hard errors.
    pub fn validate(&self) -> SDKResult<()> {
        let violation = |message: String| Err(SDKError::schema("OptimizationPlan", message));

        if self.id.trim().is_empty() {
            return violation("plan id is empty".to_string());
        }

        for (i, action) in self.actions.iter().enumerate() {
            if action.entity_id.trim().is_empty() {
                return violation(format!("actions[{}].entityId is empty", i));
            }
            let needs_target = matches!(action.action_type, ActionType::Merge | ActionType::Move);
            let has_target = action
                .target_entity_id
                .as_deref()
                .is_some_and(|t| !t.trim().is_empty());
            if needs_target && !has_target {
                return violation(format!(
                    "actions[{}] ({} {}) requires targetEntityId",
                    i, action.action_type, action.entity_id
                ));
            }
        }

        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Execution
// ─────────────────────────────────────────────────────────────────────────────

/// Options for one plan execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutionOptions {
    pub dry_run: bool,
    /// The plan must be explicitly confirmed before mutating.
    pub require_confirmation: bool,
    /// The caller confirmed the run.
    pub confirmed: bool,
    pub create_snapshot: bool,
    /// Overrides the orchestrator's configured default.
    pub snapshot_failure_policy: Option<SnapshotFailurePolicy>,
}

impl Default for ExecutionOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            require_confirmation: false,
            confirmed: false,
            create_snapshot: true,
            snapshot_failure_policy: None,
        }
    }
}

impl ExecutionOptions {
    pub fn dry_run() -> Self {
        Self {
            dry_run: true,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionStatus {
    Success,
    Failed,
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutedAction {
    pub action_id: String,
    pub status: ActionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Aggregate run status. Isolated action failures yield `Partial`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Success,
    Partial,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Success => "success",
            RunStatus::Partial => "partial",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptimizationSummary {
    pub entities_deleted: usize,
    pub entities_merged: usize,
    pub entities_updated: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptimizationResult {
    pub plan_id: String,
    pub status: RunStatus,
    pub executed_actions: Vec<ExecutedAction>,
    pub summary: OptimizationSummary,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snapshot_id: Option<String>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Snapshots
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotValidation {
    pub valid: bool,
    pub issues: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_count: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relationship_count: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RollbackOutcome {
    pub success: bool,
    pub snapshot_id: String,
    pub restored_entities: usize,
    pub restored_relationships: usize,
    /// Elapsed milliseconds.
    pub rollback_time: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RollbackReport {
    pub message: String,
    pub outcome: RollbackOutcome,
}
