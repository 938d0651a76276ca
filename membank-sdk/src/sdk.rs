//! Caller-facing operation surface.
//!
//! [`MemoryOptimizer`] ties the pipeline together: context, sampling,
//! collaborators, plan validation and execution. Each operation takes
//! [`OperationParams`].

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use membank_core::{
    BranchScope, EntityStore, EntityType, GraphQuery, Snapshot, SnapshotStore, SqliteGraphStore,
};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::config::{OptimizerConfig, StrategyConfig};
use crate::error::{SDKError, SDKResult};
use crate::optimizer::sampling;
use crate::optimizer::{
    AnalysisCollaborator, AnalysisRequest, AnalysisResult, ContextAnalysis, ContextBuilder,
    ExecutionOptions, ExecutionOrchestrator, MemoryContext, OptimizationPlan, OptimizationResult,
    PlanCollaborator, PlanRequest, RollbackReport, RuleBasedCollaborator, SampleMetadata,
    SamplingEngine, SamplingStrategy, SnapshotFailurePolicy, SnapshotValidation, Strategy,
    validate_plan,
};

/// Analyses kept for reuse by a later `optimize`; the oldest is evicted first.
const MAX_CACHED_ANALYSES: usize = 32;

/// Parameters shared by every operation.
#[derive(Debug, Clone, Default)]
pub struct OperationParams {
    pub repository: String,
    pub branch: String,
    /// Defaults to the strategy recommended by the context analysis.
    pub strategy: Option<Strategy>,
    pub dry_run: bool,
    pub confirm: bool,
    /// Can only lower the strategy's own bound.
    pub max_deletions: Option<usize>,
    pub focus_areas: Vec<String>,
    /// Entity types no action may touch.
    pub preserve_categories: Vec<EntityType>,
    pub snapshot_id: Option<String>,
    pub analysis_id: Option<String>,
    pub snapshot_failure_policy: Option<SnapshotFailurePolicy>,
    pub sampling_strategy: Option<SamplingStrategy>,
    pub sample_size: Option<usize>,
}

impl OperationParams {
    pub fn new(repository: impl Into<String>, branch: impl Into<String>) -> Self {
        Self {
            repository: repository.into(),
            branch: branch.into(),
            ..Default::default()
        }
    }

    pub fn with_strategy(mut self, strategy: Strategy) -> Self {
        self.strategy = Some(strategy);
        self
    }

    pub fn dry_run(mut self) -> Self {
        self.dry_run = true;
        self
    }

    pub fn confirmed(mut self) -> Self {
        self.confirm = true;
        self
    }

    pub fn with_max_deletions(mut self, max: usize) -> Self {
        self.max_deletions = Some(max);
        self
    }

    pub fn with_focus_areas(mut self, areas: Vec<String>) -> Self {
        self.focus_areas = areas;
        self
    }

    pub fn preserving(mut self, categories: Vec<EntityType>) -> Self {
        self.preserve_categories = categories;
        self
    }

    pub fn with_snapshot_id(mut self, snapshot_id: impl Into<String>) -> Self {
        self.snapshot_id = Some(snapshot_id.into());
        self
    }

    pub fn with_analysis_id(mut self, analysis_id: impl Into<String>) -> Self {
        self.analysis_id = Some(analysis_id.into());
        self
    }

    pub fn with_snapshot_failure_policy(mut self, policy: SnapshotFailurePolicy) -> Self {
        self.snapshot_failure_policy = Some(policy);
        self
    }

    pub fn with_sampling(mut self, strategy: SamplingStrategy, sample_size: usize) -> Self {
        self.sampling_strategy = Some(strategy);
        self.sample_size = Some(sample_size);
        self
    }

    pub fn scope(&self) -> BranchScope {
        BranchScope::new(self.repository.clone(), self.branch.clone())
    }

    fn require_scope(&self) -> SDKResult<BranchScope> {
        if self.repository.trim().is_empty() {
            return Err(SDKError::validation("repository is required"));
        }
        if self.branch.trim().is_empty() {
            return Err(SDKError::validation("branch is required"));
        }
        Ok(self.scope())
    }
}

/// Outcome of `analyze`, cached under `analysis_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisReport {
    pub analysis_id: String,
    pub repository: String,
    pub branch: String,
    pub strategy: Strategy,
    pub memory_context: MemoryContext,
    pub context_analysis: ContextAnalysis,
    pub sampling_strategy: SamplingStrategy,
    pub sample_metadata: SampleMetadata,
    pub analysis: AnalysisResult,
}

/// Outcome of `optimize`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptimizationReport {
    pub analysis_id: String,
    pub plan: OptimizationPlan,
    pub result: OptimizationResult,
}

/// Memory bank optimizer.
///
/// # Example
///
/// ```rust,no_run
/// use membank_sdk::{MemoryOptimizer, OperationParams, OptimizerConfig, Strategy};
///
/// async fn example() -> anyhow::Result<()> {
///     let optimizer = MemoryOptimizer::open(OptimizerConfig::new("membank.db"))?;
///
///     let params = OperationParams::new("my-repo", "main").with_strategy(Strategy::Conservative);
///     let preview = optimizer.optimize(&params.clone().dry_run()).await?;
///     println!("{} actions planned", preview.plan.actions.len());
///
///     let applied = optimizer.optimize(&params.confirmed()).await?;
///     println!("snapshot: {:?}", applied.result.snapshot_id);
///     Ok(())
/// }
/// ```
pub struct MemoryOptimizer {
    config: OptimizerConfig,
    context: ContextBuilder,
    sampling: SamplingEngine,
    orchestrator: ExecutionOrchestrator,
    analyst: Arc<dyn AnalysisCollaborator>,
    planner: Arc<dyn PlanCollaborator>,
    analyses: RwLock<VecDeque<AnalysisReport>>,
}

impl MemoryOptimizer {
    /// Assemble an optimizer from explicit stores and collaborators.
    pub fn new(
        config: OptimizerConfig,
        graph: Arc<dyn GraphQuery>,
        entities: Arc<dyn EntityStore>,
        snapshots: Arc<dyn SnapshotStore>,
        analyst: Arc<dyn AnalysisCollaborator>,
        planner: Arc<dyn PlanCollaborator>,
    ) -> SDKResult<Self> {
        config.validate()?;

        let orchestrator = ExecutionOrchestrator::new(graph.clone(), entities, snapshots)
            .with_snapshot_failure_policy(config.snapshots.failure_policy);
        Ok(Self {
            context: ContextBuilder::new(graph.clone()),
            sampling: SamplingEngine::new(graph).with_relationship_cap(config.sampling.relationship_cap),
            orchestrator,
            analyst,
            planner,
            analyses: RwLock::new(VecDeque::new()),
            config,
        })
    }

    /// Optimizer over a SQLite store with the rule-based collaborator.
    pub fn from_store(config: OptimizerConfig, store: Arc<SqliteGraphStore>) -> SDKResult<Self> {
        let collaborator = Arc::new(RuleBasedCollaborator::new());
        Self::new(
            config,
            store.clone(),
            store.clone(),
            store,
            collaborator.clone(),
            collaborator,
        )
    }

    /// Open the database named by the configuration.
    pub fn open(config: OptimizerConfig) -> SDKResult<Self> {
        config.validate()?;
        let store = Arc::new(SqliteGraphStore::open(&config.database_path)?);
        Self::from_store(config, store)
    }

    pub fn config(&self) -> &OptimizerConfig {
        &self.config
    }

    /// A cached analysis.
    pub async fn analysis(&self, analysis_id: &str) -> Option<AnalysisReport> {
        self.analyses
            .read()
            .await
            .iter()
            .find(|r| r.analysis_id == analysis_id)
            .cloned()
    }

    /// Analyze a branch and cache the report.
    pub async fn analyze(&self, params: &OperationParams) -> SDKResult<AnalysisReport> {
        self.run_analysis(params)
            .await
            .map_err(|e| SDKError::operation("Analysis", e))
    }

    /// Plan, validate and execute an optimization.
    ///
    /// A non-dry-run call without `confirm` is rejected before the graph is read.
    pub async fn optimize(&self, params: &OperationParams) -> SDKResult<OptimizationReport> {
        if !params.dry_run && !params.confirm {
            return Err(SDKError::operation(
                "Optimization",
                SDKError::ConfirmationRequired,
            ));
        }
        self.run_optimization(params)
            .await
            .map_err(|e| SDKError::operation("Optimization", e))
    }

    /// Restore a branch from a snapshot.
    pub async fn rollback(&self, params: &OperationParams) -> SDKResult<RollbackReport> {
        let snapshot_id = params.snapshot_id.as_deref().ok_or_else(|| {
            SDKError::operation(
                "Rollback",
                SDKError::validation("snapshot id is required for rollback"),
            )
        })?;

        let snapshot = self
            .orchestrator
            .snapshots()
            .get_snapshot(snapshot_id)
            .await
            .map_err(|e| SDKError::operation("Rollback", e))?;
        // Repository and branch are optional expectations here
        if let Some(snapshot) = &snapshot {
            let repository_differs =
                !params.repository.is_empty() && params.repository != snapshot.repository;
            let branch_differs = !params.branch.is_empty() && params.branch != snapshot.branch;
            if repository_differs || branch_differs {
                return Err(SDKError::operation(
                    "Rollback",
                    SDKError::validation(format!(
                        "snapshot {} belongs to {}, not {}",
                        snapshot_id,
                        snapshot.scope(),
                        params.scope()
                    )),
                ));
            }
        }

        self.orchestrator.rollback_to_snapshot(snapshot_id).await
    }

    /// Snapshots for the repository, narrowed to the branch when one is given.
    pub async fn list_snapshots(&self, params: &OperationParams) -> SDKResult<Vec<Snapshot>> {
        if params.repository.trim().is_empty() {
            return Err(SDKError::validation("repository is required"));
        }
        let branch = Some(params.branch.as_str()).filter(|b| !b.trim().is_empty());
        self.orchestrator
            .snapshots()
            .list_snapshots(&params.repository, branch)
            .await
    }

    pub async fn validate_snapshot(&self, snapshot_id: &str) -> SDKResult<SnapshotValidation> {
        self.orchestrator.snapshots().validate_snapshot(snapshot_id).await
    }

    pub async fn delete_snapshot(&self, snapshot_id: &str) -> SDKResult<()> {
        self.orchestrator.snapshots().delete_snapshot(snapshot_id).await
    }

    fn strategy_config(&self, strategy: Strategy, max_deletions: Option<usize>) -> StrategyConfig {
        let mut config = self.config.strategies.get(strategy).clone();
        if let Some(max) = max_deletions {
            config.max_deletions = config.max_deletions.min(max);
        }
        config
    }

    async fn run_analysis(&self, params: &OperationParams) -> SDKResult<AnalysisReport> {
        let scope = params.require_scope()?;
        let memory_context = self.context.build(&scope).await?;

        let sampling_strategy = params
            .sampling_strategy
            .unwrap_or(self.config.sampling.default_strategy);
        let sample_size = params
            .sample_size
            .unwrap_or(self.config.sampling.default_sample_size);
        let sample = self
            .sampling
            .sample(&scope, sampling_strategy, sample_size)
            .await?;
        let context_analysis = sampling::analyze(&sample);

        let strategy = params
            .strategy
            .unwrap_or(context_analysis.recommended_strategy);
        let sample_metadata = sample.metadata.clone();
        let request = AnalysisRequest {
            memory_context: memory_context.clone(),
            sample: Some(sample),
            context_analysis: Some(context_analysis.clone()),
            strategy,
            strategy_config: self.strategy_config(strategy, params.max_deletions),
            focus_areas: params.focus_areas.clone(),
        };
        let analysis = self.analyst.analyze(&request).await?;
        analysis.validate()?;

        let report = AnalysisReport {
            analysis_id: format!("analysis-{}", Uuid::new_v4()),
            repository: scope.repository.clone(),
            branch: scope.branch.clone(),
            strategy,
            memory_context,
            context_analysis,
            sampling_strategy,
            sample_metadata,
            analysis,
        };
        tracing::info!(
            "Analysis {} of {}: {} stale, {} redundancy groups, health {:.2}",
            report.analysis_id,
            scope,
            report.analysis.summary.stale_entities_found,
            report.analysis.summary.redundancy_groups_found,
            report.analysis.summary.overall_health_score
        );

        let mut analyses = self.analyses.write().await;
        analyses.push_back(report.clone());
        while analyses.len() > MAX_CACHED_ANALYSES {
            analyses.pop_front();
        }
        Ok(report)
    }

    async fn run_optimization(&self, params: &OperationParams) -> SDKResult<OptimizationReport> {
        let scope = params.require_scope()?;

        let cached = match params.analysis_id.as_deref() {
            Some(id) => {
                let found = self.analysis(id).await;
                if found.is_none() {
                    tracing::debug!("Analysis {} not cached; running a fresh analysis", id);
                }
                found.filter(|r| scope.contains(&r.repository, &r.branch))
            }
            None => None,
        };
        let report = match cached {
            Some(report) => report,
            None => self.run_analysis(params).await?,
        };

        let strategy = params.strategy.unwrap_or(report.strategy);
        let strategy_config = self.strategy_config(strategy, params.max_deletions);

        let request = PlanRequest {
            memory_context: report.memory_context.clone(),
            analysis_result: report.analysis.clone(),
            analysis_id: Some(report.analysis_id.clone()),
            strategy,
            strategy_config: strategy_config.clone(),
            focus_areas: params.focus_areas.clone(),
        };
        let mut plan = self.planner.plan(&request).await?;
        plan.validate()?;

        if !params.preserve_categories.is_empty() {
            let mut dropped = HashSet::new();
            plan.actions.retain(|action| match action.known_entity_type() {
                Some(t) if params.preserve_categories.contains(&t) => {
                    dropped.insert(action.entity_id.clone());
                    false
                }
                _ => true,
            });
            plan.execution_order.retain(|id| !dropped.contains(id));
            if !dropped.is_empty() {
                tracing::info!("Dropped {} actions on preserved categories", dropped.len());
            }
        }

        let plan = validate_plan(plan, &strategy_config);

        let options = ExecutionOptions {
            dry_run: params.dry_run,
            require_confirmation: plan.safety_measures.confirmation_required,
            confirmed: params.confirm,
            create_snapshot: self.config.snapshots.create_by_default
                || plan.safety_measures.snapshot_required,
            snapshot_failure_policy: params.snapshot_failure_policy,
        };
        let result = self
            .orchestrator
            .execute_optimization_plan(&scope, &plan, &options)
            .await?;

        // The graph has changed, so the analysis no longer describes it
        if !params.dry_run {
            self.analyses
                .write()
                .await
                .retain(|r| r.analysis_id != report.analysis_id);
        }

        Ok(OptimizationReport {
            analysis_id: report.analysis_id,
            plan,
            result,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use membank_core::{DEPENDS_ON, Entity, EntityFilter, EntityRef, GraphDocument, RELATED_TO, Relationship};
    use tempfile::TempDir;

    use crate::optimizer::{ActionStatus, ActionType, RunStatus};

    fn scope() -> BranchScope {
        BranchScope::new("repo", "main")
    }

    async fn seeded() -> (MemoryOptimizer, Arc<SqliteGraphStore>) {
        let store = Arc::new(SqliteGraphStore::open_in_memory().unwrap());
        let s = scope();
        let old = "2020-01-01T00:00:00Z";
        let api = EntityRef::new("comp-api", EntityType::Component);
        let db = EntityRef::new("comp-db", EntityType::Component);
        let dec = EntityRef::new("dec-1", EntityType::Decision);
        store
            .import(
                &s,
                &GraphDocument {
                    entities: vec![
                        Entity::new(&s, EntityType::Component, "comp-api", "API").with_created_at(old),
                        Entity::new(&s, EntityType::Component, "comp-db", "Database").with_created_at(old),
                        Entity::new(&s, EntityType::Component, "comp-orphan", "Orphan").with_created_at(old),
                        Entity::new(&s, EntityType::Tag, "tag-x", "x").with_created_at(old),
                        Entity::new(&s, EntityType::Decision, "dec-1", "Use SQLite").with_created_at(old),
                    ],
                    relationships: vec![
                        Relationship::new(&s, &api, DEPENDS_ON, &db),
                        Relationship::new(&s, &dec, RELATED_TO, &api),
                    ],
                },
            )
            .await
            .unwrap();
        let optimizer = MemoryOptimizer::from_store(OptimizerConfig::default(), store.clone()).unwrap();
        (optimizer, store)
    }

    async fn entity_ids(store: &SqliteGraphStore) -> Vec<String> {
        store
            .entities(&scope(), &EntityFilter::all())
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.id)
            .collect()
    }

    fn params() -> OperationParams {
        OperationParams::new("repo", "main").with_strategy(Strategy::Balanced)
    }

    #[tokio::test]
    async fn test_analyze_reports_and_caches() {
        let (optimizer, _store) = seeded().await;

        let report = optimizer.analyze(&params()).await.unwrap();
        assert!(report.analysis_id.starts_with("analysis-"));
        assert_eq!(report.memory_context.total_entities, 5);
        assert_eq!(report.sample_metadata.total_entities, 5);
        assert_eq!(report.strategy, Strategy::Balanced);

        let stale: Vec<_> = report
            .analysis
            .stale_entities
            .iter()
            .map(|s| s.id.as_str())
            .collect();
        assert_eq!(stale, vec!["comp-orphan", "tag-x"]);

        let cached = optimizer.analysis(&report.analysis_id).await.unwrap();
        assert_eq!(cached.analysis, report.analysis);
    }

    #[tokio::test]
    async fn test_analyze_empty_branch_fails() {
        let (optimizer, _store) = seeded().await;
        let err = optimizer
            .analyze(&OperationParams::new("repo", "feature"))
            .await
            .unwrap_err();
        assert!(err.to_string().starts_with("Analysis failed:"));
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_missing_scope_is_validation_error() {
        let (optimizer, _store) = seeded().await;
        let err = optimizer
            .analyze(&OperationParams::new("", "main"))
            .await
            .unwrap_err();
        assert!(err.is_validation());
    }

    #[tokio::test]
    async fn test_unconfirmed_optimize_is_rejected() {
        let (optimizer, store) = seeded().await;
        let err = optimizer.optimize(&params()).await.unwrap_err();

        assert!(matches!(err.root(), SDKError::ConfirmationRequired));
        assert!(err.to_string().starts_with("Optimization failed:"));
        assert_eq!(entity_ids(&store).await.len(), 5);
    }

    #[tokio::test]
    async fn test_dry_run_plans_without_mutating() {
        let (optimizer, store) = seeded().await;
        let report = optimizer.optimize(&params().dry_run()).await.unwrap();

        assert_eq!(report.plan.actions.len(), 2);
        assert_eq!(report.result.status, RunStatus::Success);
        assert!(report
            .result
            .executed_actions
            .iter()
            .all(|a| a.status == ActionStatus::Success));
        assert_eq!(report.result.snapshot_id, None);
        assert_eq!(entity_ids(&store).await.len(), 5);
        assert!(optimizer
            .list_snapshots(&OperationParams::new("repo", ""))
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_optimize_then_rollback() {
        let (optimizer, store) = seeded().await;
        let report = optimizer.optimize(&params().confirmed()).await.unwrap();

        assert_eq!(report.result.status, RunStatus::Success);
        assert_eq!(report.result.summary.entities_deleted, 2);
        assert_eq!(entity_ids(&store).await, vec!["comp-api", "comp-db", "dec-1"]);

        let snapshot_id = report.result.snapshot_id.clone().unwrap();
        let snapshots = optimizer.list_snapshots(&params()).await.unwrap();
        assert_eq!(snapshots.len(), 1);
        assert_eq!(snapshots[0].snapshot_id, snapshot_id);
        assert!(optimizer.validate_snapshot(&snapshot_id).await.unwrap().valid);

        let rollback = optimizer
            .rollback(&params().with_snapshot_id(snapshot_id))
            .await
            .unwrap();
        assert!(rollback.outcome.success);
        assert_eq!(rollback.outcome.restored_entities, 5);
        assert_eq!(rollback.outcome.restored_relationships, 2);
        assert_eq!(entity_ids(&store).await.len(), 5);
    }

    #[tokio::test]
    async fn test_preserved_categories_are_untouched() {
        let (optimizer, store) = seeded().await;
        let report = optimizer
            .optimize(&params().confirmed().preserving(vec![EntityType::Component]))
            .await
            .unwrap();

        assert_eq!(report.plan.actions.len(), 1);
        assert_eq!(report.plan.actions[0].entity_id, "tag-x");
        assert_eq!(report.plan.execution_order, vec!["tag-x".to_string()]);
        assert!(entity_ids(&store).await.contains(&"comp-orphan".to_string()));
    }

    #[tokio::test]
    async fn test_max_deletions_lowers_bound() {
        let (optimizer, store) = seeded().await;
        let report = optimizer
            .optimize(&params().confirmed().with_max_deletions(1))
            .await
            .unwrap();

        assert_eq!(report.plan.actions.len(), 1);
        assert_eq!(report.plan.actions[0].action_type, ActionType::Delete);
        assert_eq!(report.result.summary.entities_deleted, 1);
        assert_eq!(entity_ids(&store).await.len(), 4);

        // A larger request cannot raise the strategy bound
        assert_eq!(optimizer.strategy_config(Strategy::Conservative, Some(500)).max_deletions, 5);
    }

    #[tokio::test]
    async fn test_cached_analysis_is_reused() {
        let (optimizer, _store) = seeded().await;
        let analysis = optimizer.analyze(&params()).await.unwrap();

        let report = optimizer
            .optimize(&params().dry_run().with_analysis_id(analysis.analysis_id.clone()))
            .await
            .unwrap();
        assert_eq!(report.analysis_id, analysis.analysis_id);
        assert_eq!(report.plan.analysis_id.as_deref(), Some(analysis.analysis_id.as_str()));

        // Unknown ids fall back to a fresh analysis
        let fresh = optimizer
            .optimize(&params().dry_run().with_analysis_id("analysis-unknown"))
            .await
            .unwrap();
        assert_ne!(fresh.analysis_id, "analysis-unknown");
    }

    #[tokio::test]
    async fn test_analysis_cache_is_bounded_and_consumed() {
        let (optimizer, _store) = seeded().await;
        let mut ids = Vec::new();
        for _ in 0..MAX_CACHED_ANALYSES + 3 {
            ids.push(optimizer.analyze(&params()).await.unwrap().analysis_id);
        }
        assert_eq!(optimizer.analyses.read().await.len(), MAX_CACHED_ANALYSES);
        assert!(optimizer.analysis(&ids[0]).await.is_none());

        let latest = ids.last().unwrap().clone();
        optimizer
            .optimize(&params().dry_run().with_analysis_id(latest.clone()))
            .await
            .unwrap();
        assert!(optimizer.analysis(&latest).await.is_some());

        // Applying a plan retires the analysis it was built from
        optimizer
            .optimize(&params().confirmed().with_analysis_id(latest.clone()))
            .await
            .unwrap();
        assert!(optimizer.analysis(&latest).await.is_none());
    }

    #[tokio::test]
    async fn test_connected_entities_survive_relationship_cap() {
        let store = Arc::new(SqliteGraphStore::open_in_memory().unwrap());
        let s = scope();
        let old = "2020-01-01T00:00:00Z";
        let mut document = GraphDocument::default();
        for i in 0..=100 {
            let id = format!("file-{i:03}");
            document
                .entities
                .push(Entity::new(&s, EntityType::File, &id, &id).with_created_at(old));
        }
        for i in 0..50 {
            let id = format!("comp-a{i:02}");
            document
                .entities
                .push(Entity::new(&s, EntityType::Component, &id, &id).with_created_at(old));
        }
        // comp-a00 alone fills the default cap of 100 sampled edges
        let hub = EntityRef::new("comp-a00", EntityType::Component);
        for i in 0..=100 {
            let file = EntityRef::new(format!("file-{i:03}"), EntityType::File);
            document.relationships.push(Relationship::new(&s, &hub, DEPENDS_ON, &file));
        }
        let shared = EntityRef::new("file-000", EntityType::File);
        for i in 1..50 {
            let comp = EntityRef::new(format!("comp-a{i:02}"), EntityType::Component);
            document.relationships.push(Relationship::new(&s, &comp, DEPENDS_ON, &shared));
        }
        store.import(&s, &document).await.unwrap();
        let optimizer = MemoryOptimizer::from_store(OptimizerConfig::default(), store.clone()).unwrap();

        let report = optimizer.optimize(&params().confirmed()).await.unwrap();

        assert!(report.plan.actions.is_empty());
        assert_eq!(report.result.summary.entities_deleted, 0);
        assert_eq!(entity_ids(&store).await.len(), 151);
        assert_eq!(store.relationship_count(&s).await.unwrap(), 150);
    }

    #[tokio::test]
    async fn test_rollback_requires_snapshot_id() {
        let (optimizer, _store) = seeded().await;
        let err = optimizer.rollback(&params()).await.unwrap_err();
        assert!(err.is_validation());
        assert!(err.to_string().starts_with("Rollback failed:"));
    }

    #[tokio::test]
    async fn test_rollback_rejects_other_branch() {
        let (optimizer, _store) = seeded().await;
        let report = optimizer.optimize(&params().confirmed()).await.unwrap();
        let snapshot_id = report.result.snapshot_id.unwrap();

        let err = optimizer
            .rollback(&OperationParams::new("repo", "develop").with_snapshot_id(snapshot_id))
            .await
            .unwrap_err();
        assert!(err.is_validation());
    }

    #[tokio::test]
    async fn test_open_file_database() {
        let dir = TempDir::new().unwrap();
        let config = OptimizerConfig::new(dir.path().join("membank.db"));
        let optimizer = MemoryOptimizer::open(config).unwrap();

        let snapshots = optimizer
            .list_snapshots(&OperationParams::new("repo", "main"))
            .await
            .unwrap();
        assert!(snapshots.is_empty());
        assert!(dir.path().join("membank.db").exists());
    }
}
