//! Context Builder
//!
//! Whole-graph statistics for one repository+branch.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use membank_core::{BranchScope, GraphQuery};

use super::types::MemoryContext;
use crate::error::{SDKError, SDKResult};
use crate::utils::{age_in_days, parse_timestamp};

/// Aggregates entity counts, relationship count, average age and the last
/// optimization time.
pub struct ContextBuilder {
    graph: Arc<dyn GraphQuery>,
}

impl ContextBuilder {
    pub fn new(graph: Arc<dyn GraphQuery>) -> Self {
        Self { graph }
    }

    /// Build the context as of now.
    pub async fn build(&self, scope: &BranchScope) -> SDKResult<MemoryContext> {
        self.build_at(scope, Utc::now()).await
    }

    /// Build the context relative to `now`.
    ///
    /// Fails with `NotFound` when the branch holds no entities.
    pub async fn build_at(&self, scope: &BranchScope, now: DateTime<Utc>) -> SDKResult<MemoryContext> {
        let counts = self.graph.entity_counts(scope).await?;
        let total_entities: usize = counts.values().sum();
        if total_entities == 0 {
            return Err(SDKError::not_found("Memory bank", scope.to_string()));
        }

        let total_relationships = self.graph.relationship_count(scope).await?;

        let ages: Vec<f64> = self
            .graph
            .timestamped_entities(scope)
            .await?
            .iter()
            .filter_map(|e| e.created_at.as_deref().and_then(parse_timestamp))
            .map(|created| age_in_days(&created, &now))
            .collect();
        let average_entity_age_days = if ages.is_empty() {
            0.0
        } else {
            ages.iter().sum::<f64>() / ages.len() as f64
        };

        let last_optimization = self.graph.last_optimization(scope).await?;

        tracing::debug!(
            "Context for {}: {} entities, {} relationships",
            scope,
            total_entities,
            total_relationships
        );

        Ok(MemoryContext {
            repository: scope.repository.clone(),
            branch: scope.branch.clone(),
            entity_counts: counts
                .into_iter()
                .map(|(entity_type, count)| (entity_type.label().to_string(), count))
                .collect(),
            total_entities,
            total_relationships,
            average_entity_age_days,
            last_optimization,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use membank_core::{
        Entity, EntityRef, EntityStore, EntityType, GraphDocument, OptimizationRunRecord,
        Relationship, SqliteGraphStore, DEPENDS_ON,
    };

    fn scope() -> BranchScope {
        BranchScope::new("repo", "main")
    }

    #[tokio::test]
    async fn test_build_context() {
        let store = SqliteGraphStore::open_in_memory().unwrap();
        let s = scope();
        let a = EntityRef::new("comp-a", EntityType::Component);
        let b = EntityRef::new("comp-b", EntityType::Component);
        store
            .import(
                &s,
                &GraphDocument {
                    entities: vec![
                        Entity::new(&s, EntityType::Component, "comp-a", "A")
                            .with_created_at("2024-05-22T00:00:00Z"),
                        Entity::new(&s, EntityType::Component, "comp-b", "B")
                            .with_created_at("2024-05-12T00:00:00Z"),
                        Entity::new(&s, EntityType::Rule, "rule-1", "R").with_created_at("garbage"),
                    ],
                    relationships: vec![Relationship::new(&s, &a, DEPENDS_ON, &b)],
                },
            )
            .await
            .unwrap();

        let executed_at = Utc.with_ymd_and_hms(2024, 5, 30, 12, 0, 0).unwrap();
        store
            .record_optimization_run(&OptimizationRunRecord {
                plan_id: "plan-1".into(),
                repository: "repo".into(),
                branch: "main".into(),
                strategy: "balanced".into(),
                status: "success".into(),
                entities_deleted: 0,
                entities_merged: 0,
                entities_updated: 0,
                snapshot_id: None,
                executed_at,
            })
            .await
            .unwrap();

        let now = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
        let context = ContextBuilder::new(Arc::new(store))
            .build_at(&s, now)
            .await
            .unwrap();

        assert_eq!(context.total_entities, 3);
        assert_eq!(context.entity_counts.get("Component"), Some(&2));
        assert_eq!(context.entity_counts.get("Rule"), Some(&1));
        assert_eq!(context.total_relationships, 1);
        // 10 and 20 days old; the unparseable timestamp is ignored
        assert_eq!(context.average_entity_age_days, 15.0);
        assert_eq!(context.last_optimization, Some(executed_at));
    }

    #[tokio::test]
    async fn test_empty_branch_is_not_found() {
        let store = SqliteGraphStore::open_in_memory().unwrap();
        let err = ContextBuilder::new(Arc::new(store))
            .build(&scope())
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }
}
