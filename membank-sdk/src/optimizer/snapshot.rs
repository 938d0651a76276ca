//! Snapshot Manager
//!
//! Point-in-time captures of a repository+branch. A snapshot stores every
//! entity and relationship as serialized JSON together with a checksum, so
//! restores only ever run against content that passed an integrity check.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use chrono::{SubsecRound, Utc};
use membank_core::{
    BranchScope, Entity, EntityFilter, EntityRef, GraphQuery, Relationship, Snapshot,
    SnapshotPayload, SnapshotStore,
};
use uuid::Uuid;

use super::types::{RollbackOutcome, SnapshotValidation};
use crate::error::{SDKError, SDKResult};
use crate::utils::snapshot_checksum;

/// Decoded snapshot content that passed validation.
struct RestorableSnapshot {
    snapshot: Snapshot,
    entities: Vec<Entity>,
    relationships: Vec<Relationship>,
}

pub struct SnapshotManager {
    graph: Arc<dyn GraphQuery>,
    store: Arc<dyn SnapshotStore>,
}

impl SnapshotManager {
    pub fn new(graph: Arc<dyn GraphQuery>, store: Arc<dyn SnapshotStore>) -> Self {
        Self { graph, store }
    }

    /// Capture the current state of a branch.
    pub async fn create_snapshot(
        &self,
        scope: &BranchScope,
        description: impl Into<String>,
    ) -> SDKResult<Snapshot> {
        let entities = self.graph.entities(scope, &EntityFilter::all()).await?;
        let relationships = self.graph.relationships(scope).await?;

        let entity_items = entities
            .iter()
            .map(serde_json::to_string)
            .collect::<Result<Vec<_>, _>>()?;
        let relationship_items = relationships
            .iter()
            .map(serde_json::to_string)
            .collect::<Result<Vec<_>, _>>()?;

        let snapshot = Snapshot {
            snapshot_id: format!("snap-{}", Uuid::new_v4()),
            repository: scope.repository.clone(),
            branch: scope.branch.clone(),
            description: description.into(),
            entities_count: entity_items.len(),
            relationships_count: relationship_items.len(),
            // Stored with millisecond precision
            created: Utc::now().trunc_subsecs(3),
        };

        let payload = SnapshotPayload {
            checksum: snapshot_checksum(&entity_items, &relationship_items),
            snapshot: snapshot.clone(),
            entity_items,
            relationship_items,
        };
        self.store.save_snapshot(&payload).await?;

        tracing::info!(
            "Created snapshot {} for {} ({} entities, {} relationships)",
            snapshot.snapshot_id,
            scope,
            snapshot.entities_count,
            snapshot.relationships_count
        );
        Ok(snapshot)
    }

    /// Structural integrity check. `issues` is non-empty whenever `valid` is false.
    pub async fn validate_snapshot(&self, snapshot_id: &str) -> SDKResult<SnapshotValidation> {
        let (validation, _) = self.inspect(snapshot_id).await?;
        Ok(validation)
    }

    /// Replace the live branch state with a validated snapshot.
    ///
    /// Refuses with `RollbackValidation` before touching the graph when the
    /// snapshot is invalid.
    pub async fn rollback_to_snapshot(&self, snapshot_id: &str) -> SDKResult<RollbackOutcome> {
        let started = Instant::now();

        let (validation, restorable) = self.inspect(snapshot_id).await?;
        let restorable = match restorable {
            Some(restorable) if validation.valid => restorable,
            _ => {
                return Err(SDKError::RollbackValidation {
                    snapshot_id: snapshot_id.to_string(),
                    issues: validation.issues,
                });
            }
        };

        let scope = restorable.snapshot.scope();
        self.store
            .replace_branch_state(&scope, &restorable.entities, &restorable.relationships)
            .await?;

        let outcome = RollbackOutcome {
            success: true,
            snapshot_id: snapshot_id.to_string(),
            restored_entities: restorable.entities.len(),
            restored_relationships: restorable.relationships.len(),
            rollback_time: started.elapsed().as_millis() as u64,
        };
        tracing::info!(
            "Restored {} from snapshot {} ({} entities, {} relationships)",
            scope,
            snapshot_id,
            outcome.restored_entities,
            outcome.restored_relationships
        );
        Ok(outcome)
    }

    /// Snapshots for a repository, optionally one branch, newest first.
    pub async fn list_snapshots(
        &self,
        repository: &str,
        branch: Option<&str>,
    ) -> SDKResult<Vec<Snapshot>> {
        Ok(self.store.list_snapshots(repository, branch).await?)
    }

    pub async fn get_snapshot(&self, snapshot_id: &str) -> SDKResult<Option<Snapshot>> {
        Ok(self.store.get_snapshot(snapshot_id).await?)
    }

    /// Delete a snapshot. The live graph is not affected.
    pub async fn delete_snapshot(&self, snapshot_id: &str) -> SDKResult<()> {
        if !self.store.delete_snapshot(snapshot_id).await? {
            return Err(SDKError::not_found("Snapshot", snapshot_id));
        }
        tracing::info!("Deleted snapshot {}", snapshot_id);
        Ok(())
    }

    /// Run every integrity check, returning the decoded content only when valid.
    async fn inspect(
        &self,
        snapshot_id: &str,
    ) -> SDKResult<(SnapshotValidation, Option<RestorableSnapshot>)> {
        let Some(payload) = self.store.load_snapshot_payload(snapshot_id).await? else {
            return Ok((
                SnapshotValidation {
                    valid: false,
                    issues: vec![format!("Snapshot {} not found", snapshot_id)],
                    entity_count: None,
                    relationship_count: None,
                },
                None,
            ));
        };

        let snapshot = &payload.snapshot;
        let scope = snapshot.scope();
        let mut issues = Vec::new();

        if payload.entity_items.len() != snapshot.entities_count {
            issues.push(format!(
                "Entity count mismatch: recorded {}, stored {}",
                snapshot.entities_count,
                payload.entity_items.len()
            ));
        }
        if payload.relationship_items.len() != snapshot.relationships_count {
            issues.push(format!(
                "Relationship count mismatch: recorded {}, stored {}",
                snapshot.relationships_count,
                payload.relationship_items.len()
            ));
        }

        let checksum = snapshot_checksum(&payload.entity_items, &payload.relationship_items);
        if checksum != payload.checksum {
            issues.push("Checksum mismatch: snapshot content was modified".to_string());
        }

        let mut entities = Vec::with_capacity(payload.entity_items.len());
        for (i, item) in payload.entity_items.iter().enumerate() {
            match serde_json::from_str::<Entity>(item) {
                Ok(entity) if !scope.contains(&entity.repository, &entity.branch) => {
                    issues.push(format!(
                        "Entity {} belongs to {}:{}, not {}",
                        entity.id, entity.repository, entity.branch, scope
                    ));
                }
                Ok(entity) => entities.push(entity),
                Err(e) => issues.push(format!("Entity item {} could not be decoded: {}", i, e)),
            }
        }

        let known: HashSet<EntityRef> = entities.iter().map(Entity::entity_ref).collect();
        let mut relationships = Vec::with_capacity(payload.relationship_items.len());
        for (i, item) in payload.relationship_items.iter().enumerate() {
            let relationship = match serde_json::from_str::<Relationship>(item) {
                Ok(relationship) => relationship,
                Err(e) => {
                    issues.push(format!("Relationship item {} could not be decoded: {}", i, e));
                    continue;
                }
            };
            if !scope.contains(&relationship.repository, &relationship.branch) {
                issues.push(format!(
                    "Relationship {} -> {} belongs to {}:{}, not {}",
                    relationship.from_id,
                    relationship.to_id,
                    relationship.repository,
                    relationship.branch,
                    scope
                ));
                continue;
            }
            for endpoint in [relationship.from_ref(), relationship.to_ref()] {
                if !known.contains(&endpoint) {
                    issues.push(format!(
                        "Relationship {} -> {} references {} which is not in the snapshot",
                        relationship.from_id, relationship.to_id, endpoint
                    ));
                }
            }
            relationships.push(relationship);
        }

        let validation = SnapshotValidation {
            valid: issues.is_empty(),
            issues,
            entity_count: Some(entities.len()),
            relationship_count: Some(relationships.len()),
        };

        let restorable = validation.valid.then(|| RestorableSnapshot {
            snapshot: payload.snapshot.clone(),
            entities,
            relationships,
        });
        Ok((validation, restorable))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use membank_core::{
        EntityStore, EntityType, GraphDocument, SqliteGraphStore, DEPENDS_ON,
    };

    fn scope() -> BranchScope {
        BranchScope::new("repo", "main")
    }

    async fn seeded() -> (Arc<SqliteGraphStore>, SnapshotManager) {
        let store = Arc::new(SqliteGraphStore::open_in_memory().unwrap());
        let s = scope();
        let a = EntityRef::new("comp-a", EntityType::Component);
        let b = EntityRef::new("comp-b", EntityType::Component);
        store
            .import(
                &s,
                &GraphDocument {
                    entities: vec![
                        Entity::new(&s, EntityType::Component, "comp-a", "A"),
                        Entity::new(&s, EntityType::Component, "comp-b", "B"),
                        Entity::new(&s, EntityType::Rule, "rule-1", "R")
                            .with_property("triggers", serde_json::json!(["commit"])),
                    ],
                    relationships: vec![Relationship::new(&s, &a, DEPENDS_ON, &b)],
                },
            )
            .await
            .unwrap();
        let manager = SnapshotManager::new(store.clone(), store.clone());
        (store, manager)
    }

    #[tokio::test]
    async fn test_create_validate_and_list() {
        let (_store, manager) = seeded().await;
        let snapshot = manager.create_snapshot(&scope(), "before cleanup").await.unwrap();
        assert!(snapshot.snapshot_id.starts_with("snap-"));
        assert_eq!(snapshot.entities_count, 3);
        assert_eq!(snapshot.relationships_count, 1);

        let validation = manager.validate_snapshot(&snapshot.snapshot_id).await.unwrap();
        assert!(validation.valid, "{:?}", validation.issues);
        assert_eq!(validation.entity_count, Some(3));
        assert_eq!(validation.relationship_count, Some(1));

        let listed = manager.list_snapshots("repo", None).await.unwrap();
        assert_eq!(listed, vec![snapshot]);
    }

    #[tokio::test]
    async fn test_missing_snapshot_is_invalid() {
        let (_store, manager) = seeded().await;
        let validation = manager.validate_snapshot("snap-missing").await.unwrap();
        assert!(!validation.valid);
        assert!(validation.issues[0].contains("not found"));
    }

    #[tokio::test]
    async fn test_rollback_restores_state() {
        let (store, manager) = seeded().await;
        let snapshot = manager.create_snapshot(&scope(), "baseline").await.unwrap();

        store
            .delete_entity(&scope(), &EntityRef::new("comp-a", EntityType::Component))
            .await
            .unwrap();
        store
            .upsert_entity(&Entity::new(&scope(), EntityType::Tag, "tag-new", "new"))
            .await
            .unwrap();

        let outcome = manager.rollback_to_snapshot(&snapshot.snapshot_id).await.unwrap();
        assert!(outcome.success);
        assert_eq!(outcome.restored_entities, 3);
        assert_eq!(outcome.restored_relationships, 1);

        let counts = store.entity_counts(&scope()).await.unwrap();
        assert_eq!(counts.get(&EntityType::Component), Some(&2));
        assert_eq!(counts.get(&EntityType::Tag), None);
        assert_eq!(store.relationship_count(&scope()).await.unwrap(), 1);

        let rule = store
            .get_entity(&scope(), &EntityRef::new("rule-1", EntityType::Rule))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(rule.properties["triggers"], serde_json::json!(["commit"]));

        // The snapshot survives the rollback
        assert!(manager.get_snapshot(&snapshot.snapshot_id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_tampered_snapshot_refuses_rollback() {
        let (store, manager) = seeded().await;
        let snapshot = manager.create_snapshot(&scope(), "baseline").await.unwrap();

        // Re-save the snapshot with one entity dropped but the old checksum
        let mut payload = store
            .load_snapshot_payload(&snapshot.snapshot_id)
            .await
            .unwrap()
            .unwrap();
        store.delete_snapshot(&snapshot.snapshot_id).await.unwrap();
        payload.entity_items.remove(0);
        store.save_snapshot(&payload).await.unwrap();

        store
            .upsert_entity(&Entity::new(&scope(), EntityType::Tag, "tag-live", "live"))
            .await
            .unwrap();

        let err = manager
            .rollback_to_snapshot(&snapshot.snapshot_id)
            .await
            .unwrap_err();
        match &err {
            SDKError::RollbackValidation { issues, .. } => {
                assert!(issues.iter().any(|i| i.contains("Entity count mismatch")));
                assert!(issues.iter().any(|i| i.contains("Checksum mismatch")));
                assert!(issues.iter().any(|i| i.contains("not in the snapshot")));
            }
            other => panic!("unexpected error: {}", other),
        }

        // Nothing was restored
        let tag = store
            .get_entity(&scope(), &EntityRef::new("tag-live", EntityType::Tag))
            .await
            .unwrap();
        assert!(tag.is_some());
    }

    #[tokio::test]
    async fn test_delete_snapshot_keeps_graph() {
        let (store, manager) = seeded().await;
        let snapshot = manager.create_snapshot(&scope(), "temp").await.unwrap();

        manager.delete_snapshot(&snapshot.snapshot_id).await.unwrap();
        assert!(manager.list_snapshots("repo", Some("main")).await.unwrap().is_empty());
        assert_eq!(store.relationship_count(&scope()).await.unwrap(), 1);

        let err = manager.delete_snapshot(&snapshot.snapshot_id).await.unwrap_err();
        assert!(err.is_not_found());
    }
}
