//! Narrow store interfaces for the memory bank graph.
//!
//! Consumers depend on the capability they need (read queries, entity
//! mutation, snapshot persistence) rather than on one store object.
//! Every method takes the [`BranchScope`] explicitly; implementations must
//! filter or set both repository and branch on every statement.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::types::{
    BranchScope, Entity, EntityDegree, EntityFilter, EntityRef, EntityType,
    OptimizationRunRecord, Relationship, Snapshot, SnapshotPayload,
};

/// Read-only graph queries.
#[async_trait]
pub trait GraphQuery: Send + Sync {
    /// Entity counts per type. Types with no entities are omitted.
    async fn entity_counts(&self, scope: &BranchScope) -> Result<BTreeMap<EntityType, usize>>;

    /// Number of relationships in the scope.
    async fn relationship_count(&self, scope: &BranchScope) -> Result<usize>;

    /// Entities ordered by id ascending.
    async fn entities(&self, scope: &BranchScope, filter: &EntityFilter) -> Result<Vec<Entity>>;

    /// Entities with no incident relationships or a `deprecated` status,
    /// ordered by relationship count ascending, then id.
    async fn problematic_entities(
        &self,
        scope: &BranchScope,
        limit: usize,
    ) -> Result<Vec<EntityDegree>>;

    /// Entities whose `created_at` is present and non-empty.
    ///
    /// No parsing is done here; callers decide what counts as a timestamp.
    async fn timestamped_entities(&self, scope: &BranchScope) -> Result<Vec<Entity>>;

    /// All relationships in the scope.
    async fn relationships(&self, scope: &BranchScope) -> Result<Vec<Relationship>>;

    /// Relationships with at least one endpoint id in `ids`, capped at `limit`.
    async fn relationships_touching(
        &self,
        scope: &BranchScope,
        ids: &[String],
        limit: usize,
    ) -> Result<Vec<Relationship>>;

    /// Incident relationship count for each entity in `entities`.
    ///
    /// Counts every relationship in the scope, regardless of any cap used
    /// when fetching edges. Entities that do not exist report 0.
    async fn entity_degrees(
        &self,
        scope: &BranchScope,
        entities: &[EntityRef],
    ) -> Result<HashMap<EntityRef, usize>>;

    /// Time of the most recent recorded optimization run.
    async fn last_optimization(&self, scope: &BranchScope) -> Result<Option<DateTime<Utc>>>;
}

/// Entity and relationship mutation.
#[async_trait]
pub trait EntityStore: Send + Sync {
    /// Fetch an entity by typed reference.
    async fn get_entity(&self, scope: &BranchScope, entity: &EntityRef) -> Result<Option<Entity>>;

    /// Fetch an entity by id when its type is not known.
    ///
    /// If the id exists under several types, the first in
    /// [`EntityType::ALL`] order wins.
    async fn find_entity(&self, scope: &BranchScope, id: &str) -> Result<Option<Entity>>;

    /// Insert or replace an entity.
    async fn upsert_entity(&self, entity: &Entity) -> Result<()>;

    /// Delete an entity and every relationship incident to it.
    ///
    /// Returns `false` when the entity did not exist.
    async fn delete_entity(&self, scope: &BranchScope, entity: &EntityRef) -> Result<bool>;

    /// Apply a field-set mutation. Returns `false` when the entity did not exist.
    async fn update_entity_fields(
        &self,
        scope: &BranchScope,
        entity: &EntityRef,
        fields: &serde_json::Map<String, serde_json::Value>,
    ) -> Result<bool>;

    /// Relationships in either direction touching `entity`.
    async fn incident_relationships(
        &self,
        scope: &BranchScope,
        entity: &EntityRef,
    ) -> Result<Vec<Relationship>>;

    /// Whether an edge of `rel_type` exists between `a` and `b` in either direction.
    async fn relationship_exists_between(
        &self,
        scope: &BranchScope,
        a: &EntityRef,
        b: &EntityRef,
        rel_type: &str,
    ) -> Result<bool>;

    /// Create a relationship. Returns `false` if the identical edge already existed.
    async fn create_relationship(&self, relationship: &Relationship) -> Result<bool>;

    /// Remove outgoing edges of `rel_type` from `from`. Returns the number removed.
    async fn delete_outgoing_relationships(
        &self,
        scope: &BranchScope,
        from: &EntityRef,
        rel_type: &str,
    ) -> Result<usize>;

    /// Append a run to the optimization history.
    async fn record_optimization_run(&self, record: &OptimizationRunRecord) -> Result<()>;
}

/// Snapshot persistence and branch restore.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Persist a snapshot and its serialized items.
    async fn save_snapshot(&self, payload: &SnapshotPayload) -> Result<()>;

    async fn get_snapshot(&self, snapshot_id: &str) -> Result<Option<Snapshot>>;

    /// Load the stored items of a snapshot without decoding them.
    async fn load_snapshot_payload(&self, snapshot_id: &str) -> Result<Option<SnapshotPayload>>;

    /// Snapshots for a repository, optionally narrowed to one branch, newest first.
    async fn list_snapshots(&self, repository: &str, branch: Option<&str>)
    -> Result<Vec<Snapshot>>;

    /// Remove a snapshot. Returns `false` when it did not exist.
    async fn delete_snapshot(&self, snapshot_id: &str) -> Result<bool>;

    /// Replace the live state of a branch with the given content, atomically.
    async fn replace_branch_state(
        &self,
        scope: &BranchScope,
        entities: &[Entity],
        relationships: &[Relationship],
    ) -> Result<()>;
}
