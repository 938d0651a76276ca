//! Core types for the branch-scoped memory bank graph.
//!
//! Every entity and relationship lives inside a (repository, branch) pair.
//! Within a branch, entity ids are unique per [`EntityType`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Relationship type used for component dependencies.
pub const DEPENDS_ON: &str = "DEPENDS_ON";

/// Generic association between two entities.
pub const RELATED_TO: &str = "RELATED_TO";

// ─────────────────────────────────────────────────────────────────────────────
// Scope
// ─────────────────────────────────────────────────────────────────────────────

/// The (repository, branch) isolation key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BranchScope {
    pub repository: String,
    pub branch: String,
}

impl BranchScope {
    pub fn new(repository: impl Into<String>, branch: impl Into<String>) -> Self {
        Self {
            repository: repository.into(),
            branch: branch.into(),
        }
    }

    /// Whether a stored item with this repository/branch belongs to the scope.
    pub fn contains(&self, repository: &str, branch: &str) -> bool {
        self.repository == repository && self.branch == branch
    }
}

impl std::fmt::Display for BranchScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.repository, self.branch)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Entity Types
// ─────────────────────────────────────────────────────────────────────────────

/// Kind of knowledge stored in the graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    #[serde(alias = "Component")]
    Component,
    #[serde(alias = "Decision")]
    Decision,
    #[serde(alias = "Rule")]
    Rule,
    #[serde(alias = "File")]
    File,
    #[serde(alias = "Tag")]
    Tag,
    #[serde(alias = "Context")]
    Context,
}

impl EntityType {
    /// All entity types in canonical order.
    pub const ALL: [EntityType; 6] = [
        EntityType::Component,
        EntityType::Decision,
        EntityType::Rule,
        EntityType::File,
        EntityType::Tag,
        EntityType::Context,
    ];

    /// Convert to string for storage.
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Component => "component",
            EntityType::Decision => "decision",
            EntityType::Rule => "rule",
            EntityType::File => "file",
            EntityType::Tag => "tag",
            EntityType::Context => "context",
        }
    }

    /// Graph label, as used in type histograms.
    pub fn label(&self) -> &'static str {
        match self {
            EntityType::Component => "Component",
            EntityType::Decision => "Decision",
            EntityType::Rule => "Rule",
            EntityType::File => "File",
            EntityType::Tag => "Tag",
            EntityType::Context => "Context",
        }
    }

    /// Conventional id prefix for this type.
    pub fn id_prefix(&self) -> &'static str {
        match self {
            EntityType::Component => "comp-",
            EntityType::Decision => "dec-",
            EntityType::Rule => "rule-",
            EntityType::File => "file-",
            EntityType::Tag => "tag-",
            EntityType::Context => "ctx-",
        }
    }

    /// Classify an id by its conventional prefix.
    ///
    /// Returns `None` when no prefix matches; callers decide on a fallback.
    pub fn from_id_prefix(id: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|entity_type| id.starts_with(entity_type.id_prefix()))
    }
}

impl std::fmt::Display for EntityType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for EntityType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "component" => Ok(EntityType::Component),
            "decision" => Ok(EntityType::Decision),
            "rule" => Ok(EntityType::Rule),
            "file" => Ok(EntityType::File),
            "tag" => Ok(EntityType::Tag),
            "context" => Ok(EntityType::Context),
            other => Err(Error::InvalidEntityType(other.to_string())),
        }
    }
}

/// Typed reference to an entity inside a scope.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityRef {
    pub id: String,
    pub entity_type: EntityType,
}

impl EntityRef {
    pub fn new(id: impl Into<String>, entity_type: EntityType) -> Self {
        Self {
            id: id.into(),
            entity_type,
        }
    }
}

impl std::fmt::Display for EntityRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.entity_type, self.id)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Entities and Relationships
// ─────────────────────────────────────────────────────────────────────────────

/// A node in the memory bank graph.
///
/// Type-specific fields (`depends_on`, `triggers`, `kind`, `content`, ...)
/// live in `properties` and are flattened on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    #[serde(default)]
    pub repository: String,
    #[serde(default)]
    pub branch: String,
    pub id: String,
    pub entity_type: EntityType,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    /// ISO-8601 creation timestamp; may be missing or malformed in legacy data.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
    #[serde(flatten)]
    pub properties: serde_json::Map<String, serde_json::Value>,
}

impl Entity {
    /// Create an entity with only the identity fields set.
    pub fn new(
        scope: &BranchScope,
        entity_type: EntityType,
        id: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            repository: scope.repository.clone(),
            branch: scope.branch.clone(),
            id: id.into(),
            entity_type,
            name: name.into(),
            description: None,
            status: None,
            created_at: None,
            updated_at: None,
            properties: serde_json::Map::new(),
        }
    }

    pub fn with_status(mut self, status: impl Into<String>) -> Self {
        self.status = Some(status.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_created_at(mut self, created_at: impl Into<String>) -> Self {
        self.created_at = Some(created_at.into());
        self
    }

    pub fn with_property(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.properties.insert(key.into(), value);
        self
    }

    /// Typed reference to this entity.
    pub fn entity_ref(&self) -> EntityRef {
        EntityRef::new(self.id.clone(), self.entity_type)
    }

    /// Re-home the entity into a scope (used on import and restore).
    pub fn scoped(mut self, scope: &BranchScope) -> Self {
        self.repository = scope.repository.clone();
        self.branch = scope.branch.clone();
        self
    }
}

/// A typed, directed edge between two entities of the same scope.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Relationship {
    #[serde(default)]
    pub repository: String,
    #[serde(default)]
    pub branch: String,
    pub from_id: String,
    pub from_type: EntityType,
    pub to_id: String,
    pub to_type: EntityType,
    pub rel_type: String,
}

impl Relationship {
    pub fn new(
        scope: &BranchScope,
        from: &EntityRef,
        rel_type: impl Into<String>,
        to: &EntityRef,
    ) -> Self {
        Self {
            repository: scope.repository.clone(),
            branch: scope.branch.clone(),
            from_id: from.id.clone(),
            from_type: from.entity_type,
            to_id: to.id.clone(),
            to_type: to.entity_type,
            rel_type: rel_type.into(),
        }
    }

    pub fn from_ref(&self) -> EntityRef {
        EntityRef::new(self.from_id.clone(), self.from_type)
    }

    pub fn to_ref(&self) -> EntityRef {
        EntityRef::new(self.to_id.clone(), self.to_type)
    }

    /// The endpoint opposite to `entity`, if `entity` is one of the endpoints.
    pub fn other_end(&self, entity: &EntityRef) -> Option<EntityRef> {
        if self.from_id == entity.id && self.from_type == entity.entity_type {
            Some(self.to_ref())
        } else if self.to_id == entity.id && self.to_type == entity.entity_type {
            Some(self.from_ref())
        } else {
            None
        }
    }

    /// Whether `entity` is the source of this edge.
    pub fn starts_at(&self, entity: &EntityRef) -> bool {
        self.from_id == entity.id && self.from_type == entity.entity_type
    }

    pub fn scoped(mut self, scope: &BranchScope) -> Self {
        self.repository = scope.repository.clone();
        self.branch = scope.branch.clone();
        self
    }
}

/// Filter for listing entities. Results are always ordered by id ascending.
#[derive(Debug, Clone, Default)]
pub struct EntityFilter {
    pub entity_type: Option<EntityType>,
    pub limit: Option<usize>,
}

impl EntityFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn of_type(entity_type: EntityType) -> Self {
        Self {
            entity_type: Some(entity_type),
            limit: None,
        }
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// An entity together with its incident relationship count.
#[derive(Debug, Clone)]
pub struct EntityDegree {
    pub entity: Entity,
    pub degree: usize,
}

/// Bulk graph content, used for imports and snapshot restores.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GraphDocument {
    #[serde(default)]
    pub entities: Vec<Entity>,
    #[serde(default)]
    pub relationships: Vec<Relationship>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Snapshots
// ─────────────────────────────────────────────────────────────────────────────

/// Point-in-time capture metadata for a repository+branch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub snapshot_id: String,
    pub repository: String,
    pub branch: String,
    pub description: String,
    pub entities_count: usize,
    pub relationships_count: usize,
    pub created: DateTime<Utc>,
}

impl Snapshot {
    pub fn scope(&self) -> BranchScope {
        BranchScope::new(self.repository.clone(), self.branch.clone())
    }
}

/// Raw stored snapshot content.
///
/// Items are kept as serialized JSON so integrity checks can run before any
/// payload is trusted.
#[derive(Debug, Clone)]
pub struct SnapshotPayload {
    pub snapshot: Snapshot,
    pub checksum: String,
    pub entity_items: Vec<String>,
    pub relationship_items: Vec<String>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Optimization History
// ─────────────────────────────────────────────────────────────────────────────

/// One executed (non-dry-run) optimization plan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizationRunRecord {
    pub plan_id: String,
    pub repository: String,
    pub branch: String,
    pub strategy: String,
    pub status: String,
    pub entities_deleted: usize,
    pub entities_merged: usize,
    pub entities_updated: usize,
    pub snapshot_id: Option<String>,
    pub executed_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_type_prefix_classification() {
        assert_eq!(EntityType::from_id_prefix("comp-auth"), Some(EntityType::Component));
        assert_eq!(EntityType::from_id_prefix("dec-001"), Some(EntityType::Decision));
        assert_eq!(EntityType::from_id_prefix("rule-lint"), Some(EntityType::Rule));
        assert_eq!(EntityType::from_id_prefix("file-main"), Some(EntityType::File));
        assert_eq!(EntityType::from_id_prefix("ctx-2024"), Some(EntityType::Context));
        assert_eq!(EntityType::from_id_prefix("tag-infra"), Some(EntityType::Tag));
        assert_eq!(EntityType::from_id_prefix("auth-service"), None);
    }

    #[test]
    fn test_entity_type_parse() {
        assert_eq!("Component".parse::<EntityType>().unwrap(), EntityType::Component);
        assert_eq!("tag".parse::<EntityType>().unwrap(), EntityType::Tag);
        assert!("widget".parse::<EntityType>().is_err());
    }

    #[test]
    fn test_entity_flattens_properties() {
        let scope = BranchScope::new("repo", "main");
        let entity = Entity::new(&scope, EntityType::Rule, "rule-1", "No unwrap")
            .with_property("triggers", serde_json::json!(["lint"]));

        let json = serde_json::to_value(&entity).unwrap();
        assert_eq!(json["triggers"], serde_json::json!(["lint"]));
        assert_eq!(json["entity_type"], "rule");

        let back: Entity = serde_json::from_value(json).unwrap();
        assert_eq!(back, entity);
    }

    #[test]
    fn test_relationship_other_end() {
        let scope = BranchScope::new("repo", "main");
        let a = EntityRef::new("comp-a", EntityType::Component);
        let b = EntityRef::new("comp-b", EntityType::Component);
        let c = EntityRef::new("comp-c", EntityType::Component);
        let rel = Relationship::new(&scope, &a, DEPENDS_ON, &b);

        assert_eq!(rel.other_end(&a), Some(b.clone()));
        assert_eq!(rel.other_end(&b), Some(a.clone()));
        assert_eq!(rel.other_end(&c), None);
        assert!(rel.starts_at(&a));
        assert!(!rel.starts_at(&b));
    }
}
