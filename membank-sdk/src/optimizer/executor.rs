//! Action Executor
//!
//! Applies one mutation action to the graph. Each action either completes or
//! returns a typed error; nothing is retried here.

use std::sync::Arc;

use chrono::Utc;
use membank_core::{
    BranchScope, DEPENDS_ON, Entity, EntityRef, EntityStore, EntityType, RELATED_TO, Relationship,
};

use super::types::{ActionType, OptimizationAction};
use crate::error::{SDKError, SDKResult};

/// Fields an `update` action may set.
pub const UPDATABLE_FIELDS: [&str; 11] = [
    "name",
    "description",
    "status",
    "metadata",
    "updated_at",
    "kind",
    "depends_on",
    "content",
    "triggers",
    "date",
    "context",
];

pub struct ActionExecutor {
    entities: Arc<dyn EntityStore>,
}

impl ActionExecutor {
    pub fn new(entities: Arc<dyn EntityStore>) -> Self {
        Self { entities }
    }

    /// Apply `action` inside `scope`.
    pub async fn execute_action(
        &self,
        scope: &BranchScope,
        action: &OptimizationAction,
    ) -> SDKResult<()> {
        tracing::debug!("Executing {} in {}", action.id(), scope);
        match action.action_type {
            ActionType::Delete => self.delete(scope, action).await,
            ActionType::Merge => self.merge(scope, action).await,
            ActionType::Update => self.update(scope, action).await,
            ActionType::Move => self.relocate(scope, action).await,
        }
    }

    async fn delete(&self, scope: &BranchScope, action: &OptimizationAction) -> SDKResult<()> {
        let entity_type = resolve_delete_type(action);
        let target = EntityRef::new(action.entity_id.clone(), entity_type);
        if !self.entities.delete_entity(scope, &target).await? {
            return Err(SDKError::not_found(entity_type.label(), &action.entity_id));
        }
        Ok(())
    }

    async fn merge(&self, scope: &BranchScope, action: &OptimizationAction) -> SDKResult<()> {
        let target_id = required_target(action)?;
        if target_id == action.entity_id {
            return Err(SDKError::validation(format!(
                "cannot merge {} into itself",
                action.entity_id
            )));
        }

        let source = self
            .resolve(scope, &action.entity_id, action.entity_type)
            .await?
            .entity_ref();
        let target = self.resolve(scope, target_id, None).await?.entity_ref();

        let rel_type = match source.entity_type {
            EntityType::Component => DEPENDS_ON,
            _ => RELATED_TO,
        };

        let mut rewired = 0;
        for relationship in self.entities.incident_relationships(scope, &source).await? {
            let Some(neighbor) = relationship.other_end(&source) else {
                continue;
            };
            if neighbor == target || neighbor == source {
                continue;
            }
            if self
                .entities
                .relationship_exists_between(scope, &target, &neighbor, rel_type)
                .await?
            {
                continue;
            }

            let rewritten = if relationship.starts_at(&source) {
                Relationship::new(scope, &target, rel_type, &neighbor)
            } else {
                Relationship::new(scope, &neighbor, rel_type, &target)
            };
            if self.entities.create_relationship(&rewritten).await? {
                rewired += 1;
            }
        }

        self.entities.delete_entity(scope, &source).await?;
        tracing::debug!(
            "Merged {} into {} ({} relationships rewired)",
            source,
            target,
            rewired
        );
        Ok(())
    }

    async fn update(&self, scope: &BranchScope, action: &OptimizationAction) -> SDKResult<()> {
        let mut fields: serde_json::Map<String, serde_json::Value> = action
            .updates
            .iter()
            .flatten()
            .filter(|(key, _)| UPDATABLE_FIELDS.contains(&key.as_str()))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();

        if fields.is_empty() {
            tracing::warn!(
                "Update for {} has no allowed fields; nothing to do",
                action.entity_id
            );
            return Ok(());
        }

        fields
            .entry("updated_at")
            .or_insert_with(|| serde_json::Value::String(Utc::now().to_rfc3339()));

        let entity = self
            .resolve(scope, &action.entity_id, action.entity_type)
            .await?
            .entity_ref();
        if !self.entities.update_entity_fields(scope, &entity, &fields).await? {
            return Err(SDKError::not_found(entity.entity_type.label(), &entity.id));
        }
        Ok(())
    }

    async fn relocate(&self, scope: &BranchScope, action: &OptimizationAction) -> SDKResult<()> {
        let target_id = required_target(action)?;

        let source = self
            .resolve(scope, &action.entity_id, action.entity_type)
            .await?
            .entity_ref();
        let target = self.resolve(scope, target_id, None).await?.entity_ref();

        let removed = self
            .entities
            .delete_outgoing_relationships(scope, &source, DEPENDS_ON)
            .await?;
        self.entities
            .create_relationship(&Relationship::new(scope, &source, DEPENDS_ON, &target))
            .await?;

        tracing::debug!(
            "Moved {} to depend on {} ({} previous dependencies removed)",
            source,
            target,
            removed
        );
        Ok(())
    }

    /// Look up an entity by id, using its type when known.
    async fn resolve(
        &self,
        scope: &BranchScope,
        id: &str,
        entity_type: Option<EntityType>,
    ) -> SDKResult<Entity> {
        let found = match entity_type {
            Some(entity_type) => {
                self.entities
                    .get_entity(scope, &EntityRef::new(id, entity_type))
                    .await?
            }
            None => self.entities.find_entity(scope, id).await?,
        };
        found.ok_or_else(|| {
            let label = entity_type.map(|t| t.label()).unwrap_or("Entity");
            SDKError::not_found(label, id)
        })
    }
}

fn required_target(action: &OptimizationAction) -> SDKResult<&str> {
    action
        .target_entity_id
        .as_deref()
        .filter(|t| !t.trim().is_empty())
        .ok_or_else(|| {
            SDKError::validation(format!(
                "{} action for {} requires targetEntityId",
                action.action_type, action.entity_id
            ))
        })
}

/// Entity type for a delete: explicit type first, then the id prefix.
fn resolve_delete_type(action: &OptimizationAction) -> EntityType {
    if let Some(entity_type) = action.entity_type {
        return entity_type;
    }
    match EntityType::from_id_prefix(&action.entity_id) {
        Some(entity_type) => {
            tracing::warn!(
                "Delete for {} carries no entity type; classified as {} by id prefix",
                action.entity_id,
                entity_type
            );
            entity_type
        }
        None => {
            tracing::warn!(
                "Delete for {} carries no entity type and has no known prefix; assuming component",
                action.entity_id
            );
            EntityType::Component
        }
    }
}
