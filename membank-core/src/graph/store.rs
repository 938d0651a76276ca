//! SQLite-backed property graph store.
//!
//! Implements [`GraphQuery`], [`EntityStore`] and [`SnapshotStore`] over one
//! shared connection. Repository and branch are always bound as statement
//! parameters; only table names and fixed column lists are part of the SQL text.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use tokio::sync::Mutex;

use super::migrations::run_migrations;
use super::traits::{EntityStore, GraphQuery, SnapshotStore};
use crate::error::{Error, Result};
use crate::types::{
    BranchScope, Entity, EntityDegree, EntityFilter, EntityRef, EntityType, GraphDocument,
    OptimizationRunRecord, Relationship, Snapshot, SnapshotPayload,
};

const ENTITY_COLUMNS: &str = "repository, branch, entity_type, id, name, description, status,
     properties_json, created_at, updated_at";

const RELATIONSHIP_COLUMNS: &str = "repository, branch, from_type, from_id, rel_type, to_type, to_id";

/// Upper bound on ids bound into one statement; SQLite caps host parameters.
const MAX_IDS_PER_STATEMENT: usize = 500;

const SNAPSHOT_COLUMNS: &str =
    "snapshot_id, repository, branch, description, entities_count, relationships_count, created_at";

/// Counts reported by [`SqliteGraphStore::import`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportSummary {
    pub entities: usize,
    pub relationships: usize,
}

/// Graph store over a single SQLite connection.
///
/// Cheap to clone; clones share the connection.
#[derive(Clone)]
pub struct SqliteGraphStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteGraphStore {
    /// Open (or create) a database file and apply migrations.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path)?;

        // Enable WAL mode for better concurrency
        conn.execute_batch(
            "PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL; PRAGMA foreign_keys=ON;",
        )?;

        Self::from_connection(conn)
    }

    /// Open a private in-memory database.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Self::from_connection(conn)
    }

    /// Wrap an existing connection, running migrations first.
    pub fn from_connection(conn: Connection) -> Result<Self> {
        run_migrations(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Load a document of entities and relationships into a branch.
    ///
    /// Items without a repository/branch are placed into `scope`; items naming
    /// a different repository or branch are rejected.
    pub async fn import(&self, scope: &BranchScope, document: &GraphDocument) -> Result<ImportSummary> {
        let mut conn = self.conn.lock().await;
        let tx = conn.transaction()?;
        let mut summary = ImportSummary::default();

        for entity in &document.entities {
            check_item_scope(scope, &entity.repository, &entity.branch, &entity.id)?;
            let entity = entity.clone().scoped(scope);
            insert_entity(&tx, &entity)?;
            summary.entities += 1;
        }

        for relationship in &document.relationships {
            let label = format!("{} -> {}", relationship.from_id, relationship.to_id);
            check_item_scope(scope, &relationship.repository, &relationship.branch, &label)?;
            let relationship = relationship.clone().scoped(scope);
            ensure_endpoints_exist(&tx, &relationship)?;
            summary.relationships += insert_relationship(&tx, &relationship)?;
        }

        tx.commit()?;
        tracing::debug!(
            "Imported {} entities and {} relationships into {}",
            summary.entities,
            summary.relationships,
            scope
        );
        Ok(summary)
    }

    fn map_entity(row: &Row) -> rusqlite::Result<Entity> {
        let entity_type: String = row.get(2)?;
        let entity_type = entity_type.parse::<EntityType>().map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(2, rusqlite::types::Type::Text, Box::new(e))
        })?;
        let properties_json: String = row.get(7)?;
        let properties = serde_json::from_str(&properties_json).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(7, rusqlite::types::Type::Text, Box::new(e))
        })?;

        Ok(Entity {
            repository: row.get(0)?,
            branch: row.get(1)?,
            entity_type,
            id: row.get(3)?,
            name: row.get(4)?,
            description: row.get(5)?,
            status: row.get(6)?,
            properties,
            created_at: row.get(8)?,
            updated_at: row.get(9)?,
        })
    }

    fn map_relationship(row: &Row) -> rusqlite::Result<Relationship> {
        let parse = |idx: usize| -> rusqlite::Result<EntityType> {
            let raw: String = row.get(idx)?;
            raw.parse::<EntityType>().map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(
                    idx,
                    rusqlite::types::Type::Text,
                    Box::new(e),
                )
            })
        };

        Ok(Relationship {
            repository: row.get(0)?,
            branch: row.get(1)?,
            from_type: parse(2)?,
            from_id: row.get(3)?,
            rel_type: row.get(4)?,
            to_type: parse(5)?,
            to_id: row.get(6)?,
        })
    }

    fn map_snapshot(row: &Row) -> rusqlite::Result<Snapshot> {
        Ok(Snapshot {
            snapshot_id: row.get(0)?,
            repository: row.get(1)?,
            branch: row.get(2)?,
            description: row.get(3)?,
            entities_count: row.get(4)?,
            relationships_count: row.get(5)?,
            created: DateTime::from_timestamp_millis(row.get::<_, i64>(6)?).unwrap_or_default(),
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Statement helpers (run with the connection lock held)
// ─────────────────────────────────────────────────────────────────────────────

fn check_item_scope(scope: &BranchScope, repository: &str, branch: &str, label: &str) -> Result<()> {
    let foreign_repo = !repository.is_empty() && repository != scope.repository;
    let foreign_branch = !branch.is_empty() && branch != scope.branch;
    if foreign_repo || foreign_branch {
        return Err(Error::CrossBranch(format!(
            "{} belongs to {}:{}, not {}",
            label, repository, branch, scope
        )));
    }
    Ok(())
}

fn insert_entity(conn: &Connection, entity: &Entity) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO mb_entities
         (repository, branch, entity_type, id, name, description, status,
          properties_json, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            entity.repository,
            entity.branch,
            entity.entity_type.as_str(),
            entity.id,
            entity.name,
            entity.description,
            entity.status,
            serde_json::to_string(&entity.properties)?,
            entity.created_at,
            entity.updated_at,
        ],
    )?;
    Ok(())
}

fn insert_relationship(conn: &Connection, relationship: &Relationship) -> Result<usize> {
    let inserted = conn.execute(
        "INSERT OR IGNORE INTO mb_relationships
         (repository, branch, from_type, from_id, rel_type, to_type, to_id)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            relationship.repository,
            relationship.branch,
            relationship.from_type.as_str(),
            relationship.from_id,
            relationship.rel_type,
            relationship.to_type.as_str(),
            relationship.to_id,
        ],
    )?;
    Ok(inserted)
}

fn entity_exists(conn: &Connection, scope: &BranchScope, entity: &EntityRef) -> Result<bool> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM mb_entities
         WHERE repository = ?1 AND branch = ?2 AND entity_type = ?3 AND id = ?4)",
        params![scope.repository, scope.branch, entity.entity_type.as_str(), entity.id],
        |row| row.get(0),
    )?;
    Ok(exists)
}

fn ensure_endpoints_exist(conn: &Connection, relationship: &Relationship) -> Result<()> {
    let scope = BranchScope::new(relationship.repository.clone(), relationship.branch.clone());
    for endpoint in [relationship.from_ref(), relationship.to_ref()] {
        if !entity_exists(conn, &scope, &endpoint)? {
            return Err(Error::not_found(endpoint.entity_type.as_str(), endpoint.id));
        }
    }
    Ok(())
}

fn value_as_text(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::Null => None,
        serde_json::Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// GraphQuery
// ─────────────────────────────────────────────────────────────────────────────

#[async_trait]
impl GraphQuery for SqliteGraphStore {
    async fn entity_counts(&self, scope: &BranchScope) -> Result<BTreeMap<EntityType, usize>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(
            "SELECT entity_type, COUNT(*) FROM mb_entities
             WHERE repository = ?1 AND branch = ?2
             GROUP BY entity_type",
        )?;
        let rows = stmt.query_map(params![scope.repository, scope.branch], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, usize>(1)?))
        })?;

        let mut counts = BTreeMap::new();
        for row in rows {
            let (raw_type, count) = row?;
            match raw_type.parse::<EntityType>() {
                Ok(entity_type) => {
                    counts.insert(entity_type, count);
                }
                Err(_) => tracing::warn!("Ignoring {} entities of unknown type {}", count, raw_type),
            }
        }
        Ok(counts)
    }

    async fn relationship_count(&self, scope: &BranchScope) -> Result<usize> {
        let conn = self.conn.lock().await;
        let count: usize = conn.query_row(
            "SELECT COUNT(*) FROM mb_relationships WHERE repository = ?1 AND branch = ?2",
            params![scope.repository, scope.branch],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    async fn entities(&self, scope: &BranchScope, filter: &EntityFilter) -> Result<Vec<Entity>> {
        let conn = self.conn.lock().await;
        // SQLite treats a negative LIMIT as "no limit".
        let limit = filter.limit.map(|l| l as i64).unwrap_or(-1);

        let entities = if let Some(entity_type) = filter.entity_type {
            let mut stmt = conn.prepare(&format!(
                "SELECT {ENTITY_COLUMNS} FROM mb_entities
                 WHERE repository = ?1 AND branch = ?2 AND entity_type = ?3
                 ORDER BY id ASC LIMIT ?4"
            ))?;
            stmt.query_map(
                params![scope.repository, scope.branch, entity_type.as_str(), limit],
                Self::map_entity,
            )?
            .collect::<std::result::Result<Vec<_>, _>>()?
        } else {
            let mut stmt = conn.prepare(&format!(
                "SELECT {ENTITY_COLUMNS} FROM mb_entities
                 WHERE repository = ?1 AND branch = ?2
                 ORDER BY id ASC, entity_type ASC LIMIT ?3"
            ))?;
            stmt.query_map(params![scope.repository, scope.branch, limit], Self::map_entity)?
                .collect::<std::result::Result<Vec<_>, _>>()?
        };
        Ok(entities)
    }

    async fn problematic_entities(
        &self,
        scope: &BranchScope,
        limit: usize,
    ) -> Result<Vec<EntityDegree>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(&format!(
            "SELECT {ENTITY_COLUMNS}, degree FROM (
                 SELECT e.*, (
                     SELECT COUNT(*) FROM mb_relationships r
                     WHERE r.repository = e.repository AND r.branch = e.branch
                       AND ((r.from_type = e.entity_type AND r.from_id = e.id)
                         OR (r.to_type = e.entity_type AND r.to_id = e.id))
                 ) AS degree
                 FROM mb_entities e
                 WHERE e.repository = ?1 AND e.branch = ?2
             )
             WHERE degree = 0 OR status = 'deprecated'
             ORDER BY degree ASC, id ASC
             LIMIT ?3"
        ))?;
        let rows = stmt.query_map(params![scope.repository, scope.branch, limit as i64], |row| {
            Ok(EntityDegree {
                entity: Self::map_entity(row)?,
                degree: row.get(10)?,
            })
        })?;
        Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
    }

    async fn timestamped_entities(&self, scope: &BranchScope) -> Result<Vec<Entity>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(&format!(
            "SELECT {ENTITY_COLUMNS} FROM mb_entities
             WHERE repository = ?1 AND branch = ?2
               AND created_at IS NOT NULL AND TRIM(created_at) != ''
             ORDER BY id ASC"
        ))?;
        let entities = stmt
            .query_map(params![scope.repository, scope.branch], Self::map_entity)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(entities)
    }

    async fn relationships(&self, scope: &BranchScope) -> Result<Vec<Relationship>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(&format!(
            "SELECT {RELATIONSHIP_COLUMNS} FROM mb_relationships
             WHERE repository = ?1 AND branch = ?2
             ORDER BY from_id, rel_type, to_id"
        ))?;
        let relationships = stmt
            .query_map(params![scope.repository, scope.branch], Self::map_relationship)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(relationships)
    }

    async fn relationships_touching(
        &self,
        scope: &BranchScope,
        ids: &[String],
        limit: usize,
    ) -> Result<Vec<Relationship>> {
        if ids.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }

        let conn = self.conn.lock().await;
        let mut relationships = BTreeMap::new();
        for chunk in ids.chunks(MAX_IDS_PER_STATEMENT) {
            // ?1 and ?2 are the scope; ids start at ?3 and are reused for both endpoints.
            let placeholders = (0..chunk.len())
                .map(|i| format!("?{}", i + 3))
                .collect::<Vec<_>>()
                .join(", ");
            let sql = format!(
                "SELECT {RELATIONSHIP_COLUMNS} FROM mb_relationships
                 WHERE repository = ?1 AND branch = ?2
                   AND (from_id IN ({placeholders}) OR to_id IN ({placeholders}))
                 ORDER BY from_id, rel_type, to_id
                 LIMIT {limit}"
            );

            let mut values: Vec<&str> = Vec::with_capacity(chunk.len() + 2);
            values.push(&scope.repository);
            values.push(&scope.branch);
            values.extend(chunk.iter().map(String::as_str));

            let mut stmt = conn.prepare(&sql)?;
            for relationship in stmt.query_map(params_from_iter(values), Self::map_relationship)? {
                let relationship = relationship?;
                let key = (
                    relationship.from_id.clone(),
                    relationship.rel_type.clone(),
                    relationship.to_id.clone(),
                    relationship.from_type,
                    relationship.to_type,
                );
                relationships.insert(key, relationship);
            }
        }

        // Edges touching ids from two chunks show up twice; the map keeps one.
        Ok(relationships.into_values().take(limit).collect())
    }

    async fn entity_degrees(
        &self,
        scope: &BranchScope,
        entities: &[EntityRef],
    ) -> Result<HashMap<EntityRef, usize>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(
            "SELECT COUNT(*) FROM mb_relationships
             WHERE repository = ?1 AND branch = ?2
               AND ((from_type = ?3 AND from_id = ?4) OR (to_type = ?3 AND to_id = ?4))",
        )?;

        let mut degrees = HashMap::with_capacity(entities.len());
        for entity in entities {
            let degree: usize = stmt.query_row(
                params![scope.repository, scope.branch, entity.entity_type.as_str(), entity.id],
                |row| row.get(0),
            )?;
            degrees.insert(entity.clone(), degree);
        }
        Ok(degrees)
    }

    async fn last_optimization(&self, scope: &BranchScope) -> Result<Option<DateTime<Utc>>> {
        let conn = self.conn.lock().await;
        let latest: Option<i64> = conn.query_row(
            "SELECT MAX(executed_at) FROM mb_optimization_runs
             WHERE repository = ?1 AND branch = ?2",
            params![scope.repository, scope.branch],
            |row| row.get(0),
        )?;
        Ok(latest.and_then(DateTime::from_timestamp_millis))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// EntityStore
// ─────────────────────────────────────────────────────────────────────────────

#[async_trait]
impl EntityStore for SqliteGraphStore {
    async fn get_entity(&self, scope: &BranchScope, entity: &EntityRef) -> Result<Option<Entity>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(&format!(
            "SELECT {ENTITY_COLUMNS} FROM mb_entities
             WHERE repository = ?1 AND branch = ?2 AND entity_type = ?3 AND id = ?4"
        ))?;
        Ok(stmt
            .query_row(
                params![scope.repository, scope.branch, entity.entity_type.as_str(), entity.id],
                Self::map_entity,
            )
            .optional()?)
    }

    async fn find_entity(&self, scope: &BranchScope, id: &str) -> Result<Option<Entity>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(&format!(
            "SELECT {ENTITY_COLUMNS} FROM mb_entities
             WHERE repository = ?1 AND branch = ?2 AND id = ?3"
        ))?;
        let matches = stmt
            .query_map(params![scope.repository, scope.branch, id], Self::map_entity)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        if matches.len() > 1 {
            tracing::debug!("Id {} exists under {} types in {}", id, matches.len(), scope);
        }
        Ok(matches.into_iter().min_by_key(|e| e.entity_type))
    }

    async fn upsert_entity(&self, entity: &Entity) -> Result<()> {
        let conn = self.conn.lock().await;
        insert_entity(&conn, entity)
    }

    async fn delete_entity(&self, scope: &BranchScope, entity: &EntityRef) -> Result<bool> {
        let mut conn = self.conn.lock().await;
        let tx = conn.transaction()?;

        let detached = tx.execute(
            "DELETE FROM mb_relationships
             WHERE repository = ?1 AND branch = ?2
               AND ((from_type = ?3 AND from_id = ?4) OR (to_type = ?3 AND to_id = ?4))",
            params![scope.repository, scope.branch, entity.entity_type.as_str(), entity.id],
        )?;
        let deleted = tx.execute(
            "DELETE FROM mb_entities
             WHERE repository = ?1 AND branch = ?2 AND entity_type = ?3 AND id = ?4",
            params![scope.repository, scope.branch, entity.entity_type.as_str(), entity.id],
        )?;
        tx.commit()?;

        if deleted > 0 {
            tracing::debug!("Deleted {} from {} ({} relationships detached)", entity, scope, detached);
        }
        Ok(deleted > 0)
    }

    async fn update_entity_fields(
        &self,
        scope: &BranchScope,
        entity: &EntityRef,
        fields: &serde_json::Map<String, serde_json::Value>,
    ) -> Result<bool> {
        let mut conn = self.conn.lock().await;
        let tx = conn.transaction()?;

        let current = {
            let mut stmt = tx.prepare(&format!(
                "SELECT {ENTITY_COLUMNS} FROM mb_entities
                 WHERE repository = ?1 AND branch = ?2 AND entity_type = ?3 AND id = ?4"
            ))?;
            stmt.query_row(
                params![scope.repository, scope.branch, entity.entity_type.as_str(), entity.id],
                Self::map_entity,
            )
            .optional()?
        };
        let Some(mut current) = current else {
            return Ok(false);
        };

        for (key, value) in fields {
            match key.as_str() {
                "name" => current.name = value_as_text(value).unwrap_or_default(),
                "description" => current.description = value_as_text(value),
                "status" => current.status = value_as_text(value),
                "created_at" => current.created_at = value_as_text(value),
                "updated_at" => current.updated_at = value_as_text(value),
                _ => {
                    current.properties.insert(key.clone(), value.clone());
                }
            }
        }

        insert_entity(&tx, &current)?;
        tx.commit()?;
        Ok(true)
    }

    async fn incident_relationships(
        &self,
        scope: &BranchScope,
        entity: &EntityRef,
    ) -> Result<Vec<Relationship>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(&format!(
            "SELECT {RELATIONSHIP_COLUMNS} FROM mb_relationships
             WHERE repository = ?1 AND branch = ?2
               AND ((from_type = ?3 AND from_id = ?4) OR (to_type = ?3 AND to_id = ?4))
             ORDER BY from_id, rel_type, to_id"
        ))?;
        let relationships = stmt
            .query_map(
                params![scope.repository, scope.branch, entity.entity_type.as_str(), entity.id],
                Self::map_relationship,
            )?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(relationships)
    }

    async fn relationship_exists_between(
        &self,
        scope: &BranchScope,
        a: &EntityRef,
        b: &EntityRef,
        rel_type: &str,
    ) -> Result<bool> {
        let conn = self.conn.lock().await;
        let exists: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM mb_relationships
             WHERE repository = ?1 AND branch = ?2 AND rel_type = ?3
               AND ((from_type = ?4 AND from_id = ?5 AND to_type = ?6 AND to_id = ?7)
                 OR (from_type = ?6 AND from_id = ?7 AND to_type = ?4 AND to_id = ?5)))",
            params![
                scope.repository,
                scope.branch,
                rel_type,
                a.entity_type.as_str(),
                a.id,
                b.entity_type.as_str(),
                b.id,
            ],
            |row| row.get(0),
        )?;
        Ok(exists)
    }

    async fn create_relationship(&self, relationship: &Relationship) -> Result<bool> {
        let conn = self.conn.lock().await;
        ensure_endpoints_exist(&conn, relationship)?;
        Ok(insert_relationship(&conn, relationship)? > 0)
    }

    async fn delete_outgoing_relationships(
        &self,
        scope: &BranchScope,
        from: &EntityRef,
        rel_type: &str,
    ) -> Result<usize> {
        let conn = self.conn.lock().await;
        let removed = conn.execute(
            "DELETE FROM mb_relationships
             WHERE repository = ?1 AND branch = ?2
               AND from_type = ?3 AND from_id = ?4 AND rel_type = ?5",
            params![scope.repository, scope.branch, from.entity_type.as_str(), from.id, rel_type],
        )?;
        Ok(removed)
    }

    async fn record_optimization_run(&self, record: &OptimizationRunRecord) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO mb_optimization_runs
             (plan_id, repository, branch, strategy, status, entities_deleted,
              entities_merged, entities_updated, snapshot_id, executed_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                record.plan_id,
                record.repository,
                record.branch,
                record.strategy,
                record.status,
                record.entities_deleted,
                record.entities_merged,
                record.entities_updated,
                record.snapshot_id,
                record.executed_at.timestamp_millis(),
            ],
        )?;
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// SnapshotStore
// ─────────────────────────────────────────────────────────────────────────────

#[async_trait]
impl SnapshotStore for SqliteGraphStore {
    async fn save_snapshot(&self, payload: &SnapshotPayload) -> Result<()> {
        let mut conn = self.conn.lock().await;
        let tx = conn.transaction()?;
        let snapshot = &payload.snapshot;

        tx.execute(
            "INSERT INTO mb_snapshots
             (snapshot_id, repository, branch, description, entities_count,
              relationships_count, checksum, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                snapshot.snapshot_id,
                snapshot.repository,
                snapshot.branch,
                snapshot.description,
                snapshot.entities_count,
                snapshot.relationships_count,
                payload.checksum,
                snapshot.created.timestamp_millis(),
            ],
        )?;

        {
            let mut stmt = tx.prepare(
                "INSERT INTO mb_snapshot_items (snapshot_id, kind, ordinal, payload_json)
                 VALUES (?1, ?2, ?3, ?4)",
            )?;
            for (ordinal, item) in payload.entity_items.iter().enumerate() {
                stmt.execute(params![snapshot.snapshot_id, "entity", ordinal, item])?;
            }
            for (ordinal, item) in payload.relationship_items.iter().enumerate() {
                stmt.execute(params![snapshot.snapshot_id, "relationship", ordinal, item])?;
            }
        }

        tx.commit()?;
        Ok(())
    }

    async fn get_snapshot(&self, snapshot_id: &str) -> Result<Option<Snapshot>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(&format!(
            "SELECT {SNAPSHOT_COLUMNS} FROM mb_snapshots WHERE snapshot_id = ?1"
        ))?;
        Ok(stmt.query_row(params![snapshot_id], Self::map_snapshot).optional()?)
    }

    async fn load_snapshot_payload(&self, snapshot_id: &str) -> Result<Option<SnapshotPayload>> {
        let conn = self.conn.lock().await;

        let header = conn
            .query_row(
                &format!("SELECT {SNAPSHOT_COLUMNS}, checksum FROM mb_snapshots WHERE snapshot_id = ?1"),
                params![snapshot_id],
                |row| Ok((Self::map_snapshot(row)?, row.get::<_, String>(7)?)),
            )
            .optional()?;
        let Some((snapshot, checksum)) = header else {
            return Ok(None);
        };

        let mut stmt = conn.prepare(
            "SELECT payload_json FROM mb_snapshot_items
             WHERE snapshot_id = ?1 AND kind = ?2
             ORDER BY ordinal ASC",
        )?;
        let entity_items = stmt
            .query_map(params![snapshot_id, "entity"], |row| row.get::<_, String>(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        let relationship_items = stmt
            .query_map(params![snapshot_id, "relationship"], |row| row.get::<_, String>(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(Some(SnapshotPayload {
            snapshot,
            checksum,
            entity_items,
            relationship_items,
        }))
    }

    async fn list_snapshots(
        &self,
        repository: &str,
        branch: Option<&str>,
    ) -> Result<Vec<Snapshot>> {
        let conn = self.conn.lock().await;
        let snapshots = if let Some(branch) = branch {
            let mut stmt = conn.prepare(&format!(
                "SELECT {SNAPSHOT_COLUMNS} FROM mb_snapshots
                 WHERE repository = ?1 AND branch = ?2
                 ORDER BY created_at DESC, snapshot_id ASC"
            ))?;
            stmt.query_map(params![repository, branch], Self::map_snapshot)?
                .collect::<std::result::Result<Vec<_>, _>>()?
        } else {
            let mut stmt = conn.prepare(&format!(
                "SELECT {SNAPSHOT_COLUMNS} FROM mb_snapshots
                 WHERE repository = ?1
                 ORDER BY created_at DESC, snapshot_id ASC"
            ))?;
            stmt.query_map(params![repository], Self::map_snapshot)?
                .collect::<std::result::Result<Vec<_>, _>>()?
        };
        Ok(snapshots)
    }

    async fn delete_snapshot(&self, snapshot_id: &str) -> Result<bool> {
        let mut conn = self.conn.lock().await;
        let tx = conn.transaction()?;
        tx.execute(
            "DELETE FROM mb_snapshot_items WHERE snapshot_id = ?1",
            params![snapshot_id],
        )?;
        let deleted = tx.execute(
            "DELETE FROM mb_snapshots WHERE snapshot_id = ?1",
            params![snapshot_id],
        )?;
        tx.commit()?;
        Ok(deleted > 0)
    }

    async fn replace_branch_state(
        &self,
        scope: &BranchScope,
        entities: &[Entity],
        relationships: &[Relationship],
    ) -> Result<()> {
        let mut conn = self.conn.lock().await;
        let tx = conn.transaction()?;

        tx.execute(
            "DELETE FROM mb_relationships WHERE repository = ?1 AND branch = ?2",
            params![scope.repository, scope.branch],
        )?;
        tx.execute(
            "DELETE FROM mb_entities WHERE repository = ?1 AND branch = ?2",
            params![scope.repository, scope.branch],
        )?;

        for entity in entities {
            check_item_scope(scope, &entity.repository, &entity.branch, &entity.id)?;
            insert_entity(&tx, &entity.clone().scoped(scope))?;
        }
        for relationship in relationships {
            let label = format!("{} -> {}", relationship.from_id, relationship.to_id);
            check_item_scope(scope, &relationship.repository, &relationship.branch, &label)?;
            insert_relationship(&tx, &relationship.clone().scoped(scope))?;
        }

        tx.commit()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DEPENDS_ON, RELATED_TO};

    fn scope() -> BranchScope {
        BranchScope::new("repo", "main")
    }

    async fn seeded_store() -> SqliteGraphStore {
        let store = SqliteGraphStore::open_in_memory().unwrap();
        let s = scope();
        let document = GraphDocument {
            entities: vec![
                Entity::new(&s, EntityType::Component, "comp-a", "A")
                    .with_created_at("2024-01-01T00:00:00Z"),
                Entity::new(&s, EntityType::Component, "comp-b", "B"),
                Entity::new(&s, EntityType::Component, "comp-c", "C"),
                Entity::new(&s, EntityType::Decision, "dec-1", "Use SQLite")
                    .with_status("deprecated")
                    .with_description("Embedded store, no server process"),
                Entity::new(&s, EntityType::Tag, "tag-x", "x").with_created_at("   "),
            ],
            relationships: vec![
                Relationship::new(
                    &s,
                    &EntityRef::new("comp-a", EntityType::Component),
                    DEPENDS_ON,
                    &EntityRef::new("comp-b", EntityType::Component),
                ),
                Relationship::new(
                    &s,
                    &EntityRef::new("dec-1", EntityType::Decision),
                    RELATED_TO,
                    &EntityRef::new("comp-a", EntityType::Component),
                ),
            ],
        };
        store.import(&s, &document).await.unwrap();
        store
    }

    #[tokio::test]
    async fn test_counts_are_branch_scoped() {
        let store = seeded_store().await;
        let other = BranchScope::new("repo", "feature");
        store
            .upsert_entity(&Entity::new(&other, EntityType::Rule, "rule-1", "r"))
            .await
            .unwrap();

        let counts = store.entity_counts(&scope()).await.unwrap();
        assert_eq!(counts.get(&EntityType::Component), Some(&3));
        assert_eq!(counts.get(&EntityType::Rule), None);
        assert_eq!(store.relationship_count(&scope()).await.unwrap(), 2);

        let feature_counts = store.entity_counts(&other).await.unwrap();
        assert_eq!(feature_counts.get(&EntityType::Rule), Some(&1));
        assert_eq!(store.relationship_count(&other).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_entities_ordered_and_limited() {
        let store = seeded_store().await;

        let all = store.entities(&scope(), &EntityFilter::all()).await.unwrap();
        let ids: Vec<_> = all.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["comp-a", "comp-b", "comp-c", "dec-1", "tag-x"]);

        let limited = store
            .entities(&scope(), &EntityFilter::of_type(EntityType::Component).limit(2))
            .await
            .unwrap();
        assert_eq!(limited.len(), 2);
        assert_eq!(limited[1].id, "comp-b");
    }

    #[tokio::test]
    async fn test_problematic_entities_orders_by_degree() {
        let store = seeded_store().await;
        let problematic = store.problematic_entities(&scope(), 10).await.unwrap();
        let ids: Vec<_> = problematic.iter().map(|d| d.entity.id.as_str()).collect();

        // comp-c and tag-x are orphans, dec-1 is deprecated with one edge
        assert_eq!(ids, vec!["comp-c", "tag-x", "dec-1"]);
        assert_eq!(problematic[2].degree, 1);
    }

    #[tokio::test]
    async fn test_timestamped_entities_skip_blank() {
        let store = seeded_store().await;
        let stamped = store.timestamped_entities(&scope()).await.unwrap();
        assert_eq!(stamped.len(), 1);
        assert_eq!(stamped[0].id, "comp-a");
    }

    #[tokio::test]
    async fn test_relationships_touching_respects_cap() {
        let store = seeded_store().await;
        let ids = vec!["comp-a".to_string()];

        let all = store.relationships_touching(&scope(), &ids, 100).await.unwrap();
        assert_eq!(all.len(), 2);

        let capped = store.relationships_touching(&scope(), &ids, 1).await.unwrap();
        assert_eq!(capped.len(), 1);

        let none = store.relationships_touching(&scope(), &[], 100).await.unwrap();
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn test_relationships_touching_spans_many_ids() {
        let store = SqliteGraphStore::open_in_memory().unwrap();
        let s = scope();
        let hub = EntityRef::new("comp-hub", EntityType::Component);
        let mut document = GraphDocument {
            entities: vec![Entity::new(&s, EntityType::Component, "comp-hub", "hub")],
            relationships: vec![],
        };
        for i in 0..1200 {
            let id = format!("file-{i:04}");
            document.entities.push(Entity::new(&s, EntityType::File, &id, &id));
            document.relationships.push(Relationship::new(
                &s,
                &hub,
                DEPENDS_ON,
                &EntityRef::new(id, EntityType::File),
            ));
        }
        store.import(&s, &document).await.unwrap();

        // Hub first and last so its edges are matched from more than one batch
        let mut ids: Vec<String> = document.entities.iter().map(|e| e.id.clone()).collect();
        ids.push("comp-hub".to_string());

        let touching = store.relationships_touching(&s, &ids, 5000).await.unwrap();
        assert_eq!(touching.len(), 1200);
        assert_eq!(touching[0].to_id, "file-0000");

        let capped = store.relationships_touching(&s, &ids, 100).await.unwrap();
        assert_eq!(capped.len(), 100);
        assert_eq!(capped[99].to_id, "file-0099");
    }

    #[tokio::test]
    async fn test_entity_degrees_count_every_edge() {
        let store = seeded_store().await;
        let other = BranchScope::new("repo", "feature");
        store
            .upsert_entity(&Entity::new(&other, EntityType::Component, "comp-a", "A"))
            .await
            .unwrap();

        let a = EntityRef::new("comp-a", EntityType::Component);
        let c = EntityRef::new("comp-c", EntityType::Component);
        let missing = EntityRef::new("comp-zz", EntityType::Component);
        let degrees = store
            .entity_degrees(&scope(), &[a.clone(), c.clone(), missing.clone()])
            .await
            .unwrap();
        assert_eq!(degrees[&a], 2);
        assert_eq!(degrees[&c], 0);
        assert_eq!(degrees[&missing], 0);

        let feature = store.entity_degrees(&other, &[a.clone()]).await.unwrap();
        assert_eq!(feature[&a], 0);
    }

    #[tokio::test]
    async fn test_delete_entity_detaches_relationships() {
        let store = seeded_store().await;
        let a = EntityRef::new("comp-a", EntityType::Component);

        assert!(store.delete_entity(&scope(), &a).await.unwrap());
        assert_eq!(store.relationship_count(&scope()).await.unwrap(), 0);
        assert!(store.get_entity(&scope(), &a).await.unwrap().is_none());

        // Second delete reports absence
        assert!(!store.delete_entity(&scope(), &a).await.unwrap());
    }

    #[tokio::test]
    async fn test_update_entity_fields_splits_columns_and_properties() {
        let store = seeded_store().await;
        let b = EntityRef::new("comp-b", EntityType::Component);
        let mut fields = serde_json::Map::new();
        fields.insert("status".into(), serde_json::json!("active"));
        fields.insert("kind".into(), serde_json::json!("service"));

        assert!(store.update_entity_fields(&scope(), &b, &fields).await.unwrap());
        let updated = store.get_entity(&scope(), &b).await.unwrap().unwrap();
        assert_eq!(updated.status.as_deref(), Some("active"));
        assert_eq!(updated.properties["kind"], "service");

        let missing = EntityRef::new("comp-zzz", EntityType::Component);
        assert!(!store.update_entity_fields(&scope(), &missing, &fields).await.unwrap());
    }

    #[tokio::test]
    async fn test_relationship_exists_either_direction() {
        let store = seeded_store().await;
        let a = EntityRef::new("comp-a", EntityType::Component);
        let b = EntityRef::new("comp-b", EntityType::Component);

        assert!(store.relationship_exists_between(&scope(), &a, &b, DEPENDS_ON).await.unwrap());
        assert!(store.relationship_exists_between(&scope(), &b, &a, DEPENDS_ON).await.unwrap());
        assert!(!store.relationship_exists_between(&scope(), &a, &b, RELATED_TO).await.unwrap());
    }

    #[tokio::test]
    async fn test_create_relationship_requires_endpoints() {
        let store = seeded_store().await;
        let a = EntityRef::new("comp-a", EntityType::Component);
        let ghost = EntityRef::new("comp-ghost", EntityType::Component);

        let err = store
            .create_relationship(&Relationship::new(&scope(), &a, DEPENDS_ON, &ghost))
            .await
            .unwrap_err();
        assert!(err.is_not_found());

        let c = EntityRef::new("comp-c", EntityType::Component);
        let rel = Relationship::new(&scope(), &a, DEPENDS_ON, &c);
        assert!(store.create_relationship(&rel).await.unwrap());
        assert!(!store.create_relationship(&rel).await.unwrap());
    }

    #[tokio::test]
    async fn test_import_rejects_foreign_branch() {
        let store = SqliteGraphStore::open_in_memory().unwrap();
        let foreign = BranchScope::new("repo", "feature");
        let document = GraphDocument {
            entities: vec![Entity::new(&foreign, EntityType::Rule, "rule-1", "r")],
            relationships: vec![],
        };

        let err = store.import(&scope(), &document).await.unwrap_err();
        assert!(matches!(err, Error::CrossBranch(_)));
    }

    #[tokio::test]
    async fn test_find_entity_without_type() {
        let store = seeded_store().await;
        let found = store.find_entity(&scope(), "dec-1").await.unwrap().unwrap();
        assert_eq!(found.entity_type, EntityType::Decision);
        assert_eq!(found.description.as_deref(), Some("Embedded store, no server process"));
        assert!(store.find_entity(&scope(), "nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_snapshot_roundtrip_and_replace() {
        let store = seeded_store().await;
        let s = scope();
        let snapshot = Snapshot {
            snapshot_id: "snap-1".into(),
            repository: s.repository.clone(),
            branch: s.branch.clone(),
            description: "before".into(),
            entities_count: 1,
            relationships_count: 0,
            created: Utc::now(),
        };
        let item = serde_json::to_string(&Entity::new(&s, EntityType::Rule, "rule-9", "r")).unwrap();
        store
            .save_snapshot(&SnapshotPayload {
                snapshot: snapshot.clone(),
                checksum: "abc".into(),
                entity_items: vec![item],
                relationship_items: vec![],
            })
            .await
            .unwrap();

        let listed = store.list_snapshots("repo", Some("main")).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert!(store.list_snapshots("repo", Some("other")).await.unwrap().is_empty());

        let payload = store.load_snapshot_payload("snap-1").await.unwrap().unwrap();
        assert_eq!(payload.checksum, "abc");
        assert_eq!(payload.entity_items.len(), 1);

        let restored: Entity = serde_json::from_str(&payload.entity_items[0]).unwrap();
        store.replace_branch_state(&s, &[restored], &[]).await.unwrap();
        let counts = store.entity_counts(&s).await.unwrap();
        assert_eq!(counts.get(&EntityType::Rule), Some(&1));
        assert_eq!(counts.values().sum::<usize>(), 1);

        assert!(store.delete_snapshot("snap-1").await.unwrap());
        assert!(store.get_snapshot("snap-1").await.unwrap().is_none());
    }
}
