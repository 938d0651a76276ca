//! membank-core - Core library for membank
//!
//! This crate provides the knowledge graph model shared by the SDK and CLI:
//!
//! - **types**: entities, relationships, branch scopes and snapshots
//! - **graph**: store interfaces and the SQLite-backed store
//! - **error**: error taxonomy for store operations

pub mod error;
pub mod graph;
pub mod types;

// Re-export commonly used types
pub use error::{Error, Result};
pub use graph::{EntityStore, GraphQuery, ImportSummary, SnapshotStore, SqliteGraphStore};
pub use types::{
    BranchScope, DEPENDS_ON, Entity, EntityDegree, EntityFilter, EntityRef, EntityType,
    GraphDocument, OptimizationRunRecord, RELATED_TO, Relationship, Snapshot, SnapshotPayload,
};
