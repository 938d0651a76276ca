//! Branch-scoped knowledge graph storage.
//!
//! - **traits**: narrow store interfaces (`GraphQuery`, `EntityStore`, `SnapshotStore`)
//! - **store**: SQLite implementation of all three
//! - **migrations**: embedded schema

pub mod migrations;
pub mod store;
pub mod traits;

pub use store::{ImportSummary, SqliteGraphStore};
pub use traits::{EntityStore, GraphQuery, SnapshotStore};
