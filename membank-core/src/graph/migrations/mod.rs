//! Graph database migrations
//!
//! SQL migrations are embedded as strings and executed when a store is opened.

use rusqlite::Connection;

use crate::error::Result;

/// Graph tables SQL (001)
pub const GRAPH_TABLES_SQL: &str = include_str!("001_graph_tables.sql");

/// Run all graph migrations
pub fn run_migrations(conn: &Connection) -> Result<()> {
    conn.execute_batch(GRAPH_TABLES_SQL)?;
    Ok(())
}
