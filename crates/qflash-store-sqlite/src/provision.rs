// crates/qflash-store-sqlite/src/provision.rs
// ============================================================================
// Module: SQLite Log Store Provisioning
// Description: Creates and reads the plan log table.
// Purpose: Give operators a ready log store and a way to inspect it.
// Dependencies: qflash-core, rusqlite, serde
// ============================================================================

//! ## Overview
//! The log table carries the four columns the side-channel insert writes
//! plus a surrogate key and an insertion timestamp. Provisioning is
//! idempotent and bypasses the hook chain. Names are validated before they
//! are spliced into SQL.

// ============================================================================
// SECTION: Imports
// ============================================================================

use rusqlite::params;
use serde::Serialize;

use crate::config::validate_identifier;
use crate::engine::SqliteEngine;
use crate::engine::SqliteEngineError;

// ============================================================================
// SECTION: Types
// ============================================================================

/// One row of the plan log table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogRow {
    /// Surrogate key.
    pub id: i64,
    /// Insertion time (RFC 3339, UTC).
    pub added: String,
    /// Logged statement text.
    pub query: Option<String>,
    /// Rendered plan.
    pub plan: Option<String>,
    /// Total elapsed time in milliseconds.
    pub total_time: Option<f64>,
    /// Correlation tag.
    pub hash: Option<String>,
}

// ============================================================================
// SECTION: Provisioning
// ============================================================================

/// Creates the log table when it does not exist.
///
/// # Errors
///
/// Returns [`SqliteEngineError::Invalid`] for malformed names and
/// [`SqliteEngineError::Db`] when the table cannot be created.
pub fn provision_log_store(
    engine: &SqliteEngine,
    namespace: &str,
    relation: &str,
) -> Result<(), SqliteEngineError> {
    validate_names(namespace, relation)?;
    engine
        .connection()
        .execute_batch(&format!(
            "CREATE TABLE IF NOT EXISTS \"{namespace}\".\"{relation}\" (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                added TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
                query TEXT,
                plan TEXT,
                total_time REAL,
                hash TEXT
            );"
        ))
        .map_err(|err| SqliteEngineError::Db(err.to_string()))
}

/// Returns the most recent `limit` log rows in insertion order.
///
/// # Errors
///
/// Returns [`SqliteEngineError::Invalid`] for malformed names and
/// [`SqliteEngineError::Db`] when the table cannot be read.
pub fn read_log_rows(
    engine: &SqliteEngine,
    namespace: &str,
    relation: &str,
    limit: u32,
) -> Result<Vec<LogRow>, SqliteEngineError> {
    validate_names(namespace, relation)?;
    let sql = format!(
        "SELECT id, added, query, plan, total_time, hash FROM (
            SELECT id, added, query, plan, total_time, hash
            FROM \"{namespace}\".\"{relation}\" ORDER BY id DESC LIMIT ?1
        ) ORDER BY id ASC"
    );
    let mut stmt =
        engine.connection().prepare(&sql).map_err(|err| SqliteEngineError::Db(err.to_string()))?;
    let rows = stmt
        .query_map(params![i64::from(limit)], |row| {
            Ok(LogRow {
                id: row.get(0)?,
                added: row.get(1)?,
                query: row.get(2)?,
                plan: row.get(3)?,
                total_time: row.get(4)?,
                hash: row.get(5)?,
            })
        })
        .map_err(|err| SqliteEngineError::Db(err.to_string()))?;
    rows.collect::<Result<Vec<_>, _>>().map_err(|err| SqliteEngineError::Db(err.to_string()))
}

/// Validates the namespace and relation names.
fn validate_names(namespace: &str, relation: &str) -> Result<(), SqliteEngineError> {
    validate_identifier("namespace", namespace).map_err(SqliteEngineError::Invalid)?;
    validate_identifier("relation", relation).map_err(SqliteEngineError::Invalid)
}
