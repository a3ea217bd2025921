// crates/qflash-store-sqlite/src/classify.rs
// ============================================================================
// Module: SQLite Statement Classification
// Description: Operation kind and referenced tables of a SQL statement.
// Purpose: Derive statement metadata from the SQLite authorizer.
// Dependencies: qflash-core, rusqlite, tracing
// ============================================================================

//! ## Overview
//! Classification compiles a statement once with an authorizer installed and
//! records the actions `SQLite` reports for the top-level statement. Actions
//! raised from inside triggers and views carry an accessor and are skipped.
//! The first write action decides the operation; otherwise any read makes it
//! a select and anything else makes it a utility statement. `EXPLAIN`
//! statements are utility statements regardless of what they explain.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::sync::Mutex;

use qflash_core::OperationKind;
use rusqlite::Connection;
use rusqlite::hooks::AuthAction;
use rusqlite::hooks::AuthContext;
use rusqlite::hooks::Authorization;
use tracing::warn;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Table names that refer to the schema catalog.
const CATALOG_TABLES: [&str; 4] =
    ["sqlite_master", "sqlite_schema", "sqlite_temp_master", "sqlite_temp_schema"];

// ============================================================================
// SECTION: Types
// ============================================================================

/// Schema-qualified table reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableRef {
    /// Schema name (`main`, `temp` or an attached schema).
    pub schema: String,
    /// Table name.
    pub table: String,
}

impl TableRef {
    /// Returns true when the table is the schema catalog.
    #[must_use]
    pub fn is_catalog(&self) -> bool {
        CATALOG_TABLES.iter().any(|name| self.table.eq_ignore_ascii_case(name))
    }

    /// Returns true when both references name the same table.
    fn same_table(&self, other: &Self) -> bool {
        self.schema.eq_ignore_ascii_case(&other.schema)
            && self.table.eq_ignore_ascii_case(&other.table)
    }
}

/// Classified statement metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    /// Operation kind.
    pub operation: OperationKind,
    /// Referenced tables; the write target first, then reads in order.
    pub tables: Vec<TableRef>,
}

/// Authorizer action relevant to classification.
#[derive(Debug, Clone)]
enum AuthEvent {
    /// A `SELECT` statement or subquery.
    Select,
    /// A column read.
    Read(TableRef),
    /// A row write.
    Write(OperationKind, TableRef),
    /// Anything that makes the statement a utility command.
    Utility,
}

// ============================================================================
// SECTION: Classification
// ============================================================================

/// Classifies a statement by compiling it under an authorizer.
///
/// # Errors
///
/// Returns the `SQLite` error when the statement does not compile or the
/// authorizer cannot be installed.
pub fn classify(connection: &Connection, sql: &str) -> Result<Classification, rusqlite::Error> {
    let events: Arc<Mutex<Vec<AuthEvent>>> = Arc::default();
    let sink = Arc::clone(&events);
    connection.authorizer(Some(move |ctx: AuthContext<'_>| {
        if ctx.accessor.is_none()
            && let Some(event) = auth_event(&ctx)
            && let Ok(mut events) = sink.lock()
        {
            events.push(event);
        }
        Authorization::Allow
    }))?;
    let compiled = connection.prepare(sql).map(|stmt| stmt.is_explain() != 0);
    let removed = connection.authorizer(None::<fn(AuthContext<'_>) -> Authorization>);
    let explain = match compiled {
        Ok(explain) => {
            removed?;
            explain
        }
        Err(err) => {
            if let Err(remove_err) = removed {
                warn!(error = %remove_err, "failed to remove classification authorizer");
            }
            return Err(err);
        }
    };
    if explain {
        return Ok(Classification {
            operation: OperationKind::Other,
            tables: Vec::new(),
        });
    }
    let events = events.lock().map(|mut events| std::mem::take(&mut *events)).unwrap_or_default();
    Ok(summarize(&events))
}

/// Maps one authorizer callback to a classification event.
fn auth_event(ctx: &AuthContext<'_>) -> Option<AuthEvent> {
    let schema = ctx.database_name.unwrap_or("main");
    let table_ref = |table: &str| TableRef {
        schema: schema.to_string(),
        table: table.to_string(),
    };
    match ctx.action {
        AuthAction::Select => Some(AuthEvent::Select),
        AuthAction::Read {
            table_name, ..
        } => Some(AuthEvent::Read(table_ref(table_name))),
        AuthAction::Insert {
            table_name, ..
        } => Some(AuthEvent::Write(OperationKind::Insert, table_ref(table_name))),
        AuthAction::Update {
            table_name, ..
        } => Some(AuthEvent::Write(OperationKind::Update, table_ref(table_name))),
        AuthAction::Delete {
            table_name, ..
        } => Some(AuthEvent::Write(OperationKind::Delete, table_ref(table_name))),
        AuthAction::Function {
            ..
        }
        | AuthAction::Recursive => None,
        _ => Some(AuthEvent::Utility),
    }
}

/// Folds authorizer events into a classification.
fn summarize(events: &[AuthEvent]) -> Classification {
    let utility = events.iter().any(|event| matches!(event, AuthEvent::Utility));
    let write = events.iter().find_map(|event| match event {
        AuthEvent::Write(operation, table) => Some((*operation, table.clone())),
        _ => None,
    });
    let mut tables: Vec<TableRef> = Vec::new();
    let operation = match write {
        _ if utility => OperationKind::Other,
        Some((operation, target)) => {
            tables.push(target);
            operation
        }
        None if events.iter().any(|event| matches!(event, AuthEvent::Select | AuthEvent::Read(_))) => {
            OperationKind::Select
        }
        None => OperationKind::Other,
    };
    for event in events {
        if let AuthEvent::Read(table) = event
            && !tables.iter().any(|seen| seen.same_table(table))
        {
            tables.push(table.clone());
        }
    }
    Classification {
        operation,
        tables,
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
