// crates/qflash-core/src/runtime/writer.rs
// ============================================================================
// Module: QFlash Side-Channel Writer
// Description: Isolated insert of a captured record into the log store.
// Purpose: Persist one log row per logged statement, never retried.
// Dependencies: crate::core, crate::interfaces, tracing
// ============================================================================

//! ## Overview
//! The writer issues the log insert through the engine's query facility in
//! an isolated execution context. Contexts pushed deeper than the current
//! depth are popped first; a fresh one is pushed when the current depth has
//! none. The insert itself re-enters the lifecycle one level deeper, where
//! the recursion guard keeps it from being logged.
//!
//! On failure the writer closes its connection best effort, drops the
//! context it pushed and returns the classified error.

// ============================================================================
// SECTION: Imports
// ============================================================================

use tracing::info;
use tracing::warn;

use crate::core::LogRecord;
use crate::core::ParamType;
use crate::interfaces::FacilityError;
use crate::interfaces::QueryFacility;
use crate::runtime::error::QflashError;
use crate::runtime::nesting::NestingTracker;
use crate::runtime::settings::ResolvedTarget;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Parameter types of the generated insert: query, plan, total time, hash.
pub const INSERT_PARAM_TYPES: [ParamType; 4] =
    [ParamType::Text, ParamType::Text, ParamType::Float8, ParamType::Text];

// ============================================================================
// SECTION: Writer
// ============================================================================

/// Side-channel writer for captured records.
#[derive(Debug, Clone, Copy, Default)]
pub struct SideChannelWriter;

impl SideChannelWriter {
    /// Writes one record into the resolved target.
    ///
    /// # Errors
    ///
    /// Returns [`QflashError::Context`] when an execution context cannot be
    /// pushed or popped, and the storage variants when connecting, preparing
    /// or executing the insert fails.
    pub fn write<F>(
        &self,
        nesting: &NestingTracker,
        facility: &F,
        target: &ResolvedTarget,
        record: LogRecord,
    ) -> Result<(), QflashError>
    where
        F: QueryFacility + ?Sized,
    {
        nesting.pop_if_shallower(facility).map_err(context_error)?;
        let pushed = nesting.push_if_deeper(facility).map_err(context_error)?;
        let sql = insert_statement(&target.namespace_name, &target.relation_name);

        if let Err(err) = facility.connect() {
            undo_push(nesting, facility, pushed);
            return Err(QflashError::StorageConnect(facility_message(err)));
        }

        let total_time_ms = record.total_time_ms;
        let query = record.query.clone();
        let outcome = execute_insert(facility, &sql, record);
        let outcome = match outcome {
            Ok(()) => nesting.pop_if_shallower(facility).map(|_| ()).map_err(context_error),
            Err(err) => Err(err),
        };

        match outcome {
            Ok(()) => {
                if let Err(err) = facility.finish() {
                    return Err(QflashError::StorageConnect(facility_message(err)));
                }
                info!(
                    relation = %format_args!("{}.{}", target.namespace_name, target.relation_name),
                    total_time_ms,
                    "plan logged"
                );
                Ok(())
            }
            Err(err) => {
                if let Err(pop_err) = nesting.pop_if_shallower(facility) {
                    warn!(error = %pop_err, "failed to restore side-channel context");
                }
                if let Err(finish_err) = facility.finish() {
                    warn!(error = %finish_err, query = %query, "failed to close side-channel connection");
                }
                undo_push(nesting, facility, pushed);
                Err(err)
            }
        }
    }

    /// Pops every context pushed deeper than the current depth.
    ///
    /// # Errors
    ///
    /// Returns [`QflashError::Context`] when a context cannot be popped.
    pub fn settle<F>(&self, nesting: &NestingTracker, facility: &F) -> Result<(), QflashError>
    where
        F: QueryFacility + ?Sized,
    {
        nesting.pop_if_shallower(facility).map(|_| ()).map_err(context_error)
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Builds the insert text for a log target.
#[must_use]
pub fn insert_statement(namespace: &str, relation: &str) -> String {
    format!(
        "INSERT INTO {namespace}.{relation} (query, plan, total_time, hash) VALUES ($1, $2, $3, $4)"
    )
}

/// Prepares and executes the insert, expecting exactly one row.
fn execute_insert<F>(facility: &F, sql: &str, record: LogRecord) -> Result<(), QflashError>
where
    F: QueryFacility + ?Sized,
{
    let prepared =
        facility.prepare(sql, &INSERT_PARAM_TYPES).map_err(|err| QflashError::StoragePrepare {
            sql: sql.to_string(),
            message: facility_message(err),
        })?;
    let query = record.query.clone();
    let rows = facility.execute_prepared(&prepared, &record.into_params(), 1).map_err(|err| {
        QflashError::StorageExec {
            sql: sql.to_string(),
            query,
            message: facility_message(err),
        }
    })?;
    if rows != 1 {
        return Err(QflashError::UnexpectedRowCount {
            sql: sql.to_string(),
            rows,
        });
    }
    Ok(())
}

/// Pops the context pushed by this write, logging a failure.
fn undo_push<F>(nesting: &NestingTracker, facility: &F, pushed: bool)
where
    F: QueryFacility + ?Sized,
{
    if !pushed {
        return;
    }
    if let Err(err) = nesting.pop_innermost(facility) {
        warn!(error = %err, "failed to pop side-channel context");
    }
}

/// Maps a facility failure to a context error.
fn context_error(err: FacilityError) -> QflashError {
    QflashError::Context(facility_message(err))
}

/// Extracts the engine message from a facility error.
fn facility_message(err: FacilityError) -> String {
    match err {
        FacilityError::Failed(message) => message,
    }
}
