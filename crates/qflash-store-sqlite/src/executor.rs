// crates/qflash-store-sqlite/src/executor.rs
// ============================================================================
// Module: SQLite Standard Executor
// Description: Statement context and innermost lifecycle layer for SQLite.
// Purpose: Run statements, time them and fire engine-level triggers.
// Dependencies: qflash-core, rusqlite
// ============================================================================

//! ## Overview
//! [`SqliteStatement`] is the per-execution context the hook chain sees.
//! [`SqliteExecutor`] is the innermost layer: run steps the prepared
//! statement to completion, finish fires engine-level after-statement
//! triggers through the full chain. Both phases feed the attached timing
//! accumulator from the engine's monotonic clock.

// ============================================================================
// SECTION: Imports
// ============================================================================

use qflash_core::Datum;
use qflash_core::ExecutorHooks;
use qflash_core::InstrumentOptions;
use qflash_core::Instrumentation;
use qflash_core::OperationKind;
use qflash_core::RelationOid;
use qflash_core::ScanDirection;
use qflash_core::StatementContext;
use qflash_core::TriggerStats;
use rusqlite::types::Value;

use crate::engine::SqliteEngine;
use crate::engine::SqliteEngineError;

// ============================================================================
// SECTION: Query Outcome
// ============================================================================

/// Result of executing one statement.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct QueryOutcome {
    /// Result column names; empty for statements without a result set.
    pub columns: Vec<String>,
    /// Result rows.
    pub rows: Vec<Vec<Value>>,
    /// Rows changed by a write statement.
    pub changes: u64,
}

// ============================================================================
// SECTION: Statement
// ============================================================================

/// One execution of a SQL statement.
#[derive(Debug, Clone, PartialEq)]
pub struct SqliteStatement {
    /// Statement text.
    pub(crate) sql: String,
    /// Bound parameters in placeholder order.
    pub(crate) params: Vec<Datum>,
    /// Operation kind.
    pub(crate) operation: OperationKind,
    /// Referenced relations, primary first.
    pub(crate) relations: Vec<RelationOid>,
    /// Requested instrumentation.
    pub(crate) instrument: InstrumentOptions,
    /// Attached timing accumulator.
    pub(crate) totaltime: Option<Instrumentation>,
    /// Triggers fired during finish.
    pub(crate) triggers: Vec<TriggerStats>,
    /// Result of the run phase.
    pub(crate) outcome: QueryOutcome,
}

impl SqliteStatement {
    /// Creates a statement context for a classified statement.
    pub(crate) fn new(
        sql: &str,
        params: Vec<Datum>,
        operation: OperationKind,
        relations: Vec<RelationOid>,
    ) -> Self {
        Self {
            sql: sql.to_string(),
            params,
            operation,
            relations,
            instrument: InstrumentOptions::NONE,
            totaltime: None,
            triggers: Vec::new(),
            outcome: QueryOutcome::default(),
        }
    }

    /// Returns the triggers fired during finish.
    #[must_use]
    pub fn triggers(&self) -> &[TriggerStats] {
        &self.triggers
    }

    /// Returns rows returned or changed by the run phase.
    #[must_use]
    pub fn rows_processed(&self) -> u64 {
        if self.outcome.columns.is_empty() {
            self.outcome.changes
        } else {
            u64::try_from(self.outcome.rows.len()).unwrap_or(u64::MAX)
        }
    }

    /// Consumes the statement, returning its result.
    #[must_use]
    pub fn into_outcome(self) -> QueryOutcome {
        self.outcome
    }
}

impl StatementContext for SqliteStatement {
    fn source_text(&self) -> &str {
        &self.sql
    }

    fn operation(&self) -> OperationKind {
        self.operation
    }

    fn relations(&self) -> &[RelationOid] {
        &self.relations
    }

    fn instrument_options(&self) -> InstrumentOptions {
        self.instrument
    }

    fn request_instrumentation(&mut self, options: InstrumentOptions) {
        self.instrument |= options;
    }

    fn totaltime(&self) -> Option<&Instrumentation> {
        self.totaltime.as_ref()
    }

    fn totaltime_mut(&mut self) -> Option<&mut Instrumentation> {
        self.totaltime.as_mut()
    }

    fn attach_totaltime(&mut self, instrumentation: Instrumentation) {
        self.totaltime = Some(instrumentation);
    }
}

/// Prepared side-channel statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqlitePrepared {
    /// Statement text.
    pub(crate) sql: String,
    /// Operation kind.
    pub(crate) operation: OperationKind,
    /// Referenced relations, primary first.
    pub(crate) relations: Vec<RelationOid>,
    /// Declared parameter count.
    pub(crate) param_count: usize,
}

// ============================================================================
// SECTION: Standard Executor
// ============================================================================

/// Innermost lifecycle layer of the `SQLite` engine.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteExecutor;

impl ExecutorHooks<SqliteEngine> for SqliteExecutor {
    fn into_inner(
        self: Box<Self>,
    ) -> Result<Box<dyn ExecutorHooks<SqliteEngine>>, Box<dyn ExecutorHooks<SqliteEngine>>> {
        Err(self)
    }

    fn begin(
        &self,
        _engine: &SqliteEngine,
        _stmt: &mut SqliteStatement,
    ) -> Result<(), SqliteEngineError> {
        Ok(())
    }

    fn run(
        &self,
        engine: &SqliteEngine,
        stmt: &mut SqliteStatement,
        _direction: ScanDirection,
        _count: u64,
    ) -> Result<(), SqliteEngineError> {
        if let Some(totaltime) = stmt.totaltime.as_mut() {
            totaltime.start_node(engine.elapsed());
        }
        let result = engine.run_statement(stmt);
        let processed = stmt.rows_processed();
        if let Some(totaltime) = stmt.totaltime.as_mut() {
            totaltime.stop_node(engine.elapsed(), processed);
        }
        result
    }

    fn finish(
        &self,
        engine: &SqliteEngine,
        stmt: &mut SqliteStatement,
    ) -> Result<(), SqliteEngineError> {
        if let Some(totaltime) = stmt.totaltime.as_mut() {
            totaltime.start_node(engine.elapsed());
        }
        for trigger in engine.triggers_for(stmt) {
            let started = engine.elapsed();
            engine.execute(&trigger.sql)?;
            stmt.triggers.push(TriggerStats {
                name: trigger.name,
                calls: 1,
                time: engine.elapsed().saturating_sub(started),
            });
        }
        if let Some(totaltime) = stmt.totaltime.as_mut() {
            totaltime.stop_node(engine.elapsed(), 0);
        }
        Ok(())
    }

    fn end(
        &self,
        _engine: &SqliteEngine,
        _stmt: &mut SqliteStatement,
    ) -> Result<(), SqliteEngineError> {
        Ok(())
    }
}
