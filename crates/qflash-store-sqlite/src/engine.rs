// crates/qflash-store-sqlite/src/engine.rs
// ============================================================================
// Module: SQLite Engine
// Description: SQLite-backed engine hosting the QFlash statement lifecycle.
// Purpose: Provide catalog, query facility, plan output and hook chain.
// Dependencies: qflash-core, rusqlite, serde_json, thiserror, tracing
// ============================================================================

//! ## Overview
//! [`SqliteEngine`] owns one `SQLite` connection and runs every statement
//! through its installed [`ExecutorHooks`] chain. Statements are classified
//! with the authorizer before begin; plans come from `EXPLAIN QUERY PLAN`.
//!
//! Schemas act as namespaces and tables as relations. Identifiers are derived
//! from `PRAGMA database_list` sequence numbers and `sqlite_master` rowids,
//! so they stay stable while the schema is unchanged. The schema catalog
//! tables all map to [`SCHEMA_CATALOG_RELATION`].
//!
//! Side-channel frames model isolated execution contexts over the single
//! connection; prepared side-channel statements re-enter the chain.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::fmt::Write as _;
use std::num::NonZeroU64;
use std::rc::Rc;
use std::time::Duration;
use std::time::Instant;

use qflash_core::Catalog;
use qflash_core::CatalogError;
use qflash_core::Datum;
use qflash_core::Engine;
use qflash_core::ExecutorHooks;
use qflash_core::ExplainError;
use qflash_core::ExplainFormat;
use qflash_core::ExplainState;
use qflash_core::FacilityError;
use qflash_core::NamespaceOid;
use qflash_core::OperationKind;
use qflash_core::ParamType;
use qflash_core::QflashError;
use qflash_core::QflashInterceptor;
use qflash_core::QflashSession;
use qflash_core::QueryFacility;
use qflash_core::RelationOid;
use qflash_core::ScanDirection;
use rusqlite::Connection;
use rusqlite::OpenFlags;
use rusqlite::OptionalExtension;
use rusqlite::params;
use rusqlite::params_from_iter;
use rusqlite::types::Value;
use serde_json::json;
use thiserror::Error;
use tracing::debug;

use crate::classify::TableRef;
use crate::classify::classify;
use crate::config::IN_MEMORY_PATH;
use crate::config::SqliteEngineConfig;
use crate::executor::QueryOutcome;
use crate::executor::SqliteExecutor;
use crate::executor::SqlitePrepared;
use crate::executor::SqliteStatement;
use crate::explain::PlanStep;
use crate::explain::json_tree;
use crate::explain::json_triggers;
use crate::explain::write_text_tree;
use crate::explain::write_text_triggers;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Identifier shared by the `SQLite` schema catalog tables.
pub const SCHEMA_CATALOG_RELATION: RelationOid = RelationOid::new(NonZeroU64::MIN);

/// Mask applied to table rowids when building relation identifiers.
const ROWID_MASK: u64 = 0xFFFF_FFFF;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// `SQLite` engine errors.
#[derive(Debug, Error)]
pub enum SqliteEngineError {
    /// Database error.
    #[error("sqlite engine db error: {0}")]
    Db(String),
    /// Invalid configuration or arguments.
    #[error("sqlite engine invalid: {0}")]
    Invalid(String),
    /// Relation does not exist.
    #[error("relation {0} does not exist")]
    UnknownRelation(String),
    /// The executor chain is in use and cannot be replaced.
    #[error("executor chain is busy")]
    ChainBusy,
    /// QFlash raised an error through the chain.
    #[error(transparent)]
    Qflash(#[from] QflashError),
}

/// Maps a `SQLite` error to an engine error.
fn db_error(err: rusqlite::Error) -> SqliteEngineError {
    SqliteEngineError::Db(err.to_string())
}

/// Maps any displayable error to a facility error.
fn facility_error(err: impl fmt::Display) -> FacilityError {
    FacilityError::Failed(err.to_string())
}

// ============================================================================
// SECTION: Engine
// ============================================================================

/// Engine-level after-statement trigger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct EngineTrigger {
    /// Trigger name.
    pub(crate) name: String,
    /// Relation whose statements fire the trigger.
    relation: RelationOid,
    /// Operation that fires the trigger.
    operation: OperationKind,
    /// Statement executed when the trigger fires.
    pub(crate) sql: String,
}

/// Side-channel execution frame.
#[derive(Debug, Clone, Copy, Default)]
struct Frame {
    /// True while a connection is open in this frame.
    connected: bool,
}

/// `SQLite`-backed engine.
pub struct SqliteEngine {
    /// Database connection.
    connection: Connection,
    /// Installed lifecycle chain.
    chain: RefCell<Box<dyn ExecutorHooks<Self>>>,
    /// Engine-level after-statement triggers.
    triggers: RefCell<Vec<EngineTrigger>>,
    /// Prepared side-channel statements cached by text.
    prepared: RefCell<BTreeMap<String, SqlitePrepared>>,
    /// Side-channel frames; the bottom frame always exists.
    frames: RefCell<Vec<Frame>>,
    /// Origin of the engine's monotonic clock.
    epoch: Instant,
}

impl fmt::Debug for SqliteEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SqliteEngine")
            .field("triggers", &self.triggers)
            .field("frames", &self.frames)
            .finish_non_exhaustive()
    }
}

impl SqliteEngine {
    /// Opens the configured database and attaches its schemas.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteEngineError`] when the configuration is invalid or the
    /// database cannot be opened.
    pub fn open(config: &SqliteEngineConfig) -> Result<Self, SqliteEngineError> {
        config.validate()?;
        let connection = open_connection(config)?;
        for schema in &config.attach {
            let path = schema.path.to_string_lossy();
            connection
                .execute(
                    &format!("ATTACH DATABASE ?1 AS \"{}\"", schema.name),
                    params![path.as_ref()],
                )
                .map_err(db_error)?;
        }
        debug!(attached = config.attach.len(), "sqlite engine opened");
        Ok(Self {
            connection,
            chain: RefCell::new(Box::new(SqliteExecutor)),
            triggers: RefCell::new(Vec::new()),
            prepared: RefCell::new(BTreeMap::new()),
            frames: RefCell::new(vec![Frame::default()]),
            epoch: Instant::now(),
        })
    }

    /// Opens a private in-memory database with no attached schemas.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteEngineError`] when the database cannot be opened.
    pub fn open_in_memory() -> Result<Self, SqliteEngineError> {
        Self::open(&SqliteEngineConfig::in_memory())
    }

    /// Returns the underlying connection.
    pub(crate) const fn connection(&self) -> &Connection {
        &self.connection
    }

    /// Returns time elapsed on the engine clock.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.epoch.elapsed()
    }

    /// Returns the number of side-channel frames, including the bottom one.
    #[must_use]
    pub fn frame_count(&self) -> usize {
        self.frames.borrow().len()
    }

    /// Returns the number of cached prepared side-channel statements.
    #[must_use]
    pub fn prepared_count(&self) -> usize {
        self.prepared.borrow().len()
    }

    /// Wraps the installed chain with a new outer layer.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteEngineError::ChainBusy`] while a statement is running.
    pub fn push_layer<F>(&self, wrap: F) -> Result<(), SqliteEngineError>
    where
        F: FnOnce(Box<dyn ExecutorHooks<Self>>) -> Box<dyn ExecutorHooks<Self>>,
    {
        let mut chain = self.chain.try_borrow_mut().map_err(|_| SqliteEngineError::ChainBusy)?;
        let previous = std::mem::replace(&mut *chain, Box::new(SqliteExecutor));
        *chain = wrap(previous);
        Ok(())
    }

    /// Removes the outermost layer, restoring the chain it wrapped.
    ///
    /// Returns false when only the standard executor remains.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteEngineError::ChainBusy`] while a statement is running.
    pub fn pop_layer(&self) -> Result<bool, SqliteEngineError> {
        let mut chain = self.chain.try_borrow_mut().map_err(|_| SqliteEngineError::ChainBusy)?;
        let top = std::mem::replace(&mut *chain, Box::new(SqliteExecutor));
        match top.into_inner() {
            Ok(next) => {
                *chain = next;
                Ok(true)
            }
            Err(top) => {
                *chain = top;
                Ok(false)
            }
        }
    }

    /// Installs a QFlash interceptor over the current chain.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteEngineError::ChainBusy`] while a statement is running.
    pub fn install_qflash(&self, session: Rc<QflashSession>) -> Result<(), SqliteEngineError> {
        self.push_layer(|next| Box::new(QflashInterceptor::install(next, session)))
    }

    /// Registers an after-statement trigger on an existing table.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteEngineError::UnknownRelation`] when the table does not
    /// exist.
    pub fn add_trigger(
        &self,
        name: &str,
        schema: &str,
        table: &str,
        operation: OperationKind,
        sql: &str,
    ) -> Result<(), SqliteEngineError> {
        let relation = self
            .lookup_relation(schema, table)?
            .ok_or_else(|| SqliteEngineError::UnknownRelation(format!("{schema}.{table}")))?;
        self.triggers.borrow_mut().push(EngineTrigger {
            name: name.to_string(),
            relation,
            operation,
            sql: sql.to_string(),
        });
        Ok(())
    }

    /// Executes one statement through the installed chain.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteEngineError`] when the statement does not compile or
    /// any lifecycle phase fails.
    pub fn execute(&self, sql: &str) -> Result<QueryOutcome, SqliteEngineError> {
        let mut stmt = self.classified_statement(sql, Vec::new())?;
        self.drive(&mut stmt)?;
        Ok(stmt.into_outcome())
    }

    /// Classifies a statement and builds its execution context.
    fn classified_statement(
        &self,
        sql: &str,
        params: Vec<Datum>,
    ) -> Result<SqliteStatement, SqliteEngineError> {
        let classification = classify(&self.connection, sql).map_err(db_error)?;
        let relations = self.resolve_tables(&classification.tables)?;
        Ok(SqliteStatement::new(sql, params, classification.operation, relations))
    }

    /// Runs one statement through every lifecycle phase. A failure before
    /// end releases the statement without calling end.
    fn drive(&self, stmt: &mut SqliteStatement) -> Result<(), SqliteEngineError> {
        let chain = self.chain.try_borrow().map_err(|_| SqliteEngineError::ChainBusy)?;
        chain.begin(self, stmt)?;
        chain.run(self, stmt, ScanDirection::Forward, 0)?;
        chain.finish(self, stmt)?;
        chain.end(self, stmt)
    }

    /// Steps a statement to completion, recording its result.
    pub(crate) fn run_statement(&self, stmt: &mut SqliteStatement) -> Result<(), SqliteEngineError> {
        let mut prepared = self.connection.prepare_cached(&stmt.sql).map_err(db_error)?;
        let params = params_from_iter(stmt.params.iter().map(datum_value));
        let width = prepared.column_count();
        if width == 0 {
            let changes = prepared.execute(params).map_err(db_error)?;
            stmt.outcome.changes = u64::try_from(changes).unwrap_or(u64::MAX);
            return Ok(());
        }
        stmt.outcome.columns =
            prepared.column_names().into_iter().map(str::to_string).collect();
        let mut rows = prepared.query(params).map_err(db_error)?;
        while let Some(row) = rows.next().map_err(db_error)? {
            let mut values = Vec::with_capacity(width);
            for index in 0..width {
                values.push(row.get::<_, Value>(index).map_err(db_error)?);
            }
            stmt.outcome.rows.push(values);
        }
        Ok(())
    }

    /// Returns triggers fired by a finished statement.
    pub(crate) fn triggers_for(&self, stmt: &SqliteStatement) -> Vec<EngineTrigger> {
        let Some(primary) = stmt.relations.first() else {
            return Vec::new();
        };
        self.triggers
            .borrow()
            .iter()
            .filter(|trigger| trigger.relation == *primary && trigger.operation == stmt.operation)
            .cloned()
            .collect()
    }

    /// Maps classified tables to relation identifiers, skipping unknowns.
    fn resolve_tables(&self, tables: &[TableRef]) -> Result<Vec<RelationOid>, SqliteEngineError> {
        let mut relations = Vec::with_capacity(tables.len());
        for table in tables {
            if table.is_catalog() {
                if !relations.contains(&SCHEMA_CATALOG_RELATION) {
                    relations.push(SCHEMA_CATALOG_RELATION);
                }
                continue;
            }
            if let Some(relation) = self.lookup_relation(&table.schema, &table.table)? {
                relations.push(relation);
            }
        }
        Ok(relations)
    }

    /// Resolves a schema-qualified table name.
    fn lookup_relation(
        &self,
        schema: &str,
        table: &str,
    ) -> Result<Option<RelationOid>, SqliteEngineError> {
        let Some(namespace) = self.schema_oid(schema)? else {
            return Ok(None);
        };
        self.table_oid(namespace, table)
    }

    /// Returns attached schemas as `(seq, name)` pairs.
    fn database_list(&self) -> Result<Vec<(i64, String)>, SqliteEngineError> {
        let mut stmt = self.connection.prepare("PRAGMA database_list").map_err(db_error)?;
        let rows = stmt
            .query_map([], |row| Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?)))
            .map_err(db_error)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(db_error)
    }

    /// Resolves a schema name to a namespace identifier.
    fn schema_oid(&self, name: &str) -> Result<Option<NamespaceOid>, SqliteEngineError> {
        let found = self
            .database_list()?
            .into_iter()
            .find(|(_, schema)| schema.eq_ignore_ascii_case(name))
            .and_then(|(seq, _)| u64::try_from(seq).ok())
            .and_then(|seq| NamespaceOid::from_raw(seq.saturating_add(1)));
        Ok(found)
    }

    /// Returns the schema name of a namespace identifier.
    fn schema_name(&self, namespace: NamespaceOid) -> Result<Option<String>, SqliteEngineError> {
        let found = self
            .database_list()?
            .into_iter()
            .find(|(seq, _)| {
                u64::try_from(*seq).is_ok_and(|seq| seq.saturating_add(1) == namespace.get())
            })
            .map(|(_, schema)| schema);
        Ok(found)
    }

    /// Resolves a table inside a namespace.
    fn table_oid(
        &self,
        namespace: NamespaceOid,
        name: &str,
    ) -> Result<Option<RelationOid>, SqliteEngineError> {
        let Some(schema) = self.schema_name(namespace)? else {
            return Ok(None);
        };
        let sql = format!(
            "SELECT rowid FROM \"{}\".sqlite_master WHERE type = 'table' AND name = ?1 COLLATE \
             NOCASE",
            schema.replace('"', "\"\"")
        );
        let rowid: Option<i64> = self
            .connection
            .query_row(&sql, params![name], |row| row.get(0))
            .optional()
            .map_err(db_error)?;
        Ok(rowid.and_then(|rowid| {
            let rowid = u64::try_from(rowid).ok()?;
            RelationOid::from_raw((namespace.get() << 32) | (rowid & ROWID_MASK))
        }))
    }

    /// Returns the query plan steps of a statement.
    fn query_plan(&self, stmt: &SqliteStatement) -> Result<Vec<PlanStep>, rusqlite::Error> {
        let mut plan = self.connection.prepare(&format!("EXPLAIN QUERY PLAN {}", stmt.sql))?;
        let rows = plan.query_map(params_from_iter(stmt.params.iter().map(datum_value)), |row| {
            Ok(PlanStep {
                id: row.get(0)?,
                parent: row.get(1)?,
                detail: row.get(3)?,
            })
        })?;
        rows.collect()
    }

    /// Fails a facility call when the top frame is not connected.
    fn require_connected(&self) -> Result<(), FacilityError> {
        let connected = self.frames.borrow().last().is_some_and(|frame| frame.connected);
        if connected {
            Ok(())
        } else {
            Err(FacilityError::Failed("side channel is not connected".to_string()))
        }
    }
}

// ============================================================================
// SECTION: Catalog
// ============================================================================

impl Catalog for SqliteEngine {
    fn namespace_oid(&self, name: &str) -> Result<Option<NamespaceOid>, CatalogError> {
        self.schema_oid(name).map_err(|err| CatalogError::Lookup(err.to_string()))
    }

    fn relation_oid(
        &self,
        namespace: NamespaceOid,
        name: &str,
    ) -> Result<Option<RelationOid>, CatalogError> {
        self.table_oid(namespace, name).map_err(|err| CatalogError::Lookup(err.to_string()))
    }

    fn catalog_relation_oid(&self) -> RelationOid {
        SCHEMA_CATALOG_RELATION
    }
}

// ============================================================================
// SECTION: Query Facility
// ============================================================================

impl QueryFacility for SqliteEngine {
    type Prepared = SqlitePrepared;

    fn push_context(&self) -> Result<(), FacilityError> {
        self.frames.borrow_mut().push(Frame::default());
        Ok(())
    }

    fn pop_context(&self) -> Result<(), FacilityError> {
        let mut frames = self.frames.borrow_mut();
        if frames.len() <= 1 {
            return Err(FacilityError::Failed("no pushed context to pop".to_string()));
        }
        frames.pop();
        Ok(())
    }

    fn connect(&self) -> Result<(), FacilityError> {
        let mut frames = self.frames.borrow_mut();
        let Some(frame) = frames.last_mut() else {
            return Err(FacilityError::Failed("no execution context".to_string()));
        };
        if frame.connected {
            return Err(FacilityError::Failed("side channel already connected".to_string()));
        }
        frame.connected = true;
        Ok(())
    }

    fn prepare(&self, sql: &str, arg_types: &[ParamType]) -> Result<SqlitePrepared, FacilityError> {
        self.require_connected()?;
        if let Some(cached) = self.prepared.borrow().get(sql) {
            return Ok(cached.clone());
        }
        let classification = classify(&self.connection, sql).map_err(facility_error)?;
        let relations = self.resolve_tables(&classification.tables).map_err(facility_error)?;
        let declared = self.connection.prepare_cached(sql).map_err(facility_error)?;
        if declared.parameter_count() != arg_types.len() {
            return Err(FacilityError::Failed(format!(
                "expected {} parameters, got {}",
                declared.parameter_count(),
                arg_types.len()
            )));
        }
        drop(declared);
        let prepared = SqlitePrepared {
            sql: sql.to_string(),
            operation: classification.operation,
            relations,
            param_count: arg_types.len(),
        };
        self.prepared.borrow_mut().insert(sql.to_string(), prepared.clone());
        Ok(prepared)
    }

    fn execute_prepared(
        &self,
        prepared: &SqlitePrepared,
        args: &[Datum],
        row_limit: u64,
    ) -> Result<u64, FacilityError> {
        self.require_connected()?;
        if args.len() != prepared.param_count {
            return Err(FacilityError::Failed(format!(
                "expected {} arguments, got {}",
                prepared.param_count,
                args.len()
            )));
        }
        let mut stmt = SqliteStatement::new(
            &prepared.sql,
            args.to_vec(),
            prepared.operation,
            prepared.relations.clone(),
        );
        self.drive(&mut stmt).map_err(facility_error)?;
        let rows = stmt.rows_processed();
        Ok(if row_limit > 0 { rows.min(row_limit) } else { rows })
    }

    fn finish(&self) -> Result<(), FacilityError> {
        let mut frames = self.frames.borrow_mut();
        let Some(frame) = frames.last_mut() else {
            return Err(FacilityError::Failed("no execution context".to_string()));
        };
        if !frame.connected {
            return Err(FacilityError::Failed("side channel is not connected".to_string()));
        }
        frame.connected = false;
        Ok(())
    }
}

// ============================================================================
// SECTION: Engine
// ============================================================================

impl Engine for SqliteEngine {
    type Statement = SqliteStatement;
    type Error = SqliteEngineError;

    fn explain_begin(&self, es: &mut ExplainState) {
        if es.format == ExplainFormat::Json {
            es.output.push_str("[\n");
        }
    }

    fn explain_plan(
        &self,
        es: &mut ExplainState,
        stmt: &SqliteStatement,
    ) -> Result<(), ExplainError> {
        let steps = self.query_plan(stmt).map_err(|err| ExplainError::Render(err.to_string()))?;
        let (rows, loops, total_ms) = stmt
            .totaltime
            .as_ref()
            .map_or((0, 0, 0.0), |timing| (timing.ntuples(), timing.nloops(), timing.total_ms()));
        match es.format {
            ExplainFormat::Text => {
                write_text_tree(&mut es.output, &steps);
                let _ = writeln!(es.output, "Actual Rows: {rows}  Loops: {loops}");
                if es.verbose {
                    let _ = writeln!(es.output, "Query: {}", stmt.sql);
                }
                if es.summary {
                    let _ = writeln!(es.output, "Execution Time: {total_ms:.3} ms");
                }
            }
            ExplainFormat::Json => {
                let mut plan = json!({
                    "Node Type": "Query",
                    "Operation": stmt.operation.as_str(),
                    "Actual Rows": rows,
                    "Actual Loops": loops,
                    "Plans": json_tree(&steps, 0),
                });
                if es.verbose {
                    plan["Query"] = json!(stmt.sql);
                }
                let rendered = serde_json::to_string(&plan)
                    .map_err(|err| ExplainError::Render(err.to_string()))?;
                let _ = write!(es.output, "  \"Plan\": {rendered}");
                if es.summary {
                    let _ = write!(es.output, ",\n  \"Execution Time\": {total_ms:.3}");
                }
            }
        }
        Ok(())
    }

    fn explain_triggers(
        &self,
        es: &mut ExplainState,
        stmt: &SqliteStatement,
    ) -> Result<(), ExplainError> {
        if stmt.triggers.is_empty() {
            return Ok(());
        }
        match es.format {
            ExplainFormat::Text => write_text_triggers(&mut es.output, &stmt.triggers),
            ExplainFormat::Json => {
                let rendered = serde_json::to_string(&json_triggers(&stmt.triggers))
                    .map_err(|err| ExplainError::Render(err.to_string()))?;
                let _ = write!(es.output, ",\n  \"Triggers\": {rendered}");
            }
        }
        Ok(())
    }

    fn explain_end(&self, es: &mut ExplainState) {
        if es.format == ExplainFormat::Json {
            es.output.push_str("\n]\n");
        }
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Converts a bound parameter to a `SQLite` value.
fn datum_value(datum: &Datum) -> Value {
    match datum {
        Datum::Null => Value::Null,
        Datum::Text(text) => Value::Text(text.clone()),
        Datum::Float8(value) => Value::Real(*value),
    }
}

/// Opens an `SQLite` connection with secure defaults.
fn open_connection(config: &SqliteEngineConfig) -> Result<Connection, SqliteEngineError> {
    let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
        | OpenFlags::SQLITE_OPEN_CREATE
        | OpenFlags::SQLITE_OPEN_FULL_MUTEX;
    let connection = Connection::open_with_flags(&config.path, flags).map_err(db_error)?;
    apply_pragmas(&connection, config)?;
    Ok(connection)
}

/// Applies `SQLite` pragmas required for durability.
fn apply_pragmas(
    connection: &Connection,
    config: &SqliteEngineConfig,
) -> Result<(), SqliteEngineError> {
    if config.path.as_os_str() != IN_MEMORY_PATH {
        connection
            .execute_batch(&format!("PRAGMA journal_mode = {};", config.journal_mode.pragma_value()))
            .map_err(db_error)?;
    }
    connection
        .execute_batch(&format!("PRAGMA synchronous = {};", config.sync_mode.pragma_value()))
        .map_err(db_error)?;
    connection.busy_timeout(Duration::from_millis(config.busy_timeout_ms)).map_err(db_error)?;
    Ok(())
}
