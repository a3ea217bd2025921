// crates/qflash-core/src/runtime/memory.rs
// ============================================================================
// Module: QFlash In-Memory Engine
// Description: Scripted engine with a simulated clock for tests and examples.
// Purpose: Exercise the lifecycle deterministically without external deps.
// Dependencies: crate::core, crate::interfaces, crate::runtime, serde_json
// ============================================================================

//! ## Overview
//! [`InMemoryEngine`] implements every engine collaborator over plain maps.
//! Statements are scripted up front with an operation, relations and a cost;
//! running a statement advances a simulated clock by its cost, so measured
//! durations are exact. After-statement triggers fire during finish and
//! re-enter the full hook chain. The side-channel facility keeps a stack of
//! execution frames and runs each prepared insert through the chain, so the
//! recursion guard is exercised exactly as in a real engine.
//!
//! Failures can be injected at each facility step and at run. This engine is
//! not intended for production use.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::cell::Cell;
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::fmt::Write as _;
use std::num::NonZeroU64;
use std::rc::Rc;
use std::time::Duration;

use serde_json::json;
use thiserror::Error;

use crate::core::Datum;
use crate::core::ExplainFormat;
use crate::core::ExplainState;
use crate::core::InstrumentOptions;
use crate::core::Instrumentation;
use crate::core::NamespaceOid;
use crate::core::OperationKind;
use crate::core::ParamType;
use crate::core::RelationOid;
use crate::core::ScanDirection;
use crate::core::StatementContext;
use crate::core::TriggerStats;
use crate::interfaces::Catalog;
use crate::interfaces::CatalogError;
use crate::interfaces::Engine;
use crate::interfaces::ExecutorHooks;
use crate::interfaces::ExplainError;
use crate::interfaces::FacilityError;
use crate::interfaces::QueryFacility;
use crate::runtime::error::QflashError;
use crate::runtime::interceptor::QflashInterceptor;
use crate::runtime::session::QflashSession;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Identifier of the engine's identifier catalog relation.
pub const CATALOG_RELATION: RelationOid = RelationOid::new(NonZeroU64::MIN);

/// First identifier handed out to user objects.
const FIRST_USER_OID: u64 = 16_384;

/// Namespace created with every engine.
pub const DEFAULT_NAMESPACE: &str = "public";

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Step at which a failure can be injected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailurePoint {
    /// Catalog lookups.
    Catalog,
    /// Pushing a side-channel context.
    PushContext,
    /// Popping a side-channel context.
    PopContext,
    /// Opening a side-channel connection.
    Connect,
    /// Preparing a side-channel statement.
    Prepare,
    /// Executing a prepared side-channel statement.
    Execute,
    /// Closing a side-channel connection.
    Finish,
    /// Running a statement in the standard executor.
    Run,
    /// Rendering a statement plan.
    Explain,
}

impl FailurePoint {
    /// Returns a stable label for messages.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Catalog => "catalog",
            Self::PushContext => "push_context",
            Self::PopContext => "pop_context",
            Self::Connect => "connect",
            Self::Prepare => "prepare",
            Self::Execute => "execute",
            Self::Finish => "finish",
            Self::Run => "run",
            Self::Explain => "explain",
        }
    }
}

impl fmt::Display for FailurePoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// In-memory engine errors.
#[derive(Debug, Error)]
pub enum MemoryEngineError {
    /// Statement text was never scripted.
    #[error("unknown statement: {0}")]
    UnknownStatement(String),
    /// Namespace does not exist.
    #[error("namespace {0} does not exist")]
    UnknownNamespace(String),
    /// Relation does not exist.
    #[error("relation {0} does not exist")]
    UnknownRelation(String),
    /// Relation already exists.
    #[error("relation {0} already exists")]
    DuplicateRelation(String),
    /// Injected failure.
    #[error("injected failure at {0}")]
    Injected(FailurePoint),
    /// The executor chain is in use and cannot be replaced.
    #[error("executor chain is busy")]
    ChainBusy,
    /// QFlash raised an error through the chain.
    #[error(transparent)]
    Qflash(#[from] QflashError),
}

// ============================================================================
// SECTION: Statement
// ============================================================================

/// Script entry for a statement text.
#[derive(Debug, Clone, PartialEq)]
struct ScriptedStatement {
    /// Operation kind.
    operation: OperationKind,
    /// Referenced relations, primary first.
    relations: Vec<RelationOid>,
    /// Simulated execution cost.
    cost: Duration,
    /// Rows produced.
    rows: u64,
}

/// After-statement trigger definition.
#[derive(Debug, Clone, PartialEq, Eq)]
struct TriggerDef {
    /// Trigger name.
    name: String,
    /// Relation whose statements fire the trigger.
    relation: RelationOid,
    /// Operation that fires the trigger.
    operation: OperationKind,
    /// Statement executed when the trigger fires.
    sql: String,
}

/// One execution of a scripted statement.
#[derive(Debug, Clone, PartialEq)]
pub struct MemoryStatement {
    /// Statement text.
    sql: String,
    /// Operation kind.
    operation: OperationKind,
    /// Referenced relations, primary first.
    relations: Vec<RelationOid>,
    /// Simulated execution cost.
    cost: Duration,
    /// Rows produced per run.
    rows: u64,
    /// Row appended to the primary relation, for prepared inserts.
    insert: Option<Vec<Datum>>,
    /// Requested instrumentation.
    instrument: InstrumentOptions,
    /// Attached timing accumulator.
    totaltime: Option<Instrumentation>,
    /// Triggers fired during finish.
    triggers: Vec<TriggerStats>,
    /// Rows processed by the last run.
    rows_processed: u64,
}

impl MemoryStatement {
    /// Creates a statement from a script entry.
    fn from_script(sql: &str, script: ScriptedStatement) -> Self {
        Self {
            sql: sql.to_string(),
            operation: script.operation,
            relations: script.relations,
            cost: script.cost,
            rows: script.rows,
            insert: None,
            instrument: InstrumentOptions::NONE,
            totaltime: None,
            triggers: Vec::new(),
            rows_processed: 0,
        }
    }

    /// Returns the triggers fired during finish.
    #[must_use]
    pub fn triggers(&self) -> &[TriggerStats] {
        &self.triggers
    }

    /// Returns the rows processed by the last run.
    #[must_use]
    pub const fn rows_processed(&self) -> u64 {
        self.rows_processed
    }
}

impl StatementContext for MemoryStatement {
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

/// Prepared side-channel insert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryPrepared {
    /// Statement text.
    sql: String,
    /// Target relation.
    relation: RelationOid,
}

// ============================================================================
// SECTION: Standard Executor
// ============================================================================

/// Innermost lifecycle layer of the in-memory engine.
#[derive(Debug, Clone, Copy, Default)]
pub struct MemoryExecutor;

impl ExecutorHooks<InMemoryEngine> for MemoryExecutor {
    fn into_inner(
        self: Box<Self>,
    ) -> Result<Box<dyn ExecutorHooks<InMemoryEngine>>, Box<dyn ExecutorHooks<InMemoryEngine>>>
    {
        Err(self)
    }

    fn begin(
        &self,
        _engine: &InMemoryEngine,
        _stmt: &mut MemoryStatement,
    ) -> Result<(), MemoryEngineError> {
        Ok(())
    }

    fn run(
        &self,
        engine: &InMemoryEngine,
        stmt: &mut MemoryStatement,
        _direction: ScanDirection,
        _count: u64,
    ) -> Result<(), MemoryEngineError> {
        engine.take_failure(FailurePoint::Run)?;
        if let Some(totaltime) = stmt.totaltime.as_mut() {
            totaltime.start_node(engine.now());
        }
        engine.advance_clock(stmt.cost);
        if let Some(row) = stmt.insert.clone() {
            let relation = stmt.relations.first().copied();
            engine.append_row(relation, row)?;
        }
        stmt.rows_processed = stmt.rows;
        if let Some(totaltime) = stmt.totaltime.as_mut() {
            totaltime.stop_node(engine.now(), stmt.rows);
        }
        Ok(())
    }

    fn finish(
        &self,
        engine: &InMemoryEngine,
        stmt: &mut MemoryStatement,
    ) -> Result<(), MemoryEngineError> {
        if let Some(totaltime) = stmt.totaltime.as_mut() {
            totaltime.start_node(engine.now());
        }
        for trigger in engine.triggers_for(stmt) {
            let started = engine.now();
            engine.execute(&trigger.sql)?;
            stmt.triggers.push(TriggerStats {
                name: trigger.name,
                calls: 1,
                time: engine.now().saturating_sub(started),
            });
        }
        if let Some(totaltime) = stmt.totaltime.as_mut() {
            totaltime.stop_node(engine.now(), 0);
        }
        Ok(())
    }

    fn end(
        &self,
        _engine: &InMemoryEngine,
        _stmt: &mut MemoryStatement,
    ) -> Result<(), MemoryEngineError> {
        Ok(())
    }
}

// ============================================================================
// SECTION: Engine
// ============================================================================

/// Side-channel execution frame.
#[derive(Debug, Clone, Copy, Default)]
struct Frame {
    /// True while a connection is open in this frame.
    connected: bool,
}

/// Scripted in-memory engine.
pub struct InMemoryEngine {
    /// Installed lifecycle chain.
    chain: RefCell<Box<dyn ExecutorHooks<Self>>>,
    /// Namespace names.
    namespaces: RefCell<BTreeMap<String, NamespaceOid>>,
    /// Relations keyed by namespace and name.
    relations: RefCell<BTreeMap<(NamespaceOid, String), RelationOid>>,
    /// Qualified relation names for plan output.
    relation_names: RefCell<BTreeMap<RelationOid, String>>,
    /// Relation contents.
    tables: RefCell<BTreeMap<RelationOid, Vec<Vec<Datum>>>>,
    /// Scripted statements.
    scripts: RefCell<BTreeMap<String, ScriptedStatement>>,
    /// After-statement triggers.
    triggers: RefCell<Vec<TriggerDef>>,
    /// Prepared statements cached by text.
    prepared: RefCell<BTreeMap<String, MemoryPrepared>>,
    /// Side-channel frames; the bottom frame always exists.
    frames: RefCell<Vec<Frame>>,
    /// Pending injected failures.
    failures: RefCell<Vec<FailurePoint>>,
    /// Simulated clock.
    clock: Cell<Duration>,
    /// Next object identifier.
    next_oid: Cell<u64>,
}

impl fmt::Debug for InMemoryEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InMemoryEngine")
            .field("namespaces", &self.namespaces)
            .field("relations", &self.relations)
            .field("frames", &self.frames)
            .field("clock", &self.clock)
            .finish_non_exhaustive()
    }
}

impl Default for InMemoryEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryEngine {
    /// Creates an engine with the default namespace and no relations.
    #[must_use]
    pub fn new() -> Self {
        let engine = Self {
            chain: RefCell::new(Box::new(MemoryExecutor)),
            namespaces: RefCell::new(BTreeMap::new()),
            relations: RefCell::new(BTreeMap::new()),
            relation_names: RefCell::new(BTreeMap::new()),
            tables: RefCell::new(BTreeMap::new()),
            scripts: RefCell::new(BTreeMap::new()),
            triggers: RefCell::new(Vec::new()),
            prepared: RefCell::new(BTreeMap::new()),
            frames: RefCell::new(vec![Frame::default()]),
            failures: RefCell::new(Vec::new()),
            clock: Cell::new(Duration::ZERO),
            next_oid: Cell::new(FIRST_USER_OID),
        };
        engine.create_namespace(DEFAULT_NAMESPACE);
        engine
    }

    /// Allocates the next object identifier.
    fn allocate_oid(&self) -> NonZeroU64 {
        let raw = self.next_oid.get();
        self.next_oid.set(raw.saturating_add(1));
        NonZeroU64::new(raw).unwrap_or(NonZeroU64::MAX)
    }

    /// Creates a namespace, returning the existing identifier when present.
    pub fn create_namespace(&self, name: &str) -> NamespaceOid {
        if let Some(existing) = self.namespaces.borrow().get(name) {
            return *existing;
        }
        let oid = NamespaceOid::new(self.allocate_oid());
        self.namespaces.borrow_mut().insert(name.to_string(), oid);
        oid
    }

    /// Creates an empty relation.
    ///
    /// # Errors
    ///
    /// Returns [`MemoryEngineError`] when the namespace is missing or the
    /// relation already exists.
    pub fn create_relation(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<RelationOid, MemoryEngineError> {
        let namespace_oid = self.namespace_by_name(namespace)?;
        let qualified = format!("{namespace}.{name}");
        let key = (namespace_oid, name.to_string());
        if self.relations.borrow().contains_key(&key) {
            return Err(MemoryEngineError::DuplicateRelation(qualified));
        }
        let oid = RelationOid::new(self.allocate_oid());
        self.relations.borrow_mut().insert(key, oid);
        self.relation_names.borrow_mut().insert(oid, qualified);
        self.tables.borrow_mut().insert(oid, Vec::new());
        Ok(oid)
    }

    /// Drops a relation and its contents.
    ///
    /// # Errors
    ///
    /// Returns [`MemoryEngineError`] when the relation does not exist.
    pub fn drop_relation(&self, namespace: &str, name: &str) -> Result<(), MemoryEngineError> {
        let namespace_oid = self.namespace_by_name(namespace)?;
        let removed = self.relations.borrow_mut().remove(&(namespace_oid, name.to_string()));
        let Some(oid) = removed else {
            return Err(MemoryEngineError::UnknownRelation(format!("{namespace}.{name}")));
        };
        self.relation_names.borrow_mut().remove(&oid);
        self.tables.borrow_mut().remove(&oid);
        Ok(())
    }

    /// Returns the identifier of an existing relation.
    ///
    /// # Errors
    ///
    /// Returns [`MemoryEngineError`] when the relation does not exist.
    pub fn relation(&self, namespace: &str, name: &str) -> Result<RelationOid, MemoryEngineError> {
        let namespace_oid = self.namespace_by_name(namespace)?;
        self.relations
            .borrow()
            .get(&(namespace_oid, name.to_string()))
            .copied()
            .ok_or_else(|| MemoryEngineError::UnknownRelation(format!("{namespace}.{name}")))
    }

    /// Returns a namespace identifier by name.
    fn namespace_by_name(&self, name: &str) -> Result<NamespaceOid, MemoryEngineError> {
        self.namespaces
            .borrow()
            .get(name)
            .copied()
            .ok_or_else(|| MemoryEngineError::UnknownNamespace(name.to_string()))
    }

    /// Scripts a statement text producing one row.
    pub fn define_statement(
        &self,
        sql: &str,
        operation: OperationKind,
        relations: &[RelationOid],
        cost: Duration,
    ) {
        self.scripts.borrow_mut().insert(
            sql.to_string(),
            ScriptedStatement {
                operation,
                relations: relations.to_vec(),
                cost,
                rows: 1,
            },
        );
    }

    /// Registers an after-statement trigger.
    pub fn add_trigger(
        &self,
        name: &str,
        relation: RelationOid,
        operation: OperationKind,
        sql: &str,
    ) {
        self.triggers.borrow_mut().push(TriggerDef {
            name: name.to_string(),
            relation,
            operation,
            sql: sql.to_string(),
        });
    }

    /// Injects a failure at the next occurrence of the given step.
    pub fn fail_once(&self, point: FailurePoint) {
        self.failures.borrow_mut().push(point);
    }

    /// Consumes a pending injected failure.
    fn take_failure(&self, point: FailurePoint) -> Result<(), MemoryEngineError> {
        let mut failures = self.failures.borrow_mut();
        if let Some(index) = failures.iter().position(|pending| *pending == point) {
            failures.remove(index);
            return Err(MemoryEngineError::Injected(point));
        }
        Ok(())
    }

    /// Returns the simulated clock.
    #[must_use]
    pub fn now(&self) -> Duration {
        self.clock.get()
    }

    /// Advances the simulated clock.
    pub fn advance_clock(&self, by: Duration) {
        self.clock.set(self.clock.get().saturating_add(by));
    }

    /// Returns the rows stored in a relation.
    #[must_use]
    pub fn rows(&self, relation: RelationOid) -> Vec<Vec<Datum>> {
        self.tables.borrow().get(&relation).cloned().unwrap_or_default()
    }

    /// Returns the number of side-channel frames, including the bottom one.
    #[must_use]
    pub fn frame_count(&self) -> usize {
        self.frames.borrow().len()
    }

    /// Returns the number of cached prepared statements.
    #[must_use]
    pub fn prepared_count(&self) -> usize {
        self.prepared.borrow().len()
    }

    /// Wraps the installed chain with a new outer layer.
    ///
    /// # Errors
    ///
    /// Returns [`MemoryEngineError::ChainBusy`] while a statement is running.
    pub fn push_layer<F>(&self, wrap: F) -> Result<(), MemoryEngineError>
    where
        F: FnOnce(Box<dyn ExecutorHooks<Self>>) -> Box<dyn ExecutorHooks<Self>>,
    {
        let mut chain = self.chain.try_borrow_mut().map_err(|_| MemoryEngineError::ChainBusy)?;
        let previous = std::mem::replace(&mut *chain, Box::new(MemoryExecutor));
        *chain = wrap(previous);
        Ok(())
    }

    /// Removes the outermost layer, restoring the chain it wrapped.
    ///
    /// Returns false when only the standard executor remains.
    ///
    /// # Errors
    ///
    /// Returns [`MemoryEngineError::ChainBusy`] while a statement is running.
    pub fn pop_layer(&self) -> Result<bool, MemoryEngineError> {
        let mut chain = self.chain.try_borrow_mut().map_err(|_| MemoryEngineError::ChainBusy)?;
        let top = std::mem::replace(&mut *chain, Box::new(MemoryExecutor));
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
    /// Returns [`MemoryEngineError::ChainBusy`] while a statement is running.
    pub fn install_qflash(&self, session: Rc<QflashSession>) -> Result<(), MemoryEngineError> {
        self.push_layer(|next| Box::new(QflashInterceptor::install(next, session)))
    }

    /// Executes a scripted statement through the installed chain and returns
    /// the processed row count.
    ///
    /// # Errors
    ///
    /// Returns [`MemoryEngineError`] when the statement is unknown or any
    /// lifecycle phase fails.
    pub fn execute(&self, sql: &str) -> Result<u64, MemoryEngineError> {
        let script = self
            .scripts
            .borrow()
            .get(sql)
            .cloned()
            .ok_or_else(|| MemoryEngineError::UnknownStatement(sql.to_string()))?;
        let mut stmt = MemoryStatement::from_script(sql, script);
        self.drive(&mut stmt)?;
        Ok(stmt.rows_processed)
    }

    /// Runs one statement through every lifecycle phase. A failure before
    /// end releases the statement without calling end.
    fn drive(&self, stmt: &mut MemoryStatement) -> Result<(), MemoryEngineError> {
        let chain = self.chain.try_borrow().map_err(|_| MemoryEngineError::ChainBusy)?;
        chain.begin(self, stmt)?;
        chain.run(self, stmt, ScanDirection::Forward, 0)?;
        chain.finish(self, stmt)?;
        chain.end(self, stmt)
    }

    /// Returns triggers fired by a finished statement.
    fn triggers_for(&self, stmt: &MemoryStatement) -> Vec<TriggerDef> {
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

    /// Appends a row to a relation.
    fn append_row(
        &self,
        relation: Option<RelationOid>,
        row: Vec<Datum>,
    ) -> Result<(), MemoryEngineError> {
        let Some(relation) = relation else {
            return Err(MemoryEngineError::UnknownRelation("(none)".to_string()));
        };
        let mut tables = self.tables.borrow_mut();
        let Some(table) = tables.get_mut(&relation) else {
            return Err(MemoryEngineError::UnknownRelation(relation.to_string()));
        };
        table.push(row);
        Ok(())
    }

    /// Returns the qualified name of a relation for plan output.
    fn relation_label(&self, relation: RelationOid) -> String {
        if relation == CATALOG_RELATION {
            return "catalog".to_string();
        }
        self.relation_names
            .borrow()
            .get(&relation)
            .cloned()
            .unwrap_or_else(|| relation.to_string())
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

    /// Consumes an injected facility failure.
    fn take_facility_failure(&self, point: FailurePoint) -> Result<(), FacilityError> {
        self.take_failure(point).map_err(|err| FacilityError::Failed(err.to_string()))
    }
}

// ============================================================================
// SECTION: Catalog
// ============================================================================

impl Catalog for InMemoryEngine {
    fn namespace_oid(&self, name: &str) -> Result<Option<NamespaceOid>, CatalogError> {
        self.take_failure(FailurePoint::Catalog)
            .map_err(|err| CatalogError::Lookup(err.to_string()))?;
        Ok(self.namespaces.borrow().get(name).copied())
    }

    fn relation_oid(
        &self,
        namespace: NamespaceOid,
        name: &str,
    ) -> Result<Option<RelationOid>, CatalogError> {
        self.take_failure(FailurePoint::Catalog)
            .map_err(|err| CatalogError::Lookup(err.to_string()))?;
        Ok(self.relations.borrow().get(&(namespace, name.to_string())).copied())
    }

    fn catalog_relation_oid(&self) -> RelationOid {
        CATALOG_RELATION
    }
}

// ============================================================================
// SECTION: Query Facility
// ============================================================================

impl QueryFacility for InMemoryEngine {
    type Prepared = MemoryPrepared;

    fn push_context(&self) -> Result<(), FacilityError> {
        self.take_facility_failure(FailurePoint::PushContext)?;
        self.frames.borrow_mut().push(Frame::default());
        Ok(())
    }

    fn pop_context(&self) -> Result<(), FacilityError> {
        self.take_facility_failure(FailurePoint::PopContext)?;
        let mut frames = self.frames.borrow_mut();
        if frames.len() <= 1 {
            return Err(FacilityError::Failed("no pushed context to pop".to_string()));
        }
        frames.pop();
        Ok(())
    }

    fn connect(&self) -> Result<(), FacilityError> {
        self.take_facility_failure(FailurePoint::Connect)?;
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

    fn prepare(&self, sql: &str, arg_types: &[ParamType]) -> Result<MemoryPrepared, FacilityError> {
        self.take_facility_failure(FailurePoint::Prepare)?;
        self.require_connected()?;
        if let Some(cached) = self.prepared.borrow().get(sql) {
            return Ok(cached.clone());
        }
        let target = sql
            .strip_prefix("INSERT INTO ")
            .and_then(|rest| rest.split_once(' '))
            .map(|(target, _)| target)
            .ok_or_else(|| FacilityError::Failed(format!("unsupported statement: {sql}")))?;
        let (namespace, name) = target
            .split_once('.')
            .ok_or_else(|| FacilityError::Failed(format!("unqualified relation: {target}")))?;
        let relation = self
            .relation(namespace, name)
            .map_err(|err| FacilityError::Failed(err.to_string()))?;
        if arg_types.len() != 4 {
            return Err(FacilityError::Failed(format!(
                "expected 4 parameters, got {}",
                arg_types.len()
            )));
        }
        let prepared = MemoryPrepared {
            sql: sql.to_string(),
            relation,
        };
        self.prepared.borrow_mut().insert(sql.to_string(), prepared.clone());
        Ok(prepared)
    }

    fn execute_prepared(
        &self,
        prepared: &MemoryPrepared,
        args: &[Datum],
        row_limit: u64,
    ) -> Result<u64, FacilityError> {
        self.take_facility_failure(FailurePoint::Execute)?;
        self.require_connected()?;
        let mut stmt = MemoryStatement::from_script(
            &prepared.sql,
            ScriptedStatement {
                operation: OperationKind::Insert,
                relations: vec![prepared.relation],
                cost: Duration::ZERO,
                rows: 1,
            },
        );
        stmt.insert = Some(args.to_vec());
        self.drive(&mut stmt).map_err(|err| FacilityError::Failed(err.to_string()))?;
        let rows = stmt.rows_processed;
        Ok(if row_limit > 0 { rows.min(row_limit) } else { rows })
    }

    fn finish(&self) -> Result<(), FacilityError> {
        self.take_facility_failure(FailurePoint::Finish)?;
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

impl Engine for InMemoryEngine {
    type Statement = MemoryStatement;
    type Error = MemoryEngineError;

    fn explain_begin(&self, es: &mut ExplainState) {
        if es.format == ExplainFormat::Json {
            es.output.push_str("[\n");
        }
    }

    fn explain_plan(
        &self,
        es: &mut ExplainState,
        stmt: &MemoryStatement,
    ) -> Result<(), ExplainError> {
        self.take_failure(FailurePoint::Explain)
            .map_err(|err| ExplainError::Render(err.to_string()))?;
        let relations: Vec<String> =
            stmt.relations.iter().map(|relation| self.relation_label(*relation)).collect();
        let (rows, loops, total_ms) = stmt
            .totaltime
            .as_ref()
            .map_or((0, 0, 0.0), |timing| (timing.ntuples(), timing.nloops(), timing.total_ms()));
        match es.format {
            ExplainFormat::Text => {
                let target =
                    if relations.is_empty() { "(none)".to_string() } else { relations.join(", ") };
                let _ = writeln!(
                    es.output,
                    "Scripted {} on {target}  (actual rows={rows} loops={loops})",
                    stmt.operation
                );
                if es.verbose {
                    let _ = writeln!(es.output, "  Query: {}", stmt.sql);
                }
                if es.summary {
                    let _ = writeln!(es.output, "Execution Time: {total_ms:.3} ms");
                }
            }
            ExplainFormat::Json => {
                let mut plan = json!({
                    "Node Type": "Scripted",
                    "Operation": stmt.operation.as_str(),
                    "Relations": relations,
                    "Actual Rows": rows,
                    "Actual Loops": loops,
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
        stmt: &MemoryStatement,
    ) -> Result<(), ExplainError> {
        if stmt.triggers.is_empty() {
            return Ok(());
        }
        match es.format {
            ExplainFormat::Text => {
                for trigger in &stmt.triggers {
                    let _ = writeln!(
                        es.output,
                        "Trigger {}: time={:.3} calls={}",
                        trigger.name,
                        trigger.time_ms(),
                        trigger.calls
                    );
                }
            }
            ExplainFormat::Json => {
                let triggers: Vec<serde_json::Value> = stmt
                    .triggers
                    .iter()
                    .map(|trigger| {
                        json!({
                            "Trigger Name": trigger.name,
                            "Time": trigger.time_ms(),
                            "Calls": trigger.calls,
                        })
                    })
                    .collect();
                let rendered = serde_json::to_string(&triggers)
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
