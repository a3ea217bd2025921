// crates/qflash-core/src/interfaces/mod.rs
// ============================================================================
// Module: QFlash Interfaces
// Description: Backend-agnostic contracts between the core and an engine.
// Purpose: Define the catalog, explain, query facility and hook surfaces.
// Dependencies: crate::core, crate::runtime::error
// ============================================================================

//! ## Overview
//! Interfaces define how QFlash plugs into a database engine without
//! embedding engine-specific details. An engine exposes catalog lookups, plan
//! printing primitives, a synchronous query facility with isolated execution
//! contexts, and a statement lifecycle composed of [`ExecutorHooks`] layers.
//! Every layer owns the next one; the innermost layer is the engine's own
//! standard executor.

// ============================================================================
// SECTION: Imports
// ============================================================================

use thiserror::Error;

use crate::core::Datum;
use crate::core::ExplainState;
use crate::core::NamespaceOid;
use crate::core::ParamType;
use crate::core::RelationOid;
use crate::core::ScanDirection;
use crate::core::StatementContext;
use crate::runtime::error::QflashError;

// ============================================================================
// SECTION: Catalog
// ============================================================================

/// Catalog lookup errors.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// The catalog could not be consulted.
    #[error("catalog lookup error: {0}")]
    Lookup(String),
}

/// Engine catalog used to resolve the log store target.
pub trait Catalog {
    /// Resolves a namespace name.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError`] when the catalog cannot be read. A missing
    /// namespace is `Ok(None)`.
    fn namespace_oid(&self, name: &str) -> Result<Option<NamespaceOid>, CatalogError>;

    /// Resolves a relation name inside a namespace.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError`] when the catalog cannot be read. A missing
    /// relation is `Ok(None)`.
    fn relation_oid(
        &self,
        namespace: NamespaceOid,
        name: &str,
    ) -> Result<Option<RelationOid>, CatalogError>;

    /// Returns the identifier of the engine's own identifier catalog relation.
    fn catalog_relation_oid(&self) -> RelationOid;
}

// ============================================================================
// SECTION: Query Facility
// ============================================================================

/// Query facility errors.
#[derive(Debug, Error)]
pub enum FacilityError {
    /// The engine reported a failure.
    #[error("query facility error: {0}")]
    Failed(String),
}

/// Synchronous query facility used for side-channel writes.
///
/// The facility keeps a stack of isolated execution contexts. The bottom
/// context always exists; `push_context` opens a fresh one on top and
/// `pop_context` returns to the enclosing one. `connect`, `prepare`,
/// `execute_prepared` and `finish` act on the top context.
pub trait QueryFacility {
    /// Engine handle for a prepared statement.
    type Prepared;

    /// Pushes a fresh isolated execution context.
    ///
    /// # Errors
    ///
    /// Returns [`FacilityError`] when the context cannot be created.
    fn push_context(&self) -> Result<(), FacilityError>;

    /// Pops back to the enclosing execution context.
    ///
    /// # Errors
    ///
    /// Returns [`FacilityError`] when no pushed context exists.
    fn pop_context(&self) -> Result<(), FacilityError>;

    /// Opens a connection in the current context.
    ///
    /// # Errors
    ///
    /// Returns [`FacilityError`] when the context is already connected.
    fn connect(&self) -> Result<(), FacilityError>;

    /// Prepares a parameterized statement, cached by its text.
    ///
    /// # Errors
    ///
    /// Returns [`FacilityError`] when the statement cannot be compiled.
    fn prepare(&self, sql: &str, arg_types: &[ParamType]) -> Result<Self::Prepared, FacilityError>;

    /// Executes a prepared statement and returns the processed row count.
    ///
    /// # Errors
    ///
    /// Returns [`FacilityError`] when execution fails.
    fn execute_prepared(
        &self,
        prepared: &Self::Prepared,
        args: &[Datum],
        row_limit: u64,
    ) -> Result<u64, FacilityError>;

    /// Closes the connection in the current context.
    ///
    /// # Errors
    ///
    /// Returns [`FacilityError`] when the context is not connected.
    fn finish(&self) -> Result<(), FacilityError>;
}

// ============================================================================
// SECTION: Engine
// ============================================================================

/// Plan rendering errors.
#[derive(Debug, Error)]
pub enum ExplainError {
    /// The engine could not render the plan.
    #[error("explain error: {0}")]
    Render(String),
}

/// Database engine hosting the statement lifecycle.
pub trait Engine: Catalog + QueryFacility {
    /// Engine-owned statement context.
    type Statement: StatementContext;
    /// Engine error raised through the hook chain.
    type Error: From<QflashError> + std::error::Error;

    /// Writes the output header for the configured format.
    fn explain_begin(&self, es: &mut ExplainState);

    /// Renders the statement plan into the explain buffer.
    ///
    /// # Errors
    ///
    /// Returns [`ExplainError`] when the plan cannot be rendered.
    fn explain_plan(
        &self,
        es: &mut ExplainState,
        stmt: &Self::Statement,
    ) -> Result<(), ExplainError>;

    /// Renders trigger statistics collected for the statement.
    ///
    /// # Errors
    ///
    /// Returns [`ExplainError`] when trigger data cannot be rendered.
    fn explain_triggers(
        &self,
        es: &mut ExplainState,
        stmt: &Self::Statement,
    ) -> Result<(), ExplainError>;

    /// Writes the output footer for the configured format.
    fn explain_end(&self, es: &mut ExplainState);
}

// ============================================================================
// SECTION: Executor Hooks
// ============================================================================

/// One layer of the statement lifecycle.
///
/// Layers are composed at construction: each interceptor owns the layer it
/// wraps and must delegate every phase to it.
pub trait ExecutorHooks<E: Engine> {
    /// Unwraps this layer, handing back the layer it wraps.
    ///
    /// # Errors
    ///
    /// Returns the layer itself when it wraps nothing (the engine's
    /// standard executor).
    fn into_inner(
        self: Box<Self>,
    ) -> Result<Box<dyn ExecutorHooks<E>>, Box<dyn ExecutorHooks<E>>>;

    /// Prepares the statement for execution.
    ///
    /// # Errors
    ///
    /// Returns the engine error when start-up fails.
    fn begin(&self, engine: &E, stmt: &mut E::Statement) -> Result<(), E::Error>;

    /// Runs the statement.
    ///
    /// # Errors
    ///
    /// Returns the engine error when execution fails.
    fn run(
        &self,
        engine: &E,
        stmt: &mut E::Statement,
        direction: ScanDirection,
        count: u64,
    ) -> Result<(), E::Error>;

    /// Completes deferred work such as after-statement triggers.
    ///
    /// # Errors
    ///
    /// Returns the engine error when deferred work fails.
    fn finish(&self, engine: &E, stmt: &mut E::Statement) -> Result<(), E::Error>;

    /// Releases the statement.
    ///
    /// # Errors
    ///
    /// Returns the engine error when shutdown fails.
    fn end(&self, engine: &E, stmt: &mut E::Statement) -> Result<(), E::Error>;
}
