// crates/qflash-core/src/runtime/session.rs
// ============================================================================
// Module: QFlash Session
// Description: Per-session state shared by the interceptor and its callers.
// Purpose: Own settings, nesting counters and the side-channel writer.
// Dependencies: crate::core, crate::interfaces, crate::runtime
// ============================================================================

//! ## Overview
//! A [`QflashSession`] replaces process-wide counters with one state object
//! per session. The interceptor holds it behind an `Rc`; callers keep a
//! second handle to change settings between statements. Settings live in a
//! `RefCell`, and no borrow is held across a call into the engine.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::cell::RefCell;

use crate::core::ExplainFormat;
use crate::core::StatementContext;
use crate::interfaces::Catalog;
use crate::interfaces::QueryFacility;
use crate::runtime::error::ConfigurationError;
use crate::runtime::error::QflashError;
use crate::runtime::gate::GateInput;
use crate::runtime::gate::GateOutcome;
use crate::runtime::gate::InstrumentationGate;
use crate::runtime::nesting::NestingTracker;
use crate::runtime::settings::QflashSettings;
use crate::runtime::writer::SideChannelWriter;

// ============================================================================
// SECTION: Session
// ============================================================================

/// Session-scoped QFlash state.
#[derive(Debug, Default)]
pub struct QflashSession {
    /// Reentrancy counters.
    nesting: NestingTracker,
    /// Tunable settings and the target cache.
    settings: RefCell<QflashSettings>,
    /// Side-channel writer.
    writer: SideChannelWriter,
}

impl QflashSession {
    /// Creates a session with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a session with the given settings.
    #[must_use]
    pub fn with_settings(settings: QflashSettings) -> Self {
        Self {
            settings: RefCell::new(settings),
            ..Self::default()
        }
    }

    /// Returns the nesting tracker.
    #[must_use]
    pub const fn nesting(&self) -> &NestingTracker {
        &self.nesting
    }

    /// Returns the current nesting depth.
    #[must_use]
    pub fn depth(&self) -> u32 {
        self.nesting.depth()
    }

    /// Returns the depth of the innermost pushed side-channel context.
    #[must_use]
    pub fn side_channel_marker(&self) -> u32 {
        self.nesting.side_channel_marker()
    }

    /// Returns a snapshot of the current settings.
    #[must_use]
    pub fn settings(&self) -> QflashSettings {
        self.settings.borrow().clone()
    }

    /// Enables or disables logging.
    pub fn set_enabled(&self, enabled: bool) {
        self.settings.borrow_mut().set_enabled(enabled);
    }

    /// Sets the minimum duration threshold in milliseconds.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigurationError`] when the value is rejected.
    pub fn set_min_duration_ms(&self, value: f64) -> Result<(), ConfigurationError> {
        self.settings.borrow_mut().set_min_duration_ms(value)
    }

    /// Sets the correlation tag.
    pub fn set_correlation_tag(&self, tag: impl Into<String>) {
        self.settings.borrow_mut().set_correlation_tag(tag);
    }

    /// Sets the log namespace name.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigurationError`] when the name does not resolve while
    /// logging is enabled.
    pub fn set_target_namespace(
        &self,
        name: &str,
        catalog: &dyn Catalog,
    ) -> Result<(), ConfigurationError> {
        self.settings.borrow_mut().set_target_namespace(name, catalog)
    }

    /// Sets the log relation name.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigurationError`] when the name does not resolve while
    /// logging is enabled.
    pub fn set_target_relation(
        &self,
        name: &str,
        catalog: &dyn Catalog,
    ) -> Result<(), ConfigurationError> {
        self.settings.borrow_mut().set_target_relation(name, catalog)
    }

    /// Enables or disables logging of nested statements.
    pub fn set_log_nested(&self, log_nested: bool) {
        self.settings.borrow_mut().set_log_nested(log_nested);
    }

    /// Sets the plan render format.
    pub fn set_plan_format(&self, format: ExplainFormat) {
        self.settings.borrow_mut().set_plan_format(format);
    }

    /// Evaluates the gate for a statement at the current depth.
    ///
    /// The target is resolved only when the enabled, depth and operation
    /// clauses pass.
    ///
    /// # Errors
    ///
    /// Returns [`QflashError::Catalog`] when target resolution fails.
    pub fn gate<S>(&self, catalog: &dyn Catalog, stmt: &S) -> Result<GateOutcome, QflashError>
    where
        S: StatementContext + ?Sized,
    {
        let depth = self.depth();
        let (enabled, log_nested) = {
            let settings = self.settings.borrow();
            (settings.enabled(), settings.log_nested())
        };
        let precheck = InstrumentationGate::precheck(enabled, depth, log_nested);
        if !precheck.is_open() {
            return Ok(precheck);
        }
        if !stmt.operation().is_loggable() {
            return Ok(GateOutcome::OperationExcluded);
        }
        let target = self.settings.borrow_mut().resolve_target(catalog)?;
        let input = GateInput {
            enabled,
            depth,
            log_nested,
            target_relation: target.map(|target| target.relation),
            catalog_relation: catalog.catalog_relation_oid(),
            operation: stmt.operation(),
            relations: stmt.relations(),
        };
        Ok(InstrumentationGate::evaluate(&input))
    }

    /// Replaces every setting at once.
    pub fn replace_settings(&self, settings: QflashSettings) {
        *self.settings.borrow_mut() = settings;
    }

    /// Returns the side-channel writer.
    #[must_use]
    pub const fn writer(&self) -> &SideChannelWriter {
        &self.writer
    }

    /// Pops side-channel contexts pushed deeper than the current depth.
    ///
    /// # Errors
    ///
    /// Returns [`QflashError::Context`] when a context cannot be popped.
    pub fn settle<F>(&self, facility: &F) -> Result<(), QflashError>
    where
        F: QueryFacility + ?Sized,
    {
        self.writer.settle(&self.nesting, facility)
    }
}
