// crates/qflash-core/src/runtime/interceptor.rs
// ============================================================================
// Module: QFlash Lifecycle Interceptor
// Description: Executor hook layer that instruments and logs statements.
// Purpose: Orchestrate gate, nesting, capture and side-channel write.
// Dependencies: crate::core, crate::interfaces, crate::runtime, tracing
// ============================================================================

//! ## Overview
//! [`QflashInterceptor`] wraps the four lifecycle phases of the layer it
//! owns. Begin requests full instrumentation for gated statements; run and
//! finish are bracketed by a depth guard; end captures and writes the plan,
//! then always delegates. Uninstalling hands the wrapped chain back intact.
//!
//! Security posture: logged text is the statement text as submitted; the
//! interceptor never rewrites or executes caller SQL itself.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;
use std::rc::Rc;

use tracing::debug;
use tracing::warn;

use crate::core::InstrumentOptions;
use crate::core::Instrumentation;
use crate::core::LogRecord;
use crate::core::ScanDirection;
use crate::core::StatementContext;
use crate::interfaces::Engine;
use crate::interfaces::ExecutorHooks;
use crate::runtime::capture::CaptureOutcome;
use crate::runtime::capture::PlanCapture;
use crate::runtime::error::QflashError;
use crate::runtime::session::QflashSession;

// ============================================================================
// SECTION: Interceptor
// ============================================================================

/// Lifecycle layer that logs plans of gated statements.
pub struct QflashInterceptor<E: Engine> {
    /// Previously installed layer.
    next: Box<dyn ExecutorHooks<E>>,
    /// Session state shared with the caller.
    session: Rc<QflashSession>,
}

impl<E: Engine> fmt::Debug for QflashInterceptor<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QflashInterceptor").field("session", &self.session).finish_non_exhaustive()
    }
}

impl<E: Engine> QflashInterceptor<E> {
    /// Wraps an existing chain.
    #[must_use]
    pub fn install(next: Box<dyn ExecutorHooks<E>>, session: Rc<QflashSession>) -> Self {
        Self {
            next,
            session,
        }
    }

    /// Removes the layer and returns the chain it wrapped.
    #[must_use]
    pub fn uninstall(self) -> Box<dyn ExecutorHooks<E>> {
        self.next
    }

    /// Returns the session state.
    #[must_use]
    pub const fn session(&self) -> &Rc<QflashSession> {
        &self.session
    }

    /// Captures and writes the plan of a gated statement.
    fn log_statement(&self, engine: &E, stmt: &mut E::Statement) -> Result<(), QflashError> {
        let settings = self.session.settings();
        let Some(target) = settings.resolved() else {
            return Ok(());
        };
        let captured =
            PlanCapture::capture(engine, stmt, settings.min_duration_ms(), settings.plan_format());
        let outcome = match captured {
            Ok(outcome) => outcome,
            Err(QflashError::Explain(message)) => {
                warn!(
                    error = %message,
                    query = stmt.source_text(),
                    "plan render failed, statement not logged"
                );
                return Ok(());
            }
            Err(err) => return Err(err),
        };
        let CaptureOutcome::Captured {
            total_ms,
            plan,
        } = outcome
        else {
            return Ok(());
        };
        let record = LogRecord::new(stmt.source_text(), plan, total_ms, settings.correlation_tag());
        self.session.writer().write(self.session.nesting(), engine, &target, record)
    }

    /// Pops contexts left deeper than the current depth after a failed phase.
    fn settle_after_failure(&self, engine: &E) {
        if let Err(err) = self.session.settle(engine) {
            warn!(error = %err, "failed to restore side-channel context after statement error");
        }
    }
}

impl<E: Engine> ExecutorHooks<E> for QflashInterceptor<E> {
    fn into_inner(
        self: Box<Self>,
    ) -> Result<Box<dyn ExecutorHooks<E>>, Box<dyn ExecutorHooks<E>>> {
        Ok(self.uninstall())
    }

    fn begin(&self, engine: &E, stmt: &mut E::Statement) -> Result<(), E::Error> {
        let outcome = self.session.gate(engine, &*stmt)?;
        debug!(
            depth = self.session.depth(),
            gate = %outcome,
            operation = %stmt.operation(),
            "statement begin"
        );
        if outcome.is_open() {
            stmt.request_instrumentation(InstrumentOptions::ALL);
        }
        self.next.begin(engine, stmt)?;
        if self.session.gate(engine, &*stmt)?.is_open() && stmt.totaltime().is_none() {
            stmt.attach_totaltime(Instrumentation::new(InstrumentOptions::ALL));
        }
        Ok(())
    }

    fn run(
        &self,
        engine: &E,
        stmt: &mut E::Statement,
        direction: ScanDirection,
        count: u64,
    ) -> Result<(), E::Error> {
        let result = {
            let _depth = self.session.nesting().enter();
            self.next.run(engine, stmt, direction, count)
        };
        if result.is_err() {
            self.settle_after_failure(engine);
        }
        result
    }

    fn finish(&self, engine: &E, stmt: &mut E::Statement) -> Result<(), E::Error> {
        let result = {
            let _depth = self.session.nesting().enter();
            self.next.finish(engine, stmt)
        };
        if result.is_err() {
            self.settle_after_failure(engine);
        }
        result
    }

    fn end(&self, engine: &E, stmt: &mut E::Statement) -> Result<(), E::Error> {
        let depth = self.session.depth();
        let logged = match self.session.gate(engine, &*stmt) {
            Ok(outcome) if outcome.is_open() => self.log_statement(engine, stmt),
            Ok(outcome) => {
                debug!(depth, gate = %outcome, "statement end without logging");
                Ok(())
            }
            Err(err) => Err(err),
        };
        let settled = if depth == 0 { self.session.settle(engine) } else { Ok(()) };
        let ended = self.next.end(engine, stmt);
        let result = match (logged, settled) {
            (Ok(()), Ok(())) => Ok(()),
            (Err(err), Ok(())) | (Ok(()), Err(err)) => Err(err),
            (Err(err), Err(settle_err)) => {
                warn!(error = %settle_err, "failed to restore side-channel context after log failure");
                Err(err)
            }
        };
        match result {
            Ok(()) => ended,
            Err(err) => {
                if let Err(end_err) = ended {
                    warn!(error = %end_err, "chained end hook failed after log failure");
                }
                Err(err.into())
            }
        }
    }
}
