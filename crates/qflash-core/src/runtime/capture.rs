// crates/qflash-core/src/runtime/capture.rs
// ============================================================================
// Module: QFlash Plan Capture
// Description: End-of-statement timing finalization and plan rendering.
// Purpose: Turn an instrumented statement into plan text and elapsed time.
// Dependencies: crate::core, crate::interfaces, tracing
// ============================================================================

//! ## Overview
//! Capture runs in the end hook of a gated statement. The duration filter is
//! applied before rendering so filtered statements never pay for plan text.
//! Rendered output loses exactly one trailing line terminator; structured
//! output arrives as a bracketed member list and is patched into a single
//! object.

// ============================================================================
// SECTION: Imports
// ============================================================================

use tracing::debug;

use crate::core::ExplainFormat;
use crate::core::ExplainState;
use crate::core::StatementContext;
use crate::interfaces::Engine;
use crate::runtime::error::QflashError;

// ============================================================================
// SECTION: Capture Outcome
// ============================================================================

/// Result of capturing one statement.
#[derive(Debug, Clone, PartialEq)]
pub enum CaptureOutcome {
    /// Duration exceeded the threshold and the plan was rendered.
    Captured {
        /// Total elapsed time in milliseconds.
        total_ms: f64,
        /// Rendered plan text.
        plan: String,
    },
    /// Duration did not exceed the threshold.
    BelowThreshold {
        /// Total elapsed time in milliseconds.
        total_ms: f64,
    },
    /// No timing accumulator was attached to the statement.
    NotInstrumented,
}

// ============================================================================
// SECTION: Plan Capture
// ============================================================================

/// Plan capture stage.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlanCapture;

impl PlanCapture {
    /// Finalizes timing, applies the duration filter and renders the plan.
    ///
    /// # Errors
    ///
    /// Returns [`QflashError::Explain`] when the engine cannot render the plan.
    pub fn capture<E: Engine>(
        engine: &E,
        stmt: &mut E::Statement,
        min_duration_ms: f64,
        format: ExplainFormat,
    ) -> Result<CaptureOutcome, QflashError> {
        if stmt.totaltime().is_none() {
            debug!(query = stmt.source_text(), "gated statement carries no timing accumulator");
            return Ok(CaptureOutcome::NotInstrumented);
        }
        let Some(totaltime) = stmt.totaltime_mut() else {
            return Ok(CaptureOutcome::NotInstrumented);
        };
        totaltime.end_loop();
        let total_ms = totaltime.total_ms();
        if total_ms <= min_duration_ms {
            debug!(total_ms, min_duration_ms, "statement below duration threshold");
            return Ok(CaptureOutcome::BelowThreshold {
                total_ms,
            });
        }
        let plan = Self::render(engine, stmt, format)?;
        Ok(CaptureOutcome::Captured {
            total_ms,
            plan,
        })
    }

    /// Renders the plan of a finished statement in the given format.
    ///
    /// # Errors
    ///
    /// Returns [`QflashError::Explain`] when the engine cannot render the plan.
    pub fn render<E: Engine>(
        engine: &E,
        stmt: &E::Statement,
        format: ExplainFormat,
    ) -> Result<String, QflashError> {
        let mut es = ExplainState::for_logging(format);
        engine.explain_begin(&mut es);
        engine.explain_plan(&mut es, stmt)?;
        if es.analyze {
            engine.explain_triggers(&mut es, stmt)?;
        }
        engine.explain_end(&mut es);
        Ok(finalize_plan_text(es.take_output(), format))
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Strips one trailing line terminator and, for structured output, turns the
/// enclosing brackets into braces.
#[must_use]
pub fn finalize_plan_text(mut text: String, format: ExplainFormat) -> String {
    if text.ends_with('\n') {
        text.pop();
        if text.ends_with('\r') {
            text.pop();
        }
    }
    if format.is_structured() && text.len() >= 2 {
        let first_len = text.chars().next().map_or(0, char::len_utf8);
        text.replace_range(..first_len, "{");
        if let Some((last_start, _)) = text.char_indices().next_back() {
            text.replace_range(last_start.., "}");
        }
    }
    text
}

// ============================================================================
// SECTION: Tests
// ============================================================================
