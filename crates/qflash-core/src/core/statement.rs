// crates/qflash-core/src/core/statement.rs
// ============================================================================
// Module: QFlash Statement Contract
// Description: Engine-owned statement context surface used by the core.
// Purpose: Define the fields the lifecycle hooks may read or write.
// Dependencies: crate::core::{identifiers, instrument}
// ============================================================================

//! ## Overview
//! A statement context represents one execution of one statement. The engine
//! owns it for the whole lifecycle; the core only reads classification data
//! and writes instrumentation requests through [`StatementContext`]. The
//! timing accumulator attached through this trait is owned by the statement
//! and dropped with it.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;
use std::ops::BitOr;
use std::ops::BitOrAssign;

use serde::Deserialize;
use serde::Serialize;

use crate::core::identifiers::RelationOid;
use crate::core::instrument::Instrumentation;

// ============================================================================
// SECTION: Operation Kind
// ============================================================================

/// Statement operation classification.
///
/// # Invariants
/// - Variants are stable labels for logging and trigger matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    /// Read-only query.
    Select,
    /// Row insertion.
    Insert,
    /// Row update.
    Update,
    /// Row deletion.
    Delete,
    /// Anything else (utility, DDL, pragma).
    Other,
}

impl OperationKind {
    /// Returns a stable label for the operation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Select => "select",
            Self::Insert => "insert",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::Other => "other",
        }
    }

    /// Returns true for the data-manipulating and read operations that can be logged.
    #[must_use]
    pub const fn is_loggable(self) -> bool {
        matches!(self, Self::Select | Self::Insert | Self::Update | Self::Delete)
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Direction requested for the run phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScanDirection {
    /// Forward scan.
    #[default]
    Forward,
    /// Backward scan.
    Backward,
}

// ============================================================================
// SECTION: Instrumentation Options
// ============================================================================

/// Instrumentation requested on a statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct InstrumentOptions {
    /// Collect wall-clock timing.
    pub timer: bool,
    /// Collect buffer usage.
    pub buffers: bool,
    /// Collect row counts.
    pub rows: bool,
}

impl InstrumentOptions {
    /// No instrumentation.
    pub const NONE: Self = Self {
        timer: false,
        buffers: false,
        rows: false,
    };
    /// Full timing, buffer and row instrumentation.
    pub const ALL: Self = Self {
        timer: true,
        buffers: true,
        rows: true,
    };

    /// Returns true when any instrumentation is requested.
    #[must_use]
    pub const fn any(self) -> bool {
        self.timer || self.buffers || self.rows
    }
}

impl BitOr for InstrumentOptions {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self {
            timer: self.timer || rhs.timer,
            buffers: self.buffers || rhs.buffers,
            rows: self.rows || rhs.rows,
        }
    }
}

impl BitOrAssign for InstrumentOptions {
    fn bitor_assign(&mut self, rhs: Self) {
        *self = *self | rhs;
    }
}

// ============================================================================
// SECTION: Statement Context
// ============================================================================

/// Engine-owned view of one statement execution.
pub trait StatementContext {
    /// Returns the statement source text.
    fn source_text(&self) -> &str;

    /// Returns the operation classification.
    fn operation(&self) -> OperationKind;

    /// Returns referenced relations in engine order; the first entry is the
    /// primary relation of the statement.
    fn relations(&self) -> &[RelationOid];

    /// Returns the instrumentation currently requested.
    fn instrument_options(&self) -> InstrumentOptions;

    /// Merges additional instrumentation into the request.
    fn request_instrumentation(&mut self, options: InstrumentOptions);

    /// Returns the attached timing accumulator, if any.
    fn totaltime(&self) -> Option<&Instrumentation>;

    /// Returns the attached timing accumulator mutably, if any.
    fn totaltime_mut(&mut self) -> Option<&mut Instrumentation>;

    /// Attaches a timing accumulator owned by the statement.
    fn attach_totaltime(&mut self, instrumentation: Instrumentation);
}
