// crates/qflash-core/src/runtime/gate.rs
// ============================================================================
// Module: QFlash Instrumentation Gate
// Description: Per-statement eligibility decision for instrumentation.
// Purpose: Decide deterministically whether a statement is instrumented.
// Dependencies: crate::core
// ============================================================================

//! ## Overview
//! The gate is a pure function over a [`GateInput`] snapshot. It is
//! evaluated fresh at every hook call. The final clause is the recursion
//! guard: a statement whose primary relation is the log relation (or the
//! engine's identifier catalog) is never instrumented, so the side-channel
//! insert cannot log itself.
//!
//! Clauses are checked in a fixed order and the first failing clause is
//! reported as the [`GateOutcome`].

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use crate::core::OperationKind;
use crate::core::RelationOid;

// ============================================================================
// SECTION: Gate Input
// ============================================================================

/// Snapshot of everything the gate depends on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GateInput<'a> {
    /// Master switch.
    pub enabled: bool,
    /// Current nesting depth.
    pub depth: u32,
    /// Nested statements may be logged.
    pub log_nested: bool,
    /// Resolved log relation, `None` when the target does not resolve.
    pub target_relation: Option<RelationOid>,
    /// The engine's identifier catalog relation.
    pub catalog_relation: RelationOid,
    /// Statement operation kind.
    pub operation: OperationKind,
    /// Statement relations; only the first entry is significant.
    pub relations: &'a [RelationOid],
}

// ============================================================================
// SECTION: Gate Outcome
// ============================================================================

/// Gate decision with the clause that closed it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateOutcome {
    /// Statement is instrumented and logged.
    Open,
    /// Logging is disabled.
    Disabled,
    /// Statement is nested and nested logging is off.
    Nested,
    /// Log target does not resolve.
    TargetUnresolved,
    /// Operation kind is never logged.
    OperationExcluded,
    /// Statement touches the log relation or the identifier catalog first.
    RecursionGuard,
}

impl GateOutcome {
    /// Returns true when the statement is instrumented.
    #[must_use]
    pub const fn is_open(self) -> bool {
        matches!(self, Self::Open)
    }

    /// Returns a stable label for logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Disabled => "disabled",
            Self::Nested => "nested",
            Self::TargetUnresolved => "target_unresolved",
            Self::OperationExcluded => "operation_excluded",
            Self::RecursionGuard => "recursion_guard",
        }
    }
}

impl fmt::Display for GateOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// SECTION: Gate
// ============================================================================

/// Pure instrumentation gate.
#[derive(Debug, Clone, Copy, Default)]
pub struct InstrumentationGate;

impl InstrumentationGate {
    /// Returns true when the enabled and depth clauses pass. Callers use this
    /// to skip target resolution for statements that cannot be logged.
    #[must_use]
    pub const fn precheck(enabled: bool, depth: u32, log_nested: bool) -> GateOutcome {
        if !enabled {
            return GateOutcome::Disabled;
        }
        if depth > 0 && !log_nested {
            return GateOutcome::Nested;
        }
        GateOutcome::Open
    }

    /// Evaluates every clause in order.
    #[must_use]
    pub fn evaluate(input: &GateInput<'_>) -> GateOutcome {
        let outcome = Self::precheck(input.enabled, input.depth, input.log_nested);
        if !outcome.is_open() {
            return outcome;
        }
        if !input.operation.is_loggable() {
            return GateOutcome::OperationExcluded;
        }
        let Some(target_relation) = input.target_relation else {
            return GateOutcome::TargetUnresolved;
        };
        match input.relations.first() {
            Some(first) if *first == target_relation || *first == input.catalog_relation => {
                GateOutcome::RecursionGuard
            }
            _ => GateOutcome::Open,
        }
    }
}
