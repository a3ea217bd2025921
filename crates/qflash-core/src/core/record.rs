// crates/qflash-core/src/core/record.rs
// ============================================================================
// Module: QFlash Log Record
// Description: Captured statement record and side-channel parameter values.
// Purpose: Carry one captured plan from the capture stage to the writer.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! A [`LogRecord`] is built once per logged statement and consumed by a single
//! side-channel write. [`Datum`] and [`ParamType`] describe the typed
//! parameters bound to the generated insert.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;

// ============================================================================
// SECTION: Parameters
// ============================================================================

/// Declared parameter type for a prepared side-channel statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamType {
    /// Text value.
    Text,
    /// Double-precision float.
    Float8,
}

/// Parameter value bound to a prepared side-channel statement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Datum {
    /// SQL null.
    Null,
    /// Text value.
    Text(String),
    /// Double-precision float.
    Float8(f64),
}

impl Datum {
    /// Returns the text payload, if any.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(value) => Some(value),
            Self::Null | Self::Float8(_) => None,
        }
    }

    /// Returns true for SQL null.
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}

// ============================================================================
// SECTION: Log Record
// ============================================================================

/// Captured plan record for one statement.
///
/// # Invariants
/// - `total_time_ms` is finite and non-negative.
/// - `hash` is `None` when the configured correlation tag is empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogRecord {
    /// Statement source text.
    pub query: String,
    /// Rendered plan text.
    pub plan: String,
    /// Total execution time in milliseconds.
    pub total_time_ms: f64,
    /// Correlation tag.
    pub hash: Option<String>,
}

impl LogRecord {
    /// Builds a record, mapping an empty correlation tag to `None`.
    #[must_use]
    pub fn new(
        query: impl Into<String>,
        plan: impl Into<String>,
        total_time_ms: f64,
        correlation_tag: &str,
    ) -> Self {
        let hash = if correlation_tag.is_empty() { None } else { Some(correlation_tag.to_string()) };
        Self {
            query: query.into(),
            plan: plan.into(),
            total_time_ms: total_time_ms.max(0.0),
            hash,
        }
    }

    /// Converts the record into insert parameters `(query, plan, total_time, hash)`.
    #[must_use]
    pub fn into_params(self) -> Vec<Datum> {
        vec![
            Datum::Text(self.query),
            Datum::Text(self.plan),
            Datum::Float8(self.total_time_ms),
            self.hash.map_or(Datum::Null, Datum::Text),
        ]
    }
}
