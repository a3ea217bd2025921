// crates/qflash-core/src/core/explain.rs
// ============================================================================
// Module: QFlash Explain State
// Description: Plan rendering options and output buffer.
// Purpose: Carry explain settings between the capture stage and the engine.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! [`ExplainState`] is handed to the engine's plan printer. It carries the
//! rendering options and accumulates the output text. Structured formats are
//! emitted as bracketed fragments that the capture stage turns into a single
//! object.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;
use std::str::FromStr;

use serde::Deserialize;
use serde::Serialize;

// ============================================================================
// SECTION: Explain Format
// ============================================================================

/// Plan rendering format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExplainFormat {
    /// Human-readable indented text.
    #[default]
    Text,
    /// One JSON document per statement.
    Json,
}

impl ExplainFormat {
    /// Returns the stable label for the format.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Json => "json",
        }
    }

    /// Returns true when the format renders a single structured document.
    #[must_use]
    pub const fn is_structured(self) -> bool {
        matches!(self, Self::Json)
    }
}

impl fmt::Display for ExplainFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExplainFormat {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            other => Err(format!("unsupported plan format: {other}")),
        }
    }
}

// ============================================================================
// SECTION: Explain State
// ============================================================================

/// Plan rendering options plus the output buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExplainState {
    /// Include actual execution statistics.
    pub analyze: bool,
    /// Include detail beyond the plan shape.
    pub verbose: bool,
    /// Include buffer usage.
    pub buffers: bool,
    /// Include per-node timing.
    pub timing: bool,
    /// Include the execution summary.
    pub summary: bool,
    /// Output format.
    pub format: ExplainFormat,
    /// Rendered output.
    pub output: String,
}

impl ExplainState {
    /// Creates an explain state with every option disabled.
    #[must_use]
    pub const fn new(format: ExplainFormat) -> Self {
        Self {
            analyze: false,
            verbose: false,
            buffers: false,
            timing: false,
            summary: false,
            format,
            output: String::new(),
        }
    }

    /// Creates the explain state used for logged plans: analyze and verbose
    /// with buffers, timing and summary following analyze.
    #[must_use]
    pub const fn for_logging(format: ExplainFormat) -> Self {
        let analyze = true;
        Self {
            analyze,
            verbose: true,
            buffers: analyze,
            timing: analyze,
            summary: analyze,
            format,
            output: String::new(),
        }
    }

    /// Takes the rendered output, leaving the buffer empty.
    #[must_use]
    pub fn take_output(&mut self) -> String {
        std::mem::take(&mut self.output)
    }
}
