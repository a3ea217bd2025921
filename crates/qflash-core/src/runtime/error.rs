// crates/qflash-core/src/runtime/error.rs
// ============================================================================
// Module: QFlash Runtime Errors
// Description: Error taxonomy for configuration, contexts and log writes.
// Purpose: Classify failures raised by the interception pipeline.
// Dependencies: thiserror
// ============================================================================

//! ## Overview
//! [`QflashError`] is raised through the engine's hook chain. Configuration
//! errors are returned directly from setters and never abort a statement.
//! Storage errors carry the generated insert text so the failing target is
//! visible in the session error.

// ============================================================================
// SECTION: Imports
// ============================================================================

use thiserror::Error;

use crate::interfaces::CatalogError;
use crate::interfaces::ExplainError;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Configuration assignment errors. The rejected value never takes effect.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigurationError {
    /// Namespace name does not resolve while logging is enabled.
    #[error("log namespace \"{0}\" does not exist")]
    UnknownNamespace(String),
    /// Relation name does not resolve in the configured namespace.
    #[error("log relation \"{relation}\" does not exist in namespace \"{namespace}\"")]
    UnknownRelation {
        /// Configured namespace name.
        namespace: String,
        /// Rejected relation name.
        relation: String,
    },
    /// Value outside the accepted range.
    #[error("invalid value for {setting}: {message}")]
    InvalidValue {
        /// Setting name.
        setting: &'static str,
        /// Reason for rejection.
        message: String,
    },
    /// Catalog could not be consulted during validation.
    #[error("catalog unavailable: {0}")]
    Catalog(String),
}

/// Interception pipeline errors.
#[derive(Debug, Error)]
pub enum QflashError {
    /// Configuration was rejected.
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
    /// Catalog lookup failed while resolving the log target.
    #[error("qflash catalog error: {0}")]
    Catalog(String),
    /// Plan rendering failed.
    #[error("qflash explain error: {0}")]
    Explain(String),
    /// Side-channel context could not be pushed or popped.
    #[error("qflash side-channel context error: {0}")]
    Context(String),
    /// Side-channel connection failed.
    #[error("qflash connect failed: {0}")]
    StorageConnect(String),
    /// Log insert could not be prepared.
    #[error("qflash prepare failed for \"{sql}\": {message}")]
    StoragePrepare {
        /// Generated insert text.
        sql: String,
        /// Engine message.
        message: String,
    },
    /// Log insert failed.
    #[error("qflash execute failed for \"{sql}\" when logging \"{query}\": {message}")]
    StorageExec {
        /// Generated insert text.
        sql: String,
        /// Logged statement text.
        query: String,
        /// Engine message.
        message: String,
    },
    /// Log insert touched an unexpected number of rows.
    #[error("qflash insert \"{sql}\" affected {rows} rows, expected 1")]
    UnexpectedRowCount {
        /// Generated insert text.
        sql: String,
        /// Rows reported by the engine.
        rows: u64,
    },
}

impl From<CatalogError> for QflashError {
    fn from(error: CatalogError) -> Self {
        match error {
            CatalogError::Lookup(message) => Self::Catalog(message),
        }
    }
}

impl From<ExplainError> for QflashError {
    fn from(error: ExplainError) -> Self {
        match error {
            ExplainError::Render(message) => Self::Explain(message),
        }
    }
}

impl From<CatalogError> for ConfigurationError {
    fn from(error: CatalogError) -> Self {
        match error {
            CatalogError::Lookup(message) => Self::Catalog(message),
        }
    }
}
