// crates/qflash-store-sqlite/src/config.rs
// ============================================================================
// Module: SQLite Engine Config
// Description: Connection, pragma and attached schema settings.
// Purpose: Validate engine configuration before opening a database.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! [`SqliteEngineConfig`] describes the main database file, its durability
//! pragmas and the schemas attached next to it. Attached schemas act as
//! namespaces for the log store. Validation fails closed on unsafe paths and
//! malformed identifiers.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeSet;
use std::path::Path;
use std::path::PathBuf;

use serde::Deserialize;

use crate::engine::SqliteEngineError;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default busy timeout (ms).
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;
/// Maximum length of a single path component.
const MAX_PATH_COMPONENT_LENGTH: usize = 255;
/// Maximum total path length.
const MAX_TOTAL_PATH_LENGTH: usize = 4096;
/// Maximum identifier length for schema and relation names.
pub const MAX_IDENTIFIER_LENGTH: usize = 63;
/// Path value selecting a private in-memory database.
pub const IN_MEMORY_PATH: &str = ":memory:";
/// Schema names reserved by `SQLite`.
const RESERVED_SCHEMAS: [&str; 2] = ["main", "temp"];

// ============================================================================
// SECTION: Modes
// ============================================================================

/// `SQLite` journal mode configuration.
///
/// # Invariants
/// - Values map 1:1 to `SQLite` `journal_mode` pragma settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SqliteJournalMode {
    /// WAL journal mode (recommended).
    #[default]
    Wal,
    /// Delete journal mode (legacy).
    Delete,
}

impl SqliteJournalMode {
    /// Returns the `SQLite` pragma value.
    #[must_use]
    pub const fn pragma_value(self) -> &'static str {
        match self {
            Self::Wal => "wal",
            Self::Delete => "delete",
        }
    }
}

/// `SQLite` sync mode configuration.
///
/// # Invariants
/// - Values map 1:1 to `SQLite` `synchronous` pragma settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SqliteSyncMode {
    /// Full synchronous mode (safest).
    #[default]
    Full,
    /// Normal synchronous mode (balanced).
    Normal,
}

impl SqliteSyncMode {
    /// Returns the `SQLite` pragma value.
    #[must_use]
    pub const fn pragma_value(self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Normal => "normal",
        }
    }
}

// ============================================================================
// SECTION: Config
// ============================================================================

/// Schema attached to the main database.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AttachedSchema {
    /// Schema name used as a namespace.
    pub name: String,
    /// Database file, or `:memory:`.
    pub path: PathBuf,
}

/// Configuration for the `SQLite` engine.
///
/// # Invariants
/// - `path` is `:memory:` or resolves to a file path (not a directory).
/// - Attached schema names are unique identifiers other than `main`/`temp`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SqliteEngineConfig {
    /// Path to the main database file.
    pub path: PathBuf,
    /// Busy timeout in milliseconds.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
    /// `SQLite` journal mode.
    #[serde(default)]
    pub journal_mode: SqliteJournalMode,
    /// `SQLite` sync mode.
    #[serde(default)]
    pub sync_mode: SqliteSyncMode,
    /// Schemas attached after opening.
    #[serde(default)]
    pub attach: Vec<AttachedSchema>,
}

impl SqliteEngineConfig {
    /// Creates a configuration for a database file with default pragmas.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
            journal_mode: SqliteJournalMode::default(),
            sync_mode: SqliteSyncMode::default(),
            attach: Vec::new(),
        }
    }

    /// Creates an in-memory configuration.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::new(IN_MEMORY_PATH)
    }

    /// Adds an attached schema.
    #[must_use]
    pub fn with_attached(mut self, name: &str, path: impl Into<PathBuf>) -> Self {
        self.attach.push(AttachedSchema {
            name: name.to_string(),
            path: path.into(),
        });
        self
    }

    /// Validates paths and attached schema names.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteEngineError::Invalid`] when the configuration is unsafe.
    pub fn validate(&self) -> Result<(), SqliteEngineError> {
        validate_database_path("database", &self.path)?;
        let mut seen = BTreeSet::new();
        for schema in &self.attach {
            validate_identifier("attached schema name", &schema.name)
                .map_err(SqliteEngineError::Invalid)?;
            let lowered = schema.name.to_ascii_lowercase();
            if RESERVED_SCHEMAS.contains(&lowered.as_str()) {
                return Err(SqliteEngineError::Invalid(format!(
                    "attached schema name is reserved: {}",
                    schema.name
                )));
            }
            if !seen.insert(lowered) {
                return Err(SqliteEngineError::Invalid(format!(
                    "duplicate attached schema name: {}",
                    schema.name
                )));
            }
            validate_database_path("attached schema", &schema.path)?;
        }
        Ok(())
    }
}

/// Returns the default busy timeout for `SQLite` connections.
const fn default_busy_timeout_ms() -> u64 {
    DEFAULT_BUSY_TIMEOUT_MS
}

// ============================================================================
// SECTION: Validation
// ============================================================================

/// Validates a schema or relation identifier.
///
/// Identifiers are 1-63 ASCII letters, digits or underscores and do not
/// start with a digit, so they can be spliced into generated SQL unquoted.
///
/// # Errors
///
/// Returns a message naming `kind` when the identifier is rejected.
pub fn validate_identifier(kind: &str, value: &str) -> Result<(), String> {
    if value.is_empty() {
        return Err(format!("{kind} must not be empty"));
    }
    if value.len() > MAX_IDENTIFIER_LENGTH {
        return Err(format!("{kind} exceeds {MAX_IDENTIFIER_LENGTH} characters"));
    }
    if value.starts_with(|ch: char| ch.is_ascii_digit()) {
        return Err(format!("{kind} must not start with a digit"));
    }
    if !value.chars().all(|ch| ch.is_ascii_alphanumeric() || ch == '_') {
        return Err(format!("{kind} must contain only letters, digits and underscores"));
    }
    Ok(())
}

/// Validates a database path; `:memory:` is always accepted.
fn validate_database_path(kind: &str, path: &Path) -> Result<(), SqliteEngineError> {
    if path.as_os_str() == IN_MEMORY_PATH {
        return Ok(());
    }
    if path.as_os_str().is_empty() {
        return Err(SqliteEngineError::Invalid(format!("{kind} path must not be empty")));
    }
    let path_string = path.display().to_string();
    if path_string.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(SqliteEngineError::Invalid(format!("{kind} path exceeds length limit")));
    }
    for component in path.components() {
        let name = component.as_os_str().to_string_lossy();
        if name.len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(SqliteEngineError::Invalid(format!(
                "{kind} path contains an overlong component"
            )));
        }
    }
    if path.exists() && path.is_dir() {
        return Err(SqliteEngineError::Invalid(format!(
            "{kind} path must be a file, not a directory"
        )));
    }
    Ok(())
}
