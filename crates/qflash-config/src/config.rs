// crates/qflash-config/src/config.rs
// ============================================================================
// Module: QFlash Configuration
// Description: TOML configuration model, loading and validation.
// Purpose: Provide strict, fail-closed config parsing and session wiring.
// Dependencies: qflash-core, qflash-store-sqlite, serde, thiserror, toml
// ============================================================================

//! ## Overview
//! [`QflashConfig`] is loaded from `qflash.toml`. The `[logging]` table maps
//! onto session settings and the `[store]` table configures the `SQLite`
//! engine. Loading enforces path, size and encoding limits and validates
//! every field before anything is applied.
//!
//! Security posture: config files are untrusted input; identifiers are
//! restricted to a charset that is safe to splice into generated SQL.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::env;
use std::fs;
use std::path::Path;
use std::path::PathBuf;

use qflash_core::Catalog;
use qflash_core::ExplainFormat;
use qflash_core::QflashSession;
use qflash_store_sqlite::SqliteEngineConfig;
use qflash_store_sqlite::validate_identifier;
use serde::Deserialize;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default config file name.
const DEFAULT_CONFIG_NAME: &str = "qflash.toml";
/// Environment variable naming the config file.
pub const CONFIG_ENV_VAR: &str = "QFLASH_CONFIG";
/// Maximum config file size in bytes.
pub const MAX_CONFIG_FILE_SIZE: usize = 1024 * 1024;
/// Maximum length of a single path component.
const MAX_PATH_COMPONENT_LENGTH: usize = 255;
/// Maximum total path length.
const MAX_TOTAL_PATH_LENGTH: usize = 4096;
/// Default log store namespace.
const DEFAULT_TARGET_NAMESPACE: &str = "main";
/// Default log store relation.
const DEFAULT_TARGET_RELATION: &str = "qflash";

// ============================================================================
// SECTION: Logging Config
// ============================================================================

/// Plan logging settings applied to a session.
///
/// # Invariants
/// - `min_duration_ms` is finite and non-negative after validation.
/// - Target names are valid identifiers after validation.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// Enables plan logging.
    #[serde(default)]
    pub enabled: bool,
    /// Minimum total duration in milliseconds; statements at or below it are
    /// not logged.
    #[serde(default)]
    pub min_duration_ms: f64,
    /// Correlation tag stored with each row; empty stores null.
    #[serde(default)]
    pub correlation_tag: String,
    /// Log store namespace name.
    #[serde(default = "default_target_namespace")]
    pub target_namespace: String,
    /// Log store relation name.
    #[serde(default = "default_target_relation")]
    pub target_relation: String,
    /// Logs statements executed below the top level.
    #[serde(default)]
    pub log_nested: bool,
    /// Plan render format.
    #[serde(default)]
    pub plan_format: ExplainFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            min_duration_ms: 0.0,
            correlation_tag: String::new(),
            target_namespace: default_target_namespace(),
            target_relation: default_target_relation(),
            log_nested: false,
            plan_format: ExplainFormat::Text,
        }
    }
}

impl LoggingConfig {
    /// Validates thresholds and target names.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when a field is rejected.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.min_duration_ms.is_finite() || self.min_duration_ms < 0.0 {
            return Err(ConfigError::Invalid(
                "logging.min_duration_ms must be a finite, non-negative number".to_string(),
            ));
        }
        validate_identifier("logging.target_namespace", &self.target_namespace)
            .map_err(ConfigError::Invalid)?;
        validate_identifier("logging.target_relation", &self.target_relation)
            .map_err(ConfigError::Invalid)?;
        Ok(())
    }
}

/// Returns the default log store namespace.
fn default_target_namespace() -> String {
    DEFAULT_TARGET_NAMESPACE.to_string()
}

/// Returns the default log store relation.
fn default_target_relation() -> String {
    DEFAULT_TARGET_RELATION.to_string()
}

// ============================================================================
// SECTION: Config
// ============================================================================

/// Top-level QFlash configuration.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct QflashConfig {
    /// Plan logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
    /// `SQLite` engine settings.
    pub store: SqliteEngineConfig,
}

impl QflashConfig {
    /// Loads configuration from disk using the default resolution rules.
    ///
    /// The path is taken from `path`, then [`CONFIG_ENV_VAR`], then
    /// `./qflash.toml`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when loading or validation fails.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let resolved = resolve_path(path)?;
        validate_path(&resolved)?;
        let bytes = fs::read(&resolved).map_err(|err| ConfigError::Io(err.to_string()))?;
        if bytes.len() > MAX_CONFIG_FILE_SIZE {
            return Err(ConfigError::Invalid("config file exceeds size limit".to_string()));
        }
        let content = std::str::from_utf8(&bytes)
            .map_err(|_| ConfigError::Invalid("config file must be utf-8".to_string()))?;
        Self::from_toml(content)
    }

    /// Parses and validates configuration text.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when parsing or validation fails.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self =
            toml::from_str(content).map_err(|err| ConfigError::Parse(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration for internal consistency.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when configuration is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.logging.validate()?;
        self.store.validate().map_err(|err| ConfigError::Invalid(err.to_string()))
    }

    /// Applies the logging settings to a session.
    ///
    /// The settings are built on a copy of the current ones: names are
    /// assigned before logging is enabled, then checked against the catalog.
    /// The session only sees the result when every step succeeds, so a
    /// rejected config leaves the prior settings in effect.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Apply`] when a setting is rejected.
    pub fn apply(&self, session: &QflashSession, catalog: &dyn Catalog) -> Result<(), ConfigError> {
        let logging = &self.logging;
        let mut settings = session.settings();
        settings.set_enabled(false);
        settings.set_min_duration_ms(logging.min_duration_ms).map_err(apply_error)?;
        settings.set_correlation_tag(logging.correlation_tag.as_str());
        settings.set_log_nested(logging.log_nested);
        settings.set_plan_format(logging.plan_format);
        settings.set_target_namespace(&logging.target_namespace, catalog).map_err(apply_error)?;
        settings.set_target_relation(&logging.target_relation, catalog).map_err(apply_error)?;
        if logging.enabled {
            settings.set_enabled(true);
            settings.set_target_namespace(&logging.target_namespace, catalog).map_err(apply_error)?;
            settings.set_target_relation(&logging.target_relation, catalog).map_err(apply_error)?;
        }
        session.replace_settings(settings);
        Ok(())
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// I/O failure while reading configuration.
    #[error("config io error: {0}")]
    Io(String),
    /// TOML parsing error.
    #[error("config parse error: {0}")]
    Parse(String),
    /// Invalid configuration data.
    #[error("invalid config: {0}")]
    Invalid(String),
    /// A setting was rejected by the session.
    #[error("config apply error: {0}")]
    Apply(String),
}

/// Maps a rejected session setting to an apply error.
fn apply_error(err: impl std::fmt::Display) -> ConfigError {
    ConfigError::Apply(err.to_string())
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Resolves the config path from CLI or environment defaults.
fn resolve_path(path: Option<&Path>) -> Result<PathBuf, ConfigError> {
    if let Some(path) = path {
        return Ok(path.to_path_buf());
    }
    if let Ok(env_path) = env::var(CONFIG_ENV_VAR) {
        if env_path.len() > MAX_TOTAL_PATH_LENGTH {
            return Err(ConfigError::Invalid("config path exceeds max length".to_string()));
        }
        return Ok(PathBuf::from(env_path));
    }
    Ok(PathBuf::from(DEFAULT_CONFIG_NAME))
}

/// Validates the resolved path against security limits.
fn validate_path(path: &Path) -> Result<(), ConfigError> {
    let text = path.to_string_lossy();
    if text.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(ConfigError::Invalid("config path exceeds max length".to_string()));
    }
    for component in path.components() {
        let value = component.as_os_str().to_string_lossy();
        if value.len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(ConfigError::Invalid("config path component too long".to_string()));
        }
    }
    Ok(())
}

// ============================================================================
// SECTION: Tests
// ============================================================================
