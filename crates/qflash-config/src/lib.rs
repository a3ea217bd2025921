// crates/qflash-config/src/lib.rs
// ============================================================================
// Module: QFlash Config
// Description: Configuration model and loading for QFlash deployments.
// Purpose: Parse qflash.toml and apply it to engines and sessions.
// Dependencies: qflash-core, qflash-store-sqlite, serde, thiserror, toml
// ============================================================================

//! ## Overview
//! This crate owns the `qflash.toml` model. Loading is fail-closed: files
//! over the size limit, non-UTF-8 content, unknown keys and malformed
//! identifiers are all rejected before a session is touched.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod config;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use config::CONFIG_ENV_VAR;
pub use config::ConfigError;
pub use config::LoggingConfig;
pub use config::MAX_CONFIG_FILE_SIZE;
pub use config::QflashConfig;
