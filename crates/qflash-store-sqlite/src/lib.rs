// crates/qflash-store-sqlite/src/lib.rs
// ============================================================================
// Module: QFlash SQLite Engine
// Description: SQLite-backed engine and plan log store for QFlash.
// Purpose: Run statements through the QFlash lifecycle on a real database.
// Dependencies: qflash-core, rusqlite, serde, serde_json, thiserror, tracing
// ============================================================================

//! ## Overview
//! This crate hosts the QFlash statement lifecycle on `SQLite`. It provides
//! the engine, its configuration, statement classification, plan rendering
//! and provisioning of the plan log table.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod classify;
pub mod config;
pub mod engine;
pub mod executor;
pub mod explain;
pub mod provision;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use classify::Classification;
pub use classify::TableRef;
pub use classify::classify;
pub use config::AttachedSchema;
pub use config::IN_MEMORY_PATH;
pub use config::MAX_IDENTIFIER_LENGTH;
pub use config::SqliteEngineConfig;
pub use config::SqliteJournalMode;
pub use config::SqliteSyncMode;
pub use config::validate_identifier;
pub use engine::SCHEMA_CATALOG_RELATION;
pub use engine::SqliteEngine;
pub use engine::SqliteEngineError;
pub use executor::QueryOutcome;
pub use executor::SqliteExecutor;
pub use executor::SqlitePrepared;
pub use executor::SqliteStatement;
pub use provision::LogRow;
pub use provision::provision_log_store;
pub use provision::read_log_rows;
pub use rusqlite::types::Value as SqlValue;
