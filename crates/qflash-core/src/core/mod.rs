// crates/qflash-core/src/core/mod.rs
// ============================================================================
// Module: QFlash Core Types
// Description: Identifiers, statement contract, instrumentation and records.
// Purpose: Provide the stable data model shared by engines and the runtime.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! Core types define the statement contract an engine exposes, the timing
//! accumulator attached to instrumented statements, explain options, and the
//! captured record persisted by the side channel.

// ============================================================================
// SECTION: Submodules
// ============================================================================

pub mod explain;
pub mod identifiers;
pub mod instrument;
pub mod record;
pub mod statement;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use explain::ExplainFormat;
pub use explain::ExplainState;
pub use identifiers::NamespaceOid;
pub use identifiers::RelationOid;
pub use instrument::Instrumentation;
pub use instrument::TriggerStats;
pub use record::Datum;
pub use record::LogRecord;
pub use record::ParamType;
pub use statement::InstrumentOptions;
pub use statement::OperationKind;
pub use statement::ScanDirection;
pub use statement::StatementContext;
