// crates/qflash-core/src/runtime/mod.rs
// ============================================================================
// Module: QFlash Runtime
// Description: Lifecycle interceptor, gate, capture and side-channel writer.
// Purpose: Instrument statements and persist their plans inline.
// Dependencies: crate::{core, interfaces}, tracing
// ============================================================================

//! ## Overview
//! Runtime modules implement the interception pipeline. The interceptor is
//! the only entry point an engine calls; it consults the gate, brackets
//! execution with the nesting tracker, captures the plan and hands the
//! record to the side-channel writer. An in-memory engine is provided for
//! tests and examples.

// ============================================================================
// SECTION: Submodules
// ============================================================================

pub mod capture;
pub mod error;
pub mod gate;
pub mod interceptor;
pub mod memory;
pub mod nesting;
pub mod session;
pub mod settings;
pub mod writer;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use capture::CaptureOutcome;
pub use capture::PlanCapture;
pub use capture::finalize_plan_text;
pub use error::ConfigurationError;
pub use error::QflashError;
pub use gate::GateInput;
pub use gate::GateOutcome;
pub use gate::InstrumentationGate;
pub use interceptor::QflashInterceptor;
pub use memory::CATALOG_RELATION;
pub use memory::DEFAULT_NAMESPACE;
pub use memory::FailurePoint;
pub use memory::InMemoryEngine;
pub use memory::MemoryEngineError;
pub use memory::MemoryExecutor;
pub use memory::MemoryPrepared;
pub use memory::MemoryStatement;
pub use nesting::DepthGuard;
pub use nesting::NestingTracker;
pub use session::QflashSession;
pub use settings::QflashSettings;
pub use settings::ResolvedTarget;
pub use settings::TargetCache;
pub use writer::INSERT_PARAM_TYPES;
pub use writer::SideChannelWriter;
pub use writer::insert_statement;
