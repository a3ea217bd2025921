// crates/qflash-core/src/lib.rs
// ============================================================================
// Module: QFlash Core Library
// Description: Public API surface for the QFlash plan logger.
// Purpose: Expose core types, engine interfaces and the runtime pipeline.
// Dependencies: crate::{core, interfaces, runtime}
// ============================================================================

//! ## Overview
//! QFlash instruments a database engine's statement lifecycle. For selected
//! statements it captures the rendered execution plan, the elapsed time and
//! a caller-supplied correlation tag, and persists them through an isolated
//! side channel inside the same execution stack. It is backend-agnostic and
//! integrates through the [`Engine`] and [`ExecutorHooks`] interfaces.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod core;
pub mod interfaces;
pub mod runtime;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use crate::core::*;

pub use interfaces::Catalog;
pub use interfaces::CatalogError;
pub use interfaces::Engine;
pub use interfaces::ExecutorHooks;
pub use interfaces::ExplainError;
pub use interfaces::FacilityError;
pub use interfaces::QueryFacility;
pub use runtime::CaptureOutcome;
pub use runtime::ConfigurationError;
pub use runtime::GateInput;
pub use runtime::GateOutcome;
pub use runtime::InMemoryEngine;
pub use runtime::InstrumentationGate;
pub use runtime::NestingTracker;
pub use runtime::PlanCapture;
pub use runtime::QflashError;
pub use runtime::QflashInterceptor;
pub use runtime::QflashSession;
pub use runtime::QflashSettings;
pub use runtime::ResolvedTarget;
pub use runtime::SideChannelWriter;
pub use runtime::TargetCache;
