// crates/qflash-core/tests/settings.rs
// ============================================================================
// Module: Settings Tests
// Description: Check/assign semantics and target cache invalidation.
// Purpose: Ensure rejected values never take effect and caching is stable.
// ============================================================================
//! ## Overview
//! Exercises [`QflashSettings`] against the in-memory catalog.

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only assertions and helpers are permitted."
)]

use qflash_core::ConfigurationError;
use qflash_core::ExplainFormat;
use qflash_core::InMemoryEngine;
use qflash_core::QflashSettings;
use qflash_core::runtime::FailurePoint;

fn engine_with_log_table() -> InMemoryEngine {
    let engine = InMemoryEngine::new();
    engine.create_relation("public", "qflash").unwrap();
    engine
}

#[test]
fn defaults_are_disabled_and_unfiltered() {
    let settings = QflashSettings::new();
    assert!(!settings.enabled());
    assert!(settings.min_duration_ms().abs() < f64::EPSILON);
    assert_eq!(settings.correlation_tag(), "");
    assert!(!settings.log_nested());
    assert_eq!(settings.plan_format(), ExplainFormat::Text);
    assert!(settings.resolved().is_none());
}

#[test]
fn names_are_accepted_unchecked_while_disabled() {
    let engine = InMemoryEngine::new();
    let mut settings = QflashSettings::new();
    settings.set_target_namespace("missing", &engine).unwrap();
    settings.set_target_relation("also_missing", &engine).unwrap();
    assert_eq!(settings.target_namespace(), "missing");
    assert_eq!(settings.target_relation(), "also_missing");
    assert!(!settings.target_cache().is_valid());
}

#[test]
fn unknown_namespace_is_rejected_while_enabled() {
    let engine = engine_with_log_table();
    let mut settings = QflashSettings::new();
    settings.set_target_namespace("public", &engine).unwrap();
    settings.set_enabled(true);

    let err = settings.set_target_namespace("nowhere", &engine).unwrap_err();
    assert_eq!(err, ConfigurationError::UnknownNamespace("nowhere".to_string()));
    assert_eq!(settings.target_namespace(), "public");
}

#[test]
fn unknown_relation_is_rejected_while_enabled() {
    let engine = engine_with_log_table();
    let mut settings = QflashSettings::new();
    settings.set_target_namespace("public", &engine).unwrap();
    settings.set_target_relation("qflash", &engine).unwrap();
    settings.set_enabled(true);

    let err = settings.set_target_relation("nothing", &engine).unwrap_err();
    assert!(matches!(err, ConfigurationError::UnknownRelation { .. }));
    assert_eq!(settings.target_relation(), "qflash");
}

#[test]
fn resolution_is_cached_and_idempotent() {
    let engine = engine_with_log_table();
    let mut settings = QflashSettings::new();
    settings.set_target_namespace("public", &engine).unwrap();
    settings.set_target_relation("qflash", &engine).unwrap();
    settings.set_enabled(true);

    let first = settings.resolve_target(&engine).unwrap().unwrap();
    engine.fail_once(FailurePoint::Catalog);
    let second = settings.resolve_target(&engine).unwrap().unwrap();
    assert_eq!(first, second);
    assert_eq!(first.relation, engine.relation("public", "qflash").unwrap());
}

#[test]
fn disabling_invalidates_the_cache() {
    let engine = engine_with_log_table();
    let mut settings = QflashSettings::new();
    settings.set_target_namespace("public", &engine).unwrap();
    settings.set_target_relation("qflash", &engine).unwrap();
    settings.set_enabled(true);
    settings.resolve_target(&engine).unwrap();
    assert!(settings.target_cache().is_valid());

    settings.set_enabled(false);
    assert!(!settings.target_cache().is_valid());
}

#[test]
fn namespace_change_drops_relation_identifier() {
    let engine = engine_with_log_table();
    engine.create_namespace("audit");
    let mut settings = QflashSettings::new();
    settings.set_target_namespace("public", &engine).unwrap();
    settings.set_target_relation("qflash", &engine).unwrap();
    settings.set_enabled(true);
    settings.resolve_target(&engine).unwrap();

    settings.set_target_namespace("audit", &engine).unwrap();
    assert!(settings.target_cache().namespace().is_some());
    assert!(settings.target_cache().relation().is_none());
    assert!(settings.resolve_target(&engine).unwrap().is_none());
}

#[test]
fn dropped_relation_is_rejected_after_invalidation() {
    let engine = engine_with_log_table();
    let mut settings = QflashSettings::new();
    settings.set_target_namespace("public", &engine).unwrap();
    settings.set_target_relation("qflash", &engine).unwrap();
    engine.drop_relation("public", "qflash").unwrap();
    settings.set_enabled(true);
    assert!(settings.resolve_target(&engine).unwrap().is_none());
}

#[test]
fn negative_threshold_is_rejected() {
    let mut settings = QflashSettings::new();
    settings.set_min_duration_ms(12.5).unwrap();
    assert!(settings.set_min_duration_ms(-1.0).is_err());
    assert!(settings.set_min_duration_ms(f64::NAN).is_err());
    assert!((settings.min_duration_ms() - 12.5).abs() < f64::EPSILON);
}

#[test]
fn catalog_failure_surfaces_as_configuration_error() {
    let engine = engine_with_log_table();
    let mut settings = QflashSettings::new();
    settings.set_enabled(true);
    engine.fail_once(FailurePoint::Catalog);
    let err = settings.set_target_namespace("public", &engine).unwrap_err();
    assert!(matches!(err, ConfigurationError::Catalog(_)));
    assert_eq!(settings.target_namespace(), "");
}
