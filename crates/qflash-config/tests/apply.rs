// crates/qflash-config/tests/apply.rs
// ============================================================================
// Module: Config Apply Tests
// Description: Applying parsed configuration onto a live session.
// Purpose: Ensure enabled configs are checked against the catalog.
// ============================================================================

//! ## Overview
//! Applies `[logging]` tables to sessions backed by a `SQLite` engine and
//! checks the resulting settings.

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

use qflash_config::ConfigError;
use qflash_config::QflashConfig;
use qflash_core::ExplainFormat;
use qflash_core::QflashSession;
use qflash_store_sqlite::SqliteEngine;
use qflash_store_sqlite::provision_log_store;

fn engine_with_log_table() -> SqliteEngine {
    let engine = SqliteEngine::open_in_memory().unwrap();
    provision_log_store(&engine, "main", "qflash").unwrap();
    engine
}

#[test]
fn apply_copies_every_setting() {
    let config = QflashConfig::from_toml(
        r#"
        [logging]
        enabled = true
        min_duration_ms = 2.5
        correlation_tag = "REQ-9"
        log_nested = true
        plan_format = "json"

        [store]
        path = ":memory:"
        "#,
    )
    .unwrap();
    let engine = engine_with_log_table();
    let session = QflashSession::new();
    config.apply(&session, &engine).unwrap();

    let settings = session.settings();
    assert!(settings.enabled());
    assert!((settings.min_duration_ms() - 2.5).abs() < f64::EPSILON);
    assert_eq!(settings.correlation_tag(), "REQ-9");
    assert_eq!(settings.target_namespace(), "main");
    assert_eq!(settings.target_relation(), "qflash");
    assert!(settings.log_nested());
    assert_eq!(settings.plan_format(), ExplainFormat::Json);
}

#[test]
fn enabled_config_with_missing_table_is_rejected() {
    let config = QflashConfig::from_toml(
        "[logging]\nenabled = true\ntarget_relation = \"missing\"\n[store]\npath = \":memory:\"\n",
    )
    .unwrap();
    let engine = engine_with_log_table();
    let session = QflashSession::new();
    let err = config.apply(&session, &engine).unwrap_err();
    assert!(matches!(err, ConfigError::Apply(_)));
    assert!(!session.settings().enabled());
}

#[test]
fn disabled_config_does_not_touch_the_catalog() {
    let config = QflashConfig::from_toml(
        "[logging]\ntarget_relation = \"not_yet_created\"\n[store]\npath = \":memory:\"\n",
    )
    .unwrap();
    let engine = SqliteEngine::open_in_memory().unwrap();
    let session = QflashSession::new();
    config.apply(&session, &engine).unwrap();
    assert!(!session.settings().enabled());
    assert_eq!(session.settings().target_relation(), "not_yet_created");
}

#[test]
fn rejected_config_keeps_the_previous_settings() {
    let engine = engine_with_log_table();
    let session = QflashSession::new();
    let good = QflashConfig::from_toml(
        "[logging]\nenabled = true\ncorrelation_tag = \"OLD\"\nmin_duration_ms = 1.0\n[store]\npath = \":memory:\"\n",
    )
    .unwrap();
    good.apply(&session, &engine).unwrap();

    let bad = QflashConfig::from_toml(
        "[logging]\nenabled = true\ncorrelation_tag = \"NEW\"\nlog_nested = true\nplan_format = \"json\"\ntarget_relation = \"missing\"\n[store]\npath = \":memory:\"\n",
    )
    .unwrap();
    let err = bad.apply(&session, &engine).unwrap_err();
    assert!(matches!(err, ConfigError::Apply(_)));

    let settings = session.settings();
    assert!(settings.enabled());
    assert_eq!(settings.correlation_tag(), "OLD");
    assert_eq!(settings.target_relation(), "qflash");
    assert!(!settings.log_nested());
    assert_eq!(settings.plan_format(), ExplainFormat::Text);
    assert!((settings.min_duration_ms() - 1.0).abs() < f64::EPSILON);
    assert!(settings.resolved().is_some());
}
