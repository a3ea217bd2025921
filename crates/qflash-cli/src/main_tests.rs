// crates/qflash-cli/src/main_tests.rs
// ============================================================================
// Module: CLI Main Helpers Tests
// Description: Unit tests for argument parsing and output rendering.
// Purpose: Keep the CLI surface and its stdout format stable.
// Dependencies: qflash-cli main helpers
// ============================================================================

//! ## Overview
//! Exercises clap parsing, log filter selection, outcome and log row
//! rendering, and a file-backed init/exec/show round through the helpers.

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
    reason = "Test-only output and panic-based assertions are permitted."
)]

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::rc::Rc;

use clap::Parser;
use qflash_config::QflashConfig;
use qflash_core::QflashSession;
use qflash_store_sqlite::LogRow;
use qflash_store_sqlite::QueryOutcome;
use qflash_store_sqlite::SqlValue;
use qflash_store_sqlite::provision_log_store;
use qflash_store_sqlite::read_log_rows;
use tempfile::TempDir;

use super::Cli;
use super::Commands;
use super::build_filter;
use super::open_engine;
use super::render_log_row;
use super::render_outcome;
use super::sql_value_to_json;

// ============================================================================
// SECTION: Helpers
// ============================================================================

fn file_config(dir: &TempDir) -> QflashConfig {
    let db = dir.path().join("qflash.db");
    QflashConfig::from_toml(&format!(
        "[logging]\nenabled = true\ncorrelation_tag = \"cli\"\n[store]\npath = \"{}\"\n",
        db.display().to_string().replace('\\', "/")
    ))
    .unwrap()
}

// ============================================================================
// SECTION: Parsing
// ============================================================================

#[test]
fn exec_parses_statements_and_overrides() {
    let cli = Cli::try_parse_from([
        "qflash",
        "--config",
        "custom.toml",
        "exec",
        "--enable",
        "--tag",
        "REQ-1",
        "SELECT 1",
        "SELECT 2",
    ])
    .unwrap();
    assert_eq!(cli.config.unwrap().to_str(), Some("custom.toml"));
    let Commands::Exec(command) = cli.command else {
        panic!("expected exec command");
    };
    assert!(command.enable);
    assert_eq!(command.tag.as_deref(), Some("REQ-1"));
    assert_eq!(command.statements, vec!["SELECT 1".to_string(), "SELECT 2".to_string()]);
}

#[test]
fn exec_requires_a_statement() {
    assert!(Cli::try_parse_from(["qflash", "exec"]).is_err());
}

#[test]
fn show_defaults_limit() {
    let cli = Cli::try_parse_from(["qflash", "show", "--log-level", "debug"]).unwrap();
    assert_eq!(cli.log_level.as_deref(), Some("debug"));
    let Commands::Show(command) = cli.command else {
        panic!("expected show command");
    };
    assert_eq!(command.limit, 20);
    assert!(!command.json);
}

#[test]
fn invalid_log_filter_is_rejected() {
    assert!(build_filter(Some("qflash=[")).is_err());
    assert!(build_filter(Some("qflash_store_sqlite=debug")).is_ok());
}

// ============================================================================
// SECTION: Rendering
// ============================================================================

#[test]
fn row_outcomes_render_one_json_object_per_row() {
    let outcome = QueryOutcome {
        columns: vec!["id".to_string(), "name".to_string()],
        rows: vec![
            vec![SqlValue::Integer(1), SqlValue::Text("ada".to_string())],
            vec![SqlValue::Integer(2), SqlValue::Null],
        ],
        changes: 0,
    };
    assert_eq!(
        render_outcome(&outcome),
        vec![r#"{"id":1,"name":"ada"}"#.to_string(), r#"{"id":2,"name":null}"#.to_string()]
    );
}

#[test]
fn statements_without_columns_render_changes() {
    let outcome = QueryOutcome { columns: Vec::new(), rows: Vec::new(), changes: 3 };
    assert_eq!(render_outcome(&outcome), vec![r#"{"changes":3}"#.to_string()]);
}

#[test]
fn sql_values_map_to_json() {
    assert_eq!(sql_value_to_json(&SqlValue::Real(1.5)), serde_json::json!(1.5));
    assert_eq!(sql_value_to_json(&SqlValue::Real(f64::NAN)), serde_json::Value::Null);
    assert_eq!(sql_value_to_json(&SqlValue::Blob(vec![0x0a, 0xff])), serde_json::json!("0aff"));
}

#[test]
fn log_rows_render_plan_indented() {
    let row = LogRow {
        id: 7,
        added: "2024-01-01T00:00:00.000Z".to_string(),
        query: Some("SELECT 1".to_string()),
        plan: Some("QUERY PLAN\n`--SCAN t".to_string()),
        total_time: Some(1.25),
        hash: None,
    };
    assert_eq!(
        render_log_row(&row),
        "#7 2024-01-01T00:00:00.000Z total_time=1.250 ms hash=-\n  query: SELECT 1\n    \
         QUERY PLAN\n    `--SCAN t"
    );
}

// ============================================================================
// SECTION: File-Backed Flow
// ============================================================================

#[test]
fn provisioned_store_collects_rows_across_engines() {
    let dir = TempDir::new().unwrap();
    let config = file_config(&dir);
    {
        let engine = open_engine(&config).unwrap();
        provision_log_store(&engine, "main", "qflash").unwrap();
    }
    {
        let engine = open_engine(&config).unwrap();
        let session = Rc::new(QflashSession::new());
        config.apply(&session, &engine).unwrap();
        engine.install_qflash(session).unwrap();
        let outcome = engine.execute("SELECT 40 + 2 AS answer").unwrap();
        assert_eq!(render_outcome(&outcome), vec![r#"{"answer":42}"#.to_string()]);
    }
    let engine = open_engine(&config).unwrap();
    let rows = read_log_rows(&engine, "main", "qflash", 20).unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].query.as_deref(), Some("SELECT 40 + 2 AS answer"));
    assert_eq!(rows[0].hash.as_deref(), Some("cli"));
}
