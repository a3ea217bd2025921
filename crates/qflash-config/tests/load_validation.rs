//! Config load validation tests for qflash-config.
// crates/qflash-config/tests/load_validation.rs
// =============================================================================
// Module: Config Load Validation Tests
// Description: Validate config loading guards (path, size, encoding, fields).
// Purpose: Ensure config input handling is strict and fail-closed.
// =============================================================================

use std::io::Write;
use std::path::Path;

use qflash_config::ConfigError;
use qflash_config::QflashConfig;
use qflash_core::ExplainFormat;
use tempfile::NamedTempFile;

type TestResult = Result<(), String>;

const MINIMAL: &str = r#"
[store]
path = ":memory:"
"#;

fn assert_invalid(result: Result<QflashConfig, ConfigError>, needle: &str) -> TestResult {
    match result {
        Err(error) => {
            let message = error.to_string();
            if message.contains(needle) {
                Ok(())
            } else {
                Err(format!("error {message} did not contain {needle}"))
            }
        }
        Ok(_) => Err("expected invalid config load".to_string()),
    }
}

fn write_config(content: &[u8]) -> Result<NamedTempFile, String> {
    let mut file = NamedTempFile::new().map_err(|err| err.to_string())?;
    file.write_all(content).map_err(|err| err.to_string())?;
    Ok(file)
}

#[test]
fn load_rejects_path_too_long() -> TestResult {
    let long_path = "a".repeat(5_000);
    assert_invalid(QflashConfig::load(Some(Path::new(&long_path))), "config path exceeds max length")
}

#[test]
fn load_rejects_path_component_too_long() -> TestResult {
    let long_component = "a".repeat(300);
    assert_invalid(
        QflashConfig::load(Some(Path::new(&long_component))),
        "config path component too long",
    )
}

#[test]
fn load_rejects_oversized_file() -> TestResult {
    let file = write_config(&vec![b'a'; 1_048_577])?;
    assert_invalid(QflashConfig::load(Some(file.path())), "config file exceeds size limit")
}

#[test]
fn load_rejects_non_utf8_file() -> TestResult {
    let file = write_config(&[0xFF, 0xFE, 0xFF])?;
    assert_invalid(QflashConfig::load(Some(file.path())), "config file must be utf-8")
}

#[test]
fn load_reports_missing_file_as_io() -> TestResult {
    match QflashConfig::load(Some(Path::new("does-not-exist/qflash.toml"))) {
        Err(ConfigError::Io(_)) => Ok(()),
        Err(other) => Err(format!("expected io error, got {other}")),
        Ok(_) => Err("expected missing file to fail".to_string()),
    }
}

#[test]
fn load_applies_defaults() -> TestResult {
    let file = write_config(MINIMAL.as_bytes())?;
    let config = QflashConfig::load(Some(file.path())).map_err(|err| err.to_string())?;
    if config.logging.enabled {
        return Err("logging should default to disabled".to_string());
    }
    if config.logging.target_namespace != "main" || config.logging.target_relation != "qflash" {
        return Err("unexpected default target".to_string());
    }
    if config.logging.plan_format != ExplainFormat::Text {
        return Err("plan format should default to text".to_string());
    }
    Ok(())
}

#[test]
fn parse_reads_every_logging_field() -> TestResult {
    let config = QflashConfig::from_toml(
        r#"
        [logging]
        enabled = true
        min_duration_ms = 12.5
        correlation_tag = "REQ-7"
        target_namespace = "logs"
        target_relation = "plans"
        log_nested = true
        plan_format = "json"

        [store]
        path = ":memory:"
        journal_mode = "delete"
        sync_mode = "normal"

        [[store.attach]]
        name = "logs"
        path = ":memory:"
        "#,
    )
    .map_err(|err| err.to_string())?;
    let logging = &config.logging;
    let matches = logging.enabled
        && (logging.min_duration_ms - 12.5).abs() < f64::EPSILON
        && logging.correlation_tag == "REQ-7"
        && logging.target_namespace == "logs"
        && logging.target_relation == "plans"
        && logging.log_nested
        && logging.plan_format == ExplainFormat::Json
        && config.store.attach.len() == 1;
    if matches { Ok(()) } else { Err("unexpected logging config".to_string()) }
}

#[test]
fn parse_rejects_unknown_keys() -> TestResult {
    assert_invalid(
        QflashConfig::from_toml("[logging]\nenable = true\n[store]\npath = \":memory:\"\n"),
        "config parse error",
    )
}

#[test]
fn parse_requires_store() -> TestResult {
    assert_invalid(QflashConfig::from_toml("[logging]\nenabled = false\n"), "config parse error")
}

#[test]
fn validate_rejects_negative_threshold() -> TestResult {
    assert_invalid(
        QflashConfig::from_toml("[logging]\nmin_duration_ms = -1.0\n[store]\npath = \":memory:\"\n"),
        "min_duration_ms",
    )
}

#[test]
fn validate_rejects_unsafe_relation_name() -> TestResult {
    assert_invalid(
        QflashConfig::from_toml(
            "[logging]\ntarget_relation = \"plans; DROP\"\n[store]\npath = \":memory:\"\n",
        ),
        "logging.target_relation",
    )
}

#[test]
fn validate_rejects_reserved_attach_name() -> TestResult {
    assert_invalid(
        QflashConfig::from_toml(
            "[store]\npath = \":memory:\"\n[[store.attach]]\nname = \"temp\"\npath = \":memory:\"\n",
        ),
        "reserved",
    )
}
