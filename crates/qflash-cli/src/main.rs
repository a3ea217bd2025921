// crates/qflash-cli/src/main.rs
// ============================================================================
// Module: QFlash CLI Entry Point
// Description: Command dispatcher for plan log provisioning and inspection.
// Purpose: Run statements through QFlash on a configured SQLite database.
// Dependencies: clap, qflash-config, qflash-core, qflash-store-sqlite, serde_json, thiserror, tracing
// ============================================================================

//! ## Overview
//! The `qflash` binary loads `qflash.toml`, opens the configured `SQLite`
//! engine and exposes three commands: `init` provisions the plan log table,
//! `exec` runs statements with plan logging installed, and `show` prints the
//! most recent log rows. Diagnostics go to stderr through `tracing`; results
//! go to stdout.

// ============================================================================
// SECTION: Modules
// ============================================================================

#[cfg(test)]
mod main_tests;

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use std::rc::Rc;

use clap::Args;
use clap::Parser;
use clap::Subcommand;
use qflash_config::QflashConfig;
use qflash_core::QflashSession;
use qflash_store_sqlite::LogRow;
use qflash_store_sqlite::QueryOutcome;
use qflash_store_sqlite::SqlValue;
use qflash_store_sqlite::SqliteEngine;
use qflash_store_sqlite::provision_log_store;
use qflash_store_sqlite::read_log_rows;
use serde_json::Map;
use serde_json::Number;
use serde_json::Value;
use thiserror::Error;
use tracing::debug;
use tracing::info;
use tracing_subscriber::EnvFilter;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Log filter used when neither `--log-level` nor `RUST_LOG` is set.
const DEFAULT_LOG_FILTER: &str = "warn";
/// Default number of rows printed by `show`.
const DEFAULT_SHOW_LIMIT: u32 = 20;

// ============================================================================
// SECTION: CLI Types
// ============================================================================

/// Top-level CLI parser.
#[derive(Parser, Debug)]
#[command(
    name = "qflash",
    version,
    about = "Statement plan logger for SQLite",
    disable_help_subcommand = true
)]
struct Cli {
    /// Config file path (defaults to `QFLASH_CONFIG`, then `./qflash.toml`).
    #[arg(long, value_name = "PATH", global = true)]
    config: Option<PathBuf>,
    /// Log filter directive; overrides `RUST_LOG`.
    #[arg(long, value_name = "FILTER", global = true)]
    log_level: Option<String>,
    /// Selected subcommand.
    #[command(subcommand)]
    command: Commands,
}

/// Supported subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Create the plan log table named by the config.
    Init,
    /// Execute statements with plan logging installed.
    Exec(ExecCommand),
    /// Print the most recent plan log rows.
    Show(ShowCommand),
}

/// Arguments for `exec`.
#[derive(Args, Debug)]
struct ExecCommand {
    /// SQL statements, executed in order.
    #[arg(required = true, value_name = "SQL")]
    statements: Vec<String>,
    /// Forces plan logging on regardless of the config.
    #[arg(long)]
    enable: bool,
    /// Overrides the correlation tag.
    #[arg(long, value_name = "TAG")]
    tag: Option<String>,
}

/// Arguments for `show`.
#[derive(Args, Debug)]
struct ShowCommand {
    /// Number of rows to print.
    #[arg(long, default_value_t = DEFAULT_SHOW_LIMIT)]
    limit: u32,
    /// Prints each row as a JSON object.
    #[arg(long)]
    json: bool,
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// CLI error wrapper carrying a rendered message.
#[derive(Debug, Error)]
#[error("{message}")]
struct CliError {
    /// Rendered error message.
    message: String,
}

impl CliError {
    /// Creates a CLI error from a message.
    const fn new(message: String) -> Self {
        Self { message }
    }
}

/// Result alias for CLI operations.
type CliResult<T> = Result<T, CliError>;

// ============================================================================
// SECTION: Entry Point
// ============================================================================

/// CLI entry point returning an exit code.
fn main() -> ExitCode {
    match run() {
        Ok(code) => code,
        Err(err) => emit_error(&err.to_string()),
    }
}

/// Parses arguments and dispatches the selected command.
fn run() -> CliResult<ExitCode> {
    let cli = Cli::parse();
    init_logging(cli.log_level.as_deref())?;
    let config = QflashConfig::load(cli.config.as_deref())
        .map_err(|err| CliError::new(err.to_string()))?;
    match cli.command {
        Commands::Init => command_init(&config),
        Commands::Exec(command) => command_exec(config, command),
        Commands::Show(command) => command_show(&config, &command),
    }
}

/// Installs the stderr `tracing` subscriber.
fn init_logging(level: Option<&str>) -> CliResult<()> {
    let filter = build_filter(level)?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|err| CliError::new(format!("failed to initialize logging: {err}")))
}

/// Builds the log filter from the flag, `RUST_LOG`, or the default.
fn build_filter(level: Option<&str>) -> CliResult<EnvFilter> {
    match level {
        Some(directive) => EnvFilter::try_new(directive)
            .map_err(|err| CliError::new(format!("invalid log filter {directive}: {err}"))),
        None => Ok(EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER))),
    }
}

// ============================================================================
// SECTION: Commands
// ============================================================================

/// Provisions the configured log table.
fn command_init(config: &QflashConfig) -> CliResult<ExitCode> {
    let engine = open_engine(config)?;
    let logging = &config.logging;
    provision_log_store(&engine, &logging.target_namespace, &logging.target_relation)
        .map_err(|err| CliError::new(err.to_string()))?;
    info!(
        namespace = %logging.target_namespace,
        relation = %logging.target_relation,
        "plan log table provisioned"
    );
    write_stdout_line(&format!(
        "provisioned {}.{}",
        logging.target_namespace, logging.target_relation
    ))
    .map_err(|err| CliError::new(output_error("stdout", &err)))?;
    Ok(ExitCode::SUCCESS)
}

/// Executes statements with the QFlash layer installed.
fn command_exec(mut config: QflashConfig, command: ExecCommand) -> CliResult<ExitCode> {
    if command.enable {
        config.logging.enabled = true;
    }
    if let Some(tag) = command.tag {
        config.logging.correlation_tag = tag;
    }
    let engine = open_engine(&config)?;
    let session = Rc::new(QflashSession::new());
    config.apply(&session, &engine).map_err(|err| CliError::new(err.to_string()))?;
    engine.install_qflash(Rc::clone(&session)).map_err(|err| CliError::new(err.to_string()))?;
    for sql in &command.statements {
        debug!(sql = %sql, "executing statement");
        let outcome = engine.execute(sql).map_err(|err| CliError::new(err.to_string()))?;
        for line in render_outcome(&outcome) {
            write_stdout_line(&line).map_err(|err| CliError::new(output_error("stdout", &err)))?;
        }
    }
    Ok(ExitCode::SUCCESS)
}

/// Prints the most recent log rows.
fn command_show(config: &QflashConfig, command: &ShowCommand) -> CliResult<ExitCode> {
    let engine = open_engine(config)?;
    let logging = &config.logging;
    let rows =
        read_log_rows(&engine, &logging.target_namespace, &logging.target_relation, command.limit)
            .map_err(|err| CliError::new(err.to_string()))?;
    for row in &rows {
        let rendered = if command.json {
            serde_json::to_string(row).map_err(|err| CliError::new(err.to_string()))?
        } else {
            render_log_row(row)
        };
        write_stdout_line(&rendered)
            .map_err(|err| CliError::new(output_error("stdout", &err)))?;
    }
    Ok(ExitCode::SUCCESS)
}

/// Opens the configured engine.
fn open_engine(config: &QflashConfig) -> CliResult<SqliteEngine> {
    SqliteEngine::open(&config.store).map_err(|err| CliError::new(err.to_string()))
}

// ============================================================================
// SECTION: Rendering
// ============================================================================

/// Renders a statement outcome as JSON lines, one per row.
///
/// Statements without result columns render a single `changes` object.
fn render_outcome(outcome: &QueryOutcome) -> Vec<String> {
    if outcome.columns.is_empty() {
        let mut object = Map::new();
        object.insert("changes".to_string(), Value::from(outcome.changes));
        return vec![Value::Object(object).to_string()];
    }
    outcome
        .rows
        .iter()
        .map(|row| {
            let object: Map<String, Value> = outcome
                .columns
                .iter()
                .cloned()
                .zip(row.iter().map(sql_value_to_json))
                .collect();
            Value::Object(object).to_string()
        })
        .collect()
}

/// Converts a `SQLite` value to JSON. Blobs render as lowercase hex.
fn sql_value_to_json(value: &SqlValue) -> Value {
    match value {
        SqlValue::Null => Value::Null,
        SqlValue::Integer(number) => Value::from(*number),
        SqlValue::Real(number) => Number::from_f64(*number).map_or(Value::Null, Value::Number),
        SqlValue::Text(text) => Value::String(text.clone()),
        SqlValue::Blob(bytes) => {
            Value::String(bytes.iter().map(|byte| format!("{byte:02x}")).collect())
        }
    }
}

/// Renders a log row for terminal display.
fn render_log_row(row: &LogRow) -> String {
    let total_time =
        row.total_time.map_or_else(|| "-".to_string(), |time| format!("{time:.3} ms"));
    let hash = row.hash.as_deref().unwrap_or("-");
    let mut rendered = format!("#{} {} total_time={total_time} hash={hash}", row.id, row.added);
    if let Some(query) = &row.query {
        rendered.push_str("\n  query: ");
        rendered.push_str(query);
    }
    if let Some(plan) = &row.plan {
        for line in plan.lines() {
            rendered.push_str("\n    ");
            rendered.push_str(line);
        }
    }
    rendered
}

// ============================================================================
// SECTION: Output Helpers
// ============================================================================

/// Writes a line to stdout.
fn write_stdout_line(message: &str) -> std::io::Result<()> {
    let mut stdout = std::io::stdout();
    writeln!(&mut stdout, "{message}")
}

/// Writes a line to stderr.
fn write_stderr_line(message: &str) -> std::io::Result<()> {
    let mut stderr = std::io::stderr();
    writeln!(&mut stderr, "{message}")
}

/// Emits an error message and returns a failure exit code.
fn emit_error(message: &str) -> ExitCode {
    let _ = write_stderr_line(message);
    ExitCode::FAILURE
}

/// Formats an output failure for a named stream.
fn output_error(stream: &str, err: &std::io::Error) -> String {
    format!("failed to write {stream}: {err}")
}
