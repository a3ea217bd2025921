// crates/qflash-core/tests/lifecycle.rs
// ============================================================================
// Module: Lifecycle Interceptor Tests
// Description: End-to-end statement lifecycles on the in-memory engine.
// Purpose: Validate gating, nesting, capture, side-channel writes and unwinding.
// ============================================================================
//! ## Overview
//! Drives scripted statements through the installed interceptor chain and
//! inspects the rows written into the log relation.

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

use std::cell::Cell;
use std::rc::Rc;
use std::time::Duration;

use qflash_core::Datum;
use qflash_core::Engine;
use qflash_core::ExecutorHooks;
use qflash_core::ExplainFormat;
use qflash_core::InMemoryEngine;
use qflash_core::OperationKind;
use qflash_core::QflashError;
use qflash_core::QflashSession;
use qflash_core::RelationOid;
use qflash_core::ScanDirection;
use qflash_core::runtime::CATALOG_RELATION;
use qflash_core::runtime::FailurePoint;
use qflash_core::runtime::MemoryEngineError;
use qflash_core::runtime::insert_statement;

// ============================================================================
// SECTION: Fixtures
// ============================================================================

struct Fixture {
    engine: InMemoryEngine,
    session: Rc<QflashSession>,
    log: RelationOid,
    users: RelationOid,
    audit: RelationOid,
}

fn fixture(tag: &str, log_nested: bool) -> Fixture {
    let engine = InMemoryEngine::new();
    let log = engine.create_relation("public", "qflash").unwrap();
    let users = engine.create_relation("public", "users").unwrap();
    let audit = engine.create_relation("public", "audit").unwrap();
    let session = Rc::new(QflashSession::new());
    session.set_target_namespace("public", &engine).unwrap();
    session.set_target_relation("qflash", &engine).unwrap();
    session.set_enabled(true);
    session.set_correlation_tag(tag);
    session.set_log_nested(log_nested);
    engine.install_qflash(Rc::clone(&session)).unwrap();

    engine.define_statement("SELECT 1", OperationKind::Select, &[], Duration::from_millis(1));
    engine.define_statement(
        "UPDATE users SET active = true",
        OperationKind::Update,
        &[users],
        Duration::from_millis(2),
    );
    engine.define_statement(
        "INSERT INTO audit VALUES (1)",
        OperationKind::Insert,
        &[audit],
        Duration::from_millis(1),
    );
    engine.add_trigger(
        "users_audit",
        users,
        OperationKind::Update,
        "INSERT INTO audit VALUES (1)",
    );
    Fixture {
        engine,
        session,
        log,
        users,
        audit,
    }
}

fn text(datum: &Datum) -> &str {
    datum.as_text().unwrap()
}

fn total_time(datum: &Datum) -> f64 {
    let Datum::Float8(value) = datum else {
        panic!("total_time is not a float: {datum:?}");
    };
    *value
}

fn assert_balanced(fixture: &Fixture) {
    assert_eq!(fixture.session.depth(), 0);
    assert_eq!(fixture.session.side_channel_marker(), 0);
    assert_eq!(fixture.engine.frame_count(), 1);
}

// ============================================================================
// SECTION: Scenarios
// ============================================================================

#[test]
fn trivial_read_is_logged_once_with_tag() {
    let fixture = fixture("REQ-1", false);
    fixture.engine.execute("SELECT 1").unwrap();

    let rows = fixture.engine.rows(fixture.log);
    assert_eq!(rows.len(), 1);
    let row = &rows[0];
    assert_eq!(text(&row[0]), "SELECT 1");
    assert!(!text(&row[1]).is_empty());
    assert!(total_time(&row[2]) >= 0.0);
    assert_eq!(text(&row[3]), "REQ-1");
    assert_balanced(&fixture);
}

#[test]
fn disabled_logging_writes_nothing() {
    let fixture = fixture("REQ-1", true);
    fixture.session.set_enabled(false);
    fixture.engine.execute("SELECT 1").unwrap();
    fixture.engine.execute("UPDATE users SET active = true").unwrap();
    assert!(fixture.engine.rows(fixture.log).is_empty());
    assert_balanced(&fixture);
}

#[test]
fn nested_statement_is_skipped_without_nested_logging() {
    let fixture = fixture("", false);
    fixture.engine.execute("UPDATE users SET active = true").unwrap();

    let rows = fixture.engine.rows(fixture.log);
    assert_eq!(rows.len(), 1);
    assert_eq!(text(&rows[0][0]), "UPDATE users SET active = true");
    assert_eq!(fixture.engine.rows(fixture.audit).len(), 0);
    assert_balanced(&fixture);
}

#[test]
fn nested_statement_is_logged_with_nested_logging() {
    let fixture = fixture("", true);
    fixture.engine.execute("UPDATE users SET active = true").unwrap();

    let rows = fixture.engine.rows(fixture.log);
    assert_eq!(rows.len(), 2);
    assert_eq!(text(&rows[0][0]), "INSERT INTO audit VALUES (1)");
    assert_eq!(text(&rows[1][0]), "UPDATE users SET active = true");
    assert!((total_time(&rows[0][2]) - 1.0).abs() < 1e-9);
    assert!((total_time(&rows[1][2]) - 3.0).abs() < 1e-9);
    assert_balanced(&fixture);
}

#[test]
fn empty_tag_is_stored_as_null() {
    let fixture = fixture("", false);
    fixture.engine.execute("SELECT 1").unwrap();
    let rows = fixture.engine.rows(fixture.log);
    assert!(rows[0][3].is_null());
}

#[test]
fn duration_equal_to_threshold_is_filtered() {
    let fixture = fixture("", false);
    fixture.session.set_min_duration_ms(5.0).unwrap();
    fixture.engine.define_statement(
        "SELECT at_threshold",
        OperationKind::Select,
        &[fixture.users],
        Duration::from_millis(5),
    );
    fixture.engine.define_statement(
        "SELECT above_threshold",
        OperationKind::Select,
        &[fixture.users],
        Duration::from_micros(5_001),
    );

    fixture.engine.execute("SELECT at_threshold").unwrap();
    assert!(fixture.engine.rows(fixture.log).is_empty());

    fixture.engine.execute("SELECT above_threshold").unwrap();
    let rows = fixture.engine.rows(fixture.log);
    assert_eq!(rows.len(), 1);
    assert_eq!(text(&rows[0][0]), "SELECT above_threshold");
}

#[test]
fn unloggable_operation_is_not_instrumented() {
    let fixture = fixture("", false);
    fixture.engine.define_statement(
        "VACUUM users",
        OperationKind::Other,
        &[fixture.users],
        Duration::from_millis(3),
    );
    fixture.engine.execute("VACUUM users").unwrap();
    assert!(fixture.engine.rows(fixture.log).is_empty());
}

#[test]
fn unresolved_target_disables_logging_silently() {
    let fixture = fixture("", false);
    fixture.session.set_enabled(false);
    fixture.session.set_target_relation("missing", &fixture.engine).unwrap();
    fixture.session.set_enabled(true);
    fixture.engine.execute("SELECT 1").unwrap();
    assert!(fixture.engine.rows(fixture.log).is_empty());
}

// ============================================================================
// SECTION: Recursion Guard
// ============================================================================

#[test]
fn log_insert_never_logs_itself() {
    let fixture = fixture("", true);
    fixture.engine.execute("SELECT 1").unwrap();
    assert_eq!(fixture.engine.rows(fixture.log).len(), 1);
    assert_balanced(&fixture);
}

#[test]
fn statements_on_log_or_catalog_relation_are_not_logged() {
    let fixture = fixture("", true);
    let insert = insert_statement("public", "qflash");
    fixture.engine.define_statement(
        &insert,
        OperationKind::Insert,
        &[fixture.log],
        Duration::from_millis(1),
    );
    fixture.engine.define_statement(
        "SELECT relname FROM catalog",
        OperationKind::Select,
        &[CATALOG_RELATION, fixture.users],
        Duration::from_millis(1),
    );
    fixture.engine.execute(&insert).unwrap();
    fixture.engine.execute("SELECT relname FROM catalog").unwrap();
    assert!(fixture.engine.rows(fixture.log).is_empty());
}

// ============================================================================
// SECTION: Plan Rendering
// ============================================================================

#[test]
fn text_plan_has_no_trailing_newline() {
    let fixture = fixture("", false);
    fixture.engine.execute("SELECT 1").unwrap();
    let rows = fixture.engine.rows(fixture.log);
    let plan = text(&rows[0][1]);
    assert!(plan.starts_with("Scripted select"));
    assert!(plan.contains("Query: SELECT 1"));
    assert!(!plan.ends_with('\n'));
}

#[test]
fn json_plan_is_a_single_object_with_triggers() {
    let fixture = fixture("", false);
    fixture.session.set_plan_format(ExplainFormat::Json);
    fixture.engine.execute("UPDATE users SET active = true").unwrap();

    let rows = fixture.engine.rows(fixture.log);
    let plan: serde_json::Value = serde_json::from_str(text(&rows[0][1])).unwrap();
    assert_eq!(plan["Plan"]["Operation"], "update");
    assert_eq!(plan["Triggers"][0]["Trigger Name"], "users_audit");
    assert!(plan["Execution Time"].is_number());
}

// ============================================================================
// SECTION: Failure Unwinding
// ============================================================================

#[test]
fn run_failure_restores_depth_and_skips_logging() {
    let fixture = fixture("", true);
    fixture.engine.fail_once(FailurePoint::Run);
    let err = fixture.engine.execute("SELECT 1").unwrap_err();
    assert!(matches!(err, MemoryEngineError::Injected(FailurePoint::Run)));
    assert!(fixture.engine.rows(fixture.log).is_empty());
    assert_balanced(&fixture);

    fixture.engine.execute("SELECT 1").unwrap();
    assert_eq!(fixture.engine.rows(fixture.log).len(), 1);
}

#[test]
fn connect_failure_is_reported() {
    let fixture = fixture("", false);
    fixture.engine.fail_once(FailurePoint::Connect);
    let err = fixture.engine.execute("SELECT 1").unwrap_err();
    assert!(matches!(err, MemoryEngineError::Qflash(QflashError::StorageConnect(_))));
    assert_balanced(&fixture);
}

#[test]
fn prepare_failure_is_reported_and_connection_closed() {
    let fixture = fixture("", false);
    fixture.engine.fail_once(FailurePoint::Prepare);
    let err = fixture.engine.execute("SELECT 1").unwrap_err();
    assert!(matches!(err, MemoryEngineError::Qflash(QflashError::StoragePrepare { .. })));
    assert_balanced(&fixture);

    fixture.engine.execute("SELECT 1").unwrap();
    assert_eq!(fixture.engine.rows(fixture.log).len(), 1);
}

#[test]
fn dropped_log_relation_fails_the_statement() {
    let fixture = fixture("", false);
    fixture.engine.execute("SELECT 1").unwrap();
    fixture.engine.drop_relation("public", "qflash").unwrap();

    let err = fixture.engine.execute("SELECT 1").unwrap_err();
    let MemoryEngineError::Qflash(QflashError::StorageExec {
        sql,
        query,
        ..
    }) = err
    else {
        panic!("unexpected error: {err}");
    };
    assert_eq!(sql, insert_statement("public", "qflash"));
    assert_eq!(query, "SELECT 1");
    assert_balanced(&fixture);
}

#[test]
fn nested_write_failure_unwinds_pushed_context() {
    let fixture = fixture("", true);
    fixture.engine.fail_once(FailurePoint::Execute);
    let err = fixture.engine.execute("UPDATE users SET active = true").unwrap_err();
    assert!(err.to_string().contains("qflash execute failed"));
    assert_balanced(&fixture);

    fixture.engine.execute("UPDATE users SET active = true").unwrap();
    assert_eq!(fixture.engine.rows(fixture.log).len(), 2);
    assert_balanced(&fixture);
}

#[test]
fn context_push_failure_is_a_context_error() {
    let fixture = fixture("", true);
    fixture.engine.fail_once(FailurePoint::PushContext);
    let err = fixture.engine.execute("UPDATE users SET active = true").unwrap_err();
    assert!(err.to_string().contains("side-channel context"));
    assert_balanced(&fixture);
}

#[test]
fn plan_render_failure_skips_the_write_but_not_the_statement() {
    let fixture = fixture("", false);
    fixture.engine.fail_once(FailurePoint::Explain);
    fixture.engine.execute("SELECT 1").unwrap();
    assert!(fixture.engine.rows(fixture.log).is_empty());
    assert_balanced(&fixture);

    fixture.engine.execute("SELECT 1").unwrap();
    assert_eq!(fixture.engine.rows(fixture.log).len(), 1);
}

#[test]
fn excluded_operations_never_consult_the_catalog() {
    let fixture = fixture("", false);
    fixture.engine.define_statement(
        "CREATE INDEX users_active ON users (active)",
        OperationKind::Other,
        &[fixture.users],
        Duration::from_millis(1),
    );
    fixture.engine.fail_once(FailurePoint::Catalog);
    fixture.engine.execute("CREATE INDEX users_active ON users (active)").unwrap();

    let err = fixture.engine.execute("SELECT 1").unwrap_err();
    assert!(matches!(err, MemoryEngineError::Qflash(QflashError::Catalog(_))));
    assert_balanced(&fixture);
}

#[test]
fn log_failure_wins_when_restoring_the_context_also_fails() {
    let fixture = fixture("", true);
    fixture.engine.fail_once(FailurePoint::Execute);
    fixture.engine.fail_once(FailurePoint::PopContext);
    fixture.engine.fail_once(FailurePoint::PopContext);
    let err = fixture.engine.execute("UPDATE users SET active = true").unwrap_err();
    assert!(err.to_string().contains("qflash execute failed"));
    assert_eq!(fixture.session.side_channel_marker(), 1);

    fixture.engine.fail_once(FailurePoint::PopContext);
    fixture.engine.fail_once(FailurePoint::PopContext);
    let err = fixture.engine.execute("SELECT 1").unwrap_err();
    assert!(matches!(err, MemoryEngineError::Qflash(QflashError::Context(_))));
    assert_eq!(fixture.session.side_channel_marker(), 1);

    fixture.engine.execute("SELECT 1").unwrap();
    assert_eq!(fixture.engine.rows(fixture.log).len(), 1);
    assert_balanced(&fixture);
}

// ============================================================================
// SECTION: Chain Composition
// ============================================================================

struct CountingLayer {
    next: Box<dyn ExecutorHooks<InMemoryEngine>>,
    ends: Rc<Cell<u32>>,
}

impl ExecutorHooks<InMemoryEngine> for CountingLayer {
    fn into_inner(
        self: Box<Self>,
    ) -> Result<Box<dyn ExecutorHooks<InMemoryEngine>>, Box<dyn ExecutorHooks<InMemoryEngine>>>
    {
        Ok(self.next)
    }

    fn begin(
        &self,
        engine: &InMemoryEngine,
        stmt: &mut <InMemoryEngine as Engine>::Statement,
    ) -> Result<(), MemoryEngineError> {
        self.next.begin(engine, stmt)
    }

    fn run(
        &self,
        engine: &InMemoryEngine,
        stmt: &mut <InMemoryEngine as Engine>::Statement,
        direction: ScanDirection,
        count: u64,
    ) -> Result<(), MemoryEngineError> {
        self.next.run(engine, stmt, direction, count)
    }

    fn finish(
        &self,
        engine: &InMemoryEngine,
        stmt: &mut <InMemoryEngine as Engine>::Statement,
    ) -> Result<(), MemoryEngineError> {
        self.next.finish(engine, stmt)
    }

    fn end(
        &self,
        engine: &InMemoryEngine,
        stmt: &mut <InMemoryEngine as Engine>::Statement,
    ) -> Result<(), MemoryEngineError> {
        self.ends.set(self.ends.get() + 1);
        self.next.end(engine, stmt)
    }
}

#[test]
fn uninstall_restores_previous_chain() {
    let engine = InMemoryEngine::new();
    let log = engine.create_relation("public", "qflash").unwrap();
    engine.define_statement("SELECT 1", OperationKind::Select, &[], Duration::from_millis(1));
    let ends = Rc::new(Cell::new(0));
    let counter = Rc::clone(&ends);
    engine
        .push_layer(|next| {
            Box::new(CountingLayer {
                next,
                ends: counter,
            })
        })
        .unwrap();

    let session = Rc::new(QflashSession::new());
    session.set_target_namespace("public", &engine).unwrap();
    session.set_target_relation("qflash", &engine).unwrap();
    session.set_enabled(true);
    engine.install_qflash(Rc::clone(&session)).unwrap();

    engine.execute("SELECT 1").unwrap();
    assert_eq!(engine.rows(log).len(), 1);
    assert_eq!(ends.get(), 2, "outer statement and the log insert both reach the inner layer");

    assert!(engine.pop_layer().unwrap());
    engine.execute("SELECT 1").unwrap();
    assert_eq!(engine.rows(log).len(), 1);
    assert_eq!(ends.get(), 3);

    assert!(engine.pop_layer().unwrap());
    assert!(!engine.pop_layer().unwrap());
    engine.execute("SELECT 1").unwrap();
    assert_eq!(ends.get(), 3);
}
