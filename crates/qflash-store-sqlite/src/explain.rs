// crates/qflash-store-sqlite/src/explain.rs
// ============================================================================
// Module: SQLite Plan Rendering
// Description: Text and JSON rendering of EXPLAIN QUERY PLAN output.
// Purpose: Produce plan documents for logged statements.
// Dependencies: qflash-core, serde_json
// ============================================================================

//! ## Overview
//! `SQLite` reports a query plan as rows of `(id, parent, detail)`. Text
//! output draws them as the indented tree the `sqlite3` shell prints; JSON
//! output nests children under `"Plans"`. Trigger statistics follow the plan
//! in both formats.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt::Write as _;

use qflash_core::TriggerStats;
use serde_json::Value;
use serde_json::json;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Maximum depth rendered for a plan tree.
const MAX_PLAN_DEPTH: usize = 64;

// ============================================================================
// SECTION: Plan Steps
// ============================================================================

/// One row of `EXPLAIN QUERY PLAN` output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanStep {
    /// Step identifier.
    pub id: i64,
    /// Parent step identifier, 0 for top-level steps.
    pub parent: i64,
    /// Human-readable step description.
    pub detail: String,
}

/// Returns the children of a step in output order.
fn children(steps: &[PlanStep], parent: i64) -> impl Iterator<Item = &PlanStep> {
    steps.iter().filter(move |step| step.parent == parent && step.id != parent)
}

// ============================================================================
// SECTION: Text
// ============================================================================

/// Appends the plan tree in the `sqlite3` shell layout.
pub fn write_text_tree(out: &mut String, steps: &[PlanStep]) {
    out.push_str("QUERY PLAN\n");
    write_text_level(out, steps, 0, "", 0);
}

/// Appends one level of the text tree.
fn write_text_level(out: &mut String, steps: &[PlanStep], parent: i64, prefix: &str, depth: usize) {
    if depth >= MAX_PLAN_DEPTH {
        return;
    }
    let level: Vec<&PlanStep> = children(steps, parent).collect();
    for (index, step) in level.iter().enumerate() {
        let last = index + 1 == level.len();
        let branch = if last { "`--" } else { "|--" };
        let _ = writeln!(out, "{prefix}{branch}{}", step.detail);
        let nested = format!("{prefix}{}", if last { "   " } else { "|  " });
        write_text_level(out, steps, step.id, &nested, depth + 1);
    }
}

/// Appends trigger statistics as text lines.
pub fn write_text_triggers(out: &mut String, triggers: &[TriggerStats]) {
    for trigger in triggers {
        let _ = writeln!(
            out,
            "Trigger {}: time={:.3} calls={}",
            trigger.name,
            trigger.time_ms(),
            trigger.calls
        );
    }
}

// ============================================================================
// SECTION: JSON
// ============================================================================

/// Builds the JSON plan tree below `parent`.
#[must_use]
pub fn json_tree(steps: &[PlanStep], parent: i64) -> Vec<Value> {
    json_level(steps, parent, 0)
}

/// Builds one level of the JSON plan tree.
fn json_level(steps: &[PlanStep], parent: i64, depth: usize) -> Vec<Value> {
    if depth >= MAX_PLAN_DEPTH {
        return Vec::new();
    }
    children(steps, parent)
        .map(|step| {
            let mut node = json!({ "Detail": step.detail });
            let nested = json_level(steps, step.id, depth + 1);
            if !nested.is_empty() {
                node["Plans"] = Value::Array(nested);
            }
            node
        })
        .collect()
}

/// Builds the JSON trigger list.
#[must_use]
pub fn json_triggers(triggers: &[TriggerStats]) -> Vec<Value> {
    triggers
        .iter()
        .map(|trigger| {
            json!({
                "Trigger Name": trigger.name,
                "Time": trigger.time_ms(),
                "Calls": trigger.calls,
            })
        })
        .collect()
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::PlanStep;
    use super::json_tree;
    use super::write_text_tree;

    fn step(id: i64, parent: i64, detail: &str) -> PlanStep {
        PlanStep {
            id,
            parent,
            detail: detail.to_string(),
        }
    }

    #[test]
    fn text_tree_matches_shell_layout() {
        let steps = vec![
            step(2, 0, "SCAN u"),
            step(5, 0, "CORRELATED SCALAR SUBQUERY 1"),
            step(9, 5, "SCAN a"),
        ];
        let mut out = String::new();
        write_text_tree(&mut out, &steps);
        assert_eq!(out, "QUERY PLAN\n|--SCAN u\n`--CORRELATED SCALAR SUBQUERY 1\n   `--SCAN a\n");
    }

    #[test]
    fn json_tree_nests_children() {
        let steps = vec![step(2, 0, "SCAN u"), step(3, 2, "USE TEMP B-TREE")];
        let tree = json_tree(&steps, 0);
        assert_eq!(tree.len(), 1);
        assert_eq!(tree[0]["Detail"], "SCAN u");
        assert_eq!(tree[0]["Plans"][0]["Detail"], "USE TEMP B-TREE");
    }

    #[test]
    fn self_parented_steps_do_not_recurse() {
        let steps = vec![step(0, 0, "LOOP")];
        let mut out = String::new();
        write_text_tree(&mut out, &steps);
        assert_eq!(out, "QUERY PLAN\n");
    }
}
