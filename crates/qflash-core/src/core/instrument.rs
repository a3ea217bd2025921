// crates/qflash-core/src/core/instrument.rs
// ============================================================================
// Module: QFlash Instrumentation
// Description: Per-statement timing and row accumulator.
// Purpose: Collect execution timing across run/finish loops.
// Dependencies: crate::core::statement
// ============================================================================

//! ## Overview
//! [`Instrumentation`] accumulates elapsed time and produced rows for one
//! statement. Engines call [`Instrumentation::start_node`] and
//! [`Instrumentation::stop_node`] around each execution phase using offsets
//! from their own clock; the end hook closes the loop with
//! [`Instrumentation::end_loop`] before reading the total. Closing a loop is
//! idempotent, so several stacked layers may finalize the same accumulator.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::time::Duration;

use crate::core::statement::InstrumentOptions;

// ============================================================================
// SECTION: Instrumentation
// ============================================================================

/// Timing accumulator attached to a statement.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Instrumentation {
    /// Instrumentation requested when the accumulator was allocated.
    options: InstrumentOptions,
    /// True when the current loop has accumulated anything.
    running: bool,
    /// Clock offset of the open interval, if any.
    started_at: Option<Duration>,
    /// Time accumulated in the current loop.
    counter: Duration,
    /// Rows produced in the current loop.
    tuple_count: u64,
    /// Time accumulated across closed loops.
    total: Duration,
    /// Rows produced across closed loops.
    ntuples: u64,
    /// Number of closed loops.
    nloops: u64,
}

impl Instrumentation {
    /// Allocates an accumulator for the requested instrumentation.
    #[must_use]
    pub fn new(options: InstrumentOptions) -> Self {
        Self {
            options,
            ..Self::default()
        }
    }

    /// Returns the instrumentation options of this accumulator.
    #[must_use]
    pub const fn options(&self) -> InstrumentOptions {
        self.options
    }

    /// Opens a timing interval at the given clock offset.
    pub fn start_node(&mut self, at: Duration) {
        if self.options.timer {
            self.started_at = Some(at);
        }
    }

    /// Closes the open interval at the given clock offset and counts rows.
    ///
    /// A stop without a matching start only counts rows.
    pub fn stop_node(&mut self, at: Duration, tuples: u64) {
        if let Some(started_at) = self.started_at.take() {
            self.counter += at.saturating_sub(started_at);
        }
        self.tuple_count = self.tuple_count.saturating_add(tuples);
        self.running = true;
    }

    /// Folds the current loop into the totals.
    ///
    /// An interval left open by an aborted phase is discarded.
    pub fn end_loop(&mut self) {
        self.started_at = None;
        if !self.running {
            return;
        }
        self.total += self.counter;
        self.ntuples = self.ntuples.saturating_add(self.tuple_count);
        self.nloops = self.nloops.saturating_add(1);
        self.running = false;
        self.counter = Duration::ZERO;
        self.tuple_count = 0;
    }

    /// Returns true while an interval is open.
    #[must_use]
    pub const fn is_timing(&self) -> bool {
        self.started_at.is_some()
    }

    /// Returns the total time accumulated across closed loops.
    #[must_use]
    pub const fn total(&self) -> Duration {
        self.total
    }

    /// Returns the total time in milliseconds.
    #[must_use]
    #[allow(
        clippy::cast_precision_loss,
        reason = "Statement durations stay far below 2^53 nanoseconds."
    )]
    pub fn total_ms(&self) -> f64 {
        self.total.as_nanos() as f64 / 1_000_000.0
    }

    /// Returns rows produced across closed loops.
    #[must_use]
    pub const fn ntuples(&self) -> u64 {
        self.ntuples
    }

    /// Returns the number of closed loops.
    #[must_use]
    pub const fn nloops(&self) -> u64 {
        self.nloops
    }
}

// ============================================================================
// SECTION: Trigger Statistics
// ============================================================================

/// Statistics for one after-statement trigger fired by a statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriggerStats {
    /// Trigger name.
    pub name: String,
    /// Number of calls.
    pub calls: u64,
    /// Time spent in the trigger.
    pub time: Duration,
}

impl TriggerStats {
    /// Returns the trigger time in milliseconds.
    #[must_use]
    #[allow(
        clippy::cast_precision_loss,
        reason = "Trigger durations stay far below 2^53 nanoseconds."
    )]
    pub fn time_ms(&self) -> f64 {
        self.time.as_nanos() as f64 / 1_000_000.0
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::Instrumentation;
    use crate::core::statement::InstrumentOptions;

    #[test]
    fn end_loop_folds_intervals_and_is_idempotent() {
        let mut instr = Instrumentation::new(InstrumentOptions::ALL);
        instr.start_node(Duration::from_millis(10));
        instr.stop_node(Duration::from_millis(13), 2);
        instr.start_node(Duration::from_millis(20));
        instr.stop_node(Duration::from_millis(21), 0);
        instr.end_loop();
        instr.end_loop();
        assert_eq!(instr.total(), Duration::from_millis(4));
        assert_eq!(instr.ntuples(), 2);
        assert_eq!(instr.nloops(), 1);
        assert!((instr.total_ms() - 4.0).abs() < f64::EPSILON);
    }

    #[test]
    fn timer_disabled_counts_rows_only() {
        let mut instr = Instrumentation::new(InstrumentOptions {
            timer: false,
            buffers: false,
            rows: true,
        });
        instr.start_node(Duration::from_millis(1));
        assert!(!instr.is_timing());
        instr.stop_node(Duration::from_millis(9), 5);
        instr.end_loop();
        assert_eq!(instr.total(), Duration::ZERO);
        assert_eq!(instr.ntuples(), 5);
    }

    #[test]
    fn open_interval_is_discarded_on_end_loop() {
        let mut instr = Instrumentation::new(InstrumentOptions::ALL);
        instr.start_node(Duration::from_millis(1));
        instr.stop_node(Duration::from_millis(2), 1);
        instr.start_node(Duration::from_millis(3));
        instr.end_loop();
        assert!(!instr.is_timing());
        assert_eq!(instr.total(), Duration::from_millis(1));
    }
}
