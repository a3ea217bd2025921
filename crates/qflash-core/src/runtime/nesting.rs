// crates/qflash-core/src/runtime/nesting.rs
// ============================================================================
// Module: QFlash Nesting Tracker
// Description: Session-scoped statement depth and side-channel context stack.
// Purpose: Keep reentrancy counters balanced on every exit path.
// Dependencies: crate::interfaces, tracing
// ============================================================================

//! ## Overview
//! The tracker counts statements currently inside their run or finish phase
//! and records the depths at which the side channel pushed isolated
//! execution contexts. Depth is adjusted through [`DepthGuard`], so the
//! decrement happens on success, on error and during unwinding. The side
//! channel marker is the depth of the innermost pushed context (zero when
//! only the base context exists).
//!
//! State is single-writer: one session drives one thread of control, so
//! plain cells are sufficient.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::cell::Cell;
use std::cell::RefCell;

use tracing::warn;

use crate::interfaces::FacilityError;
use crate::interfaces::QueryFacility;

// ============================================================================
// SECTION: Nesting Tracker
// ============================================================================

/// Session-scoped reentrancy counters.
#[derive(Debug, Default)]
pub struct NestingTracker {
    /// Statements currently inside run or finish.
    depth: Cell<u32>,
    /// Depths at which side-channel contexts were pushed, innermost last.
    pushed: RefCell<Vec<u32>>,
}

impl NestingTracker {
    /// Creates a tracker at depth zero with no pushed contexts.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the current statement nesting depth.
    #[must_use]
    pub fn depth(&self) -> u32 {
        self.depth.get()
    }

    /// Returns the depth of the innermost pushed side-channel context.
    #[must_use]
    pub fn side_channel_marker(&self) -> u32 {
        self.pushed.borrow().last().copied().unwrap_or(0)
    }

    /// Returns the number of side-channel contexts currently pushed.
    #[must_use]
    pub fn pushed_contexts(&self) -> usize {
        self.pushed.borrow().len()
    }

    /// Increments the depth; the returned guard decrements it when dropped.
    pub(crate) fn enter(&self) -> DepthGuard<'_> {
        self.depth.set(self.depth.get().saturating_add(1));
        DepthGuard {
            tracker: self,
        }
    }

    /// Decrements the depth, never below zero.
    fn exit(&self) {
        let depth = self.depth.get();
        if depth == 0 {
            warn!("nesting depth exit without matching enter");
            return;
        }
        self.depth.set(depth - 1);
    }

    /// Pushes an isolated context when the marker is below the current depth.
    ///
    /// Returns true when a context was pushed.
    pub(crate) fn push_if_deeper<F>(&self, facility: &F) -> Result<bool, FacilityError>
    where
        F: QueryFacility + ?Sized,
    {
        let depth = self.depth();
        if self.side_channel_marker() >= depth {
            return Ok(false);
        }
        facility.push_context()?;
        self.pushed.borrow_mut().push(depth);
        Ok(true)
    }

    /// Pops contexts pushed deeper than the current depth, restoring the
    /// enclosing one. Returns the number of contexts popped.
    pub(crate) fn pop_if_shallower<F>(&self, facility: &F) -> Result<usize, FacilityError>
    where
        F: QueryFacility + ?Sized,
    {
        let depth = self.depth();
        let mut popped = 0;
        while self.side_channel_marker() > depth {
            facility.pop_context()?;
            self.pushed.borrow_mut().pop();
            popped += 1;
        }
        Ok(popped)
    }

    /// Pops the innermost pushed context unconditionally.
    pub(crate) fn pop_innermost<F>(&self, facility: &F) -> Result<(), FacilityError>
    where
        F: QueryFacility + ?Sized,
    {
        if self.pushed.borrow().is_empty() {
            return Ok(());
        }
        facility.pop_context()?;
        self.pushed.borrow_mut().pop();
        Ok(())
    }
}

// ============================================================================
// SECTION: Depth Guard
// ============================================================================

/// Scope guard pairing one depth increment with one decrement.
#[derive(Debug)]
#[must_use = "dropping the guard immediately undoes the depth increment"]
pub struct DepthGuard<'a> {
    /// Tracker to decrement on drop.
    tracker: &'a NestingTracker,
}

impl Drop for DepthGuard<'_> {
    fn drop(&mut self) {
        self.tracker.exit();
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(
        clippy::unwrap_used,
        reason = "Test fixtures use explicit asserts and unwraps for clarity."
    )]

    use std::cell::Cell;

    use super::NestingTracker;
    use crate::core::Datum;
    use crate::core::ParamType;
    use crate::interfaces::FacilityError;
    use crate::interfaces::QueryFacility;

    #[derive(Default)]
    struct CountingFacility {
        contexts: Cell<usize>,
    }

    impl QueryFacility for CountingFacility {
        type Prepared = ();

        fn push_context(&self) -> Result<(), FacilityError> {
            self.contexts.set(self.contexts.get() + 1);
            Ok(())
        }

        fn pop_context(&self) -> Result<(), FacilityError> {
            let current = self.contexts.get();
            if current == 0 {
                return Err(FacilityError::Failed("no pushed context".to_string()));
            }
            self.contexts.set(current - 1);
            Ok(())
        }

        fn connect(&self) -> Result<(), FacilityError> {
            Ok(())
        }

        fn prepare(&self, _sql: &str, _arg_types: &[ParamType]) -> Result<(), FacilityError> {
            Ok(())
        }

        fn execute_prepared(
            &self,
            _prepared: &(),
            _args: &[Datum],
            _row_limit: u64,
        ) -> Result<u64, FacilityError> {
            Ok(1)
        }

        fn finish(&self) -> Result<(), FacilityError> {
            Ok(())
        }
    }

    #[test]
    fn depth_guard_restores_on_early_return() {
        let tracker = NestingTracker::new();
        let failing = || -> Result<(), String> {
            let _outer = tracker.enter();
            let _inner = tracker.enter();
            assert_eq!(tracker.depth(), 2);
            Err("boom".to_string())
        };
        assert!(failing().is_err());
        assert_eq!(tracker.depth(), 0);
    }

    #[test]
    fn depth_never_goes_negative() {
        let tracker = NestingTracker::new();
        tracker.exit();
        assert_eq!(tracker.depth(), 0);
    }

    #[test]
    fn push_if_deeper_only_pushes_once_per_depth() {
        let tracker = NestingTracker::new();
        let facility = CountingFacility::default();
        assert!(!tracker.push_if_deeper(&facility).unwrap());
        let _one = tracker.enter();
        let _two = tracker.enter();
        assert!(tracker.push_if_deeper(&facility).unwrap());
        assert!(!tracker.push_if_deeper(&facility).unwrap());
        assert_eq!(tracker.side_channel_marker(), 2);
        assert_eq!(facility.contexts.get(), 1);
    }

    #[test]
    fn pop_if_shallower_restores_enclosing_contexts() {
        let tracker = NestingTracker::new();
        let facility = CountingFacility::default();
        {
            let _one = tracker.enter();
            tracker.push_if_deeper(&facility).unwrap();
            let _two = tracker.enter();
            tracker.push_if_deeper(&facility).unwrap();
            assert_eq!(tracker.pushed_contexts(), 2);
        }
        {
            let _one = tracker.enter();
            assert_eq!(tracker.pop_if_shallower(&facility).unwrap(), 1);
            assert_eq!(tracker.side_channel_marker(), 1);
        }
        assert_eq!(tracker.pop_if_shallower(&facility).unwrap(), 1);
        assert_eq!(tracker.side_channel_marker(), 0);
        assert_eq!(facility.contexts.get(), 0);
    }

    #[test]
    fn pop_innermost_is_noop_without_pushes() {
        let tracker = NestingTracker::new();
        let facility = CountingFacility::default();
        tracker.pop_innermost(&facility).unwrap();
        assert_eq!(facility.contexts.get(), 0);
    }
}
