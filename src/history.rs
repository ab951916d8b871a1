//! Bounded undo/redo history.
//!
//! States live in one arena with a cursor pointing at the current state.
//! Everything left of the cursor is undoable, everything right of it redoable.
//! Recording a new state drops the redo branch; once the arena exceeds its
//! limit the oldest states are evicted first.

use std::collections::VecDeque;

/// Default number of undo steps kept per image.
pub const DEFAULT_HISTORY_LIMIT: usize = 50;

/// Cursor-over-arena undo/redo stack.
#[derive(Debug, Clone)]
pub struct History<T> {
    states: VecDeque<T>,
    cursor: usize,
    limit: usize,
}

impl<T> History<T> {
    /// Start a history at `initial` that keeps up to `limit` undo steps.
    ///
    /// A `limit` of `0` is treated as `1`.
    pub fn new(initial: T, limit: usize) -> Self {
        let mut states = VecDeque::with_capacity(limit.min(64) + 1);
        states.push_back(initial);
        Self {
            states,
            cursor: 0,
            limit: limit.max(1),
        }
    }

    /// The state the cursor points at.
    #[must_use]
    pub fn current(&self) -> &T {
        &self.states[self.cursor]
    }

    /// Record `state` as the new current state, discarding any redo branch.
    pub fn record(&mut self, state: T) {
        self.states.truncate(self.cursor + 1);
        self.states.push_back(state);
        while self.states.len() > self.limit + 1 {
            self.states.pop_front();
        }
        self.cursor = self.states.len() - 1;
    }

    /// Step back one state. Returns `None` when there is nothing to undo.
    pub fn undo(&mut self) -> Option<&T> {
        if self.cursor == 0 {
            return None;
        }
        self.cursor -= 1;
        Some(&self.states[self.cursor])
    }

    /// Step forward one state. Returns `None` when there is nothing to redo.
    pub fn redo(&mut self) -> Option<&T> {
        if self.cursor + 1 >= self.states.len() {
            return None;
        }
        self.cursor += 1;
        Some(&self.states[self.cursor])
    }

    /// Number of undo steps available.
    #[must_use]
    pub fn undo_depth(&self) -> usize {
        self.cursor
    }

    /// Number of redo steps available.
    #[must_use]
    pub fn redo_depth(&self) -> usize {
        self.states.len() - 1 - self.cursor
    }

    /// Maximum number of undo steps kept.
    #[must_use]
    pub fn limit(&self) -> usize {
        self.limit
    }
}
