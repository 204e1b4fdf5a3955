//! Snapshot-based undo/redo.

/// Default number of undo states to keep.
pub const DEFAULT_HISTORY_DEPTH: usize = 100;

/// Undo/redo stacks of full snapshots.
///
/// Callers commit the state as it was *before* a change. `undo` and `redo`
/// exchange the caller's current state with the top of the opposite stack, so
/// `undo` followed by `redo` always restores the state `undo` started from.
#[derive(Debug, Clone)]
pub struct History<T> {
    undo_stack: Vec<T>,
    redo_stack: Vec<T>,
    max_depth: usize,
}

impl<T> Default for History<T> {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_DEPTH)
    }
}

impl<T> History<T> {
    /// Create a history that keeps at most `max_depth` undo states (at least one).
    pub fn new(max_depth: usize) -> Self {
        Self {
            undo_stack: Vec::new(),
            redo_stack: Vec::new(),
            max_depth: max_depth.max(1),
        }
    }

    /// Record the state preceding a change. Clears the redo stack.
    pub fn commit(&mut self, before: T) {
        self.undo_stack.push(before);
        self.redo_stack.clear();

        if self.undo_stack.len() > self.max_depth {
            let excess = self.undo_stack.len() - self.max_depth;
            self.undo_stack.drain(..excess);
        }
    }

    /// Step back. Returns the state to restore, or `None` if there is nothing to undo.
    pub fn undo(&mut self, current: T) -> Option<T> {
        let previous = self.undo_stack.pop()?;
        self.redo_stack.push(current);
        Some(previous)
    }

    /// Step forward again after an undo.
    pub fn redo(&mut self, current: T) -> Option<T> {
        let next = self.redo_stack.pop()?;
        self.undo_stack.push(current);
        Some(next)
    }

    pub fn clear(&mut self) {
        self.undo_stack.clear();
        self.redo_stack.clear();
    }

    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    pub fn undo_depth(&self) -> usize {
        self.undo_stack.len()
    }

    pub fn redo_depth(&self) -> usize {
        self.redo_stack.len()
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_undo_then_redo_restores() {
        let mut history = History::new(10);
        let mut state = vec![1];

        history.commit(state.clone());
        state.push(2);

        state = history.undo(state).unwrap();
        assert_eq!(state, vec![1]);
        state = history.redo(state).unwrap();
        assert_eq!(state, vec![1, 2]);
    }

    #[test]
    fn test_commit_clears_redo() {
        let mut history = History::new(10);
        history.commit("a");
        let current = history.undo("b").unwrap();
        assert!(history.can_redo());

        history.commit(current);
        assert!(!history.can_redo());
        assert_eq!(history.undo_depth(), 1);
    }

    #[test]
    fn test_empty_stacks_return_none() {
        let mut history: History<u8> = History::default();
        assert_eq!(history.undo(1), None);
        assert_eq!(history.redo(1), None);
        assert_eq!(history.max_depth(), DEFAULT_HISTORY_DEPTH);
    }

    #[test]
    fn test_depth_is_bounded() {
        let mut history = History::new(3);
        for i in 0..10 {
            history.commit(i);
        }
        assert_eq!(history.undo_depth(), 3);

        let mut current = 10;
        let mut restored = Vec::new();
        while let Some(prev) = history.undo(current) {
            restored.push(prev);
            current = prev;
        }
        assert_eq!(restored, vec![9, 8, 7]);
    }

    #[test]
    fn test_clear() {
        let mut history = History::new(3);
        history.commit(1);
        let _ = history.undo(2);
        history.commit(3);
        history.clear();
        assert!(!history.can_undo());
        assert!(!history.can_redo());
    }
}
