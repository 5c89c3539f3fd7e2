//! Bounded undo/redo stacks of (location, previous value, kind) entries.
use std::collections::VecDeque;

use crate::value::{Slot, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UndoKind {
    Edit,
    Add,
    Clear,
}

#[derive(Debug, Clone)]
pub struct UndoEntry {
    /// Path from the tree root; stays valid across node repopulation.
    pub location: Vec<Slot>,
    /// `None` when the location did not exist before the operation.
    pub previous_value: Option<Value>,
    pub kind: UndoKind,
}

#[derive(Debug)]
pub struct UndoLog {
    undo: VecDeque<UndoEntry>,
    redo: VecDeque<UndoEntry>,
    max_undos: usize,
}

impl UndoLog {
    pub fn new(max_undos: usize) -> Self {
        Self { undo: VecDeque::new(), redo: VecDeque::new(), max_undos }
    }

    pub fn max_undos(&self) -> usize {
        self.max_undos
    }

    /// Records a fresh user operation. Invalidates everything redoable.
    pub fn record(&mut self, entry: UndoEntry) {
        self.redo.clear();
        push_bounded(&mut self.undo, entry, self.max_undos);
    }

    pub(crate) fn pop_undo(&mut self) -> Option<UndoEntry> {
        self.undo.pop_back()
    }

    pub(crate) fn pop_redo(&mut self) -> Option<UndoEntry> {
        self.redo.pop_back()
    }

    pub(crate) fn push_undo(&mut self, entry: UndoEntry) {
        push_bounded(&mut self.undo, entry, self.max_undos);
    }

    pub(crate) fn push_redo(&mut self, entry: UndoEntry) {
        push_bounded(&mut self.redo, entry, self.max_undos);
    }

    pub fn can_undo(&self) -> bool {
        !self.undo.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo.is_empty()
    }

    pub fn undo_len(&self) -> usize {
        self.undo.len()
    }

    pub fn redo_len(&self) -> usize {
        self.redo.len()
    }

    /// Most recent undoable entry.
    pub fn peek_undo(&self) -> Option<&UndoEntry> {
        self.undo.back()
    }
}

fn push_bounded(stack: &mut VecDeque<UndoEntry>, entry: UndoEntry, max: usize) {
    if max == 0 {
        return;
    }
    while stack.len() >= max {
        stack.pop_front();
    }
    stack.push_back(entry);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn edit(n: i64) -> UndoEntry {
        UndoEntry { location: vec![Slot::Attr("n".into())], previous_value: Some(Value::Int(n)), kind: UndoKind::Edit }
    }

    #[test]
    fn oldest_entry_is_evicted() {
        let mut log = UndoLog::new(2);
        log.record(edit(1));
        log.record(edit(2));
        log.record(edit(3));
        assert_eq!(log.undo_len(), 2);
        assert_eq!(log.pop_undo().and_then(|e| e.previous_value), Some(Value::Int(3)));
        assert_eq!(log.pop_undo().and_then(|e| e.previous_value), Some(Value::Int(2)));
        assert!(log.pop_undo().is_none());
    }

    #[test]
    fn recording_clears_redo() {
        let mut log = UndoLog::new(5);
        log.push_redo(edit(1));
        assert!(log.can_redo());
        log.record(edit(2));
        assert!(!log.can_redo());
    }

    #[test]
    fn zero_capacity_keeps_nothing() {
        let mut log = UndoLog::new(0);
        log.record(edit(1));
        assert!(!log.can_undo());
    }
}
