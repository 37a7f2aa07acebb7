//! Undo/redo history over typed edit actions.

use std::collections::VecDeque;
use std::fmt;

use log::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Undo,
    Redo,
}

/// An edit that can be replayed in either direction against its target.
pub trait Undoable {
    type Target;
    type Error: fmt::Display;

    /// Applies the action's `before` (undo) or `after` (redo) state. Must
    /// leave the target untouched when it fails.
    fn apply(&self, target: &mut Self::Target, direction: Direction) -> Result<(), Self::Error>;

    /// Human-readable summary, used for undo/redo labels.
    fn description(&self) -> String;
}

/// One undo step: a single action or a finished chain.
#[derive(Debug, Clone)]
struct Unit<A> {
    id: u64,
    name: String,
    actions: Vec<A>,
}

/// Undo/redo stacks. Actions recorded between `start_chain` and the matching
/// `finish_chain` form one unit and undo together.
#[derive(Debug, Clone)]
pub struct History<A> {
    undo_stack: VecDeque<Unit<A>>,
    redo_stack: Vec<Unit<A>>,
    limit: usize,
    chain_depth: usize,
    chain: Vec<A>,
    next_id: u64,
    // id of the unit on top of the undo stack when last saved, 0 for "empty"
    saved: Option<u64>,
}

impl<A: Undoable> History<A> {
    pub fn new(limit: usize) -> Self {
        Self {
            undo_stack: VecDeque::new(),
            redo_stack: Vec::new(),
            limit: limit.max(1),
            chain_depth: 0,
            chain: Vec::new(),
            next_id: 1,
            saved: Some(0),
        }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    fn top_id(&self) -> u64 {
        self.undo_stack.back().map_or(0, |u| u.id)
    }

    fn push_unit(&mut self, name: String, actions: Vec<A>) {
        let id = self.next_id;
        self.next_id += 1;
        self.undo_stack.push_back(Unit { id, name, actions });
        self.redo_stack.clear();
        while self.undo_stack.len() > self.limit {
            self.undo_stack.pop_front();
        }
    }

    /// Records an action that has already been applied.
    pub fn add_entry(&mut self, action: A) {
        if self.chain_depth > 0 {
            self.chain.push(action);
        } else {
            let name = action.description();
            self.push_unit(name, vec![action]);
        }
    }

    /// Applies an action forward and records it.
    pub fn perform(&mut self, target: &mut A::Target, action: A) -> Result<String, A::Error> {
        action.apply(target, Direction::Redo)?;
        let description = action.description();
        self.add_entry(action);
        Ok(description)
    }

    pub fn start_chain(&mut self) {
        self.chain_depth += 1;
    }

    /// Closes a chain. When the outermost chain closes, everything recorded
    /// inside it becomes one unit named `name`.
    pub fn finish_chain(&mut self, name: impl Into<String>) {
        if self.chain_depth == 0 {
            warn!("finish_chain called without an open chain");
            return;
        }
        self.chain_depth -= 1;
        if self.chain_depth == 0 && !self.chain.is_empty() {
            let actions = std::mem::take(&mut self.chain);
            self.push_unit(name.into(), actions);
        }
    }

    pub fn is_chaining(&self) -> bool {
        self.chain_depth > 0
    }

    pub fn can_undo(&self) -> bool {
        self.chain_depth == 0 && !self.undo_stack.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        self.chain_depth == 0 && !self.redo_stack.is_empty()
    }

    pub fn undo_description(&self) -> Option<&str> {
        self.undo_stack.back().map(|u| u.name.as_str())
    }

    pub fn redo_description(&self) -> Option<&str> {
        self.redo_stack.last().map(|u| u.name.as_str())
    }

    pub fn undo_count(&self) -> usize {
        self.undo_stack.len()
    }

    pub fn redo_count(&self) -> usize {
        self.redo_stack.len()
    }

    /// Undoes the most recent unit and returns its description. A unit that
    /// fails to apply is dropped and the target is left as it was.
    pub fn undo(&mut self, target: &mut A::Target) -> Option<String> {
        if !self.can_undo() {
            return None;
        }
        let unit = self.undo_stack.pop_back()?;
        let ordered: Vec<&A> = unit.actions.iter().rev().collect();
        if run_unit(&ordered, target, Direction::Undo, &unit.name) {
            let name = unit.name.clone();
            self.redo_stack.push(unit);
            Some(name)
        } else {
            None
        }
    }

    /// Redoes the most recently undone unit. Same failure handling as undo.
    pub fn redo(&mut self, target: &mut A::Target) -> Option<String> {
        if !self.can_redo() {
            return None;
        }
        let unit = self.redo_stack.pop()?;
        let ordered: Vec<&A> = unit.actions.iter().collect();
        if run_unit(&ordered, target, Direction::Redo, &unit.name) {
            let name = unit.name.clone();
            self.undo_stack.push_back(unit);
            Some(name)
        } else {
            None
        }
    }

    pub fn mark_saved(&mut self) {
        self.saved = Some(self.top_id());
    }

    pub fn has_unsaved_changes(&self) -> bool {
        self.saved != Some(self.top_id())
    }

    pub fn clear(&mut self) {
        let unsaved = self.has_unsaved_changes();
        self.undo_stack.clear();
        self.redo_stack.clear();
        self.chain.clear();
        self.chain_depth = 0;
        self.saved = if unsaved { None } else { Some(0) };
    }
}

fn reverse(direction: Direction) -> Direction {
    match direction {
        Direction::Undo => Direction::Redo,
        Direction::Redo => Direction::Undo,
    }
}

// Applies `actions` in order. On failure, rolls back the ones already applied.
fn run_unit<A: Undoable>(
    actions: &[&A],
    target: &mut A::Target,
    direction: Direction,
    name: &str,
) -> bool {
    for (done, action) in actions.iter().enumerate() {
        if let Err(e) = action.apply(target, direction) {
            warn!("dropping history entry \"{name}\": {e}");
            for applied in actions[..done].iter().rev() {
                if let Err(e) = applied.apply(target, reverse(direction)) {
                    warn!("rollback of \"{name}\" failed: {e}");
                }
            }
            return false;
        }
    }
    true
}
