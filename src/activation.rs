//! The activation and binding store (spec §4.5): per-frame, per-block
//! name-to-`Cell` maps, with the lookup order locals (innermost block
//! outward) → closure → globals.

use crate::cell::{new_cell, Cell};
use crate::value::Value;
use std::collections::HashMap;

/// One function invocation's live bindings: a stack of per-block maps (so
/// that exiting a block releases exactly the locals it declared) plus the
/// closure captured at the function's definition time.
pub struct Frame {
    blocks: Vec<HashMap<String, Cell>>,
    closure: HashMap<String, Cell>,
}

impl Frame {
    pub fn new(closure: HashMap<String, Cell>) -> Self {
        Frame {
            blocks: vec![HashMap::new()],
            closure,
        }
    }

    pub fn push_block(&mut self) {
        self.blocks.push(HashMap::new());
    }

    /// Exiting a block drops its map outright, releasing every local's
    /// `Cell` unless a closure elsewhere still holds it (spec §4.3: this
    /// is exactly what `Rc` gives for free).
    pub fn pop_block(&mut self) {
        self.blocks.pop();
        debug_assert!(!self.blocks.is_empty(), "popped the frame's outermost block");
    }

    pub fn declare_local(&mut self, name: &str, cell: Cell) {
        self.blocks
            .last_mut()
            .expect("frame always has at least one block")
            .insert(name.to_string(), cell);
    }

    fn resolve(&self, name: &str) -> Option<Cell> {
        for block in self.blocks.iter().rev() {
            if let Some(c) = block.get(name) {
                return Some(c.clone());
            }
        }
        self.closure.get(name).cloned()
    }

    /// Every `Cell` currently live on this frame's block stack, innermost
    /// first-wins, used when building a closure for a function defined
    /// here (spec §3.4/§4.7: "capturing every currently-live Cell").
    pub fn live_locals(&self) -> HashMap<String, Cell> {
        let mut out = HashMap::new();
        for block in &self.blocks {
            for (name, cell) in block {
                out.entry(name.clone()).or_insert_with(|| cell.clone());
            }
        }
        out
    }

    /// The closure this frame itself was built with — consulted so that a
    /// function nested two levels deep can still reach its grandparent's
    /// locals transitively (spec §3.4).
    pub fn closure(&self) -> &HashMap<String, Cell> {
        &self.closure
    }
}

/// The full binding store: the call stack of frames plus the single
/// global table, created on demand (spec §4.5).
pub struct Activation {
    frames: Vec<Frame>,
    globals: HashMap<String, Cell>,
}

impl Activation {
    pub fn new() -> Self {
        Activation {
            frames: vec![Frame::new(HashMap::new())],
            globals: HashMap::new(),
        }
    }

    pub fn push_frame(&mut self, closure: HashMap<String, Cell>) {
        self.frames.push(Frame::new(closure));
    }

    pub fn pop_frame(&mut self) {
        self.frames.pop();
        debug_assert!(!self.frames.is_empty(), "popped the outermost frame");
    }

    pub fn current_frame(&self) -> &Frame {
        self.frames.last().expect("activation always has a frame")
    }

    pub fn current_frame_mut(&mut self) -> &mut Frame {
        self.frames.last_mut().expect("activation always has a frame")
    }

    pub fn push_block(&mut self) {
        self.current_frame_mut().push_block();
    }

    pub fn pop_block(&mut self) {
        self.current_frame_mut().pop_block();
    }

    pub fn declare_local(&mut self, name: &str, value: Value) -> Cell {
        let cell = new_cell(value);
        self.current_frame_mut().declare_local(name, cell.clone());
        cell
    }

    /// Read a name: locals/closure first, then globals, defaulting to Nil
    /// without allocating a global cell that was never assigned.
    pub fn read_name(&self, name: &str) -> Value {
        if let Some(cell) = self.current_frame().resolve(name) {
            return cell.borrow().clone();
        }
        self.globals
            .get(name)
            .map(|c| c.borrow().clone())
            .unwrap_or(Value::Nil)
    }

    /// The assignable location for a name: an existing local/closure
    /// `Cell` if one is in scope, otherwise the global `Cell`, created on
    /// first assignment (spec §4.5 "global store creation-on-demand").
    pub fn lvalue_cell(&mut self, name: &str) -> Cell {
        if let Some(cell) = self.current_frame().resolve(name) {
            return cell;
        }
        self.globals
            .entry(name.to_string())
            .or_insert_with(|| new_cell(Value::Nil))
            .clone()
    }

    /// Every `Cell` live on the current frame, used to build a closure for
    /// a function literal evaluated right now.
    pub fn live_locals(&self) -> HashMap<String, Cell> {
        let mut out = self.current_frame().closure().clone();
        out.extend(self.current_frame().live_locals());
        out
    }

    /// Snapshot of every global currently bound, for the `globals()`
    /// test-instrumentation intrinsic.
    pub fn globals_snapshot(&self) -> Vec<(String, Value)> {
        self.globals
            .iter()
            .map(|(name, cell)| (name.clone(), cell.borrow().clone()))
            .collect()
    }
}

impl Default for Activation {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn locals_shadow_globals() {
        let mut act = Activation::new();
        *act.lvalue_cell("x").borrow_mut() = Value::Int(1);
        assert_eq!(act.read_name("x"), Value::Int(1));
        act.push_block();
        act.declare_local("x", Value::Int(2));
        assert_eq!(act.read_name("x"), Value::Int(2));
        act.pop_block();
        assert_eq!(act.read_name("x"), Value::Int(1));
    }

    #[test]
    fn undefined_global_reads_as_nil() {
        let act = Activation::new();
        assert_eq!(act.read_name("missing"), Value::Nil);
    }

    #[test]
    fn closure_locals_are_visible_through_frame() {
        let mut closure = HashMap::new();
        closure.insert("a".to_string(), new_cell(Value::Int(7)));
        let mut act = Activation::new();
        act.push_frame(closure);
        assert_eq!(act.read_name("a"), Value::Int(7));
        act.pop_frame();
    }
}
