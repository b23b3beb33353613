//! Arena storage for values and frames.
//!
//! Every [`Value`] and every [`Frame`] created while running a program is pushed into an
//! [`Arena`] and addressed by a [`ValueId`] or [`FrameId`]. Nothing is ever freed on its
//! own: [`Arena::reset`] drops everything at once, which is what lets closures and frames
//! reference each other in cycles without any bookkeeping.

use tracing::debug;

use crate::ast::{Datum, DisplayValue, Value};
use crate::environment::Frame;

/// Handle to a value stored in an [`Arena`]. Two handles are `eq?` exactly when equal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ValueId(usize);

/// Handle to a frame stored in an [`Arena`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameId(usize);

/// Statistics about arena memory usage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ArenaStats {
    pub values: usize,
    pub frames: usize,
    /// Number of resets since the arena was created
    pub resets: usize,
}

/// Owner of all values and frames of one interpreter instance.
///
/// Handles stay valid until the next [`reset`](Arena::reset); using a handle from before a
/// reset is a logic error and panics on access.
#[derive(Debug, Default)]
pub struct Arena {
    values: Vec<Value>,
    frames: Vec<Frame>,
    resets: usize,
}

impl Arena {
    pub fn new() -> Self {
        Arena {
            values: Vec::with_capacity(1024),
            frames: Vec::with_capacity(64),
            resets: 0,
        }
    }

    pub fn alloc(&mut self, value: Value) -> ValueId {
        let id = ValueId(self.values.len());
        self.values.push(value);
        id
    }

    pub fn get(&self, id: ValueId) -> &Value {
        &self.values[id.0]
    }

    pub fn alloc_frame(&mut self, parent: Option<FrameId>) -> FrameId {
        let id = FrameId(self.frames.len());
        self.frames.push(Frame::new(parent));
        id
    }

    pub fn frame(&self, id: FrameId) -> &Frame {
        &self.frames[id.0]
    }

    pub(crate) fn frame_mut(&mut self, id: FrameId) -> &mut Frame {
        &mut self.frames[id.0]
    }

    // Constructors. Each call allocates a fresh node.

    pub fn null(&mut self) -> ValueId {
        self.alloc(Value::Null)
    }

    pub fn void(&mut self) -> ValueId {
        self.alloc(Value::Void)
    }

    pub fn boolean(&mut self, b: bool) -> ValueId {
        self.alloc(Value::Boolean(b))
    }

    pub fn cons(&mut self, car: ValueId, cdr: ValueId) -> ValueId {
        self.alloc(Value::Pair(car, cdr))
    }

    /// Build a proper list from the given elements
    pub fn list(&mut self, items: &[ValueId]) -> ValueId {
        let mut tail = self.null();
        for item in items.iter().rev() {
            tail = self.cons(*item, tail);
        }
        tail
    }

    /// Collect the elements of a proper list; `None` when the chain of pairs does not end
    /// in the empty list. DotMarker elements are kept as they are.
    pub fn list_to_vec(&self, list: ValueId) -> Option<Vec<ValueId>> {
        let mut items = Vec::new();
        let mut cursor = list;
        loop {
            match self.get(cursor) {
                Value::Null => return Some(items),
                Value::Pair(car, cdr) => {
                    items.push(*car);
                    cursor = *cdr;
                }
                _ => return None,
            }
        }
    }

    /// Copy a reader datum into the arena
    pub fn alloc_datum(&mut self, datum: &Datum) -> ValueId {
        match datum {
            Datum::Integer(n) => self.alloc(Value::Integer(*n)),
            Datum::Float(x) => self.alloc(Value::Float(*x)),
            Datum::Boolean(b) => self.boolean(*b),
            Datum::String(s) => self.alloc(Value::String(s.clone())),
            Datum::Symbol(s) => self.alloc(Value::Symbol(s.clone())),
            Datum::Dot => self.alloc(Value::DotMarker),
            Datum::List(items) => {
                let ids: Vec<ValueId> = items.iter().map(|item| self.alloc_datum(item)).collect();
                self.list(&ids)
            }
        }
    }

    pub fn display(&self, id: ValueId) -> DisplayValue<'_> {
        DisplayValue::new(self, id)
    }

    pub fn stats(&self) -> ArenaStats {
        ArenaStats {
            values: self.values.len(),
            frames: self.frames.len(),
            resets: self.resets,
        }
    }

    /// Release every value and frame, returning the arena to its empty state
    pub fn reset(&mut self) {
        debug!(
            values = self.values.len(),
            frames = self.frames.len(),
            "arena reset"
        );
        self.values = Vec::new();
        self.frames = Vec::new();
        self.resets += 1;
    }

    /// Reset the arena, then terminate the process with `code`.
    ///
    /// This is the only place the library exits the process.
    pub fn abort(&mut self, code: i32) -> ! {
        debug!(code, "aborting");
        self.reset();
        std::process::exit(code)
    }
}
