//! Lexical environment frames.
//!
//! A frame is an ordered list of bindings plus an optional parent. Frames live in the
//! [`Arena`] and are shared by handle: a child frame, any number of closures and the
//! interpreter itself may all refer to the same frame, and every `define`/`set!` through
//! one alias is visible through the others.

use crate::Error;
use crate::arena::{Arena, FrameId, ValueId};
use crate::ast::Value;
use crate::builtinops::BuiltinOp;

/// A single name/value cell. The cell is updated in place on rebinding.
#[derive(Debug, Clone, PartialEq)]
pub struct Binding {
    pub name: String,
    pub value: ValueId,
}

#[derive(Debug, Clone, Default)]
pub struct Frame {
    /// Newest binding last; lookup scans from the end so the newest duplicate wins
    bindings: Vec<Binding>,
    parent: Option<FrameId>,
}

impl Frame {
    pub(crate) fn new(parent: Option<FrameId>) -> Self {
        Frame {
            bindings: Vec::new(),
            parent,
        }
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.bindings.iter().rposition(|binding| binding.name == name)
    }
}

impl Arena {
    /// Find the innermost binding of `name`, walking from `frame` to the root
    pub fn lookup(&self, frame: FrameId, name: &str) -> Result<ValueId, Error> {
        let mut current = Some(frame);
        while let Some(id) = current {
            let frame = self.frame(id);
            if let Some(index) = frame.position(name) {
                return Ok(frame.bindings[index].value);
            }
            current = frame.parent;
        }
        Err(Error::unbound_symbol(name))
    }

    /// Add a new binding to `frame` without looking for an existing one
    pub fn bind(&mut self, frame: FrameId, name: &str, value: ValueId) {
        self.frame_mut(frame).bindings.push(Binding {
            name: name.to_owned(),
            value,
        });
    }

    /// Insert or overwrite `name` in `frame` only. An existing cell keeps its position.
    pub fn define(&mut self, frame: FrameId, name: &str, value: ValueId) {
        let frame = self.frame_mut(frame);
        match frame.position(name) {
            Some(index) => frame.bindings[index].value = value,
            None => frame.bindings.push(Binding {
                name: name.to_owned(),
                value,
            }),
        }
    }

    /// Overwrite the innermost existing binding of `name`; never creates one
    pub fn set_bang(&mut self, frame: FrameId, name: &str, value: ValueId) -> Result<(), Error> {
        let mut current = Some(frame);
        while let Some(id) = current {
            let frame = self.frame_mut(id);
            if let Some(index) = frame.position(name) {
                frame.bindings[index].value = value;
                return Ok(());
            }
            current = frame.parent;
        }
        Err(Error::UnboundSymbol(
            "Cannot set! an undefined variable".into(),
        ))
    }

    /// Bind a builtin procedure under its Scheme name
    pub fn bind_primitive(&mut self, frame: FrameId, op: &'static BuiltinOp) {
        let value = self.alloc(Value::Primitive(op));
        self.define(frame, op.scheme_id, value);
    }
}
