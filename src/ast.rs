//! This module defines the value model of the interpreter. The main enum, [`Value`],
//! covers every runtime datum: numbers, booleans, strings, symbols, the empty list,
//! pairs, closures, primitives and the markers used by the evaluator. Values never own
//! each other directly; compound values hold [`ValueId`]/[`FrameId`] handles into the
//! [`Arena`] that allocated them.
//!
//! The reader produces the arena-independent [`Datum`] tree, built from the non-executable
//! subset of the model. Ergonomic helpers such as [`val`], [`sym`], [`nil`] and [`dot`]
//! construct datums in code and tests. Output rendering lives here too, via
//! [`Arena::display`].

use std::fmt;

use crate::arena::{Arena, FrameId, ValueId};
use crate::builtinops::BuiltinOp;

/// Type alias for exact numbers in the interpreter
pub(crate) type NumberType = i64;

/// Core value type
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Exact integers
    Integer(NumberType),
    /// Inexact numbers
    Float(f64),
    Boolean(bool),
    String(String),
    Symbol(String),
    /// The empty list
    Null,
    Pair(ValueId, ValueId),
    /// User-defined procedure. The frame is shared with every other holder of the handle.
    Closure {
        params: ValueId,
        body: ValueId,
        frame: FrameId,
    },
    Primitive(&'static BuiltinOp),
    /// Result of purely side-effecting forms; never printed
    Void,
    /// Marks the rest position inside a dotted list
    DotMarker,
    /// Placeholder bound by `letrec` until its initializer has produced a value
    Unassigned,
}

impl Value {
    /// Everything except the boolean `#f` counts as true
    pub fn is_false(&self) -> bool {
        matches!(self, Value::Boolean(false))
    }
}

/// Numeric view of a value, used by the arithmetic primitives.
///
/// Promotion is one-way: combining an exact and an inexact number always yields an
/// inexact one.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Number {
    Exact(NumberType),
    Inexact(f64),
}

impl Number {
    pub fn from_value(value: &Value) -> Option<Number> {
        match value {
            Value::Integer(n) => Some(Number::Exact(*n)),
            Value::Float(x) => Some(Number::Inexact(*x)),
            _ => None,
        }
    }

    pub fn into_value(self) -> Value {
        match self {
            Number::Exact(n) => Value::Integer(n),
            Number::Inexact(x) => Value::Float(x),
        }
    }

    pub fn as_f64(self) -> f64 {
        match self {
            Number::Exact(n) => n as f64,
            Number::Inexact(x) => x,
        }
    }

    pub fn is_zero(self) -> bool {
        match self {
            Number::Exact(n) => n == 0,
            Number::Inexact(x) => x == 0.0,
        }
    }

    /// `self <= other`, comparing exactly when both sides are exact
    pub fn le(self, other: Number) -> bool {
        match (self, other) {
            (Number::Exact(a), Number::Exact(b)) => a <= b,
            (a, b) => a.as_f64() <= b.as_f64(),
        }
    }
}

/// Arena-independent tree produced by the reader
#[derive(Debug, Clone, PartialEq)]
pub enum Datum {
    Integer(NumberType),
    Float(f64),
    Boolean(bool),
    String(String),
    Symbol(String),
    /// Proper list; the empty list is `List(vec![])`
    List(Vec<Datum>),
    /// Standalone `.` inside a list
    Dot,
}

macro_rules! impl_integer_datum {
    ($($t:ty),*) => {
        $(
            impl From<$t> for Datum {
                fn from(n: $t) -> Self {
                    Datum::Integer(NumberType::from(n))
                }
            }
        )*
    };
}

impl_integer_datum!(i8, i16, i32, i64, u8, u16, u32);

impl From<f64> for Datum {
    fn from(x: f64) -> Self {
        Datum::Float(x)
    }
}

impl From<bool> for Datum {
    fn from(b: bool) -> Self {
        Datum::Boolean(b)
    }
}

impl From<&str> for Datum {
    fn from(s: &str) -> Self {
        Datum::String(s.to_owned())
    }
}

impl From<Vec<Datum>> for Datum {
    fn from(items: Vec<Datum>) -> Self {
        Datum::List(items)
    }
}

impl<T: Into<Datum>, const N: usize> From<[T; N]> for Datum {
    fn from(items: [T; N]) -> Self {
        Datum::List(items.into_iter().map(Into::into).collect())
    }
}

/// Build a datum from a Rust literal, array or vector
pub fn val<T: Into<Datum>>(value: T) -> Datum {
    value.into()
}

pub fn sym(name: impl Into<String>) -> Datum {
    Datum::Symbol(name.into())
}

/// The empty list
pub fn nil() -> Datum {
    Datum::List(vec![])
}

pub fn dot() -> Datum {
    Datum::Dot
}

/// Renders a value with the interpreter's output rules. Obtained from [`Arena::display`].
pub struct DisplayValue<'a> {
    arena: &'a Arena,
    id: ValueId,
}

impl<'a> DisplayValue<'a> {
    pub(crate) fn new(arena: &'a Arena, id: ValueId) -> Self {
        DisplayValue { arena, id }
    }
}

impl fmt::Display for DisplayValue<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_value(self.arena, self.id, f)
    }
}

fn write_value(arena: &Arena, id: ValueId, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match arena.get(id) {
        Value::Integer(n) => write!(f, "{n}"),
        Value::Float(x) => write!(f, "{x:.6}"),
        Value::Boolean(true) => write!(f, "#t"),
        Value::Boolean(false) => write!(f, "#f"),
        // No escaping on output
        Value::String(s) => write!(f, "\"{s}\""),
        Value::Symbol(s) => write!(f, "{s}"),
        Value::Null => write!(f, "()"),
        Value::Pair(car, cdr) => {
            write!(f, "(")?;
            write_value(arena, *car, f)?;
            let mut tail = *cdr;
            loop {
                match arena.get(tail) {
                    Value::Null => break,
                    Value::Pair(car, cdr) => {
                        write!(f, " ")?;
                        write_value(arena, *car, f)?;
                        tail = *cdr;
                    }
                    _ => {
                        write!(f, " . ")?;
                        write_value(arena, tail, f)?;
                        break;
                    }
                }
            }
            write!(f, ")")
        }
        Value::Closure { .. } | Value::Primitive(_) => write!(f, "#<procedure>"),
        Value::Void => Ok(()),
        Value::DotMarker => write!(f, "."),
        Value::Unassigned => write!(f, "#<undefined>"),
    }
}
