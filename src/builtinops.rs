//! Built-in operations registry.
//!
//! Every name with built-in meaning is listed once in a single registry, tagged with its
//! kind and arity:
//!
//! - **Special forms** receive their operands unevaluated together with the current
//!   frame (`if`, `let`, `lambda`, ...). Their names are reserved: the evaluator dispatches
//!   on them before looking anything up, so they cannot be shadowed.
//! - **Functions** (primitives) receive evaluated arguments. They are bound into the root
//!   frame when an interpreter is created and are ordinary values from then on.
//!
//! ```scheme
//! (+ 1 2.5)          ; 3.500000
//! (/ 6 4)            ; 1.500000
//! (cdr '(1 . 2))     ; 2
//! (apply + 1 '(2 3)) ; 6
//! ```
//!
//! ## Numeric tower
//!
//! Arithmetic starts exact. The first inexact operand turns the running result inexact
//! for the rest of the call. `/` stays exact only when every division is even. Exact
//! overflow is reported as an error instead of wrapping.
//!
//! ## Adding New Operations
//!
//! 1. **Implement the function** following [`PrimitiveFn`] (or [`SpecialFormFn`] in the
//!    evaluator for special forms)
//! 2. **Add to BUILTIN_OPS** with its Scheme identifier and arity
//! 3. **Add tests** covering the happy path and the error messages

use std::collections::HashMap;
use std::sync::LazyLock;

use crate::Error;
use crate::arena::{Arena, FrameId, ValueId};
use crate::ast::{Number, NumberType, Value};
use crate::evaluator::{
    Interpreter, eval_and, eval_begin, eval_cond, eval_define, eval_if, eval_lambda, eval_let,
    eval_let_star, eval_letrec, eval_load, eval_or, eval_quote, eval_set,
};

/// Native implementation of a primitive procedure, called with evaluated arguments
pub type PrimitiveFn = fn(&mut Interpreter, &[ValueId]) -> Result<ValueId, Error>;

/// Implementation of a special form, called with unevaluated operands and the current frame
pub type SpecialFormFn = fn(&mut Interpreter, &[ValueId], FrameId) -> Result<ValueId, Error>;

/// Represents the implementation of a built-in expression (function or special form)
#[derive(Clone, Copy)]
pub enum OpKind {
    Function(PrimitiveFn),
    SpecialForm(SpecialFormFn),
}

impl std::fmt::Debug for OpKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OpKind::Function(_) => write!(f, "Function(<fn>)"),
            OpKind::SpecialForm(_) => write!(f, "SpecialForm(<fn>)"),
        }
    }
}

/// Accepted argument counts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    Exact(usize),
    AtLeast(usize),
    /// Inclusive bounds
    Range(usize, usize),
    Any,
}

impl Arity {
    pub fn accepts(self, count: usize) -> bool {
        match self {
            Arity::Exact(n) => count == n,
            Arity::AtLeast(n) => count >= n,
            Arity::Range(min, max) => (min..=max).contains(&count),
            Arity::Any => true,
        }
    }
}

/// Definition of a built-in operation
#[derive(Debug, Clone)]
pub struct BuiltinOp {
    /// The Scheme identifier for this operation
    pub scheme_id: &'static str,
    pub op_kind: OpKind,
    /// Operand count accepted by the operation. Primitive calls are checked against it
    /// before dispatch; special forms report their own shape errors.
    pub arity: Arity,
}

impl PartialEq for BuiltinOp {
    fn eq(&self, other: &Self) -> bool {
        self.scheme_id == other.scheme_id
    }
}

impl BuiltinOp {
    pub fn is_special_form(&self) -> bool {
        matches!(self.op_kind, OpKind::SpecialForm(_))
    }

    pub(crate) fn validate_arity(&self, count: usize) -> Result<(), Error> {
        if self.arity.accepts(count) {
            Ok(())
        } else {
            Err(arity_error(self.scheme_id))
        }
    }
}

/// Diagnostic for a primitive called with the wrong argument count. A few primitives
/// have their own wording; `error` treats any misuse as a syntax problem.
fn arity_error(scheme_id: &str) -> Error {
    match scheme_id {
        "apply" => Error::Arity("Wrong number of arguments for primitive apply.".into()),
        "pair?" => Error::Arity("Wrong number of arguments provided for pair? ".into()),
        "list?" => Error::Arity("Provided the wrong number of arguments for list? ".into()),
        "error" => Error::Syntax("Invalid syntax in error".into()),
        _ => Error::primitive_arity(scheme_id),
    }
}

fn number_arg(arena: &Arena, id: ValueId, op: &str) -> Result<Number, Error> {
    Number::from_value(arena.get(id)).ok_or_else(|| Error::primitive_type(op))
}

fn number_args(arena: &Arena, args: &[ValueId], op: &str) -> Result<Vec<Number>, Error> {
    args.iter().map(|id| number_arg(arena, *id, op)).collect()
}

fn alloc_number(interp: &mut Interpreter, number: Number) -> ValueId {
    interp.arena_mut().alloc(number.into_value())
}

/// Combine two numbers, staying exact only while both sides are exact
fn combine(
    a: Number,
    b: Number,
    op: &str,
    exact: fn(NumberType, NumberType) -> Option<NumberType>,
    inexact: fn(f64, f64) -> f64,
) -> Result<Number, Error> {
    match (a, b) {
        (Number::Exact(x), Number::Exact(y)) => {
            exact(x, y).map(Number::Exact).ok_or_else(|| Error::overflow(op))
        }
        (x, y) => Ok(Number::Inexact(inexact(x.as_f64(), y.as_f64()))),
    }
}

fn builtin_add(interp: &mut Interpreter, args: &[ValueId]) -> Result<ValueId, Error> {
    let mut sum = Number::Exact(0);
    for n in number_args(interp.arena(), args, "+")? {
        sum = combine(sum, n, "+", NumberType::checked_add, |x, y| x + y)?;
    }
    Ok(alloc_number(interp, sum))
}

fn builtin_mul(interp: &mut Interpreter, args: &[ValueId]) -> Result<ValueId, Error> {
    let mut product = Number::Exact(1);
    for n in number_args(interp.arena(), args, "*")? {
        product = combine(product, n, "*", NumberType::checked_mul, |x, y| x * y)?;
    }
    Ok(alloc_number(interp, product))
}

fn builtin_sub(interp: &mut Interpreter, args: &[ValueId]) -> Result<ValueId, Error> {
    let numbers = number_args(interp.arena(), args, "-")?;
    let result = match numbers.as_slice() {
        [] => return Err(arity_error("-")),
        [Number::Exact(n)] => Number::Exact(n.checked_neg().ok_or_else(|| Error::overflow("-"))?),
        [Number::Inexact(x)] => Number::Inexact(-x),
        [first, rest @ ..] => {
            let mut difference = *first;
            for n in rest {
                difference = combine(difference, *n, "-", NumberType::checked_sub, |x, y| x - y)?;
            }
            difference
        }
    };
    Ok(alloc_number(interp, result))
}

/// A zero divisor is reported before the type of any later divisor is looked at
fn builtin_div(interp: &mut Interpreter, args: &[ValueId]) -> Result<ValueId, Error> {
    let arena = interp.arena();
    let Some((first, divisors)) = args.split_first() else {
        return Err(arity_error("/"));
    };
    let first = number_arg(arena, *first, "/")?;
    let result = if divisors.is_empty() {
        if first.is_zero() {
            return Err(Error::DivideByZero("Can't divide by zero.".into()));
        }
        Number::Inexact(1.0 / first.as_f64())
    } else {
        let mut quotient = first;
        for id in divisors {
            let divisor = Number::from_value(arena.get(*id));
            if divisor.is_some_and(Number::is_zero) {
                return Err(Error::DivideByZero("Cannot divide by zero".into()));
            }
            let divisor = divisor.ok_or_else(|| Error::primitive_type("/"))?;
            quotient = divide(quotient, divisor)?;
        }
        quotient
    };
    Ok(alloc_number(interp, result))
}

/// Exact division survives only when the dividend divides evenly
fn divide(dividend: Number, divisor: Number) -> Result<Number, Error> {
    match (dividend, divisor) {
        (Number::Exact(a), Number::Exact(b)) => match a.checked_rem(b) {
            Some(0) => a
                .checked_div(b)
                .map(Number::Exact)
                .ok_or_else(|| Error::overflow("/")),
            Some(_) => Ok(Number::Inexact(dividend.as_f64() / divisor.as_f64())),
            None => Err(Error::overflow("/")),
        },
        (a, b) => Ok(Number::Inexact(a.as_f64() / b.as_f64())),
    }
}

fn builtin_le(interp: &mut Interpreter, args: &[ValueId]) -> Result<ValueId, Error> {
    let numbers = number_args(interp.arena(), args, "<=")?;
    let ordered = numbers.windows(2).all(|w| w[0].le(w[1]));
    Ok(interp.arena_mut().boolean(ordered))
}

/// Numeric equality: the operands are both non-decreasing and non-increasing.
/// Operand types are checked as by `<=`, and reported under its name.
fn builtin_num_eq(interp: &mut Interpreter, args: &[ValueId]) -> Result<ValueId, Error> {
    let numbers = number_args(interp.arena(), args, "<=")?;
    let non_decreasing = numbers.windows(2).all(|w| w[0].le(w[1]));
    let non_increasing = numbers.windows(2).all(|w| w[1].le(w[0]));
    Ok(interp.arena_mut().boolean(non_decreasing && non_increasing))
}

/// Identity for pairs and procedures, content for atoms, never across variants
fn builtin_eq(interp: &mut Interpreter, args: &[ValueId]) -> Result<ValueId, Error> {
    let [a, b] = args else {
        return Err(arity_error("eq?"));
    };
    let arena = interp.arena();
    let same = match (arena.get(*a), arena.get(*b)) {
        (Value::Integer(x), Value::Integer(y)) => x == y,
        (Value::Float(x), Value::Float(y)) => x == y,
        (Value::Boolean(x), Value::Boolean(y)) => x == y,
        (Value::Symbol(x), Value::Symbol(y)) | (Value::String(x), Value::String(y)) => x == y,
        (Value::Null, Value::Null) => true,
        (Value::Pair(..), Value::Pair(..))
        | (Value::Closure { .. }, Value::Closure { .. })
        | (Value::Primitive(_), Value::Primitive(_)) => a == b,
        (x, y) if std::mem::discriminant(x) != std::mem::discriminant(y) => false,
        _ => return Err(Error::primitive_type("eq?")),
    };
    Ok(interp.arena_mut().boolean(same))
}

fn builtin_car(interp: &mut Interpreter, args: &[ValueId]) -> Result<ValueId, Error> {
    let [list] = args else {
        return Err(arity_error("car"));
    };
    match interp.arena().get(*list) {
        Value::Pair(car, _) => Ok(*car),
        _ => Err(Error::primitive_type("car")),
    }
}

/// `cdr` collapses a dotted tail `(. x)` to `x`
fn builtin_cdr(interp: &mut Interpreter, args: &[ValueId]) -> Result<ValueId, Error> {
    let [list] = args else {
        return Err(arity_error("cdr"));
    };
    let arena = interp.arena();
    let Value::Pair(_, cdr) = arena.get(*list) else {
        return Err(Error::primitive_type("cdr"));
    };
    match arena.get(*cdr) {
        Value::Pair(marker, rest) if matches!(arena.get(*marker), Value::DotMarker) => {
            match arena.get(*rest) {
                Value::Pair(value, tail) if matches!(arena.get(*tail), Value::Null) => Ok(*value),
                _ => Err(Error::Syntax(
                    "Wrong number of arguments after . in list".into(),
                )),
            }
        }
        _ => Ok(*cdr),
    }
}

fn builtin_cons(interp: &mut Interpreter, args: &[ValueId]) -> Result<ValueId, Error> {
    let [car, cdr] = args else {
        return Err(arity_error("cons"));
    };
    Ok(interp.arena_mut().cons(*car, *cdr))
}

/// Shared body of the one-argument type predicates
fn predicate(
    interp: &mut Interpreter,
    args: &[ValueId],
    op: &str,
    test: fn(&Arena, ValueId) -> bool,
) -> Result<ValueId, Error> {
    let [arg] = args else {
        return Err(arity_error(op));
    };
    let result = test(interp.arena(), *arg);
    Ok(interp.arena_mut().boolean(result))
}

fn builtin_pair_p(interp: &mut Interpreter, args: &[ValueId]) -> Result<ValueId, Error> {
    predicate(interp, args, "pair?", |arena, id| {
        matches!(arena.get(id), Value::Pair(..))
    })
}

fn builtin_null_p(interp: &mut Interpreter, args: &[ValueId]) -> Result<ValueId, Error> {
    predicate(interp, args, "null?", |arena, id| {
        matches!(arena.get(id), Value::Null)
    })
}

fn builtin_number_p(interp: &mut Interpreter, args: &[ValueId]) -> Result<ValueId, Error> {
    predicate(interp, args, "number?", |arena, id| {
        Number::from_value(arena.get(id)).is_some()
    })
}

fn builtin_list_p(interp: &mut Interpreter, args: &[ValueId]) -> Result<ValueId, Error> {
    predicate(interp, args, "list?", |arena, id| {
        arena.list_to_vec(id).is_some()
    })
}

fn builtin_zero_p(interp: &mut Interpreter, args: &[ValueId]) -> Result<ValueId, Error> {
    let [arg] = args else {
        return Err(arity_error("zero?"));
    };
    let zero = number_arg(interp.arena(), *arg, "zero?")?.is_zero();
    Ok(interp.arena_mut().boolean(zero))
}

/// `(apply f a b '(c d))` calls `f` with `a b c d`
fn builtin_apply(interp: &mut Interpreter, args: &[ValueId]) -> Result<ValueId, Error> {
    let [procedure, middle @ .., last] = args else {
        return Err(arity_error("apply"));
    };
    let Some(tail) = interp.arena().list_to_vec(*last) else {
        return Err(Error::Type(
            "Last argument for primitive apply is not a list".into(),
        ));
    };
    let mut call_args = middle.to_vec();
    call_args.extend(tail);
    interp.apply(*procedure, &call_args)
}

fn builtin_error(interp: &mut Interpreter, args: &[ValueId]) -> Result<ValueId, Error> {
    match args {
        [] => Err(Error::User("Error thrown by (error)".into())),
        [message] => match interp.arena().get(*message) {
            Value::String(text) => Err(Error::User(text.clone())),
            _ => Err(arity_error("error")),
        },
        _ => Err(arity_error("error")),
    }
}

/// Global registry of all built-in operations
static BUILTIN_OPS: LazyLock<Vec<BuiltinOp>> = LazyLock::new(|| {
    vec![
        // Arithmetic
        BuiltinOp {
            scheme_id: "+",
            op_kind: OpKind::Function(builtin_add),
            arity: Arity::Any,
        },
        BuiltinOp {
            scheme_id: "-",
            op_kind: OpKind::Function(builtin_sub),
            arity: Arity::AtLeast(1),
        },
        BuiltinOp {
            scheme_id: "*",
            op_kind: OpKind::Function(builtin_mul),
            arity: Arity::Any,
        },
        BuiltinOp {
            scheme_id: "/",
            op_kind: OpKind::Function(builtin_div),
            arity: Arity::AtLeast(1),
        },
        // Comparison
        BuiltinOp {
            scheme_id: "<=",
            op_kind: OpKind::Function(builtin_le),
            arity: Arity::AtLeast(2),
        },
        BuiltinOp {
            scheme_id: "=",
            op_kind: OpKind::Function(builtin_num_eq),
            arity: Arity::AtLeast(2),
        },
        BuiltinOp {
            scheme_id: "eq?",
            op_kind: OpKind::Function(builtin_eq),
            arity: Arity::Exact(2),
        },
        // Pairs and lists
        BuiltinOp {
            scheme_id: "car",
            op_kind: OpKind::Function(builtin_car),
            arity: Arity::Exact(1),
        },
        BuiltinOp {
            scheme_id: "cdr",
            op_kind: OpKind::Function(builtin_cdr),
            arity: Arity::Exact(1),
        },
        BuiltinOp {
            scheme_id: "cons",
            op_kind: OpKind::Function(builtin_cons),
            arity: Arity::Exact(2),
        },
        // Type predicates
        BuiltinOp {
            scheme_id: "pair?",
            op_kind: OpKind::Function(builtin_pair_p),
            arity: Arity::Exact(1),
        },
        BuiltinOp {
            scheme_id: "null?",
            op_kind: OpKind::Function(builtin_null_p),
            arity: Arity::Exact(1),
        },
        BuiltinOp {
            scheme_id: "number?",
            op_kind: OpKind::Function(builtin_number_p),
            arity: Arity::Exact(1),
        },
        BuiltinOp {
            scheme_id: "zero?",
            op_kind: OpKind::Function(builtin_zero_p),
            arity: Arity::Exact(1),
        },
        BuiltinOp {
            scheme_id: "list?",
            op_kind: OpKind::Function(builtin_list_p),
            arity: Arity::Exact(1),
        },
        // Control
        BuiltinOp {
            scheme_id: "apply",
            op_kind: OpKind::Function(builtin_apply),
            arity: Arity::AtLeast(2),
        },
        BuiltinOp {
            scheme_id: "error",
            op_kind: OpKind::Function(builtin_error),
            arity: Arity::Range(0, 1),
        },
        // Special forms
        BuiltinOp {
            scheme_id: "quote",
            op_kind: OpKind::SpecialForm(eval_quote),
            arity: Arity::Exact(1),
        },
        BuiltinOp {
            scheme_id: "if",
            op_kind: OpKind::SpecialForm(eval_if),
            arity: Arity::Range(2, 3),
        },
        BuiltinOp {
            scheme_id: "cond",
            op_kind: OpKind::SpecialForm(eval_cond),
            arity: Arity::Any,
        },
        BuiltinOp {
            scheme_id: "and",
            op_kind: OpKind::SpecialForm(eval_and),
            arity: Arity::Any,
        },
        BuiltinOp {
            scheme_id: "or",
            op_kind: OpKind::SpecialForm(eval_or),
            arity: Arity::Any,
        },
        BuiltinOp {
            scheme_id: "let",
            op_kind: OpKind::SpecialForm(eval_let),
            arity: Arity::AtLeast(2),
        },
        BuiltinOp {
            scheme_id: "let*",
            op_kind: OpKind::SpecialForm(eval_let_star),
            arity: Arity::AtLeast(2),
        },
        BuiltinOp {
            scheme_id: "letrec",
            op_kind: OpKind::SpecialForm(eval_letrec),
            arity: Arity::AtLeast(2),
        },
        BuiltinOp {
            scheme_id: "define",
            op_kind: OpKind::SpecialForm(eval_define),
            arity: Arity::Exact(2),
        },
        BuiltinOp {
            scheme_id: "set!",
            op_kind: OpKind::SpecialForm(eval_set),
            arity: Arity::Exact(2),
        },
        BuiltinOp {
            scheme_id: "begin",
            op_kind: OpKind::SpecialForm(eval_begin),
            arity: Arity::Any,
        },
        BuiltinOp {
            scheme_id: "lambda",
            op_kind: OpKind::SpecialForm(eval_lambda),
            arity: Arity::Exact(2),
        },
        BuiltinOp {
            scheme_id: "load",
            op_kind: OpKind::SpecialForm(eval_load),
            arity: Arity::Exact(1),
        },
    ]
});

/// Lazy static map from scheme_id to BuiltinOp (private - use find_scheme_op)
static BUILTIN_SCHEME: LazyLock<HashMap<&'static str, &'static BuiltinOp>> = LazyLock::new(|| {
    let ops: &'static [BuiltinOp] = BUILTIN_OPS.as_slice();
    ops.iter().map(|op| (op.scheme_id, op)).collect()
});

/// Get all builtin operations
pub fn get_builtin_ops() -> &'static [BuiltinOp] {
    BUILTIN_OPS.as_slice()
}

/// Find a builtin operation by its Scheme identifier
pub fn find_scheme_op(id: &str) -> Option<&'static BuiltinOp> {
    BUILTIN_SCHEME.get(id).copied()
}

/// Find the special form reserved under `id`, if any
pub(crate) fn find_special_form(id: &str) -> Option<SpecialFormFn> {
    match find_scheme_op(id)?.op_kind {
        OpKind::SpecialForm(form) => Some(form),
        OpKind::Function(_) => None,
    }
}
