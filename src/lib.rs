//! ArenaScheme - a tree-walking evaluator for a small Scheme dialect
//!
//! Every runtime value and every environment frame lives in a single [`arena::Arena`].
//! Values refer to each other through copyable handles, so reference cycles such as a
//! recursive closure capturing its own defining frame need no special handling: nothing
//! is freed individually, and the whole arena is released at once by a reset.
//!
//! ```scheme
//! (define fact
//!   (lambda (n)
//!     (if (<= n 1) 1 (* n (fact (- n 1))))))
//! (fact 10)              ; 3628800
//! (/ 1 3)                ; 0.333333
//! (car '(1 . 2))         ; 1
//! ```
//!
//! ## Language
//!
//! - Literals: integers, floats, booleans, strings, symbols and the empty list
//! - Special forms: `quote`, `if`, `cond`, `and`, `or`, `let`, `let*`, `letrec`,
//!   `define`, `set!`, `begin`, `lambda`, `load`
//! - Primitives: `+ - * / <= = eq? car cdr cons pair? null? number? zero? list? apply error`
//! - Closures with fixed, fully variadic (`(lambda args ...)`) or rest (`(a . rest)`)
//!   parameter lists
//! - Numeric tower with one-way promotion from exact integers to floats
//!
//! There is no tail-call elimination. Deep recursion consumes host stack, which is an
//! observable limit of the interpreter.
//!
//! ## Errors
//!
//! Evaluation never recovers locally: the first error propagates as [`Error`] to the
//! caller, which decides whether to report and continue (interactive use) or to abort
//! the run through [`arena::Arena::abort`] (batch use).
//!
//! ## Modules
//!
//! - `arena`: value and frame storage with bulk reset
//! - `ast`: the value model and output rendering
//! - `environment`: frame lookup, `define` and `set!`
//! - `evaluator`: `eval`/`apply` and the special forms
//! - `builtinops`: the builtin operation registry and primitive procedures
//! - `scheme`: S-expression reader

use std::fmt;

/// Categorizes the different kinds of parsing errors.
#[derive(Debug, PartialEq, Clone)]
pub enum ParseErrorKind {
    /// Invalid or unexpected syntax (bad tokens, stray parentheses, misplaced dots)
    InvalidSyntax,
    /// Input ended before the datum was complete (unterminated string, unclosed parens)
    Incomplete,
    /// Implementation-imposed limit exceeded (integer literal out of range)
    ImplementationLimit,
}

/// A structured error providing detailed information about a parsing failure.
#[derive(Debug, PartialEq, Clone)]
pub struct ParseError {
    pub kind: ParseErrorKind,
    pub message: String,
    /// Context snippet from the input showing where the error occurred (max 100 chars)
    pub context: Option<String>,
}

impl ParseError {
    /// Create a simple ParseError with a kind and message but no context
    pub fn from_message(kind: ParseErrorKind, message: impl Into<String>) -> Self {
        ParseError {
            kind,
            message: message.into(),
            context: None,
        }
    }

    /// Create a ParseError with context extracted from input at a given offset
    pub fn with_context(
        kind: ParseErrorKind,
        message: impl Into<String>,
        input: &str,
        error_offset: usize,
    ) -> Self {
        const MAX_CONTEXT: usize = 100;

        // `error_offset` is a byte offset; the window is measured in chars
        let error_char = input
            .get(..error_offset)
            .map_or(0, |before| before.chars().count());
        let context_start = error_char.saturating_sub(20);
        let context_str: String = input
            .chars()
            .skip(context_start)
            .take(MAX_CONTEXT)
            .collect();

        let mut display_context = String::new();
        if context_start > 0 {
            display_context.push_str("[...]");
        }
        display_context.push_str(&context_str);
        if context_start + context_str.chars().count() < input.chars().count() {
            display_context.push_str("[...]");
        }

        let display_context = display_context.replace('\n', "\\n").replace('\r', "");

        ParseError {
            kind,
            message: message.into(),
            context: Some(display_context),
        }
    }

    pub fn is_incomplete(&self) -> bool {
        self.kind == ParseErrorKind::Incomplete
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)?;
        if let Some(context) = &self.context {
            write!(f, "\nContext: {context}")?;
        }
        Ok(())
    }
}

/// Error types for the interpreter.
///
/// Evaluation failures carry the complete diagnostic text, which is printed after an
/// `Evaluation Error: ` prefix.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Error {
    #[error("Syntax error: {0}")]
    Parse(ParseError),
    /// Wrong operand or argument count for a special form, primitive or closure call
    #[error("Evaluation Error: {0}")]
    Arity(String),
    /// Operand of the wrong variant
    #[error("Evaluation Error: {0}")]
    Type(String),
    /// Lookup or `set!` of a name bound in no frame of the chain
    #[error("Evaluation Error: {0}")]
    UnboundSymbol(String),
    /// Malformed special-form shape
    #[error("Evaluation Error: {0}")]
    Syntax(String),
    /// A `letrec` binding read before its initialization completed
    #[error("Evaluation Error: {0}")]
    LetrecOrder(String),
    #[error("Evaluation Error: {0}")]
    DivideByZero(String),
    /// Raised by the `error` primitive
    #[error("Evaluation Error: {0}")]
    User(String),
    /// Exact integer arithmetic left the `i64` range
    #[error("Evaluation Error: {0}")]
    Overflow(String),
    /// A `load` target could not be read
    #[error("Evaluation Error: {0}")]
    Load(String),
    /// Writing results to the output sink failed
    #[error("I/O error: {0}")]
    Io(String),
}

impl Error {
    pub fn unbound_symbol(name: &str) -> Self {
        Error::UnboundSymbol(format!("Failed to find the symbol: {name}"))
    }

    /// Arity failure reported by the central check on primitive calls
    pub fn primitive_arity(op: &str) -> Self {
        Error::Arity(format!("Wrong number of arguments provided for {op}"))
    }

    pub fn primitive_type(op: &str) -> Self {
        Error::Type(format!("Wrong argument type provided for {op}"))
    }

    pub fn overflow(op: &str) -> Self {
        Error::Overflow(format!("Integer overflow in {op}"))
    }
}

impl From<ParseError> for Error {
    fn from(error: ParseError) -> Self {
        Error::Parse(error)
    }
}

pub mod arena;
pub mod ast;
pub mod builtinops;
pub mod environment;
pub mod evaluator;
pub mod scheme;

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_error_context_window() {
        let test_cases = vec![
            ("(car ]", 5, "(car ]"),
            ("(f \"é\") ]", 9, "(f \"é\") ]"),
            ("(f \"ééééééééééééééééééééééé\") ]", 53, "[...]ééééééééééééééééé\") ]"),
            ("(a\nb", 3, "(a\\nb"),
        ];

        for (input, offset, expected) in test_cases {
            let err = ParseError::with_context(ParseErrorKind::InvalidSyntax, "bad", input, offset);
            assert_eq!(err.context.as_deref(), Some(expected), "context for {input:?}");
        }

        let long = "x".repeat(150);
        let err = ParseError::with_context(ParseErrorKind::InvalidSyntax, "bad", &long, 0);
        assert_eq!(err.context, Some(format!("{}[...]", "x".repeat(100))));
    }
}
