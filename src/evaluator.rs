use std::fmt;
use std::fs;
use std::io::{self, Write};
use std::path::Path;

use tracing::{debug, trace};

use crate::Error;
use crate::arena::{Arena, FrameId, ValueId};
use crate::ast::{DisplayValue, Value};
use crate::builtinops::{OpKind, find_special_form, get_builtin_ops};
use crate::scheme::parse_program;

/// Message shared by the binding checks of `let`, `let*` and `letrec`
const DUPLICATE_IDENTIFIER: &str = "Duplicate identifier in let assignment.";

const LETREC_ORDER: &str = "Expression in letrec binding could not be evaluated without assigning or referring to the value of another variable in same letrec";

/// One interpreter instance: the arena holding every value and frame, the root frame with
/// the primitives bound, and the sink results are printed to.
pub struct Interpreter {
    arena: Arena,
    global: FrameId,
    output: Box<dyn Write>,
}

impl fmt::Debug for Interpreter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Interpreter")
            .field("arena", &self.arena.stats())
            .field("global", &self.global)
            .finish_non_exhaustive()
    }
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new()
    }
}

/// Allocate the root frame and bind every primitive procedure into it
pub fn create_global_frame(arena: &mut Arena) -> FrameId {
    let global = arena.alloc_frame(None);
    for op in get_builtin_ops() {
        if !op.is_special_form() {
            arena.bind_primitive(global, op);
        }
    }
    global
}

impl Interpreter {
    /// Create an interpreter that prints results to stdout
    pub fn new() -> Self {
        Self::with_output(io::stdout())
    }

    /// Create an interpreter that prints results (from `load` and [`Self::interpret`]) to
    /// `output`
    pub fn with_output(output: impl Write + 'static) -> Self {
        let mut arena = Arena::new();
        let global = create_global_frame(&mut arena);
        debug!(stats = ?arena.stats(), "interpreter created");
        Interpreter {
            arena,
            global,
            output: Box::new(output),
        }
    }

    pub fn global_frame(&self) -> FrameId {
        self.global
    }

    pub fn arena(&self) -> &Arena {
        &self.arena
    }

    pub fn arena_mut(&mut self) -> &mut Arena {
        &mut self.arena
    }

    pub fn display(&self, id: ValueId) -> DisplayValue<'_> {
        self.arena.display(id)
    }

    /// Drop every value and frame and start over with a fresh root frame.
    /// All previously returned handles become invalid.
    pub fn reset(&mut self) {
        self.arena.reset();
        self.global = create_global_frame(&mut self.arena);
    }

    /// Flush pending output, then reset the arena and exit the process with `code`
    pub fn abort(&mut self, code: i32) -> ! {
        let _ = self.output.flush();
        self.arena.abort(code)
    }

    /// Parse `source` and allocate each top-level form in the arena
    pub fn read(&mut self, source: &str) -> Result<Vec<ValueId>, Error> {
        let data = parse_program(source)?;
        Ok(data
            .iter()
            .map(|datum| self.arena.alloc_datum(datum))
            .collect())
    }

    /// Print a top-level result followed by a newline. Void prints nothing.
    pub fn write_result(&mut self, value: ValueId) -> Result<(), Error> {
        if matches!(self.arena.get(value), Value::Void) {
            return Ok(());
        }
        writeln!(self.output, "{}", self.arena.display(value))
            .and_then(|()| self.output.flush())
            .map_err(|e| Error::Io(e.to_string()))
    }

    /// Evaluate every form of `source` in `frame`, printing each non-Void result.
    /// Stops at the first error.
    pub fn interpret(&mut self, source: &str, frame: FrameId) -> Result<(), Error> {
        let forms = self.read(source)?;
        self.eval_and_print(&forms, frame)
    }

    fn eval_and_print(&mut self, forms: &[ValueId], frame: FrameId) -> Result<(), Error> {
        for expr in forms {
            let value = self.eval(*expr, frame)?;
            self.write_result(value)?;
        }
        Ok(())
    }

    /// Evaluate every form of `source` in the root frame without printing, returning the
    /// last result (Void for empty input)
    pub fn eval_str(&mut self, source: &str) -> Result<ValueId, Error> {
        let mut last = None;
        for expr in self.read(source)? {
            last = Some(self.eval(expr, self.global)?);
        }
        match last {
            Some(value) => Ok(value),
            None => Ok(self.arena.void()),
        }
    }

    /// Read the file at `path` and evaluate its forms in `frame`, printing results like
    /// the top level does
    pub fn load(&mut self, path: &Path, frame: FrameId) -> Result<(), Error> {
        let source = fs::read_to_string(path).map_err(|e| {
            debug!(path = %path.display(), error = %e, "load failed");
            Error::Load("The given file could not be opened".into())
        })?;
        let forms = self.read(&source)?;
        debug!(path = %path.display(), forms = forms.len(), "loading");
        self.eval_and_print(&forms, frame)?;
        debug!(path = %path.display(), forms = forms.len(), "loaded");
        Ok(())
    }

    /// Evaluate `expr` in `frame`.
    ///
    /// Recursion follows the structure of the program; there is no tail-call elimination.
    pub fn eval(&mut self, expr: ValueId, frame: FrameId) -> Result<ValueId, Error> {
        match self.arena.get(expr) {
            Value::Integer(_) | Value::Float(_) | Value::Boolean(_) | Value::String(_) => {
                Ok(expr)
            }
            Value::Null => Ok(self.arena.null()),
            Value::Symbol(name) => self.arena.lookup(frame, name),
            &Value::Pair(head, operands) => self.eval_combination(head, operands, frame),
            Value::DotMarker
            | Value::Closure { .. }
            | Value::Primitive(_)
            | Value::Void
            | Value::Unassigned => Err(Error::Syntax("Input not of a specified type.".into())),
        }
    }

    /// Dispatch a special form on the head symbol, or evaluate a procedure application
    fn eval_combination(
        &mut self,
        head: ValueId,
        operands: ValueId,
        frame: FrameId,
    ) -> Result<ValueId, Error> {
        let operands = self
            .arena
            .list_to_vec(operands)
            .ok_or_else(|| Error::Syntax("Improper list in combination".into()))?;

        let special_form = match self.arena.get(head) {
            Value::Symbol(name) => {
                let form = find_special_form(name);
                if form.is_some() {
                    trace!(form = %name, "special form");
                }
                form
            }
            Value::Pair(..) => None,
            _ => {
                return Err(Error::Type(
                    "First element in a list is not a symbol.".into(),
                ));
            }
        };
        if let Some(form) = special_form {
            return form(self, &operands, frame);
        }

        let procedure = self.eval(head, frame)?;
        let args = self.eval_operands(&operands, frame)?;
        self.apply(procedure, &args)
    }

    /// Evaluate arguments left to right
    fn eval_operands(&mut self, operands: &[ValueId], frame: FrameId) -> Result<Vec<ValueId>, Error> {
        let mut args = Vec::with_capacity(operands.len());
        for operand in operands {
            args.push(self.eval(*operand, frame)?);
        }
        Ok(args)
    }

    /// Call `procedure` with already evaluated arguments
    pub fn apply(&mut self, procedure: ValueId, args: &[ValueId]) -> Result<ValueId, Error> {
        match *self.arena.get(procedure) {
            Value::Primitive(op) => {
                trace!(primitive = op.scheme_id, argc = args.len(), "apply");
                op.validate_arity(args.len())?;
                match op.op_kind {
                    OpKind::Function(func) => func(self, args),
                    OpKind::SpecialForm(_) => Err(Error::Type(
                        "function should be closure or primitive type".into(),
                    )),
                }
            }
            Value::Closure {
                params,
                body,
                frame,
            } => {
                trace!(argc = args.len(), "apply closure");
                let call_frame = self.arena.alloc_frame(Some(frame));
                self.bind_parameters(params, args, call_frame)?;
                self.eval(body, call_frame)
            }
            _ => Err(Error::Type(
                "function should be closure or primitive type".into(),
            )),
        }
    }

    /// Bind `args` in `frame` according to one of the three parameter shapes: a bare
    /// symbol, a proper list of symbols, or a list whose last two elements are a
    /// DotMarker and the rest symbol
    fn bind_parameters(
        &mut self,
        params: ValueId,
        args: &[ValueId],
        frame: FrameId,
    ) -> Result<(), Error> {
        if let Value::Symbol(name) = self.arena.get(params) {
            let name = name.clone();
            let rest = self.arena.list(args);
            self.arena.bind(frame, &name, rest);
            return Ok(());
        }

        if args.is_empty() && matches!(self.arena.get(params), Value::Pair(..)) {
            return Err(Error::Arity("Not enough parameters in function call.".into()));
        }

        let mut cursor = params;
        let mut remaining = args;
        loop {
            match *self.arena.get(cursor) {
                Value::Null if remaining.is_empty() => return Ok(()),
                Value::Null => {
                    return Err(Error::Arity("Too many parameters in function call.".into()));
                }
                Value::Pair(param, next) => match self.arena.get(param) {
                    Value::DotMarker => return self.bind_rest(next, remaining, frame),
                    Value::Symbol(name) => {
                        let Some((arg, rest)) = remaining.split_first() else {
                            return Err(Error::Arity("Not enough parameters in fx call.".into()));
                        };
                        let name = name.clone();
                        self.arena.bind(frame, &name, *arg);
                        remaining = rest;
                        cursor = next;
                    }
                    _ => {
                        return Err(Error::Syntax(
                            "Formal parameters must be symbols".into(),
                        ));
                    }
                },
                _ => {
                    return Err(Error::Syntax(
                        "Wrong formal parameter type in lambda definition".into(),
                    ));
                }
            }
        }
    }

    /// `after_dot` must hold exactly one symbol, which receives the remaining arguments
    fn bind_rest(
        &mut self,
        after_dot: ValueId,
        remaining: &[ValueId],
        frame: FrameId,
    ) -> Result<(), Error> {
        let name = match self.arena.list_to_vec(after_dot).as_deref() {
            Some([id]) => match self.arena.get(*id) {
                Value::Symbol(name) => Some(name.clone()),
                _ => None,
            },
            _ => None,
        };
        let Some(name) = name else {
            return Err(Error::Syntax(
                "Wrong number of args after . in parameters list".into(),
            ));
        };
        let rest = self.arena.list(remaining);
        self.arena.bind(frame, &name, rest);
        Ok(())
    }

    /// Evaluate a body sequence, returning the last value (Void when empty)
    fn eval_sequence(&mut self, exprs: &[ValueId], frame: FrameId) -> Result<ValueId, Error> {
        let mut result = None;
        for expr in exprs {
            result = Some(self.eval(*expr, frame)?);
        }
        match result {
            Some(value) => Ok(value),
            None => Ok(self.arena.void()),
        }
    }

    fn is_false(&self, value: ValueId) -> bool {
        self.arena.get(value).is_false()
    }

    fn symbol_name(&self, id: ValueId) -> Option<String> {
        match self.arena.get(id) {
            Value::Symbol(name) => Some(name.clone()),
            _ => None,
        }
    }

    /// Split one `(name expr)` binding of a let-family form
    fn parse_binding(&self, binding: ValueId) -> Result<(String, ValueId), Error> {
        let parts = self
            .arena
            .list_to_vec(binding)
            .ok_or_else(|| Error::Syntax("Missing block in let assignment.".into()))?;
        match parts.as_slice() {
            [name, expr] => match self.symbol_name(*name) {
                Some(name) => Ok((name, *expr)),
                None => Err(Error::Syntax("Let can only bind to a symbol.".into())),
            },
            [] | [_] => Err(Error::Syntax("Missing block in let assignment.".into())),
            _ => Err(Error::Syntax(
                "Too many blocks provided in let assignment.".into(),
            )),
        }
    }

    /// Validate the shared `(form (bindings...) body...)` shape and split off the
    /// binding list. Each binding is checked by [`Self::parse_binding`] when it is reached.
    fn parse_let_form<'a>(
        &self,
        form: &str,
        args: &'a [ValueId],
    ) -> Result<(Vec<ValueId>, &'a [ValueId]), Error> {
        let [bindings, body @ ..] = args else {
            return Err(Error::Syntax(format!("Not enough blocks after '{form}'")));
        };
        if body.is_empty() {
            return Err(Error::Syntax(format!("Not enough blocks after '{form}'")));
        }
        let bindings = self
            .arena
            .list_to_vec(*bindings)
            .ok_or_else(|| Error::Syntax(format!("Invalid syntax in '{form}'")))?;
        Ok((bindings, body))
    }
}

/// `name` must not already be among the bindings made so far by the same let/letrec
fn check_not_bound(bound: &[(String, ValueId)], name: &str) -> Result<(), Error> {
    if bound.iter().any(|(earlier, _)| earlier == name) {
        return Err(Error::Syntax(DUPLICATE_IDENTIFIER.into()));
    }
    Ok(())
}

/// Evaluate quote special form
pub(crate) fn eval_quote(
    _interp: &mut Interpreter,
    args: &[ValueId],
    _frame: FrameId,
) -> Result<ValueId, Error> {
    match args {
        [expr] => Ok(*expr),
        [] => Err(Error::Arity("Not enough arguments for quote.".into())),
        _ => Err(Error::Arity("Too many arguments for quote.".into())),
    }
}

/// Evaluate if special form; the else branch is optional
pub(crate) fn eval_if(
    interp: &mut Interpreter,
    args: &[ValueId],
    frame: FrameId,
) -> Result<ValueId, Error> {
    let (test, consequent, alternative) = match args {
        [test, consequent] => (*test, *consequent, None),
        [test, consequent, alternative] => (*test, *consequent, Some(*alternative)),
        [] | [_] => {
            return Err(Error::Arity("Not enough blocks in an if statement".into()));
        }
        _ => return Err(Error::Arity("Too many blocks in an if statement".into())),
    };

    let condition = interp.eval(test, frame)?;
    if !interp.is_false(condition) {
        interp.eval(consequent, frame)
    } else if let Some(alternative) = alternative {
        interp.eval(alternative, frame)
    } else {
        Ok(interp.arena.void())
    }
}

/// Evaluate cond special form. Every clause is checked before anything is evaluated.
pub(crate) fn eval_cond(
    interp: &mut Interpreter,
    args: &[ValueId],
    frame: FrameId,
) -> Result<ValueId, Error> {
    let mut clauses = Vec::with_capacity(args.len());
    for (i, clause) in args.iter().enumerate() {
        let (test, expr) = match interp.arena.list_to_vec(*clause).as_deref() {
            Some([test, expr]) => (*test, *expr),
            _ => {
                return Err(Error::Syntax(
                    "Wrong number of items in a cond clause".into(),
                ));
            }
        };
        let is_else = interp.symbol_name(test).is_some_and(|name| name == "else");
        if is_else && i + 1 != args.len() {
            return Err(Error::Syntax(
                "'else' can only appear as the last clause in cond statement".into(),
            ));
        }
        clauses.push((is_else, test, expr));
    }

    for (is_else, test, expr) in clauses {
        if is_else {
            return interp.eval(expr, frame);
        }
        let condition = interp.eval(test, frame)?;
        if !interp.is_false(condition) {
            return interp.eval(expr, frame);
        }
    }
    Ok(interp.arena.void())
}

/// Evaluate and special form: the first `#f`, else the last value
pub(crate) fn eval_and(
    interp: &mut Interpreter,
    args: &[ValueId],
    frame: FrameId,
) -> Result<ValueId, Error> {
    let mut result = None;
    for arg in args {
        let value = interp.eval(*arg, frame)?;
        if interp.is_false(value) {
            return Ok(value);
        }
        result = Some(value);
    }
    match result {
        Some(value) => Ok(value),
        None => Ok(interp.arena.boolean(true)),
    }
}

/// Evaluate or special form: the first value that is not `#f`, else the last value
pub(crate) fn eval_or(
    interp: &mut Interpreter,
    args: &[ValueId],
    frame: FrameId,
) -> Result<ValueId, Error> {
    let mut result = None;
    for arg in args {
        let value = interp.eval(*arg, frame)?;
        if !interp.is_false(value) {
            return Ok(value);
        }
        result = Some(value);
    }
    match result {
        Some(value) => Ok(value),
        None => Ok(interp.arena.boolean(false)),
    }
}

/// Evaluate let special form: initializers see only the outer frame
pub(crate) fn eval_let(
    interp: &mut Interpreter,
    args: &[ValueId],
    frame: FrameId,
) -> Result<ValueId, Error> {
    let (bindings, body) = interp.parse_let_form("let", args)?;

    // Shape, duplicate check and evaluation happen one binding at a time
    let mut bound = Vec::with_capacity(bindings.len());
    for binding in bindings {
        let (name, expr) = interp.parse_binding(binding)?;
        check_not_bound(&bound, &name)?;
        let value = interp.eval(expr, frame)?;
        bound.push((name, value));
    }
    let let_frame = interp.arena.alloc_frame(Some(frame));
    for (name, value) in &bound {
        interp.arena.bind(let_frame, name, *value);
    }
    interp.eval_sequence(body, let_frame)
}

/// Evaluate let* special form: one nested frame per binding, duplicates allowed
pub(crate) fn eval_let_star(
    interp: &mut Interpreter,
    args: &[ValueId],
    frame: FrameId,
) -> Result<ValueId, Error> {
    let (bindings, body) = interp.parse_let_form("let*", args)?;

    let mut current = interp.arena.alloc_frame(Some(frame));
    for binding in bindings {
        let (name, expr) = interp.parse_binding(binding)?;
        let value = interp.eval(expr, current)?;
        current = interp.arena.alloc_frame(Some(current));
        interp.arena.bind(current, &name, value);
    }
    interp.eval_sequence(body, current)
}

/// Evaluate letrec special form.
///
/// Every name is first bound to the Unassigned placeholder in one new frame; all
/// initializers are evaluated in that frame and only then are the names rebound.
/// An initializer that evaluates to the placeholder itself read a sibling too early.
/// Binding shapes are checked up front, duplicates as each initializer is reached.
pub(crate) fn eval_letrec(
    interp: &mut Interpreter,
    args: &[ValueId],
    frame: FrameId,
) -> Result<ValueId, Error> {
    let (bindings, body) = interp.parse_let_form("letrec", args)?;
    let bindings = bindings
        .into_iter()
        .map(|binding| interp.parse_binding(binding))
        .collect::<Result<Vec<_>, _>>()?;

    let letrec_frame = interp.arena.alloc_frame(Some(frame));
    for (name, _) in &bindings {
        let placeholder = interp.arena.alloc(Value::Unassigned);
        interp.arena.bind(letrec_frame, name, placeholder);
    }

    let mut bound: Vec<(String, ValueId)> = Vec::with_capacity(bindings.len());
    for (name, expr) in bindings {
        check_not_bound(&bound, &name)?;
        let value = interp.eval(expr, letrec_frame)?;
        if matches!(interp.arena.get(value), Value::Unassigned) {
            return Err(Error::LetrecOrder(LETREC_ORDER.into()));
        }
        bound.push((name, value));
    }
    for (name, value) in &bound {
        interp.arena.define(letrec_frame, name, *value);
    }
    interp.eval_sequence(body, letrec_frame)
}

/// Evaluate define special form: upsert in the current frame only
pub(crate) fn eval_define(
    interp: &mut Interpreter,
    args: &[ValueId],
    frame: FrameId,
) -> Result<ValueId, Error> {
    let [target, expr] = args else {
        return Err(Error::Arity(
            "Wrong number of arguments provided for define.".into(),
        ));
    };
    let Some(name) = interp.symbol_name(*target) else {
        return Err(Error::Type("Define can only bind to a symbol.".into()));
    };
    let value = interp.eval(*expr, frame)?;
    interp.arena.define(frame, &name, value);
    Ok(interp.arena.void())
}

/// Evaluate set! special form: mutate the innermost existing binding
pub(crate) fn eval_set(
    interp: &mut Interpreter,
    args: &[ValueId],
    frame: FrameId,
) -> Result<ValueId, Error> {
    let [target, expr] = args else {
        return Err(Error::Arity(
            "Wrong number of arguments provided for set!".into(),
        ));
    };
    let Some(name) = interp.symbol_name(*target) else {
        return Err(Error::Type("set! can only bind to a symbol".into()));
    };
    let value = interp.eval(*expr, frame)?;
    interp.arena.set_bang(frame, &name, value)?;
    Ok(interp.arena.void())
}

/// Evaluate begin special form
pub(crate) fn eval_begin(
    interp: &mut Interpreter,
    args: &[ValueId],
    frame: FrameId,
) -> Result<ValueId, Error> {
    interp.eval_sequence(args, frame)
}

/// Evaluate lambda special form: capture the current frame, evaluate nothing
pub(crate) fn eval_lambda(
    interp: &mut Interpreter,
    args: &[ValueId],
    frame: FrameId,
) -> Result<ValueId, Error> {
    let [params, body] = args else {
        return Err(Error::Arity(
            "Wrong number of arguments provided for lambda".into(),
        ));
    };
    if !matches!(
        interp.arena.get(*params),
        Value::Pair(..) | Value::Null | Value::Symbol(_)
    ) {
        return Err(Error::Syntax(
            "Wrong formal parameter type in lambda definition".into(),
        ));
    }
    Ok(interp.arena.alloc(Value::Closure {
        params: *params,
        body: *body,
        frame,
    }))
}

/// Evaluate load special form. The operand is a string literal and is not evaluated.
pub(crate) fn eval_load(
    interp: &mut Interpreter,
    args: &[ValueId],
    frame: FrameId,
) -> Result<ValueId, Error> {
    let [path] = args else {
        return Err(Error::Arity(
            "Wrong number of arguments provided for load".into(),
        ));
    };
    let Value::String(path) = interp.arena.get(*path) else {
        return Err(Error::Type("Wrong argument type given for load".into()));
    };
    let path = path.clone();
    interp.load(Path::new(&path), frame)?;
    Ok(interp.arena.void())
}


#[cfg(test)]
#[expect(clippy::unwrap_used)] // test code OK
mod tests {
    use super::test_support::{
        SharedBuffer, TestEnvironment, TestResult::*, run_comprehensive_tests,
        run_tests_in_environment,
    };
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_special_forms_data_driven() {
        let test_cases = vec![
            // === SELF-EVALUATING FORMS ===
            ("42", EvalResult("42")),
            ("-3.25", EvalResult("-3.250000")),
            ("#t", EvalResult("#t")),
            ("\"text\"", EvalResult("\"text\"")),
            ("()", EvalResult("()")),
            ("", EvalResult("")),
            // === QUOTE ===
            ("(quote x)", EvalResult("x")),
            ("'x", EvalResult("x")),
            ("'(1 2 3)", EvalResult("(1 2 3)")),
            ("'(1 2 . 3)", EvalResult("(1 2 . 3)")),
            ("(quote (1 2 . 3))", EvalResult("(1 2 . 3)")),
            ("''a", EvalResult("(quote a)")),
            (
                "(quote)",
                Raises(Error::Arity("Not enough arguments for quote.".into())),
            ),
            (
                "(quote 1 2)",
                Raises(Error::Arity("Too many arguments for quote.".into())),
            ),
            // === IF ===
            ("(if #t 1 2)", EvalResult("1")),
            ("(if #f 1 2)", EvalResult("2")),
            ("(if 0 'yes 'no)", EvalResult("yes")),
            ("(if '() 'yes 'no)", EvalResult("yes")),
            ("(if #f 1)", EvalResult("")),
            ("(if #t 1)", EvalResult("1")),
            (
                "(if #t)",
                Raises(Error::Arity("Not enough blocks in an if statement".into())),
            ),
            (
                "(if #t 1 2 3)",
                Raises(Error::Arity("Too many blocks in an if statement".into())),
            ),
            // Only the chosen branch is evaluated
            ("(if #t 1 undefined-name)", EvalResult("1")),
            // === COND ===
            ("(cond (#f 1) (#t 2))", EvalResult("2")),
            ("(cond (#f 1) (else 3))", EvalResult("3")),
            ("(cond ((<= 2 1) 'a) ((<= 1 2) 'b) (else 'c))", EvalResult("b")),
            ("(cond (#f 1))", EvalResult("")),
            ("(cond)", EvalResult("")),
            ("(cond (5 'five))", EvalResult("five")),
            (
                "(cond (else 1) (#t 2))",
                Raises(Error::Syntax(
                    "'else' can only appear as the last clause in cond statement".into(),
                )),
            ),
            (
                "(cond (#t 1 2))",
                Raises(Error::Syntax("Wrong number of items in a cond clause".into())),
            ),
            // Shape errors are reported before any clause runs
            (
                "(cond ((error \"ran\") 1) (#t))",
                Raises(Error::Syntax("Wrong number of items in a cond clause".into())),
            ),
            // === AND / OR ===
            ("(and)", EvalResult("#t")),
            ("(and 1 2 3)", EvalResult("3")),
            ("(and 1 #f (error \"unreached\"))", EvalResult("#f")),
            ("(or)", EvalResult("#f")),
            ("(or #f 2 (error \"unreached\"))", EvalResult("2")),
            ("(or #f #f)", EvalResult("#f")),
            // === LET ===
            ("(let ((x 1) (y 2)) (+ x y))", EvalResult("3")),
            ("(let () 5)", EvalResult("5")),
            ("(let ((x 1)) x x 7)", EvalResult("7")),
            (
                "(let ((x 1) (x 2)) x)",
                Raises(Error::Syntax("Duplicate identifier in let assignment.".into())),
            ),
            (
                "(let ((x 1)))",
                Raises(Error::Syntax("Not enough blocks after 'let'".into())),
            ),
            // Bindings are checked and evaluated in order
            (
                "(let ((x (error \"first\")) (x 2)) x)",
                Raises(Error::User("first".into())),
            ),
            (
                "(let ((x (error \"first\")) (5 2)) x)",
                Raises(Error::User("first".into())),
            ),
            (
                "(let ((x 1) (x (error \"second\"))) x)",
                Raises(Error::Syntax("Duplicate identifier in let assignment.".into())),
            ),
            ("(let* ((x 1) (y (+ x 1)) (x 5)) (+ x y))", EvalResult("7")),
            (
                "(let x 1)",
                Raises(Error::Syntax("Invalid syntax in 'let'".into())),
            ),
            (
                "(let ((x)) x)",
                Raises(Error::Syntax("Missing block in let assignment.".into())),
            ),
            (
                "(let ((x 1 2)) x)",
                Raises(Error::Syntax(
                    "Too many blocks provided in let assignment.".into(),
                )),
            ),
            (
                "(let ((1 2)) 1)",
                Raises(Error::Syntax("Let can only bind to a symbol.".into())),
            ),
            // === LET* ===
            ("(let* ((x 1) (y (+ x 1))) y)", EvalResult("2")),
            ("(let* ((x 1) (x 2)) x)", EvalResult("2")),
            ("(let* () 4)", EvalResult("4")),
            (
                "(let* ((x 1)))",
                Raises(Error::Syntax("Not enough blocks after 'let*'".into())),
            ),
            // === LETREC ===
            (
                "(letrec ((f (lambda () (g))) (g (lambda () 1))) (f))",
                EvalResult("1"),
            ),
            (
                "(letrec ((even (lambda (n) (if (= n 0) #t (odd (- n 1))))) (odd (lambda (n) (if (= n 0) #f (even (- n 1)))))) (even 10))",
                EvalResult("#t"),
            ),
            (
                "(letrec ((a b) (b 1)) a)",
                Raises(Error::LetrecOrder(LETREC_ORDER.into())),
            ),
            (
                "(letrec ((a 1) (a 2)) a)",
                Raises(Error::Syntax("Duplicate identifier in let assignment.".into())),
            ),
            (
                "(letrec ((a (error \"first\")) (a 2)) a)",
                Raises(Error::User("first".into())),
            ),
            (
                "(letrec ((a (error \"first\")) (5 2)) a)",
                Raises(Error::Syntax("Let can only bind to a symbol.".into())),
            ),
            (
                "(letrec ((a 1)))",
                Raises(Error::Syntax("Not enough blocks after 'letrec'".into())),
            ),
            // === LAMBDA / APPLICATION ===
            ("((lambda (x y) (+ x y)) 1 2)", EvalResult("3")),
            ("((lambda () 9))", EvalResult("9")),
            ("((lambda args args) 1 2 3)", EvalResult("(1 2 3)")),
            ("((lambda args args))", EvalResult("()")),
            ("((lambda (a . rest) rest) 1 2 3)", EvalResult("(2 3)")),
            ("((lambda (a . rest) rest) 1)", EvalResult("()")),
            ("((lambda (a b . rest) (+ a b)) 1 2 3 4)", EvalResult("3")),
            ("(lambda (x) x)", EvalResult("#<procedure>")),
            (
                "((lambda (x y) x) 1)",
                Raises(Error::Arity("Not enough parameters in fx call.".into())),
            ),
            (
                "((lambda (x y) x))",
                Raises(Error::Arity("Not enough parameters in function call.".into())),
            ),
            (
                "(+ 1 . 2)",
                Raises(Error::Syntax("Input not of a specified type.".into())),
            ),
            (
                "((lambda (x y) x) 1 2 3)",
                Raises(Error::Arity("Too many parameters in function call.".into())),
            ),
            (
                "((lambda (a . rest) a))",
                Raises(Error::Arity("Not enough parameters in function call.".into())),
            ),
            (
                "((lambda (a .) a) 1)",
                Raises(Error::Syntax(
                    "Wrong number of args after . in parameters list".into(),
                )),
            ),
            (
                "((lambda (a . b c) a) 1)",
                Raises(Error::Syntax(
                    "Wrong number of args after . in parameters list".into(),
                )),
            ),
            (
                "(lambda (x))",
                Raises(Error::Arity(
                    "Wrong number of arguments provided for lambda".into(),
                )),
            ),
            (
                "(lambda 5 1)",
                Raises(Error::Syntax(
                    "Wrong formal parameter type in lambda definition".into(),
                )),
            ),
            (
                "(5 1)",
                Raises(Error::Type(
                    "First element in a list is not a symbol.".into(),
                )),
            ),
            (
                "(\"f\" 1)",
                Raises(Error::Type(
                    "First element in a list is not a symbol.".into(),
                )),
            ),
            (
                "((quote x) 1)",
                Raises(Error::Type(
                    "function should be closure or primitive type".into(),
                )),
            ),
            (
                "undefined-name",
                Raises(Error::UnboundSymbol(
                    "Failed to find the symbol: undefined-name".into(),
                )),
            ),
            // === DEFINE / SET! ===
            ("(define x 1)", EvalResult("")),
            (
                "(define x)",
                Raises(Error::Arity(
                    "Wrong number of arguments provided for define.".into(),
                )),
            ),
            (
                "(define 1 2)",
                Raises(Error::Type("Define can only bind to a symbol.".into())),
            ),
            (
                "(set! never-defined 1)",
                Raises(Error::UnboundSymbol(
                    "Cannot set! an undefined variable".into(),
                )),
            ),
            (
                "(set! \"x\" 1)",
                Raises(Error::Type("set! can only bind to a symbol".into())),
            ),
            (
                "(set! x)",
                Raises(Error::Arity(
                    "Wrong number of arguments provided for set!".into(),
                )),
            ),
            // === BEGIN ===
            ("(begin)", EvalResult("")),
            ("(begin 1 2 3)", EvalResult("3")),
            ("(begin (define z 4) (+ z 1))", EvalResult("5")),
            // === LOAD ===
            (
                "(load)",
                Raises(Error::Arity(
                    "Wrong number of arguments provided for load".into(),
                )),
            ),
            (
                "(load some-symbol)",
                Raises(Error::Type("Wrong argument type given for load".into())),
            ),
            (
                "(load \"/nonexistent/arenascheme/file.scm\")",
                Raises(Error::Load("The given file could not be opened".into())),
            ),
            // Reserved names cannot be shadowed
            ("(begin (define if 1) (if #f 2 3))", EvalResult("3")),
            // Generic error cases
            ("(car)", AnyError),
            ("(let ((x 1) (x 2)) x)", SpecificError("Evaluation Error: Duplicate")),
        ];

        run_comprehensive_tests(test_cases);
    }

    #[test]
    fn test_shared_environments() {
        let test_environments = vec![
            // Closures share their frame rather than copying it
            TestEnvironment(vec![
                ("(define x 1)", EvalResult("")),
                ("(define f (lambda () x))", EvalResult("")),
                ("(set! x 2)", EvalResult("")),
                ("(f)", EvalResult("2")),
                ("(define x 3)", EvalResult("")),
                ("(f)", EvalResult("3")),
            ]),
            // Recursion through the global frame
            TestEnvironment(vec![
                (
                    "(define fact (lambda (n) (if (<= n 1) 1 (* n (fact (- n 1))))))",
                    EvalResult(""),
                ),
                ("(fact 5)", EvalResult("120")),
                ("(fact 20)", EvalResult("2432902008176640000")),
                ("(fact 21)", SpecificError("Integer overflow in *")),
            ]),
            // Counters: closures over a private mutable frame
            TestEnvironment(vec![
                (
                    "(define make-counter (lambda () (let ((n 0)) (lambda () (begin (set! n (+ n 1)) n)))))",
                    EvalResult(""),
                ),
                ("(define c1 (make-counter))", EvalResult("")),
                ("(define c2 (make-counter))", EvalResult("")),
                ("(c1)", EvalResult("1")),
                ("(c1)", EvalResult("2")),
                ("(c2)", EvalResult("1")),
            ]),
            // set! reaches outer frames, define stays local
            TestEnvironment(vec![
                ("(define y 10)", EvalResult("")),
                ("((lambda () (set! y 11)))", EvalResult("")),
                ("y", EvalResult("11")),
                ("((lambda () (begin (define y 99) y)))", EvalResult("99")),
                ("y", EvalResult("11")),
                ("(let ((y 5)) (set! y 6) y)", EvalResult("6")),
                ("y", EvalResult("11")),
            ]),
            // Identity versus content
            TestEnvironment(vec![
                ("(define p (cons 1 2))", EvalResult("")),
                ("(define q (cons 1 2))", EvalResult("")),
                ("(eq? p p)", EvalResult("#t")),
                ("(eq? p q)", EvalResult("#f")),
                ("(define g (lambda () 1))", EvalResult("")),
                ("(eq? g g)", EvalResult("#t")),
                ("(eq? g (lambda () 1))", EvalResult("#f")),
            ]),
            // Arity of closures
            TestEnvironment(vec![
                ("(define two (lambda (a b) a))", EvalResult("")),
                ("(two 1)", SpecificError("Not enough parameters")),
                ("(two 1 2 3)", SpecificError("Too many parameters")),
                ("(two 1 2)", EvalResult("1")),
                ("(define any (lambda xs (apply + xs)))", EvalResult("")),
                ("(any)", EvalResult("0")),
                ("(any 1)", EvalResult("1")),
                ("(any 1 2 3 4 5)", EvalResult("15")),
            ]),
        ];

        run_tests_in_environment(test_environments);
    }

    #[test]
    fn test_interpret_prints_non_void_results() {
        let buffer = SharedBuffer::default();
        let mut interp = Interpreter::with_output(buffer.clone());
        let global = interp.global_frame();
        interp
            .interpret(
                "(define x 2) x (+ x 0.5) \"s\" '(a . b) (if #f #f) car",
                global,
            )
            .unwrap();
        assert_eq!(buffer.contents(), "2\n2.500000\n\"s\"\n(a . b)\n#<procedure>\n");
    }

    #[test]
    fn test_interpret_stops_at_first_error() {
        let buffer = SharedBuffer::default();
        let mut interp = Interpreter::with_output(buffer.clone());
        let global = interp.global_frame();
        let err = interp.interpret("1 (car '()) 2", global).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Evaluation Error: Wrong argument type provided for car"
        );
        assert_eq!(buffer.contents(), "1\n");
    }

    #[test]
    fn test_load_defines_into_caller_frame() {
        let path = std::env::temp_dir().join(format!(
            "arenascheme-load-{}.scm",
            std::process::id()
        ));
        std::fs::write(&path, "(define y 5)\n; comment\n(+ y 1)\n(define z 'loaded)\n").unwrap();

        let buffer = SharedBuffer::default();
        let mut interp = Interpreter::with_output(buffer.clone());
        let source = format!("(load \"{}\") y", path.display());
        let result = interp.eval_str(&source).unwrap();
        assert_eq!(interp.display(result).to_string(), "5");
        // Forms in the file print like top-level forms; define prints nothing
        assert_eq!(buffer.contents(), "6\n");

        let z = interp.eval_str("z").unwrap();
        assert_eq!(interp.display(z).to_string(), "loaded");

        // Loading inside a closure body binds into the call frame
        let local = interp
            .eval_str(&format!(
                "((lambda () (begin (load \"{}\") z)))",
                path.display()
            ))
            .unwrap();
        assert_eq!(interp.display(local).to_string(), "loaded");

        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_load_propagates_parse_errors() {
        let path = std::env::temp_dir().join(format!(
            "arenascheme-bad-{}.scm",
            std::process::id()
        ));
        std::fs::write(&path, "(define a 1)\n(+ 1").unwrap();

        let mut interp = Interpreter::with_output(io::sink());
        let err = interp
            .eval_str(&format!("(load \"{}\")", path.display()))
            .unwrap_err();
        assert!(matches!(err, Error::Parse(ref e) if e.is_incomplete()), "{err:?}");

        std::fs::remove_file(&path).unwrap();
    }

    /// Log sink shared with a scoped tracing subscriber
    #[derive(Clone, Default)]
    struct LogSink(std::sync::Arc<std::sync::Mutex<Vec<u8>>>);

    impl Write for LogSink {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_load_logs_form_count() {
        let path = std::env::temp_dir().join(format!(
            "arenascheme-log-{}.scm",
            std::process::id()
        ));
        std::fs::write(&path, "(define a 1)\n(define b 2)\n(+ a b)\n").unwrap();

        let logs = LogSink::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();
        tracing::subscriber::with_default(subscriber, || {
            let mut interp = Interpreter::with_output(io::sink());
            interp
                .eval_str(&format!("(load \"{}\")", path.display()))
                .unwrap();
        });

        let text = String::from_utf8(logs.0.lock().unwrap().clone()).unwrap();
        assert!(text.contains("loading"), "{text}");
        assert!(text.contains("forms=3"), "{text}");

        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_reset_rebuilds_global_frame() {
        let mut interp = Interpreter::with_output(io::sink());
        interp.eval_str("(define x 1)").unwrap();
        interp.reset();

        assert_eq!(interp.arena().stats().resets, 1);
        assert_eq!(
            interp.eval_str("x").unwrap_err(),
            Error::UnboundSymbol("Failed to find the symbol: x".into())
        );
        let sum = interp.eval_str("(+ 1 2)").unwrap();
        assert_eq!(interp.display(sum).to_string(), "3");
    }

    #[test]
    fn test_apply_directly() {
        let mut interp = Interpreter::with_output(io::sink());
        let cons = interp.eval_str("cons").unwrap();
        let a = interp.arena_mut().alloc(Value::Integer(1));
        let b = interp.arena_mut().alloc(Value::Integer(2));
        let pair = interp.apply(cons, &[a, b]).unwrap();
        assert_eq!(interp.display(pair).to_string(), "(1 . 2)");

        let not_a_procedure = interp.arena_mut().alloc(Value::Integer(3));
        assert_eq!(
            interp.apply(not_a_procedure, &[]),
            Err(Error::Type(
                "function should be closure or primitive type".into()
            ))
        );
    }

    #[test]
    fn test_recursive_closure_cycle() {
        let mut interp = Interpreter::with_output(io::sink());
        let result = interp
            .eval_str(
                "(define count-down (lambda (n) (if (= n 0) 'done (count-down (- n 1))))) (count-down 200)",
            )
            .unwrap();
        assert_eq!(interp.display(result).to_string(), "done");

        // The closure's captured frame is the frame that binds it
        let closure = interp.eval_str("count-down").unwrap();
        let Value::Closure { frame, .. } = interp.arena().get(closure) else {
            panic!("expected closure");
        };
        assert_eq!(*frame, interp.global_frame());
    }
}
