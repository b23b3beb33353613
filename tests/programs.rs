//! End-to-end runs of whole programs through the public interpreter API.

use arenascheme::evaluator::Interpreter;
use arenascheme::{Error, ParseErrorKind};
use pretty_assertions::assert_eq;
use std::cell::RefCell;
use std::io::{self, Write};
use std::rc::Rc;

#[derive(Clone, Default)]
struct Output(Rc<RefCell<Vec<u8>>>);

impl Output {
    fn text(&self) -> String {
        String::from_utf8_lossy(&self.0.borrow()).into_owned()
    }
}

impl Write for Output {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.borrow_mut().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Interpret `program` at the top level and return what it printed plus the outcome
fn run(program: &str) -> (String, Result<(), Error>) {
    let output = Output::default();
    let mut interp = Interpreter::with_output(output.clone());
    let global = interp.global_frame();
    let result = interp.interpret(program, global);
    (output.text(), result)
}

#[test]
fn test_programs_print_each_result() {
    let test_cases = vec![
        (
            "(define fact (lambda (n) (if (<= n 1) 1 (* n (fact (- n 1))))))\n(fact 10)",
            "3628800\n",
        ),
        ("(/ 1 3) (/ 6 3) (+ 1 2.5)", "0.333333\n2\n3.500000\n"),
        ("(car '(1 . 2)) (cdr '(1 . 2)) '(1 . 2)", "1\n2\n(1 . 2)\n"),
        ("'(1 (2 \"s\") #t #f ())", "(1 (2 \"s\") #t #f ())\n"),
        ("(define x 5) (set! x 6) x", "6\n"),
        (
            "(define make-counter\n  (lambda ()\n    (let ((n 0))\n      (lambda () (begin (set! n (+ n 1)) n)))))\n\
             (define c (make-counter))\n(c) (c) (c)",
            "1\n2\n3\n",
        ),
        (
            "(letrec ((even? (lambda (n) (if (= n 0) #t (odd? (- n 1)))))\n\
                      (odd? (lambda (n) (if (= n 0) #f (even? (- n 1))))))\n\
               (even? 100))",
            "#t\n",
        ),
        ("((lambda (a . rest) rest) 1 2 3)", "(2 3)\n"),
        ("((lambda args args))", "()\n"),
        ("(apply + 1 2 '(3 4))", "10\n"),
        ("(cond ((null? '()) 'empty) (else 'full))", "empty\n"),
        ("(let* ((x 1) (y (+ x 1))) (cons x y))", "(1 . 2)\n"),
        ("car (lambda (x) x)", "#<procedure>\n#<procedure>\n"),
        ("(define y 1) (begin)", ""),
    ];

    for (program, expected) in test_cases {
        let (printed, result) = run(program);
        assert_eq!(result, Ok(()), "program failed: {program}");
        assert_eq!(printed, expected, "output of: {program}");
    }
}

#[test]
fn test_first_error_stops_the_run() {
    let test_cases = vec![
        ("1 (undefined-name) 2", "1\n", "Evaluation Error: Failed to find the symbol: undefined-name"),
        ("(/ 1 0) 3", "", "Evaluation Error: Cannot divide by zero"),
        ("(error \"boom\") 3", "", "Evaluation Error: boom"),
        ("(car 1)", "", "Evaluation Error: Wrong argument type provided for car"),
        ("((lambda (x) x))", "", "Evaluation Error: Not enough parameters in function call."),
        ("(1 2)", "", "Evaluation Error: First element in a list is not a symbol."),
    ];

    for (program, expected_output, expected_error) in test_cases {
        let (printed, result) = run(program);
        assert_eq!(printed, expected_output, "output of: {program}");
        match result {
            Err(err) => assert_eq!(err.to_string(), expected_error, "error of: {program}"),
            Ok(()) => panic!("expected an error from: {program}"),
        }
    }
}

#[test]
fn test_parse_errors_are_reported_before_evaluation() {
    let (printed, result) = run("(display-nothing) (1 2");
    assert_eq!(printed, "");
    match result {
        Err(Error::Parse(err)) => assert_eq!(err.kind, ParseErrorKind::Incomplete),
        other => panic!("expected an incomplete parse, got {other:?}"),
    }
}

#[test]
fn test_interpreter_state_survives_errors() {
    let output = Output::default();
    let mut interp = Interpreter::with_output(output.clone());
    let global = interp.global_frame();

    assert_eq!(interp.interpret("(define total 10)", global), Ok(()));
    assert!(interp.interpret("(set! missing 1)", global).is_err());
    assert_eq!(interp.interpret("(+ total 1)", global), Ok(()));
    assert_eq!(output.text(), "11\n");
}

#[test]
fn test_reset_starts_over() {
    let mut interp = Interpreter::with_output(io::sink());
    assert!(interp.eval_str("(define x 1) x").is_ok());
    let before = interp.arena().stats();
    assert!(before.values > 0);

    interp.reset();
    let after = interp.arena().stats();
    assert_eq!(after.resets, before.resets + 1);
    assert_eq!(
        interp.eval_str("x").map(|_| ()),
        Err(Error::UnboundSymbol("Failed to find the symbol: x".into()))
    );
    let sum = interp.eval_str("(+ 1 2)").map(|id| interp.display(id).to_string());
    assert_eq!(sum, Ok("3".to_string()));
}
