use nom::{
    IResult, Parser,
    branch::alt,
    bytes::complete::{tag, take_while},
    character::complete::{char, digit0, digit1, multispace1, one_of, satisfy},
    combinator::{cut, eof, opt, peek, recognize, value},
    error::ErrorKind,
    multi::many0,
    sequence::{pair, preceded, terminated},
};

use crate::Error;
use crate::ast::{Datum, NumberType};
use crate::{ParseError, ParseErrorKind};

/// Characters that may start a symbol besides letters
const SYMBOL_INITIAL_CHARS: &str = "!$%&*/:<=>?~_^";

fn is_initial(c: char) -> bool {
    c.is_ascii_alphabetic() || SYMBOL_INITIAL_CHARS.contains(c)
}

fn is_subsequent(c: char) -> bool {
    is_initial(c) || c.is_ascii_digit() || ".+-".contains(c)
}

fn is_delimiter(c: char) -> bool {
    c.is_whitespace() || "()\";".contains(c)
}

fn failure<T>(input: &str, kind: ErrorKind) -> IResult<&str, T> {
    Err(nom::Err::Failure(nom::error::Error::new(input, kind)))
}

/// Convert nom parsing errors to user-facing parse errors
fn to_parse_error(input: &str, error: nom::Err<nom::error::Error<&str>>) -> ParseError {
    match error {
        nom::Err::Error(e) | nom::Err::Failure(e) => {
            let position = input.len().saturating_sub(e.input.len());
            match e.code {
                _ if e.code == ErrorKind::Eof || e.input.is_empty() => ParseError::with_context(
                    ParseErrorKind::Incomplete,
                    "not enough close parentheses",
                    input,
                    position,
                ),
                ErrorKind::TooLarge => ParseError::with_context(
                    ParseErrorKind::ImplementationLimit,
                    format!("Integer literal out of range at position {position}"),
                    input,
                    position,
                ),
                ErrorKind::Escaped => ParseError::with_context(
                    ParseErrorKind::InvalidSyntax,
                    format!("Invalid escape sequence at position {position}"),
                    input,
                    position,
                ),
                _ if e.input.starts_with(')') => ParseError::with_context(
                    ParseErrorKind::InvalidSyntax,
                    "too many closed parentheses",
                    input,
                    position,
                ),
                _ => {
                    let remaining_chars: String = e.input.chars().take(10).collect();
                    ParseError::with_context(
                        ParseErrorKind::InvalidSyntax,
                        format!("Invalid syntax near '{remaining_chars}'"),
                        input,
                        position,
                    )
                }
            }
        }
        nom::Err::Incomplete(_) => {
            ParseError::from_message(ParseErrorKind::Incomplete, "Incomplete input")
        }
    }
}

/// Line comment from `;` to end of line
fn comment(input: &str) -> IResult<&str, ()> {
    value((), pair(char(';'), take_while(|c| c != '\n'))).parse(input)
}

/// Skip whitespace and comments
fn atmosphere(input: &str) -> IResult<&str, ()> {
    value((), many0(alt((value((), multispace1), comment)))).parse(input)
}

/// Succeeds without consuming when the next character ends a token
fn token_end(input: &str) -> IResult<&str, ()> {
    value((), peek(alt((eof, recognize(satisfy(is_delimiter)))))).parse(input)
}

/// Parse an integer (`-12`) or a float (`1.5`, `1.`, `.5`, `-.5`)
fn parse_number(input: &str) -> IResult<&str, Datum> {
    let (rest, text) = recognize((
        opt(one_of("+-")),
        alt((
            recognize((digit1, opt((char('.'), digit0)))),
            recognize((char('.'), digit1)),
        )),
    ))
    .parse(input)?;
    let (rest, ()) = token_end(rest)?;

    if text.contains('.') {
        match text.parse::<f64>() {
            Ok(x) => Ok((rest, Datum::Float(x))),
            Err(_) => failure(input, ErrorKind::Float),
        }
    } else {
        match text.parse::<NumberType>() {
            Ok(n) => Ok((rest, Datum::Integer(n))),
            Err(_) => failure(input, ErrorKind::TooLarge),
        }
    }
}

/// Parse a boolean (#t or #f)
fn parse_bool(input: &str) -> IResult<&str, Datum> {
    terminated(
        alt((
            value(Datum::Boolean(true), tag("#t")),
            value(Datum::Boolean(false), tag("#f")),
        )),
        token_end,
    )
    .parse(input)
}

/// Parse a symbol; `+`, `-` and identifiers starting with them are allowed too
fn parse_symbol(input: &str) -> IResult<&str, Datum> {
    let (rest, name) = alt((
        recognize((satisfy(is_initial), take_while(is_subsequent))),
        recognize((one_of("+-"), take_while(is_subsequent))),
    ))
    .parse(input)?;
    let (rest, ()) = token_end(rest)?;
    Ok((rest, Datum::Symbol(name.to_owned())))
}

/// Parse a string literal with escape sequences
fn parse_string(input: &str) -> IResult<&str, Datum> {
    let (mut remaining, _) = char('"').parse(input)?;
    let mut result = String::new();

    loop {
        let mut chars = remaining.chars();
        match chars.next() {
            None => return failure(remaining, ErrorKind::Eof),
            Some('"') => return Ok((chars.as_str(), Datum::String(result))),
            Some('\\') => {
                let escaped = match chars.next() {
                    None => return failure(chars.as_str(), ErrorKind::Eof),
                    Some('n') => '\n',
                    Some('t') => '\t',
                    Some('"') => '"',
                    Some('\'') => '\'',
                    Some('\\') => '\\',
                    Some(_) => return failure(remaining, ErrorKind::Escaped),
                };
                result.push(escaped);
            }
            Some(c) => result.push(c),
        }
        remaining = chars.as_str();
    }
}

/// Parse quote shorthand: 'x -> (quote x)
fn parse_quote(input: &str) -> IResult<&str, Datum> {
    let (rest, datum) = preceded(char('\''), preceded(atmosphere, cut(parse_datum))).parse(input)?;
    Ok((
        rest,
        Datum::List(vec![Datum::Symbol("quote".into()), datum]),
    ))
}

/// A standalone `.` inside a list
fn parse_dot(input: &str) -> IResult<&str, Datum> {
    value(Datum::Dot, terminated(char('.'), token_end)).parse(input)
}

/// Parse a list, keeping any standalone dot as a [`Datum::Dot`] element
fn parse_list(input: &str) -> IResult<&str, Datum> {
    let (mut remaining, _) = char('(').parse(input)?;
    let mut items = Vec::new();

    loop {
        let (rest, ()) = atmosphere(remaining)?;
        if rest.is_empty() {
            return failure(rest, ErrorKind::Eof);
        }
        if let Ok((rest, _)) = char::<&str, nom::error::Error<&str>>(')').parse(rest) {
            return Ok((rest, Datum::List(items)));
        }
        let (rest, item) = alt((parse_dot, cut(parse_datum))).parse(rest)?;
        items.push(item);
        remaining = rest;
    }
}

/// Parse one datum
fn parse_datum(input: &str) -> IResult<&str, Datum> {
    alt((
        parse_list,
        parse_quote,
        parse_string,
        parse_bool,
        parse_number,
        parse_symbol,
    ))
    .parse(input)
}

/// Parse every top-level datum in `input`.
///
/// Input that stops inside an open list, string or quote fails with
/// [`ParseErrorKind::Incomplete`], so interactive callers can ask for more lines.
pub fn parse_program(input: &str) -> Result<Vec<Datum>, Error> {
    let mut data = Vec::new();
    let mut remaining = input;

    loop {
        let (rest, ()) = atmosphere(remaining).map_err(|e| to_parse_error(input, e))?;
        if rest.is_empty() {
            return Ok(data);
        }
        let (rest, datum) = parse_datum(rest).map_err(|e| to_parse_error(input, e))?;
        data.push(datum);
        remaining = rest;
    }
}
