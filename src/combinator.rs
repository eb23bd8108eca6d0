//! # Parser Combinator Core
//!
//! The `Parser<T>` abstraction and everything that composes it: primitive
//! parsers (single characters, literal strings, input boundaries), the
//! characters-matcher family, and the combinators grammar authors assemble
//! into concrete markup syntax.
//!
//! A parser is conceptually a pure function from [`Cursor`] to
//! [`ParseResult`]. Failure is a returned value, never an unwind: every
//! combinator that can fail is expected to be wrapped in `or_else` or
//! `optional` by the grammar author when failure should not abort the parse.
//! Because cursors are immutable values, backtracking is purely positional -
//! `or_else` retries the second parser from the original cursor with no
//! mark/reset machinery.

use std::ops::RangeInclusive;
use std::sync::Arc;

use crate::cursor::Cursor;
use crate::errors::{ErrorReporting, PatraError, ReportContext, SourceContext};

// ============================================================================
// PARSE RESULT
// ============================================================================

/// The outcome of applying a parser at a cursor position.
///
/// A `Failure` never commits consumption to the caller: the cursor it
/// carries marks where the failure occurred, for diagnostics only.
#[derive(Debug)]
pub enum ParseResult<T> {
    Success { value: T, next: Cursor },
    Failure { message: String, at: Cursor },
}

impl<T> ParseResult<T> {
    pub fn is_success(&self) -> bool {
        matches!(self, ParseResult::Success { .. })
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, ParseResult::Failure { .. })
    }

    /// Unwraps a success into its value and resulting cursor.
    pub fn success(self) -> Option<(T, Cursor)> {
        match self {
            ParseResult::Success { value, next } => Some((value, next)),
            ParseResult::Failure { .. } => None,
        }
    }

    pub fn failure_message(&self) -> Option<&str> {
        match self {
            ParseResult::Success { .. } => None,
            ParseResult::Failure { message, .. } => Some(message),
        }
    }
}

// ============================================================================
// PARSER
// ============================================================================

/// A composable parser producing a `T`.
///
/// Parser values are cheap to clone and reusable across many inputs and
/// offsets; combinators share their components through an `Arc`, so the same
/// sub-parser may appear in several alternatives without duplication.
pub struct Parser<T> {
    run: Arc<dyn Fn(&Cursor) -> ParseResult<T> + Send + Sync>,
}

impl<T> Clone for Parser<T> {
    fn clone(&self) -> Self {
        Parser {
            run: Arc::clone(&self.run),
        }
    }
}

impl<T: 'static> Parser<T> {
    /// Wraps a raw parse function. Grammar authors normally reach for the
    /// primitives and combinators below instead.
    pub fn new(run: impl Fn(&Cursor) -> ParseResult<T> + Send + Sync + 'static) -> Self {
        Parser { run: Arc::new(run) }
    }

    /// Applies this parser at the given cursor.
    pub fn apply(&self, input: &Cursor) -> ParseResult<T> {
        (*self.run)(input)
    }

    // ------------------------------------------------------------------
    // Top-level entry points
    // ------------------------------------------------------------------

    /// Parses the given text from the start. Trailing input is allowed; use
    /// [`Parser::parse_all`] to require full consumption.
    pub fn parse(&self, text: &str) -> Result<T, PatraError> {
        self.parse_named("input", text)
    }

    /// Like [`Parser::parse`], attaching a document name to diagnostics.
    pub fn parse_named(&self, name: &str, text: &str) -> Result<T, PatraError> {
        match self.apply(&Cursor::new(text)) {
            ParseResult::Success { value, .. } => Ok(value),
            ParseResult::Failure { message, at } => Err(parse_reporter(name, text)
                .parse_failure(format!("{} at {}", message, at.position()), failure_span(&at))),
        }
    }

    /// Parses the given text and fails if anything is left unconsumed.
    pub fn parse_all(&self, text: &str) -> Result<T, PatraError> {
        self.parse_all_named("input", text)
    }

    pub fn parse_all_named(&self, name: &str, text: &str) -> Result<T, PatraError> {
        match self.apply(&Cursor::new(text)) {
            ParseResult::Success { value, next } => {
                if next.at_end() {
                    Ok(value)
                } else {
                    Err(parse_reporter(name, text).unconsumed_input(
                        preview(next.rest()),
                        (next.offset()..text.len()).into(),
                    ))
                }
            }
            ParseResult::Failure { message, at } => Err(parse_reporter(name, text)
                .parse_failure(format!("{} at {}", message, at.position()), failure_span(&at))),
        }
    }

    // ------------------------------------------------------------------
    // Combinators
    // ------------------------------------------------------------------

    /// Transforms the success value; failures pass through unchanged.
    pub fn map<U: 'static>(self, f: impl Fn(T) -> U + Send + Sync + 'static) -> Parser<U> {
        Parser::new(move |input| match self.apply(input) {
            ParseResult::Success { value, next } => ParseResult::Success {
                value: f(value),
                next,
            },
            ParseResult::Failure { message, at } => ParseResult::Failure { message, at },
        })
    }

    /// Runs this parser, then the parser computed from its value, from the
    /// resulting cursor. `f` is only invoked on success.
    pub fn flat_map<U: 'static>(
        self,
        f: impl Fn(T) -> Parser<U> + Send + Sync + 'static,
    ) -> Parser<U> {
        Parser::new(move |input| match self.apply(input) {
            ParseResult::Success { value, next } => f(value).apply(&next),
            ParseResult::Failure { message, at } => ParseResult::Failure { message, at },
        })
    }

    /// Applies a partial mapping to the success value; where the mapping is
    /// undefined, the parse fails without consuming.
    pub fn filter_map<U: 'static>(
        self,
        f: impl Fn(T) -> Option<U> + Send + Sync + 'static,
    ) -> Parser<U> {
        Parser::new(move |input| match self.apply(input) {
            ParseResult::Success { value, next } => match f(value) {
                Some(mapped) => ParseResult::Success {
                    value: mapped,
                    next,
                },
                None => ParseResult::Failure {
                    message: "no mapping defined for parsed value".to_string(),
                    at: input.clone(),
                },
            },
            ParseResult::Failure { message, at } => ParseResult::Failure { message, at },
        })
    }

    /// Tries this parser; on failure, discards any partial consumption and
    /// tries `other` from the same original cursor. Reports the second
    /// attempt's diagnostic when both fail.
    pub fn or_else(self, other: Parser<T>) -> Parser<T> {
        Parser::new(move |input| match self.apply(input) {
            success @ ParseResult::Success { .. } => success,
            ParseResult::Failure { .. } => other.apply(input),
        })
    }

    /// Runs this parser, then `other` from the resulting cursor, combining
    /// both values into a pair. Fails if either fails, with no partial commit.
    pub fn and_then<U: 'static>(self, other: Parser<U>) -> Parser<(T, U)> {
        Parser::new(move |input| match self.apply(input) {
            ParseResult::Success { value: left, next } => match other.apply(&next) {
                ParseResult::Success { value: right, next } => ParseResult::Success {
                    value: (left, right),
                    next,
                },
                ParseResult::Failure { message, at } => ParseResult::Failure { message, at },
            },
            ParseResult::Failure { message, at } => ParseResult::Failure { message, at },
        })
    }

    /// Sequence keeping only the left value.
    pub fn keep_left<U: 'static>(self, other: Parser<U>) -> Parser<T> {
        self.and_then(other).map(|(left, _)| left)
    }

    /// Sequence keeping only the right value.
    pub fn keep_right<U: 'static>(self, other: Parser<U>) -> Parser<U> {
        self.and_then(other).map(|(_, right)| right)
    }

    /// Wraps this parser so failure becomes a success carrying `None`, with
    /// no consumption. Never fails.
    pub fn optional(self) -> Parser<Option<T>> {
        Parser::new(move |input| match self.apply(input) {
            ParseResult::Success { value, next } => ParseResult::Success {
                value: Some(value),
                next,
            },
            ParseResult::Failure { .. } => ParseResult::Success {
                value: None,
                next: input.clone(),
            },
        })
    }

    /// Repetition builder with configurable `min`/`max` bounds
    /// (0/unbounded defaults).
    pub fn repeated(self) -> Repeat<T> {
        Repeat {
            item: self,
            min: 0,
            max: None,
        }
    }

    /// Dynamic repetition: the parser for the next iteration is computed
    /// from the previous iteration's value. The first failure terminates the
    /// run without erroring; the collected values (possibly none) succeed.
    pub fn rep_with(self, next: impl Fn(&T) -> Parser<T> + Send + Sync + 'static) -> Parser<Vec<T>> {
        Parser::new(move |input| {
            let mut results = Vec::new();
            let mut cursor = input.clone();
            let mut current = self.clone();
            loop {
                match current.apply(&cursor) {
                    ParseResult::Success { value, next: after } => {
                        // A success that consumes nothing would repeat forever.
                        if after.offset() == cursor.offset() {
                            break;
                        }
                        current = next(&value);
                        results.push(value);
                        cursor = after;
                    }
                    ParseResult::Failure { .. } => break,
                }
            }
            ParseResult::Success {
                value: results,
                next: cursor,
            }
        })
    }

    /// Succeeds only if the wrapped parser leaves the cursor at end of
    /// input; otherwise fails citing the unconsumed trailing content.
    pub fn consume_all(self) -> Parser<T> {
        Parser::new(move |input| match self.apply(input) {
            ParseResult::Success { value, next } => {
                if next.at_end() {
                    ParseResult::Success { value, next }
                } else {
                    ParseResult::Failure {
                        message: format!("unconsumed input '{}'", preview(next.rest())),
                        at: next,
                    }
                }
            }
            failure => failure,
        })
    }
}

/// Repetition with `min`/`max` bounds, built via [`Parser::repeated`].
///
/// The item parser is applied from the current cursor until it fails, until
/// `max` items were collected, or until an iteration succeeds without
/// consuming input (which would otherwise repeat forever). The first failing
/// attempt terminates the run without erroring and its consumption is
/// discarded; the whole parse fails only when fewer than `min` repetitions
/// succeeded.
pub struct Repeat<T> {
    item: Parser<T>,
    min: usize,
    max: Option<usize>,
}

impl<T: 'static> Repeat<T> {
    pub fn min(mut self, n: usize) -> Self {
        self.min = n;
        self
    }

    pub fn max(mut self, n: usize) -> Self {
        self.max = Some(n);
        self
    }

    pub fn parser(self) -> Parser<Vec<T>> {
        let Repeat { item, min, max } = self;
        Parser::new(move |input| {
            let mut results = Vec::new();
            let mut cursor = input.clone();
            loop {
                if max.is_some_and(|m| results.len() >= m) {
                    break;
                }
                match item.apply(&cursor) {
                    ParseResult::Success { value, next } => {
                        if next.offset() == cursor.offset() {
                            break;
                        }
                        results.push(value);
                        cursor = next;
                    }
                    ParseResult::Failure { .. } => break,
                }
            }
            if results.len() < min {
                ParseResult::Failure {
                    message: format!(
                        "expected at least {} repetitions, found {}",
                        min,
                        results.len()
                    ),
                    at: input.clone(),
                }
            } else {
                ParseResult::Success {
                    value: results,
                    next: cursor,
                }
            }
        })
    }
}

// ============================================================================
// PRIMITIVE PARSERS
// ============================================================================

/// Matches exactly the given character, consuming one position.
pub fn character(expected: char) -> Parser<char> {
    Parser::new(move |input| match input.char() {
        Some(c) if c == expected => ParseResult::Success {
            value: c,
            next: input.consume_bytes(c.len_utf8()),
        },
        Some(c) => ParseResult::Failure {
            message: format!("expected '{}', found '{}'", expected, c),
            at: input.clone(),
        },
        None => ParseResult::Failure {
            message: format!("expected '{}', found end of input", expected),
            at: input.clone(),
        },
    })
}

/// Matches the given string exactly; no partial match.
pub fn literal(expected: &str) -> Parser<String> {
    let expected = expected.to_string();
    Parser::new(move |input| {
        if input.rest().starts_with(&expected) {
            ParseResult::Success {
                value: expected.clone(),
                next: input.consume_bytes(expected.len()),
            }
        } else {
            let found: String = input.rest().chars().take(expected.chars().count()).collect();
            let found = if found.is_empty() {
                "end of input".to_string()
            } else {
                format!("'{}'", found)
            };
            ParseResult::Failure {
                message: format!("expected \"{}\", found {}", expected, found),
                at: input.clone(),
            }
        }
    })
}

/// Succeeds without consuming iff the cursor is at end of input.
pub fn eof() -> Parser<()> {
    Parser::new(|input| match input.char() {
        None => ParseResult::Success {
            value: (),
            next: input.clone(),
        },
        Some(c) => ParseResult::Failure {
            message: format!("expected end of input, found '{}'", c),
            at: input.clone(),
        },
    })
}

/// Succeeds without consuming iff the cursor is at offset zero.
pub fn at_start() -> Parser<()> {
    Parser::new(|input| {
        if input.at_start() {
            ParseResult::Success {
                value: (),
                next: input.clone(),
            }
        } else {
            ParseResult::Failure {
                message: "expected start of input".to_string(),
                at: input.clone(),
            }
        }
    })
}

/// Matches `\n` or `\r\n`, consuming the terminator, and succeeds without
/// consuming at end of input.
pub fn eol() -> Parser<()> {
    Parser::new(|input| match input.char() {
        Some('\n') => ParseResult::Success {
            value: (),
            next: input.consume_bytes(1),
        },
        Some('\r') if input.char_at(1) == Some('\n') => ParseResult::Success {
            value: (),
            next: input.consume_bytes(2),
        },
        Some(c) => ParseResult::Failure {
            message: format!("expected end of line, found '{}'", c),
            at: input.clone(),
        },
        None => ParseResult::Success {
            value: (),
            next: input.clone(),
        },
    })
}

/// Always succeeds with the given value, consuming nothing.
pub fn success<T: Clone + Send + Sync + 'static>(value: T) -> Parser<T> {
    Parser::new(move |input| ParseResult::Success {
        value: value.clone(),
        next: input.clone(),
    })
}

/// Defers construction of a parser until it runs, enabling recursive
/// grammars (nested markup structures referring back to themselves).
pub fn lazy<T: 'static>(build: impl Fn() -> Parser<T> + Send + Sync + 'static) -> Parser<T> {
    Parser::new(move |input| build().apply(input))
}

/// Succeeds (consuming nothing) iff the given parser fails at the current
/// position; fails (consuming nothing) iff it succeeds.
pub fn not<T: 'static>(parser: Parser<T>) -> Parser<()> {
    Parser::new(move |input| match parser.apply(input) {
        ParseResult::Success { .. } => ParseResult::Failure {
            message: "unexpected input".to_string(),
            at: input.clone(),
        },
        ParseResult::Failure { .. } => ParseResult::Success {
            value: (),
            next: input.clone(),
        },
    })
}

/// Runs the parser against a cursor advanced by `delta` characters,
/// reporting its outcome without ever advancing the outer cursor.
pub fn look_ahead<T: 'static>(delta: usize, parser: Parser<T>) -> Parser<T> {
    Parser::new(move |input| match parser.apply(&input.consume(delta)) {
        ParseResult::Success { value, .. } => ParseResult::Success {
            value,
            next: input.clone(),
        },
        ParseResult::Failure { message, .. } => ParseResult::Failure {
            message,
            at: input.clone(),
        },
    })
}

/// Runs the parser against a cursor moved backward by `delta` characters;
/// fails if that would move before the start of input. Never advances the
/// outer cursor.
pub fn look_behind<T: 'static>(delta: usize, parser: Parser<T>) -> Parser<T> {
    Parser::new(move |input| match input.retreat(delta) {
        None => ParseResult::Failure {
            message: format!("cannot look {} characters behind start of input", delta),
            at: input.clone(),
        },
        Some(behind) => match parser.apply(&behind) {
            ParseResult::Success { value, .. } => ParseResult::Success {
                value,
                next: input.clone(),
            },
            ParseResult::Failure { message, .. } => ParseResult::Failure {
                message,
                at: input.clone(),
            },
        },
    })
}

// ============================================================================
// CHARACTERS MATCHER FAMILY
// ============================================================================

/// Builder for character-class parsers: produces the longest run of
/// characters satisfying a membership predicate, bounded by `max`, then
/// checks the run length against `min`.
///
/// With the default `min` of 0 the parser always succeeds, possibly with an
/// empty string.
pub struct Characters {
    matches: Arc<dyn Fn(char) -> bool + Send + Sync>,
    description: String,
    min: usize,
    max: Option<usize>,
}

impl Characters {
    fn build(
        matches: impl Fn(char) -> bool + Send + Sync + 'static,
        description: String,
    ) -> Self {
        Self {
            matches: Arc::new(matches),
            description,
            min: 0,
            max: None,
        }
    }

    /// Matches characters contained in the given set.
    pub fn any_of(set: &str) -> Self {
        let owned = set.to_string();
        let description = format!("one of \"{}\"", set);
        Self::build(move |c| owned.contains(c), description)
    }

    /// Matches characters *not* contained in the given set.
    pub fn any_but(set: &str) -> Self {
        let owned = set.to_string();
        let description = format!("none of \"{}\"", set);
        Self::build(move |c| !owned.contains(c), description)
    }

    /// Matches characters inside any of the given inclusive ranges.
    pub fn any_in(ranges: impl IntoIterator<Item = RangeInclusive<char>>) -> Self {
        let ranges: Vec<RangeInclusive<char>> = ranges.into_iter().collect();
        let description = ranges
            .iter()
            .map(|r| format!("'{}'..'{}'", r.start(), r.end()))
            .collect::<Vec<_>>()
            .join(", ");
        Self::build(
            move |c| ranges.iter().any(|r| r.contains(&c)),
            format!("in {}", description),
        )
    }

    /// Matches characters satisfying an arbitrary predicate.
    pub fn any_while(matches: impl Fn(char) -> bool + Send + Sync + 'static) -> Self {
        Self::build(matches, "matching a predicate".to_string())
    }

    /// Minimum number of matching characters (default 0).
    pub fn min(mut self, n: usize) -> Self {
        self.min = n;
        self
    }

    /// Maximum number of matching characters (default unbounded).
    pub fn max(mut self, n: usize) -> Self {
        self.max = Some(n);
        self
    }

    pub fn parser(self) -> Parser<String> {
        let Characters {
            matches,
            description,
            min,
            max,
        } = self;
        Parser::new(move |input| {
            let mut count = 0usize;
            let mut len = 0usize;
            for c in input.rest().chars() {
                if max.is_some_and(|m| count >= m) || !(*matches)(c) {
                    break;
                }
                count += 1;
                len += c.len_utf8();
            }
            if count < min {
                ParseResult::Failure {
                    message: format!(
                        "expected at least {} characters {}, found {}",
                        min, description, count
                    ),
                    at: input.clone(),
                }
            } else {
                ParseResult::Success {
                    value: input.rest()[..len].to_string(),
                    next: input.consume_bytes(len),
                }
            }
        })
    }
}

pub fn any_of(set: &str) -> Characters {
    Characters::any_of(set)
}

pub fn any_but(set: &str) -> Characters {
    Characters::any_but(set)
}

pub fn any_in(ranges: impl IntoIterator<Item = RangeInclusive<char>>) -> Characters {
    Characters::any_in(ranges)
}

pub fn any_while(matches: impl Fn(char) -> bool + Send + Sync + 'static) -> Characters {
    Characters::any_while(matches)
}

// ============================================================================
// HELPERS
// ============================================================================

fn parse_reporter(name: &str, text: &str) -> ReportContext {
    ReportContext::new(SourceContext::from_text(name, text), "parse")
}

fn failure_span(at: &Cursor) -> miette::SourceSpan {
    let len = at.char().map(char::len_utf8).unwrap_or(0);
    (at.offset()..at.offset() + len).into()
}

fn preview(text: &str) -> String {
    const LIMIT: usize = 32;
    if text.chars().count() <= LIMIT {
        text.to_string()
    } else {
        let cut: String = text.chars().take(LIMIT).collect();
        format!("{}...", cut)
    }
}
