//! Delimited-text scanning.
//!
//! Specialized parsers that scan forward for a configurable delimiter with
//! optional escape handling, an optional post-condition checked right after
//! the delimiter, and explicit policies for fail-on characters and end of
//! input.
//!
//! The scanner never allocates per character: `memchr` locates the next
//! *interesting* byte (a potential delimiter start, escape character or
//! fail-on character) and the whole uninteresting run before it is appended
//! in a single `push_str`. All special cases are then re-checked at the
//! boundary at character level, so colliding first bytes of multi-byte
//! characters are handled correctly.

use memchr::{memchr, memchr2, memchr3};

use crate::combinator::{ParseResult, Parser};

/// What terminates a delimited scan: a small set of characters, or a literal
/// string matched exactly.
#[derive(Debug, Clone)]
pub enum Delimiter {
    Chars(Vec<char>),
    Literal(String),
}

impl Delimiter {
    fn describe(&self) -> String {
        match self {
            Delimiter::Chars(set) => {
                format!("one of \"{}\"", set.iter().collect::<String>())
            }
            Delimiter::Literal(text) => format!("\"{}\"", text),
        }
    }

    /// Byte length of a delimiter match at the given tail, if any.
    fn match_len(&self, rest: &str, current: char) -> Option<usize> {
        match self {
            Delimiter::Chars(set) => set.contains(&current).then(|| current.len_utf8()),
            Delimiter::Literal(text) => rest.starts_with(text.as_str()).then(|| text.len()),
        }
    }

    fn first_bytes(&self) -> Vec<u8> {
        match self {
            Delimiter::Chars(set) => set.iter().map(|c| first_utf8_byte(*c)).collect(),
            Delimiter::Literal(text) => text.bytes().take(1).collect(),
        }
    }
}

/// Builder for delimited-text parsers.
///
/// Scanning accumulates characters until the delimiter is found (and its
/// post-condition, if any, holds immediately after it), fails on any
/// character of the `fail_on` set, and treats end of input as success only
/// when `accept_eof` is set. Escape handling takes priority over delimiter
/// and fail-on checks at the same position; an escape character whose
/// sub-parser fails is taken literally.
pub struct DelimitedText {
    delimiter: Delimiter,
    escapes: Vec<(char, Parser<String>)>,
    post_condition: Option<Parser<()>>,
    keep_delimiter: bool,
    fail_on: Vec<char>,
    accept_eof: bool,
}

impl DelimitedText {
    fn new(delimiter: Delimiter) -> Self {
        Self {
            delimiter,
            escapes: Vec::new(),
            post_condition: None,
            keep_delimiter: false,
            fail_on: Vec::new(),
            accept_eof: false,
        }
    }

    /// Scan until the given character.
    pub fn until_char(delimiter: char) -> Self {
        Self::new(Delimiter::Chars(vec![delimiter]))
    }

    /// Scan until any character of the given set.
    pub fn until_any(set: &str) -> Self {
        Self::new(Delimiter::Chars(set.chars().collect()))
    }

    /// Scan until the given literal string, matched exactly.
    pub fn until_literal(text: &str) -> Self {
        debug_assert!(!text.is_empty());
        Self::new(Delimiter::Literal(text.to_string()))
    }

    /// Registers an escape character: when found, the sub-parser runs from
    /// the position after it and its produced string is spliced into the
    /// accumulated text instead of being matched against the delimiter.
    pub fn escape(mut self, trigger: char, replacement: Parser<String>) -> Self {
        self.escapes.push((trigger, replacement));
        self
    }

    /// Requires the given parser to also succeed right after a delimiter
    /// match; a failing occurrence is treated as non-terminating and the
    /// scan continues.
    pub fn post_condition(mut self, condition: Parser<()>) -> Self {
        self.post_condition = Some(condition);
        self
    }

    /// Includes the delimiter itself in the accumulated result. The cursor
    /// advances past the delimiter either way.
    pub fn keep_delimiter(mut self) -> Self {
        self.keep_delimiter = true;
        self
    }

    /// Aborts the whole scan when any character of the given set is found
    /// before the delimiter.
    pub fn fail_on(mut self, set: &str) -> Self {
        self.fail_on.extend(set.chars());
        self
    }

    /// Treats reaching end of input without a delimiter as success.
    pub fn accept_eof(mut self) -> Self {
        self.accept_eof = true;
        self
    }

    pub fn parser(self) -> Parser<String> {
        let DelimitedText {
            delimiter,
            escapes,
            post_condition,
            keep_delimiter,
            fail_on,
            accept_eof,
        } = self;

        // Every byte that forces a character-level recheck at the boundary.
        let mut interesting = delimiter.first_bytes();
        interesting.extend(escapes.iter().map(|(c, _)| first_utf8_byte(*c)));
        interesting.extend(fail_on.iter().map(|c| first_utf8_byte(*c)));
        interesting.sort_unstable();
        interesting.dedup();

        Parser::new(move |input| {
            let mut accumulated = String::new();
            let mut cursor = input.clone();
            loop {
                let rest = cursor.rest();
                let Some(found) = find_interesting(rest.as_bytes(), &interesting) else {
                    accumulated.push_str(rest);
                    let end = cursor.consume_bytes(rest.len());
                    return if accept_eof {
                        ParseResult::Success {
                            value: accumulated,
                            next: end,
                        }
                    } else {
                        ParseResult::Failure {
                            message: format!(
                                "reached end of input scanning for {}",
                                delimiter.describe()
                            ),
                            at: end,
                        }
                    };
                };

                accumulated.push_str(&rest[..found]);
                cursor = cursor.consume_bytes(found);
                let Some(current) = cursor.char() else {
                    continue;
                };

                // Escape handling wins over delimiter and fail-on checks.
                if let Some((_, replacement)) =
                    escapes.iter().find(|(trigger, _)| *trigger == current)
                {
                    let after_trigger = cursor.consume_bytes(current.len_utf8());
                    match replacement.apply(&after_trigger) {
                        ParseResult::Success { value, next } => {
                            accumulated.push_str(&value);
                            cursor = next;
                        }
                        ParseResult::Failure { .. } => {
                            accumulated.push(current);
                            cursor = after_trigger;
                        }
                    }
                    continue;
                }

                if let Some(len) = delimiter.match_len(cursor.rest(), current) {
                    let after = cursor.consume_bytes(len);
                    let post_holds = post_condition
                        .as_ref()
                        .map_or(true, |p| p.apply(&after).is_success());
                    if post_holds {
                        if keep_delimiter {
                            accumulated.push_str(&cursor.rest()[..len]);
                        }
                        return ParseResult::Success {
                            value: accumulated,
                            next: after,
                        };
                    }
                    // Non-terminating occurrence: keep scanning.
                }

                if fail_on.contains(&current) {
                    return ParseResult::Failure {
                        message: format!(
                            "found '{}' while scanning for {}",
                            current,
                            delimiter.describe()
                        ),
                        at: cursor,
                    };
                }

                accumulated.push(current);
                cursor = cursor.consume_bytes(current.len_utf8());
            }
        })
    }
}

/// The first byte of a character's UTF-8 encoding. ASCII bytes and UTF-8
/// leading bytes never occur as continuation bytes, so a hit on one of
/// these is always a character boundary.
fn first_utf8_byte(c: char) -> u8 {
    let mut buffer = [0u8; 4];
    c.encode_utf8(&mut buffer).as_bytes()[0]
}

fn find_interesting(haystack: &[u8], set: &[u8]) -> Option<usize> {
    match set {
        [] => None,
        [a] => memchr(*a, haystack),
        [a, b] => memchr2(*a, *b, haystack),
        [a, b, c] => memchr3(*a, *b, *c, haystack),
        _ => haystack.iter().position(|b| set.contains(b)),
    }
}
