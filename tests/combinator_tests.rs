// tests/combinator_tests.rs

use patra::combinator::{
    any_in, any_of, character, eol, literal, look_ahead, look_behind, not, Parser,
};
use patra::cursor::Cursor;
use patra::errors::ErrorKind;

// ---
// Non-regression and rewind guarantees
// ---

#[test]
fn successful_parsers_never_move_the_cursor_backward() {
    let input = Cursor::new("abc def");
    let parsers: Vec<Parser<String>> = vec![
        literal("abc"),
        any_of("abc").parser(),
        any_of("xyz").parser(), // zero-width success
        character('a').map(|c| c.to_string()),
    ];
    for parser in parsers {
        let (_, next) = parser.apply(&input).success().unwrap();
        assert!(next.offset() >= input.offset());
    }
}

#[test]
fn lookahead_and_negation_report_the_original_offset() {
    let input = Cursor::new("abc").consume(1);

    let (_, next) = look_ahead(0, literal("bc")).apply(&input).success().unwrap();
    assert_eq!(next.offset(), input.offset());

    let (_, next) = not(literal("xx")).apply(&input).success().unwrap();
    assert_eq!(next.offset(), input.offset());

    let (_, next) = look_behind(1, character('a'))
        .apply(&input)
        .success()
        .unwrap();
    assert_eq!(next.offset(), input.offset());
}

// ---
// Alternative left-bias
// ---

#[test]
fn alternative_is_left_biased() {
    let input = Cursor::new("ab");
    let left = any_of("a").min(1).parser();
    let both = left.clone().or_else(literal("ab"));

    let (lv, ln) = left.apply(&input).success().unwrap();
    let (bv, bn) = both.apply(&input).success().unwrap();
    assert_eq!(lv, bv);
    assert_eq!(ln.offset(), bn.offset());
}

#[test]
fn alternative_reports_the_second_failure() {
    let p = literal("aa").or_else(literal("bb"));
    let message = p
        .apply(&Cursor::new("cc"))
        .failure_message()
        .unwrap()
        .to_string();
    assert!(message.contains("\"bb\""), "{message}");
}

// ---
// Repetition bounds
// ---

#[test]
fn repetition_respects_min_and_max() {
    let item = character('x');

    let p = item.clone().repeated().min(2).max(3).parser();
    assert!(p.apply(&Cursor::new("x")).is_failure());

    let (values, next) = p.apply(&Cursor::new("xx")).success().unwrap();
    assert_eq!(values.len(), 2);
    assert_eq!(next.offset(), 2);

    // max caps consumption even when more input would match
    let (values, next) = p.apply(&Cursor::new("xxxxx")).success().unwrap();
    assert_eq!(values.len(), 3);
    assert_eq!(next.offset(), 3);
}

#[test]
fn repetition_discards_the_failing_attempt() {
    // "ab" then "ab" then a failing attempt that consumed the lone 'a'.
    let p = literal("ab").repeated().parser();
    let (values, next) = p.apply(&Cursor::new("ababa")).success().unwrap();
    assert_eq!(values.len(), 2);
    assert_eq!(next.offset(), 4);
    assert_eq!(next.rest(), "a");
}

// ---
// Optional totality
// ---

#[test]
fn optional_never_fails() {
    let p = literal("ab").optional();

    let (value, next) = p.apply(&Cursor::new("abc")).success().unwrap();
    assert_eq!(value, Some("ab".to_string()));
    assert_eq!(next.offset(), 2);

    let (value, next) = p.apply(&Cursor::new("xyz")).success().unwrap();
    assert_eq!(value, None);
    assert_eq!(next.offset(), 0);
}

// ---
// Concrete scenarios
// ---

#[test]
fn character_class_stops_at_the_first_mismatch() {
    let p = any_of("ab").min(1).parser();
    let (value, next) = p.apply(&Cursor::new("abccbb")).success().unwrap();
    assert_eq!(value, "ab");
    assert_eq!(next.offset(), 2);
}

#[test]
fn dynamic_repetition_follows_computed_literals() {
    let p = literal("1").rep_with(|previous| {
        let next = previous.parse::<u32>().unwrap() + 1;
        literal(&next.to_string())
    });
    let (values, next) = p.apply(&Cursor::new("12345999")).success().unwrap();
    assert_eq!(values, ["1", "2", "3", "4", "5"]);
    assert_eq!(next.rest(), "999");
}

#[test]
fn dynamic_repetition_may_collect_nothing() {
    let p = literal("1").rep_with(|_| literal("2"));
    let (values, next) = p.apply(&Cursor::new("999")).success().unwrap();
    assert!(values.is_empty());
    assert_eq!(next.offset(), 0);
}

#[test]
fn look_behind_rewinds_and_checks_underflow() {
    let input = Cursor::new("abcd").consume(2);

    let (value, next) = look_behind(2, character('a'))
        .apply(&input)
        .success()
        .unwrap();
    assert_eq!(value, 'a');
    assert_eq!(next.offset(), 2);

    assert!(look_behind(7, character('a')).apply(&input).is_failure());
}

// ---
// End-of-line and full-consumption behavior
// ---

#[test]
fn lines_terminate_on_either_style_or_eof() {
    let line = any_but_newline().keep_left(eol());
    let (value, _) = line.apply(&Cursor::new("one\ntwo")).success().unwrap();
    assert_eq!(value, "one");
    let (value, _) = line.apply(&Cursor::new("one\r\ntwo")).success().unwrap();
    assert_eq!(value, "one");
    let (value, _) = line.apply(&Cursor::new("one")).success().unwrap();
    assert_eq!(value, "one");
}

fn any_but_newline() -> Parser<String> {
    patra::combinator::any_but("\r\n").parser()
}

#[test]
fn consume_all_fails_on_trailing_content() {
    let p = literal("ab").consume_all();
    assert!(p.apply(&Cursor::new("ab")).is_success());
    let message = p
        .apply(&Cursor::new("abc"))
        .failure_message()
        .unwrap()
        .to_string();
    assert!(message.contains("unconsumed"), "{message}");
}

#[test]
fn top_level_failures_become_positioned_diagnostics() {
    let p = any_in(['0'..='9']).min(1).parser();
    let err = p.parse_named("numbers.txt", "x12").unwrap_err();
    match err.kind {
        ErrorKind::ParseFailure { ref message } => {
            assert!(message.contains("line 1, column 1"), "{message}");
        }
        ref other => panic!("expected a parse failure, got {:?}", other),
    }
}
