use patra::combinator::{character, literal, not};
use patra::cursor::Cursor;
use patra::scan::DelimitedText;

#[test]
fn escape_takes_priority_over_the_delimiter() {
    // Delimiter "X" with escape '\' yielding a literal "X": the escaped X is
    // spliced into the text and scanning stops only at the real, unescaped X.
    let p = DelimitedText::until_char('X')
        .escape('\\', literal("X"))
        .parser();
    let (value, next) = p.apply(&Cursor::new(r"\XX tail")).success().unwrap();
    assert_eq!(value, "X");
    assert_eq!(next.rest(), " tail");
}

#[test]
fn escape_takes_priority_over_fail_on() {
    let p = DelimitedText::until_char(']')
        .escape('\\', literal("]").or_else(literal("\\")))
        .fail_on("\\")
        .parser();
    let (value, _) = p.apply(&Cursor::new(r"a\]b]")).success().unwrap();
    assert_eq!(value, "a]b");
}

#[test]
fn post_condition_rejects_non_terminating_occurrences() {
    // Emphasis-style scanning: a '*' only terminates when not immediately
    // followed by another '*'.
    let p = DelimitedText::until_char('*')
        .post_condition(not(character('*')))
        .parser();
    let (value, next) = p.apply(&Cursor::new("a**b*c")).success().unwrap();
    assert_eq!(value, "a*");
    assert_eq!(next.rest(), "b*c");
}

#[test]
fn fail_on_aborts_before_the_delimiter() {
    let p = DelimitedText::until_char(']').fail_on("\n").parser();
    let result = p.apply(&Cursor::new("spans\nlines]"));
    let message = result.failure_message().unwrap().to_string();
    assert!(message.contains('\n') || message.contains("scanning"), "{message}");
}

#[test]
fn accept_eof_turns_exhaustion_into_success() {
    let p = DelimitedText::until_any("*[").accept_eof().parser();
    let (value, next) = p.apply(&Cursor::new("plain text only")).success().unwrap();
    assert_eq!(value, "plain text only");
    assert!(next.at_end());
}

#[test]
fn literal_delimiter_with_kept_text() {
    let p = DelimitedText::until_literal("```").keep_delimiter().parser();
    let (value, next) = p.apply(&Cursor::new("code`here```rest")).success().unwrap();
    assert_eq!(value, "code`here```");
    assert_eq!(next.rest(), "rest");
}

#[test]
fn empty_match_before_an_immediate_delimiter() {
    let p = DelimitedText::until_char('*').parser();
    let (value, next) = p.apply(&Cursor::new("*rest")).success().unwrap();
    assert_eq!(value, "");
    assert_eq!(next.rest(), "rest");
}

#[test]
fn multiple_escapes_accumulate_in_order() {
    let p = DelimitedText::until_char('"')
        .escape('\\', literal("\"").or_else(literal("n").map(|_| "\n".to_string())))
        .parser();
    let (value, _) = p.apply(&Cursor::new(r#"say \"hi\"\n done" tail"#)).success().unwrap();
    assert_eq!(value, "say \"hi\"\n done");
}
