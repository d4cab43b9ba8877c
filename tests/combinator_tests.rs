use std::sync::LazyLock;

use canopy_lang::combinators::{
    Cursor, ParseResult, any, match_regex, optional, separated_list, series, terminal,
};
use canopy_lang::{forced_sequence, sequence};
use regex::Regex;

static WORD: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[a-z]+").unwrap());
static DIGITS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[0-9]+").unwrap());
static COMMA: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^,").unwrap());

fn word<'a>(cursor: Cursor<'a>) -> ParseResult<'a, &'a str> {
    match_regex(cursor, &WORD)
}

fn digits<'a>(cursor: Cursor<'a>) -> ParseResult<'a, &'a str> {
    match_regex(cursor, &DIGITS)
}

fn comma<'a>(cursor: Cursor<'a>) -> ParseResult<'a, ()> {
    terminal(cursor, &COMMA)
}

#[test]
fn test_any_first_match_wins() {
    let parsed = any(Cursor::new("abc"), &[&digits, &word]).unwrap().unwrap();
    assert_eq!(parsed.value, "abc");

    let parsed = any(Cursor::new("123"), &[&digits, &word]).unwrap().unwrap();
    assert_eq!(parsed.value, "123");

    assert!(any(Cursor::new("!"), &[&digits, &word]).unwrap().is_none());
}

#[test]
fn test_optional_always_succeeds() {
    let parsed = optional(Cursor::new("abc"), word).unwrap().unwrap();
    assert_eq!(parsed.value, Some("abc"));

    let parsed = optional(Cursor::new("123"), word).unwrap().unwrap();
    assert_eq!(parsed.value, None);
    assert_eq!(parsed.rest.offset, 0);
}

#[test]
fn test_series_one_or_more() {
    assert!(series(Cursor::new(""), word).unwrap().is_none());

    let parsed = series(Cursor::new("ab12"), word).unwrap().unwrap();
    assert_eq!(parsed.value, vec!["ab"]);
    assert_eq!(parsed.rest.offset, 2);
}

#[test]
fn test_sequence_soft_failure() {
    let parsed: Option<_> = sequence!(Cursor::new("ab12"), word, digits).unwrap();
    let parsed = parsed.unwrap();
    assert_eq!(parsed.value, ("ab", "12"));

    let failed: ParseResult<'_, (&str, &str)> = sequence!(Cursor::new("ab!"), word, digits);
    assert!(failed.unwrap().is_none());
}

#[test]
fn test_forced_sequence_errors_after_confirmed_prefix() {
    // First parser failing is still a soft failure.
    let soft: ParseResult<'_, (&str, &str)> = forced_sequence!(Cursor::new("!!"), word, digits);
    assert!(soft.unwrap().is_none());

    // A later parser failing is a hard parse error.
    let hard: ParseResult<'_, (&str, &str)> = forced_sequence!(Cursor::new("ab!"), word, digits);
    assert!(hard.is_err());
}

#[test]
fn test_separated_list_basic() {
    let parsed = separated_list(Cursor::new("a,b,c"), word, comma)
        .unwrap()
        .unwrap();
    assert_eq!(parsed.value, vec![Some("a"), Some("b"), Some("c")]);
}

#[test]
fn test_separated_list_empty() {
    let parsed = separated_list(Cursor::new("123"), word, comma)
        .unwrap()
        .unwrap();
    assert!(parsed.value.is_empty());
    assert_eq!(parsed.rest.offset, 0);
}

#[test]
fn test_separated_list_trailing_separator_sentinel() {
    // "a,b," yields three entries, the last an explicit missing-term
    // sentinel, not a silently shortened list.
    let parsed = separated_list(Cursor::new("a,b,"), word, comma)
        .unwrap()
        .unwrap();
    assert_eq!(parsed.value, vec![Some("a"), Some("b"), None]);
}

#[test]
fn test_terminal_discards_value() {
    let parsed = terminal(Cursor::new(",x"), &COMMA).unwrap().unwrap();
    assert_eq!(parsed.rest.offset, 1);
    assert_eq!(parsed.rest.remaining(), "x");
}
