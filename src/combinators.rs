//! Generic parser combinators.
//!
//! Parsers operate on a [`Cursor`] over the remaining input and produce
//! either a soft failure (`Ok(None)`, the input just doesn't match), a
//! successful [`Match`] carrying the value and the rest of the input, or a
//! hard [`ParseError`] for syntax that cannot be valid. The engine is
//! independent of any particular grammar.

use std::fmt;

use regex::Regex;

/// A position in the source text being parsed.
#[derive(Clone, Copy)]
pub struct Cursor<'a> {
    source: &'a str,
    pub offset: usize,
}

impl<'a> Cursor<'a> {
    pub fn new(source: &'a str) -> Self {
        Cursor { source, offset: 0 }
    }

    /// The unconsumed input.
    pub fn remaining(&self) -> &'a str {
        &self.source[self.offset..]
    }

    pub fn advance(&self, bytes: usize) -> Cursor<'a> {
        Cursor {
            source: self.source,
            offset: self.offset + bytes,
        }
    }

    /// Whether only trailing whitespace remains.
    pub fn at_end(&self) -> bool {
        self.remaining().trim_start().is_empty()
    }
}

/// A successful parse: the produced value and the remaining input.
pub struct Match<'a, T> {
    pub value: T,
    pub rest: Cursor<'a>,
}

/// Soft failure is `Ok(None)`; hard failure is `Err`.
pub type ParseResult<'a, T> = Result<Option<Match<'a, T>>, ParseError>;

/// A hard syntax error: a confirmed prefix whose continuation cannot
/// match, or malformed construction input.
#[derive(Debug, Clone, PartialEq)]
pub struct ParseError {
    pub message: String,
    pub offset: usize,
}

impl ParseError {
    pub fn new(message: impl Into<String>, offset: usize) -> Self {
        ParseError {
            message: message.into(),
            offset,
        }
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Parse error at offset {}: {}", self.offset, self.message)
    }
}

impl std::error::Error for ParseError {}

/// Return the result of whichever parser matches first.
pub fn any<'a, T>(
    cursor: Cursor<'a>,
    parsers: &[&dyn Fn(Cursor<'a>) -> ParseResult<'a, T>],
) -> ParseResult<'a, T> {
    for parser in parsers {
        if let Some(parsed) = parser(cursor)? {
            return Ok(Some(parsed));
        }
    }
    Ok(None)
}

/// If the given parser succeeds, return its value; otherwise succeed with
/// a `None` value without consuming input.
pub fn optional<'a, T>(
    cursor: Cursor<'a>,
    parser: impl Fn(Cursor<'a>) -> ParseResult<'a, T>,
) -> ParseResult<'a, Option<T>> {
    match parser(cursor)? {
        Some(parsed) => Ok(Some(Match {
            value: Some(parsed.value),
            rest: parsed.rest,
        })),
        None => Ok(Some(Match {
            value: None,
            rest: cursor,
        })),
    }
}

/// A consecutive series of at least one instance of the given term.
pub fn series<'a, T>(
    cursor: Cursor<'a>,
    parser: impl Fn(Cursor<'a>) -> ParseResult<'a, T>,
) -> ParseResult<'a, Vec<T>> {
    let Some(first) = parser(cursor)? else {
        return Ok(None);
    };
    let mut value = vec![first.value];
    let mut rest = first.rest;
    while let Some(parsed) = parser(rest)? {
        value.push(parsed.value);
        rest = parsed.rest;
    }
    Ok(Some(Match { value, rest }))
}

/// A list of terms separated by a separator. This parser always succeeds;
/// with no terms it produces an empty list. A trailing separator with no
/// following term appends an explicit missing-term sentinel (`None`) so
/// callers can detect and reject dangling separators.
pub fn separated_list<'a, T, S>(
    cursor: Cursor<'a>,
    term: impl Fn(Cursor<'a>) -> ParseResult<'a, T>,
    separator: impl Fn(Cursor<'a>) -> ParseResult<'a, S>,
) -> ParseResult<'a, Vec<Option<T>>> {
    let mut value = Vec::new();
    let mut rest = cursor;
    let mut parsed_term = term(rest)?;
    while let Some(current) = parsed_term {
        value.push(Some(current.value));
        rest = current.rest;
        let Some(parsed_separator) = separator(rest)? else {
            break;
        };
        rest = parsed_separator.rest;
        parsed_term = term(rest)?;
        if parsed_term.is_none() {
            // Trailing separator.
            value.push(None);
            break;
        }
    }
    Ok(Some(Match { value, rest }))
}

/// Parse with the given regular expression, anchored at the cursor.
pub fn match_regex<'a>(cursor: Cursor<'a>, pattern: &Regex) -> ParseResult<'a, &'a str> {
    match pattern.find(cursor.remaining()) {
        Some(found) if found.start() == 0 => Ok(Some(Match {
            value: found.as_str(),
            rest: cursor.advance(found.end()),
        })),
        _ => Ok(None),
    }
}

/// Parse a terminal like a parenthesis. The matched text is discarded;
/// the caller already knows what the literal token represents.
pub fn terminal<'a>(cursor: Cursor<'a>, pattern: &Regex) -> ParseResult<'a, ()> {
    Ok(match_regex(cursor, pattern)?.map(|parsed| Match {
        value: (),
        rest: parsed.rest,
    }))
}

/// Succeeds if all the parsers succeed in turn; the value is a tuple of
/// the individual results. Fails softly if any parser fails.
#[macro_export]
macro_rules! sequence {
    ($cursor:expr, $($parser:expr),+ $(,)?) => {
        'seq: {
            let mut rest = $cursor;
            let value = ( $(
                match $parser(rest) {
                    Ok(Some(parsed)) => {
                        rest = parsed.rest;
                        parsed.value
                    }
                    Ok(None) => break 'seq Ok(None),
                    Err(error) => break 'seq Err(error),
                }
            ),+ , );
            Ok(Some($crate::combinators::Match { value, rest }))
        }
    };
}

/// Like [`sequence!`], but once the first parser succeeds, any subsequent
/// parser failing is a hard parse error rather than a soft failure. Used
/// where backtracking past a confirmed prefix would hide a real syntax
/// error.
#[macro_export]
macro_rules! forced_sequence {
    ($cursor:expr, $first:expr, $($parser:expr),+ $(,)?) => {
        'seq: {
            let mut rest = $cursor;
            let first = match $first(rest) {
                Ok(Some(parsed)) => {
                    rest = parsed.rest;
                    parsed.value
                }
                Ok(None) => break 'seq Ok(None),
                Err(error) => break 'seq Err(error),
            };
            let value = ( first, $(
                match $parser(rest) {
                    Ok(Some(parsed)) => {
                        rest = parsed.rest;
                        parsed.value
                    }
                    Ok(None) => break 'seq Err($crate::combinators::ParseError::new(
                        "unexpected syntax",
                        rest.offset,
                    )),
                    Err(error) => break 'seq Err(error),
                }
            ),+ );
            Ok(Some($crate::combinators::Match { value, rest }))
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::LazyLock;

    static WORD: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[a-z]+").unwrap());
    static COMMA: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^,").unwrap());

    fn word<'a>(cursor: Cursor<'a>) -> ParseResult<'a, &'a str> {
        match_regex(cursor, &WORD)
    }

    fn comma<'a>(cursor: Cursor<'a>) -> ParseResult<'a, ()> {
        terminal(cursor, &COMMA)
    }

    #[test]
    fn test_separated_list_trailing_separator() {
        let parsed = separated_list(Cursor::new("a,b,"), word, comma)
            .unwrap()
            .unwrap();
        assert_eq!(parsed.value, vec![Some("a"), Some("b"), None]);
    }

    #[test]
    fn test_series_requires_one() {
        assert!(series(Cursor::new("123"), word).unwrap().is_none());
        let parsed = series(Cursor::new("ab"), word).unwrap().unwrap();
        assert_eq!(parsed.value, vec!["ab"]);
    }

    #[test]
    fn test_forced_sequence_hard_error() {
        // Soft failure when the first parser fails...
        let soft: ParseResult<'_, (&str, ())> = forced_sequence!(Cursor::new("1,"), word, comma);
        assert!(soft.unwrap().is_none());
        // ...hard error when a later one does.
        let hard: ParseResult<'_, (&str, ())> = forced_sequence!(Cursor::new("a b"), word, comma);
        assert!(hard.is_err());
    }
}
