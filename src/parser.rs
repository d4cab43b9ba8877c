use std::collections::BTreeSet;
use std::sync::LazyLock;

use regex::Regex;

use crate::ast::builder::{
    CallArgs, ObjectEntry, downgrade_reference, make_array, make_binary_operation, make_call,
    make_object, make_property, make_reference, make_unary_operation,
};
use crate::ast::{BinaryOp, Code, Expr, Span, UnaryOp};
use crate::combinators::{Cursor, Match, ParseResult, any, match_regex, optional, terminal};
use crate::value::Value;
use crate::{forced_sequence, sequence};

pub use crate::combinators::ParseError;

// Lexical patterns. Leading whitespace is consumed by the token that
// follows it; path steps and template chunks are the exceptions, since
// whitespace is significant there.
static NUMBER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\s*\d+(?:\.\d+)?").unwrap());
static STRING_DOUBLE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"^\s*"((?:[^"\\]|\\.)*)""#).unwrap());
static STRING_SINGLE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*'((?:[^'\\]|\\.)*)'").unwrap());
static KEYWORD: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\s*(true|false|null)\b").unwrap());
static IDENTIFIER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*[A-Za-z_][A-Za-z0-9_.\-]*:?").unwrap());
static PARAM: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\s*[A-Za-z_][A-Za-z0-9_]*").unwrap());
static OBJECT_KEY: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\s*[A-Za-z0-9_.\-]+").unwrap());

static LPAREN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\s*\(").unwrap());
static RPAREN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\s*\)").unwrap());
static LBRACKET: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\s*\[").unwrap());
static RBRACKET: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\s*\]").unwrap());
static LBRACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\s*\{").unwrap());
static RBRACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\s*\}").unwrap());
static COMMA: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\s*,").unwrap());
static COLON: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\s*:").unwrap());
static ARROW: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\s*=>").unwrap());
static SPREAD: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\s*\.\.\.").unwrap());
static BACKTICK: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\s*`").unwrap());
static SUBSTITUTION_OPEN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\$\{").unwrap());
static SUBSTITUTION_CLOSE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\s*\}").unwrap());
static TEMPLATE_CHUNK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?:[^`\\$]|\\.)*").unwrap());

// A path must start immediately after its target; whitespace before the
// slash means division instead.
static PATH: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(?:/[A-Za-z0-9_.\-]*)+").unwrap());

// Operator tokens, one pattern per precedence level. Longer operators are
// listed first so they win over their prefixes.
static OP_BITWISE_OR: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\s*\|").unwrap());
static OP_BITWISE_XOR: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\s*\^").unwrap());
static OP_BITWISE_AND: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\s*&").unwrap());
static OP_EQUALITY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*(===|==|!==|!=)").unwrap());
static OP_RELATIONAL: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\s*(<=|>=|<|>)").unwrap());
static OP_SHIFT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\s*(<<|>>>|>>)").unwrap());
static OP_ADDITIVE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\s*(\+|-)").unwrap());
static OP_MULTIPLICATIVE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*(\*|/|%)").unwrap());
static OP_EXPONENT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\s*\*\*").unwrap());
static OP_UNARY: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\s*(!|~|\+|-)").unwrap());

/// Immutable compile-time configuration.
#[derive(Clone, Default)]
pub struct ParserOptions {
    /// Builtin call targets that short-circuit their arguments; calls to
    /// these get deferred-argument wrapping.
    pub lazy_targets: BTreeSet<String>,
}

/// The expression parser: assembles the grammar from the generic
/// combinators and produces code nodes.
#[derive(Default)]
pub struct Parser {
    options: ParserOptions,
}

impl Parser {
    pub fn new(options: ParserOptions) -> Self {
        Parser { options }
    }

    /// Parse a complete expression. The whole source must be consumed.
    pub fn parse(&self, source: &str) -> Result<Expr, ParseError> {
        let cursor = Cursor::new(source);
        match self.expression(cursor)? {
            Some(parsed) if parsed.rest.at_end() => Ok(parsed.value),
            Some(parsed) => Err(ParseError::new(
                "unexpected text after expression",
                parsed.rest.offset,
            )),
            None => Err(ParseError::new("expected an expression", 0)),
        }
    }

    pub fn expression<'a>(&self, cursor: Cursor<'a>) -> ParseResult<'a, Expr> {
        self.bitwise_or(cursor)
    }

    // Binary operator levels, loosest binding first. Each level folds a
    // head and a list of (operator, operand) pairs left-associatively.

    fn binary_level<'a>(
        &self,
        cursor: Cursor<'a>,
        operator: &Regex,
        next: fn(&Self, Cursor<'a>) -> ParseResult<'a, Expr>,
    ) -> ParseResult<'a, Expr> {
        let Some(head) = next(self, cursor)? else {
            return Ok(None);
        };
        let mut tail = Vec::new();
        let mut rest = head.rest;
        loop {
            let Some(op_match) = match_regex(rest, operator)? else {
                break;
            };
            let token = op_match.value.trim_start();
            let Some(op) = BinaryOp::from_token(token) else {
                break;
            };
            let Some(right) = next(self, op_match.rest)? else {
                // Leave the operator unconsumed; the caller reports the
                // leftover text.
                break;
            };
            tail.push((op, right.value));
            rest = right.rest;
        }
        Ok(Some(Match {
            value: make_binary_operation(head.value, tail),
            rest,
        }))
    }

    fn bitwise_or<'a>(&self, cursor: Cursor<'a>) -> ParseResult<'a, Expr> {
        self.binary_level(cursor, &OP_BITWISE_OR, Self::bitwise_xor)
    }

    fn bitwise_xor<'a>(&self, cursor: Cursor<'a>) -> ParseResult<'a, Expr> {
        self.binary_level(cursor, &OP_BITWISE_XOR, Self::bitwise_and)
    }

    fn bitwise_and<'a>(&self, cursor: Cursor<'a>) -> ParseResult<'a, Expr> {
        self.binary_level(cursor, &OP_BITWISE_AND, Self::equality)
    }

    fn equality<'a>(&self, cursor: Cursor<'a>) -> ParseResult<'a, Expr> {
        self.binary_level(cursor, &OP_EQUALITY, Self::relational)
    }

    fn relational<'a>(&self, cursor: Cursor<'a>) -> ParseResult<'a, Expr> {
        self.binary_level(cursor, &OP_RELATIONAL, Self::shift)
    }

    fn shift<'a>(&self, cursor: Cursor<'a>) -> ParseResult<'a, Expr> {
        self.binary_level(cursor, &OP_SHIFT, Self::additive)
    }

    fn additive<'a>(&self, cursor: Cursor<'a>) -> ParseResult<'a, Expr> {
        self.binary_level(cursor, &OP_ADDITIVE, Self::multiplicative)
    }

    fn multiplicative<'a>(&self, cursor: Cursor<'a>) -> ParseResult<'a, Expr> {
        self.binary_level(cursor, &OP_MULTIPLICATIVE, Self::exponent)
    }

    fn exponent<'a>(&self, cursor: Cursor<'a>) -> ParseResult<'a, Expr> {
        self.binary_level(cursor, &OP_EXPONENT, Self::unary)
    }

    fn unary<'a>(&self, cursor: Cursor<'a>) -> ParseResult<'a, Expr> {
        if let Some(op_match) = match_regex(cursor, &OP_UNARY)? {
            let token = op_match.value.trim_start();
            if let Some(op) = UnaryOp::from_token(token) {
                if let Some(operand) = self.unary(op_match.rest)? {
                    let start = cursor.offset + leading_whitespace(op_match.value);
                    let span = Span::new(start, start + token.len());
                    return Ok(Some(Match {
                        value: make_unary_operation(op, operand.value, span),
                        rest: operand.rest,
                    }));
                }
            }
        }
        self.postfix(cursor)
    }

    // The postfix chain: calls, path traversals, and tagged templates.
    // This is the point where an undetermined reference's usage becomes
    // known; one left uncalled at the end of the chain downgrades to a
    // scope reference.
    fn postfix<'a>(&self, cursor: Cursor<'a>) -> ParseResult<'a, Expr> {
        let Some(head) = self.primary(cursor)? else {
            return Ok(None);
        };
        let mut target = head.value;
        let mut rest = head.rest;
        while let Some(link) = self.call_link(rest)? {
            target = make_call(target, link.value, &self.options.lazy_targets);
            rest = link.rest;
        }
        Ok(Some(Match {
            value: downgrade_reference(target),
            rest,
        }))
    }

    fn call_link<'a>(&self, cursor: Cursor<'a>) -> ParseResult<'a, CallArgs> {
        any(
            cursor,
            &[
                &|c| self.parens_args(c),
                &|c| self.path_args(c),
                &|c| self.template_args(c),
            ],
        )
    }

    fn parens_args<'a>(&self, cursor: Cursor<'a>) -> ParseResult<'a, CallArgs> {
        let Some(open) = terminal(cursor, &LPAREN)? else {
            return Ok(None);
        };
        let Some(list) = crate::combinators::separated_list(
            open.rest,
            |c| self.expression(c),
            |c| terminal(c, &COMMA),
        )?
        else {
            return Ok(None);
        };
        let Some(close) = terminal(list.rest, &RPAREN)? else {
            return Err(ParseError::new("expected )", list.rest.offset));
        };
        if matches!(list.value.last(), Some(None)) {
            return Err(ParseError::new(
                "dangling separator in argument list",
                list.rest.offset,
            ));
        }
        let args: Vec<Expr> = list.value.into_iter().flatten().collect();
        let span = Span::new(cursor.offset, close.rest.offset);
        Ok(Some(Match {
            value: CallArgs::Parens(args, span),
            rest: close.rest,
        }))
    }

    fn path_args<'a>(&self, cursor: Cursor<'a>) -> ParseResult<'a, CallArgs> {
        let Some(path) = match_regex(cursor, &PATH)? else {
            return Ok(None);
        };
        let text = path.value;
        let span = Span::new(cursor.offset, path.rest.offset);
        let mut keys = Vec::new();
        if text != "/" {
            let mut offset = cursor.offset + 1;
            for segment in text[1..].split('/') {
                let key_span = Span::new(offset, offset + segment.len());
                keys.push(Expr::new(
                    Code::Literal(Value::String(segment.to_string())),
                    key_span,
                ));
                offset += segment.len() + 1;
            }
        }
        Ok(Some(Match {
            value: CallArgs::Path(keys, span),
            rest: path.rest,
        }))
    }

    fn template_args<'a>(&self, cursor: Cursor<'a>) -> ParseResult<'a, CallArgs> {
        let Some(parsed) = self.template_parts(cursor)? else {
            return Ok(None);
        };
        let (strings, values, span) = parsed.value;
        Ok(Some(Match {
            value: CallArgs::Template {
                strings,
                values,
                span,
            },
            rest: parsed.rest,
        }))
    }

    // Primary expressions: literals, composite literals, lambdas, groups,
    // references.
    fn primary<'a>(&self, cursor: Cursor<'a>) -> ParseResult<'a, Expr> {
        any(
            cursor,
            &[
                &|c| self.number(c),
                &|c| self.string(c),
                &|c| self.template(c),
                &|c| self.array(c),
                &|c| self.object(c),
                &|c| self.lambda(c),
                &|c| self.group(c),
                &|c| self.keyword(c),
                &|c| self.reference(c),
            ],
        )
    }

    fn number<'a>(&self, cursor: Cursor<'a>) -> ParseResult<'a, Expr> {
        let Some(parsed) = match_regex(cursor, &NUMBER)? else {
            return Ok(None);
        };
        let text = parsed.value.trim_start();
        let start = cursor.offset + leading_whitespace(parsed.value);
        let span = Span::new(start, parsed.rest.offset);
        let value = if text.contains('.') {
            match text.parse::<f64>() {
                Ok(number) => Value::Float(number),
                Err(_) => return Err(ParseError::new("invalid number", start)),
            }
        } else {
            match text.parse::<i64>() {
                Ok(number) => Value::Integer(number),
                Err(_) => return Err(ParseError::new("invalid number", start)),
            }
        };
        Ok(Some(Match {
            value: Expr::new(Code::Literal(value), span),
            rest: parsed.rest,
        }))
    }

    fn string<'a>(&self, cursor: Cursor<'a>) -> ParseResult<'a, Expr> {
        for pattern in [&*STRING_DOUBLE, &*STRING_SINGLE] {
            let Some(captures) = pattern.captures(cursor.remaining()) else {
                continue;
            };
            let Some(whole) = captures.get(0) else {
                continue;
            };
            if whole.start() != 0 {
                continue;
            }
            let content = captures.get(1).map(|c| c.as_str()).unwrap_or_default();
            let start = cursor.offset + leading_whitespace(whole.as_str());
            let rest = cursor.advance(whole.end());
            let span = Span::new(start, rest.offset);
            return Ok(Some(Match {
                value: Expr::new(Code::Literal(Value::String(unescape(content))), span),
                rest,
            }));
        }
        Ok(None)
    }

    fn keyword<'a>(&self, cursor: Cursor<'a>) -> ParseResult<'a, Expr> {
        let Some(parsed) = match_regex(cursor, &KEYWORD)? else {
            return Ok(None);
        };
        let text = parsed.value.trim_start();
        let start = cursor.offset + leading_whitespace(parsed.value);
        let span = Span::new(start, parsed.rest.offset);
        let value = match text {
            "true" => Value::Boolean(true),
            "false" => Value::Boolean(false),
            _ => Value::Null,
        };
        Ok(Some(Match {
            value: Expr::new(Code::Literal(value), span),
            rest: parsed.rest,
        }))
    }

    fn reference<'a>(&self, cursor: Cursor<'a>) -> ParseResult<'a, Expr> {
        let Some(parsed) = match_regex(cursor, &IDENTIFIER)? else {
            return Ok(None);
        };
        let name = parsed.value.trim_start();
        let start = cursor.offset + leading_whitespace(parsed.value);
        let span = Span::new(start, parsed.rest.offset);
        Ok(Some(Match {
            value: make_reference(name, span),
            rest: parsed.rest,
        }))
    }

    fn group<'a>(&self, cursor: Cursor<'a>) -> ParseResult<'a, Expr> {
        let parsed: Option<Match<'a, (_, Expr, _)>> = sequence!(
            cursor,
            |c| terminal(c, &LPAREN),
            |c| self.expression(c),
            |c| terminal(c, &RPAREN),
        )?;
        Ok(parsed.map(|m| {
            let (_, expr, _) = m.value;
            Match {
                value: expr,
                rest: m.rest,
            }
        }))
    }

    fn lambda<'a>(&self, cursor: Cursor<'a>) -> ParseResult<'a, Expr> {
        let parsed: Option<Match<'a, (_, Vec<Option<String>>, _, _)>> = sequence!(
            cursor,
            |c| terminal(c, &LPAREN),
            |c| crate::combinators::separated_list(
                c,
                |c| self.param(c),
                |c| terminal(c, &COMMA)
            ),
            |c| terminal(c, &RPAREN),
            |c| terminal(c, &ARROW),
        )?;
        let Some(head) = parsed else {
            return Ok(None);
        };
        let (_, params, _, _) = head.value;
        if matches!(params.last(), Some(None)) {
            return Ok(None);
        }
        let params: Vec<String> = params.into_iter().flatten().collect();
        // The arrow is a confirmed prefix; a missing body is a hard error.
        let Some(body) = self.expression(head.rest)? else {
            return Err(ParseError::new("expected lambda body", head.rest.offset));
        };
        let span = Span::new(cursor.offset, body.rest.offset);
        Ok(Some(Match {
            value: Expr::new(
                Code::Lambda {
                    params,
                    body: Box::new(body.value),
                },
                span,
            ),
            rest: body.rest,
        }))
    }

    fn param<'a>(&self, cursor: Cursor<'a>) -> ParseResult<'a, String> {
        let Some(parsed) = match_regex(cursor, &PARAM)? else {
            return Ok(None);
        };
        Ok(Some(Match {
            value: parsed.value.trim_start().to_string(),
            rest: parsed.rest,
        }))
    }

    fn array<'a>(&self, cursor: Cursor<'a>) -> ParseResult<'a, Expr> {
        let Some(open) = terminal(cursor, &LBRACKET)? else {
            return Ok(None);
        };
        let Some(list) = crate::combinators::separated_list(
            open.rest,
            |c| self.array_entry(c),
            |c| terminal(c, &COMMA),
        )?
        else {
            return Ok(None);
        };
        let Some(close) = terminal(list.rest, &RBRACKET)? else {
            return Err(ParseError::new("expected ]", list.rest.offset));
        };
        // A trailing comma in a literal is tolerated.
        let entries: Vec<Expr> = list.value.into_iter().flatten().collect();
        let span = Span::new(cursor.offset, close.rest.offset);
        Ok(Some(Match {
            value: make_array(entries, span),
            rest: close.rest,
        }))
    }

    fn array_entry<'a>(&self, cursor: Cursor<'a>) -> ParseResult<'a, Expr> {
        if let Some(spread) = self.spread(cursor)? {
            return Ok(Some(spread));
        }
        self.expression(cursor)
    }

    fn spread<'a>(&self, cursor: Cursor<'a>) -> ParseResult<'a, Expr> {
        // Once the ... prefix is confirmed, a value must follow.
        let parsed: Option<Match<'a, (_, Expr)>> = forced_sequence!(
            cursor,
            |c| match_regex(c, &SPREAD),
            |c| self.expression(c),
        )?;
        Ok(parsed.map(|m| {
            let (_, value) = m.value;
            let span = Span::new(cursor.offset, m.rest.offset);
            Match {
                value: Expr::new(Code::Spread(Box::new(value)), span),
                rest: m.rest,
            }
        }))
    }

    fn object<'a>(&self, cursor: Cursor<'a>) -> ParseResult<'a, Expr> {
        let Some(open) = terminal(cursor, &LBRACE)? else {
            return Ok(None);
        };
        let Some(list) = crate::combinators::separated_list(
            open.rest,
            |c| self.object_entry(c),
            |c| terminal(c, &COMMA),
        )?
        else {
            return Ok(None);
        };
        let Some(close) = terminal(list.rest, &RBRACE)? else {
            return Err(ParseError::new("expected }", list.rest.offset));
        };
        let entries: Vec<ObjectEntry> = list.value.into_iter().flatten().collect();
        let span = Span::new(cursor.offset, close.rest.offset);
        Ok(Some(Match {
            value: make_object(entries, span),
            rest: close.rest,
        }))
    }

    fn object_entry<'a>(&self, cursor: Cursor<'a>) -> ParseResult<'a, ObjectEntry> {
        if let Some(spread) = self.spread(cursor)? {
            let Code::Spread(inner) = spread.value.code else {
                return Err(ParseError::new("malformed spread", cursor.offset));
            };
            return Ok(Some(Match {
                value: ObjectEntry::Spread(*inner),
                rest: spread.rest,
            }));
        }

        let Some(key) = self.object_key(cursor)? else {
            return Ok(None);
        };
        let (key_text, key_span) = key.value;

        let Some(colon) = optional(key.rest, |c| terminal(c, &COLON))? else {
            return Ok(None);
        };
        if colon.value.is_none() {
            // Shorthand property: the value is looked up in scope; the
            // self-reference rewrite turns it into an inherited reference.
            let value = Expr::new(Code::Scope(key_text.clone()), key_span);
            let getter = Expr::new(Code::Getter(Box::new(value)), key_span);
            let (key_text, value) = make_property(key_text, getter);
            return Ok(Some(Match {
                value: ObjectEntry::Property(key_text, value),
                rest: key.rest,
            }));
        }

        let Some(value) = self.expression(colon.rest)? else {
            return Err(ParseError::new(
                "expected value after property key",
                colon.rest.offset,
            ));
        };
        let value_span = value.value.span;
        let getter = Expr::new(Code::Getter(Box::new(value.value)), value_span);
        let (key_text, getter) = make_property(key_text, getter);
        Ok(Some(Match {
            value: ObjectEntry::Property(key_text, getter),
            rest: value.rest,
        }))
    }

    fn object_key<'a>(&self, cursor: Cursor<'a>) -> ParseResult<'a, (String, Span)> {
        if let Some(string) = self.string(cursor)? {
            if let Code::Literal(Value::String(text)) = string.value.code {
                return Ok(Some(Match {
                    value: (text, string.value.span),
                    rest: string.rest,
                }));
            }
        }
        let Some(parsed) = match_regex(cursor, &OBJECT_KEY)? else {
            return Ok(None);
        };
        let text = parsed.value.trim_start().to_string();
        let start = cursor.offset + leading_whitespace(parsed.value);
        Ok(Some(Match {
            value: (text, Span::new(start, parsed.rest.offset)),
            rest: parsed.rest,
        }))
    }

    // An untagged template literal compiles to a concatenation of its
    // string parts and substitution values.
    fn template<'a>(&self, cursor: Cursor<'a>) -> ParseResult<'a, Expr> {
        let Some(parsed) = self.template_parts(cursor)? else {
            return Ok(None);
        };
        let (strings, values, span) = parsed.value;
        let mut items = Vec::new();
        let mut values = values.into_iter();
        for (index, text) in strings.into_iter().enumerate() {
            if index > 0 {
                if let Some(value) = values.next() {
                    items.push(value);
                }
            }
            if !text.is_empty() {
                items.push(Expr::new(Code::Literal(Value::String(text)), span));
            }
        }
        Ok(Some(Match {
            value: Expr::new(Code::Concat(items), span),
            rest: parsed.rest,
        }))
    }

    #[allow(clippy::type_complexity)]
    fn template_parts<'a>(
        &self,
        cursor: Cursor<'a>,
    ) -> ParseResult<'a, (Vec<String>, Vec<Expr>, Span)> {
        let Some(open) = terminal(cursor, &BACKTICK)? else {
            return Ok(None);
        };
        let mut strings = Vec::new();
        let mut values = Vec::new();
        let mut current = String::new();
        let mut rest = open.rest;
        loop {
            if let Some(chunk) = match_regex(rest, &TEMPLATE_CHUNK)? {
                current.push_str(&unescape(chunk.value));
                rest = chunk.rest;
            }

            if let Some(open_substitution) = match_regex(rest, &SUBSTITUTION_OPEN)? {
                strings.push(std::mem::take(&mut current));
                let Some(value) = self.expression(open_substitution.rest)? else {
                    return Err(ParseError::new(
                        "expected expression in substitution",
                        open_substitution.rest.offset,
                    ));
                };
                let Some(close_substitution) = terminal(value.rest, &SUBSTITUTION_CLOSE)? else {
                    return Err(ParseError::new(
                        "expected } after substitution",
                        value.rest.offset,
                    ));
                };
                values.push(value.value);
                rest = close_substitution.rest;
                continue;
            }

            if rest.remaining().starts_with('`') {
                strings.push(current);
                let rest = rest.advance(1);
                let span = Span::new(cursor.offset, rest.offset);
                return Ok(Some(Match {
                    value: (strings, values, span),
                    rest,
                }));
            }

            if rest.remaining().starts_with('$') {
                // A dollar sign not opening a substitution is plain text.
                current.push('$');
                rest = rest.advance(1);
                continue;
            }

            return Err(ParseError::new("unterminated template", rest.offset));
        }
    }
}

fn leading_whitespace(text: &str) -> usize {
    text.len() - text.trim_start().len()
}

fn unescape(text: &str) -> String {
    let mut result = String::with_capacity(text.len());
    let mut chars = text.chars();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            result.push(ch);
            continue;
        }
        match chars.next() {
            Some('n') => result.push('\n'),
            Some('t') => result.push('\t'),
            Some('r') => result.push('\r'),
            Some(other) => result.push(other),
            None => result.push('\\'),
        }
    }
    result
}

#[test]
fn test_parse_number() {
    let parser = Parser::default();
    let expr = parser.parse("42").unwrap();
    assert_eq!(expr.code, Code::Literal(Value::Integer(42)));
}

#[test]
fn test_parse_rejects_leftovers() {
    let parser = Parser::default();
    assert!(parser.parse("1 2").is_err());
}
