//! Construction helpers that turn raw parse results into code nodes.

use std::collections::BTreeSet;
use std::sync::LazyLock;

use regex::Regex;

use crate::ast::code::{Code, Expr, Span};
use crate::ast::operators::{BinaryOp, UnaryOp};
use crate::tree::{add_trailing_slash, remove_trailing_slash};

// An unqualified name is a candidate builtin reference.
static UNQUALIFIED_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z][A-Za-z0-9]*$").unwrap());

/// Classify an identifier. A name ending in the namespace delimiter is
/// unconditionally a builtin reference; a bare unqualified name can't be
/// classified until we see whether it is called; anything else is a
/// lexical-scope reference.
pub fn make_reference(identifier: &str, span: Span) -> Expr {
    let code = if let Some(namespace) = identifier.strip_suffix(':') {
        if UNQUALIFIED_NAME.is_match(namespace) {
            Code::Builtin(identifier.to_string())
        } else {
            Code::Scope(identifier.to_string())
        }
    } else if UNQUALIFIED_NAME.is_match(identifier) {
        Code::Undetermined(identifier.to_string())
    } else {
        Code::Scope(identifier.to_string())
    };
    Expr::new(code, span)
}

/// Upgrade a potential builtin reference to an actual builtin reference.
pub fn upgrade_reference(expr: Expr) -> Expr {
    match expr.code {
        Code::Undetermined(name) => Expr::new(Code::Builtin(name), expr.span),
        _ => expr,
    }
}

/// Downgrade a potential builtin reference to a scope reference.
pub fn downgrade_reference(expr: Expr) -> Expr {
    match expr.code {
        Code::Undetermined(name) => Expr::new(Code::Scope(name), expr.span),
        _ => expr,
    }
}

/// One link in a postfix call chain.
pub enum CallArgs {
    /// `target(a, b)`
    Parens(Vec<Expr>, Span),
    /// `target/key/key`, possibly with zero keys (a bare trailing slash)
    Path(Vec<Expr>, Span),
    /// ``target`text ${value} text` ``
    Template {
        strings: Vec<String>,
        values: Vec<Expr>,
        span: Span,
    },
}

/// Build a call node from a target and one chain link.
///
/// A path traversal downgrades an undetermined target to a scope
/// reference and marks it with a trailing path separator; a traversal with
/// zero keys degrades to an unpack. Tagged templates and ordinary calls
/// upgrade the target to a builtin reference. `lazy_targets` names builtin
/// call targets that short-circuit: their non-literal arguments are
/// wrapped in zero-parameter closures so the callee decides when to
/// evaluate them.
pub fn make_call(target: Expr, args: CallArgs, lazy_targets: &BTreeSet<String>) -> Expr {
    match args {
        CallArgs::Path(keys, args_span) => {
            let tree = downgrade_reference(target);
            let tree = match tree.code {
                Code::Scope(name) => {
                    let span = tree.span;
                    Expr::new(Code::Scope(add_trailing_slash(&name)), span)
                }
                other => Expr::new(other, tree.span),
            };
            let span = tree.span.merge(args_span);
            if keys.is_empty() {
                // Traversal without keys equates to unpack.
                Expr::new(Code::Unpack(Box::new(tree)), span)
            } else {
                Expr::new(
                    Code::Traverse {
                        target: Box::new(tree),
                        keys,
                    },
                    span,
                )
            }
        }
        CallArgs::Template {
            strings,
            values,
            span: args_span,
        } => {
            let target = upgrade_reference(target);
            let span = target.span.merge(args_span);
            Expr::new(
                Code::Template {
                    target: Box::new(target),
                    strings,
                    values,
                },
                span,
            )
        }
        CallArgs::Parens(args, args_span) => {
            let target = upgrade_reference(target);
            let args = match &target.code {
                Code::Builtin(name) if lazy_targets.contains(remove_trailing_slash(name)) => {
                    make_deferred_arguments(args)
                }
                _ => args,
            };
            let span = target.span.merge(args_span);
            Expr::new(
                Code::Call {
                    target: Box::new(target),
                    args,
                },
                span,
            )
        }
    }
}

/// For call targets that short-circuit, defer evaluation of each
/// non-literal argument by wrapping it in a zero-parameter closure over
/// the current scope. Literal arguments are passed as-is.
pub fn make_deferred_arguments(args: Vec<Expr>) -> Vec<Expr> {
    args.into_iter()
        .map(|arg| match arg.code {
            Code::Literal(_) => arg,
            _ => {
                let span = arg.span;
                Expr::new(
                    Code::Lambda {
                        params: Vec::new(),
                        body: Box::new(arg),
                    },
                    span,
                )
            }
        })
        .collect()
}

/// Assemble an array literal, partitioning entries into contiguous
/// non-spread runs interleaved with spread operands. More than one part
/// becomes a merge; exactly one part collapses to that part directly.
pub fn make_array(entries: Vec<Expr>, span: Span) -> Expr {
    let mut current: Vec<Expr> = Vec::new();
    let mut parts: Vec<Expr> = Vec::new();

    for entry in entries {
        if let Code::Spread(inner) = entry.code {
            if !current.is_empty() {
                parts.push(array_part(std::mem::take(&mut current)));
            }
            parts.push(*inner);
        } else {
            current.push(entry);
        }
    }
    if !current.is_empty() {
        parts.push(array_part(current));
    }

    collapse_parts(parts, span, Code::Array(Vec::new()))
}

fn array_part(entries: Vec<Expr>) -> Expr {
    let span = span_of(&entries);
    Expr::new(Code::Array(entries), span)
}

/// One parsed entry of an object literal.
pub enum ObjectEntry {
    Property(String, Expr),
    Spread(Expr),
}

/// Assemble an object literal. Spreads of a literal object are inlined
/// (their properties folded into the current run); spreads of anything
/// else remain separate merge operands. A getter returning a literal is
/// optimized to a plain literal property.
pub fn make_object(entries: Vec<ObjectEntry>, span: Span) -> Expr {
    let mut current: Vec<(String, Expr)> = Vec::new();
    let mut parts: Vec<Expr> = Vec::new();

    for entry in entries {
        match entry {
            ObjectEntry::Spread(value) => {
                if let Code::Object(properties) = value.code {
                    current.extend(properties);
                } else {
                    if !current.is_empty() {
                        parts.push(object_part(std::mem::take(&mut current)));
                    }
                    parts.push(value);
                }
            }
            ObjectEntry::Property(key, value) => {
                let value = match value.code {
                    Code::Getter(inner) if matches!(inner.code, Code::Literal(_)) => *inner,
                    _ => value,
                };
                current.push((key, value));
            }
        }
    }
    if !current.is_empty() {
        parts.push(object_part(current));
    }

    collapse_parts(parts, span, Code::Object(Vec::new()))
}

fn object_part(properties: Vec<(String, Expr)>) -> Expr {
    let span = properties
        .iter()
        .map(|(_, value)| value.span)
        .reduce(Span::merge)
        .unwrap_or_default();
    Expr::new(Code::Object(properties), span)
}

fn collapse_parts(mut parts: Vec<Expr>, span: Span, empty: Code) -> Expr {
    match parts.len() {
        0 => Expr::new(empty, span),
        1 => match parts.pop() {
            Some(part) => part,
            None => Expr::new(empty, span),
        },
        _ => Expr::new(Code::Merge(parts), span),
    }
}

/// Define a property on an object, rewriting self-references in the value
/// so they resolve to the enclosing scope instead of recursing.
pub fn make_property(key: String, value: Expr) -> (String, Expr) {
    let value = avoid_recursive_property_calls(value, &key);
    (key, value)
}

/// The given code defines a property named by `key`. Rewrite any scope
/// reference to that key into an inherited reference to avoid infinite
/// recursion. The exception is a nested lambda that redeclares the key,
/// whose own references resolve to its parameter.
pub fn avoid_recursive_property_calls(expr: Expr, key: &str) -> Expr {
    let span = expr.span;
    let rewrite = |expr: Expr| avoid_recursive_property_calls(expr, key);
    let rewrite_box = |expr: Box<Expr>| Box::new(avoid_recursive_property_calls(*expr, key));
    let code = match expr.code {
        Code::Scope(name) if remove_trailing_slash(&name) == remove_trailing_slash(key) => {
            Code::Inherited(name)
        }
        Code::Lambda { params, body } => {
            if params.iter().any(|param| param == key) {
                // The lambda redeclares the key; don't rewrite.
                Code::Lambda { params, body }
            } else {
                Code::Lambda {
                    params,
                    body: rewrite_box(body),
                }
            }
        }
        Code::Call { target, args } => Code::Call {
            target: rewrite_box(target),
            args: args.into_iter().map(rewrite).collect(),
        },
        Code::Traverse { target, keys } => Code::Traverse {
            target: rewrite_box(target),
            keys: keys.into_iter().map(rewrite).collect(),
        },
        Code::Unpack(inner) => Code::Unpack(rewrite_box(inner)),
        Code::Template {
            target,
            strings,
            values,
        } => Code::Template {
            target: rewrite_box(target),
            strings,
            values: values.into_iter().map(rewrite).collect(),
        },
        Code::Array(items) => Code::Array(items.into_iter().map(rewrite).collect()),
        Code::Object(properties) => Code::Object(
            properties
                .into_iter()
                .map(|(name, value)| (name, rewrite(value)))
                .collect(),
        ),
        Code::Getter(inner) => Code::Getter(rewrite_box(inner)),
        Code::Merge(parts) => Code::Merge(parts.into_iter().map(rewrite).collect()),
        Code::Spread(inner) => Code::Spread(rewrite_box(inner)),
        Code::Concat(items) => Code::Concat(items.into_iter().map(rewrite).collect()),
        Code::Binary { op, left, right } => Code::Binary {
            op,
            left: rewrite_box(left),
            right: rewrite_box(right),
        },
        Code::Unary { op, operand } => Code::Unary {
            op,
            operand: rewrite_box(operand),
        },
        other => other,
    };
    Expr::new(code, span)
}

/// Fold a chain of binary operators: a head value and a list of
/// (operator, right operand) pairs, left-associatively.
pub fn make_binary_operation(head: Expr, tail: Vec<(BinaryOp, Expr)>) -> Expr {
    tail.into_iter().fold(head, |left, (op, right)| {
        let span = left.span.merge(right.span);
        Expr::new(
            Code::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            },
            span,
        )
    })
}

pub fn make_unary_operation(op: UnaryOp, operand: Expr, span: Span) -> Expr {
    let span = span.merge(operand.span);
    Expr::new(
        Code::Unary {
            op,
            operand: Box::new(operand),
        },
        span,
    )
}

fn span_of(exprs: &[Expr]) -> Span {
    exprs
        .iter()
        .map(|expr| expr.span)
        .reduce(Span::merge)
        .unwrap_or_default()
}
