use std::fmt;

use crate::ast::operators::{BinaryOp, UnaryOp};
use crate::value::Value;

/// A half-open byte range into the source text, for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Span { start, end }
    }

    /// The smallest span covering both inputs.
    pub fn merge(self, other: Span) -> Span {
        Span {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }
}

/// A code node: an operation together with the source span that produced
/// it. Nodes are pure data, created once at parse time and immutable
/// thereafter.
#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub code: Code,
    pub span: Span,
}

impl Expr {
    pub fn new(code: Code, span: Span) -> Self {
        Expr { code, span }
    }

    /// The human-readable operation name, for debugging and error
    /// messages.
    pub fn op_name(&self) -> &'static str {
        match &self.code {
            Code::Literal(_) => "literal",
            Code::Scope(_) => "scope",
            Code::Inherited(_) => "inherited",
            Code::Builtin(_) => "builtin",
            Code::Undetermined(_) => "undetermined",
            Code::Lambda { .. } => "lambda",
            Code::Call { .. } => "call",
            Code::Traverse { .. } => "traverse",
            Code::Unpack(_) => "unpack",
            Code::Template { .. } => "template",
            Code::Array(_) => "array",
            Code::Object(_) => "object",
            Code::Getter(_) => "getter",
            Code::Merge(_) => "merge",
            Code::Spread(_) => "spread",
            Code::Concat(_) => "concat",
            Code::Binary { op, .. } => op.name(),
            Code::Unary { op, .. } => op.name(),
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.op_name())
    }
}

/// The operation vocabulary of the language.
#[derive(Debug, Clone, PartialEq)]
pub enum Code {
    /// An embedded constant value
    Literal(Value),

    /// A lexical-scope reference, resolved against the scope chain
    Scope(String),

    /// A scope reference that skips the innermost scope, produced by
    /// self-reference rewriting
    Inherited(String),

    /// A reference into the statically-provided builtin namespace
    Builtin(String),

    /// A reference whose builtin-vs-scope classification is pending; it is
    /// upgraded or downgraded exactly once, at the point its usage becomes
    /// known, and never survives to evaluation
    Undetermined(String),

    /// A function literal capturing the scope it is evaluated in
    Lambda { params: Vec<String>, body: Box<Expr> },

    /// An ordinary function call
    Call { target: Box<Expr>, args: Vec<Expr> },

    /// A path-traversal call: walk the keys into the target
    Traverse { target: Box<Expr>, keys: Vec<Expr> },

    /// Traversal with zero keys: unpack the target if it is packed
    Unpack(Box<Expr>),

    /// A tagged-template invocation: the target receives the literal
    /// string parts and the substitution values
    Template {
        target: Box<Expr>,
        strings: Vec<String>,
        values: Vec<Expr>,
    },

    /// An array literal
    Array(Vec<Expr>),

    /// An object literal; property values may be getters
    Object(Vec<(String, Expr)>),

    /// A property value computed on demand against the object's scope
    Getter(Box<Expr>),

    /// An n-ary first-wins merge of treelike parts
    Merge(Vec<Expr>),

    /// A spread operand inside a composite literal
    Spread(Box<Expr>),

    /// String concatenation of the operands' text projections
    Concat(Vec<Expr>),

    /// A binary operation
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },

    /// A unary operation
    Unary { op: UnaryOp, operand: Box<Expr> },
}
