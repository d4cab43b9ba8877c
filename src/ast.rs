//! # Canopy - Abstract Syntax Tree
//!
//! This module defines the tagged-operation tree ("code") representation
//! produced by the parser and consumed by the evaluator, along with the
//! construction logic that turns raw parse results into code nodes.
//!
//! ## Architecture Overview
//!
//! - **[code]** - Code nodes, source spans, and operation names
//! - **[operators]** - Binary and unary operator tables
//! - **[builder]** - Construction helpers: reference classification,
//!   call/array/object assembly, self-reference rewriting, deferred
//!   arguments
//!
//! ## Core Concepts
//!
//! ### References
//!
//! An identifier's meaning depends on how it is used. A name ending in the
//! namespace delimiter (`fs:`) is always a builtin reference. A plain
//! unqualified name (`foo`) is *undetermined* until its usage is seen: used
//! as an ordinary call target or tagged template it upgrades to a builtin
//! reference, used as the head of a path traversal it downgrades to a
//! scope reference, and left uncalled it downgrades to a scope reference.
//! Anything else (`index.html`) is a lexical-scope reference.
//!
//! ### Composite literals
//!
//! Array and object literals may contain spreads. Contiguous non-spread
//! runs become literal sub-nodes interleaved with the spread operands; the
//! whole literal collapses to a merge only when more than one part exists.
//!
//! ### Self-reference
//!
//! When a property's value references the property's own key, the
//! reference is rewritten to an *inherited* scope reference so that
//! `foo = foo + 1` reads the enclosing scope's `foo` instead of recursing.
//!
//! Code nodes are created once at parse time and are immutable thereafter.
//! Every node carries a source span and reports a human-readable operation
//! name for diagnostics.

pub mod builder;
pub mod code;
pub mod operators;

pub use builder::{CallArgs, ObjectEntry};
pub use code::{Code, Expr, Span};
pub use operators::{BinaryOp, UnaryOp};
