pub mod ast;
pub mod builtins;
#[cfg(feature = "cli")]
pub mod cli;
pub mod combinators;
pub mod derived;
pub mod evaluator;
pub mod formula;
pub mod output;
pub mod parser;
pub mod scope;
pub mod tree;
pub mod value;

pub use ast::{BinaryOp, Code, Expr, Span, UnaryOp};
pub use builtins::BuiltinRegistry;
pub use derived::{FormulaTree, KeyEntry};
pub use evaluator::{EvalError, Evaluator, Function};
pub use formula::{Formula, Pattern};
pub use output::{to_json, to_json_pretty};
pub use parser::{ParseError, Parser, ParserOptions};
pub use scope::ScopeChain;
pub use tree::{Traversal, Tree, TreeRef};
pub use value::Value;
