use std::fmt;
use std::sync::Arc;

use crate::builtins::BuiltinRegistry;
use crate::derived::FormulaTree;
use crate::evaluator::{EvalError, Evaluator};
use crate::output;
use crate::parser::{ParseError, Parser};
use crate::scope::ScopeChain;
use crate::tree::{from_value, is_treelike, plain};
use crate::value::Value;

/// Errors surfaced by the command-line interface.
#[derive(Debug)]
pub enum CliError {
    Io(std::io::Error),
    Json(serde_json::Error),
    Parse(ParseError),
    Eval(EvalError),
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::Io(e) => write!(f, "I/O error: {}", e),
            CliError::Json(e) => write!(f, "Invalid JSON input: {}", e),
            CliError::Parse(e) => write!(f, "{}", e),
            CliError::Eval(e) => {
                // Present the message chain, following caused-by links.
                write!(f, "{}", e)?;
                let mut source = std::error::Error::source(e);
                while let Some(cause) = source {
                    write!(f, "\n  caused by: {}", cause)?;
                    source = cause.source();
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for CliError {}

impl From<ParseError> for CliError {
    fn from(error: ParseError) -> Self {
        CliError::Parse(error)
    }
}

impl From<EvalError> for CliError {
    fn from(error: EvalError) -> Self {
        CliError::Eval(error)
    }
}

pub struct EvalOptions {
    pub expression: String,
    pub input: Option<String>,
    pub pretty: bool,
    pub syntax_only: bool,
}

pub enum EvalOutcome {
    SyntaxValid,
    Success(String),
}

// Wrap the JSON input (default: an empty document) in a formula tree so
// formula keys and virtual keys work from the command line.
fn root_scope(
    input: Option<&str>,
    registry: &Arc<BuiltinRegistry>,
) -> Result<ScopeChain, CliError> {
    let document = match input {
        Some(text) => Value::from_json(serde_json::from_str(text).map_err(CliError::Json)?),
        None => Value::Object(Default::default()),
    };
    let tree = from_value(&document)?;
    let wrapped: crate::tree::TreeRef =
        FormulaTree::new(tree, ScopeChain::default(), registry.clone());
    Ok(ScopeChain::new(vec![wrapped]))
}

/// Parse and evaluate an expression against the JSON input.
pub async fn execute_eval(options: &EvalOptions) -> Result<EvalOutcome, CliError> {
    let registry = BuiltinRegistry::standard();
    let parser = Parser::new(registry.parser_options());
    let code = parser.parse(&options.expression)?;

    if options.syntax_only {
        return Ok(EvalOutcome::SyntaxValid);
    }

    let scope = root_scope(options.input.as_deref(), &registry)?;
    let evaluator = Evaluator::new(registry);
    let value = evaluator.eval(&code, &scope).await?;

    let flattened = if is_treelike(&value) {
        plain(&value).await?
    } else {
        value
    };
    let rendered = if options.pretty {
        output::to_json_pretty(&flattened)
    } else {
        output::to_json(&flattened)
    };
    Ok(EvalOutcome::Success(rendered))
}

/// List the input tree's public keys, virtual keys included.
pub async fn execute_keys(input: Option<&str>) -> Result<Vec<String>, CliError> {
    let registry = BuiltinRegistry::standard();
    let scope = root_scope(input, &registry)?;
    let Some(tree) = scope.trees().first() else {
        return Ok(Vec::new());
    };
    Ok(tree.keys().await?)
}
