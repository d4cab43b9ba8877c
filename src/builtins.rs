//! The builtin namespace.
//!
//! Builtins live in an explicitly constructed, immutable registry passed
//! to the evaluator and the key-discovery subsystem at construction time;
//! there is no global mutable state. The registry also records which
//! builtins short-circuit their arguments, which the compiler uses to
//! apply deferred-argument wrapping.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use futures::future::BoxFuture;

use crate::evaluator::{EvalError, Function, NativeFunction, NativeImpl, text_projection};
use crate::parser::ParserOptions;
use crate::tree::{MapFn, from_value, map, merge, plain};
use crate::value::Value;

pub struct BuiltinRegistry {
    functions: BTreeMap<String, Arc<Function>>,
    lazy: BTreeSet<String>,
}

impl BuiltinRegistry {
    pub fn new() -> Self {
        BuiltinRegistry {
            functions: BTreeMap::new(),
            lazy: BTreeSet::new(),
        }
    }

    /// Add a builtin with the given declared arity.
    pub fn register(
        &mut self,
        name: &str,
        arity: usize,
        implementation: impl Fn(Vec<Value>) -> BoxFuture<'static, Result<Value, EvalError>>
        + Send
        + Sync
        + 'static,
    ) {
        let implementation: Box<NativeImpl> = Box::new(implementation);
        self.functions.insert(
            name.to_string(),
            Arc::new(Function::Native(NativeFunction::new(
                name,
                arity,
                implementation,
            ))),
        );
    }

    /// Add a builtin that short-circuits: its call sites get
    /// deferred-argument wrapping at compile time.
    pub fn register_lazy(
        &mut self,
        name: &str,
        arity: usize,
        implementation: impl Fn(Vec<Value>) -> BoxFuture<'static, Result<Value, EvalError>>
        + Send
        + Sync
        + 'static,
    ) {
        self.register(name, arity, implementation);
        self.lazy.insert(name.to_string());
    }

    /// Resolve a builtin reference. Namespace and path markers on the
    /// name are ignored.
    pub fn lookup(&self, name: &str) -> Option<Value> {
        let name = name.trim_end_matches('/').trim_end_matches(':');
        self.functions
            .get(name)
            .map(|function| Value::Function(function.clone()))
    }

    pub fn is_lazy(&self, name: &str) -> bool {
        self.lazy.contains(name)
    }

    /// The compile options matching this registry.
    pub fn parser_options(&self) -> ParserOptions {
        ParserOptions {
            lazy_targets: self.lazy.clone(),
        }
    }

    /// The standard builtin set: tree inspection and composition helpers
    /// plus a short-circuiting conditional.
    pub fn standard() -> Arc<Self> {
        let mut registry = BuiltinRegistry::new();

        registry.register("keys", 1, |args| {
            Box::pin(async move {
                let target = first_arg(&args)?;
                let tree = from_value(target)?;
                let keys = tree.keys().await?;
                Ok(Value::Array(keys.into_iter().map(Value::String).collect()))
            })
        });

        registry.register("values", 1, |args| {
            Box::pin(async move {
                let target = first_arg(&args)?;
                let tree = from_value(target)?;
                let values = crate::tree::values(&tree).await?;
                Ok(Value::Array(
                    values
                        .into_iter()
                        .map(|value| value.unwrap_or(Value::Null))
                        .collect(),
                ))
            })
        });

        registry.register("plain", 1, |args| {
            Box::pin(async move {
                let target = first_arg(&args)?;
                plain(target).await
            })
        });

        registry.register("merge", 2, |args| {
            Box::pin(async move {
                let trees = args
                    .iter()
                    .map(from_value)
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Value::Tree(merge(trees)))
            })
        });

        registry.register("concat", 1, |args| {
            Box::pin(async move {
                let mut joined = String::new();
                for value in &args {
                    joined.push_str(&text_projection(value).await?);
                }
                Ok(Value::String(joined))
            })
        });

        registry.register("map", 2, |args| {
            Box::pin(async move {
                let target = first_arg(&args)?;
                let tree = from_value(target)?;
                let Some(Value::Function(function)) = args.get(1).cloned() else {
                    return Err(EvalError::Type(
                        "map needs a function as its second argument".to_string(),
                    ));
                };
                let map_fn: Arc<MapFn> = Arc::new(move |value, _key| {
                    let function = function.clone();
                    Box::pin(async move { function.call(vec![value]).await })
                });
                Ok(Value::Tree(map(tree, map_fn)))
            })
        });

        registry.register_lazy("if", 3, |args| {
            Box::pin(async move {
                let mut args = args.into_iter();
                let condition = force(args.next().unwrap_or(Value::Null)).await?;
                let selected = if condition.as_bool() {
                    args.next()
                } else {
                    args.nth(1)
                };
                force(selected.unwrap_or(Value::Null)).await
            })
        });

        Arc::new(registry)
    }
}

impl Default for BuiltinRegistry {
    fn default() -> Self {
        BuiltinRegistry::new()
    }
}

fn first_arg(args: &[Value]) -> Result<&Value, EvalError> {
    args.first()
        .ok_or_else(|| EvalError::Type("missing argument".to_string()))
}

// A deferred argument arrives as a zero-parameter closure; anything else
// is already a value.
async fn force(value: Value) -> Result<Value, EvalError> {
    match &value {
        Value::Function(function) if function.arity() == 0 => function.call(Vec::new()).await,
        _ => Ok(value),
    }
}
