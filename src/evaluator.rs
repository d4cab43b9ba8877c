//! The scope-resolving evaluator.
//!
//! Executes a code node against a scope chain, producing a value. The
//! evaluator holds no mutable state beyond the immutable builtin registry
//! it was constructed with; all suspension happens at tree `get`/`keys`
//! boundaries and at function invocation.

use std::fmt;
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use futures::future::{BoxFuture, join_all};
use rust_decimal::{Decimal, prelude::FromPrimitive, prelude::ToPrimitive};

use crate::ast::{BinaryOp, Code, Expr, UnaryOp};
use crate::builtins::BuiltinRegistry;
use crate::parser::ParseError;
use crate::scope::ScopeChain;
use crate::tree::{
    MapFn, ObjectTree, Tree, from_value, is_treelike, map_reduce, merge, traverse_or_fail,
};
use crate::value::Value;

/// Errors that can occur at runtime.
#[derive(Debug, Clone)]
pub enum EvalError {
    /// A scope, inherited, or builtin lookup found nothing
    Unresolved(String),

    /// An interior traversal step resolved to absent; carries the
    /// offending key and the full key path
    TraverseNotFound {
        key: Option<String>,
        path: Vec<String>,
    },

    /// A value matched none of the recognized treelike shapes
    Cast(&'static str),

    /// Type mismatch or invalid operation for the given type
    Type(String),

    /// A `set` call on an immutable tree
    Immutable(String),

    /// Division or remainder by zero
    DivisionByZero,

    /// A parse error surfaced at runtime (e.g. from a formula expression)
    Parse(ParseError),
}

impl fmt::Display for EvalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EvalError::Unresolved(name) => {
                write!(f, "Unresolved reference: {} is not defined", name)
            }
            EvalError::TraverseNotFound { key, path } => {
                let path = path.join("/");
                match key {
                    Some(key) => write!(f, "Traversal failed: {} does not exist in {}", key, path),
                    None => write!(f, "Couldn't traverse the path: {}", path),
                }
            }
            EvalError::Cast(type_name) => {
                write!(f, "Couldn't convert a {} to a tree", type_name)
            }
            EvalError::Type(msg) => write!(f, "Type error: {}", msg),
            EvalError::Immutable(key) => {
                write!(f, "Cannot set {}: the tree is not mutable", key)
            }
            EvalError::DivisionByZero => write!(f, "Division by zero"),
            EvalError::Parse(inner) => write!(f, "{}", inner),
        }
    }
}

impl std::error::Error for EvalError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            EvalError::Parse(inner) => Some(inner),
            _ => None,
        }
    }
}

impl From<ParseError> for EvalError {
    fn from(error: ParseError) -> Self {
        EvalError::Parse(error)
    }
}

/// The implementation of a native (builtin) function.
pub type NativeImpl =
    dyn Fn(Vec<Value>) -> BoxFuture<'static, Result<Value, EvalError>> + Send + Sync;

/// A natively-implemented function with a declared arity.
pub struct NativeFunction {
    pub name: String,
    pub arity: usize,
    implementation: Box<NativeImpl>,
}

impl NativeFunction {
    pub fn new(name: impl Into<String>, arity: usize, implementation: Box<NativeImpl>) -> Self {
        NativeFunction {
            name: name.into(),
            arity,
            implementation,
        }
    }
}

/// A lambda that captured the scope it was evaluated in. Invoking it runs
/// the body against that scope extended with the argument bindings.
pub struct Closure {
    pub params: Vec<String>,
    pub body: Expr,
    pub scope: ScopeChain,
    pub builtins: Arc<BuiltinRegistry>,
}

/// A callable value.
pub enum Function {
    Native(NativeFunction),
    Closure(Closure),
}

impl Function {
    /// The declared parameter count; traversal consumes this many keys
    /// (at least one) when it encounters a callable value.
    pub fn arity(&self) -> usize {
        match self {
            Function::Native(native) => native.arity,
            Function::Closure(closure) => closure.params.len(),
        }
    }

    pub fn call(&self, args: Vec<Value>) -> BoxFuture<'_, Result<Value, EvalError>> {
        Box::pin(async move {
            match self {
                Function::Native(native) => (native.implementation)(args).await,
                Function::Closure(closure) => {
                    let mut args = args.into_iter();
                    let bindings = ObjectTree::from_pairs(
                        closure
                            .params
                            .iter()
                            .map(|param| (param.clone(), args.next().unwrap_or(Value::Null))),
                    );
                    let scope = closure.scope.with_inner(Arc::new(bindings));
                    let evaluator = Evaluator::new(closure.builtins.clone());
                    evaluator.eval(&closure.body, &scope).await
                }
            }
        })
    }
}

impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Function::Native(native) => write!(f, "Native({})", native.name),
            Function::Closure(closure) => write!(f, "Closure({:?})", closure.params),
        }
    }
}

/// Executes code nodes against a scope.
pub struct Evaluator {
    builtins: Arc<BuiltinRegistry>,
}

impl Evaluator {
    pub fn new(builtins: Arc<BuiltinRegistry>) -> Self {
        Evaluator { builtins }
    }

    pub fn builtins(&self) -> &Arc<BuiltinRegistry> {
        &self.builtins
    }

    /// Evaluate a code node against the given scope.
    pub fn eval<'a>(
        &'a self,
        expr: &'a Expr,
        scope: &'a ScopeChain,
    ) -> BoxFuture<'a, Result<Value, EvalError>> {
        Box::pin(async move {
            match &expr.code {
                Code::Literal(value) => Ok(value.clone()),

                Code::Scope(name) | Code::Undetermined(name) => {
                    match scope.lookup(name).await? {
                        Some(value) => Ok(value),
                        None => Err(EvalError::Unresolved(trim_reference(name))),
                    }
                }

                Code::Inherited(name) => match scope.inherited_lookup(name).await? {
                    Some(value) => Ok(value),
                    None => Err(EvalError::Unresolved(trim_reference(name))),
                },

                Code::Builtin(name) => {
                    if let Some(value) = self.builtins.lookup(name) {
                        return Ok(value);
                    }
                    // A called reference may name a function bound in
                    // scope (a lambda parameter, a tree entry) rather
                    // than a builtin.
                    match scope.lookup(name).await? {
                        Some(value) => Ok(value),
                        None => Err(EvalError::Unresolved(trim_reference(name))),
                    }
                }

                Code::Lambda { params, body } => {
                    Ok(Value::Function(Arc::new(Function::Closure(Closure {
                        params: params.clone(),
                        body: (**body).clone(),
                        scope: scope.clone(),
                        builtins: self.builtins.clone(),
                    }))))
                }

                Code::Call { target, args } => {
                    let target_value = self.eval(target, scope).await?;
                    let arg_values = self.eval_all(args, scope).await?;
                    self.apply_call(target_value, arg_values).await
                }

                Code::Traverse { target, keys } => {
                    let target_value = self.eval(target, scope).await?;
                    let mut key_strings = Vec::with_capacity(keys.len());
                    for key in keys {
                        let value = self.eval(key, scope).await?;
                        key_strings.push(value.as_key().ok_or_else(|| {
                            EvalError::Type(format!(
                                "a {} cannot be used as a traversal key",
                                value.type_name()
                            ))
                        })?);
                    }
                    match traverse_or_fail(target_value, &key_strings).await? {
                        Some(value) => Ok(value),
                        None => Err(EvalError::TraverseNotFound {
                            key: key_strings.last().cloned(),
                            path: key_strings,
                        }),
                    }
                }

                Code::Unpack(inner) => {
                    let value = self.eval(inner, scope).await?;
                    match value {
                        Value::Packed(packed) => packed.unpack().await,
                        other => Ok(other),
                    }
                }

                Code::Template {
                    target,
                    strings,
                    values,
                } => {
                    let target_value = self.eval(target, scope).await?;
                    let function = match target_value {
                        Value::Function(function) => function,
                        other => {
                            return Err(EvalError::Type(format!(
                                "a {} cannot be used as a template tag",
                                other.type_name()
                            )));
                        }
                    };
                    let mut args = vec![Value::Array(
                        strings.iter().cloned().map(Value::String).collect(),
                    )];
                    for value in values {
                        args.push(self.eval(value, scope).await?);
                    }
                    function.call(args).await
                }

                Code::Array(items) => Ok(Value::Array(self.eval_all(items, scope).await?)),

                Code::Object(properties) => Ok(Value::Tree(ExpressionTree::create(
                    properties.clone(),
                    scope,
                    self.builtins.clone(),
                ))),

                Code::Getter(inner) => self.eval(inner, scope).await,

                Code::Merge(parts) => {
                    let mut trees = Vec::with_capacity(parts.len());
                    for part in parts {
                        let value = self.eval(part, scope).await?;
                        trees.push(from_value(&value)?);
                    }
                    Ok(Value::Tree(merge(trees)))
                }

                Code::Spread(inner) => self.eval(inner, scope).await,

                Code::Concat(items) => {
                    let values = self.eval_all(items, scope).await?;
                    let mut result = String::new();
                    for value in &values {
                        result.push_str(&text_projection(value).await?);
                    }
                    Ok(Value::String(result))
                }

                Code::Binary { op, left, right } => {
                    let left = self.eval(left, scope).await?;
                    let right = self.eval(right, scope).await?;
                    apply_binary(*op, left, right)
                }

                Code::Unary { op, operand } => {
                    let operand = self.eval(operand, scope).await?;
                    apply_unary(*op, operand)
                }
            }
        })
    }

    // Evaluate a list of operands; requests are issued together and the
    // results keep operand order.
    async fn eval_all(&self, exprs: &[Expr], scope: &ScopeChain) -> Result<Vec<Value>, EvalError> {
        let futures = exprs.iter().map(|expr| self.eval(expr, scope));
        join_all(futures).await.into_iter().collect()
    }

    async fn apply_call(&self, target: Value, args: Vec<Value>) -> Result<Value, EvalError> {
        match target {
            Value::Function(function) => function.call(args).await,
            value if is_treelike(&value) => {
                // Calling a tree traverses it with the arguments as keys.
                let mut keys = Vec::with_capacity(args.len());
                for arg in &args {
                    keys.push(arg.as_key().ok_or_else(|| {
                        EvalError::Type(format!(
                            "a {} cannot be used as a traversal key",
                            arg.type_name()
                        ))
                    })?);
                }
                match traverse_or_fail(value, &keys).await? {
                    Some(value) => Ok(value),
                    None => Err(EvalError::TraverseNotFound {
                        key: keys.last().cloned(),
                        path: keys,
                    }),
                }
            }
            other => Err(EvalError::Type(format!(
                "cannot call a {}",
                other.type_name()
            ))),
        }
    }
}

fn trim_reference(name: &str) -> String {
    name.trim_end_matches('/').trim_end_matches(':').to_string()
}

/// An object literal evaluated into a tree.
///
/// Literal properties are stored as values; getter properties keep their
/// code and evaluate on demand against a scope whose innermost entry is
/// the object itself, so sibling references resolve locally and inherited
/// references skip to the enclosing scope.
pub struct ExpressionTree {
    properties: Vec<(String, Slot)>,
    scope: ScopeChain,
    builtins: Arc<BuiltinRegistry>,
    self_ref: Weak<ExpressionTree>,
}

enum Slot {
    Value(Value),
    Code(Expr),
}

impl ExpressionTree {
    pub fn create(
        properties: Vec<(String, Expr)>,
        scope: &ScopeChain,
        builtins: Arc<BuiltinRegistry>,
    ) -> Arc<Self> {
        Arc::new_cyclic(|self_ref| ExpressionTree {
            properties: properties
                .into_iter()
                .map(|(key, expr)| match expr.code {
                    Code::Literal(value) => (key, Slot::Value(value)),
                    _ => (key, Slot::Code(expr)),
                })
                .collect(),
            scope: scope.clone(),
            builtins,
            self_ref: self_ref.clone(),
        })
    }

    fn child_scope(&self) -> ScopeChain {
        match self.self_ref.upgrade() {
            Some(tree) => self.scope.with_inner(tree),
            None => self.scope.clone(),
        }
    }
}

#[async_trait]
impl Tree for ExpressionTree {
    async fn keys(&self) -> Result<Vec<String>, EvalError> {
        let mut seen = std::collections::BTreeSet::new();
        Ok(self
            .properties
            .iter()
            .filter(|(key, _)| seen.insert(key.clone()))
            .map(|(key, _)| key.clone())
            .collect())
    }

    async fn get(&self, key: &str) -> Result<Option<Value>, EvalError> {
        // A repeated property key resolves to its last definition.
        let slot = self
            .properties
            .iter()
            .rev()
            .find(|(name, _)| name == key)
            .map(|(_, slot)| slot);
        match slot {
            Some(Slot::Value(value)) => Ok(Some(value.clone())),
            Some(Slot::Code(expr)) => {
                let scope = self.child_scope();
                let evaluator = Evaluator::new(self.builtins.clone());
                Ok(Some(evaluator.eval(expr, &scope).await?))
            }
            None => Ok(None),
        }
    }
}

/// Project a value to text for concatenation: absent-like values become
/// the empty string, strings pass through, numbers and `true` use their
/// display form, treelike values flatten through map-reduce, and
/// functions and packed values project to the empty string.
pub fn text_projection<'a>(value: &'a Value) -> BoxFuture<'a, Result<String, EvalError>> {
    Box::pin(async move {
        match value {
            Value::Null | Value::Boolean(false) => Ok(String::new()),
            Value::Boolean(true) => Ok("true".to_string()),
            Value::Integer(n) => Ok(n.to_string()),
            Value::Float(n) => Ok(n.to_string()),
            Value::String(s) => Ok(s.clone()),
            Value::Array(_) | Value::Object(_) | Value::Tree(_) => {
                let project: &MapFn = &|value, _key| {
                    Box::pin(async move {
                        Ok(Value::String(text_projection(&value).await?))
                    })
                };
                let flattened = map_reduce(value, Some(project), &|values, _keys| {
                    let mut joined = String::new();
                    for value in values {
                        if let Value::String(text) = value {
                            joined.push_str(&text);
                        }
                    }
                    Ok(Value::String(joined))
                })
                .await?;
                match flattened {
                    Value::String(text) => Ok(text),
                    _ => Ok(String::new()),
                }
            }
            Value::Function(_) | Value::Packed(_) => Ok(String::new()),
        }
    })
}

fn to_decimal(value: &Value) -> Option<Decimal> {
    match value {
        Value::Integer(n) => Some(Decimal::from(*n)),
        Value::Float(n) => Decimal::from_f64(*n),
        _ => None,
    }
}

fn from_decimal(decimal: Decimal) -> Value {
    if decimal.fract().is_zero() {
        if let Some(integer) = decimal.to_i64() {
            return Value::Integer(integer);
        }
    }
    Value::Float(decimal.to_f64().unwrap_or(f64::NAN))
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Integer(n) => Some(n.to_string()),
        Value::Float(n) => Some(n.to_string()),
        Value::Boolean(b) => Some(b.to_string()),
        Value::Null => Some("null".to_string()),
        _ => None,
    }
}

fn numeric_pair(left: &Value, right: &Value) -> Result<(Decimal, Decimal), EvalError> {
    match (to_decimal(left), to_decimal(right)) {
        (Some(a), Some(b)) => Ok((a, b)),
        _ => Err(EvalError::Type(format!(
            "cannot apply an arithmetic operator to {} and {}",
            left.type_name(),
            right.type_name()
        ))),
    }
}

fn integer_pair(left: &Value, right: &Value) -> Result<(i64, i64), EvalError> {
    match (left.as_int(), right.as_int()) {
        (Some(a), Some(b)) => Ok((a, b)),
        _ => Err(EvalError::Type(format!(
            "cannot apply a bitwise operator to {} and {}",
            left.type_name(),
            right.type_name()
        ))),
    }
}

fn loose_equal(left: &Value, right: &Value) -> bool {
    if let (Some(a), Some(b)) = (left.as_float(), right.as_float()) {
        a == b
    } else {
        left == right
    }
}

fn apply_binary(op: BinaryOp, left: Value, right: Value) -> Result<Value, EvalError> {
    use BinaryOp::*;
    match op {
        Addition => {
            // String addition concatenates, as in the host language.
            if matches!(left, Value::String(_)) || matches!(right, Value::String(_)) {
                let (Some(a), Some(b)) = (scalar_text(&left), scalar_text(&right)) else {
                    return Err(EvalError::Type(format!(
                        "cannot add {} and {}",
                        left.type_name(),
                        right.type_name()
                    )));
                };
                return Ok(Value::String(format!("{}{}", a, b)));
            }
            let (a, b) = numeric_pair(&left, &right)?;
            match a.checked_add(b) {
                Some(result) => Ok(from_decimal(result)),
                None => Err(EvalError::Type("arithmetic overflow".to_string())),
            }
        }
        Subtraction => {
            let (a, b) = numeric_pair(&left, &right)?;
            match a.checked_sub(b) {
                Some(result) => Ok(from_decimal(result)),
                None => Err(EvalError::Type("arithmetic overflow".to_string())),
            }
        }
        Multiplication => {
            let (a, b) = numeric_pair(&left, &right)?;
            match a.checked_mul(b) {
                Some(result) => Ok(from_decimal(result)),
                None => Err(EvalError::Type("arithmetic overflow".to_string())),
            }
        }
        Division => {
            let (a, b) = numeric_pair(&left, &right)?;
            if b.is_zero() {
                return Err(EvalError::DivisionByZero);
            }
            match a.checked_div(b) {
                Some(result) => Ok(from_decimal(result)),
                None => Err(EvalError::Type("arithmetic overflow".to_string())),
            }
        }
        Remainder => {
            let (a, b) = numeric_pair(&left, &right)?;
            if b.is_zero() {
                return Err(EvalError::DivisionByZero);
            }
            match a.checked_rem(b) {
                Some(result) => Ok(from_decimal(result)),
                None => Err(EvalError::Type("arithmetic overflow".to_string())),
            }
        }
        Exponentiation => {
            let (Some(a), Some(b)) = (left.as_float(), right.as_float()) else {
                return Err(EvalError::Type(format!(
                    "cannot exponentiate {} and {}",
                    left.type_name(),
                    right.type_name()
                )));
            };
            let result = a.powf(b);
            if result.is_finite() && result.fract() == 0.0 && result.abs() < i64::MAX as f64 {
                Ok(Value::Integer(result as i64))
            } else {
                Ok(Value::Float(result))
            }
        }
        BitwiseAnd => {
            let (a, b) = integer_pair(&left, &right)?;
            Ok(Value::Integer(a & b))
        }
        BitwiseOr => {
            let (a, b) = integer_pair(&left, &right)?;
            Ok(Value::Integer(a | b))
        }
        BitwiseXor => {
            let (a, b) = integer_pair(&left, &right)?;
            Ok(Value::Integer(a ^ b))
        }
        ShiftLeft => {
            let (a, b) = integer_pair(&left, &right)?;
            Ok(Value::Integer(shift_amount(b).map_or(0, |s| a.wrapping_shl(s))))
        }
        ShiftRightSigned => {
            let (a, b) = integer_pair(&left, &right)?;
            Ok(Value::Integer(shift_amount(b).map_or(
                if a < 0 { -1 } else { 0 },
                |s| a.wrapping_shr(s),
            )))
        }
        ShiftRightUnsigned => {
            let (a, b) = integer_pair(&left, &right)?;
            Ok(Value::Integer(
                shift_amount(b).map_or(0, |s| ((a as u64) >> s) as i64),
            ))
        }
        Equal => Ok(Value::Boolean(loose_equal(&left, &right))),
        NotEqual => Ok(Value::Boolean(!loose_equal(&left, &right))),
        StrictEqual => Ok(Value::Boolean(left == right)),
        NotStrictEqual => Ok(Value::Boolean(left != right)),
        LessThan | LessThanOrEqual | GreaterThan | GreaterThanOrEqual => {
            let ordering = compare(&left, &right)?;
            let result = match op {
                LessThan => ordering == std::cmp::Ordering::Less,
                LessThanOrEqual => ordering != std::cmp::Ordering::Greater,
                GreaterThan => ordering == std::cmp::Ordering::Greater,
                _ => ordering != std::cmp::Ordering::Less,
            };
            Ok(Value::Boolean(result))
        }
    }
}

fn shift_amount(amount: i64) -> Option<u32> {
    u32::try_from(amount).ok().filter(|shift| *shift < 64)
}

fn compare(left: &Value, right: &Value) -> Result<std::cmp::Ordering, EvalError> {
    if let (Some(a), Some(b)) = (left.as_float(), right.as_float()) {
        return a.partial_cmp(&b).ok_or_else(|| {
            EvalError::Type("cannot compare with a NaN operand".to_string())
        });
    }
    if let (Value::String(a), Value::String(b)) = (left, right) {
        return Ok(a.cmp(b));
    }
    Err(EvalError::Type(format!(
        "cannot compare {} and {}",
        left.type_name(),
        right.type_name()
    )))
}

fn apply_unary(op: UnaryOp, operand: Value) -> Result<Value, EvalError> {
    match op {
        UnaryOp::LogicalNot => Ok(Value::Boolean(!operand.as_bool())),
        UnaryOp::UnaryMinus => match operand {
            Value::Integer(n) => Ok(Value::Integer(-n)),
            Value::Float(n) => Ok(Value::Float(-n)),
            other => Err(EvalError::Type(format!(
                "cannot negate a {}",
                other.type_name()
            ))),
        },
        UnaryOp::UnaryPlus => match &operand {
            Value::Integer(_) | Value::Float(_) => Ok(operand),
            Value::String(text) => {
                if let Ok(integer) = text.parse::<i64>() {
                    Ok(Value::Integer(integer))
                } else if let Ok(float) = text.parse::<f64>() {
                    Ok(Value::Float(float))
                } else {
                    Err(EvalError::Type(format!("{:?} is not numeric", text)))
                }
            }
            other => Err(EvalError::Type(format!(
                "cannot convert a {} to a number",
                other.type_name()
            ))),
        },
        UnaryOp::BitwiseNot => match operand.as_int() {
            Some(n) => Ok(Value::Integer(!n)),
            None => Err(EvalError::Type(format!(
                "cannot apply a bitwise operator to a {}",
                operand.type_name()
            ))),
        },
    }
}
