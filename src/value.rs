use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::evaluator::Function;
use crate::tree::{Packable, TreeRef};

/// A runtime value in the Canopy expression language.
///
/// Besides the plain JSON-like scalars and collections, a value may be a
/// [`Tree`](crate::tree::Tree) (a lazily-computed hierarchical node), a
/// function (native builtin or closure), or a packed value that defers
/// unpacking until first access.
///
/// # Type Preservation
///
/// The language preserves the distinction between integers and floats:
/// arithmetic maintains integer types when results are whole numbers, and
/// high-precision decimal arithmetic prevents floating-point errors.
///
/// # Examples
///
/// ```
/// use canopy_lang::Value;
/// use std::collections::BTreeMap;
///
/// // Scalar values
/// let null = Value::Null;
/// let boolean = Value::Boolean(true);
/// let integer = Value::Integer(42);
/// let string = Value::String("hello".to_string());
///
/// // Collections
/// let array = Value::Array(vec![Value::Integer(1), Value::Integer(2)]);
///
/// let mut obj = BTreeMap::new();
/// obj.insert("key".to_string(), Value::String("value".to_string()));
/// let object = Value::Object(obj);
/// ```
#[derive(Clone)]
pub enum Value {
    /// Null
    Null,

    /// Boolean (true/false)
    Boolean(bool),

    /// Integer number (preserved separately from floats)
    Integer(i64),

    /// Floating-point number
    Float(f64),

    /// UTF-8 string
    String(String),

    /// Array of values
    Array(Vec<Value>),

    /// Plain object with string keys, in stable sorted order
    Object(BTreeMap<String, Value>),

    /// A hierarchical key-value node; see [`crate::tree::Tree`]
    Tree(TreeRef),

    /// A callable value: a native builtin or a closure capturing a scope
    Function(Arc<Function>),

    /// A packed value exposing an unpack operation, deferred to first access
    Packed(Arc<dyn Packable>),
}

impl Value {
    /// Check if the value is truthy (for conditions)
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Boolean(b) => *b,
            Value::Integer(n) => *n != 0,
            Value::Float(n) => *n != 0.0,
            Value::String(s) => !s.is_empty(),
            Value::Array(arr) => !arr.is_empty(),
            Value::Object(obj) => !obj.is_empty(),
            Value::Tree(_) | Value::Function(_) | Value::Packed(_) => true,
        }
    }

    /// Convert to boolean for conditions
    pub fn as_bool(&self) -> bool {
        match self {
            Value::Boolean(b) => *b,
            _ => self.is_truthy(),
        }
    }

    /// Get as float
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Integer(n) => Some(*n as f64),
            Value::Float(n) => Some(*n),
            _ => None,
        }
    }

    /// Get as integer
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Integer(n) => Some(*n),
            Value::Float(n) => Some(n.round() as i64),
            _ => None,
        }
    }

    /// Project a scalar to a lookup key. Composite values have no key form.
    pub fn as_key(&self) -> Option<String> {
        match self {
            Value::String(s) => Some(s.clone()),
            Value::Integer(n) => Some(n.to_string()),
            Value::Float(n) => Some(n.to_string()),
            Value::Boolean(b) => Some(b.to_string()),
            _ => None,
        }
    }

    /// Human-readable type name, used in error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Boolean(_) => "boolean",
            Value::Integer(_) => "integer",
            Value::Float(_) => "float",
            Value::String(_) => "string",
            Value::Array(_) => "array",
            Value::Object(_) => "object",
            Value::Tree(_) => "tree",
            Value::Function(_) => "function",
            Value::Packed(_) => "packed",
        }
    }

    /// Build a value from a parsed JSON document.
    pub fn from_json(json: serde_json::Value) -> Value {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Boolean(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Integer(i),
                None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(items) => {
                Value::Array(items.into_iter().map(Value::from_json).collect())
            }
            serde_json::Value::Object(map) => Value::Object(
                map.into_iter()
                    .map(|(k, v)| (k, Value::from_json(v)))
                    .collect(),
            ),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            (Value::Integer(a), Value::Integer(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => a == b,
            // Reference variants compare by identity.
            (Value::Tree(a), Value::Tree(b)) => Arc::ptr_eq(a, b),
            (Value::Function(a), Value::Function(b)) => Arc::ptr_eq(a, b),
            (Value::Packed(a), Value::Packed(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

// Debug can't be derived: the trait-object variants carry no Debug bound.
impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "Null"),
            Value::Boolean(b) => write!(f, "Boolean({b})"),
            Value::Integer(n) => write!(f, "Integer({n})"),
            Value::Float(n) => write!(f, "Float({n})"),
            Value::String(s) => write!(f, "String({s:?})"),
            Value::Array(items) => f.debug_tuple("Array").field(items).finish(),
            Value::Object(map) => f.debug_tuple("Object").field(map).finish(),
            Value::Tree(_) => write!(f, "Tree(..)"),
            Value::Function(_) => write!(f, "Function(..)"),
            Value::Packed(_) => write!(f, "Packed(..)"),
        }
    }
}
