//! The asynchronous tree abstraction.
//!
//! A [`Tree`] is a uniform interface over any hierarchical key-value data
//! source: in-memory objects, functions, deferred documents, merged views.
//! Everything here suspends at `keys`/`get`/`set` boundaries; aggregate
//! operations fan their requests out before awaiting any of them and
//! recombine results in request order.

pub mod array;
pub mod cell;
pub mod deferred;
pub mod function;
pub mod map;
pub mod merge;
pub mod object;

use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::{BoxFuture, join_all};

pub use array::ArrayTree;
pub use cell::CellTree;
pub use deferred::DeferredTree;
pub use function::FunctionTree;
pub use map::MapTree;
pub use merge::MergeTree;
pub use object::ObjectTree;

use crate::evaluator::EvalError;
use crate::value::Value;

/// Shared handle to a tree node.
pub type TreeRef = Arc<dyn Tree>;

/// The tree capability contract.
///
/// Any type satisfying this shape is treelike. `get` returns `Ok(None)` for
/// a merely-missing key; errors are reserved for genuinely exceptional
/// conditions. `keys` must be idempotent absent mutation, with no
/// duplicates and a stable (tree-defined) order.
#[async_trait]
pub trait Tree: Send + Sync {
    /// The node's own top-level keys.
    async fn keys(&self) -> Result<Vec<String>, EvalError>;

    /// The value for a key, or `None` if the key does not resolve.
    async fn get(&self, key: &str) -> Result<Option<Value>, EvalError>;

    /// Store a value for a key. Assigning `None` to an existing key removes
    /// it. Only mutable trees implement this.
    async fn set(&self, key: &str, _value: Option<Value>) -> Result<(), EvalError> {
        Err(EvalError::Immutable(key.to_string()))
    }

    /// Whether this tree accepts `set` calls.
    fn is_mutable(&self) -> bool {
        false
    }

    /// Whether the key is expected to produce a subtree. The default
    /// fetches the value and tests it; trees with a cheaper answer
    /// override this.
    async fn is_key_for_subtree(&self, key: &str) -> Result<bool, EvalError> {
        Ok(matches!(self.get(key).await?, Some(Value::Tree(_))))
    }
}

/// A packed value: one that exposes an unpack operation producing the real
/// value on demand.
#[async_trait]
pub trait Packable: Send + Sync {
    async fn unpack(&self) -> Result<Value, EvalError>;
}

/// Attempt to cast a value to a tree.
///
/// Trees pass through unchanged (casting is idempotent). A function becomes
/// a tree whose `get` invokes it; an array is keyed by index; a plain
/// object becomes a tree directly; a packed value becomes a tree that
/// defers unpacking until first access. Anything else fails with a cast
/// error.
pub fn from_value(value: &Value) -> Result<TreeRef, EvalError> {
    match value {
        Value::Tree(tree) => Ok(tree.clone()),
        Value::Function(function) => Ok(Arc::new(FunctionTree::new(function.clone()))),
        Value::Array(items) => Ok(Arc::new(ArrayTree::new(items.clone()))),
        Value::Object(map) => Ok(Arc::new(ObjectTree::from_map(map.clone()))),
        Value::Packed(packed) => Ok(Arc::new(DeferredTree::new(packed.clone()))),
        other => Err(EvalError::Cast(other.type_name())),
    }
}

/// Whether the value can be directly treated as a tree by [`from_value`].
pub fn is_treelike(value: &Value) -> bool {
    matches!(
        value,
        Value::Tree(_) | Value::Function(_) | Value::Array(_) | Value::Object(_) | Value::Packed(_)
    )
}

/// Whether the value can be traversed: treelike, or packed.
pub fn is_traversable(value: &Value) -> bool {
    is_treelike(value)
}

/// The outcome of walking a key path.
///
/// An interior step resolving to absent is data, not an exception; only
/// [`traverse_or_fail`] turns it into an error.
#[derive(Debug, Clone, PartialEq)]
pub enum Traversal {
    /// Every key was consumed. The final `get` may still have come up
    /// empty, in which case the value is `None`.
    Complete(Option<Value>),

    /// An interior step resolved to absent with keys still unconsumed.
    Incomplete {
        /// The key whose value was absent, when one was being looked up.
        key: Option<String>,
        /// The full requested path.
        path: Vec<String>,
    },
}

/// Walk the given keys left to right, starting from `start`.
///
/// At each step a packed value is unpacked first. A function consumes as
/// many remaining keys as its arity (at least one) and its result becomes
/// the current value directly; any other value is cast to a tree and one
/// key is consumed via `get`. A single remaining empty-string key selects
/// the current (unpacked) value itself. With no keys at all, the start
/// value is returned unchanged.
pub async fn traverse(start: Value, keys: &[String]) -> Result<Traversal, EvalError> {
    let mut value = Some(start);
    let mut remaining: VecDeque<String> = keys.iter().cloned().collect();
    let mut last_key: Option<String> = None;

    while !remaining.is_empty() {
        let Some(current) = value else {
            return Ok(Traversal::Incomplete {
                key: last_key,
                path: keys.to_vec(),
            });
        };

        let current = match &current {
            Value::Packed(packed) => packed.unpack().await?,
            _ => current,
        };

        // Peek ahead: a single remaining empty key selects the value itself.
        if remaining.len() == 1 && remaining[0].is_empty() {
            return Ok(Traversal::Complete(Some(current)));
        }

        if let Value::Function(function) = &current {
            let count = function.arity().max(1).min(remaining.len());
            let args: Vec<Value> = remaining.drain(..count).map(Value::String).collect();
            last_key = None;
            value = Some(function.call(args).await?);
        } else {
            let tree = from_value(&current)?;
            let key = match remaining.pop_front() {
                Some(key) => key,
                None => {
                    value = Some(current);
                    break;
                }
            };
            value = tree.get(&key).await?;
            last_key = Some(key);
        }
    }

    Ok(Traversal::Complete(value))
}

/// Traversal variant that reports an interior absent step as an error
/// identifying the offending key and the full path.
pub async fn traverse_or_fail(start: Value, keys: &[String]) -> Result<Option<Value>, EvalError> {
    match traverse(start, keys).await? {
        Traversal::Complete(value) => Ok(value),
        Traversal::Incomplete { key, path } => Err(EvalError::TraverseNotFound { key, path }),
    }
}

/// Traversal variant that converts exactly the interior-absent failure to
/// an absent result; every other error propagates unchanged.
pub async fn traverse_optional(start: Value, keys: &[String]) -> Result<Option<Value>, EvalError> {
    match traverse(start, keys).await? {
        Traversal::Complete(value) => Ok(value),
        Traversal::Incomplete { .. } => Ok(None),
    }
}

/// Traverse a slash-separated path like `"foo/bar"`.
pub async fn traverse_path(start: Value, path: &str) -> Result<Option<Value>, EvalError> {
    let keys = keys_from_path(path);
    traverse_optional(start, &keys).await
}

/// Split a slash-separated path into traversal keys. A trailing slash
/// becomes a final empty key (the "select the container itself" idiom).
pub fn keys_from_path(path: &str) -> Vec<String> {
    let mut keys: Vec<String> = path
        .split('/')
        .filter(|segment| !segment.is_empty())
        .map(str::to_string)
        .collect();
    if path.ends_with('/') && !keys.is_empty() {
        keys.push(String::new());
    }
    keys
}

/// An asynchronous per-value mapping function.
pub type MapFn =
    dyn Fn(Value, &str) -> BoxFuture<'static, Result<Value, EvalError>> + Send + Sync;

/// Map and reduce a tree, in as parallel a fashion as possible.
///
/// Every value is requested before any request is awaited. Values that are
/// themselves trees are recursed into (the recursive call supplies the
/// aggregation, so `map_fn` is skipped for them); scalar values go through
/// `map_fn` when one is given. Once all values resolve, `reduce_fn`
/// receives them together with the keys, in key order regardless of
/// completion order.
pub fn map_reduce<'a, R>(
    value: &'a Value,
    map_fn: Option<&'a MapFn>,
    reduce_fn: &'a R,
) -> BoxFuture<'a, Result<Value, EvalError>>
where
    R: Fn(Vec<Value>, Vec<String>) -> Result<Value, EvalError> + Send + Sync,
{
    Box::pin(async move {
        let tree = from_value(value)?;
        let keys = tree.keys().await?;

        let requests = keys.iter().map(|key| {
            let tree = tree.clone();
            async move {
                match tree.get(key).await? {
                    Some(subtree @ Value::Tree(_)) => {
                        map_reduce(&subtree, map_fn, reduce_fn).await
                    }
                    Some(scalar) => match map_fn {
                        Some(f) => f(scalar, key).await,
                        None => Ok(scalar),
                    },
                    None => Ok(Value::Null),
                }
            }
        });

        let resolved = join_all(requests).await;
        let values = resolved.into_iter().collect::<Result<Vec<_>, _>>()?;
        reduce_fn(values, keys)
    })
}

/// Flatten a tree into a plain value. Key sets that look like consecutive
/// indices collapse into arrays.
pub async fn plain(value: &Value) -> Result<Value, EvalError> {
    map_reduce(value, None, &|values, keys| {
        Ok(cast_array_like(values, keys))
    })
    .await
}

fn cast_array_like(values: Vec<Value>, keys: Vec<String>) -> Value {
    let indices: Option<Vec<usize>> = keys.iter().map(|k| k.parse::<usize>().ok()).collect();
    if let Some(indices) = indices.filter(|indices| !indices.is_empty()) {
        let mut sorted = indices.clone();
        sorted.sort_unstable();
        if sorted.iter().copied().eq(0..keys.len()) {
            let mut ordered: Vec<(usize, Value)> = indices.into_iter().zip(values).collect();
            ordered.sort_by_key(|(index, _)| *index);
            return Value::Array(ordered.into_iter().map(|(_, value)| value).collect());
        }
    }
    let map: BTreeMap<String, Value> = keys.into_iter().zip(values).collect();
    Value::Object(map)
}

/// Return a new tree with deeply-mapped values of the original tree.
pub fn map(tree: TreeRef, map_fn: Arc<MapFn>) -> TreeRef {
    Arc::new(MapTree::new(tree, map_fn))
}

/// Apply the key/value pairs from the source tree to the target tree.
///
/// If a key exists in both trees and both values are subtrees, the
/// subtrees merge recursively; otherwise the source value overwrites the
/// target's key. All per-key operations are issued concurrently and the
/// call completes when all have settled, reporting the first error if any.
pub fn assign<'a>(target: &'a TreeRef, source: &'a TreeRef) -> BoxFuture<'a, Result<(), EvalError>> {
    Box::pin(async move {
        if !target.is_mutable() {
            return Err(EvalError::Type(
                "assign target must be a mutable tree".to_string(),
            ));
        }
        let keys = source.keys().await?;
        let updates = keys.iter().map(|key| async move {
            let source_value = source.get(key).await?;
            if let Some(Value::Tree(source_subtree)) = &source_value {
                if let Some(Value::Tree(target_subtree)) = target.get(key).await? {
                    if target_subtree.is_mutable() {
                        // Both sides are trees; recurse.
                        return assign(&target_subtree, source_subtree).await;
                    }
                }
            }
            target.set(key, source_value).await
        });
        let settled = join_all(updates).await;
        settled.into_iter().collect::<Result<Vec<_>, _>>()?;
        Ok(())
    })
}

/// Merge trees into a single view. Keys are the union of all inputs in
/// first-seen order; for each key the first tree defining it wins, except
/// that subtrees contributed by several inputs merge recursively.
pub fn merge(trees: Vec<TreeRef>) -> TreeRef {
    Arc::new(MergeTree::new(trees))
}

/// The `[key, value]` pairs of the tree's own node.
pub async fn entries(tree: &TreeRef) -> Result<Vec<(String, Option<Value>)>, EvalError> {
    let keys = tree.keys().await?;
    let fetches = keys.iter().map(|key| async move {
        Ok::<_, EvalError>((key.clone(), tree.get(key).await?))
    });
    join_all(fetches).await.into_iter().collect()
}

/// The values of the tree's own node, in key order.
pub async fn values(tree: &TreeRef) -> Result<Vec<Option<Value>>, EvalError> {
    let keys = tree.keys().await?;
    let fetches = keys.iter().map(|key| tree.get(key));
    join_all(fetches).await.into_iter().collect()
}

/// Whether the tree has a value for the key.
pub async fn has(tree: &TreeRef, key: &str) -> Result<bool, EvalError> {
    Ok(tree.get(key).await?.is_some())
}

/// Remove the value for the key. Returns whether anything was removed.
pub async fn remove(tree: &TreeRef, key: &str) -> Result<bool, EvalError> {
    if has(tree, key).await? {
        tree.set(key, None).await?;
        Ok(true)
    } else {
        Ok(false)
    }
}

/// Remove all entries from the tree.
pub async fn clear(tree: &TreeRef) -> Result<(), EvalError> {
    for key in tree.keys().await? {
        tree.set(&key, None).await?;
    }
    Ok(())
}

/// Whether the key carries the trailing path separator marking a subtree
/// reference.
pub fn has_trailing_slash(key: &str) -> bool {
    key.ends_with('/')
}

/// Add the trailing path separator if absent.
pub fn add_trailing_slash(key: &str) -> String {
    if has_trailing_slash(key) {
        key.to_string()
    } else {
        format!("{key}/")
    }
}

/// Strip the trailing path separator if present.
pub fn remove_trailing_slash(key: &str) -> &str {
    key.strip_suffix('/').unwrap_or(key)
}
