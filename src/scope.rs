use crate::evaluator::EvalError;
use crate::tree::{TreeRef, remove_trailing_slash};
use crate::value::Value;

/// An ordered list of trees used for name resolution, innermost first.
///
/// Lookup is first-match-wins across the sequence. The chain itself is
/// immutable; extending it produces a new chain sharing the tail.
#[derive(Clone, Default)]
pub struct ScopeChain {
    trees: Vec<TreeRef>,
}

impl ScopeChain {
    pub fn new(trees: Vec<TreeRef>) -> Self {
        ScopeChain { trees }
    }

    /// A new chain with the given tree as the innermost entry.
    pub fn with_inner(&self, tree: TreeRef) -> Self {
        let mut trees = Vec::with_capacity(self.trees.len() + 1);
        trees.push(tree);
        trees.extend(self.trees.iter().cloned());
        ScopeChain { trees }
    }

    pub fn trees(&self) -> &[TreeRef] {
        &self.trees
    }

    /// Resolve a key against the chain, returning the first non-absent
    /// result. A key carrying a trailing path separator also matches the
    /// bare entry.
    pub async fn lookup(&self, key: &str) -> Result<Option<Value>, EvalError> {
        lookup_in(&self.trees, key).await
    }

    /// Resolve a key while skipping the innermost entry, so a definition
    /// referencing its own key resolves to an enclosing scope's value
    /// instead of recursing into itself.
    pub async fn inherited_lookup(&self, key: &str) -> Result<Option<Value>, EvalError> {
        match self.trees.split_first() {
            Some((_, rest)) => lookup_in(rest, key).await,
            None => Ok(None),
        }
    }
}

async fn lookup_in(trees: &[TreeRef], key: &str) -> Result<Option<Value>, EvalError> {
    let trimmed = remove_trailing_slash(key);
    for tree in trees {
        if let Some(value) = tree.get(key).await? {
            return Ok(Some(value));
        }
        if trimmed != key {
            if let Some(value) = tree.get(trimmed).await? {
                return Ok(Some(value));
            }
        }
    }
    Ok(None)
}
