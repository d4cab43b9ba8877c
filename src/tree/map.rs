use std::sync::Arc;

use async_trait::async_trait;

use crate::evaluator::EvalError;
use crate::tree::{MapFn, Tree, TreeRef};
use crate::value::Value;

/// A deeply-mapped view of a tree: scalar values pass through the mapping
/// function on access, subtree values are wrapped so the mapping applies
/// all the way down. Keys are untouched.
pub struct MapTree {
    inner: TreeRef,
    map_fn: Arc<MapFn>,
}

impl MapTree {
    pub fn new(inner: TreeRef, map_fn: Arc<MapFn>) -> Self {
        MapTree { inner, map_fn }
    }
}

#[async_trait]
impl Tree for MapTree {
    async fn keys(&self) -> Result<Vec<String>, EvalError> {
        self.inner.keys().await
    }

    async fn get(&self, key: &str) -> Result<Option<Value>, EvalError> {
        match self.inner.get(key).await? {
            Some(Value::Tree(subtree)) => Ok(Some(Value::Tree(Arc::new(MapTree::new(
                subtree,
                self.map_fn.clone(),
            ))))),
            Some(value) => Ok(Some((self.map_fn)(value, key).await?)),
            None => Ok(None),
        }
    }

    async fn is_key_for_subtree(&self, key: &str) -> Result<bool, EvalError> {
        self.inner.is_key_for_subtree(key).await
    }
}
