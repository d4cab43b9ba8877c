use std::sync::Arc;

use async_trait::async_trait;
use futures::lock::Mutex;

use crate::evaluator::EvalError;
use crate::tree::{Packable, Tree, TreeRef, from_value};
use crate::value::Value;

/// A tree over a packed value, deferring the unpack until first access.
/// The unpacked tree is memoized.
pub struct DeferredTree {
    packed: Arc<dyn Packable>,
    resolved: Mutex<Option<TreeRef>>,
}

impl DeferredTree {
    pub fn new(packed: Arc<dyn Packable>) -> Self {
        DeferredTree {
            packed,
            resolved: Mutex::new(None),
        }
    }

    async fn tree(&self) -> Result<TreeRef, EvalError> {
        let mut resolved = self.resolved.lock().await;
        if let Some(tree) = resolved.as_ref() {
            return Ok(tree.clone());
        }
        let unpacked = self.packed.unpack().await?;
        let tree = from_value(&unpacked)?;
        *resolved = Some(tree.clone());
        Ok(tree)
    }
}

#[async_trait]
impl Tree for DeferredTree {
    async fn keys(&self) -> Result<Vec<String>, EvalError> {
        self.tree().await?.keys().await
    }

    async fn get(&self, key: &str) -> Result<Option<Value>, EvalError> {
        self.tree().await?.get(key).await
    }

    async fn is_key_for_subtree(&self, key: &str) -> Result<bool, EvalError> {
        self.tree().await?.is_key_for_subtree(key).await
    }
}
