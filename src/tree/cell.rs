use std::sync::RwLock;

use async_trait::async_trait;

use crate::evaluator::EvalError;
use crate::tree::{Tree, TreeRef};
use crate::value::Value;

/// An explicit indirection slot holding a tree reference.
///
/// Holders keep the cell and dereference through it on every operation, so
/// replacing the contents atomically swaps the effective tree for all of
/// them. Reactive re-evaluation uses this to rebind a tree without
/// changing any holder's reference.
pub struct CellTree {
    slot: RwLock<TreeRef>,
}

impl CellTree {
    pub fn new(inner: TreeRef) -> Self {
        CellTree {
            slot: RwLock::new(inner),
        }
    }

    /// The tree currently in the slot.
    pub fn current(&self) -> TreeRef {
        match self.slot.read() {
            Ok(slot) => slot.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Replace the slot's contents, returning the previous tree.
    pub fn replace(&self, inner: TreeRef) -> TreeRef {
        match self.slot.write() {
            Ok(mut slot) => std::mem::replace(&mut *slot, inner),
            Err(poisoned) => std::mem::replace(&mut *poisoned.into_inner(), inner),
        }
    }
}

#[async_trait]
impl Tree for CellTree {
    async fn keys(&self) -> Result<Vec<String>, EvalError> {
        self.current().keys().await
    }

    async fn get(&self, key: &str) -> Result<Option<Value>, EvalError> {
        self.current().get(key).await
    }

    async fn set(&self, key: &str, value: Option<Value>) -> Result<(), EvalError> {
        self.current().set(key, value).await
    }

    fn is_mutable(&self) -> bool {
        self.current().is_mutable()
    }

    async fn is_key_for_subtree(&self, key: &str) -> Result<bool, EvalError> {
        self.current().is_key_for_subtree(key).await
    }
}
