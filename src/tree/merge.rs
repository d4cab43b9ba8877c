use std::collections::BTreeSet;

use async_trait::async_trait;

use crate::evaluator::EvalError;
use crate::tree::{Tree, TreeRef, from_value, merge};
use crate::value::Value;

/// A lazy n-ary merge of trees.
///
/// Keys are the union of all inputs' keys in first-seen order. For each
/// key the first tree defining it wins, except that when every
/// contributing value is itself treelike the subtrees merge recursively.
pub struct MergeTree {
    trees: Vec<TreeRef>,
}

impl MergeTree {
    pub fn new(trees: Vec<TreeRef>) -> Self {
        MergeTree { trees }
    }
}

#[async_trait]
impl Tree for MergeTree {
    async fn keys(&self) -> Result<Vec<String>, EvalError> {
        let mut seen = BTreeSet::new();
        let mut keys = Vec::new();
        for tree in &self.trees {
            for key in tree.keys().await? {
                if seen.insert(key.clone()) {
                    keys.push(key);
                }
            }
        }
        Ok(keys)
    }

    async fn get(&self, key: &str) -> Result<Option<Value>, EvalError> {
        let mut contributions = Vec::new();
        for tree in &self.trees {
            if let Some(value) = tree.get(key).await? {
                contributions.push(value);
            }
        }
        if contributions.is_empty() {
            return Ok(None);
        }
        if contributions.len() > 1 && contributions.iter().all(mergeable) {
            let subtrees = contributions
                .iter()
                .map(from_value)
                .collect::<Result<Vec<_>, _>>()?;
            return Ok(Some(Value::Tree(merge(subtrees))));
        }
        Ok(contributions.into_iter().next())
    }
}

// Subtrees merge recursively; functions and packed values do not, even
// though they are treelike for casting purposes.
fn mergeable(value: &Value) -> bool {
    matches!(value, Value::Tree(_) | Value::Object(_))
}
