use async_trait::async_trait;

use crate::evaluator::EvalError;
use crate::tree::Tree;
use crate::value::Value;

/// An ordered collection viewed as a tree keyed by index.
pub struct ArrayTree {
    items: Vec<Value>,
}

impl ArrayTree {
    pub fn new(items: Vec<Value>) -> Self {
        ArrayTree { items }
    }
}

#[async_trait]
impl Tree for ArrayTree {
    async fn keys(&self) -> Result<Vec<String>, EvalError> {
        Ok((0..self.items.len()).map(|i| i.to_string()).collect())
    }

    async fn get(&self, key: &str) -> Result<Option<Value>, EvalError> {
        let index: usize = match key.parse() {
            Ok(index) => index,
            Err(_) => return Ok(None),
        };
        Ok(self.items.get(index).cloned())
    }
}
