use std::sync::Arc;

use async_trait::async_trait;

use crate::evaluator::{EvalError, Function};
use crate::tree::Tree;
use crate::value::Value;

/// A callable value viewed as a tree: `get` invokes the function with the
/// requested key. The key space of a function is not enumerable.
pub struct FunctionTree {
    function: Arc<Function>,
}

impl FunctionTree {
    pub fn new(function: Arc<Function>) -> Self {
        FunctionTree { function }
    }
}

#[async_trait]
impl Tree for FunctionTree {
    async fn keys(&self) -> Result<Vec<String>, EvalError> {
        Ok(Vec::new())
    }

    async fn get(&self, key: &str) -> Result<Option<Value>, EvalError> {
        let result = self
            .function
            .call(vec![Value::String(key.to_string())])
            .await?;
        Ok(Some(result))
    }
}
