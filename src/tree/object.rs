use std::collections::BTreeMap;
use std::sync::RwLock;

use async_trait::async_trait;

use crate::evaluator::EvalError;
use crate::tree::Tree;
use crate::value::Value;

/// A mutable in-memory tree over a key/value map.
///
/// Keys enumerate in stable sorted order. Assigning an absent value to an
/// existing key removes it.
pub struct ObjectTree {
    entries: RwLock<BTreeMap<String, Value>>,
}

impl ObjectTree {
    pub fn new() -> Self {
        ObjectTree {
            entries: RwLock::new(BTreeMap::new()),
        }
    }

    pub fn from_map(map: BTreeMap<String, Value>) -> Self {
        ObjectTree {
            entries: RwLock::new(map),
        }
    }

    pub fn from_pairs<I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (String, Value)>,
    {
        ObjectTree {
            entries: RwLock::new(pairs.into_iter().collect()),
        }
    }

    fn read(&self) -> Result<BTreeMap<String, Value>, EvalError> {
        match self.entries.read() {
            Ok(entries) => Ok(entries.clone()),
            Err(_) => Err(EvalError::Type("tree state poisoned".to_string())),
        }
    }
}

impl Default for ObjectTree {
    fn default() -> Self {
        ObjectTree::new()
    }
}

#[async_trait]
impl Tree for ObjectTree {
    async fn keys(&self) -> Result<Vec<String>, EvalError> {
        Ok(self.read()?.into_keys().collect())
    }

    async fn get(&self, key: &str) -> Result<Option<Value>, EvalError> {
        Ok(self.read()?.get(key).cloned())
    }

    async fn set(&self, key: &str, value: Option<Value>) -> Result<(), EvalError> {
        let mut entries = match self.entries.write() {
            Ok(entries) => entries,
            Err(_) => return Err(EvalError::Type("tree state poisoned".to_string())),
        };
        match value {
            Some(value) => {
                entries.insert(key.to_string(), value);
            }
            None => {
                entries.remove(key);
            }
        }
        Ok(())
    }

    fn is_mutable(&self) -> bool {
        true
    }
}
