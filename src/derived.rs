//! The formula and virtual-key subsystem.
//!
//! [`FormulaTree`] wraps any tree and augments its key/get behavior with
//! lazily-computed entries: keys that parse as formulas become rules, the
//! set of rule-implied keys converges to a fixed point, and `get` falls
//! back to rule evaluation when no physical value exists. Derived state
//! is memoized until an explicit change notification invalidates it.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::{Arc, Mutex, Weak};

use async_trait::async_trait;

use crate::builtins::BuiltinRegistry;
use crate::evaluator::{EvalError, Evaluator};
use crate::formula::Formula;
use crate::parser::Parser;
use crate::scope::ScopeChain;
use crate::tree::{ObjectTree, Tree, TreeRef, from_value};
use crate::value::Value;

// A physical key starting with this prefix names a child-additions
// subtree whose keys and values merge into the node.
const ADDITIONS_PREFIX: char = '+';

/// One discovered key with its flags. Virtual keys are derived rather
/// than physically stored; hidden keys participate in lookup but are
/// excluded from public enumeration.
#[derive(Debug, Clone, PartialEq)]
pub struct KeyEntry {
    pub key: String,
    pub is_virtual: bool,
    pub hidden: bool,
}

struct KeyState {
    formulas: Vec<Formula>,
    entries: Vec<KeyEntry>,
    real: Vec<String>,
    virtual_keys: Vec<String>,
    public: Vec<String>,
    additions: Vec<TreeRef>,
}

/// A tree wrapper that derives keys and values from formulas.
pub struct FormulaTree {
    inner: TreeRef,
    scope: ScopeChain,
    builtins: Arc<BuiltinRegistry>,
    bindings: BTreeMap<String, Value>,
    state: Mutex<Option<Arc<KeyState>>>,
    self_ref: Weak<FormulaTree>,
}

impl FormulaTree {
    /// Wrap a tree. `scope` is the enclosing scope formulas evaluate
    /// against (a non-owning back-reference to the surrounding context).
    pub fn new(inner: TreeRef, scope: ScopeChain, builtins: Arc<BuiltinRegistry>) -> Arc<Self> {
        Self::with_bindings(inner, scope, builtins, BTreeMap::new())
    }

    /// Wrap a tree with explicit bindings, e.g. formula-parameter
    /// bindings established by an enclosing evaluation. Bindings take
    /// precedence over physical values in `get`.
    pub fn with_bindings(
        inner: TreeRef,
        scope: ScopeChain,
        builtins: Arc<BuiltinRegistry>,
        bindings: BTreeMap<String, Value>,
    ) -> Arc<Self> {
        Arc::new_cyclic(|self_ref| FormulaTree {
            inner,
            scope,
            builtins,
            bindings,
            state: Mutex::new(None),
            self_ref: self_ref.clone(),
        })
    }

    /// The change notification: drops all memoized key/formula state so
    /// the next access recomputes it from the base tree.
    pub fn invalidate(&self) {
        if let Ok(mut state) = self.state.lock() {
            *state = None;
        }
    }

    /// The parsed formulas, constant formulas first (stable order).
    pub async fn formulas(&self) -> Result<Vec<Formula>, EvalError> {
        Ok(self.state().await?.formulas.clone())
    }

    /// Physical keys that are not formulas.
    pub async fn real_keys(&self) -> Result<Vec<String>, EvalError> {
        Ok(self.state().await?.real.clone())
    }

    /// Derived keys: the fixed point of formula-implied keys, minus the
    /// real keys.
    pub async fn virtual_keys(&self) -> Result<Vec<String>, EvalError> {
        Ok(self.state().await?.virtual_keys.clone())
    }

    /// Every discovered key with its virtual/hidden flags, in discovery
    /// order.
    pub async fn all_keys(&self) -> Result<Vec<KeyEntry>, EvalError> {
        Ok(self.state().await?.entries.clone())
    }

    /// The keys exposed by public enumeration: everything not hidden.
    pub async fn public_keys(&self) -> Result<Vec<String>, EvalError> {
        Ok(self.state().await?.public.clone())
    }

    fn cached_state(&self) -> Option<Arc<KeyState>> {
        match self.state.lock() {
            Ok(state) => state.clone(),
            Err(_) => None,
        }
    }

    async fn state(&self) -> Result<Arc<KeyState>, EvalError> {
        if let Some(state) = self.cached_state() {
            return Ok(state);
        }
        let computed = Arc::new(self.compute_state().await?);
        if let Ok(mut state) = self.state.lock() {
            // Concurrent computations produce identical results; the last
            // writer wins.
            *state = Some(computed.clone());
        }
        Ok(computed)
    }

    // Discover keys in waves: seed with the physical keys, then let the
    // formulas and any child additions contribute until a pass adds
    // nothing new.
    async fn compute_state(&self) -> Result<KeyState, EvalError> {
        let physical = self.inner.keys().await?;

        let mut formulas: Vec<Formula> = physical
            .iter()
            .filter_map(|key| Formula::parse(key))
            .collect();
        // Constant formulas are cheaper and unambiguous; they take
        // precedence. The sort is stable.
        formulas.sort_by_key(|formula| !formula.is_constant());

        let formula_sources: BTreeSet<&str> =
            formulas.iter().map(|formula| formula.source()).collect();

        let mut queue: VecDeque<KeyEntry> = VecDeque::new();
        for key in &physical {
            queue.push_back(KeyEntry {
                key: key.clone(),
                is_virtual: false,
                hidden: formula_sources.contains(key.as_str())
                    || key.starts_with(ADDITIONS_PREFIX),
            });
        }

        let mut entries: Vec<KeyEntry> = Vec::new();
        let mut known: BTreeSet<String> = BTreeSet::new();
        let mut additions: Vec<TreeRef> = Vec::new();

        loop {
            while let Some(entry) = queue.pop_front() {
                if known.contains(&entry.key) {
                    continue;
                }
                if entry.key.starts_with(ADDITIONS_PREFIX) {
                    // A child addition: surface the subtree's keys as
                    // virtual entries and keep the subtree for lookup.
                    if let Some(value) = self.inner.get(&entry.key).await? {
                        let subtree = from_value(&value)?;
                        for key in subtree.keys().await? {
                            if !key.starts_with(ADDITIONS_PREFIX) {
                                queue.push_back(KeyEntry {
                                    key,
                                    is_virtual: true,
                                    hidden: false,
                                });
                            }
                        }
                        additions.push(subtree);
                    }
                }
                known.insert(entry.key.clone());
                entries.push(entry);
            }

            // Ask every formula to contribute any keys it implies.
            let mut implied = BTreeSet::new();
            for formula in &formulas {
                formula.add_implied_keys(&known, &mut implied);
            }
            let fresh: Vec<String> = implied.difference(&known).cloned().collect();
            if fresh.is_empty() {
                break;
            }
            for key in fresh {
                queue.push_back(KeyEntry {
                    key,
                    is_virtual: true,
                    hidden: false,
                });
            }
        }

        let real: Vec<String> = physical
            .iter()
            .filter(|key| !formula_sources.contains(key.as_str()))
            .cloned()
            .collect();
        let virtual_keys: Vec<String> = entries
            .iter()
            .filter(|entry| entry.is_virtual)
            .map(|entry| entry.key.clone())
            .collect();
        let public: Vec<String> = entries
            .iter()
            .filter(|entry| !entry.hidden)
            .map(|entry| entry.key.clone())
            .collect();

        Ok(KeyState {
            formulas,
            entries,
            real,
            virtual_keys,
            public,
            additions,
        })
    }

    // The scope formula expressions evaluate against: this node first,
    // then the enclosing scope.
    fn child_scope(&self) -> ScopeChain {
        match self.self_ref.upgrade() {
            Some(tree) => self.scope.with_inner(tree),
            None => self.scope.clone(),
        }
    }

    // Wrap subtree values so formulas apply through the hierarchy.
    fn wrap_value(&self, value: Value) -> Value {
        match value {
            Value::Tree(subtree) => Value::Tree(FormulaTree::new(
                subtree,
                self.child_scope(),
                self.builtins.clone(),
            )),
            other => other,
        }
    }

    async fn evaluate_formula(
        &self,
        formula: &Formula,
        key: &str,
    ) -> Result<Option<Value>, EvalError> {
        let Some(key_bindings) = formula.unify(key) else {
            return Ok(None);
        };

        if formula.expression().is_none() {
            // A bare pattern's value is whatever is physically stored
            // under the pattern key.
            return self.inner.get(formula.source()).await;
        }

        let Some(source) = formula.substitute(&key_bindings) else {
            return Ok(None);
        };
        let parser = Parser::new(self.builtins.parser_options());
        let code = parser.parse(&source)?;

        // The formula's key bindings compose over this tree's own
        // bindings; the key binding wins on conflict.
        let mut bindings = self.bindings.clone();
        for (name, text) in &key_bindings {
            bindings.insert(name.clone(), Value::String(text.clone()));
        }
        let binding_tree = Arc::new(ObjectTree::from_pairs(bindings.clone()));
        let scope = self.child_scope().with_inner(binding_tree);

        let evaluator = Evaluator::new(self.builtins.clone());
        let value = evaluator.eval(&code, &scope).await?;

        // Give a subtree result the complete bindings.
        Ok(Some(match value {
            Value::Tree(subtree) => Value::Tree(FormulaTree::with_bindings(
                subtree,
                self.child_scope(),
                self.builtins.clone(),
                bindings,
            )),
            other => other,
        }))
    }
}

#[async_trait]
impl Tree for FormulaTree {
    async fn keys(&self) -> Result<Vec<String>, EvalError> {
        self.public_keys().await
    }

    /// Resolution order: explicit bindings, then the physical value, then
    /// the formulas in priority order, then any child additions.
    async fn get(&self, key: &str) -> Result<Option<Value>, EvalError> {
        if let Some(value) = self.bindings.get(key) {
            return Ok(Some(value.clone()));
        }

        if let Some(value) = self.inner.get(key).await? {
            return Ok(Some(self.wrap_value(value)));
        }

        let state = self.state().await?;
        for formula in &state.formulas {
            if let Some(value) = self.evaluate_formula(formula, key).await? {
                return Ok(Some(value));
            }
        }

        for addition in &state.additions {
            if let Some(value) = addition.get(key).await? {
                return Ok(Some(self.wrap_value(value)));
            }
        }

        Ok(None)
    }

    async fn set(&self, key: &str, value: Option<Value>) -> Result<(), EvalError> {
        self.inner.set(key, value).await?;
        self.invalidate();
        Ok(())
    }

    fn is_mutable(&self) -> bool {
        self.inner.is_mutable()
    }
}
