//! Formulas: declarative rules parsed from tree keys.
//!
//! A key of the form `pattern = expression-source` (or a bare pattern key
//! containing wildcards) defines a formula. Patterns mix literal segments
//! with brace-delimited wildcard segments; unifying a requested key
//! against a pattern yields a binding map or failure.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::LazyLock;

use regex::{Captures, Regex};

use crate::parser::Parser;

static VARIABLE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{([A-Za-z_][A-Za-z0-9_]*)\}").unwrap());

// A wildcard-bearing reference token inside a formula expression; these
// drive implied-key discovery.
static INPUT_TOKEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[A-Za-z0-9_.\-{}]*\{[A-Za-z_][A-Za-z0-9_]*\}[A-Za-z0-9_.\-{}]*").unwrap()
});

/// One segment of a key pattern.
#[derive(Debug, Clone, PartialEq)]
pub enum PatternPart {
    Literal(String),
    Variable(String),
}

/// A key pattern: literal text mixed with bindable wildcard segments.
#[derive(Debug, Clone, PartialEq)]
pub struct Pattern {
    parts: Vec<PatternPart>,
}

impl Pattern {
    /// Parse pattern text. Fails on empty text or unbalanced braces.
    pub fn parse(text: &str) -> Option<Pattern> {
        if text.is_empty() {
            return None;
        }
        let mut parts = Vec::new();
        let mut literal = String::new();
        let mut chars = text.chars().peekable();
        while let Some(ch) = chars.next() {
            match ch {
                '{' => {
                    let mut name = String::new();
                    loop {
                        match chars.next() {
                            Some('}') => break,
                            Some(inner) if inner != '{' => name.push(inner),
                            _ => return None,
                        }
                    }
                    if !is_variable_name(&name) {
                        return None;
                    }
                    if !literal.is_empty() {
                        parts.push(PatternPart::Literal(std::mem::take(&mut literal)));
                    }
                    parts.push(PatternPart::Variable(name));
                }
                '}' => return None,
                _ => literal.push(ch),
            }
        }
        if !literal.is_empty() {
            parts.push(PatternPart::Literal(literal));
        }
        Some(Pattern { parts })
    }

    /// A constant pattern has no wildcard segments.
    pub fn is_constant(&self) -> bool {
        self.parts
            .iter()
            .all(|part| matches!(part, PatternPart::Literal(_)))
    }

    pub fn variables(&self) -> BTreeSet<&str> {
        self.parts
            .iter()
            .filter_map(|part| match part {
                PatternPart::Variable(name) => Some(name.as_str()),
                PatternPart::Literal(_) => None,
            })
            .collect()
    }

    /// Match a concrete key against the pattern, producing bindings for
    /// the wildcard segments. Wildcards match non-empty substrings; a
    /// repeated wildcard must bind the same text everywhere.
    pub fn unify(&self, key: &str) -> Option<BTreeMap<String, String>> {
        let mut bindings = BTreeMap::new();
        if unify_parts(&self.parts, key, &mut bindings) {
            Some(bindings)
        } else {
            None
        }
    }

    /// Substitute bindings into the pattern to produce a concrete key.
    /// Fails if any wildcard is unbound.
    pub fn instantiate(&self, bindings: &BTreeMap<String, String>) -> Option<String> {
        let mut result = String::new();
        for part in &self.parts {
            match part {
                PatternPart::Literal(text) => result.push_str(text),
                PatternPart::Variable(name) => result.push_str(bindings.get(name)?),
            }
        }
        Some(result)
    }

    /// The pattern's source text.
    pub fn text(&self) -> String {
        let mut result = String::new();
        for part in &self.parts {
            match part {
                PatternPart::Literal(text) => result.push_str(text),
                PatternPart::Variable(name) => {
                    result.push('{');
                    result.push_str(name);
                    result.push('}');
                }
            }
        }
        result
    }
}

fn is_variable_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {
            chars.all(|ch| ch.is_ascii_alphanumeric() || ch == '_')
        }
        _ => false,
    }
}

fn unify_parts(
    parts: &[PatternPart],
    key: &str,
    bindings: &mut BTreeMap<String, String>,
) -> bool {
    let Some((first, rest)) = parts.split_first() else {
        return key.is_empty();
    };
    match first {
        PatternPart::Literal(text) => match key.strip_prefix(text.as_str()) {
            Some(suffix) => unify_parts(rest, suffix, bindings),
            None => false,
        },
        PatternPart::Variable(name) => {
            if let Some(existing) = bindings.get(name).cloned() {
                return match key.strip_prefix(existing.as_str()) {
                    Some(suffix) => unify_parts(rest, suffix, bindings),
                    None => false,
                };
            }
            if key.is_empty() {
                return false;
            }
            let mut boundaries: Vec<usize> =
                key.char_indices().map(|(index, _)| index).skip(1).collect();
            boundaries.push(key.len());
            for boundary in boundaries {
                let (candidate, suffix) = key.split_at(boundary);
                bindings.insert(name.clone(), candidate.to_string());
                if unify_parts(rest, suffix, bindings) {
                    return true;
                }
                bindings.remove(name);
            }
            false
        }
    }
}

/// A declarative rule parsed from a tree key: a key pattern, the key
/// template it implies, and the expression that computes matching keys'
/// values. A *constant* formula has a literal pattern; a *variable*
/// formula has bindable segments.
#[derive(Debug, Clone, PartialEq)]
pub struct Formula {
    source: String,
    pattern: Pattern,
    expression: Option<String>,
    inputs: Vec<Pattern>,
}

impl Formula {
    /// Try to parse a tree key as a formula.
    ///
    /// `pattern = expression` keys become formulas when the pattern is
    /// well-formed and the expression compiles (wildcards are substituted
    /// with placeholder identifiers for the trial compile). A bare key
    /// containing wildcards is a value-carrying pattern; a bare constant
    /// key is not a formula.
    pub fn parse(key: &str) -> Option<Formula> {
        if let Some(index) = key.find('=') {
            let lhs = key[..index].trim();
            let rhs = key[index + 1..].trim();
            if rhs.is_empty() || rhs.starts_with('=') {
                return None;
            }
            let pattern = Pattern::parse(lhs)?;
            let probe = VARIABLE.replace_all(rhs, "$1");
            if Parser::default().parse(&probe).is_err() {
                return None;
            }
            let inputs = extract_inputs(rhs);
            return Some(Formula {
                source: key.to_string(),
                pattern,
                expression: Some(rhs.to_string()),
                inputs,
            });
        }
        if key.contains('{') {
            let pattern = Pattern::parse(key)?;
            if pattern.is_constant() {
                return None;
            }
            return Some(Formula {
                source: key.to_string(),
                pattern,
                expression: None,
                inputs: Vec::new(),
            });
        }
        None
    }

    /// Whether the key parses as a formula.
    pub fn is_formula(key: &str) -> bool {
        Formula::parse(key).is_some()
    }

    /// The full key text this formula was parsed from.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// The expression source, when the formula is an assignment.
    pub fn expression(&self) -> Option<&str> {
        self.expression.as_deref()
    }

    pub fn is_constant(&self) -> bool {
        self.pattern.is_constant()
    }

    /// Unify a requested key against the formula's pattern.
    pub fn unify(&self, key: &str) -> Option<BTreeMap<String, String>> {
        self.pattern.unify(key)
    }

    /// Substitute bindings into the expression source. Unbound wildcards
    /// are left untouched.
    pub fn substitute(&self, bindings: &BTreeMap<String, String>) -> Option<String> {
        let expression = self.expression()?;
        let result = VARIABLE.replace_all(expression, |caps: &Captures| {
            let name = &caps[1];
            bindings
                .get(name)
                .cloned()
                .unwrap_or_else(|| caps[0].to_string())
        });
        Some(result.into_owned())
    }

    /// Contribute the keys this formula implies, given the keys known so
    /// far. A constant formula implies its literal key. A variable
    /// formula unifies its wildcard-bearing expression references against
    /// the existing keys and implies the instantiated key template for
    /// every complete binding. A bare pattern implies nothing, since its
    /// key space can't be enumerated.
    pub fn add_implied_keys(&self, existing: &BTreeSet<String>, implied: &mut BTreeSet<String>) {
        if self.expression.is_none() {
            return;
        }
        if self.is_constant() {
            implied.insert(self.pattern.text());
            return;
        }
        for key in existing {
            for input in &self.inputs {
                if let Some(bindings) = input.unify(key) {
                    if let Some(instantiated) = self.pattern.instantiate(&bindings) {
                        implied.insert(instantiated);
                    }
                }
            }
        }
    }
}

fn extract_inputs(expression: &str) -> Vec<Pattern> {
    INPUT_TOKEN
        .find_iter(expression)
        .filter_map(|token| Pattern::parse(token.as_str()))
        .collect()
}

#[test]
fn test_pattern_unify() {
    let pattern = Pattern::parse("{name}.html").unwrap();
    let bindings = pattern.unify("about.html").unwrap();
    assert_eq!(bindings.get("name").map(String::as_str), Some("about"));
    assert!(pattern.unify("about.md").is_none());
}

#[test]
fn test_constant_formula_sorts_first() {
    let constant = Formula::parse("index = template()").unwrap();
    let variable = Formula::parse("{x}.html = render()").unwrap();
    assert!(constant.is_constant());
    assert!(!variable.is_constant());
}
