use std::sync::Arc;

use canopy_lang::ast::{Code, Expr, Span};
use canopy_lang::builtins::BuiltinRegistry;
use canopy_lang::evaluator::{EvalError, Evaluator};
use canopy_lang::parser::Parser;
use canopy_lang::scope::ScopeChain;
use canopy_lang::tree::{ObjectTree, Tree, TreeRef};
use canopy_lang::value::Value;

fn object_tree(pairs: Vec<(&str, Value)>) -> TreeRef {
    Arc::new(ObjectTree::from_pairs(
        pairs.into_iter().map(|(key, value)| (key.to_string(), value)),
    ))
}

fn scope_of(pairs: Vec<(&str, Value)>) -> ScopeChain {
    ScopeChain::new(vec![object_tree(pairs)])
}

async fn eval_in(source: &str, scope: &ScopeChain) -> Result<Value, EvalError> {
    let registry = BuiltinRegistry::standard();
    let parser = Parser::new(registry.parser_options());
    let code = parser.parse(source)?;
    Evaluator::new(registry).eval(&code, scope).await
}

async fn eval_str(source: &str) -> Result<Value, EvalError> {
    eval_in(source, &ScopeChain::default()).await
}

// Evaluate a lambda source to a function value usable as a tree entry.
async fn function_value(source: &str) -> Value {
    eval_str(source).await.unwrap()
}

#[tokio::test]
async fn test_literal() {
    assert_eq!(eval_str("42").await.unwrap(), Value::Integer(42));
    assert_eq!(
        eval_str("'hello'").await.unwrap(),
        Value::String("hello".to_string())
    );
}

#[tokio::test]
async fn test_scope_reference() {
    let scope = scope_of(vec![("name", Value::String("world".to_string()))]);
    assert_eq!(
        eval_in("name", &scope).await.unwrap(),
        Value::String("world".to_string())
    );
}

#[tokio::test]
async fn test_unresolved_reference_is_an_error() {
    let error = eval_str("missing").await.unwrap_err();
    assert!(matches!(error, EvalError::Unresolved(name) if name == "missing"));
}

#[tokio::test]
async fn test_call_dispatch_end_to_end() {
    // A call of a scope-resolved function with a scope-resolved argument.
    let greet = function_value("(name) => \"Hello \" + name").await;
    let scope = scope_of(vec![
        ("greet", greet),
        ("name", Value::String("world".to_string())),
    ]);

    let call = Expr::new(
        Code::Call {
            target: Box::new(Expr::new(Code::Scope("greet".to_string()), Span::default())),
            args: vec![Expr::new(Code::Scope("name".to_string()), Span::default())],
        },
        Span::default(),
    );
    let registry = BuiltinRegistry::standard();
    let result = Evaluator::new(registry).eval(&call, &scope).await.unwrap();
    assert_eq!(result, Value::String("Hello world".to_string()));
}

#[tokio::test]
async fn test_lambda_captures_scope() {
    let scope = scope_of(vec![("base", Value::Integer(10))]);
    let result = eval_in("((n) => base + n)(5)", &scope).await.unwrap();
    assert_eq!(result, Value::Integer(15));
}

#[tokio::test]
async fn test_traverse_expression() {
    let inner = object_tree(vec![("bar", Value::Integer(7))]);
    let scope = scope_of(vec![("x", Value::Tree(inner))]);
    assert_eq!(eval_in("x/bar", &scope).await.unwrap(), Value::Integer(7));
}

#[tokio::test]
async fn test_traverse_missing_path_is_an_error() {
    let inner = object_tree(vec![("bar", Value::Integer(7))]);
    let scope = scope_of(vec![("x", Value::Tree(inner))]);
    let error = eval_in("x/nope", &scope).await.unwrap_err();
    assert!(matches!(error, EvalError::TraverseNotFound { .. }));
}

#[tokio::test]
async fn test_unpack_of_plain_value_is_identity() {
    let inner = object_tree(vec![("bar", Value::Integer(7))]);
    let scope = scope_of(vec![("x", Value::Tree(inner.clone()))]);
    let result = eval_in("x/", &scope).await.unwrap();
    let Value::Tree(found) = result else {
        panic!("expected the tree itself");
    };
    assert!(Arc::ptr_eq(&found, &inner));
}

#[tokio::test]
async fn test_calling_a_tree_traverses_it() {
    let inner = object_tree(vec![("bar", Value::Integer(3))]);
    let scope = scope_of(vec![("x", Value::Tree(inner))]);
    let result = eval_in("((t) => t('bar'))(x)", &scope).await.unwrap();
    assert_eq!(result, Value::Integer(3));
}

#[tokio::test]
async fn test_template_concatenation() {
    let scope = scope_of(vec![("name", Value::String("world".to_string()))]);
    assert_eq!(
        eval_in("`Hello, ${name}`", &scope).await.unwrap(),
        Value::String("Hello, world".to_string())
    );
}

#[tokio::test]
async fn test_concat_projections() {
    // Falsy values project to the empty string; trees flatten.
    let items = object_tree(vec![
        ("a", Value::String("x".to_string())),
        ("b", Value::String("y".to_string())),
    ]);
    let scope = scope_of(vec![
        ("items", Value::Tree(items)),
        ("nothing", Value::Null),
        ("no", Value::Boolean(false)),
    ]);
    assert_eq!(
        eval_in("`<${items}>${nothing}${no}`", &scope).await.unwrap(),
        Value::String("<xy>".to_string())
    );
}

#[tokio::test]
async fn test_object_literal_self_reference_uses_enclosing_scope() {
    // foo = foo + 1 against an enclosing foo = 10 yields 11, not
    // infinite recursion.
    let scope = scope_of(vec![("foo", Value::Integer(10))]);
    let result = eval_in("{ foo: foo + 1 }", &scope).await.unwrap();
    let Value::Tree(tree) = result else {
        panic!("expected an object tree");
    };
    assert_eq!(tree.get("foo").await.unwrap(), Some(Value::Integer(11)));
}

#[tokio::test]
async fn test_object_sibling_references_resolve_locally() {
    let scope = ScopeChain::default();
    let result = eval_in("{ a: 2, b: a * 3 }", &scope).await.unwrap();
    let Value::Tree(tree) = result else {
        panic!("expected an object tree");
    };
    assert_eq!(tree.keys().await.unwrap(), vec!["a", "b"]);
    assert_eq!(tree.get("b").await.unwrap(), Some(Value::Integer(6)));
}

#[tokio::test]
async fn test_object_spread_merges_at_value_level() {
    let more = object_tree(vec![("c", Value::Integer(3))]);
    let scope = scope_of(vec![("more", Value::Tree(more))]);
    let result = eval_in("{ a: 1, ...more, b: 2 }", &scope).await.unwrap();
    let Value::Tree(tree) = result else {
        panic!("expected a merged tree");
    };
    assert_eq!(tree.keys().await.unwrap(), vec!["a", "c", "b"]);
    assert_eq!(tree.get("a").await.unwrap(), Some(Value::Integer(1)));
    assert_eq!(tree.get("c").await.unwrap(), Some(Value::Integer(3)));
    assert_eq!(tree.get("b").await.unwrap(), Some(Value::Integer(2)));
}

#[tokio::test]
async fn test_array_literal() {
    assert_eq!(
        eval_str("[1, 'two']").await.unwrap(),
        Value::Array(vec![Value::Integer(1), Value::String("two".to_string())])
    );
}

#[tokio::test]
async fn test_decimal_arithmetic_preserves_types() {
    assert_eq!(eval_str("1 + 2").await.unwrap(), Value::Integer(3));
    assert_eq!(eval_str("6 / 2").await.unwrap(), Value::Integer(3));
    assert_eq!(eval_str("5 / 2").await.unwrap(), Value::Float(2.5));
    // Decimal arithmetic avoids binary floating-point drift.
    assert_eq!(eval_str("0.1 + 0.2").await.unwrap(), Value::Float(0.3));
    assert_eq!(eval_str("7 % 3").await.unwrap(), Value::Integer(1));
}

#[tokio::test]
async fn test_division_by_zero() {
    assert!(matches!(
        eval_str("1 / 0").await.unwrap_err(),
        EvalError::DivisionByZero
    ));
}

#[tokio::test]
async fn test_string_addition_concatenates() {
    assert_eq!(
        eval_str("'a' + 'b'").await.unwrap(),
        Value::String("ab".to_string())
    );
    assert_eq!(
        eval_str("'n = ' + 3").await.unwrap(),
        Value::String("n = 3".to_string())
    );
}

#[tokio::test]
async fn test_equality_operators() {
    assert_eq!(eval_str("1 == 1.0").await.unwrap(), Value::Boolean(true));
    assert_eq!(eval_str("1 === 1.0").await.unwrap(), Value::Boolean(false));
    assert_eq!(eval_str("1 != 2").await.unwrap(), Value::Boolean(true));
    assert_eq!(eval_str("'a' !== 'a'").await.unwrap(), Value::Boolean(false));
}

#[tokio::test]
async fn test_comparisons_and_shifts() {
    assert_eq!(eval_str("2 < 10").await.unwrap(), Value::Boolean(true));
    assert_eq!(eval_str("'b' > 'a'").await.unwrap(), Value::Boolean(true));
    assert_eq!(eval_str("1 << 3").await.unwrap(), Value::Integer(8));
    assert_eq!(eval_str("256 >> 4").await.unwrap(), Value::Integer(16));
    assert_eq!(eval_str("5 & 3").await.unwrap(), Value::Integer(1));
    assert_eq!(eval_str("5 | 2").await.unwrap(), Value::Integer(7));
    assert_eq!(eval_str("5 ^ 1").await.unwrap(), Value::Integer(4));
}

#[tokio::test]
async fn test_exponentiation_folds_left() {
    assert_eq!(eval_str("2 ** 3 ** 2").await.unwrap(), Value::Integer(64));
}

#[tokio::test]
async fn test_unary_operators() {
    assert_eq!(eval_str("-5").await.unwrap(), Value::Integer(-5));
    assert_eq!(eval_str("!0").await.unwrap(), Value::Boolean(true));
    assert_eq!(eval_str("~0").await.unwrap(), Value::Integer(-1));
    assert_eq!(eval_str("+'12'").await.unwrap(), Value::Integer(12));
}

#[tokio::test]
async fn test_lazy_if_short_circuits() {
    // The unselected branch would fail to resolve; deferral means it is
    // never evaluated.
    assert_eq!(eval_str("if(true, 1, boom)").await.unwrap(), Value::Integer(1));
    assert_eq!(eval_str("if(false, boom, 2)").await.unwrap(), Value::Integer(2));
    // When the branch is selected, the failure surfaces.
    assert!(eval_str("if(true, boom, 2)").await.is_err());
}

#[tokio::test]
async fn test_keys_and_plain_builtins() {
    let data = object_tree(vec![("a", Value::Integer(1)), ("b", Value::Integer(2))]);
    let scope = scope_of(vec![("data", Value::Tree(data))]);

    assert_eq!(
        eval_in("keys(data)", &scope).await.unwrap(),
        Value::Array(vec![
            Value::String("a".to_string()),
            Value::String("b".to_string()),
        ])
    );

    let plain = eval_in("plain(data)", &scope).await.unwrap();
    let Value::Object(map) = plain else {
        panic!("expected a plain object");
    };
    assert_eq!(map.get("a"), Some(&Value::Integer(1)));
}

#[tokio::test]
async fn test_map_builtin_is_lazy_and_deep() {
    let data = object_tree(vec![("a", Value::Integer(1)), ("b", Value::Integer(2))]);
    let scope = scope_of(vec![("data", Value::Tree(data))]);

    let mapped = eval_in("map(data, (v) => v * 10)", &scope).await.unwrap();
    let Value::Tree(tree) = mapped else {
        panic!("expected a mapped tree");
    };
    assert_eq!(tree.keys().await.unwrap(), vec!["a", "b"]);
    assert_eq!(tree.get("b").await.unwrap(), Some(Value::Integer(20)));
}

#[tokio::test]
async fn test_merge_builtin() {
    let first = object_tree(vec![("a", Value::Integer(1))]);
    let second = object_tree(vec![("b", Value::Integer(2))]);
    let scope = scope_of(vec![
        ("first", Value::Tree(first)),
        ("second", Value::Tree(second)),
    ]);

    let merged = eval_in("merge(first, second)", &scope).await.unwrap();
    let Value::Tree(tree) = merged else {
        panic!("expected a merged tree");
    };
    assert_eq!(tree.keys().await.unwrap(), vec!["a", "b"]);
}

#[tokio::test]
async fn test_evaluation_is_stateless_across_calls() {
    let scope = scope_of(vec![("n", Value::Integer(1))]);
    assert_eq!(eval_in("n + 1", &scope).await.unwrap(), Value::Integer(2));
    assert_eq!(eval_in("n + 1", &scope).await.unwrap(), Value::Integer(2));
}
