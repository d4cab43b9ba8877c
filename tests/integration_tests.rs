//! End-to-end flows: JSON documents wrapped as trees, expressions
//! evaluated against them, formulas deriving keys, and the CLI entry
//! points.

use std::sync::Arc;

use canopy_lang::builtins::BuiltinRegistry;
use canopy_lang::cli::{self, EvalOptions, EvalOutcome};
use canopy_lang::derived::FormulaTree;
use canopy_lang::evaluator::Evaluator;
use canopy_lang::parser::Parser;
use canopy_lang::scope::ScopeChain;
use canopy_lang::tree::{self, Tree, TreeRef};
use canopy_lang::value::Value;

fn document_scope(json: &str) -> (ScopeChain, Arc<FormulaTree>) {
    let registry = BuiltinRegistry::standard();
    let document = Value::from_json(serde_json::from_str(json).unwrap());
    let base = tree::from_value(&document).unwrap();
    let wrapped = FormulaTree::new(base, ScopeChain::default(), registry);
    let tree_ref: TreeRef = wrapped.clone();
    (ScopeChain::new(vec![tree_ref]), wrapped)
}

async fn eval_against(json: &str, source: &str) -> Value {
    let registry = BuiltinRegistry::standard();
    let (scope, _) = document_scope(json);
    let parser = Parser::new(registry.parser_options());
    let code = parser.parse(source).unwrap();
    Evaluator::new(registry).eval(&code, &scope).await.unwrap()
}

#[tokio::test]
async fn test_path_expression_over_json_document() {
    let result = eval_against(r#"{"site": {"title": "Home"}}"#, "site/title").await;
    assert_eq!(result, Value::String("Home".to_string()));
}

#[tokio::test]
async fn test_builtins_over_json_document() {
    let result = eval_against(r#"{"data": {"a": 1, "b": 2}}"#, "keys(data)").await;
    assert_eq!(
        result,
        Value::Array(vec![
            Value::String("a".to_string()),
            Value::String("b".to_string()),
        ])
    );
}

#[tokio::test]
async fn test_template_over_document_values() {
    let result = eval_against(
        r#"{"user": "ada", "count": 3}"#,
        "`${user} has ${count} items`",
    )
    .await;
    assert_eq!(result, Value::String("ada has 3 items".to_string()));
}

#[tokio::test]
async fn test_formula_keys_in_documents() {
    // A JSON key that parses as a formula becomes a derived entry.
    let (_, tree) = document_scope(
        r#"{"title": "Site", "banner = `== ${title} ==`": null}"#,
    );
    assert_eq!(
        tree.get("banner").await.unwrap(),
        Some(Value::String("== Site ==".to_string()))
    );
    assert_eq!(tree.keys().await.unwrap(), vec!["title", "banner"]);
}

#[tokio::test]
async fn test_virtual_keys_drive_derived_documents() {
    let (_, tree) = document_scope(
        r#"{
            "{page}.html = `<h1>${ {page}.title }</h1>`": null,
            "home.title": "Welcome",
            "news.title": "Updates"
        }"#,
    );
    let mut keys = tree.keys().await.unwrap();
    keys.sort();
    assert_eq!(
        keys,
        vec!["home.html", "home.title", "news.html", "news.title"]
    );
    assert_eq!(
        tree.get("news.html").await.unwrap(),
        Some(Value::String("<h1>Updates</h1>".to_string()))
    );
}

#[tokio::test]
async fn test_plain_flattens_evaluated_objects() {
    let result = eval_against("{}", "plain({ a: 1, b: { c: 2 } })").await;
    let Value::Object(map) = result else {
        panic!("expected a plain object");
    };
    assert_eq!(map.get("a"), Some(&Value::Integer(1)));
    let Some(Value::Object(inner)) = map.get("b") else {
        panic!("expected a nested plain object");
    };
    assert_eq!(inner.get("c"), Some(&Value::Integer(2)));
}

#[tokio::test]
async fn test_cli_eval_compact_output() {
    let options = EvalOptions {
        expression: "price * 2".to_string(),
        input: Some(r#"{"price": 21}"#.to_string()),
        pretty: false,
        syntax_only: false,
    };
    let outcome = cli::execute_eval(&options).await.unwrap();
    let EvalOutcome::Success(output) = outcome else {
        panic!("expected output");
    };
    assert_eq!(output, "42");
}

#[tokio::test]
async fn test_cli_eval_tree_output_is_flattened() {
    let options = EvalOptions {
        expression: "{ doubled: price * 2, label: `x${price}` }".to_string(),
        input: Some(r#"{"price": 10}"#.to_string()),
        pretty: false,
        syntax_only: false,
    };
    let EvalOutcome::Success(output) = cli::execute_eval(&options).await.unwrap() else {
        panic!("expected output");
    };
    assert_eq!(output, r#"{"doubled":20,"label":"x10"}"#);
}

#[tokio::test]
async fn test_cli_syntax_only() {
    let options = EvalOptions {
        expression: "1 +".to_string(),
        input: None,
        pretty: false,
        syntax_only: true,
    };
    assert!(cli::execute_eval(&options).await.is_err());

    let options = EvalOptions {
        expression: "1 + 2".to_string(),
        input: None,
        pretty: false,
        syntax_only: true,
    };
    assert!(matches!(
        cli::execute_eval(&options).await.unwrap(),
        EvalOutcome::SyntaxValid
    ));
}

#[tokio::test]
async fn test_cli_keys_lists_virtual_keys() {
    let keys = cli::execute_keys(Some(
        r#"{"{x}.out = {x}.in": null, "a.in": 1}"#,
    ))
    .await
    .unwrap();
    assert_eq!(keys, vec!["a.in".to_string(), "a.out".to_string()]);
}
