use canopy_lang::ast::{BinaryOp, Code, Expr};
use canopy_lang::parser::{Parser, ParserOptions};
use canopy_lang::value::Value;

fn parse(source: &str) -> Expr {
    Parser::default().parse(source).unwrap()
}

#[test]
fn test_literals() {
    assert_eq!(parse("42").code, Code::Literal(Value::Integer(42)));
    assert_eq!(parse("3.5").code, Code::Literal(Value::Float(3.5)));
    assert_eq!(
        parse("\"hi\\n\"").code,
        Code::Literal(Value::String("hi\n".to_string()))
    );
    assert_eq!(
        parse("'single'").code,
        Code::Literal(Value::String("single".to_string()))
    );
    assert_eq!(parse("true").code, Code::Literal(Value::Boolean(true)));
    assert_eq!(parse("null").code, Code::Literal(Value::Null));
}

#[test]
fn test_uncalled_reference_downgrades_to_scope() {
    assert_eq!(parse("foo").code, Code::Scope("foo".to_string()));
}

#[test]
fn test_namespace_reference_is_builtin() {
    assert_eq!(parse("fs:").code, Code::Builtin("fs:".to_string()));
}

#[test]
fn test_file_like_identifier_is_scope_reference() {
    assert_eq!(parse("index.html").code, Code::Scope("index.html".to_string()));
}

#[test]
fn test_ordinary_call_upgrades_to_builtin() {
    let expr = parse("bar(1, 2)");
    let Code::Call { target, args } = expr.code else {
        panic!("expected a call");
    };
    assert_eq!(target.code, Code::Builtin("bar".to_string()));
    assert_eq!(args.len(), 2);
}

#[test]
fn test_path_traversal_downgrades_and_adds_slash() {
    let expr = parse("x/bar");
    let Code::Traverse { target, keys } = expr.code else {
        panic!("expected a traversal");
    };
    assert_eq!(target.code, Code::Scope("x/".to_string()));
    assert_eq!(keys.len(), 1);
    assert_eq!(keys[0].code, Code::Literal(Value::String("bar".to_string())));
}

#[test]
fn test_bare_trailing_slash_is_unpack() {
    let expr = parse("x/");
    let Code::Unpack(target) = expr.code else {
        panic!("expected unpack");
    };
    assert_eq!(target.code, Code::Scope("x/".to_string()));
}

#[test]
fn test_path_with_trailing_slash_selects_container() {
    let expr = parse("x/a/");
    let Code::Traverse { keys, .. } = expr.code else {
        panic!("expected a traversal");
    };
    let key_texts: Vec<_> = keys
        .iter()
        .map(|key| match &key.code {
            Code::Literal(Value::String(text)) => text.clone(),
            other => panic!("unexpected key {:?}", other),
        })
        .collect();
    assert_eq!(key_texts, vec!["a".to_string(), String::new()]);
}

#[test]
fn test_precedence() {
    let expr = parse("1 + 2 * 3");
    let Code::Binary { op, left, right } = expr.code else {
        panic!("expected a binary node");
    };
    assert_eq!(op, BinaryOp::Addition);
    assert_eq!(left.code, Code::Literal(Value::Integer(1)));
    assert!(matches!(
        right.code,
        Code::Binary {
            op: BinaryOp::Multiplication,
            ..
        }
    ));
}

#[test]
fn test_left_associative_folding() {
    let expr = parse("1 - 2 - 3");
    let Code::Binary { op, left, right } = expr.code else {
        panic!("expected a binary node");
    };
    assert_eq!(op, BinaryOp::Subtraction);
    assert_eq!(right.code, Code::Literal(Value::Integer(3)));
    assert!(matches!(
        left.code,
        Code::Binary {
            op: BinaryOp::Subtraction,
            ..
        }
    ));
}

#[test]
fn test_op_name_is_human_readable() {
    assert_eq!(parse("1 + 2").op_name(), "addition");
    assert_eq!(parse("[1]").op_name(), "array");
    assert_eq!(parse("(a) => a").op_name(), "lambda");
}

#[test]
fn test_array_literal() {
    let expr = parse("[1, 2]");
    let Code::Array(items) = expr.code else {
        panic!("expected an array");
    };
    assert_eq!(items.len(), 2);

    assert_eq!(parse("[]").code, Code::Array(Vec::new()));
}

#[test]
fn test_array_trailing_comma_is_tolerated() {
    let expr = parse("[1,]");
    let Code::Array(items) = expr.code else {
        panic!("expected an array");
    };
    assert_eq!(items.len(), 1);
}

#[test]
fn test_array_spread_partitions_into_merge() {
    let expr = parse("[1, ...x, 2]");
    let Code::Merge(parts) = expr.code else {
        panic!("expected a merge");
    };
    assert_eq!(parts.len(), 3);
    assert!(matches!(parts[0].code, Code::Array(_)));
    assert_eq!(parts[1].code, Code::Scope("x".to_string()));
    assert!(matches!(parts[2].code, Code::Array(_)));
}

#[test]
fn test_single_spread_collapses_to_operand() {
    let expr = parse("[...x]");
    assert_eq!(expr.code, Code::Scope("x".to_string()));
}

#[test]
fn test_object_literal_getter_of_literal_is_plain() {
    let expr = parse("{ a: 1 }");
    let Code::Object(properties) = expr.code else {
        panic!("expected an object");
    };
    assert_eq!(properties.len(), 1);
    assert_eq!(properties[0].0, "a");
    assert_eq!(properties[0].1.code, Code::Literal(Value::Integer(1)));
}

#[test]
fn test_object_computed_property_stays_getter() {
    let expr = parse("{ a: b }");
    let Code::Object(properties) = expr.code else {
        panic!("expected an object");
    };
    let Code::Getter(inner) = &properties[0].1.code else {
        panic!("expected a getter, got {}", properties[0].1.op_name());
    };
    assert_eq!(inner.code, Code::Scope("b".to_string()));
}

#[test]
fn test_object_shorthand_inherits() {
    let expr = parse("{ a }");
    let Code::Object(properties) = expr.code else {
        panic!("expected an object");
    };
    let Code::Getter(inner) = &properties[0].1.code else {
        panic!("expected a getter");
    };
    assert_eq!(inner.code, Code::Inherited("a".to_string()));
}

#[test]
fn test_object_spread_of_literal_object_inlines() {
    let expr = parse("{ ...{ a: 1 }, b: 2 }");
    let Code::Object(properties) = expr.code else {
        panic!("expected a single object");
    };
    let keys: Vec<_> = properties.iter().map(|(key, _)| key.clone()).collect();
    assert_eq!(keys, vec!["a".to_string(), "b".to_string()]);
}

#[test]
fn test_object_spread_of_tree_remains_merge() {
    let expr = parse("{ a: 1, ...more }");
    let Code::Merge(parts) = expr.code else {
        panic!("expected a merge");
    };
    assert_eq!(parts.len(), 2);
    assert!(matches!(parts[0].code, Code::Object(_)));
    assert_eq!(parts[1].code, Code::Scope("more".to_string()));
}

#[test]
fn test_self_reference_rewritten_to_inherited() {
    let expr = parse("{ foo: foo + 1 }");
    let Code::Object(properties) = expr.code else {
        panic!("expected an object");
    };
    let Code::Getter(inner) = &properties[0].1.code else {
        panic!("expected a getter");
    };
    let Code::Binary { left, .. } = &inner.code else {
        panic!("expected a binary node");
    };
    assert_eq!(left.code, Code::Inherited("foo".to_string()));
}

#[test]
fn test_lambda_redeclaring_key_is_not_rewritten() {
    let expr = parse("{ foo: (foo) => foo }");
    let Code::Object(properties) = expr.code else {
        panic!("expected an object");
    };
    let Code::Getter(inner) = &properties[0].1.code else {
        panic!("expected a getter");
    };
    let Code::Lambda { body, .. } = &inner.code else {
        panic!("expected a lambda");
    };
    assert_eq!(body.code, Code::Scope("foo".to_string()));
}

#[test]
fn test_lambda() {
    let expr = parse("(a, b) => a");
    let Code::Lambda { params, body } = expr.code else {
        panic!("expected a lambda");
    };
    assert_eq!(params, vec!["a".to_string(), "b".to_string()]);
    assert_eq!(body.code, Code::Scope("a".to_string()));
}

#[test]
fn test_untagged_template_is_concat() {
    let expr = parse("`a ${x} b`");
    let Code::Concat(items) = expr.code else {
        panic!("expected a concat");
    };
    assert_eq!(items.len(), 3);
    assert_eq!(items[0].code, Code::Literal(Value::String("a ".to_string())));
    assert_eq!(items[1].code, Code::Scope("x".to_string()));
    assert_eq!(items[2].code, Code::Literal(Value::String(" b".to_string())));
}

#[test]
fn test_tagged_template_upgrades_target() {
    let expr = parse("t`x ${y}`");
    let Code::Template {
        target,
        strings,
        values,
    } = expr.code
    else {
        panic!("expected a template");
    };
    assert_eq!(target.code, Code::Builtin("t".to_string()));
    assert_eq!(strings, vec!["x ".to_string(), String::new()]);
    assert_eq!(values.len(), 1);
}

#[test]
fn test_dangling_argument_separator_is_rejected() {
    assert!(Parser::default().parse("f(1,)").is_err());
}

#[test]
fn test_spread_without_value_is_hard_error() {
    assert!(Parser::default().parse("[...]").is_err());
}

#[test]
fn test_unterminated_constructs() {
    assert!(Parser::default().parse("f(1").is_err());
    assert!(Parser::default().parse("[1").is_err());
    assert!(Parser::default().parse("`open").is_err());
}

#[test]
fn test_lazy_target_defers_non_literal_arguments() {
    let mut options = ParserOptions::default();
    options.lazy_targets.insert("if".to_string());
    let parser = Parser::new(options);
    let expr = parser.parse("if(flag, 1, other)").unwrap();
    let Code::Call { args, .. } = expr.code else {
        panic!("expected a call");
    };
    // Non-literal arguments become zero-parameter closures; literals are
    // passed as-is.
    assert!(matches!(&args[0].code, Code::Lambda { params, .. } if params.is_empty()));
    assert_eq!(args[1].code, Code::Literal(Value::Integer(1)));
    assert!(matches!(&args[2].code, Code::Lambda { params, .. } if params.is_empty()));
}

#[test]
fn test_division_requires_spacing_unlike_paths() {
    let divide = parse("a / b");
    assert!(matches!(
        divide.code,
        Code::Binary {
            op: BinaryOp::Division,
            ..
        }
    ));

    let path = parse("a/b");
    assert!(matches!(path.code, Code::Traverse { .. }));
}
