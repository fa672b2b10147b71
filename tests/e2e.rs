use iota_jexl as jexl;
use jexl::{Attribute, JexlParser, ResolvedAttribute, TransformEntry};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use std::collections::BTreeMap;

#[test]
fn test_float_measure() {
    let ctx = jexl::extract_context(&[Attribute::measure("temp", "23.5")]);
    assert_eq!(ctx.get("temp"), Some(&json!(23.5)));
    assert!(ctx.get("temp").unwrap().is_f64());
}

#[test]
fn test_boolean_measure() {
    let ctx = jexl::extract_context(&[Attribute::measure("on", "true")]);
    assert_eq!(ctx.get("on"), Some(&json!(true)));
}

#[test]
fn test_integer_measure() {
    let ctx = jexl::extract_context(&[Attribute::measure("count", "5")]);
    assert_eq!(ctx.get("count"), Some(&json!(5)));
    assert!(ctx.get("count").unwrap().is_i64());
}

#[test]
fn test_string_formatting_expression() {
    let parser = JexlParser::new();
    let ctx = jexl::extract_context(&[Attribute::measure("temp", "23.5")]);
    let resolved = parser
        .process_expression_attributes(
            &Value::Null,
            &[Attribute::expression("label", "Text", "temp + '°C'")],
            &ctx,
        )
        .unwrap();
    assert_eq!(
        resolved,
        vec![ResolvedAttribute {
            name: "label".into(),
            attr_type: "Text".into(),
            alternate_id: None,
            value: json!("23.5°C"),
        }]
    );
}

#[test]
fn test_builtin_transform_shadows_caller() {
    let mut parser = JexlParser::new();
    let mut caller = BTreeMap::new();
    caller.insert(
        "touppercase".to_string(),
        TransformEntry::function(jexl::functions::from_fn(|args: &[Value]| {
            Ok(json!(format!("custom:{}", args[0])))
        })),
    );
    parser.set_transforms(caller).unwrap();
    let ctx = jexl::extract_context(&[Attribute::measure("state", "open")]);
    assert_eq!(parser.parse("state|touppercase", &ctx).unwrap(), json!("OPEN"));
}

#[test]
fn test_wire_format_round_trip_through_cli_shapes() {
    let measures: Vec<Attribute> = serde_json::from_value(json!([
        {"name": "t", "type": "Number", "value": "21"},
        {"name": "p", "object_id": "pr", "type": "Number", "value": "1013.25"}
    ]))
    .unwrap();
    let attributes: Vec<Attribute> = serde_json::from_value(json!([
        {"name": "summary", "type": "Text", "expression": "t + '/' + pr"},
        {"name": "pressure", "object_id": "pk", "type": "Number", "expression": "(p / 10)|round"}
    ]))
    .unwrap();
    let ctx = jexl::extract_context(&measures);
    let resolved = JexlParser::new()
        .process_expression_attributes(&json!({"service": "smart"}), &attributes, &ctx)
        .unwrap();
    assert_eq!(
        serde_json::to_value(resolved).unwrap(),
        json!([
            {"name": "summary", "type": "Text", "value": "21/1013.25"},
            {"name": "pressure", "type": "Number", "object_id": "pk", "value": 101}
        ])
    );
}

#[test]
fn test_convenience_eval() {
    let ctx = jexl::extract_context(&[Attribute::measure("a", "2"), Attribute::measure("b", "0.5")]);
    assert_eq!(jexl::eval("a * b", &ctx).unwrap(), json!(1));
    assert_eq!(jexl::eval("a > b ? 'up' : 'down'", &ctx).unwrap(), json!("up"));
}
