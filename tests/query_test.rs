use aton::prelude::*;
use aton::query::{execute, LogicalOp, QueryNode, QueryOperator, SortOrder};
use pretty_assertions::assert_eq;
use serde_json::json;

fn products() -> Document {
    let value = json!({
        "products": [
            {"id": 1, "name": "Laptop Pro", "price": 1299, "category": "Electronics"},
            {"id": 2, "name": "Wireless Mouse", "price": 29.99, "category": "Electronics"},
            {"id": 3, "name": "Keyboard", "price": 89, "category": "Electronics"},
            {"id": 4, "name": "Standing Desk", "price": 599, "category": "Furniture"},
            {"id": 5, "name": "Office Chair", "price": 299, "category": "Furniture"}
        ]
    });
    value.as_object().cloned().unwrap()
}

fn run(query: &str) -> Vec<i64> {
    let rows = QueryEngine::new().run(&products(), query).unwrap();
    rows.iter().map(|r| r["id"].as_i64().unwrap()).collect()
}

#[test]
fn test_literal_scenarios() {
    let two = json!({
        "products": [
            {"id": 1, "price": 1299, "category": "Electronics"},
            {"id": 5, "price": 299, "category": "Furniture"}
        ]
    });
    let two = two.as_object().unwrap();
    let engine = QueryEngine::new();

    let rows = engine
        .run(two, "products WHERE price > 500 AND category = 'Electronics'")
        .unwrap();
    assert_eq!(rows, vec![two["products"][0].as_object().cloned().unwrap()]);

    let rows = engine.run(two, "products WHERE price BETWEEN 50 AND 300").unwrap();
    assert_eq!(rows, vec![two["products"][1].as_object().cloned().unwrap()]);

    let rows = engine.run(two, "products ORDER BY price DESC LIMIT 1").unwrap();
    assert_eq!(rows[0]["price"], json!(1299));
    assert_eq!(rows.len(), 1);
}

#[test]
fn test_like() {
    assert_eq!(run("products WHERE name LIKE '%Mouse%'"), vec![2]);
    assert_eq!(run("products WHERE name LIKE '%mouse%'"), vec![2]);
    // unanchored: a pattern without wildcards still matches a substring
    assert_eq!(run("products WHERE name LIKE 'Mouse'"), vec![2]);
    assert!(run("products WHERE name LIKE '%Tablet%'").is_empty());
    assert_eq!(run("products WHERE name LIKE 'Key_oard'"), vec![3]);
}

#[test]
fn test_in_and_not_in() {
    assert_eq!(run("products WHERE id IN (1, 3, 9)"), vec![1, 3]);
    assert_eq!(run("products WHERE category NOT IN ('Electronics')"), vec![4, 5]);
}

#[test]
fn test_grouping_and_precedence() {
    // AND binds tighter than OR
    assert_eq!(
        run("products WHERE category = 'Furniture' OR price < 50 AND id = 2"),
        vec![2, 4, 5]
    );
    assert_eq!(
        run("products WHERE (category = 'Furniture' OR price < 50) AND id = 2"),
        vec![2]
    );
    assert_eq!(run("products WHERE NOT price >= 100"), vec![2, 3]);
}

#[test]
fn test_select_order_offset() {
    let rows = QueryEngine::new()
        .run(&products(), "products SELECT name, price ORDER BY price ASC LIMIT 2 OFFSET 1")
        .unwrap();
    assert_eq!(
        rows.iter().map(|r| r["name"].clone()).collect::<Vec<_>>(),
        vec![json!("Keyboard"), json!("Office Chair")]
    );
    assert!(rows.iter().all(|r| r.len() == 2));
}

#[test]
fn test_offset_and_limit_bounds() {
    assert!(run("products OFFSET 50").is_empty());
    assert_eq!(run("products LIMIT 100").len(), 5);
    assert!(run("products LIMIT 0").is_empty());
}

#[test]
fn test_unknown_table_is_query_error() {
    let err = QueryEngine::new().run(&products(), "orders").unwrap_err();
    assert!(err.is_query());
    assert!(err.to_string().contains("orders"));
}

#[test]
fn test_syntax_errors() {
    let engine = QueryEngine::new();
    for bad in [
        "",
        "products WHERE",
        "products WHERE price >",
        "products WHERE price $ 3",
        "products LIMIT 10 WHERE id = 1",
        "products WHERE id IN (1, 2",
        "products LIMIT -1",
    ] {
        let err = engine.parse(bad).unwrap_err();
        assert!(err.is_query(), "{bad:?} gave {err}");
    }
}

#[test]
fn test_parse_structure() {
    let q = aton::parse("@query[products SELECT id WHERE price > 10 OR NOT id = 3 ORDER BY id DESC]")
        .unwrap();
    assert_eq!(q.table, "products");
    assert_eq!(q.select_fields, Some(vec!["id".to_string()]));
    assert_eq!(q.order_by.as_deref(), Some("id"));
    assert_eq!(q.order_direction, SortOrder::Desc);

    let expr = q.where_expression.unwrap();
    assert_eq!(expr.operator, LogicalOp::Or);
    assert_eq!(expr.conditions.len(), 2);
    match &expr.conditions[0] {
        QueryNode::Condition(cond) => {
            assert_eq!(cond.field, "price");
            assert_eq!(cond.operator, QueryOperator::Gt);
            assert_eq!(cond.value, json!(10));
        }
        other => panic!("unexpected node {other:?}"),
    }
    match &expr.conditions[1] {
        QueryNode::Expression(not) => assert_eq!(not.operator, LogicalOp::Not),
        other => panic!("unexpected node {other:?}"),
    }
}

#[test]
fn test_query_over_decoded_document() {
    let text = aton::encode(&products()).unwrap();
    let decoded = aton::decode(&text).unwrap();
    let q = aton::parse("products WHERE category = 'Furniture' ORDER BY price").unwrap();
    let rows = execute(&decoded, &q).unwrap();
    let ids: Vec<i64> = rows.iter().map(|r| r["id"].as_i64().unwrap()).collect();
    assert_eq!(ids, vec![5, 4]);
}

#[test]
fn test_execute_is_pure() {
    let tables = products();
    let q = aton::parse("products WHERE price > 100 ORDER BY price DESC").unwrap();
    let first = execute(&tables, &q).unwrap();
    let second = execute(&tables, &q).unwrap();
    assert_eq!(first, second);
    assert_eq!(tables, products());
}
