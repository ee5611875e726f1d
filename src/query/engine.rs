//! Query execution against in-memory tables.
//!
//! Steps run in a fixed order: table lookup, WHERE, SELECT, ORDER BY,
//! OFFSET, LIMIT. The input document is never modified.

use std::cmp::Ordering;

use regex::{Regex, RegexBuilder};
use tracing::debug;

use super::ast::*;
use crate::error::{AtonError, AtonResult};
use crate::value::{compare_values, kind_name, values_equal, Document, Record, Value};

/// Run a parsed query against the tables of `tables`.
pub fn execute(tables: &Document, query: &ParsedQuery) -> AtonResult<Vec<Record>> {
    let records = table_records(tables, &query.table)?;

    let mut results: Vec<Record> = match &query.where_expression {
        Some(expr) => {
            let filter = Filter::compile(expr)?;
            let mut kept = Vec::new();
            for record in records {
                if filter.matches(record)? {
                    kept.push(record.clone());
                }
            }
            kept
        }
        None => records.into_iter().cloned().collect(),
    };

    if let Some(fields) = &query.select_fields {
        results = results
            .into_iter()
            .map(|record| project(&record, fields))
            .collect();
    }

    if let Some(field) = &query.order_by {
        sort_records(&mut results, field, query.order_direction)?;
    }

    let results: Vec<Record> = results
        .into_iter()
        .skip(query.offset)
        .take(query.limit.unwrap_or(usize::MAX))
        .collect();

    debug!(table = %query.table, rows = results.len(), "query executed");
    Ok(results)
}

/// Stateless front door for parsing and running queries.
#[derive(Debug, Clone, Copy, Default)]
pub struct QueryEngine;

impl QueryEngine {
    pub fn new() -> Self {
        Self
    }

    pub fn parse(&self, query: &str) -> AtonResult<ParsedQuery> {
        super::parser::parse(query)
    }

    pub fn execute(&self, tables: &Document, query: &ParsedQuery) -> AtonResult<Vec<Record>> {
        execute(tables, query)
    }

    /// Parse and execute in one step.
    pub fn run(&self, tables: &Document, query: &str) -> AtonResult<Vec<Record>> {
        self.execute(tables, &self.parse(query)?)
    }
}

fn table_records<'d>(tables: &'d Document, name: &str) -> AtonResult<Vec<&'d Record>> {
    let table = tables
        .get(name)
        .ok_or_else(|| AtonError::query(format!("Table '{}' not found", name)))?;

    let Value::Array(items) = table else {
        return Err(AtonError::query(format!(
            "Table '{}' is not a list of records",
            name
        )));
    };

    items
        .iter()
        .enumerate()
        .map(|(i, item)| match item {
            Value::Object(record) => Ok(record),
            other => Err(AtonError::query(format!(
                "Record {} in table '{}' is a {}, not a record",
                i,
                name,
                kind_name(other)
            ))),
        })
        .collect()
}

/// Keep only `fields`; missing fields become explicit nulls.
fn project(record: &Record, fields: &[String]) -> Record {
    fields
        .iter()
        .map(|field| {
            let value = record.get(field).cloned().unwrap_or(Value::Null);
            (field.clone(), value)
        })
        .collect()
}

/// Stable sort. A missing field sorts as `0`; null sorts before everything.
fn sort_records(records: &mut [Record], field: &str, direction: SortOrder) -> AtonResult<()> {
    let zero = Value::from(0);
    let mut failure: Option<AtonError> = None;

    records.sort_by(|a, b| {
        let left = a.get(field).unwrap_or(&zero);
        let right = b.get(field).unwrap_or(&zero);
        let ordering = match (left, right) {
            (Value::Null, Value::Null) => Ordering::Equal,
            (Value::Null, _) => Ordering::Less,
            (_, Value::Null) => Ordering::Greater,
            _ => match compare_values(left, right) {
                Some(ordering) => ordering,
                None => {
                    if failure.is_none() {
                        failure = Some(AtonError::query(format!(
                            "cannot order '{}' values of type {} and {}",
                            field,
                            kind_name(left),
                            kind_name(right)
                        )));
                    }
                    Ordering::Equal
                }
            },
        };
        match direction {
            SortOrder::Asc => ordering,
            SortOrder::Desc => ordering.reverse(),
        }
    });

    match failure {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

/// A WHERE tree ready for evaluation, with LIKE patterns compiled.
#[derive(Debug)]
pub enum Filter<'q> {
    All(Vec<Filter<'q>>),
    Any(Vec<Filter<'q>>),
    Not(Box<Filter<'q>>),
    Leaf(&'q QueryCondition, Option<Regex>),
}

impl<'q> Filter<'q> {
    pub fn compile(expr: &'q QueryExpression) -> AtonResult<Self> {
        let children = expr
            .conditions
            .iter()
            .map(Filter::compile_node)
            .collect::<AtonResult<Vec<_>>>()?;

        match expr.operator {
            LogicalOp::And => Ok(Filter::All(children)),
            LogicalOp::Or => Ok(Filter::Any(children)),
            LogicalOp::Not => {
                let inner = children
                    .into_iter()
                    .next()
                    .ok_or_else(|| AtonError::query("NOT without an operand"))?;
                Ok(Filter::Not(Box::new(inner)))
            }
        }
    }

    fn compile_node(node: &'q QueryNode) -> AtonResult<Self> {
        match node {
            QueryNode::Expression(expr) => Filter::compile(expr),
            QueryNode::Condition(cond) => {
                let pattern = match cond.operator {
                    QueryOperator::Like => Some(like_regex(&cond.value)?),
                    _ => None,
                };
                Ok(Filter::Leaf(cond, pattern))
            }
        }
    }

    /// Evaluate against one record. AND/OR short-circuit left to right.
    pub fn matches(&self, record: &Record) -> AtonResult<bool> {
        match self {
            Filter::All(children) => {
                for child in children {
                    if !child.matches(record)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            Filter::Any(children) => {
                for child in children {
                    if child.matches(record)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            Filter::Not(inner) => Ok(!inner.matches(record)?),
            Filter::Leaf(cond, pattern) => evaluate_condition(cond, pattern.as_ref(), record),
        }
    }
}

impl QueryExpression {
    /// Evaluate this expression against a single record.
    pub fn evaluate(&self, record: &Record) -> AtonResult<bool> {
        Filter::compile(self)?.matches(record)
    }
}

impl QueryCondition {
    /// Evaluate this condition against a single record.
    pub fn evaluate(&self, record: &Record) -> AtonResult<bool> {
        let pattern = match self.operator {
            QueryOperator::Like => Some(like_regex(&self.value)?),
            _ => None,
        };
        evaluate_condition(self, pattern.as_ref(), record)
    }
}

fn evaluate_condition(
    cond: &QueryCondition,
    pattern: Option<&Regex>,
    record: &Record,
) -> AtonResult<bool> {
    let Some(actual) = record.get(&cond.field) else {
        return Ok(false);
    };

    match cond.operator {
        QueryOperator::Eq => Ok(values_equal(actual, &cond.value)),
        QueryOperator::Ne => Ok(!values_equal(actual, &cond.value)),
        QueryOperator::Lt => ordered(cond, actual, &cond.value, |o| o == Ordering::Less),
        QueryOperator::Gt => ordered(cond, actual, &cond.value, |o| o == Ordering::Greater),
        QueryOperator::Lte => ordered(cond, actual, &cond.value, |o| o != Ordering::Greater),
        QueryOperator::Gte => ordered(cond, actual, &cond.value, |o| o != Ordering::Less),
        QueryOperator::Like => match (actual, pattern) {
            (Value::String(text), Some(re)) => Ok(re.is_match(text)),
            _ => Ok(false),
        },
        QueryOperator::In => Ok(candidates(&cond.value)
            .iter()
            .any(|candidate| values_equal(actual, candidate))),
        QueryOperator::NotIn => Ok(!candidates(&cond.value)
            .iter()
            .any(|candidate| values_equal(actual, candidate))),
        QueryOperator::Between => {
            if actual.is_null() {
                return Ok(false);
            }
            let high = cond.value2.as_ref().unwrap_or(&Value::Null);
            if !ordered(cond, &cond.value, actual, |o| o != Ordering::Greater)? {
                return Ok(false);
            }
            ordered(cond, actual, high, |o| o != Ordering::Greater)
        }
    }
}

/// Compare `left` to `right`; a null record value fails closed, any other
/// pair without an ordering is an error.
fn ordered(
    cond: &QueryCondition,
    left: &Value,
    right: &Value,
    accept: impl Fn(Ordering) -> bool,
) -> AtonResult<bool> {
    if left.is_null() {
        return Ok(false);
    }
    match compare_values(left, right) {
        Some(ordering) => Ok(accept(ordering)),
        None => Err(AtonError::query(format!(
            "cannot compare {} with {} in '{}'",
            kind_name(left),
            kind_name(right),
            cond
        ))),
    }
}

fn candidates(value: &Value) -> &[Value] {
    match value {
        Value::Array(items) => items,
        other => std::slice::from_ref(other),
    }
}

/// Translate a SQL LIKE pattern (`%`, `_`) into a case-insensitive regex.
pub fn like_regex(pattern: &Value) -> AtonResult<Regex> {
    let text = match pattern {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };

    let mut expr = String::with_capacity(text.len() * 2);
    for c in text.chars() {
        match c {
            '%' => expr.push_str(".*"),
            '_' => expr.push('.'),
            other => expr.push_str(&regex::escape(other.encode_utf8(&mut [0u8; 4]))),
        }
    }

    RegexBuilder::new(&expr)
        .case_insensitive(true)
        .build()
        .map_err(|e| AtonError::query(format!("invalid LIKE pattern '{}': {}", text, e)))
}
