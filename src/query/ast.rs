//! Query AST.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::value::Value;

/// Sort direction for query results.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

impl fmt::Display for SortOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SortOrder::Asc => write!(f, "ASC"),
            SortOrder::Desc => write!(f, "DESC"),
        }
    }
}

/// Logical operators for combining conditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogicalOp {
    And,
    Or,
    Not,
}

impl LogicalOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogicalOp::And => "AND",
            LogicalOp::Or => "OR",
            LogicalOp::Not => "NOT",
        }
    }
}

impl fmt::Display for LogicalOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Comparison operators for a single condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QueryOperator {
    /// `=`
    Eq,
    /// `!=` or `<>`
    Ne,
    /// `<`
    Lt,
    /// `>`
    Gt,
    /// `<=`
    Lte,
    /// `>=`
    Gte,
    /// SQL wildcard match, case-insensitive search
    Like,
    In,
    NotIn,
    /// Inclusive range, uses `value2` as the upper bound
    Between,
}

impl QueryOperator {
    /// Map an `OPERATOR` token lexeme to its operator.
    pub fn from_symbol(symbol: &str) -> Option<Self> {
        match symbol {
            "=" => Some(QueryOperator::Eq),
            "!=" | "<>" => Some(QueryOperator::Ne),
            "<" => Some(QueryOperator::Lt),
            ">" => Some(QueryOperator::Gt),
            "<=" => Some(QueryOperator::Lte),
            ">=" => Some(QueryOperator::Gte),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            QueryOperator::Eq => "=",
            QueryOperator::Ne => "!=",
            QueryOperator::Lt => "<",
            QueryOperator::Gt => ">",
            QueryOperator::Lte => "<=",
            QueryOperator::Gte => ">=",
            QueryOperator::Like => "LIKE",
            QueryOperator::In => "IN",
            QueryOperator::NotIn => "NOT IN",
            QueryOperator::Between => "BETWEEN",
        }
    }
}

impl fmt::Display for QueryOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A leaf condition: `field <op> value [AND value2]`.
///
/// For `IN`/`NOT IN` the value is an array of the listed literals.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryCondition {
    pub field: String,
    pub operator: QueryOperator,
    pub value: Value,
    pub value2: Option<Value>,
}

/// A node of the WHERE tree.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryNode {
    Condition(QueryCondition),
    Expression(QueryExpression),
}

/// An AND/OR/NOT node. `NOT` always has exactly one operand.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryExpression {
    pub operator: LogicalOp,
    pub conditions: Vec<QueryNode>,
}

impl QueryExpression {
    pub fn new(operator: LogicalOp, conditions: Vec<QueryNode>) -> Self {
        Self {
            operator,
            conditions,
        }
    }
}

impl From<QueryNode> for QueryExpression {
    /// Bare conditions become a one-operand AND node.
    fn from(node: QueryNode) -> Self {
        match node {
            QueryNode::Expression(expr) => expr,
            cond @ QueryNode::Condition(_) => QueryExpression::new(LogicalOp::And, vec![cond]),
        }
    }
}

/// Parsed query structure.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ParsedQuery {
    pub table: String,
    pub select_fields: Option<Vec<String>>,
    pub where_expression: Option<QueryExpression>,
    pub order_by: Option<String>,
    pub order_direction: SortOrder,
    pub limit: Option<usize>,
    pub offset: usize,
}

fn fmt_literal(f: &mut fmt::Formatter<'_>, value: &Value) -> fmt::Result {
    match value {
        Value::String(s) => write!(f, "'{}'", s),
        Value::Null => write!(f, "NULL"),
        Value::Bool(true) => write!(f, "TRUE"),
        Value::Bool(false) => write!(f, "FALSE"),
        Value::Array(items) => {
            write!(f, "(")?;
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                fmt_literal(f, item)?;
            }
            write!(f, ")")
        }
        other => write!(f, "{}", other),
    }
}

impl fmt::Display for QueryCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} ", self.field, self.operator)?;
        fmt_literal(f, &self.value)?;
        if let Some(high) = &self.value2 {
            write!(f, " AND ")?;
            fmt_literal(f, high)?;
        }
        Ok(())
    }
}

impl fmt::Display for QueryNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryNode::Condition(cond) => write!(f, "{}", cond),
            QueryNode::Expression(expr) if expr.conditions.len() > 1 => write!(f, "({})", expr),
            QueryNode::Expression(expr) => write!(f, "{}", expr),
        }
    }
}

impl fmt::Display for QueryExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.operator == LogicalOp::Not {
            write!(f, "NOT ")?;
            return match self.conditions.first() {
                Some(inner) => write!(f, "{}", inner),
                None => Ok(()),
            };
        }
        let joiner = format!(" {} ", self.operator);
        for (i, node) in self.conditions.iter().enumerate() {
            if i > 0 {
                f.write_str(&joiner)?;
            }
            write!(f, "{}", node)?;
        }
        Ok(())
    }
}

impl fmt::Display for ParsedQuery {
    /// Renders the query back into the query language.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.table)?;
        if let Some(fields) = &self.select_fields {
            write!(f, " SELECT {}", fields.join(", "))?;
        }
        if let Some(expr) = &self.where_expression {
            write!(f, " WHERE {}", expr)?;
        }
        if let Some(field) = &self.order_by {
            write!(f, " ORDER BY {} {}", field, self.order_direction)?;
        }
        if let Some(n) = self.limit {
            write!(f, " LIMIT {}", n)?;
        }
        if self.offset > 0 {
            write!(f, " OFFSET {}", self.offset)?;
        }
        Ok(())
    }
}
