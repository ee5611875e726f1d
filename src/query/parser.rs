//! Recursive-descent query parser.
//!
//! # Grammar
//!
//! ```text
//! query      := IDENTIFIER select? where? orderBy? limit? offset?
//! select     := SELECT IDENTIFIER (COMMA IDENTIFIER)*
//! where      := WHERE orExpr
//! orExpr     := andExpr (OR andExpr)*
//! andExpr    := condition (AND condition)*
//! condition  := LPAREN orExpr RPAREN
//!             | NOT condition
//!             | IDENTIFIER ( IN list | NOT IN list | LIKE value
//!                          | BETWEEN value AND value | OPERATOR value )
//! list       := LPAREN value (COMMA value)* RPAREN
//! value      := STRING | NUMBER | IDENTIFIER
//! ```
//!
//! Clauses must appear in this order; anything left over after the last
//! clause is rejected.

use std::sync::OnceLock;

use regex::Regex;

use super::ast::*;
use super::tokens::{tokenize, Token, TokenKind};
use crate::error::{AtonError, AtonResult};
use crate::value::{Number, Value};

/// Parse a query string, optionally wrapped in `@query[...]`.
pub fn parse(input: &str) -> AtonResult<ParsedQuery> {
    let body = unwrap_query_marker(input);
    let tokens = tokenize(body)?;
    Parser::new(&tokens).parse_query()
}

/// Extract the body of a `@query[...]` marker, or return the input as is.
pub fn unwrap_query_marker(input: &str) -> &str {
    static MARKER: OnceLock<Option<Regex>> = OnceLock::new();
    let marker = MARKER.get_or_init(|| Regex::new(r"(?is)@query\[(.*)\]").ok());

    marker
        .as_ref()
        .and_then(|re| re.captures(input))
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
        .unwrap_or(input)
}

/// Cursor over an immutable token list.
pub struct Parser<'a> {
    tokens: &'a [Token],
    pos: usize,
}

impl<'a> Parser<'a> {
    pub fn new(tokens: &'a [Token]) -> Self {
        Self { tokens, pos: 0 }
    }

    /// Parse the full token stream into a query.
    pub fn parse_query(mut self) -> AtonResult<ParsedQuery> {
        let table = self.consume(TokenKind::Identifier)?.lexeme.clone();

        let select_fields = if self.peek(TokenKind::Select) {
            Some(self.parse_select()?)
        } else {
            None
        };

        let where_expression = if self.peek(TokenKind::Where) {
            self.consume(TokenKind::Where)?;
            Some(QueryExpression::from(self.parse_or()?))
        } else {
            None
        };

        let (order_by, order_direction) = if self.peek(TokenKind::OrderBy) {
            let (field, dir) = self.parse_order_by()?;
            (Some(field), dir)
        } else {
            (None, SortOrder::Asc)
        };

        let limit = if self.peek(TokenKind::Limit) {
            self.consume(TokenKind::Limit)?;
            Some(self.parse_count("LIMIT")?)
        } else {
            None
        };

        let offset = if self.peek(TokenKind::Offset) {
            self.consume(TokenKind::Offset)?;
            self.parse_count("OFFSET")?
        } else {
            0
        };

        if let Some(token) = self.current() {
            return Err(AtonError::query_at(
                token.position,
                format!("unexpected {} '{}'", token.kind, token.lexeme),
            ));
        }

        Ok(ParsedQuery {
            table,
            select_fields,
            where_expression,
            order_by,
            order_direction,
            limit,
            offset,
        })
    }

    fn current(&self) -> Option<&'a Token> {
        self.tokens.get(self.pos)
    }

    fn peek(&self, kind: TokenKind) -> bool {
        self.current().is_some_and(|t| t.kind == kind)
    }

    fn peek_at(&self, offset: usize, kind: TokenKind) -> bool {
        self.tokens
            .get(self.pos + offset)
            .is_some_and(|t| t.kind == kind)
    }

    /// Consume a token of the expected kind or fail naming what was found.
    fn consume(&mut self, kind: TokenKind) -> AtonResult<&'a Token> {
        match self.current() {
            Some(token) if token.kind == kind => {
                self.pos += 1;
                Ok(token)
            }
            Some(token) => Err(AtonError::query_at(
                token.position,
                format!("expected {}, got {} '{}'", kind, token.kind, token.lexeme),
            )),
            None => Err(AtonError::query(format!("expected {}, got end of input", kind))),
        }
    }

    fn parse_select(&mut self) -> AtonResult<Vec<String>> {
        self.consume(TokenKind::Select)?;
        let mut fields = vec![self.consume(TokenKind::Identifier)?.lexeme.clone()];
        while self.peek(TokenKind::Comma) {
            self.consume(TokenKind::Comma)?;
            fields.push(self.consume(TokenKind::Identifier)?.lexeme.clone());
        }
        Ok(fields)
    }

    /// `andExpr (OR andExpr)*`, flattened into one OR node.
    fn parse_or(&mut self) -> AtonResult<QueryNode> {
        let first = self.parse_and()?;
        if !self.peek(TokenKind::Or) {
            return Ok(first);
        }

        let mut terms = vec![first];
        while self.peek(TokenKind::Or) {
            self.consume(TokenKind::Or)?;
            terms.push(self.parse_and()?);
        }
        Ok(QueryNode::Expression(QueryExpression::new(LogicalOp::Or, terms)))
    }

    /// `condition (AND condition)*`, flattened into one AND node.
    fn parse_and(&mut self) -> AtonResult<QueryNode> {
        let first = self.parse_condition()?;
        if !self.peek(TokenKind::And) {
            return Ok(first);
        }

        let mut terms = vec![first];
        while self.peek(TokenKind::And) {
            self.consume(TokenKind::And)?;
            terms.push(self.parse_condition()?);
        }
        Ok(QueryNode::Expression(QueryExpression::new(LogicalOp::And, terms)))
    }

    fn parse_condition(&mut self) -> AtonResult<QueryNode> {
        if self.peek(TokenKind::LParen) {
            self.consume(TokenKind::LParen)?;
            let inner = self.parse_or()?;
            self.consume(TokenKind::RParen)?;
            return Ok(inner);
        }

        if self.peek(TokenKind::Not) {
            self.consume(TokenKind::Not)?;
            let inner = self.parse_condition()?;
            return Ok(QueryNode::Expression(QueryExpression::new(
                LogicalOp::Not,
                vec![inner],
            )));
        }

        let field = self.consume(TokenKind::Identifier)?.lexeme.clone();

        let (operator, value, value2) = if self.peek(TokenKind::In) {
            self.consume(TokenKind::In)?;
            (QueryOperator::In, self.parse_list()?, None)
        } else if self.peek(TokenKind::Not) && self.peek_at(1, TokenKind::In) {
            self.consume(TokenKind::Not)?;
            self.consume(TokenKind::In)?;
            (QueryOperator::NotIn, self.parse_list()?, None)
        } else if self.peek(TokenKind::Like) {
            self.consume(TokenKind::Like)?;
            (QueryOperator::Like, self.parse_value()?, None)
        } else if self.peek(TokenKind::Between) {
            self.consume(TokenKind::Between)?;
            let low = self.parse_value()?;
            self.consume(TokenKind::And)?;
            let high = self.parse_value()?;
            (QueryOperator::Between, low, Some(high))
        } else {
            let token = self.consume(TokenKind::Operator)?;
            let operator = QueryOperator::from_symbol(&token.lexeme).ok_or_else(|| {
                AtonError::query_at(token.position, format!("unknown operator '{}'", token.lexeme))
            })?;
            (operator, self.parse_value()?, None)
        };

        Ok(QueryNode::Condition(QueryCondition {
            field,
            operator,
            value,
            value2,
        }))
    }

    fn parse_list(&mut self) -> AtonResult<Value> {
        self.consume(TokenKind::LParen)?;
        let mut values = vec![self.parse_value()?];
        while self.peek(TokenKind::Comma) {
            self.consume(TokenKind::Comma)?;
            values.push(self.parse_value()?);
        }
        self.consume(TokenKind::RParen)?;
        Ok(Value::Array(values))
    }

    /// STRING, NUMBER, or IDENTIFIER (TRUE/FALSE/NULL, otherwise a bare string).
    fn parse_value(&mut self) -> AtonResult<Value> {
        let Some(token) = self.current() else {
            return Err(AtonError::query("expected value, got end of input"));
        };

        let value = match token.kind {
            TokenKind::String => {
                let lexeme = &token.lexeme;
                Value::String(lexeme[1..lexeme.len() - 1].to_string())
            }
            TokenKind::Number => parse_number(token)?,
            TokenKind::Identifier => match token.lexeme.to_ascii_uppercase().as_str() {
                "TRUE" => Value::Bool(true),
                "FALSE" => Value::Bool(false),
                "NULL" => Value::Null,
                _ => Value::String(token.lexeme.clone()),
            },
            _ => {
                return Err(AtonError::query_at(
                    token.position,
                    format!("expected value, got {} '{}'", token.kind, token.lexeme),
                ));
            }
        };

        self.pos += 1;
        Ok(value)
    }

    fn parse_order_by(&mut self) -> AtonResult<(String, SortOrder)> {
        self.consume(TokenKind::OrderBy)?;
        let field = self.consume(TokenKind::Identifier)?.lexeme.clone();

        let direction = if self.peek(TokenKind::Asc) {
            self.consume(TokenKind::Asc)?;
            SortOrder::Asc
        } else if self.peek(TokenKind::Desc) {
            self.consume(TokenKind::Desc)?;
            SortOrder::Desc
        } else {
            SortOrder::Asc
        };

        Ok((field, direction))
    }

    /// A non-negative integer for LIMIT/OFFSET.
    fn parse_count(&mut self, clause: &str) -> AtonResult<usize> {
        let token = self.consume(TokenKind::Number)?;
        token.lexeme.parse::<usize>().map_err(|_| {
            AtonError::query_at(
                token.position,
                format!("{} expects a non-negative integer, got '{}'", clause, token.lexeme),
            )
        })
    }
}

fn parse_number(token: &Token) -> AtonResult<Value> {
    let text = token.lexeme.as_str();
    let invalid = || AtonError::query_at(token.position, format!("invalid number '{}'", text));

    if text.contains('.') {
        let f: f64 = text.parse().map_err(|_| invalid())?;
        Number::from_f64(f).map(Value::Number).ok_or_else(invalid)
    } else {
        text.parse::<i64>()
            .map(Value::from)
            .or_else(|_| text.parse::<u64>().map(Value::from))
            .map_err(|_| invalid())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn cond(field: &str, operator: QueryOperator, value: Value) -> QueryNode {
        QueryNode::Condition(QueryCondition {
            field: field.to_string(),
            operator,
            value,
            value2: None,
        })
    }

    #[test]
    fn test_simple_table() {
        let q = parse("products").unwrap();
        assert_eq!(q.table, "products");
        assert_eq!(q.select_fields, None);
        assert_eq!(q.where_expression, None);
        assert_eq!(q.order_direction, SortOrder::Asc);
        assert_eq!(q.offset, 0);
    }

    #[test]
    fn test_where_equality_wrapped_in_and() {
        let q = parse("products WHERE name = 'Laptop'").unwrap();
        let expr = q.where_expression.unwrap();
        assert_eq!(expr.operator, LogicalOp::And);
        assert_eq!(
            expr.conditions,
            vec![cond("name", QueryOperator::Eq, json!("Laptop"))]
        );
    }

    #[test]
    fn test_and_or_precedence() {
        let q = parse("t WHERE a = 1 OR b = 2 AND c = 3").unwrap();
        let expr = q.where_expression.unwrap();
        assert_eq!(expr.operator, LogicalOp::Or);
        assert_eq!(expr.conditions.len(), 2);
        assert_eq!(expr.conditions[0], cond("a", QueryOperator::Eq, json!(1)));
        match &expr.conditions[1] {
            QueryNode::Expression(inner) => {
                assert_eq!(inner.operator, LogicalOp::And);
                assert_eq!(inner.conditions.len(), 2);
            }
            other => panic!("expected AND node, got {:?}", other),
        }
    }

    #[test]
    fn test_flattened_chain() {
        let q = parse("t WHERE a = 1 AND b = 2 AND c = 3").unwrap();
        let expr = q.where_expression.unwrap();
        assert_eq!(expr.operator, LogicalOp::And);
        assert_eq!(expr.conditions.len(), 3);
    }

    #[test]
    fn test_parentheses_override() {
        let q = parse("products WHERE (price > 100 AND stock > 0) OR category = 'Featured'")
            .unwrap();
        let expr = q.where_expression.unwrap();
        assert_eq!(expr.operator, LogicalOp::Or);
        assert!(matches!(&expr.conditions[0], QueryNode::Expression(e) if e.operator == LogicalOp::And));
    }

    #[test]
    fn test_not_applies_to_next_condition() {
        let q = parse("t WHERE NOT a = 1 AND b = 2").unwrap();
        let expr = q.where_expression.unwrap();
        assert_eq!(expr.operator, LogicalOp::And);
        assert!(matches!(&expr.conditions[0], QueryNode::Expression(e) if e.operator == LogicalOp::Not));
        assert_eq!(expr.conditions[1], cond("b", QueryOperator::Eq, json!(2)));
    }

    #[test]
    fn test_special_conditions() {
        let q = parse("t WHERE c IN ('A', 'B', 3) AND n LIKE '%Lap%' AND p BETWEEN 50 AND 300.5")
            .unwrap();
        let expr = q.where_expression.unwrap();
        assert_eq!(
            expr.conditions[0],
            cond("c", QueryOperator::In, json!(["A", "B", 3]))
        );
        assert_eq!(
            expr.conditions[1],
            cond("n", QueryOperator::Like, json!("%Lap%"))
        );
        assert_eq!(
            expr.conditions[2],
            QueryNode::Condition(QueryCondition {
                field: "p".into(),
                operator: QueryOperator::Between,
                value: json!(50),
                value2: Some(json!(300.5)),
            })
        );
    }

    #[test]
    fn test_not_in() {
        let q = parse("t WHERE c NOT IN ('x')").unwrap();
        let expr = q.where_expression.unwrap();
        assert_eq!(expr.conditions[0], cond("c", QueryOperator::NotIn, json!(["x"])));
    }

    #[test]
    fn test_identifier_literals() {
        let q = parse("t WHERE a = true OR b = NULL OR c = False OR d = pending").unwrap();
        let expr = q.where_expression.unwrap();
        assert_eq!(expr.conditions[0], cond("a", QueryOperator::Eq, json!(true)));
        assert_eq!(expr.conditions[1], cond("b", QueryOperator::Eq, Value::Null));
        assert_eq!(expr.conditions[2], cond("c", QueryOperator::Eq, json!(false)));
        assert_eq!(expr.conditions[3], cond("d", QueryOperator::Eq, json!("pending")));
    }

    #[test]
    fn test_not_equal_spellings() {
        let a = parse("t WHERE a <> 1").unwrap();
        let b = parse("t WHERE a != 1").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_all_clauses() {
        let q = parse("products SELECT id, name WHERE price > 5 ORDER BY name DESC LIMIT 10 OFFSET 20")
            .unwrap();
        assert_eq!(q.select_fields, Some(vec!["id".to_string(), "name".to_string()]));
        assert_eq!(q.order_by.as_deref(), Some("name"));
        assert_eq!(q.order_direction, SortOrder::Desc);
        assert_eq!(q.limit, Some(10));
        assert_eq!(q.offset, 20);
    }

    #[test]
    fn test_query_marker() {
        let q = parse("@query[products WHERE id = 1]").unwrap();
        assert_eq!(q.table, "products");
        assert_eq!(unwrap_query_marker("plain"), "plain");
    }

    #[test]
    fn test_missing_table() {
        let err = parse("WHERE a = 1").unwrap_err();
        assert!(err.to_string().contains("expected IDENTIFIER, got WHERE"));
        assert!(parse("").is_err());
    }

    #[test]
    fn test_out_of_order_clause_rejected() {
        let err = parse("products LIMIT 5 WHERE price > 1").unwrap_err();
        assert!(err.is_query());
        assert!(err.to_string().contains("unexpected WHERE"));
    }

    #[test]
    fn test_trailing_tokens_rejected() {
        assert!(parse("products WHERE a = 1 b").is_err());
        assert!(parse("products FROM x").is_err());
    }

    #[test]
    fn test_bad_counts() {
        assert!(parse("t LIMIT -1").is_err());
        assert!(parse("t LIMIT 2.5").is_err());
        assert!(parse("t OFFSET").is_err());
    }

    #[test]
    fn test_unclosed_paren() {
        let err = parse("t WHERE (a = 1").unwrap_err();
        assert!(err.to_string().contains("expected RPAREN, got end of input"));
    }

    #[test]
    fn test_display_round_trip() {
        let text = "products SELECT id WHERE (a = 1 OR b IN ('x', 'y')) AND NOT c LIKE '%z' ORDER BY id DESC LIMIT 3 OFFSET 1";
        let q = parse(text).unwrap();
        let again = parse(&q.to_string()).unwrap();
        assert_eq!(q, again);
    }
}
