//! Query tokenizer.
//!
//! Each step tries the keyword patterns first, then identifiers, numbers,
//! strings, operators and punctuation, in that fixed order. Whitespace is
//! skipped between tokens.

use std::fmt;

use nom::{
    branch::alt,
    bytes::complete::{tag, tag_no_case, take_while},
    character::complete::{char, digit0, digit1, multispace0, multispace1, satisfy},
    combinator::{not, opt, recognize, value},
    sequence::{delimited, pair, terminated, tuple},
    IResult,
};

use crate::error::{AtonError, AtonResult};

/// Token kinds, keywords first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Select,
    From,
    Where,
    OrderBy,
    Limit,
    Offset,
    And,
    Or,
    Not,
    In,
    Like,
    Between,
    Asc,
    Desc,
    Identifier,
    Number,
    String,
    Operator,
    Comma,
    LParen,
    RParen,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TokenKind::Select => "SELECT",
            TokenKind::From => "FROM",
            TokenKind::Where => "WHERE",
            TokenKind::OrderBy => "ORDER BY",
            TokenKind::Limit => "LIMIT",
            TokenKind::Offset => "OFFSET",
            TokenKind::And => "AND",
            TokenKind::Or => "OR",
            TokenKind::Not => "NOT",
            TokenKind::In => "IN",
            TokenKind::Like => "LIKE",
            TokenKind::Between => "BETWEEN",
            TokenKind::Asc => "ASC",
            TokenKind::Desc => "DESC",
            TokenKind::Identifier => "IDENTIFIER",
            TokenKind::Number => "NUMBER",
            TokenKind::String => "STRING",
            TokenKind::Operator => "OPERATOR",
            TokenKind::Comma => "COMMA",
            TokenKind::LParen => "LPAREN",
            TokenKind::RParen => "RPAREN",
        };
        f.write_str(name)
    }
}

/// A lexed token. `position` is the character offset of its first char.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub lexeme: String,
    pub position: usize,
}

/// Split a query clause into tokens.
pub fn tokenize(query: &str) -> AtonResult<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut rest = query;

    loop {
        let (after_ws, _) = skip_ws(rest);
        rest = after_ws;
        if rest.is_empty() {
            break;
        }

        let offset = query.len() - rest.len();
        let position = query[..offset].chars().count();

        match parse_token(rest) {
            Ok((remaining, kind)) => {
                let lexeme = &rest[..rest.len() - remaining.len()];
                tokens.push(Token {
                    kind,
                    lexeme: lexeme.to_string(),
                    position,
                });
                rest = remaining;
            }
            Err(_) => {
                let bad = rest.chars().next().unwrap_or_default();
                return Err(AtonError::query_at(
                    position,
                    format!("invalid character '{}'", bad),
                ));
            }
        }
    }

    Ok(tokens)
}

fn skip_ws(input: &str) -> (&str, &str) {
    match multispace0::<_, nom::error::Error<&str>>(input) {
        Ok(res) => res,
        Err(_) => (input, ""),
    }
}

fn is_word_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// A keyword must not run into further word characters (`SELECTED` is an identifier).
fn keyword<'a>(
    word: &'static str,
    kind: TokenKind,
) -> impl FnMut(&'a str) -> IResult<&'a str, TokenKind> {
    value(kind, terminated(tag_no_case(word), not(satisfy(is_word_char))))
}

fn parse_order_by(input: &str) -> IResult<&str, TokenKind> {
    value(
        TokenKind::OrderBy,
        terminated(
            tuple((tag_no_case("ORDER"), multispace1, tag_no_case("BY"))),
            not(satisfy(is_word_char)),
        ),
    )(input)
}

fn parse_keyword(input: &str) -> IResult<&str, TokenKind> {
    alt((
        keyword("SELECT", TokenKind::Select),
        keyword("FROM", TokenKind::From),
        keyword("WHERE", TokenKind::Where),
        parse_order_by,
        keyword("LIMIT", TokenKind::Limit),
        keyword("OFFSET", TokenKind::Offset),
        keyword("AND", TokenKind::And),
        keyword("OR", TokenKind::Or),
        keyword("NOT", TokenKind::Not),
        keyword("IN", TokenKind::In),
        keyword("LIKE", TokenKind::Like),
        keyword("BETWEEN", TokenKind::Between),
        keyword("ASC", TokenKind::Asc),
        keyword("DESC", TokenKind::Desc),
    ))(input)
}

fn parse_identifier(input: &str) -> IResult<&str, &str> {
    recognize(pair(
        satisfy(|c: char| c.is_ascii_alphabetic() || c == '_'),
        take_while(is_word_char),
    ))(input)
}

/// `-?\d+\.?\d*`
fn parse_number(input: &str) -> IResult<&str, &str> {
    recognize(tuple((opt(char('-')), digit1, opt(char('.')), digit0)))(input)
}

fn parse_string(input: &str) -> IResult<&str, &str> {
    recognize(alt((
        delimited(char('\''), take_while(|c| c != '\''), char('\'')),
        delimited(char('"'), take_while(|c| c != '"'), char('"')),
    )))(input)
}

fn parse_operator(input: &str) -> IResult<&str, &str> {
    alt((
        tag("<="),
        tag(">="),
        tag("!="),
        tag("<>"),
        tag("="),
        tag("<"),
        tag(">"),
    ))(input)
}

fn parse_token(input: &str) -> IResult<&str, TokenKind> {
    alt((
        parse_keyword,
        value(TokenKind::Identifier, parse_identifier),
        value(TokenKind::Number, parse_number),
        value(TokenKind::String, parse_string),
        value(TokenKind::Operator, parse_operator),
        value(TokenKind::Comma, char(',')),
        value(TokenKind::LParen, char('(')),
        value(TokenKind::RParen, char(')')),
    ))(input)
}
