//! Expression parser
//!
//! Precedence-climbing parser for the C-like expression syntax used in CFA
//! descriptions, automaton files and configuration (`initial_predicates`).

use thiserror::Error;

use super::expr::{BinaryOp, Expr, UnaryOp};

/// Expression parse error
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("at offset {offset}: {message}")]
pub struct ExprParseError {
    pub offset: usize,
    pub message: String,
}

impl ExprParseError {
    pub fn new(offset: usize, message: impl Into<String>) -> Self {
        Self {
            offset,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Int(i64),
    Ident(String),
    Op(&'static str),
    LParen,
    RParen,
    Comma,
}

const OPERATORS: [&str; 16] = [
    "==", "!=", "<=", ">=", "&&", "||", "<", ">", "+", "-", "*", "/", "%", "!", "=", "&",
];

fn tokenize(text: &str) -> Result<Vec<(usize, Token)>, ExprParseError> {
    let bytes = text.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        let c = bytes[i] as char;
        if c.is_ascii_whitespace() {
            i += 1;
            continue;
        }
        let start = i;

        if c.is_ascii_digit() {
            while i < bytes.len() && (bytes[i] as char).is_ascii_digit() {
                i += 1;
            }
            let value = text[start..i]
                .parse::<i64>()
                .map_err(|_| ExprParseError::new(start, "integer literal out of range"))?;
            tokens.push((start, Token::Int(value)));
            continue;
        }

        if c.is_ascii_alphabetic() || c == '_' {
            while i < bytes.len() {
                let d = bytes[i] as char;
                if d.is_ascii_alphanumeric() || d == '_' {
                    i += 1;
                } else if d == ':' && i + 1 < bytes.len() && bytes[i + 1] == b':' {
                    // qualified name `f::x`
                    i += 2;
                } else {
                    break;
                }
            }
            tokens.push((start, Token::Ident(text[start..i].to_string())));
            continue;
        }

        match c {
            '(' => {
                tokens.push((start, Token::LParen));
                i += 1;
                continue;
            }
            ')' => {
                tokens.push((start, Token::RParen));
                i += 1;
                continue;
            }
            ',' => {
                tokens.push((start, Token::Comma));
                i += 1;
                continue;
            }
            _ => {}
        }

        let rest = &text[i..];
        match OPERATORS.iter().find(|op| rest.starts_with(**op)) {
            Some(op) if *op == "=" || *op == "&" => {
                return Err(ExprParseError::new(
                    start,
                    format!("unexpected '{}' (assignments are edges, not expressions)", op),
                ));
            }
            Some(op) => {
                tokens.push((start, Token::Op(op)));
                i += op.len();
            }
            None => {
                return Err(ExprParseError::new(
                    start,
                    format!("unexpected character '{}'", c),
                ));
            }
        }
    }

    Ok(tokens)
}

fn binary_op(symbol: &str) -> Option<BinaryOp> {
    Some(match symbol {
        "+" => BinaryOp::Add,
        "-" => BinaryOp::Sub,
        "*" => BinaryOp::Mul,
        "/" => BinaryOp::Div,
        "%" => BinaryOp::Rem,
        "==" => BinaryOp::Eq,
        "!=" => BinaryOp::Ne,
        "<" => BinaryOp::Lt,
        "<=" => BinaryOp::Le,
        ">" => BinaryOp::Gt,
        ">=" => BinaryOp::Ge,
        "&&" => BinaryOp::And,
        "||" => BinaryOp::Or,
        _ => return None,
    })
}

/// Names that read a nondeterministic value when called with no arguments
fn is_nondet_function(name: &str) -> bool {
    name == "nondet" || name.starts_with("nondet_") || name.starts_with("__VERIFIER_nondet")
}

struct Parser {
    tokens: Vec<(usize, Token)>,
    pos: usize,
    end: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(_, t)| t)
    }

    fn offset(&self) -> usize {
        self.tokens.get(self.pos).map(|(o, _)| *o).unwrap_or(self.end)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).map(|(_, t)| t.clone());
        self.pos += 1;
        token
    }

    fn expect(&mut self, expected: Token) -> Result<(), ExprParseError> {
        let offset = self.offset();
        match self.next() {
            Some(t) if t == expected => Ok(()),
            Some(t) => Err(ExprParseError::new(
                offset,
                format!("expected {:?}, found {:?}", expected, t),
            )),
            None => Err(ExprParseError::new(
                offset,
                format!("expected {:?}, found end of input", expected),
            )),
        }
    }

    fn parse_binary(&mut self, min_prec: u8) -> Result<Expr, ExprParseError> {
        let mut lhs = self.parse_unary()?;

        loop {
            let op = match self.peek() {
                Some(Token::Op(symbol)) => match binary_op(symbol) {
                    Some(op) if op.precedence() >= min_prec => op,
                    _ => break,
                },
                _ => break,
            };
            self.pos += 1;
            let rhs = self.parse_binary(op.precedence() + 1)?;
            lhs = Expr::binary(op, lhs, rhs);
        }

        Ok(lhs)
    }

    fn parse_unary(&mut self) -> Result<Expr, ExprParseError> {
        match self.peek() {
            Some(Token::Op("-")) => {
                self.pos += 1;
                let operand = self.parse_unary()?;
                Ok(match operand {
                    Expr::Int(v) => Expr::Int(v.wrapping_neg()),
                    other => Expr::Unary(UnaryOp::Neg, Box::new(other)),
                })
            }
            Some(Token::Op("!")) => {
                self.pos += 1;
                Ok(Expr::Unary(UnaryOp::Not, Box::new(self.parse_unary()?)))
            }
            Some(Token::Op("*")) => {
                self.pos += 1;
                Ok(Expr::Deref(Box::new(self.parse_unary()?)))
            }
            _ => self.parse_primary(),
        }
    }

    fn parse_primary(&mut self) -> Result<Expr, ExprParseError> {
        let offset = self.offset();
        match self.next() {
            Some(Token::Int(v)) => Ok(Expr::Int(v)),
            Some(Token::Ident(name)) => {
                if self.peek() == Some(&Token::LParen) {
                    self.pos += 1;
                    self.expect(Token::RParen)?;
                    if is_nondet_function(&name) {
                        Ok(Expr::Nondet)
                    } else {
                        Err(ExprParseError::new(
                            offset,
                            format!("call to '{}' inside an expression (use a call edge)", name),
                        ))
                    }
                } else {
                    Ok(Expr::Var(name))
                }
            }
            Some(Token::LParen) => {
                let inner = self.parse_binary(1)?;
                self.expect(Token::RParen)?;
                Ok(inner)
            }
            Some(t) => Err(ExprParseError::new(
                offset,
                format!("unexpected token {:?}", t),
            )),
            None => Err(ExprParseError::new(offset, "unexpected end of input")),
        }
    }
}

/// Parse a complete expression
pub fn parse_expr(text: &str) -> Result<Expr, ExprParseError> {
    let tokens = tokenize(text)?;
    if tokens.is_empty() {
        return Err(ExprParseError::new(0, "empty expression"));
    }
    let mut parser = Parser {
        tokens,
        pos: 0,
        end: text.len(),
    };
    let expr = parser.parse_binary(1)?;
    if parser.pos < parser.tokens.len() {
        return Err(ExprParseError::new(
            parser.offset(),
            "trailing input after expression",
        ));
    }
    Ok(expr)
}
