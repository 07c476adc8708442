// src/evaluation/condition.rs

//! Condition language.
//!
//! ```text
//! expr    := and ( "or" and )*
//! and     := not ( "and" not )*
//! not     := "!" not | primary
//! primary := "(" expr ")" | func "(" args ")" | operand ( cmp operand )?
//! ```
//!
//! String comparisons are case-insensitive; `<`, `>`, `<=`, `>=` require
//! numeric operands.

use std::path::Path;

use crate::errors::{codes, BuildError, ElementLocation, Result};
use crate::evaluation::expander::Expander;
use crate::fs::{FileSystem, RealFileSystem};
use crate::types::parse_bool;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    LParen,
    RParen,
    Comma,
    Not,
    And,
    Or,
    Cmp(CmpOp),
    Quoted(String),
    Word(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CmpOp {
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
}

#[derive(Debug, Clone)]
enum Node {
    Or(Box<Node>, Box<Node>),
    And(Box<Node>, Box<Node>),
    Not(Box<Node>),
    Compare(CmpOp, String, String),
    Function(String, Vec<String>),
    Operand(String),
}

fn tokenize(condition: &str, location: &ElementLocation) -> Result<Vec<Token>> {
    let bytes = condition.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        let c = bytes[i];
        match c {
            b' ' | b'\t' | b'\r' | b'\n' => i += 1,
            b'(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            b')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            b',' => {
                tokens.push(Token::Comma);
                i += 1;
            }
            b'=' if bytes.get(i + 1) == Some(&b'=') => {
                tokens.push(Token::Cmp(CmpOp::Eq));
                i += 2;
            }
            b'!' if bytes.get(i + 1) == Some(&b'=') => {
                tokens.push(Token::Cmp(CmpOp::Ne));
                i += 2;
            }
            b'!' => {
                tokens.push(Token::Not);
                i += 1;
            }
            b'<' | b'>' => {
                let or_equal = bytes.get(i + 1) == Some(&b'=');
                let op = match (c, or_equal) {
                    (b'<', false) => CmpOp::Lt,
                    (b'<', true) => CmpOp::Le,
                    (_, false) => CmpOp::Gt,
                    (_, true) => CmpOp::Ge,
                };
                tokens.push(Token::Cmp(op));
                i += if or_equal { 2 } else { 1 };
            }
            b'\'' => {
                let start = i + 1;
                let end = find_closing_quote(bytes, start).ok_or_else(|| {
                    invalid(location, condition, "unterminated quoted string")
                })?;
                tokens.push(Token::Quoted(condition[start..end].to_string()));
                i = end + 1;
            }
            _ => {
                let start = i;
                while i < bytes.len() {
                    let b = bytes[i];
                    if matches!(b, b'$' | b'@' | b'%') && bytes.get(i + 1) == Some(&b'(') {
                        i = skip_reference(bytes, i + 1).ok_or_else(|| {
                            invalid(location, condition, "unterminated reference")
                        })?;
                        continue;
                    }
                    if b.is_ascii_alphanumeric() || matches!(b, b'_' | b'.' | b'-' | b'\\' | b'/' | b':') {
                        i += 1;
                        continue;
                    }
                    break;
                }
                if start == i {
                    return Err(invalid(
                        location,
                        condition,
                        &format!("unexpected character '{}'", c as char),
                    ));
                }
                let word = &condition[start..i];
                tokens.push(match word.to_ascii_lowercase().as_str() {
                    "and" => Token::And,
                    "or" => Token::Or,
                    _ => Token::Word(word.to_string()),
                });
            }
        }
    }
    Ok(tokens)
}

/// Closing quote position, skipping quotes nested inside `@(...)` etc.
fn find_closing_quote(bytes: &[u8], start: usize) -> Option<usize> {
    let mut i = start;
    while i < bytes.len() {
        let b = bytes[i];
        if matches!(b, b'$' | b'@' | b'%') && bytes.get(i + 1) == Some(&b'(') {
            i = skip_reference(bytes, i + 1)?;
            continue;
        }
        if b == b'\'' {
            return Some(i);
        }
        i += 1;
    }
    None
}

/// Index just past the `)` matching the `(` at `open`.
fn skip_reference(bytes: &[u8], open: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_quote = false;
    for (idx, b) in bytes.iter().enumerate().skip(open) {
        match b {
            b'\'' => in_quote = !in_quote,
            b'(' if !in_quote => depth += 1,
            b')' if !in_quote => {
                depth -= 1;
                if depth == 0 {
                    return Some(idx + 1);
                }
            }
            _ => {}
        }
    }
    None
}

fn invalid(location: &ElementLocation, condition: &str, detail: &str) -> BuildError {
    BuildError::invalid_project(
        codes::INVALID_CONDITION,
        location,
        format!("error in condition \"{condition}\": {detail}"),
    )
}

struct Parser<'c> {
    tokens: Vec<Token>,
    pos: usize,
    condition: &'c str,
    location: &'c ElementLocation,
}

impl Parser<'_> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn error(&self, detail: &str) -> BuildError {
        invalid(self.location, self.condition, detail)
    }

    fn expect(&mut self, expected: Token) -> Result<()> {
        match self.next() {
            Some(t) if t == expected => Ok(()),
            _ => Err(self.error(&format!("expected {expected:?}"))),
        }
    }

    fn parse_or(&mut self) -> Result<Node> {
        let mut left = self.parse_and()?;
        while self.peek() == Some(&Token::Or) {
            self.pos += 1;
            let right = self.parse_and()?;
            left = Node::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Node> {
        let mut left = self.parse_not()?;
        while self.peek() == Some(&Token::And) {
            self.pos += 1;
            let right = self.parse_not()?;
            left = Node::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_not(&mut self) -> Result<Node> {
        if self.peek() == Some(&Token::Not) {
            self.pos += 1;
            return Ok(Node::Not(Box::new(self.parse_not()?)));
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<Node> {
        match self.next() {
            Some(Token::LParen) => {
                let inner = self.parse_or()?;
                self.expect(Token::RParen)?;
                Ok(inner)
            }
            Some(Token::Word(word)) if self.peek() == Some(&Token::LParen) => {
                self.pos += 1;
                let mut args = Vec::new();
                if self.peek() != Some(&Token::RParen) {
                    loop {
                        args.push(self.parse_operand()?);
                        if self.peek() == Some(&Token::Comma) {
                            self.pos += 1;
                            continue;
                        }
                        break;
                    }
                }
                self.expect(Token::RParen)?;
                Ok(Node::Function(word, args))
            }
            Some(Token::Word(left)) | Some(Token::Quoted(left)) => {
                if let Some(Token::Cmp(op)) = self.peek().cloned() {
                    self.pos += 1;
                    let right = self.parse_operand()?;
                    return Ok(Node::Compare(op, left, right));
                }
                Ok(Node::Operand(left))
            }
            _ => Err(self.error("expected an operand")),
        }
    }

    fn parse_operand(&mut self) -> Result<String> {
        match self.next() {
            Some(Token::Word(s)) | Some(Token::Quoted(s)) => Ok(s),
            _ => Err(self.error("expected an operand")),
        }
    }
}

fn parse_number(value: &str) -> Option<f64> {
    let trimmed = value.trim();
    if let Some(hex) = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
    {
        return i64::from_str_radix(hex, 16).ok().map(|n| n as f64);
    }
    if trimmed.is_empty()
        || !trimmed
            .chars()
            .all(|c| c.is_ascii_digit() || matches!(c, '.' | '-' | '+'))
    {
        return None;
    }
    trimmed.parse::<f64>().ok()
}

struct Evaluator<'e, 'a> {
    expander: &'e Expander<'a>,
    condition: &'e str,
    location: &'e ElementLocation,
}

impl Evaluator<'_, '_> {
    fn value(&self, operand: &str) -> Result<String> {
        self.expander.expand_unescaped(operand, self.location)
    }

    fn eval(&self, node: &Node) -> Result<bool> {
        match node {
            Node::Or(l, r) => Ok(self.eval(l)? || self.eval(r)?),
            Node::And(l, r) => Ok(self.eval(l)? && self.eval(r)?),
            Node::Not(inner) => Ok(!self.eval(inner)?),
            Node::Operand(operand) => {
                let value = self.value(operand)?;
                parse_bool(&value).ok_or_else(|| {
                    BuildError::invalid_project(
                        codes::CONDITION_NOT_BOOLEAN,
                        self.location,
                        format!(
                            "specified condition \"{}\" evaluates to \"{}\" instead of a boolean",
                            self.condition, value
                        ),
                    )
                })
            }
            Node::Compare(op, left, right) => {
                let l = self.value(left)?;
                let r = self.value(right)?;
                self.compare(*op, &l, &r)
            }
            Node::Function(name, args) => self.function(name, args),
        }
    }

    fn compare(&self, op: CmpOp, left: &str, right: &str) -> Result<bool> {
        let numbers = parse_number(left).zip(parse_number(right));
        match op {
            CmpOp::Eq | CmpOp::Ne => {
                let equal = match numbers {
                    Some((l, r)) => l == r,
                    None => match (parse_bool(left), parse_bool(right)) {
                        (Some(l), Some(r)) => l == r,
                        _ => left.eq_ignore_ascii_case(right),
                    },
                };
                Ok(if op == CmpOp::Eq { equal } else { !equal })
            }
            _ => {
                let Some((l, r)) = numbers else {
                    return Err(BuildError::invalid_project(
                        codes::COMPARISON_NOT_NUMERIC,
                        self.location,
                        format!(
                            "a numeric comparison was attempted on \"{left}\" and \"{right}\" in condition \"{}\"",
                            self.condition
                        ),
                    ));
                };
                Ok(match op {
                    CmpOp::Lt => l < r,
                    CmpOp::Gt => l > r,
                    CmpOp::Le => l <= r,
                    _ => l >= r,
                })
            }
        }
    }

    fn function(&self, name: &str, args: &[String]) -> Result<bool> {
        let single_arg = || -> Result<String> {
            match args {
                [arg] => self.value(arg),
                _ => Err(invalid(
                    self.location,
                    self.condition,
                    &format!("function \"{name}\" takes exactly one argument"),
                )),
            }
        };
        match name.to_ascii_lowercase().as_str() {
            "exists" => {
                let path = single_arg()?;
                let path = path.trim();
                if path.is_empty() {
                    return Ok(false);
                }
                Ok(match self.expander.file_system() {
                    Some((fs, base)) => fs.exists(&fs.resolve(base, Path::new(path))),
                    None => RealFileSystem.exists(Path::new(path)),
                })
            }
            "hastrailingslash" => {
                let value = single_arg()?;
                Ok(value.ends_with('/') || value.ends_with('\\'))
            }
            _ => Err(invalid(
                self.location,
                self.condition,
                &format!("unknown function \"{name}\""),
            )),
        }
    }
}

/// Evaluate a condition; an empty condition is true.
pub fn evaluate_condition(
    condition: &str,
    expander: &Expander<'_>,
    location: &ElementLocation,
) -> Result<bool> {
    if condition.trim().is_empty() {
        return Ok(true);
    }
    let tokens = tokenize(condition, location)?;
    let mut parser = Parser {
        tokens,
        pos: 0,
        condition,
        location,
    };
    let ast = parser.parse_or()?;
    if parser.pos != parser.tokens.len() {
        return Err(parser.error("unexpected trailing tokens"));
    }
    Evaluator {
        expander,
        condition,
        location,
    }
    .eval(&ast)
}
