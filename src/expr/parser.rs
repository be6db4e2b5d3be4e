//! Template and expression parsing.
//!
//! `parse_template` scans a YAML string attribute for `${...}` interpolations
//! and parses each one with the expression parser. `parse_expression` parses
//! a bare expression (used for full-expression argument values).

use serde_json::Value;

use crate::error::{Error, Result};
use crate::expr::ast::{Accessor, BinaryOp, Expr, TemplatePart, UnaryOp};

/// Parse a string attribute that may contain `${...}` interpolations.
///
/// A string with no interpolations parses to a string literal. A string
/// that is exactly one interpolation parses to the inner expression, so it
/// evaluates to the inner value with its original type.
pub fn parse_template(source: &str) -> Result<Expr> {
    let chars: Vec<char> = source.chars().collect();
    let mut parts: Vec<TemplatePart> = Vec::new();
    let mut literal = String::new();
    let mut i = 0;

    while i < chars.len() {
        if chars[i] == '$' && i + 2 < chars.len() && chars[i + 1] == '$' && chars[i + 2] == '{' {
            // $${ escapes a literal ${
            literal.push_str("${");
            i += 3;
        } else if chars[i] == '$' && i + 1 < chars.len() && chars[i + 1] == '{' {
            if !literal.is_empty() {
                parts.push(TemplatePart::Lit(std::mem::take(&mut literal)));
            }
            let (inner, next) = extract_interpolation(&chars, i + 2, source)?;
            parts.push(TemplatePart::Interp(parse_expression(&inner)?));
            i = next;
        } else {
            literal.push(chars[i]);
            i += 1;
        }
    }
    if !literal.is_empty() {
        parts.push(TemplatePart::Lit(literal));
    }

    match parts.len() {
        0 => Ok(Expr::Literal(Value::String(String::new()))),
        1 => match parts.into_iter().next() {
            Some(TemplatePart::Lit(text)) => Ok(Expr::Literal(Value::String(text))),
            Some(TemplatePart::Interp(expr)) => Ok(expr),
            None => unreachable!(),
        },
        _ => Ok(Expr::Template(parts)),
    }
}

/// Extract the text between `${` and its matching `}`, respecting nested
/// braces and string literals. Returns the inner text and the index after
/// the closing brace.
fn extract_interpolation(chars: &[char], start: usize, source: &str) -> Result<(String, usize)> {
    let mut depth = 1;
    let mut inner = String::new();
    let mut i = start;
    let mut in_string = false;

    while i < chars.len() {
        let c = chars[i];
        if in_string {
            inner.push(c);
            if c == '\\' && i + 1 < chars.len() {
                inner.push(chars[i + 1]);
                i += 2;
                continue;
            }
            if c == '"' {
                in_string = false;
            }
        } else {
            match c {
                '"' => {
                    in_string = true;
                    inner.push(c);
                }
                '{' => {
                    depth += 1;
                    inner.push(c);
                }
                '}' => {
                    depth -= 1;
                    if depth == 0 {
                        return Ok((inner, i + 1));
                    }
                    inner.push(c);
                }
                _ => inner.push(c),
            }
        }
        i += 1;
    }
    Err(Error::Parse(format!(
        "unterminated interpolation in '{}'",
        source
    )))
}

/// Parse a complete expression with no surrounding template text.
pub fn parse_expression(source: &str) -> Result<Expr> {
    let tokens = lex(source)?;
    let mut parser = Parser {
        source,
        tokens,
        pos: 0,
    };
    let expr = parser.expression()?;
    if parser.pos < parser.tokens.len() {
        return Err(parser.unexpected());
    }
    Ok(expr)
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Number(f64),
    Str(String),
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    Comma,
    Colon,
    Dot,
    Question,
    Bang,
    Minus,
    Plus,
    Star,
    Slash,
    Percent,
    EqEq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    AndAnd,
    OrOr,
}

fn lex(source: &str) -> Result<Vec<Token>> {
    let chars: Vec<char> = source.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            ' ' | '\t' | '\n' | '\r' => i += 1,
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            '[' => {
                tokens.push(Token::LBracket);
                i += 1;
            }
            ']' => {
                tokens.push(Token::RBracket);
                i += 1;
            }
            '{' => {
                tokens.push(Token::LBrace);
                i += 1;
            }
            '}' => {
                tokens.push(Token::RBrace);
                i += 1;
            }
            ',' => {
                tokens.push(Token::Comma);
                i += 1;
            }
            ':' => {
                tokens.push(Token::Colon);
                i += 1;
            }
            '.' => {
                tokens.push(Token::Dot);
                i += 1;
            }
            '?' => {
                tokens.push(Token::Question);
                i += 1;
            }
            '+' => {
                tokens.push(Token::Plus);
                i += 1;
            }
            '-' => {
                tokens.push(Token::Minus);
                i += 1;
            }
            '*' => {
                tokens.push(Token::Star);
                i += 1;
            }
            '/' => {
                tokens.push(Token::Slash);
                i += 1;
            }
            '%' => {
                tokens.push(Token::Percent);
                i += 1;
            }
            '!' => {
                if chars.get(i + 1) == Some(&'=') {
                    tokens.push(Token::NotEq);
                    i += 2;
                } else {
                    tokens.push(Token::Bang);
                    i += 1;
                }
            }
            '=' => {
                if chars.get(i + 1) == Some(&'=') {
                    tokens.push(Token::EqEq);
                    i += 2;
                } else {
                    return Err(Error::Parse(format!("unexpected '=' in '{}'", source)));
                }
            }
            '<' => {
                if chars.get(i + 1) == Some(&'=') {
                    tokens.push(Token::LtEq);
                    i += 2;
                } else {
                    tokens.push(Token::Lt);
                    i += 1;
                }
            }
            '>' => {
                if chars.get(i + 1) == Some(&'=') {
                    tokens.push(Token::GtEq);
                    i += 2;
                } else {
                    tokens.push(Token::Gt);
                    i += 1;
                }
            }
            '&' => {
                if chars.get(i + 1) == Some(&'&') {
                    tokens.push(Token::AndAnd);
                    i += 2;
                } else {
                    return Err(Error::Parse(format!("unexpected '&' in '{}'", source)));
                }
            }
            '|' => {
                if chars.get(i + 1) == Some(&'|') {
                    tokens.push(Token::OrOr);
                    i += 2;
                } else {
                    return Err(Error::Parse(format!("unexpected '|' in '{}'", source)));
                }
            }
            '"' => {
                let mut text = String::new();
                i += 1;
                loop {
                    match chars.get(i) {
                        None => {
                            return Err(Error::Parse(format!(
                                "unterminated string in '{}'",
                                source
                            )))
                        }
                        Some('"') => {
                            i += 1;
                            break;
                        }
                        Some('\\') => {
                            match chars.get(i + 1) {
                                Some('n') => text.push('\n'),
                                Some('t') => text.push('\t'),
                                Some('"') => text.push('"'),
                                Some('\\') => text.push('\\'),
                                other => {
                                    return Err(Error::Parse(format!(
                                        "invalid escape '\\{}' in '{}'",
                                        other.copied().unwrap_or(' '),
                                        source
                                    )))
                                }
                            }
                            i += 2;
                        }
                        Some(&c) => {
                            text.push(c);
                            i += 1;
                        }
                    }
                }
                tokens.push(Token::Str(text));
            }
            c if c.is_ascii_digit() => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    // a dot not followed by a digit ends the number (attribute access)
                    if chars[i] == '.' && !chars.get(i + 1).is_some_and(|d| d.is_ascii_digit()) {
                        break;
                    }
                    i += 1;
                }
                let text: String = chars[start..i].iter().collect();
                let value = text
                    .parse::<f64>()
                    .map_err(|_| Error::Parse(format!("invalid number '{}'", text)))?;
                tokens.push(Token::Number(value));
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len()
                    && (chars[i].is_ascii_alphanumeric() || chars[i] == '_' || chars[i] == '-')
                {
                    i += 1;
                }
                tokens.push(Token::Ident(chars[start..i].iter().collect()));
            }
            other => {
                return Err(Error::Parse(format!(
                    "unexpected character '{}' in '{}'",
                    other, source
                )))
            }
        }
    }
    Ok(tokens)
}

struct Parser<'a> {
    source: &'a str,
    tokens: Vec<Token>,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn eat(&mut self, token: &Token) -> bool {
        if self.peek() == Some(token) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, token: Token, what: &str) -> Result<()> {
        if self.eat(&token) {
            Ok(())
        } else {
            Err(Error::Parse(format!(
                "expected {} in '{}'",
                what, self.source
            )))
        }
    }

    fn unexpected(&self) -> Error {
        Error::Parse(format!("unexpected token in '{}'", self.source))
    }

    fn expression(&mut self) -> Result<Expr> {
        self.ternary()
    }

    fn ternary(&mut self) -> Result<Expr> {
        let cond = self.or()?;
        if self.eat(&Token::Question) {
            let then = self.expression()?;
            self.expect(Token::Colon, "':'")?;
            let otherwise = self.ternary()?;
            return Ok(Expr::Conditional {
                cond: Box::new(cond),
                then: Box::new(then),
                otherwise: Box::new(otherwise),
            });
        }
        Ok(cond)
    }

    fn or(&mut self) -> Result<Expr> {
        let mut left = self.and()?;
        while self.eat(&Token::OrOr) {
            let right = self.and()?;
            left = Expr::Binary {
                op: BinaryOp::Or,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn and(&mut self) -> Result<Expr> {
        let mut left = self.equality()?;
        while self.eat(&Token::AndAnd) {
            let right = self.equality()?;
            left = Expr::Binary {
                op: BinaryOp::And,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn equality(&mut self) -> Result<Expr> {
        let mut left = self.comparison()?;
        loop {
            let op = match self.peek() {
                Some(Token::EqEq) => BinaryOp::Eq,
                Some(Token::NotEq) => BinaryOp::NotEq,
                _ => break,
            };
            self.pos += 1;
            let right = self.comparison()?;
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn comparison(&mut self) -> Result<Expr> {
        let mut left = self.additive()?;
        loop {
            let op = match self.peek() {
                Some(Token::Lt) => BinaryOp::Lt,
                Some(Token::LtEq) => BinaryOp::LtEq,
                Some(Token::Gt) => BinaryOp::Gt,
                Some(Token::GtEq) => BinaryOp::GtEq,
                _ => break,
            };
            self.pos += 1;
            let right = self.additive()?;
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn additive(&mut self) -> Result<Expr> {
        let mut left = self.multiplicative()?;
        loop {
            let op = match self.peek() {
                Some(Token::Plus) => BinaryOp::Add,
                Some(Token::Minus) => BinaryOp::Sub,
                _ => break,
            };
            self.pos += 1;
            let right = self.multiplicative()?;
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn multiplicative(&mut self) -> Result<Expr> {
        let mut left = self.unary()?;
        loop {
            let op = match self.peek() {
                Some(Token::Star) => BinaryOp::Mul,
                Some(Token::Slash) => BinaryOp::Div,
                Some(Token::Percent) => BinaryOp::Mod,
                _ => break,
            };
            self.pos += 1;
            let right = self.unary()?;
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn unary(&mut self) -> Result<Expr> {
        if self.eat(&Token::Bang) {
            let operand = self.unary()?;
            return Ok(Expr::Unary {
                op: UnaryOp::Not,
                operand: Box::new(operand),
            });
        }
        if self.eat(&Token::Minus) {
            let operand = self.unary()?;
            return Ok(Expr::Unary {
                op: UnaryOp::Neg,
                operand: Box::new(operand),
            });
        }
        self.postfix()
    }

    fn postfix(&mut self) -> Result<Expr> {
        let base = self.primary()?;
        let (root, mut path) = match base {
            Expr::Reference { root, path } => (root, path),
            other => return Ok(other),
        };
        loop {
            if self.eat(&Token::Dot) {
                match self.advance() {
                    Some(Token::Ident(name)) => path.push(Accessor::Attr(name)),
                    _ => return Err(self.unexpected()),
                }
            } else if self.eat(&Token::LBracket) {
                let index = self.expression()?;
                self.expect(Token::RBracket, "']'")?;
                path.push(Accessor::Index(index));
            } else {
                break;
            }
        }
        Ok(Expr::Reference { root, path })
    }

    fn primary(&mut self) -> Result<Expr> {
        match self.advance() {
            Some(Token::Number(n)) => Ok(Expr::Literal(number_value(n))),
            Some(Token::Str(s)) => Ok(Expr::Literal(Value::String(s))),
            Some(Token::Ident(name)) => match name.as_str() {
                "true" => Ok(Expr::Literal(Value::Bool(true))),
                "false" => Ok(Expr::Literal(Value::Bool(false))),
                "null" => Ok(Expr::Literal(Value::Null)),
                _ => {
                    if self.eat(&Token::LParen) {
                        let mut args = Vec::new();
                        if !self.eat(&Token::RParen) {
                            loop {
                                args.push(self.expression()?);
                                if self.eat(&Token::RParen) {
                                    break;
                                }
                                self.expect(Token::Comma, "','")?;
                            }
                        }
                        Ok(Expr::Call { name, args })
                    } else {
                        Ok(Expr::Reference {
                            root: name,
                            path: Vec::new(),
                        })
                    }
                }
            },
            Some(Token::LParen) => {
                let inner = self.expression()?;
                self.expect(Token::RParen, "')'")?;
                Ok(inner)
            }
            Some(Token::LBracket) => {
                let mut items = Vec::new();
                if !self.eat(&Token::RBracket) {
                    loop {
                        items.push(self.expression()?);
                        if self.eat(&Token::RBracket) {
                            break;
                        }
                        self.expect(Token::Comma, "','")?;
                    }
                }
                Ok(Expr::List(items))
            }
            Some(Token::LBrace) => {
                let mut entries = Vec::new();
                if !self.eat(&Token::RBrace) {
                    loop {
                        let key = match self.advance() {
                            Some(Token::Ident(k)) => k,
                            Some(Token::Str(k)) => k,
                            _ => return Err(self.unexpected()),
                        };
                        self.expect(Token::Colon, "':'")?;
                        entries.push((key, self.expression()?));
                        if self.eat(&Token::RBrace) {
                            break;
                        }
                        self.expect(Token::Comma, "','")?;
                    }
                }
                Ok(Expr::Map(entries))
            }
            _ => Err(self.unexpected()),
        }
    }
}

/// Integral numbers stay integral so coerced values round-trip cleanly.
fn number_value(n: f64) -> Value {
    if n.fract() == 0.0 && n.abs() < i64::MAX as f64 {
        Value::from(n as i64)
    } else {
        serde_json::Number::from_f64(n)
            .map(Value::Number)
            .unwrap_or(Value::Null)
    }
}
