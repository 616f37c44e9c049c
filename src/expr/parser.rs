//! Tokenizer and recursive-descent parser for placeholder expressions
//!
//! Grammar (lowest to highest precedence):
//! ```text
//! expr    := term (('+' | '-') term)*
//! term    := unary (('*' | '/' | '//' | '%') unary)*
//! unary   := ('+' | '-') unary | power
//! power   := primary ('**' unary)?
//! primary := NUMBER | STRING | IDENT | '(' expr ')'
//! ```
//! `**` is right associative and binds tighter than a unary operator on its
//! left, so `-x**2` is `-(x**2)` and `2**-1` is `2**(-1)`.

use std::iter::Peekable;
use std::str::CharIndices;

use crate::binding::Scalar;

/// Lexical token
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Int(i64),
    Float(f64),
    Str(String),
    Ident(String),
    Plus,
    Minus,
    Star,
    StarStar,
    Slash,
    SlashSlash,
    Percent,
    LParen,
    RParen,
    Dot,
    LBracket,
    RBracket,
    Comma,
    Other(char),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Plus,
    Neg,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    FloorDiv,
    Mod,
    Pow,
}

impl BinaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::FloorDiv => "//",
            BinaryOp::Mod => "%",
            BinaryOp::Pow => "**",
        }
    }
}

/// Expression AST
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Scalar),
    Var(String),
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
}

impl Expr {
    /// Variable names referenced by this expression, in source order
    pub fn variables(&self) -> Vec<&str> {
        let mut names = Vec::new();
        self.collect_variables(&mut names);
        names
    }

    fn collect_variables<'a>(&'a self, names: &mut Vec<&'a str>) {
        match self {
            Expr::Literal(_) => {}
            Expr::Var(name) => names.push(name),
            Expr::Unary { operand, .. } => operand.collect_variables(names),
            Expr::Binary { lhs, rhs, .. } => {
                lhs.collect_variables(names);
                rhs.collect_variables(names);
            }
        }
    }
}

/// Split expression source into tokens
pub fn tokenize(source: &str) -> Result<Vec<Token>, String> {
    let mut tokens = Vec::new();
    let mut chars = source.char_indices().peekable();

    while let Some(&(start, ch)) = chars.peek() {
        match ch {
            c if c.is_whitespace() => {
                chars.next();
            }
            c if c.is_ascii_digit() => tokens.push(lex_number(source, &mut chars)?),
            '.' if source[start + 1..].starts_with(|c: char| c.is_ascii_digit()) => {
                tokens.push(lex_number(source, &mut chars)?)
            }
            c if c.is_alphabetic() || c == '_' => {
                let mut end = start;
                while let Some(&(i, c)) = chars.peek() {
                    if c.is_alphanumeric() || c == '_' {
                        end = i + c.len_utf8();
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(Token::Ident(source[start..end].to_string()));
            }
            '\'' | '"' => tokens.push(lex_string(&mut chars)?),
            _ => {
                chars.next();
                let token = match ch {
                    '+' => Token::Plus,
                    '-' => Token::Minus,
                    '*' if next_is(&mut chars, '*') => Token::StarStar,
                    '*' => Token::Star,
                    '/' if next_is(&mut chars, '/') => Token::SlashSlash,
                    '/' => Token::Slash,
                    '%' => Token::Percent,
                    '(' => Token::LParen,
                    ')' => Token::RParen,
                    '.' => Token::Dot,
                    '[' => Token::LBracket,
                    ']' => Token::RBracket,
                    ',' => Token::Comma,
                    other => Token::Other(other),
                };
                tokens.push(token);
            }
        }
    }

    Ok(tokens)
}

/// Consume the next char if it equals `expected`
fn next_is(chars: &mut Peekable<CharIndices>, expected: char) -> bool {
    if chars.peek().map(|(_, c)| *c) == Some(expected) {
        chars.next();
        true
    } else {
        false
    }
}

fn lex_number(source: &str, chars: &mut Peekable<CharIndices>) -> Result<Token, String> {
    let start = chars.peek().map(|(i, _)| *i).unwrap_or(source.len());
    let mut end = start;
    let mut is_float = false;
    let mut seen_exponent = false;

    while let Some(&(i, c)) = chars.peek() {
        let accept = match c {
            '0'..='9' => true,
            '.' if !is_float && !seen_exponent => {
                is_float = true;
                true
            }
            'e' | 'E' if !seen_exponent => {
                // Only an exponent when digits (optionally signed) follow
                let rest = &source[i + 1..];
                let rest = rest.strip_prefix(['+', '-']).unwrap_or(rest);
                if rest.starts_with(|c: char| c.is_ascii_digit()) {
                    seen_exponent = true;
                    is_float = true;
                    chars.next();
                    end = i + 1;
                    if let Some(&(j, sign)) = chars.peek() {
                        if sign == '+' || sign == '-' {
                            chars.next();
                            end = j + 1;
                        }
                    }
                    continue;
                }
                false
            }
            _ => false,
        };
        if !accept {
            break;
        }
        chars.next();
        end = i + 1;
    }

    let literal = &source[start..end];
    if is_float {
        literal
            .parse::<f64>()
            .map(Token::Float)
            .map_err(|_| format!("invalid number literal '{}'", literal))
    } else {
        literal
            .parse::<i64>()
            .map(Token::Int)
            .map_err(|_| format!("integer literal '{}' out of range", literal))
    }
}

fn lex_string(chars: &mut Peekable<CharIndices>) -> Result<Token, String> {
    let Some((_, quote)) = chars.next() else {
        return Err("expected string literal".to_string());
    };
    let mut value = String::new();

    while let Some((_, c)) = chars.next() {
        match c {
            c if c == quote => return Ok(Token::Str(value)),
            '\\' => match chars.next() {
                Some((_, 'n')) => value.push('\n'),
                Some((_, 't')) => value.push('\t'),
                Some((_, other)) => value.push(other),
                None => break,
            },
            c => value.push(c),
        }
    }

    Err("unterminated string literal".to_string())
}

/// Parse expression source into an AST
pub fn parse(source: &str) -> Result<Expr, String> {
    let tokens = tokenize(source)?;
    if tokens.is_empty() {
        return Err("empty expression".to_string());
    }

    let mut parser = Parser {
        tokens: &tokens,
        pos: 0,
        depth: 0,
    };
    let expr = parser.parse_expr()?;
    match parser.peek() {
        None => Ok(expr),
        Some(token) => Err(format!("unexpected {}", describe(token))),
    }
}

/// Deepest AST the parser builds; keeps parsing and evaluation off the end of the stack
const MAX_DEPTH: usize = 256;

struct Parser<'a> {
    tokens: &'a [Token],
    pos: usize,
    depth: usize,
}

impl Parser<'_> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<&Token> {
        let token = self.tokens.get(self.pos);
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn enter(&mut self) -> Result<(), String> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(format!("expression nested deeper than {} levels", MAX_DEPTH));
        }
        Ok(())
    }

    // Each chained operator deepens the left spine by one level
    fn parse_expr(&mut self) -> Result<Expr, String> {
        let mut lhs = self.parse_term()?;
        let mut chained = 0;
        loop {
            let op = match self.peek() {
                Some(Token::Plus) => BinaryOp::Add,
                Some(Token::Minus) => BinaryOp::Sub,
                _ => break,
            };
            self.advance();
            self.enter()?;
            chained += 1;
            let rhs = self.parse_term()?;
            lhs = binary(op, lhs, rhs);
        }
        self.depth -= chained;
        Ok(lhs)
    }

    fn parse_term(&mut self) -> Result<Expr, String> {
        let mut lhs = self.parse_unary()?;
        let mut chained = 0;
        loop {
            let op = match self.peek() {
                Some(Token::Star) => BinaryOp::Mul,
                Some(Token::Slash) => BinaryOp::Div,
                Some(Token::SlashSlash) => BinaryOp::FloorDiv,
                Some(Token::Percent) => BinaryOp::Mod,
                _ => break,
            };
            self.advance();
            self.enter()?;
            chained += 1;
            let rhs = self.parse_unary()?;
            lhs = binary(op, lhs, rhs);
        }
        self.depth -= chained;
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> Result<Expr, String> {
        self.enter()?;
        let expr = self.parse_signed();
        self.depth -= 1;
        expr
    }

    fn parse_signed(&mut self) -> Result<Expr, String> {
        let op = match self.peek() {
            Some(Token::Plus) => UnaryOp::Plus,
            Some(Token::Minus) => UnaryOp::Neg,
            _ => return self.parse_power(),
        };
        self.advance();
        let operand = self.parse_unary()?;
        Ok(Expr::Unary {
            op,
            operand: Box::new(operand),
        })
    }

    fn parse_power(&mut self) -> Result<Expr, String> {
        let base = self.parse_primary()?;
        if self.peek() == Some(&Token::StarStar) {
            self.advance();
            let exponent = self.parse_unary()?;
            return Ok(binary(BinaryOp::Pow, base, exponent));
        }
        Ok(base)
    }

    fn parse_primary(&mut self) -> Result<Expr, String> {
        let Some(token) = self.advance().cloned() else {
            return Err("unexpected end of expression".to_string());
        };

        let expr = match token {
            Token::Int(i) => Expr::Literal(Scalar::Int(i)),
            Token::Float(f) => Expr::Literal(Scalar::Float(f)),
            Token::Str(s) => Expr::Literal(Scalar::Text(s)),
            Token::Ident(name) => Expr::Var(name),
            Token::LParen => {
                let inner = self.parse_expr()?;
                match self.advance() {
                    Some(Token::RParen) => inner,
                    Some(other) => return Err(format!("expected ')', found {}", describe(other))),
                    None => return Err("missing ')'".to_string()),
                }
            }
            other => return Err(format!("unexpected {}", describe(&other))),
        };

        // Only plain variable references are allowed: no calls, attributes or indexing
        match self.peek() {
            Some(Token::LParen) => Err("function calls are not allowed".to_string()),
            Some(Token::Dot) => Err("attribute access is not allowed".to_string()),
            Some(Token::LBracket) => Err("indexing is not allowed".to_string()),
            _ => Ok(expr),
        }
    }
}

fn binary(op: BinaryOp, lhs: Expr, rhs: Expr) -> Expr {
    Expr::Binary {
        op,
        lhs: Box::new(lhs),
        rhs: Box::new(rhs),
    }
}

fn describe(token: &Token) -> String {
    match token {
        Token::Int(i) => format!("number {}", i),
        Token::Float(f) => format!("number {}", f),
        Token::Str(s) => format!("string {:?}", s),
        Token::Ident(name) => format!("name '{}'", name),
        Token::Other(c) => format!("character '{}'", c),
        other => format!("{:?}", other),
    }
}
