use std::iter::Peekable;
use std::str::Chars;

use crate::interpreter::RuntimeError;

const TAB_WIDTH: usize = 4;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Token {
    Name(String),
    Int(i64),
    Str(String),
    Op(BinOp),
    Assign,
    Colon,
    Comma,
    Semi,
    LParen,
    RParen,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BinOp {
    Add,
    Sub,
    Mul,
    FloorDiv,
    Mod,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl BinOp {
    pub(crate) fn symbol(self) -> &'static str {
        match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::FloorDiv => "//",
            BinOp::Mod => "%",
            BinOp::Eq => "==",
            BinOp::Ne => "!=",
            BinOp::Lt => "<",
            BinOp::Le => "<=",
            BinOp::Gt => ">",
            BinOp::Ge => ">=",
        }
    }

    pub(crate) fn is_comparison(self) -> bool {
        matches!(
            self,
            BinOp::Eq | BinOp::Ne | BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge
        )
    }
}

/// One logical source line with its indentation width.
#[derive(Debug, Clone)]
pub(crate) struct Line {
    pub number: usize,
    pub indent: usize,
    pub tokens: Vec<Token>,
}

pub(crate) fn tokenize(source: &str) -> Result<Vec<Line>, RuntimeError> {
    let mut lines = Vec::new();
    for (idx, raw) in source.lines().enumerate() {
        let number = idx + 1;
        let indent = raw
            .chars()
            .take_while(|c| *c == ' ' || *c == '\t')
            .map(|c| if c == '\t' { TAB_WIDTH } else { 1 })
            .sum();
        let tokens = tokenize_line(raw.trim_start()).map_err(|err| err.at_line(number))?;
        if !tokens.is_empty() {
            lines.push(Line {
                number,
                indent,
                tokens,
            });
        }
    }
    Ok(lines)
}

fn tokenize_line(text: &str) -> Result<Vec<Token>, RuntimeError> {
    let mut tokens = Vec::new();
    let mut chars = text.chars().peekable();
    while let Some(&c) = chars.peek() {
        match c {
            ' ' | '\t' | '\r' => {
                chars.next();
            }
            '#' => break,
            '0'..='9' => tokens.push(number(&mut chars)?),
            'a'..='z' | 'A'..='Z' | '_' => {
                let mut name = String::new();
                while let Some(&c) = chars.peek() {
                    if c.is_ascii_alphanumeric() || c == '_' {
                        name.push(c);
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(Token::Name(name));
            }
            '\'' | '"' => {
                chars.next();
                tokens.push(Token::Str(string(&mut chars, c)?));
            }
            _ => {
                chars.next();
                let token = match c {
                    '+' => Token::Op(BinOp::Add),
                    '-' => Token::Op(BinOp::Sub),
                    '*' => Token::Op(BinOp::Mul),
                    '%' => Token::Op(BinOp::Mod),
                    '(' => Token::LParen,
                    ')' => Token::RParen,
                    ',' => Token::Comma,
                    ':' => Token::Colon,
                    ';' => Token::Semi,
                    '/' => {
                        if chars.next_if_eq(&'/').is_none() {
                            return Err(syntax("true division is not supported, use //"));
                        }
                        Token::Op(BinOp::FloorDiv)
                    }
                    '=' => {
                        if chars.next_if_eq(&'=').is_some() {
                            Token::Op(BinOp::Eq)
                        } else {
                            Token::Assign
                        }
                    }
                    '!' => {
                        if chars.next_if_eq(&'=').is_none() {
                            return Err(syntax("invalid syntax '!'"));
                        }
                        Token::Op(BinOp::Ne)
                    }
                    '<' => {
                        if chars.next_if_eq(&'=').is_some() {
                            Token::Op(BinOp::Le)
                        } else {
                            Token::Op(BinOp::Lt)
                        }
                    }
                    '>' => {
                        if chars.next_if_eq(&'=').is_some() {
                            Token::Op(BinOp::Ge)
                        } else {
                            Token::Op(BinOp::Gt)
                        }
                    }
                    other => return Err(syntax(format!("invalid character '{other}'"))),
                };
                tokens.push(token);
            }
        }
    }
    Ok(tokens)
}

fn number(chars: &mut Peekable<Chars<'_>>) -> Result<Token, RuntimeError> {
    let mut digits = String::new();
    while let Some(c) = chars.next_if(char::is_ascii_digit) {
        digits.push(c);
    }
    if chars.peek().is_some_and(|c| c.is_ascii_alphabetic() || *c == '_') {
        return Err(syntax("invalid decimal literal"));
    }
    digits
        .parse::<i64>()
        .map(Token::Int)
        .map_err(|_| RuntimeError::new("OverflowError", "integer literal too large"))
}

fn string(chars: &mut Peekable<Chars<'_>>, quote: char) -> Result<String, RuntimeError> {
    let mut out = String::new();
    loop {
        match chars.next() {
            None => return Err(syntax("unterminated string literal")),
            Some(c) if c == quote => return Ok(out),
            Some('\\') => match chars.next() {
                Some('n') => out.push('\n'),
                Some('t') => out.push('\t'),
                Some('r') => out.push('\r'),
                Some('0') => out.push('\0'),
                Some(c @ ('\\' | '\'' | '"')) => out.push(c),
                Some(other) => {
                    out.push('\\');
                    out.push(other);
                }
                None => return Err(syntax("unterminated string literal")),
            },
            Some(c) => out.push(c),
        }
    }
}

pub(crate) fn syntax(message: impl Into<String>) -> RuntimeError {
    RuntimeError::new("SyntaxError", message)
}
