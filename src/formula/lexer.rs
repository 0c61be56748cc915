//! Formula tokenizer

use super::{FormulaError, MEASURE_FIELDS};

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Number(f64),
    Ident(String),
    /// `{{ measure.<name> }}`
    Placeholder(String),
    Plus,
    Minus,
    Star,
    Slash,
    LParen,
    RParen,
    Comma,
}

impl Token {
    pub fn describe(&self) -> String {
        match self {
            Token::Number(n) => format!("number {}", n),
            Token::Ident(name) => format!("identifier '{}'", name),
            Token::Placeholder(name) => format!("placeholder '{}'", name),
            Token::Plus => "'+'".to_string(),
            Token::Minus => "'-'".to_string(),
            Token::Star => "'*'".to_string(),
            Token::Slash => "'/'".to_string(),
            Token::LParen => "'('".to_string(),
            Token::RParen => "')'".to_string(),
            Token::Comma => "','".to_string(),
        }
    }
}

/// Token with its byte offset in the source
#[derive(Debug, Clone, PartialEq)]
pub struct Spanned {
    pub token: Token,
    pub position: usize,
}

const PLACEHOLDER_NAMESPACE: &str = "measure";

pub fn tokenize(source: &str) -> Result<Vec<Spanned>, FormulaError> {
    let bytes = source.as_bytes();
    let mut tokens = Vec::new();
    let mut pos = 0;

    while pos < bytes.len() {
        let c = bytes[pos];

        if c.is_ascii_whitespace() {
            pos += 1;
            continue;
        }

        let start = pos;
        let token = match c {
            b'+' => Token::Plus,
            b'-' => Token::Minus,
            b'*' => Token::Star,
            b'/' => Token::Slash,
            b'(' => Token::LParen,
            b')' => Token::RParen,
            b',' => Token::Comma,
            b'{' => {
                let (name, end) = read_placeholder(source, pos)?;
                pos = end;
                tokens.push(Spanned {
                    token: Token::Placeholder(name),
                    position: start,
                });
                continue;
            }
            b'0'..=b'9' | b'.' => {
                while pos < bytes.len() && (bytes[pos].is_ascii_digit() || bytes[pos] == b'.') {
                    pos += 1;
                }
                let literal = &source[start..pos];
                let value = literal
                    .parse::<f64>()
                    .map_err(|_| FormulaError::InvalidNumber(literal.to_string()))?;
                tokens.push(Spanned {
                    token: Token::Number(value),
                    position: start,
                });
                continue;
            }
            b'a'..=b'z' | b'A'..=b'Z' | b'_' => {
                while pos < bytes.len() && (bytes[pos].is_ascii_alphanumeric() || bytes[pos] == b'_') {
                    pos += 1;
                }
                tokens.push(Spanned {
                    token: Token::Ident(source[start..pos].to_ascii_lowercase()),
                    position: start,
                });
                continue;
            }
            _ => {
                let ch = source[start..].chars().next().unwrap_or('?');
                return Err(FormulaError::UnexpectedCharacter { ch, position: start });
            }
        };

        tokens.push(Spanned { token, position: start });
        pos += 1;
    }

    Ok(tokens)
}

/// Read `{{ measure.<name> }}` starting at `start`; returns the field name
/// and the offset just past the closing braces.
fn read_placeholder(source: &str, start: usize) -> Result<(String, usize), FormulaError> {
    let rest = &source[start..];
    if !rest.starts_with("{{") {
        return Err(FormulaError::UnexpectedCharacter { ch: '{', position: start });
    }

    let close = rest
        .find("}}")
        .ok_or(FormulaError::UnterminatedPlaceholder(start))?;
    let inner = rest[2..close].trim();

    let field = match inner.split_once('.') {
        Some((namespace, field)) if namespace.trim() == PLACEHOLDER_NAMESPACE => field.trim(),
        _ => return Err(FormulaError::UnsupportedPlaceholder(inner.to_string())),
    };

    let valid = !field.is_empty()
        && field
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_');
    let field = field.to_ascii_lowercase();
    if !valid || !MEASURE_FIELDS.contains(&field.as_str()) {
        return Err(FormulaError::UnsupportedPlaceholder(inner.to_string()));
    }

    Ok((field, start + close + 2))
}
