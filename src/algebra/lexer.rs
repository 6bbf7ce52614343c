//! Tokenizer for algebra expressions.

use crate::error::ParseError;

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Name(String),
    Int(i64),
    Float(f64),
    Str(String),
    /// Raw text between `{` and `}`
    Brace(String),
    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
    Assign,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    EqEq,
    NotEq,
    Lt,
    Le,
    Gt,
    Ge,
    AndAnd,
    OrOr,
    Colon,
    NotColon,
    Hash,
    Eof,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    /// Byte offset of the first character
    pub position: usize,
    pub text: String,
}

pub fn tokenize(input: &str) -> Result<Vec<Token>, ParseError> {
    let bytes = input.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        let c = bytes[i] as char;
        if c.is_ascii_whitespace() {
            i += 1;
            continue;
        }
        let start = i;

        if c.is_ascii_alphabetic() || c == '_' {
            while i < bytes.len() {
                let c = bytes[i] as char;
                if c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '@') {
                    i += 1;
                } else {
                    break;
                }
            }
            let text = &input[start..i];
            tokens.push(token(TokenKind::Name(text.to_string()), start, text));
            continue;
        }

        if c.is_ascii_digit() {
            let mut is_float = false;
            while i < bytes.len() {
                let c = bytes[i] as char;
                if c.is_ascii_digit() {
                    i += 1;
                } else if c == '.' && !is_float {
                    is_float = true;
                    i += 1;
                } else if matches!(c, 'e' | 'E')
                    && bytes
                        .get(i + 1)
                        .is_some_and(|n| n.is_ascii_digit() || *n == b'-' || *n == b'+')
                {
                    is_float = true;
                    i += 2;
                } else {
                    break;
                }
            }
            let text = &input[start..i];
            let kind = if is_float {
                text.parse::<f64>().map(TokenKind::Float).ok()
            } else {
                text.parse::<i64>().map(TokenKind::Int).ok()
            };
            let kind = kind.ok_or_else(|| ParseError::new("invalid number", text, start))?;
            tokens.push(token(kind, start, text));
            continue;
        }

        if c == '"' || c == '\'' {
            let close = input[start + 1..]
                .find(c)
                .ok_or_else(|| ParseError::new("unterminated string", &input[start..], start))?;
            let end = start + 1 + close;
            let text = &input[start..=end];
            tokens.push(token(
                TokenKind::Str(input[start + 1..end].to_string()),
                start,
                text,
            ));
            i = end + 1;
            continue;
        }

        if c == '{' {
            let close = input[start + 1..]
                .find(['}', '{'])
                .filter(|offset| bytes[start + 1 + offset] == b'}')
                .ok_or_else(|| ParseError::new("unbalanced brace", "{", start))?;
            let end = start + 1 + close;
            tokens.push(token(
                TokenKind::Brace(input[start + 1..end].to_string()),
                start,
                &input[start..=end],
            ));
            i = end + 1;
            continue;
        }

        let next = bytes.get(i + 1).map(|b| *b as char);
        let (kind, len) = match (c, next) {
            ('=', Some('=')) => (TokenKind::EqEq, 2),
            ('!', Some('=')) => (TokenKind::NotEq, 2),
            ('!', Some(':')) => (TokenKind::NotColon, 2),
            ('<', Some('=')) => (TokenKind::Le, 2),
            ('>', Some('=')) => (TokenKind::Ge, 2),
            ('&', Some('&')) => (TokenKind::AndAnd, 2),
            ('|', Some('|')) => (TokenKind::OrOr, 2),
            ('=', _) => (TokenKind::Assign, 1),
            ('<', _) => (TokenKind::Lt, 1),
            ('>', _) => (TokenKind::Gt, 1),
            ('(', _) => (TokenKind::LParen, 1),
            (')', _) => (TokenKind::RParen, 1),
            ('[', _) => (TokenKind::LBracket, 1),
            (']', _) => (TokenKind::RBracket, 1),
            (',', _) => (TokenKind::Comma, 1),
            ('+', _) => (TokenKind::Plus, 1),
            ('-', _) => (TokenKind::Minus, 1),
            ('*', _) => (TokenKind::Star, 1),
            ('/', _) => (TokenKind::Slash, 1),
            ('%', _) => (TokenKind::Percent, 1),
            (':', _) => (TokenKind::Colon, 1),
            ('#', _) => (TokenKind::Hash, 1),
            ('}', _) => return Err(ParseError::new("unbalanced brace", "}", start)),
            _ => {
                let text: String = input[start..].chars().take(1).collect();
                return Err(ParseError::new("unexpected character", text, start));
            }
        };
        i += len;
        tokens.push(token(kind, start, &input[start..i]));
    }

    tokens.push(token(TokenKind::Eof, input.len(), ""));
    Ok(tokens)
}

fn token(kind: TokenKind, position: usize, text: &str) -> Token {
    Token {
        kind,
        position,
        text: text.to_string(),
    }
}
