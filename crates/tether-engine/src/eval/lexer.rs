//! Tokenizer for the expression micro-language
//!
//! ```text
//! map(x => x ^ 2, [1, 2, 3])
//! // Ident("map") LParen Ident("x") FatArrow Ident("x") Caret Number(2.0) Comma
//! // LBracket Number(1.0) Comma Number(2.0) Comma Number(3.0) RBracket RParen
//! ```

use crate::error::{EngineError, Result};
use std::fmt;

/// Token types in expressions
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Number(f64),
    Ident(String),
    /// `$N`, a reference to a live engine value
    HandleRef(u32),

    // Arithmetic
    Plus,
    Minus,
    Star,
    Slash,
    Caret,
    Percent,

    // Comparison
    Lt,
    Le,
    Gt,
    Ge,
    EqEq,
    Ne,

    /// `=>` in a lambda
    FatArrow,
    Comma,

    // Statements
    Let,
    Assign,
    Semicolon,

    LParen,
    RParen,
    LBracket,
    RBracket,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Number(n) => write!(f, "number {n}"),
            Token::Ident(name) => write!(f, "identifier '{name}'"),
            Token::HandleRef(id) => write!(f, "${id}"),
            Token::Plus => write!(f, "+"),
            Token::Minus => write!(f, "-"),
            Token::Star => write!(f, "*"),
            Token::Slash => write!(f, "/"),
            Token::Caret => write!(f, "^"),
            Token::Percent => write!(f, "%"),
            Token::Lt => write!(f, "<"),
            Token::Le => write!(f, "<="),
            Token::Gt => write!(f, ">"),
            Token::Ge => write!(f, ">="),
            Token::EqEq => write!(f, "=="),
            Token::Ne => write!(f, "!="),
            Token::FatArrow => write!(f, "=>"),
            Token::Comma => write!(f, ","),
            Token::Let => write!(f, "'let'"),
            Token::Assign => write!(f, "="),
            Token::Semicolon => write!(f, ";"),
            Token::LParen => write!(f, "("),
            Token::RParen => write!(f, ")"),
            Token::LBracket => write!(f, "["),
            Token::RBracket => write!(f, "]"),
        }
    }
}

/// A token and the byte offset it starts at
#[derive(Debug, Clone, PartialEq)]
pub struct Spanned {
    pub token: Token,
    pub position: usize,
}

/// Lexer state
pub struct Lexer<'a> {
    input: &'a str,
    position: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a str) -> Self {
        Lexer { input, position: 0 }
    }

    fn peek(&self) -> Option<char> {
        self.input[self.position..].chars().next()
    }

    fn peek_second(&self) -> Option<char> {
        self.input[self.position..].chars().nth(1)
    }

    fn consume(&mut self) -> Option<char> {
        let ch = self.peek()?;
        self.position += ch.len_utf8();
        Some(ch)
    }

    fn skip_whitespace(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.consume();
        }
    }

    fn error(&self, position: usize, message: impl Into<String>) -> EngineError {
        EngineError::Parse {
            position,
            message: message.into(),
        }
    }

    fn read_identifier(&mut self) -> String {
        let start = self.position;
        while self.peek().is_some_and(|ch| ch.is_alphanumeric() || ch == '_') {
            self.consume();
        }
        self.input[start..self.position].to_string()
    }

    /// Read an unsigned decimal number with optional fraction and exponent
    fn read_number(&mut self) -> Result<f64> {
        let start = self.position;
        while self.peek().is_some_and(|ch| ch.is_ascii_digit()) {
            self.consume();
        }
        if self.peek() == Some('.') {
            self.consume();
            while self.peek().is_some_and(|ch| ch.is_ascii_digit()) {
                self.consume();
            }
        }
        if matches!(self.peek(), Some('e' | 'E')) {
            let exponent_follows = match self.peek_second() {
                Some(ch) if ch.is_ascii_digit() => true,
                Some('+' | '-') => self.input[self.position..]
                    .chars()
                    .nth(2)
                    .is_some_and(|ch| ch.is_ascii_digit()),
                _ => false,
            };
            if exponent_follows {
                self.consume();
                if matches!(self.peek(), Some('+' | '-')) {
                    self.consume();
                }
                while self.peek().is_some_and(|ch| ch.is_ascii_digit()) {
                    self.consume();
                }
            }
        }

        let text = &self.input[start..self.position];
        text.parse::<f64>()
            .map_err(|_| self.error(start, format!("malformed number '{text}'")))
    }

    fn read_handle(&mut self, start: usize) -> Result<Token> {
        let digits_start = self.position;
        while self.peek().is_some_and(|ch| ch.is_ascii_digit()) {
            self.consume();
        }
        self.input[digits_start..self.position]
            .parse::<u32>()
            .map(Token::HandleRef)
            .map_err(|_| self.error(start, "expected a handle number after '$'"))
    }

    /// Get next token
    pub fn next_token(&mut self) -> Result<Option<Spanned>> {
        self.skip_whitespace();

        let position = self.position;
        let Some(ch) = self.peek() else {
            return Ok(None);
        };

        let token = match ch {
            '0'..='9' | '.' => Token::Number(self.read_number()?),
            '$' => {
                self.consume();
                self.read_handle(position)?
            }
            c if c.is_alphabetic() || c == '_' => match self.read_identifier() {
                word if word == "let" => Token::Let,
                word => Token::Ident(word),
            },
            _ => {
                self.consume();
                let paired = match (ch, self.peek()) {
                    ('=', Some('>')) => Some(Token::FatArrow),
                    ('=', Some('=')) => Some(Token::EqEq),
                    ('!', Some('=')) => Some(Token::Ne),
                    ('<', Some('=')) => Some(Token::Le),
                    ('>', Some('=')) => Some(Token::Ge),
                    _ => None,
                };
                if let Some(token) = paired {
                    self.consume();
                    return Ok(Some(Spanned { token, position }));
                }
                match ch {
                    '<' => Token::Lt,
                    '>' => Token::Gt,
                    '+' => Token::Plus,
                    '-' => Token::Minus,
                    '*' => Token::Star,
                    '/' => Token::Slash,
                    '^' => Token::Caret,
                    '%' => Token::Percent,
                    ',' => Token::Comma,
                    '=' => Token::Assign,
                    ';' => Token::Semicolon,
                    '(' => Token::LParen,
                    ')' => Token::RParen,
                    '[' => Token::LBracket,
                    ']' => Token::RBracket,
                    _ => return Err(self.error(position, format!("unexpected character '{ch}'"))),
                }
            }
        };

        Ok(Some(Spanned { token, position }))
    }

    /// Tokenize the entire input
    pub fn tokenize(&mut self) -> Result<Vec<Spanned>> {
        let mut tokens = Vec::new();
        while let Some(token) = self.next_token()? {
            tokens.push(token);
        }
        Ok(tokens)
    }
}

/// Convenience function to tokenize a string
pub fn tokenize(input: &str) -> Result<Vec<Spanned>> {
    Lexer::new(input).tokenize()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(input: &str) -> Vec<Token> {
        tokenize(input).unwrap().into_iter().map(|s| s.token).collect()
    }

    #[test]
    fn test_lambda_call() {
        assert_eq!(
            kinds("map(x => x^2, $3)"),
            vec![
                Token::Ident("map".to_string()),
                Token::LParen,
                Token::Ident("x".to_string()),
                Token::FatArrow,
                Token::Ident("x".to_string()),
                Token::Caret,
                Token::Number(2.0),
                Token::Comma,
                Token::HandleRef(3),
                Token::RParen,
            ]
        );
    }

    #[test]
    fn test_numbers() {
        assert_eq!(kinds("1.5e-3"), vec![Token::Number(1.5e-3)]);
        assert_eq!(kinds("2E4"), vec![Token::Number(2e4)]);
        assert_eq!(kinds("0.1"), vec![Token::Number(0.1)]);
        // 'e' without exponent digits stays an identifier
        assert_eq!(kinds("2e"), vec![Token::Number(2.0), Token::Ident("e".to_string())]);
    }

    #[test]
    fn test_comparisons() {
        assert_eq!(
            kinds("a <= b != c"),
            vec![
                Token::Ident("a".to_string()),
                Token::Le,
                Token::Ident("b".to_string()),
                Token::Ne,
                Token::Ident("c".to_string()),
            ]
        );
    }

    #[test]
    fn test_statements() {
        assert_eq!(
            kinds("let x = 2; x"),
            vec![
                Token::Let,
                Token::Ident("x".to_string()),
                Token::Assign,
                Token::Number(2.0),
                Token::Semicolon,
                Token::Ident("x".to_string()),
            ]
        );
        assert_eq!(kinds("letter"), vec![Token::Ident("letter".to_string())]);
    }

    #[test]
    fn test_unknown_character_reports_position() {
        let err = tokenize("1 + #").unwrap_err();
        assert_eq!(
            err,
            EngineError::Parse {
                position: 4,
                message: "unexpected character '#'".to_string()
            }
        );
    }
}
