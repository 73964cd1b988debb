//! Recursive descent parser for expressions
//!
//! ## Grammar
//!
//! ```text
//! <program>    ::= <statement> { ";" <statement> } [ ";" ]
//! <statement>  ::= "let" <ident> "=" <expr> | <expr>
//! <expr>       ::= <lambda> | <comparison>
//! <lambda>     ::= <ident> "=>" <expr>
//!                | "(" [ <ident> { "," <ident> } ] ")" "=>" <expr>
//! <comparison> ::= <additive> [ ("<" | "<=" | ">" | ">=" | "==" | "!=") <additive> ]
//! <additive>   ::= <term> { ("+" | "-") <term> }
//! <term>       ::= <unary> { ("*" | "/" | "%") <unary> }
//! <unary>      ::= "-" <unary> | <power>
//! <power>      ::= <primary> [ "^" <unary> ]            // right associative
//! <primary>    ::= <number> | "$" <number> | <ident> [ "(" <args> ")" ]
//!                | "(" <expr> ")" | "[" [ <expr> { "," <expr> } ] "]"
//! ```
//!
//! `-2^2` parses as `-(2^2)`, matching conventional notation.

use super::ast::{Expr, Statement};
use super::lexer::{tokenize, Spanned, Token};
use crate::error::{EngineError, Result};
use crate::kernels::BinaryOp;
use std::sync::Arc;

/// Parser state
pub struct Parser {
    tokens: Vec<Spanned>,
    position: usize,
    end: usize,
}

impl Parser {
    pub fn new(tokens: Vec<Spanned>, input_len: usize) -> Self {
        Parser {
            tokens,
            position: 0,
            end: input_len,
        }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.position).map(|s| &s.token)
    }

    fn peek_at(&self, offset: usize) -> Option<&Token> {
        self.tokens.get(self.position + offset).map(|s| &s.token)
    }

    fn consume(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.position)?.token.clone();
        self.position += 1;
        Some(token)
    }

    /// Byte offset of the current token (or end of input)
    fn offset(&self) -> usize {
        self.tokens.get(self.position).map_or(self.end, |s| s.position)
    }

    fn error(&self, message: impl Into<String>) -> EngineError {
        EngineError::Parse {
            position: self.offset(),
            message: message.into(),
        }
    }

    fn expect(&mut self, expected: Token) -> Result<()> {
        match self.peek() {
            Some(token) if *token == expected => {
                self.consume();
                Ok(())
            }
            Some(token) => Err(self.error(format!("expected {expected} but found {token}"))),
            None => Err(self.error(format!("unexpected end of input, expected {expected}"))),
        }
    }

    /// Parse a complete expression, rejecting trailing tokens
    pub fn parse_complete(&mut self) -> Result<Expr> {
        let expr = self.parse_expr()?;
        match self.peek() {
            None => Ok(expr),
            Some(token) => Err(self.error(format!("unexpected {token} after expression"))),
        }
    }

    /// Parse `;`-separated statements up to the end of input
    pub fn parse_program(&mut self) -> Result<Vec<Statement>> {
        let mut statements = Vec::new();
        loop {
            while self.peek() == Some(&Token::Semicolon) {
                self.consume();
            }
            if self.peek().is_none() {
                break;
            }
            statements.push(self.parse_statement()?);
            match self.peek() {
                None | Some(Token::Semicolon) => {}
                Some(token) => return Err(self.error(format!("unexpected {token} after statement"))),
            }
        }

        if statements.is_empty() {
            return Err(self.error("empty program"));
        }
        Ok(statements)
    }

    fn parse_statement(&mut self) -> Result<Statement> {
        if self.peek() != Some(&Token::Let) {
            return self.parse_expr().map(Statement::Expr);
        }
        self.consume();
        let name = match self.peek() {
            Some(Token::Ident(name)) => name.clone(),
            Some(token) => return Err(self.error(format!("expected a name after 'let' but found {token}"))),
            None => return Err(self.error("unexpected end of input, expected a name after 'let'")),
        };
        self.consume();
        self.expect(Token::Assign)?;
        let value = self.parse_expr()?;
        Ok(Statement::Let { name, value })
    }

    fn parse_expr(&mut self) -> Result<Expr> {
        if let Some(params) = self.lambda_params() {
            return self.parse_lambda(params);
        }
        self.parse_comparison()
    }

    /// Detect a lambda head at the current position without consuming it
    fn lambda_params(&self) -> Option<Vec<String>> {
        match (self.peek(), self.peek_at(1)) {
            (Some(Token::Ident(name)), Some(Token::FatArrow)) => return Some(vec![name.clone()]),
            (Some(Token::LParen), _) => {}
            _ => return None,
        }

        let mut params = Vec::new();
        let mut offset = 1;
        if self.peek_at(offset) != Some(&Token::RParen) {
            loop {
                match self.peek_at(offset) {
                    Some(Token::Ident(name)) => params.push(name.clone()),
                    _ => return None,
                }
                offset += 1;
                match self.peek_at(offset) {
                    Some(Token::Comma) => offset += 1,
                    Some(Token::RParen) => break,
                    _ => return None,
                }
            }
        }

        (self.peek_at(offset + 1) == Some(&Token::FatArrow)).then_some(params)
    }

    fn parse_lambda(&mut self, params: Vec<String>) -> Result<Expr> {
        while self.peek() != Some(&Token::FatArrow) {
            self.consume();
        }
        self.expect(Token::FatArrow)?;
        let body = self.parse_expr()?;
        Ok(Expr::Lambda {
            params,
            body: Arc::new(body),
        })
    }

    fn parse_comparison(&mut self) -> Result<Expr> {
        let lhs = self.parse_additive()?;
        let op = match self.peek() {
            Some(Token::Lt) => BinaryOp::Lt,
            Some(Token::Le) => BinaryOp::Le,
            Some(Token::Gt) => BinaryOp::Gt,
            Some(Token::Ge) => BinaryOp::Ge,
            Some(Token::EqEq) => BinaryOp::Eq,
            Some(Token::Ne) => BinaryOp::Ne,
            _ => return Ok(lhs),
        };
        self.consume();
        let rhs = self.parse_additive()?;
        Ok(Expr::binary(op, lhs, rhs))
    }

    fn parse_additive(&mut self) -> Result<Expr> {
        let mut expr = self.parse_term()?;
        loop {
            let op = match self.peek() {
                Some(Token::Plus) => BinaryOp::Add,
                Some(Token::Minus) => BinaryOp::Sub,
                _ => return Ok(expr),
            };
            self.consume();
            expr = Expr::binary(op, expr, self.parse_term()?);
        }
    }

    fn parse_term(&mut self) -> Result<Expr> {
        let mut expr = self.parse_unary()?;
        loop {
            let op = match self.peek() {
                Some(Token::Star) => BinaryOp::Mul,
                Some(Token::Slash) => BinaryOp::Div,
                Some(Token::Percent) => BinaryOp::Mod,
                _ => return Ok(expr),
            };
            self.consume();
            expr = Expr::binary(op, expr, self.parse_unary()?);
        }
    }

    fn parse_unary(&mut self) -> Result<Expr> {
        if self.peek() == Some(&Token::Minus) {
            self.consume();
            return Ok(Expr::Neg(Box::new(self.parse_unary()?)));
        }
        self.parse_power()
    }

    fn parse_power(&mut self) -> Result<Expr> {
        let base = self.parse_primary()?;
        if self.peek() == Some(&Token::Caret) {
            self.consume();
            let exponent = self.parse_unary()?;
            return Ok(Expr::binary(BinaryOp::Pow, base, exponent));
        }
        Ok(base)
    }

    fn parse_primary(&mut self) -> Result<Expr> {
        match self.consume() {
            Some(Token::Number(n)) => Ok(Expr::Number(n)),
            Some(Token::HandleRef(id)) => Ok(Expr::Handle(id)),
            Some(Token::Ident(name)) => {
                if self.peek() == Some(&Token::LParen) {
                    self.consume();
                    let args = self.parse_sequence(Token::RParen)?;
                    Ok(Expr::Call { name, args })
                } else {
                    Ok(Expr::Ident(name))
                }
            }
            Some(Token::LParen) => {
                let inner = self.parse_expr()?;
                self.expect(Token::RParen)?;
                Ok(inner)
            }
            Some(Token::LBracket) => Ok(Expr::List(self.parse_sequence(Token::RBracket)?)),
            Some(token) => {
                self.position -= 1;
                Err(self.error(format!("unexpected {token}")))
            }
            None => Err(self.error("unexpected end of input")),
        }
    }

    /// Comma separated expressions up to `close` (already past the opener)
    fn parse_sequence(&mut self, close: Token) -> Result<Vec<Expr>> {
        let mut items = Vec::new();
        if self.peek() == Some(&close) {
            self.consume();
            return Ok(items);
        }
        loop {
            items.push(self.parse_expr()?);
            match self.peek() {
                Some(Token::Comma) => {
                    self.consume();
                }
                _ => {
                    self.expect(close)?;
                    return Ok(items);
                }
            }
        }
    }
}

/// Parse expression text into an AST
pub fn parse(input: &str) -> Result<Expr> {
    let tokens = tokenize(input)?;
    Parser::new(tokens, input.len()).parse_complete()
}

/// Parse program text (statements separated by `;`)
pub fn parse_program(input: &str) -> Result<Vec<Statement>> {
    let tokens = tokenize(input)?;
    Parser::new(tokens, input.len()).parse_program()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn num(n: f64) -> Expr {
        Expr::Number(n)
    }

    #[test]
    fn test_precedence() {
        let expr = parse("1 + 2 * 3").unwrap();
        assert_eq!(
            expr,
            Expr::binary(BinaryOp::Add, num(1.0), Expr::binary(BinaryOp::Mul, num(2.0), num(3.0)))
        );
    }

    #[test]
    fn test_power_binds_tighter_than_negation() {
        let expr = parse("-2^2").unwrap();
        assert_eq!(expr, Expr::Neg(Box::new(Expr::binary(BinaryOp::Pow, num(2.0), num(2.0)))));
        // right associative
        let expr = parse("2^3^2").unwrap();
        assert_eq!(
            expr,
            Expr::binary(BinaryOp::Pow, num(2.0), Expr::binary(BinaryOp::Pow, num(3.0), num(2.0)))
        );
    }

    #[test]
    fn test_lambdas() {
        let single = parse("x => x * 2").unwrap();
        assert!(matches!(single, Expr::Lambda { ref params, .. } if params == &["x".to_string()]));

        let pair = parse("(acc, x) => acc + x").unwrap();
        assert!(matches!(pair, Expr::Lambda { ref params, .. } if params.len() == 2));

        // a parenthesized expression is not a lambda
        assert_eq!(parse("(x)").unwrap(), Expr::Ident("x".to_string()));
    }

    #[test]
    fn test_nested_list() {
        let expr = parse("[[1, 2], [3, 4]]").unwrap();
        assert_eq!(
            expr,
            Expr::List(vec![Expr::List(vec![num(1.0), num(2.0)]), Expr::List(vec![num(3.0), num(4.0)])])
        );
        assert_eq!(parse("[]").unwrap(), Expr::List(vec![]));
    }

    #[test]
    fn test_call_with_handle_and_lambda() {
        let expr = parse("map(x => x + 1, $4)").unwrap();
        let Expr::Call { name, args } = expr else {
            panic!("expected a call");
        };
        assert_eq!(name, "map");
        assert_eq!(args.len(), 2);
        assert_eq!(args[1], Expr::Handle(4));
    }

    #[test]
    fn test_program_statements() {
        let program = parse_program("let k = 3; map(x => x * k, $1);").unwrap();
        assert_eq!(program.len(), 2);
        assert_eq!(
            program[0],
            Statement::Let {
                name: "k".to_string(),
                value: num(3.0)
            }
        );
        assert!(matches!(program[1], Statement::Expr(Expr::Call { .. })));

        assert_eq!(parse_program("1 + 1").unwrap(), vec![Statement::Expr(parse("1 + 1").unwrap())]);
    }

    #[test]
    fn test_program_errors() {
        assert!(matches!(parse_program(""), Err(EngineError::Parse { position: 0, .. })));
        assert!(matches!(parse_program(" ; "), Err(EngineError::Parse { .. })));
        assert!(matches!(parse_program("let = 2"), Err(EngineError::Parse { position: 4, .. })));
        assert!(matches!(parse_program("let x 2"), Err(EngineError::Parse { position: 6, .. })));
        assert!(matches!(parse_program("1 2"), Err(EngineError::Parse { position: 2, .. })));
        // `let` is only a statement
        assert!(parse("let x = 1").is_err());
    }

    #[test]
    fn test_errors_carry_positions() {
        let err = parse("1 +").unwrap_err();
        assert!(matches!(err, EngineError::Parse { position: 3, .. }));
        let err = parse("(1, 2").unwrap_err();
        assert!(matches!(err, EngineError::Parse { .. }));
        let err = parse("1 2").unwrap_err();
        assert!(matches!(err, EngineError::Parse { position: 2, .. }));
    }
}
