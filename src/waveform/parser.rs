//! Parser turning a token stream into a [`SourceCall`].
//!
//! Grammar:
//! ```text
//! source := NUMBER | IDENT [ "(" [arg] { "," [arg] } [")"] ]
//! arg    := NUMBER
//! ```
//! Empty arguments (`pulse(0,,1m)`) are kept as `None` so the waveform
//! defaults apply.

use super::lexer::{Lexer, Token, TokenKind};
use super::number::parse_number;
use crate::error::{NodalError, Result};

/// A parsed but not yet interpreted source description.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceCall {
    /// Lowercase function name, `dc` for a bare number
    pub function: String,
    /// Positional arguments; `None` where the argument was left empty
    pub args: Vec<Option<f64>>,
}

/// Parse a source description.
pub fn parse(input: &str) -> Result<SourceCall> {
    let tokens = Lexer::new(input).tokenize()?;
    Parser {
        input,
        tokens,
        pos: 0,
    }
    .parse_source()
}

struct Parser<'a> {
    input: &'a str,
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser<'_> {
    fn peek(&self) -> TokenKind {
        self.tokens
            .get(self.pos)
            .map(|t| t.kind)
            .unwrap_or(TokenKind::Eof)
    }

    fn advance(&mut self) -> Option<&Token> {
        let token = self.tokens.get(self.pos);
        self.pos += 1;
        token
    }

    fn error(&self, message: impl Into<String>) -> NodalError {
        NodalError::invalid_source(self.input, message)
    }

    fn number(&self, token: &Token) -> Result<f64> {
        parse_number(&token.text).ok_or_else(|| {
            self.error(format!(
                "'{}' at column {} is not a number",
                token.text, token.column
            ))
        })
    }

    fn parse_source(&mut self) -> Result<SourceCall> {
        let call = match self.peek() {
            TokenKind::Number => {
                let token = self.advance().cloned();
                let value = match token {
                    Some(t) => self.number(&t)?,
                    None => 0.0,
                };
                SourceCall {
                    function: "dc".to_string(),
                    args: vec![Some(value)],
                }
            }
            TokenKind::Identifier => {
                let function = self
                    .advance()
                    .map(|t| t.text.to_lowercase())
                    .unwrap_or_default();
                let args = if self.peek() == TokenKind::OpenParen {
                    self.advance();
                    self.parse_args()?
                } else {
                    Vec::new()
                };
                SourceCall { function, args }
            }
            TokenKind::Eof => {
                return Err(self.error("empty source description"));
            }
            _ => {
                return Err(self.error("expected a number or a function name"));
            }
        };

        if self.peek() != TokenKind::Eof {
            return Err(self.error("unexpected text after source description"));
        }
        Ok(call)
    }

    /// Parse the argument list after '('. A missing ')' at the end of input
    /// is tolerated.
    fn parse_args(&mut self) -> Result<Vec<Option<f64>>> {
        let mut args = Vec::new();
        let mut current: Option<f64> = None;
        let mut seen_any = false;

        loop {
            match self.peek() {
                TokenKind::Number => {
                    if current.is_some() {
                        return Err(self.error("missing ',' between arguments"));
                    }
                    let token = self.advance().cloned();
                    if let Some(t) = token {
                        current = Some(self.number(&t)?);
                    }
                    seen_any = true;
                }
                TokenKind::Comma => {
                    self.advance();
                    args.push(current.take());
                    seen_any = true;
                }
                TokenKind::CloseParen | TokenKind::Eof => {
                    if self.peek() == TokenKind::CloseParen {
                        self.advance();
                    }
                    if seen_any {
                        args.push(current.take());
                    }
                    return Ok(args);
                }
                TokenKind::Identifier | TokenKind::OpenParen => {
                    return Err(self.error("arguments must be numbers"));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bare_number_is_dc() {
        let call = parse("5V").unwrap();
        assert_eq!(call.function, "dc");
        assert_eq!(call.args, vec![Some(5.0)]);
    }

    #[test]
    fn test_function_with_empty_arguments() {
        let call = parse("Pulse(0,,1m)").unwrap();
        assert_eq!(call.function, "pulse");
        assert_eq!(call.args, vec![Some(0.0), None, Some(1e-3)]);
    }

    #[test]
    fn test_no_arguments() {
        assert!(parse("sin()").unwrap().args.is_empty());
        assert!(parse("sin").unwrap().args.is_empty());
    }

    #[test]
    fn test_missing_close_paren_is_tolerated() {
        let call = parse("step(0, 1").unwrap();
        assert_eq!(call.args, vec![Some(0.0), Some(1.0)]);
    }

    #[test]
    fn test_errors() {
        assert!(parse("").is_err());
        assert!(parse("sin(0 1)").is_err());
        assert!(parse("sin(a)").is_err());
        assert!(parse("sin(1) 2").is_err());
    }
}
