//! Lexer (tokenizer) for source descriptions such as `pulse(0, 5, 1m)`.

use crate::error::{NodalError, Result};

/// A token produced by the lexer.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    /// The kind of token
    pub kind: TokenKind,
    /// The token's text
    pub text: String,
    /// Column number (1-indexed)
    pub column: usize,
}

/// Token types in a source description.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    /// A function name (`sin`, `pwl_repeating`, ...)
    Identifier,
    /// A numeric argument, possibly with a scale suffix
    Number,
    /// Open parenthesis '('
    OpenParen,
    /// Close parenthesis ')'
    CloseParen,
    /// Argument separator ','
    Comma,
    /// End of input
    Eof,
}

/// Lexer for tokenizing source descriptions.
pub struct Lexer<'a> {
    input: &'a str,
    chars: std::iter::Peekable<std::str::CharIndices<'a>>,
    column: usize,
}

impl<'a> Lexer<'a> {
    /// Create a new lexer for the given input.
    pub fn new(input: &'a str) -> Self {
        Self {
            input,
            chars: input.char_indices().peekable(),
            column: 1,
        }
    }

    /// Tokenize the whole input, ending with an `Eof` token.
    pub fn tokenize(mut self) -> Result<Vec<Token>> {
        let mut tokens = Vec::new();
        loop {
            let token = self.next_token()?;
            let done = token.kind == TokenKind::Eof;
            tokens.push(token);
            if done {
                return Ok(tokens);
            }
        }
    }

    /// Get the next token.
    pub fn next_token(&mut self) -> Result<Token> {
        self.skip_whitespace();

        let ch = match self.chars.peek() {
            Some(&(_, ch)) => ch,
            None => {
                return Ok(Token {
                    kind: TokenKind::Eof,
                    text: String::new(),
                    column: self.column,
                });
            }
        };

        let column = self.column;
        let single = |kind: TokenKind| Token {
            kind,
            text: ch.to_string(),
            column,
        };

        let token = match ch {
            '(' => {
                self.advance();
                single(TokenKind::OpenParen)
            }
            ')' => {
                self.advance();
                single(TokenKind::CloseParen)
            }
            ',' => {
                self.advance();
                single(TokenKind::Comma)
            }
            '-' | '+' | '.' | '0'..='9' => Token {
                kind: TokenKind::Number,
                text: self.read_word(),
                column,
            },
            _ if ch.is_alphabetic() || ch == '_' => Token {
                kind: TokenKind::Identifier,
                text: self.read_word(),
                column,
            },
            _ => {
                return Err(NodalError::invalid_source(
                    self.input,
                    format!("unexpected character '{}' at column {}", ch, column),
                ));
            }
        };

        Ok(token)
    }

    fn advance(&mut self) -> Option<char> {
        let (_, ch) = self.chars.next()?;
        self.column += 1;
        Some(ch)
    }

    fn skip_whitespace(&mut self) {
        while let Some(&(_, ch)) = self.chars.peek() {
            if ch.is_whitespace() {
                self.advance();
            } else {
                break;
            }
        }
    }

    /// Read up to the next delimiter. Numbers keep their suffix text
    /// (`10u`, `1kHz`) for the number parser to interpret.
    fn read_word(&mut self) -> String {
        let mut text = String::new();
        while let Some(&(_, ch)) = self.chars.peek() {
            if ch == '(' || ch == ')' || ch == ',' || ch.is_whitespace() {
                break;
            }
            text.push(ch);
            self.advance();
        }
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(input: &str) -> Vec<TokenKind> {
        Lexer::new(input)
            .tokenize()
            .unwrap()
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn test_function_call() {
        assert_eq!(
            kinds("sin(0, 1k)"),
            vec![
                TokenKind::Identifier,
                TokenKind::OpenParen,
                TokenKind::Number,
                TokenKind::Comma,
                TokenKind::Number,
                TokenKind::CloseParen,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_number_keeps_suffix() {
        let tokens = Lexer::new("  -1.5mV").tokenize().unwrap();
        assert_eq!(tokens[0].kind, TokenKind::Number);
        assert_eq!(tokens[0].text, "-1.5mV");
        assert_eq!(tokens[0].column, 3);
    }

    #[test]
    fn test_unexpected_character() {
        let err = Lexer::new("sin(0; 1)").tokenize().unwrap_err();
        assert!(matches!(err, NodalError::InvalidSource { .. }));
    }
}
