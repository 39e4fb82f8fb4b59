//! Hand-rolled scanner producing a flat token stream with byte-offset spans.
//!
//! Comments start with `//` and run to end of line; they are discarded
//! before tokenization rather than modeled as a token kind.

use constellation_core::Span;

use crate::error::LexError;
use crate::token::{keyword, Token, TokenKind};

pub struct Lexer<'a> {
    src: &'a str,
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(src: &'a str) -> Self {
        Lexer {
            src,
            bytes: src.as_bytes(),
            pos: 0,
        }
    }

    /// Tokenizes the entire source, collecting every lex error rather than
    /// stopping at the first one. On success the returned stream always
    /// ends with a single `TokenKind::Eof`.
    pub fn tokenize(mut self) -> (Vec<Token>, Vec<LexError>) {
        let mut tokens = Vec::new();
        let mut errors = Vec::new();
        loop {
            self.skip_trivia();
            let start = self.pos;
            let Some(c) = self.peek() else {
                tokens.push(Token::new(TokenKind::Eof, Span::new(start as u32, start as u32)));
                break;
            };
            match self.scan_one(c, start) {
                Ok(tok) => tokens.push(tok),
                Err(e) => {
                    errors.push(e);
                    // Re-sync by consuming at least one byte.
                    if self.pos == start {
                        self.pos += 1;
                    }
                }
            }
        }
        (tokens, errors)
    }

    fn peek(&self) -> Option<char> {
        self.src[self.pos..].chars().next()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.src[self.pos..].chars().nth(offset)
    }

    fn advance(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn skip_trivia(&mut self) {
        loop {
            match self.peek() {
                Some(c) if c.is_whitespace() => {
                    self.advance();
                }
                Some('/') if self.peek_at(1) == Some('/') => {
                    while let Some(c) = self.peek() {
                        if c == '\n' {
                            break;
                        }
                        self.advance();
                    }
                }
                _ => break,
            }
        }
    }

    fn scan_one(&mut self, c: char, start: usize) -> Result<Token, LexError> {
        let kind = match c {
            '(' => {
                self.advance();
                TokenKind::LParen
            }
            ')' => {
                self.advance();
                TokenKind::RParen
            }
            '{' => {
                self.advance();
                TokenKind::LBrace
            }
            '}' => {
                self.advance();
                TokenKind::RBrace
            }
            '[' => {
                self.advance();
                TokenKind::LBracket
            }
            ']' => {
                self.advance();
                TokenKind::RBracket
            }
            ',' => {
                self.advance();
                TokenKind::Comma
            }
            ':' => {
                self.advance();
                TokenKind::Colon
            }
            ';' => {
                self.advance();
                TokenKind::Semicolon
            }
            '.' => {
                self.advance();
                TokenKind::Dot
            }
            '|' => {
                self.advance();
                TokenKind::Pipe
            }
            '@' => {
                self.advance();
                TokenKind::At
            }
            '+' => {
                self.advance();
                TokenKind::Plus
            }
            '=' => {
                self.advance();
                if self.peek() == Some('>') {
                    self.advance();
                    TokenKind::FatArrow
                } else {
                    TokenKind::Equals
                }
            }
            '-' => {
                self.advance();
                if self.peek() == Some('>') {
                    self.advance();
                    TokenKind::Arrow
                } else {
                    return Err(LexError::UnexpectedChar {
                        found: '-',
                        span: self.span_from(start),
                    });
                }
            }
            '?' => {
                self.advance();
                if self.peek() == Some('?') {
                    self.advance();
                    TokenKind::QuestionQuestion
                } else {
                    TokenKind::QuestionMark
                }
            }
            '<' => {
                self.advance();
                TokenKind::Lt
            }
            '>' => {
                self.advance();
                TokenKind::Gt
            }
            '"' => return self.scan_string(start),
            c if c.is_ascii_digit() => return self.scan_number(start),
            c if is_ident_start(c) => return Ok(self.scan_ident(start)),
            other => {
                self.advance();
                return Err(LexError::UnexpectedChar {
                    found: other,
                    span: self.span_from(start),
                });
            }
        };
        Ok(Token::new(kind, self.span_from(start)))
    }

    fn span_from(&self, start: usize) -> Span {
        Span::new(start as u32, self.pos as u32)
    }

    fn scan_ident(&mut self, start: usize) -> Token {
        while let Some(c) = self.peek() {
            if is_ident_continue(c) {
                self.advance();
            } else {
                break;
            }
        }
        let text = &self.src[start..self.pos];
        let kind = keyword(text).unwrap_or_else(|| TokenKind::Ident(text.to_string()));
        Token::new(kind, self.span_from(start))
    }

    fn scan_number(&mut self, start: usize) -> Result<Token, LexError> {
        while let Some(c) = self.peek() {
            if c.is_ascii_digit() {
                self.advance();
            } else {
                break;
            }
        }
        let mut is_float = false;
        if self.peek() == Some('.') && self.peek_at(1).is_some_and(|c| c.is_ascii_digit()) {
            is_float = true;
            self.advance();
            while let Some(c) = self.peek() {
                if c.is_ascii_digit() {
                    self.advance();
                } else {
                    break;
                }
            }
        }
        let text = &self.src[start..self.pos];
        let kind = if is_float {
            text.parse::<f64>()
                .map(TokenKind::FloatLit)
                .map_err(|_| LexError::InvalidNumber {
                    text: text.to_string(),
                    span: self.span_from(start),
                })?
        } else {
            text.parse::<i64>()
                .map(TokenKind::IntLit)
                .map_err(|_| LexError::InvalidNumber {
                    text: text.to_string(),
                    span: self.span_from(start),
                })?
        };
        Ok(Token::new(kind, self.span_from(start)))
    }

    /// Scans a `"..."` literal. `${...}` holes are captured as raw source
    /// text (re-lexed and parsed by the parser as nested expressions) so the
    /// lexer itself stays free of recursive-descent grammar knowledge.
    fn scan_string(&mut self, start: usize) -> Result<Token, LexError> {
        self.advance(); // opening quote
        let mut parts = vec![String::new()];
        let mut holes = Vec::new();
        loop {
            match self.peek() {
                None => {
                    return Err(LexError::UnterminatedString {
                        span: self.span_from(start),
                    })
                }
                Some('"') => {
                    self.advance();
                    break;
                }
                Some('\\') => {
                    self.advance();
                    match self.advance() {
                        Some('n') => parts.last_mut().unwrap().push('\n'),
                        Some('t') => parts.last_mut().unwrap().push('\t'),
                        Some('"') => parts.last_mut().unwrap().push('"'),
                        Some('\\') => parts.last_mut().unwrap().push('\\'),
                        Some('$') => parts.last_mut().unwrap().push('$'),
                        Some(other) => parts.last_mut().unwrap().push(other),
                        None => {
                            return Err(LexError::UnterminatedString {
                                span: self.span_from(start),
                            })
                        }
                    }
                }
                Some('$') if self.peek_at(1) == Some('{') => {
                    let hole_start = self.pos;
                    self.advance();
                    self.advance();
                    let mut depth = 1usize;
                    let expr_start = self.pos;
                    loop {
                        match self.peek() {
                            Some('{') => {
                                depth += 1;
                                self.advance();
                            }
                            Some('}') => {
                                depth -= 1;
                                if depth == 0 {
                                    break;
                                }
                                self.advance();
                            }
                            Some(_) => {
                                self.advance();
                            }
                            None => {
                                return Err(LexError::UnterminatedInterpolation {
                                    span: self.span_from(hole_start),
                                })
                            }
                        }
                    }
                    holes.push(self.src[expr_start..self.pos].to_string());
                    self.advance(); // closing '}'
                    parts.push(String::new());
                }
                Some(c) => {
                    parts.last_mut().unwrap().push(c);
                    self.advance();
                }
            }
        }
        let kind = if holes.is_empty() {
            TokenKind::StringLit(parts.into_iter().next().unwrap_or_default())
        } else {
            TokenKind::InterpolatedStringLit { parts, holes }
        };
        Ok(Token::new(kind, self.span_from(start)))
    }
}

fn is_ident_start(c: char) -> bool {
    c.is_alphabetic() || c == '_'
}

fn is_ident_continue(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<TokenKind> {
        let (tokens, errors) = Lexer::new(src).tokenize();
        assert!(errors.is_empty(), "unexpected lex errors: {errors:?}");
        tokens.into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn scans_declaration_keywords() {
        assert_eq!(
            kinds("in out type use as"),
            vec![
                TokenKind::In,
                TokenKind::Out,
                TokenKind::Type,
                TokenKind::Use,
                TokenKind::As,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn scans_integer_and_float() {
        assert_eq!(
            kinds("42 3.5"),
            vec![TokenKind::IntLit(42), TokenKind::FloatLit(3.5), TokenKind::Eof]
        );
    }

    #[test]
    fn scans_plain_string() {
        assert_eq!(
            kinds("\"hello\""),
            vec![TokenKind::StringLit("hello".to_string()), TokenKind::Eof]
        );
    }

    #[test]
    fn scans_interpolated_string_with_two_holes() {
        let toks = kinds("\"a${x}b${y.z}c\"");
        match &toks[0] {
            TokenKind::InterpolatedStringLit { parts, holes } => {
                assert_eq!(parts, &vec!["a".to_string(), "b".to_string(), "c".to_string()]);
                assert_eq!(holes, &vec!["x".to_string(), "y.z".to_string()]);
            }
            other => panic!("expected interpolated string, got {other:?}"),
        }
    }

    #[test]
    fn reports_unterminated_string() {
        let (_, errors) = Lexer::new("\"abc").tokenize();
        assert!(matches!(errors[0], LexError::UnterminatedString { .. }));
    }

    #[test]
    fn arrow_and_fat_arrow_are_distinct() {
        assert_eq!(kinds("->"), vec![TokenKind::Arrow, TokenKind::Eof]);
        assert_eq!(kinds("=>"), vec![TokenKind::FatArrow, TokenKind::Eof]);
    }

    #[test]
    fn skips_line_comments() {
        assert_eq!(
            kinds("in // a comment\nout"),
            vec![TokenKind::In, TokenKind::Out, TokenKind::Eof]
        );
    }
}
