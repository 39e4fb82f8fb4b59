//! Lexing and parsing errors, accumulated rather than returned on first
//! failure: §4.2 requires the parser to surface every syntax error found in
//! a source file, not just the first one, and to never hand back a partial
//! AST alongside them.

use constellation_core::Span;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Error, Serialize, Deserialize, PartialEq)]
pub enum LexError {
    #[error("unexpected character '{found}' at {span:?}")]
    UnexpectedChar { found: char, span: Span },
    #[error("unterminated string literal starting at {span:?}")]
    UnterminatedString { span: Span },
    #[error("invalid numeric literal '{text}' at {span:?}")]
    InvalidNumber { text: String, span: Span },
    #[error("unterminated interpolation hole '${{' at {span:?}")]
    UnterminatedInterpolation { span: Span },
}

#[derive(Debug, Clone, Error, Serialize, Deserialize, PartialEq)]
pub enum ParseError {
    #[error("lex error: {0}")]
    Lex(#[from] LexError),
    #[error("expected {expected} but found {found} at {span:?}")]
    UnexpectedToken {
        expected: String,
        found: String,
        span: Span,
    },
    #[error("unexpected end of input, expected {expected}")]
    UnexpectedEof { expected: String },
    #[error("duplicate declaration of '{name}' at {span:?}")]
    DuplicateDeclaration { name: String, span: Span },
}
