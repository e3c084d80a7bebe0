use thiserror::Error;

use crate::symbols::CapacityError;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LexError {
    #[error("Unexpected character '{character}' at line {line}, column {column}")]
    UnexpectedCharacter {
        character: char,
        line: usize,
        column: usize,
    },
    #[error("Incomplete operator '{glyph}' at line {line}, column {column}: expected '='")]
    IncompleteOperator {
        glyph: char,
        line: usize,
        column: usize,
    },
    #[error("Integer literal '{literal}' overflows at line {line}, column {column}")]
    IntegerOverflow {
        literal: String,
        line: usize,
        column: usize,
    },
    #[error("Identifier '{name}' is longer than {limit} characters at line {line}, column {column}")]
    IdentifierTooLong {
        name: String,
        limit: usize,
        line: usize,
        column: usize,
    },
    #[error(transparent)]
    Capacity(#[from] CapacityError),
}

pub type LexResult<T> = Result<T, LexError>;
