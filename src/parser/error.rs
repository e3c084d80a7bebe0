use thiserror::Error;

use crate::symbols::CapacityError;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SyntaxError {
    #[error(
        "Syntax error in {rule} at token {cursor} (offset {position}): expected {expected}, found {found}"
    )]
    Unexpected {
        rule: &'static str,
        cursor: usize,
        position: usize,
        expected: String,
        found: String,
    },
    #[error("Undeclared variable '{name}' in {rule} at offset {position}")]
    Undeclared {
        rule: &'static str,
        name: String,
        position: usize,
    },
    #[error("Function '{name}' is declared twice (offset {position})")]
    DuplicateFunction { name: String, position: usize },
    #[error("Parameter '{name}' is declared twice (offset {position})")]
    DuplicateParameter { name: String, position: usize },
    #[error("Call to undeclared function '{name}' at offset {position}")]
    UndeclaredFunction { name: String, position: usize },
    #[error("Function '{name}' expects {expected} arguments, got {found} (offset {position})")]
    ArityMismatch {
        name: String,
        expected: usize,
        found: usize,
        position: usize,
    },
    #[error(transparent)]
    Capacity(#[from] CapacityError),
}

pub type ParseResult<T> = Result<T, SyntaxError>;
