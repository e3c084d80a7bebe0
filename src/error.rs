use thiserror::Error;

use crate::backend::LoweringError;
use crate::config::ConfigError;
use crate::lexer::LexError;
use crate::optimizer::ArithmeticError;
use crate::parser::SyntaxError;
use crate::symbols::CapacityError;
use crate::tree_text::TreeTextError;

/// Any failure that aborts processing of a compiled unit.
#[derive(Debug, Error)]
pub enum CompileError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Lex(#[from] LexError),
    #[error(transparent)]
    Syntax(#[from] SyntaxError),
    #[error(transparent)]
    Arithmetic(#[from] ArithmeticError),
    #[error(transparent)]
    Lowering(#[from] LoweringError),
    #[error(transparent)]
    TreeText(#[from] TreeTextError),
}

impl From<CapacityError> for CompileError {
    fn from(err: CapacityError) -> Self {
        CompileError::Lex(LexError::Capacity(err))
    }
}

impl CompileError {
    /// Pipeline stage that produced the error.
    pub fn stage(&self) -> &'static str {
        match self {
            CompileError::Config(_) => "config",
            CompileError::Lex(_) | CompileError::Syntax(_) => "frontend",
            CompileError::TreeText(_) => "tree text",
            CompileError::Arithmetic(_) => "middleend",
            CompileError::Lowering(_) => "backend",
        }
    }
}
