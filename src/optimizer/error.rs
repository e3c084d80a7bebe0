use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ArithmeticError {
    #[error("Division by zero at offset {position}")]
    DivisionByZero { position: usize },
    #[error("'{op}' is undefined for {operand} (offset {position})")]
    Domain {
        op: &'static str,
        operand: f64,
        position: usize,
    },
    #[error("'{op}' produced a non-finite value at offset {position}")]
    NonFinite { op: &'static str, position: usize },
}

pub type OptimizeResult<T> = Result<T, ArithmeticError>;
