use thiserror::Error;

use crate::ast::NodeId;

/// The tree does not satisfy a precondition of the code generator.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LoweringError {
    #[error("Malformed tree at node {node} ({kind}): expected {expected}")]
    Malformed {
        node: NodeId,
        kind: String,
        expected: &'static str,
    },
    #[error("Node {node} ({kind}) has no {side} child: expected {expected}")]
    MissingChild {
        node: NodeId,
        kind: String,
        side: &'static str,
        expected: &'static str,
    },
    #[error("Variable '{name}' has no slot in function '{function}'")]
    UnboundVariable { name: String, function: String },
    #[error("Function '{function}' needs {needed} frame slots, but frames hold {frame_size}")]
    FrameOverflow {
        function: String,
        needed: usize,
        frame_size: usize,
    },
    #[error(
        "Function '{function}' has {count} parameters, but only {registers} argument registers are configured"
    )]
    TooManyParameters {
        function: String,
        count: usize,
        registers: usize,
    },
    #[error(
        "Call to '{function}' passes {count} arguments, but only {registers} argument registers are configured"
    )]
    TooManyArguments {
        function: String,
        count: usize,
        registers: usize,
    },
    #[error("Name index {index} is not in the variable table")]
    UnknownName { index: usize },
}

pub type LoweringResult<T> = Result<T, LoweringError>;
