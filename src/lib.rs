pub mod ast;
pub mod backend;
pub mod config;
pub mod error;
pub mod lexer;
pub mod optimizer;
pub mod parser;
pub mod pipeline;
pub mod symbols;
pub mod tree_text;

pub use config::Config;
pub use error::CompileError;
pub use pipeline::{Unit, build, compile_unit, parse_expression};
