use crate::ast::{Ast, NodeId};
use crate::backend;
use crate::config::{Config, Limits};
use crate::error::CompileError;
use crate::lexer;
use crate::optimizer::{self, OptimizationReport};
use crate::parser::Parser;
use crate::symbols::{FunctionTable, SymbolTable};

/// Arena and tables of one compiled unit. Nothing in a unit refers to another
/// unit, so independent units may be processed on separate threads.
#[derive(Debug, Clone)]
pub struct Unit {
    pub ast: Ast,
    pub names: SymbolTable,
    pub functions: FunctionTable,
}

impl Unit {
    pub fn new(limits: &Limits) -> Self {
        Self::with_capacity(limits, 0)
    }

    pub fn with_capacity(limits: &Limits, nodes: usize) -> Self {
        Self {
            ast: Ast::with_capacity(nodes),
            names: SymbolTable::new("variables", limits.max_variables),
            functions: FunctionTable::new(limits.max_functions),
        }
    }
}

/// Lexes and parses a whole program.
pub fn compile_unit(source: &str, config: &Config) -> Result<Unit, CompileError> {
    let (mut unit, tokens) = load(source, config)?;
    Parser::new(&mut unit, tokens, config.limits.max_locals).parse_program()?;
    Ok(unit)
}

/// Lexes and parses a single expression. Every identifier in it is treated as
/// a declared free variable.
pub fn parse_expression(source: &str, config: &Config) -> Result<Unit, CompileError> {
    let (mut unit, tokens) = load(source, config)?;
    unit.names.mark_all_initialized();
    Parser::new(&mut unit, tokens, config.limits.max_locals).parse_expression()?;
    Ok(unit)
}

fn load(source: &str, config: &Config) -> Result<(Unit, Vec<NodeId>), CompileError> {
    let tokens = lexer::tokenize(source, config)?;
    // Synthetic list cells roughly double the node count of a program.
    let mut unit = Unit::with_capacity(&config.limits, tokens.len() * 2);
    let ids = lexer::load_tokens(&tokens, &mut unit.ast, &mut unit.names)?;
    Ok((unit, ids))
}

pub fn optimize(unit: &mut Unit) -> Result<OptimizationReport, CompileError> {
    Ok(optimizer::optimize(&mut unit.ast)?)
}

pub fn generate(unit: &Unit, config: &Config) -> Result<String, CompileError> {
    Ok(backend::generate(unit, &config.backend)?)
}

/// Runs every stage in process and returns the assembly text.
pub fn build(source: &str, config: &Config, optimize: bool) -> Result<String, CompileError> {
    let mut unit = compile_unit(source, config)?;
    if optimize {
        self::optimize(&mut unit)?;
    }
    generate(&unit, config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;

    #[test]
    fn build_reports_the_failing_stage() {
        let config = Config::default();
        let err = build("decl main() { var a = 5 / 0; }; $", &config, true)
            .expect_err("division by zero");
        assert_eq!(err.stage(), "middleend");
        assert!(err.to_string().contains("Division by zero"));

        // Without the optimizer the division reaches the backend untouched.
        let asm = build("decl main() { var a = 5 / 0; }; $", &config, false)
            .expect("unoptimized build");
        assert!(asm.contains("push 5\npush 0\ndiv\n"));
    }

    #[test]
    fn identifiers_exhaust_the_variable_table() {
        let mut config = Config::default();
        config.limits.max_variables = 2;
        let err = compile_unit("decl main() { var a = b + c; }; $", &config)
            .expect_err("three names");
        assert!(matches!(err, CompileError::Lex(_)));
        assert!(err.to_string().contains("capacity 2 exceeded by 'b'"), "{err}");
    }

    #[test]
    fn long_statement_lists_compile() {
        let mut source = String::from("decl main() { var a = 1; ");
        for _ in 0..40_000 {
            source.push_str("a = a * 1 + 0; ");
        }
        source.push_str("print a; }; $");
        let config = Config::default();

        let mut unit = compile_unit(&source, &config).expect("parse should succeed");
        let report = optimize(&mut unit).expect("nothing to divide by zero");
        assert_eq!(report.simplified, 80_000);
        assert_eq!(report.passes, 2);
        unit.ast.check_links().expect("links stay consistent");

        let sexpr = unit.ast.to_sexpr(unit.ast.root(), &unit.names);
        assert_eq!(sexpr.matches("(= a a)").count(), 40_000);

        let asm = generate(&unit, &config).expect("lowering should succeed");
        assert_eq!(asm.matches("push [rax+0]\npop [rax+0]\n").count(), 40_000);
    }

    #[test]
    fn optimized_build_is_deterministic() {
        let source = indoc! {"
            decl main() {
                var a = 1 + 2;
                if (a == 3) a = 0; else a = 1;
                if (a != 0) a = 2;
                print a;
            };
        "};
        let config = Config::default();
        let first = build(source, &config, true).expect("build");
        let second = build(source, &config, true).expect("build");
        assert_eq!(first, second);
    }
}
