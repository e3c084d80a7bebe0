mod error;

use std::f64::consts::FRAC_PI_2;

use crate::ast::{Ast, NodeId, NodeKind, Op, Side};

pub use error::{ArithmeticError, OptimizeResult};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OptimizationReport {
    /// Full fold + simplify passes, including the final one that changed
    /// nothing.
    pub passes: usize,
    /// Operator nodes replaced by their computed value.
    pub folded: usize,
    /// Identities removed by splicing or collapsing to zero.
    pub simplified: usize,
}

/// Rewrites `ast` to its fixed point. The root may change.
///
/// An arithmetic error aborts the whole run; the tree is then left in a
/// consistent but partially rewritten state.
pub fn optimize(ast: &mut Ast) -> OptimizeResult<OptimizationReport> {
    Optimizer {
        ast,
        report: OptimizationReport::default(),
    }
    .run()
}

enum Rewrite {
    Keep(Side),
    Zero,
}

struct Optimizer<'a> {
    ast: &'a mut Ast,
    report: OptimizationReport,
}

impl Optimizer<'_> {
    fn run(mut self) -> OptimizeResult<OptimizationReport> {
        while let Some(root) = self.ast.root() {
            self.report.passes += 1;
            let folded = self.fold(root)?;
            // Folding keeps node identities, simplifying may replace the root.
            let simplified = self.simplify(root)?;
            if !folded && !simplified {
                break;
            }
        }
        debug_assert_eq!(self.ast.check_links(), Ok(()));
        Ok(self.report)
    }

    /// Postorder constant folding. Returns whether anything was folded.
    fn fold(&mut self, root: NodeId) -> OptimizeResult<bool> {
        let mut changed = false;
        for id in self.ast.postorder(root) {
            if let Some(value) = self.evaluate(id)? {
                self.ast.collapse_to_number(id, value);
                self.report.folded += 1;
                changed = true;
            }
        }
        Ok(changed)
    }

    fn evaluate(&self, id: NodeId) -> OptimizeResult<Option<f64>> {
        let node = self.ast.node(id);
        let NodeKind::Operator(op) = node.kind() else {
            return Ok(None);
        };
        let position = node.span().start;
        let left = node.left().and_then(|child| self.ast.number(child));
        match (node.left(), node.right()) {
            (Some(_), Some(right)) => match (left, self.ast.number(right)) {
                (Some(a), Some(b)) => binary(op, a, b, position),
                _ => Ok(None),
            },
            (Some(_), None) => match (op, left) {
                (Op::Add, Some(x)) => Ok(Some(x)),
                (Op::Sub, Some(x)) => Ok(Some(-x)),
                (op, Some(x)) => unary(op, x, position),
                _ => Ok(None),
            },
            _ => Ok(None),
        }
    }

    /// Postorder identity elimination. Returns whether anything changed.
    ///
    /// A rewrite only releases nodes below the rewritten one, all of which
    /// were visited before it.
    fn simplify(&mut self, root: NodeId) -> OptimizeResult<bool> {
        let mut changed = false;
        for id in self.ast.postorder(root) {
            changed |= self.simplify_node(id)?;
        }
        Ok(changed)
    }

    fn simplify_node(&mut self, id: NodeId) -> OptimizeResult<bool> {
        let node = self.ast.node(id);
        let (Some(op), Some(left), Some(right)) = (node.kind().operator(), node.left(), node.right())
        else {
            return Ok(false);
        };
        let position = node.span().start;
        let (l, r) = (self.ast.number(left), self.ast.number(right));

        let rewrite = match op {
            Op::Add if l == Some(0.0) => Rewrite::Keep(Side::Right),
            Op::Add | Op::Sub if r == Some(0.0) => Rewrite::Keep(Side::Left),
            Op::Mul if l == Some(0.0) || r == Some(0.0) => Rewrite::Zero,
            Op::Mul if l == Some(1.0) => Rewrite::Keep(Side::Right),
            Op::Mul if r == Some(1.0) => Rewrite::Keep(Side::Left),
            Op::Div if r == Some(0.0) => return Err(ArithmeticError::DivisionByZero { position }),
            Op::Div if l == Some(0.0) => Rewrite::Zero,
            Op::Div | Op::Pow if r == Some(1.0) => Rewrite::Keep(Side::Left),
            _ => return Ok(false),
        };
        match rewrite {
            Rewrite::Keep(side) => {
                self.ast.splice(id, side);
            }
            Rewrite::Zero => self.ast.collapse_to_number(id, 0.0),
        }
        self.report.simplified += 1;
        Ok(true)
    }
}

/// Value of a binary arithmetic operator, `None` for any other operator.
fn binary(op: Op, a: f64, b: f64, position: usize) -> OptimizeResult<Option<f64>> {
    let value = match op {
        Op::Add => a + b,
        Op::Sub => a - b,
        Op::Mul => a * b,
        Op::Div if b == 0.0 => return Err(ArithmeticError::DivisionByZero { position }),
        Op::Div => a / b,
        Op::Pow => a.powf(b),
        _ => return Ok(None),
    };
    finite(op, value, position).map(Some)
}

/// Value of a transcendental function, `None` for any other operator.
fn unary(op: Op, x: f64, position: usize) -> OptimizeResult<Option<f64>> {
    let domain = |defined: bool| {
        if defined {
            Ok(())
        } else {
            Err(ArithmeticError::Domain {
                op: op.spelling(),
                operand: x,
                position,
            })
        }
    };
    let value = match op {
        Op::Log => {
            domain(x > 0.0)?;
            x.log10()
        }
        Op::Ln => {
            domain(x > 0.0)?;
            x.ln()
        }
        Op::Exp => x.exp(),
        Op::Sin => x.sin(),
        Op::Cos => x.cos(),
        Op::Tg => x.tan(),
        Op::Ctg => {
            let tan = x.tan();
            domain(tan != 0.0)?;
            1.0 / tan
        }
        Op::Sh => x.sinh(),
        Op::Ch => x.cosh(),
        Op::Th => x.tanh(),
        Op::Cth => {
            domain(x != 0.0)?;
            1.0 / x.tanh()
        }
        Op::Arcsin => {
            domain((-1.0..=1.0).contains(&x))?;
            x.asin()
        }
        Op::Arccos => {
            domain((-1.0..=1.0).contains(&x))?;
            x.acos()
        }
        Op::Arctg => x.atan(),
        Op::Arcctg => FRAC_PI_2 - x.atan(),
        Op::Arcsh => x.asinh(),
        Op::Arcch => {
            domain(x >= 1.0)?;
            x.acosh()
        }
        Op::Arcth => {
            domain(x.abs() < 1.0)?;
            x.atanh()
        }
        Op::Arccth => {
            domain(x.abs() > 1.0)?;
            (1.0 / x).atanh()
        }
        _ => return Ok(None),
    };
    finite(op, value, position).map(Some)
}

fn finite(op: Op, value: f64, position: usize) -> OptimizeResult<f64> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(ArithmeticError::NonFinite {
            op: op.spelling(),
            position,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::pipeline::{Unit, compile_unit, parse_expression};
    use indoc::indoc;

    fn optimized(source: &str) -> (Unit, OptimizationReport) {
        let mut unit = parse_expression(source, &Config::default()).expect("parse should succeed");
        let report = optimize(&mut unit.ast).expect("optimize should succeed");
        unit.ast.check_links().expect("links stay consistent");
        (unit, report)
    }

    fn render(source: &str) -> String {
        let (unit, _) = optimized(source);
        unit.ast.to_sexpr(unit.ast.root(), &unit.names)
    }

    fn failure(source: &str) -> ArithmeticError {
        let mut unit = parse_expression(source, &Config::default()).expect("parse should succeed");
        optimize(&mut unit.ast).expect_err("optimize should fail")
    }

    #[test]
    fn folds_nested_constants() {
        assert_eq!(render("2 * 3 + 4 ^ 2 / 8"), "8");
        assert_eq!(render("-(2 + 3)"), "-5");
        assert_eq!(render("ln(1) + x"), "x");
    }

    #[test]
    fn identity_rules() {
        assert_eq!(render("x * 1 + 0"), "x");
        assert_eq!(render("1 * x"), "x");
        assert_eq!(render("x / 1"), "x");
        assert_eq!(render("x ^ 1"), "x");
        assert_eq!(render("x - 0"), "x");
        assert_eq!(render("0 / x"), "0");
        assert_eq!(render("x * 0 + y"), "y");
    }

    #[test]
    fn zero_minus_x_is_kept() {
        assert_eq!(render("0 - x"), "(- 0 x)");
    }

    #[test]
    fn root_replacement_leaves_no_stale_links() {
        let (unit, report) = optimized("0 + x");
        let root = unit.ast.root().expect("tree is not empty");
        assert_eq!(unit.ast.kind(root), NodeKind::Variable(0));
        assert_eq!(unit.ast.node(root).parent(), None);
        // The `+` node and the zero operand went back to the pool.
        assert_eq!(unit.ast.len() - unit.ast.live_count(), 2);
        assert_eq!(report.simplified, 1);
    }

    #[test]
    fn runs_to_a_fixed_point() {
        // `2 * 3` only appears once the first simplify pass has run.
        let (unit, report) = optimized("(x * 0 + 2) * 3");
        assert_eq!(unit.ast.to_sexpr(unit.ast.root(), &unit.names), "6");
        assert!(report.passes >= 2, "{report:?}");

        let mut again = unit.clone();
        let second = optimize(&mut again.ast).expect("optimize should succeed");
        assert_eq!(second.folded + second.simplified, 0);
        assert_eq!(second.passes, 1);
        assert_eq!(
            again.ast.to_sexpr(again.ast.root(), &again.names),
            unit.ast.to_sexpr(unit.ast.root(), &unit.names)
        );
    }

    #[test]
    fn division_by_zero_is_reported() {
        assert_eq!(failure("5 / 0"), ArithmeticError::DivisionByZero { position: 2 });
        assert!(matches!(failure("x / 0"), ArithmeticError::DivisionByZero { .. }));
    }

    #[test]
    fn domain_errors_name_the_operator() {
        assert!(matches!(
            failure("arcsin(2)"),
            ArithmeticError::Domain { op: "arcsin", .. }
        ));
        assert!(matches!(failure("log(0)"), ArithmeticError::Domain { op: "log", .. }));
        assert!(matches!(failure("arccth(1)"), ArithmeticError::Domain { op: "arccth", .. }));
        assert!(matches!(failure("(0 - 8) ^ (1 / 2)"), ArithmeticError::NonFinite { op: "^", .. }));
    }

    #[test]
    fn transcendental_values() {
        let (unit, _) = optimized("arccth(2)");
        let root = unit.ast.root().expect("tree is not empty");
        let value = unit.ast.number(root).expect("folded");
        assert!((value - 0.5f64.atanh()).abs() < 1e-12);
        assert_eq!(render("log(100)"), "2");
        assert_eq!(render("cos(0) * x"), "x");
    }

    #[test]
    fn statements_are_left_alone() {
        let mut unit = compile_unit(
            indoc! {"
                decl main() {
                    var a = 2 * 3 + 0;
                    if (a >= 6) a = a * 1; else a = 0 / a;
                    print a;
                };
            "},
            &Config::default(),
        )
        .expect("parse should succeed");
        optimize(&mut unit.ast).expect("optimize should succeed");
        unit.ast.check_links().expect("links stay consistent");

        let body = "(; (var (= a 6)) (; (; (if (>= a 6) (= a a)) (else (= a 0))) (; (print a))))";
        assert_eq!(
            unit.ast.to_sexpr(unit.ast.root(), &unit.names),
            format!("(; (decl (spec @main) {body}))")
        );
    }
}
