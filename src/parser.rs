//! A rule returns `Ok(None)` with the cursor untouched when its first token
//! does not match; past that token any mismatch is a fatal [`SyntaxError`].

mod error;

use crate::ast::{Ast, NodeId, NodeKind, Op, Side, Span};
use crate::pipeline::Unit;

pub use error::{ParseResult, SyntaxError};

/// Table consulted by the declared-before-use check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Scope {
    Global,
    Function(usize),
}

/// Right-leaning chain of `;` cells.
#[derive(Debug, Default)]
struct ListBuilder {
    head: Option<NodeId>,
    tail: Option<NodeId>,
}

impl ListBuilder {
    fn push(&mut self, ast: &mut Ast, cell: NodeId) {
        match self.tail {
            Some(tail) => ast.link(tail, Side::Right, Some(cell)),
            None => self.head = Some(cell),
        }
        self.tail = Some(cell);
    }
}

type Rule<'u> = fn(&mut Parser<'u>) -> ParseResult<Option<NodeId>>;

pub struct Parser<'u> {
    unit: &'u mut Unit,
    tokens: Vec<NodeId>,
    cursor: usize,
    scope: Scope,
    max_locals: usize,
}

impl<'u> Parser<'u> {
    /// `tokens` must end with the end marker, as [`crate::lexer::tokenize`]
    /// guarantees.
    pub fn new(unit: &'u mut Unit, tokens: Vec<NodeId>, max_locals: usize) -> Self {
        Self {
            unit,
            tokens,
            cursor: 0,
            scope: Scope::Global,
            max_locals,
        }
    }

    /// Program := (FunctionDecl ';')* '$'
    pub fn parse_program(mut self) -> ParseResult<Option<NodeId>> {
        let mut program = ListBuilder::default();
        while let Some(decl) = self.function_decl()? {
            let cell = self.expect(Op::Semicolon, "program")?;
            self.unit.ast.link(cell, Side::Left, Some(decl));
            program.push(&mut self.unit.ast, cell);
        }
        if !self.check(Op::End) {
            return Err(self.unexpected("program", "'decl' or end of input"));
        }
        self.unit.ast.set_root(program.head);
        Ok(program.head)
    }

    /// Parses a single expression followed by the end marker.
    pub fn parse_expression(mut self) -> ParseResult<NodeId> {
        let expr = self.expect_expr("expression unit")?;
        if !self.check(Op::End) {
            return Err(self.unexpected("expression unit", "operator or end of input"));
        }
        self.unit.ast.set_root(Some(expr));
        Ok(expr)
    }

    fn function_decl(&mut self) -> ParseResult<Option<NodeId>> {
        const RULE: &str = "function declaration";
        if !self.check(Op::Decl) {
            return Ok(None);
        }
        let decl = self.advance();

        let Some(name_index) = self.check_variable() else {
            return Err(self.unexpected(RULE, "function name"));
        };
        let name_node = self.advance();
        let name = self.name_of(name_index);
        if self.unit.functions.find(name_index).is_some() {
            return Err(SyntaxError::DuplicateFunction {
                name,
                position: self.position_of(name_node),
            });
        }
        // Registered before the body so the function may call itself.
        let function = self
            .unit
            .functions
            .declare(&name, name_index, self.max_locals)?;
        self.unit
            .ast
            .set_kind(name_node, NodeKind::FunctionRef(name_index));

        self.expect(Op::LParen, RULE)?;
        self.scope = Scope::Function(function);
        let params = self.parameters(function)?;
        self.expect(Op::RParen, RULE)?;

        let spec_span = self.unit.ast.node(name_node).span();
        let spec = self.unit.ast.push(NodeKind::Operator(Op::Spec), spec_span);
        self.unit.ast.link(spec, Side::Left, Some(name_node));
        self.unit.ast.link(spec, Side::Right, params);
        self.unit.ast.link(decl, Side::Left, Some(spec));

        self.expect(Op::LBrace, RULE)?;
        let body = self.statement_list()?;
        self.expect(Op::RBrace, RULE)?;
        self.unit.ast.link(decl, Side::Right, body);

        if let Some(entry) = self.unit.functions.get_mut(function) {
            entry.body = body;
        }
        self.scope = Scope::Global;
        Ok(Some(decl))
    }

    fn parameters(&mut self, function: usize) -> ParseResult<Option<NodeId>> {
        const RULE: &str = "parameter list";
        let mut list = ListBuilder::default();
        if self.check(Op::RParen) {
            return Ok(None);
        }
        loop {
            let Some(index) = self.check_variable() else {
                return Err(self.unexpected(RULE, "parameter name"));
            };
            let param = self.advance();
            let name = self.name_of(index);
            let position = self.position_of(param);
            if let Some(entry) = self.unit.functions.get_mut(function) {
                if entry.locals.is_initialized(&name) {
                    return Err(SyntaxError::DuplicateParameter { name, position });
                }
                entry.locals.declare(&name)?;
                entry.params.push(name);
            }
            let cell = self.list_cell(param);
            list.push(&mut self.unit.ast, cell);

            if !self.check(Op::Semicolon) {
                break;
            }
            self.advance();
        }
        Ok(list.head)
    }

    /// Stmt* up to the closing brace, each statement terminated by `;`.
    fn statement_list(&mut self) -> ParseResult<Option<NodeId>> {
        const RULE: &str = "statement list";
        let mut list = ListBuilder::default();
        while !self.check(Op::RBrace) {
            let Some(statement) = self.statement()? else {
                return Err(self.unexpected(RULE, "statement or '}'"));
            };
            let cell = self.expect(Op::Semicolon, RULE)?;
            self.unit.ast.link(cell, Side::Left, Some(statement));
            list.push(&mut self.unit.ast, cell);
        }
        Ok(list.head)
    }

    fn statement(&mut self) -> ParseResult<Option<NodeId>> {
        let rules: [Rule<'u>; 6] = [
            Self::if_statement,
            Self::return_statement,
            Self::var_declaration,
            Self::call,
            Self::io_statement,
            Self::assignment,
        ];
        for rule in rules {
            if let Some(statement) = rule(self)? {
                return Ok(Some(statement));
            }
        }
        Ok(None)
    }

    /// If := 'if' '(' Expr RelOp Expr ')' Assignment [';' 'else' Assignment]
    fn if_statement(&mut self) -> ParseResult<Option<NodeId>> {
        const RULE: &str = "if";
        let start = self.cursor;
        if !self.check(Op::If) {
            return Ok(None);
        }
        let if_node = self.advance();
        if !self.check(Op::LParen) {
            self.cursor = start;
            return Ok(None);
        }
        self.advance();

        let lhs = self.expect_expr(RULE)?;
        let relation = match self.current_op() {
            Some(op) if op.is_relational() => self.advance(),
            _ => return Err(self.unexpected(RULE, "comparison operator")),
        };
        let rhs = self.expect_expr(RULE)?;
        self.expect(Op::RParen, RULE)?;
        self.unit.ast.link(relation, Side::Left, Some(lhs));
        self.unit.ast.link(relation, Side::Right, Some(rhs));

        let then_arm = self.expect_assignment(RULE)?;
        self.unit.ast.link(if_node, Side::Left, Some(relation));
        self.unit.ast.link(if_node, Side::Right, Some(then_arm));

        // The `;` ahead of `else` joins both arms into one statement.
        let Some((joint, else_node)) = self.else_arm()? else {
            return Ok(Some(if_node));
        };
        self.unit.ast.link(joint, Side::Left, Some(if_node));
        self.unit.ast.link(joint, Side::Right, Some(else_node));
        Ok(Some(joint))
    }

    /// Returns the joining `;` and the `else` node.
    fn else_arm(&mut self) -> ParseResult<Option<(NodeId, NodeId)>> {
        let start = self.cursor;
        if !self.check(Op::Semicolon) {
            return Ok(None);
        }
        let joint = self.advance();
        if !self.check(Op::Else) {
            self.cursor = start;
            return Ok(None);
        }
        let else_node = self.advance();
        let arm = self.expect_assignment("else")?;
        self.unit.ast.link(else_node, Side::Left, Some(arm));
        Ok(Some((joint, else_node)))
    }

    fn return_statement(&mut self) -> ParseResult<Option<NodeId>> {
        if !self.check(Op::Return) {
            return Ok(None);
        }
        let node = self.advance();
        let value = self.expr()?;
        self.unit.ast.link(node, Side::Left, value);
        Ok(Some(node))
    }

    /// VarDecl := 'var' Assignment. The name counts as declared before the
    /// initializer is parsed.
    fn var_declaration(&mut self) -> ParseResult<Option<NodeId>> {
        const RULE: &str = "variable declaration";
        if !self.check(Op::Var) {
            return Ok(None);
        }
        let node = self.advance();
        let Some(index) = self.check_variable() else {
            return Err(self.unexpected(RULE, "identifier"));
        };
        self.declare(index)?;
        let assignment = self.expect_assignment(RULE)?;
        self.unit.ast.link(node, Side::Left, Some(assignment));
        Ok(Some(node))
    }

    fn io_statement(&mut self) -> ParseResult<Option<NodeId>> {
        let rule = match self.current_op() {
            Some(Op::Scan) => "scan",
            Some(Op::Print) => "print",
            _ => return Ok(None),
        };
        let node = self.advance();
        let Some(index) = self.check_variable() else {
            return Err(self.unexpected(rule, "identifier"));
        };
        let target = self.advance();
        self.ensure_declared(index, target, rule)?;
        self.unit.ast.link(node, Side::Left, Some(target));
        Ok(Some(node))
    }

    /// Assignment := Identifier '=' Expr
    fn assignment(&mut self) -> ParseResult<Option<NodeId>> {
        const RULE: &str = "assignment";
        let start = self.cursor;
        let Some(index) = self.check_variable() else {
            return Ok(None);
        };
        let target = self.advance();
        if !self.check(Op::Assign) {
            self.cursor = start;
            return Ok(None);
        }
        let node = self.advance();
        self.ensure_declared(index, target, RULE)?;
        let value = self.expect_expr(RULE)?;
        self.unit.ast.link(node, Side::Left, Some(target));
        self.unit.ast.link(node, Side::Right, Some(value));
        Ok(Some(node))
    }

    /// Call := 'call' name '(' [Expr (';' Expr)*] ')'
    fn call(&mut self) -> ParseResult<Option<NodeId>> {
        const RULE: &str = "call";
        if !self.check(Op::Call) {
            return Ok(None);
        }
        let node = self.advance();
        let Some(name_index) = self.check_variable() else {
            return Err(self.unexpected(RULE, "function name"));
        };
        let callee = self.advance();
        let name = self.name_of(name_index);
        let position = self.position_of(callee);
        let Some(function) = self.unit.functions.find(name_index) else {
            return Err(SyntaxError::UndeclaredFunction { name, position });
        };
        self.unit
            .ast
            .set_kind(callee, NodeKind::FunctionRef(name_index));

        self.expect(Op::LParen, RULE)?;
        let mut args = ListBuilder::default();
        let mut count = 0;
        if !self.check(Op::RParen) {
            loop {
                let arg = self.expect_expr(RULE)?;
                let cell = self.list_cell(arg);
                args.push(&mut self.unit.ast, cell);
                count += 1;
                if !self.check(Op::Semicolon) {
                    break;
                }
                self.advance();
            }
        }
        self.expect(Op::RParen, RULE)?;

        let expected = self
            .unit
            .functions
            .get(function)
            .map_or(0, |entry| entry.params.len());
        if count != expected {
            return Err(SyntaxError::ArityMismatch {
                name,
                expected,
                found: count,
                position,
            });
        }
        self.unit.ast.link(node, Side::Left, Some(callee));
        self.unit.ast.link(node, Side::Right, args.head);
        Ok(Some(node))
    }

    /// Expr := Term (('+' | '-') Term)*
    fn expr(&mut self) -> ParseResult<Option<NodeId>> {
        let Some(mut lhs) = self.term()? else {
            return Ok(None);
        };
        while let Some(op @ (Op::Add | Op::Sub)) = self.current_op() {
            let node = self.advance();
            let rhs = self.expect_term(op)?;
            self.unit.ast.link(node, Side::Left, Some(lhs));
            self.unit.ast.link(node, Side::Right, Some(rhs));
            lhs = node;
        }
        Ok(Some(lhs))
    }

    /// Term := BasicExpr (('*' | '/') BasicExpr)*
    fn term(&mut self) -> ParseResult<Option<NodeId>> {
        let Some(mut lhs) = self.basic()? else {
            return Ok(None);
        };
        while let Some(op @ (Op::Mul | Op::Div)) = self.current_op() {
            let node = self.advance();
            let rhs = self.expect_basic(op.spelling())?;
            self.unit.ast.link(node, Side::Left, Some(lhs));
            self.unit.ast.link(node, Side::Right, Some(rhs));
            lhs = node;
        }
        Ok(Some(lhs))
    }

    /// BasicExpr := Primary ['^' BasicExpr]
    fn basic(&mut self) -> ParseResult<Option<NodeId>> {
        let Some(base) = self.primary()? else {
            return Ok(None);
        };
        if !self.check(Op::Pow) {
            return Ok(Some(base));
        }
        let node = self.advance();
        let exponent = self.expect_basic("^")?;
        self.unit.ast.link(node, Side::Left, Some(base));
        self.unit.ast.link(node, Side::Right, Some(exponent));
        Ok(Some(node))
    }

    /// Primary := ('+' | '-') BasicExpr | '(' Expr ')' | Function BasicExpr
    ///          | Call | Number | Identifier
    fn primary(&mut self) -> ParseResult<Option<NodeId>> {
        const RULE: &str = "basic expression";
        let current = self.current();
        match self.unit.ast.kind(current) {
            NodeKind::Number(_) => Ok(Some(self.advance())),
            NodeKind::Variable(index) => {
                self.ensure_declared(index, current, RULE)?;
                Ok(Some(self.advance()))
            }
            NodeKind::Operator(Op::LParen) => {
                self.advance();
                let inner = self.expect_expr(RULE)?;
                self.expect(Op::RParen, RULE)?;
                Ok(Some(inner))
            }
            NodeKind::Operator(Op::Call) => self.call(),
            NodeKind::Operator(op @ (Op::Add | Op::Sub)) => self.prefix(op.spelling()),
            NodeKind::Operator(op) if op.is_function() => self.prefix(op.spelling()),
            _ => Ok(None),
        }
    }

    /// Unary sign or function applied to the following BasicExpr.
    fn prefix(&mut self, rule: &'static str) -> ParseResult<Option<NodeId>> {
        let node = self.advance();
        let operand = self.expect_basic(rule)?;
        self.unit.ast.link(node, Side::Left, Some(operand));
        Ok(Some(node))
    }

    fn expect_expr(&mut self, rule: &'static str) -> ParseResult<NodeId> {
        match self.expr()? {
            Some(id) => Ok(id),
            None => Err(self.unexpected(rule, "expression")),
        }
    }

    fn expect_term(&mut self, op: Op) -> ParseResult<NodeId> {
        match self.term()? {
            Some(id) => Ok(id),
            None => Err(self.unexpected(op.spelling(), "operand")),
        }
    }

    fn expect_basic(&mut self, rule: &'static str) -> ParseResult<NodeId> {
        match self.basic()? {
            Some(id) => Ok(id),
            None => Err(self.unexpected(rule, "operand")),
        }
    }

    fn expect_assignment(&mut self, rule: &'static str) -> ParseResult<NodeId> {
        match self.assignment()? {
            Some(id) => Ok(id),
            None => Err(self.unexpected(rule, "assignment")),
        }
    }

    fn expect(&mut self, op: Op, rule: &'static str) -> ParseResult<NodeId> {
        if self.check(op) {
            Ok(self.advance())
        } else {
            Err(self.unexpected(rule, &format!("'{op}'")))
        }
    }

    fn current(&self) -> NodeId {
        let last = self.tokens.len().saturating_sub(1);
        self.tokens[self.cursor.min(last)]
    }

    fn current_op(&self) -> Option<Op> {
        self.unit.ast.kind(self.current()).operator()
    }

    fn check(&self, op: Op) -> bool {
        self.current_op() == Some(op)
    }

    fn check_variable(&self) -> Option<usize> {
        match self.unit.ast.kind(self.current()) {
            NodeKind::Variable(index) => Some(index),
            _ => None,
        }
    }

    /// Consumes the current token. The cursor never moves past the end marker.
    fn advance(&mut self) -> NodeId {
        let id = self.current();
        if self.cursor + 1 < self.tokens.len() {
            self.cursor += 1;
        }
        id
    }

    /// Synthetic `;` cell holding `item` on its left.
    fn list_cell(&mut self, item: NodeId) -> NodeId {
        let span = self.unit.ast.node(item).span();
        let cell = self.unit.ast.push(
            NodeKind::Operator(Op::Semicolon),
            Span {
                start: span.start,
                end: span.start,
            },
        );
        self.unit.ast.link(cell, Side::Left, Some(item));
        cell
    }

    fn name_of(&self, index: usize) -> String {
        self.unit.names.name(index).unwrap_or("?").to_string()
    }

    fn position_of(&self, id: NodeId) -> usize {
        self.unit.ast.node(id).span().start
    }

    fn is_declared(&self, index: usize) -> bool {
        match self.scope {
            Scope::Global => self
                .unit
                .names
                .get(index)
                .is_some_and(|symbol| symbol.initialized),
            Scope::Function(function) => {
                let name = self.unit.names.name(index).unwrap_or_default();
                self.unit
                    .functions
                    .get(function)
                    .is_some_and(|entry| entry.locals.is_initialized(name))
            }
        }
    }

    fn declare(&mut self, index: usize) -> ParseResult<()> {
        match self.scope {
            Scope::Global => self.unit.names.mark_initialized(index),
            Scope::Function(function) => {
                let name = self.name_of(index);
                if let Some(entry) = self.unit.functions.get_mut(function) {
                    entry.locals.declare(&name)?;
                }
            }
        }
        Ok(())
    }

    fn ensure_declared(&self, index: usize, node: NodeId, rule: &'static str) -> ParseResult<()> {
        if self.is_declared(index) {
            return Ok(());
        }
        Err(SyntaxError::Undeclared {
            rule,
            name: self.name_of(index),
            position: self.position_of(node),
        })
    }

    fn unexpected(&self, rule: &'static str, expected: &str) -> SyntaxError {
        let current = self.current();
        SyntaxError::Unexpected {
            rule,
            cursor: self.cursor,
            position: self.position_of(current),
            expected: expected.to_string(),
            found: self.describe(current),
        }
    }

    fn describe(&self, id: NodeId) -> String {
        match self.unit.ast.kind(id) {
            NodeKind::Number(value) => format!("number {value}"),
            NodeKind::Variable(index) => format!("identifier '{}'", self.name_of(index)),
            NodeKind::FunctionRef(index) => format!("function '{}'", self.name_of(index)),
            NodeKind::Operator(Op::End) => "end of input".to_string(),
            NodeKind::Operator(op) => format!("'{op}'"),
        }
    }
}
