mod error;
mod instruction;

use rustc_hash::FxHashMap;

use crate::ast::{Ast, NodeId, NodeKind, Op, Side};
use crate::config::BackendConfig;
use crate::pipeline::Unit;
use crate::symbols::SymbolTable;

pub use error::{LoweringError, LoweringResult};
pub use instruction::{Instruction, Label, Operand, render};

/// Lowers `unit` and renders the result as assembly text.
pub fn generate(unit: &Unit, config: &BackendConfig) -> LoweringResult<String> {
    lower(unit, config).map(|code| render(&code))
}

pub fn lower(unit: &Unit, config: &BackendConfig) -> LoweringResult<Vec<Instruction>> {
    let mut generator = CodeGenerator {
        ast: &unit.ast,
        names: &unit.names,
        config,
        code: Vec::new(),
        labels: 0,
    };
    generator.program()?;
    Ok(generator.code)
}

/// Slot assignment of one function.
#[derive(Debug)]
struct Frame {
    function: String,
    slots: FxHashMap<usize, usize>,
}

impl Frame {
    fn new(function: &str) -> Self {
        Self {
            function: function.to_string(),
            slots: FxHashMap::default(),
        }
    }

    /// Slot of the variable with table index `index`, allocating the next
    /// free one on first sight.
    fn bind(&mut self, index: usize) -> usize {
        let next = self.slots.len();
        *self.slots.entry(index).or_insert(next)
    }
}

struct CodeGenerator<'a> {
    ast: &'a Ast,
    names: &'a SymbolTable,
    config: &'a BackendConfig,
    code: Vec<Instruction>,
    /// Branch labels are numbered across the whole unit.
    labels: usize,
}

impl<'a> CodeGenerator<'a> {
    fn program(&mut self) -> LoweringResult<()> {
        self.emit(Instruction::Push(Operand::Number(0.0)));
        self.emit(Instruction::Pop(self.frame_pointer()));
        self.emit(Instruction::Call(Label::Function("main".to_string())));
        self.emit(Instruction::Hlt);

        for decl in self.list(self.ast.root(), "function declaration")? {
            self.function(decl)?;
        }
        Ok(())
    }

    fn function(&mut self, decl: NodeId) -> LoweringResult<()> {
        let config = self.config;
        self.expect_op(decl, Op::Decl, "function declaration")?;
        let spec = self.child(decl, Side::Left, "function signature")?;
        self.expect_op(spec, Op::Spec, "function signature")?;
        let name = self.function_name(self.child(spec, Side::Left, "function name")?)?;
        let params = self.list(self.ast.node(spec).right(), "parameter")?;
        let statements = self.list(self.ast.node(decl).right(), "statement")?;

        if params.len() > config.arg_registers.len() {
            return Err(LoweringError::TooManyParameters {
                function: name,
                count: params.len(),
                registers: config.arg_registers.len(),
            });
        }
        let frame = self.layout(&name, &params, &statements)?;

        self.emit(Instruction::Label(Label::Function(name)));
        self.move_frame("add");
        for (&param, register) in params.iter().zip(&config.arg_registers) {
            self.emit(Instruction::Push(Operand::Register(register.clone())));
            let slot = self.slot(param, &frame)?;
            self.emit(Instruction::Pop(slot));
        }
        for &statement in &statements {
            self.statement(statement, &frame)?;
        }

        let returns = statements
            .last()
            .is_some_and(|&last| self.ast.is_op(last, Op::Return));
        if !returns {
            self.move_frame("sub");
            self.emit(Instruction::Ret);
        }
        Ok(())
    }

    fn layout(&self, name: &str, params: &[NodeId], statements: &[NodeId]) -> LoweringResult<Frame> {
        let mut frame = Frame::new(name);
        for &param in params {
            frame.bind(self.variable_index(param, "parameter name")?);
        }
        for &statement in statements {
            if !self.ast.is_op(statement, Op::Var) {
                continue;
            }
            let assignment = self.child(statement, Side::Left, "assignment")?;
            let target = self.child(assignment, Side::Left, "declared variable")?;
            frame.bind(self.variable_index(target, "declared variable")?);
        }

        let frame_size = self.config.frame_size;
        if frame.slots.len() > frame_size {
            return Err(LoweringError::FrameOverflow {
                function: frame.function,
                needed: frame.slots.len(),
                frame_size,
            });
        }
        Ok(frame)
    }

    fn statement(&mut self, id: NodeId, frame: &Frame) -> LoweringResult<()> {
        let Some(op) = self.ast.kind(id).operator() else {
            return Err(self.malformed(id, "statement"));
        };
        match op {
            Op::Var => {
                let assignment = self.child(id, Side::Left, "assignment")?;
                self.expect_op(assignment, Op::Assign, "assignment")?;
                self.assignment(assignment, frame)
            }
            Op::Assign => self.assignment(id, frame),
            Op::Call => self.call(id, frame),
            Op::Return => {
                if let Some(value) = self.ast.node(id).left() {
                    self.push_expr(value, frame)?;
                }
                self.move_frame("sub");
                self.emit(Instruction::Ret);
                Ok(())
            }
            Op::Scan => {
                let target = self.child(id, Side::Left, "variable")?;
                self.emit(Instruction::In);
                let slot = self.slot(target, frame)?;
                self.emit(Instruction::Pop(slot));
                Ok(())
            }
            Op::Print => {
                let source = self.child(id, Side::Left, "variable")?;
                let slot = self.slot(source, frame)?;
                self.emit(Instruction::Push(slot));
                self.emit(Instruction::Out);
                Ok(())
            }
            Op::If => self.conditional(id, None, frame),
            Op::Semicolon => {
                let branch = self.child(id, Side::Left, "if statement")?;
                self.expect_op(branch, Op::If, "if statement")?;
                let otherwise = self.child(id, Side::Right, "else branch")?;
                self.expect_op(otherwise, Op::Else, "else branch")?;
                self.conditional(branch, Some(otherwise), frame)
            }
            _ => Err(self.malformed(id, "statement")),
        }
    }

    fn assignment(&mut self, id: NodeId, frame: &Frame) -> LoweringResult<()> {
        let target = self.child(id, Side::Left, "assignment target")?;
        let value = self.child(id, Side::Right, "assigned expression")?;
        self.push_expr(value, frame)?;
        let slot = self.slot(target, frame)?;
        self.emit(Instruction::Pop(slot));
        Ok(())
    }

    /// Jumps to the then-arm when the comparison holds; the else-arm is laid
    /// out first as the fall-through path.
    fn conditional(
        &mut self,
        branch: NodeId,
        otherwise: Option<NodeId>,
        frame: &Frame,
    ) -> LoweringResult<()> {
        let comparison = self.child(branch, Side::Left, "comparison")?;
        let Some(jump) = self
            .ast
            .kind(comparison)
            .operator()
            .and_then(Op::jump_mnemonic)
        else {
            return Err(self.malformed(comparison, "comparison operator"));
        };
        let lhs = self.child(comparison, Side::Left, "left operand")?;
        let rhs = self.child(comparison, Side::Right, "right operand")?;
        let then_arm = self.child(branch, Side::Right, "then branch")?;

        self.push_expr(lhs, frame)?;
        self.push_expr(rhs, frame)?;
        let label = self.labels;
        self.labels += 1;
        self.emit(Instruction::Jump {
            mnemonic: jump,
            target: Label::Branch(label),
        });
        if let Some(otherwise) = otherwise {
            let arm = self.child(otherwise, Side::Left, "else assignment")?;
            self.statement(arm, frame)?;
        }
        self.emit(Instruction::Jump {
            mnemonic: "jmp",
            target: Label::Finish(label),
        });
        self.emit(Instruction::Label(Label::Branch(label)));
        self.statement(then_arm, frame)?;
        self.emit(Instruction::Label(Label::Finish(label)));
        Ok(())
    }

    fn call(&mut self, id: NodeId, frame: &Frame) -> LoweringResult<()> {
        let config = self.config;
        let function = self.function_name(self.child(id, Side::Left, "callee")?)?;
        let args = self.list(self.ast.node(id).right(), "argument")?;
        if args.len() > config.arg_registers.len() {
            return Err(LoweringError::TooManyArguments {
                function,
                count: args.len(),
                registers: config.arg_registers.len(),
            });
        }
        let registers = &config.arg_registers[..args.len()];
        // A nested call would clobber registers filled by earlier arguments,
        // so such argument lists are staged on the data stack first.
        if args.iter().skip(1).any(|&arg| self.contains_call(arg)) {
            for &arg in &args {
                self.push_expr(arg, frame)?;
            }
            for register in registers.iter().rev() {
                self.emit(Instruction::Pop(Operand::Register(register.clone())));
            }
        } else {
            for (&arg, register) in args.iter().zip(registers) {
                self.push_expr(arg, frame)?;
                self.emit(Instruction::Pop(Operand::Register(register.clone())));
            }
        }
        self.emit(Instruction::Call(Label::Function(function)));
        Ok(())
    }

    fn contains_call(&self, id: NodeId) -> bool {
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            let node = self.ast.node(current);
            if matches!(
                node.kind(),
                NodeKind::FunctionRef(_) | NodeKind::Operator(Op::Call)
            ) {
                return true;
            }
            stack.extend(node.left());
            stack.extend(node.right());
        }
        false
    }

    /// Postorder evaluation leaving exactly one value on the stack.
    fn push_expr(&mut self, id: NodeId, frame: &Frame) -> LoweringResult<()> {
        match self.ast.kind(id) {
            NodeKind::Number(value) => self.emit(Instruction::Push(Operand::Number(value))),
            NodeKind::Variable(_) => {
                let slot = self.slot(id, frame)?;
                self.emit(Instruction::Push(slot));
            }
            NodeKind::FunctionRef(_) => {
                let name = self.function_name(id)?;
                self.emit(Instruction::Call(Label::Function(name)));
            }
            NodeKind::Operator(Op::Call) => self.call(id, frame)?,
            NodeKind::Operator(op) => {
                let Some(mnemonic) = op.mnemonic() else {
                    return Err(self.malformed(id, "value operator"));
                };
                let operand = self.child(id, Side::Left, "operand")?;
                match self.ast.node(id).right() {
                    Some(right) if !op.is_function() => {
                        self.push_expr(operand, frame)?;
                        self.push_expr(right, frame)?;
                    }
                    Some(_) => return Err(self.malformed(id, "a single operand")),
                    None if op.is_function() => self.push_expr(operand, frame)?,
                    None if matches!(op, Op::Add | Op::Sub) => {
                        self.emit(Instruction::Push(Operand::Number(0.0)));
                        self.push_expr(operand, frame)?;
                    }
                    None => return Err(self.missing(id, Side::Right, "right operand")),
                }
                self.emit(Instruction::Compute(mnemonic));
            }
        }
        Ok(())
    }

    /// Moves the frame pointer by one frame in the direction of `mnemonic`.
    fn move_frame(&mut self, mnemonic: &'static str) {
        let frame_size = self.config.frame_size as f64;
        self.emit(Instruction::Push(self.frame_pointer()));
        self.emit(Instruction::Push(Operand::Number(frame_size)));
        self.emit(Instruction::Compute(mnemonic));
        self.emit(Instruction::Pop(self.frame_pointer()));
    }

    /// Items of a right-leaning `;` chain.
    fn list(&self, head: Option<NodeId>, expected: &'static str) -> LoweringResult<Vec<NodeId>> {
        let mut items = Vec::new();
        let mut cell = head;
        while let Some(id) = cell {
            self.expect_op(id, Op::Semicolon, "list cell")?;
            items.push(self.child(id, Side::Left, expected)?);
            cell = self.ast.node(id).right();
        }
        Ok(items)
    }

    fn slot(&self, id: NodeId, frame: &Frame) -> LoweringResult<Operand> {
        let index = self.variable_index(id, "variable")?;
        match frame.slots.get(&index) {
            Some(&offset) => Ok(Operand::Slot {
                base: self.config.frame_pointer.clone(),
                offset,
            }),
            None => Err(LoweringError::UnboundVariable {
                name: self.name(index)?.to_string(),
                function: frame.function.clone(),
            }),
        }
    }

    fn variable_index(&self, id: NodeId, expected: &'static str) -> LoweringResult<usize> {
        match self.ast.kind(id) {
            NodeKind::Variable(index) => Ok(index),
            _ => Err(self.malformed(id, expected)),
        }
    }

    fn function_name(&self, id: NodeId) -> LoweringResult<String> {
        match self.ast.kind(id) {
            NodeKind::FunctionRef(index) => Ok(self.name(index)?.to_string()),
            _ => Err(self.malformed(id, "function name")),
        }
    }

    fn name(&self, index: usize) -> LoweringResult<&'a str> {
        self.names
            .name(index)
            .ok_or(LoweringError::UnknownName { index })
    }

    fn child(&self, id: NodeId, side: Side, expected: &'static str) -> LoweringResult<NodeId> {
        self.ast
            .node(id)
            .child(side)
            .ok_or_else(|| self.missing(id, side, expected))
    }

    fn missing(&self, id: NodeId, side: Side, expected: &'static str) -> LoweringError {
        LoweringError::MissingChild {
            node: id,
            kind: self.ast.kind(id).to_string(),
            side: match side {
                Side::Left => "left",
                Side::Right => "right",
            },
            expected,
        }
    }

    fn expect_op(&self, id: NodeId, op: Op, expected: &'static str) -> LoweringResult<()> {
        if self.ast.is_op(id, op) {
            Ok(())
        } else {
            Err(self.malformed(id, expected))
        }
    }

    fn malformed(&self, id: NodeId, expected: &'static str) -> LoweringError {
        LoweringError::Malformed {
            node: id,
            kind: self.ast.kind(id).to_string(),
            expected,
        }
    }

    fn frame_pointer(&self) -> Operand {
        Operand::Register(self.config.frame_pointer.clone())
    }

    fn emit(&mut self, instruction: Instruction) {
        self.code.push(instruction);
    }
}
