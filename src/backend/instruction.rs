use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Number(f64),
    Register(String),
    /// `[base+offset]`, a frame slot addressed through the frame pointer.
    Slot { base: String, offset: usize },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Label {
    Function(String),
    Branch(usize),
    Finish(usize),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Instruction {
    Push(Operand),
    Pop(Operand),
    /// Stack arithmetic or a transcendental function, by mnemonic.
    Compute(&'static str),
    Jump {
        mnemonic: &'static str,
        target: Label,
    },
    Call(Label),
    Label(Label),
    In,
    Out,
    Ret,
    Hlt,
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Number(value) => write!(f, "{value}"),
            Operand::Register(name) => f.write_str(name),
            Operand::Slot { base, offset } => write!(f, "[{base}+{offset}]"),
        }
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Label::Function(name) => f.write_str(name),
            Label::Branch(id) => write!(f, "{id}"),
            Label::Finish(id) => write!(f, "finish_{id}"),
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Instruction::Push(operand) => write!(f, "push {operand}"),
            Instruction::Pop(operand) => write!(f, "pop {operand}"),
            Instruction::Compute(mnemonic) => f.write_str(mnemonic),
            Instruction::Jump { mnemonic, target } => write!(f, "{mnemonic} {target}:"),
            Instruction::Call(target) => write!(f, "call {target}:"),
            Instruction::Label(label) => write!(f, "{label}:"),
            Instruction::In => f.write_str("in"),
            Instruction::Out => f.write_str("out"),
            Instruction::Ret => f.write_str("ret"),
            Instruction::Hlt => f.write_str("hlt"),
        }
    }
}

/// One instruction per line, each line newline-terminated.
pub fn render(code: &[Instruction]) -> String {
    code.iter().map(|instruction| format!("{instruction}\n")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_targets_with_trailing_colon() {
        let code = [
            Instruction::Push(Operand::Slot {
                base: "rax".to_string(),
                offset: 3,
            }),
            Instruction::Jump {
                mnemonic: "jbe",
                target: Label::Branch(0),
            },
            Instruction::Label(Label::Finish(0)),
            Instruction::Call(Label::Function("main".to_string())),
            Instruction::Push(Operand::Number(-2.5)),
        ];
        assert_eq!(
            render(&code),
            "push [rax+3]\njbe 0:\nfinish_0:\ncall main:\npush -2.5\n"
        );
    }
}
