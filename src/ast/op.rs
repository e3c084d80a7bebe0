use std::fmt;

/// Operator and keyword tags carried by `Operator` nodes.
///
/// Glyphs, keywords and structural tokens share one closed set because the
/// lexer emits them as nodes that the parser later links into the tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    // Arithmetic
    Add,
    Sub,
    Mul,
    Div,
    Pow,

    // Unary transcendental functions
    Log,
    Ln,
    Exp,
    Sin,
    Cos,
    Tg,
    Ctg,
    Sh,
    Ch,
    Th,
    Cth,
    Arcsin,
    Arccos,
    Arctg,
    Arcctg,
    Arcsh,
    Arcch,
    Arcth,
    Arccth,

    // Assignment and comparison
    Assign,   // =
    Equal,    // ==
    NotEqual, // !=
    Above,    // >
    AboveEq,  // >=
    Below,    // <
    BelowEq,  // <=

    // Statements
    Scan,
    Print,
    Call,
    If,
    Else,
    While,
    Return,
    Decl,
    Var,
    Spec,

    // Structural
    LParen,
    RParen,
    LBrace,
    RBrace,
    Semicolon,
    End,
}

const SPELLINGS: &[(&str, Op)] = &[
    ("+", Op::Add),
    ("-", Op::Sub),
    ("*", Op::Mul),
    ("/", Op::Div),
    ("^", Op::Pow),
    ("log", Op::Log),
    ("ln", Op::Ln),
    ("exp", Op::Exp),
    ("sin", Op::Sin),
    ("cos", Op::Cos),
    ("tg", Op::Tg),
    ("ctg", Op::Ctg),
    ("sh", Op::Sh),
    ("ch", Op::Ch),
    ("th", Op::Th),
    ("cth", Op::Cth),
    ("arcsin", Op::Arcsin),
    ("arccos", Op::Arccos),
    ("arctg", Op::Arctg),
    ("arcctg", Op::Arcctg),
    ("arcsh", Op::Arcsh),
    ("arcch", Op::Arcch),
    ("arcth", Op::Arcth),
    ("arccth", Op::Arccth),
    ("=", Op::Assign),
    ("==", Op::Equal),
    ("!=", Op::NotEqual),
    (">", Op::Above),
    (">=", Op::AboveEq),
    ("<", Op::Below),
    ("<=", Op::BelowEq),
    ("scan", Op::Scan),
    ("print", Op::Print),
    ("call", Op::Call),
    ("if", Op::If),
    ("else", Op::Else),
    ("while", Op::While),
    ("return", Op::Return),
    ("decl", Op::Decl),
    ("var", Op::Var),
    ("spec", Op::Spec),
    ("(", Op::LParen),
    (")", Op::RParen),
    ("{", Op::LBrace),
    ("}", Op::RBrace),
    (";", Op::Semicolon),
    ("$", Op::End),
];

// Alternative keyword spellings accepted on input; output always uses the
// canonical spelling from `SPELLINGS`.
const ALIASES: &[(&str, Op)] = &[
    ("tan", Op::Tg),
    ("cot", Op::Ctg),
    ("sinh", Op::Sh),
    ("cosh", Op::Ch),
    ("tanh", Op::Th),
    ("coth", Op::Cth),
    ("arctan", Op::Arctg),
    ("arccot", Op::Arcctg),
    ("arcsinh", Op::Arcsh),
    ("arccosh", Op::Arcch),
    ("arctanh", Op::Arcth),
    ("arccoth", Op::Arccth),
];

impl Op {
    /// Resolves an identifier-shaped word against the keyword table.
    pub fn keyword(word: &str) -> Option<Op> {
        Self::lookup(word).filter(|op| op.spelling().starts_with(|c: char| c.is_ascii_alphabetic()))
    }

    /// Resolves any canonical spelling or alias, glyphs included.
    pub fn lookup(spelling: &str) -> Option<Op> {
        SPELLINGS
            .iter()
            .chain(ALIASES)
            .find(|(candidate, _)| *candidate == spelling)
            .map(|(_, op)| *op)
    }

    pub fn spelling(self) -> &'static str {
        SPELLINGS
            .iter()
            .find(|(_, op)| *op == self)
            .map(|(spelling, _)| *spelling)
            .unwrap_or("?")
    }

    pub fn is_function(self) -> bool {
        matches!(
            self,
            Op::Log
                | Op::Ln
                | Op::Exp
                | Op::Sin
                | Op::Cos
                | Op::Tg
                | Op::Ctg
                | Op::Sh
                | Op::Ch
                | Op::Th
                | Op::Cth
                | Op::Arcsin
                | Op::Arccos
                | Op::Arctg
                | Op::Arcctg
                | Op::Arcsh
                | Op::Arcch
                | Op::Arcth
                | Op::Arccth
        )
    }

    pub fn is_relational(self) -> bool {
        self.jump_mnemonic().is_some()
    }

    /// Conditional jump taken when the comparison holds.
    pub fn jump_mnemonic(self) -> Option<&'static str> {
        match self {
            Op::Above => Some("ja"),
            Op::AboveEq => Some("jae"),
            Op::Below => Some("jb"),
            Op::BelowEq => Some("jbe"),
            Op::Equal => Some("je"),
            Op::NotEqual => Some("jne"),
            _ => None,
        }
    }

    /// Stack-machine instruction computing this operator, if it is a value
    /// operator.
    pub fn mnemonic(self) -> Option<&'static str> {
        match self {
            Op::Add => Some("add"),
            Op::Sub => Some("sub"),
            Op::Mul => Some("mul"),
            Op::Div => Some("div"),
            Op::Pow => Some("pow"),
            op if op.is_function() => Some(op.spelling()),
            _ => None,
        }
    }
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.spelling())
    }
}

#[cfg(test)]
mod tests {
    use super::Op;

    #[test]
    fn keywords_exclude_glyphs() {
        assert_eq!(Op::keyword("sin"), Some(Op::Sin));
        assert_eq!(Op::keyword("arcsinh"), Some(Op::Arcsh));
        assert_eq!(Op::keyword("decl"), Some(Op::Decl));
        assert_eq!(Op::keyword("+"), None);
        assert_eq!(Op::keyword("sine"), None);
    }

    #[test]
    fn aliases_print_canonical_spelling() {
        assert_eq!(Op::lookup("tan").map(Op::spelling), Some("tg"));
        assert_eq!(Op::lookup(">=").map(Op::spelling), Some(">="));
    }

    #[test]
    fn jump_table_covers_every_comparison() {
        let table = [
            (Op::Above, "ja"),
            (Op::AboveEq, "jae"),
            (Op::Below, "jb"),
            (Op::BelowEq, "jbe"),
            (Op::Equal, "je"),
            (Op::NotEqual, "jne"),
        ];
        for (op, jump) in table {
            assert_eq!(op.jump_mnemonic(), Some(jump));
        }
        assert!(!Op::Assign.is_relational());
    }
}
