//! A node with a right child but no left child writes `{}` in the left
//! position.

use thiserror::Error;

use crate::ast::{Ast, NodeId, NodeKind, Op, Side, Span};
use crate::config::Config;
use crate::pipeline::Unit;
use crate::symbols::{CapacityError, SymbolTable};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TreeTextError {
    #[error("Tree text offset {position}: expected {expected}, found {found}")]
    Unexpected {
        position: usize,
        expected: &'static str,
        found: String,
    },
    #[error("Unknown node tag '{tag}' at offset {position}")]
    UnknownTag { tag: String, position: usize },
    #[error("Unknown operator '{spelling}' at offset {position}")]
    UnknownOperator { spelling: String, position: usize },
    #[error("Invalid number '{literal}' at offset {position}")]
    InvalidNumber { literal: String, position: usize },
    #[error("Unterminated string at offset {position}")]
    UnterminatedString { position: usize },
    #[error("{tag} node at offset {position} cannot have children")]
    LeafWithChildren { tag: String, position: usize },
    #[error("Name index {index} is not in the variable table")]
    UnknownName { index: usize },
    #[error(transparent)]
    Capacity(#[from] CapacityError),
}

pub fn write(ast: &Ast, names: &SymbolTable) -> Result<String, TreeTextError> {
    let mut out = String::new();
    if let Some(root) = ast.root() {
        write_node(&mut out, ast, names, root, 0)?;
    }
    Ok(out)
}

/// Right children, which carry the statement spines, are written in a loop.
fn write_node(
    out: &mut String,
    ast: &Ast,
    names: &SymbolTable,
    mut id: NodeId,
    mut depth: usize,
) -> Result<(), TreeTextError> {
    let name = |index: usize| names.name(index).ok_or(TreeTextError::UnknownName { index });
    let mut closing = Vec::new();
    loop {
        let node = ast.node(id);
        indent(out, depth);
        let header = match node.kind() {
            NodeKind::Number(value) => format!("{{NUM: \"{value}\""),
            NodeKind::Operator(op) => format!("{{OP: \"{op}\""),
            NodeKind::Variable(index) => format!("{{VAR: \"{}\"", name(index)?),
            NodeKind::FunctionRef(index) => format!("{{FUNC: \"{}\"", name(index)?),
        };
        out.push_str(&header);

        if node.left().is_none() && node.right().is_none() {
            out.push_str("}\n");
            break;
        }
        out.push('\n');
        match node.left() {
            Some(left) => write_node(out, ast, names, left, depth + 1)?,
            None => {
                indent(out, depth + 1);
                out.push_str("{}\n");
            }
        }
        closing.push(depth);
        let Some(right) = node.right() else {
            break;
        };
        id = right;
        depth += 1;
    }
    for depth in closing.into_iter().rev() {
        indent(out, depth);
        out.push_str("}\n");
    }
    Ok(())
}

fn indent(out: &mut String, depth: usize) {
    for _ in 0..depth {
        out.push('\t');
    }
}

/// Rebuilds a unit from tree text. Names are interned in first-seen order and
/// all count as declared; the function table stays empty.
pub fn read(text: &str, config: &Config) -> Result<Unit, TreeTextError> {
    let mut reader = Reader {
        text,
        bytes: text.as_bytes(),
        position: 0,
        unit: Unit::new(&config.limits),
    };
    reader.skip_whitespace();
    let root = if reader.at_end() { None } else { reader.node()? };
    reader.skip_whitespace();
    if !reader.at_end() {
        return Err(reader.unexpected("end of tree text"));
    }

    let mut unit = reader.unit;
    unit.ast.set_root(root);
    unit.names.mark_all_initialized();
    Ok(unit)
}

struct Reader<'a> {
    text: &'a str,
    bytes: &'a [u8],
    position: usize,
    unit: Unit,
}

/// A node whose closing brace has not been read yet.
struct Open<'a> {
    id: NodeId,
    kind: NodeKind,
    tag: &'a str,
    start: usize,
    children: [Option<NodeId>; 2],
    filled: usize,
}

impl<'a> Reader<'a> {
    /// Reads one block with its descendants; `{}` reads as `None`. Nesting
    /// is tracked on an explicit stack.
    fn node(&mut self) -> Result<Option<NodeId>, TreeTextError> {
        let mut open: Vec<Open<'a>> = Vec::new();
        loop {
            let start = self.position;
            self.expect(b'{', "'{'")?;
            self.skip_whitespace();
            let mut finished = None;
            if self.peek() == Some(b'}') {
                self.position += 1;
                finished = Some(None);
            } else {
                open.push(self.header(start)?);
            }

            loop {
                let Some(current) = open.last_mut() else {
                    return Ok(finished.flatten());
                };
                if let Some(child) = finished.take() {
                    current.children[current.filled] = child;
                    current.filled += 1;
                }
                self.skip_whitespace();
                if current.filled < 2 && self.peek() == Some(b'{') {
                    break;
                }
                self.expect(b'}', "'}' or child node")?;
                if let Some(done) = open.pop() {
                    finished = Some(Some(self.close(done)?));
                }
            }
        }
    }

    /// Reads `TAG: payload` and allocates the node.
    fn header(&mut self, start: usize) -> Result<Open<'a>, TreeTextError> {
        let tag = self.word();
        self.skip_whitespace();
        self.expect(b':', "':'")?;
        self.skip_whitespace();
        let payload = self.payload()?;
        let kind = match tag {
            "NUM" => NodeKind::Number(payload.parse().map_err(|_| {
                TreeTextError::InvalidNumber {
                    literal: payload.to_string(),
                    position: start,
                }
            })?),
            "OP" => NodeKind::Operator(Op::lookup(payload).ok_or_else(|| {
                TreeTextError::UnknownOperator {
                    spelling: payload.to_string(),
                    position: start,
                }
            })?),
            "VAR" => NodeKind::Variable(self.unit.names.intern(payload)?),
            "FUNC" => NodeKind::FunctionRef(self.unit.names.intern(payload)?),
            _ => {
                return Err(TreeTextError::UnknownTag {
                    tag: tag.to_string(),
                    position: start,
                });
            }
        };
        let id = self.unit.ast.push(
            kind,
            Span {
                start,
                end: start + 1,
            },
        );
        Ok(Open {
            id,
            kind,
            tag,
            start,
            children: [None, None],
            filled: 0,
        })
    }

    fn close(&mut self, done: Open<'a>) -> Result<NodeId, TreeTextError> {
        let [left, right] = done.children;
        if done.kind.is_leaf() && (left.is_some() || right.is_some()) {
            return Err(TreeTextError::LeafWithChildren {
                tag: done.tag.to_string(),
                position: done.start,
            });
        }
        self.unit.ast.link(done.id, Side::Left, left);
        self.unit.ast.link(done.id, Side::Right, right);
        Ok(done.id)
    }

    fn word(&mut self) -> &'a str {
        let start = self.position;
        while self.peek().is_some_and(|b| b.is_ascii_alphabetic()) {
            self.position += 1;
        }
        &self.text[start..self.position]
    }

    fn payload(&mut self) -> Result<&'a str, TreeTextError> {
        let start = self.position;
        if self.peek() == Some(b'"') {
            let Some(length) = self.text[start + 1..].find('"') else {
                return Err(TreeTextError::UnterminatedString { position: start });
            };
            self.position = start + 1 + length + 1;
            return Ok(&self.text[start + 1..start + 1 + length]);
        }
        while self
            .peek()
            .is_some_and(|b| !b.is_ascii_whitespace() && b != b'{' && b != b'}')
        {
            self.position += 1;
        }
        if self.position == start {
            return Err(self.unexpected("payload"));
        }
        Ok(&self.text[start..self.position])
    }

    fn expect(&mut self, byte: u8, expected: &'static str) -> Result<(), TreeTextError> {
        if self.peek() == Some(byte) {
            self.position += 1;
            Ok(())
        } else {
            Err(self.unexpected(expected))
        }
    }

    fn unexpected(&self, expected: &'static str) -> TreeTextError {
        let found = match self.text[self.position..].chars().next() {
            Some(c) => format!("'{c}'"),
            None => "end of input".to_string(),
        };
        TreeTextError::Unexpected {
            position: self.position,
            expected,
            found,
        }
    }

    fn skip_whitespace(&mut self) {
        while self.peek().is_some_and(|b| b.is_ascii_whitespace()) {
            self.position += 1;
        }
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.position).copied()
    }

    fn at_end(&self) -> bool {
        self.position >= self.bytes.len()
    }
}
