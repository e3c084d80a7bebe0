//! A parent link never owns its node and is always rewritten together with
//! the child slot that points back at it.

mod op;

use std::fmt;

use thiserror::Error;

use crate::symbols::SymbolTable;

pub use op::Op;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u32);

impl NodeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Byte range of the source text a node was produced from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NodeKind {
    Number(f64),
    /// Index into the unit's variable table.
    Variable(usize),
    Operator(Op),
    /// Index into the unit's variable table naming the function.
    FunctionRef(usize),
}

impl NodeKind {
    pub fn is_leaf(&self) -> bool {
        !matches!(self, NodeKind::Operator(_))
    }

    pub fn operator(&self) -> Option<Op> {
        match self {
            NodeKind::Operator(op) => Some(*op),
            _ => None,
        }
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeKind::Number(value) => write!(f, "number {value}"),
            NodeKind::Variable(index) => write!(f, "variable #{index}"),
            NodeKind::Operator(op) => write!(f, "operator '{op}'"),
            NodeKind::FunctionRef(index) => write!(f, "function #{index}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Left,
    Right,
}

impl Side {
    pub fn other(self) -> Side {
        match self {
            Side::Left => Side::Right,
            Side::Right => Side::Left,
        }
    }
}

/// Position of a node relative to its owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Relation {
    Left,
    Right,
    Root,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    kind: NodeKind,
    span: Span,
    parent: Option<NodeId>,
    left: Option<NodeId>,
    right: Option<NodeId>,
    released: bool,
}

impl Node {
    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    pub fn span(&self) -> Span {
        self.span
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn left(&self) -> Option<NodeId> {
        self.left
    }

    pub fn right(&self) -> Option<NodeId> {
        self.right
    }

    pub fn child(&self, side: Side) -> Option<NodeId> {
        match side {
            Side::Left => self.left,
            Side::Right => self.right,
        }
    }

    pub fn is_released(&self) -> bool {
        self.released
    }
}

/// Violations of the tree link invariants, reported by [`Ast::check_links`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LinkError {
    #[error("Root {node} still has a parent")]
    RootHasParent { node: NodeId },
    #[error("Node {node} is reachable but was released")]
    Released { node: NodeId },
    #[error("Node {node} names {recorded:?} as parent, but is owned by {owner}")]
    ParentMismatch {
        node: NodeId,
        owner: NodeId,
        recorded: Option<NodeId>,
    },
    #[error("Node {node} is reachable twice")]
    Shared { node: NodeId },
    #[error("Leaf node {node} has children")]
    LeafWithChildren { node: NodeId },
}

/// Node arena for one compiled unit.
#[derive(Debug, Clone, Default)]
pub struct Ast {
    nodes: Vec<Node>,
    root: Option<NodeId>,
    released: usize,
}

impl Ast {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            nodes: Vec::with_capacity(capacity),
            root: None,
            released: 0,
        }
    }

    pub fn push(&mut self, kind: NodeKind, span: Span) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(Node {
            kind,
            span,
            parent: None,
            left: None,
            right: None,
            released: false,
        });
        id
    }

    pub fn node(&self, id: NodeId) -> &Node {
        let node = &self.nodes[id.index()];
        debug_assert!(!node.released, "access to released node {id}");
        node
    }

    pub fn kind(&self, id: NodeId) -> NodeKind {
        self.node(id).kind
    }

    pub fn number(&self, id: NodeId) -> Option<f64> {
        match self.node(id).kind {
            NodeKind::Number(value) => Some(value),
            _ => None,
        }
    }

    pub fn is_op(&self, id: NodeId, op: Op) -> bool {
        self.node(id).kind == NodeKind::Operator(op)
    }

    /// Total number of allocated nodes, released ones included.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn live_count(&self) -> usize {
        self.nodes.len() - self.released
    }

    pub fn root(&self) -> Option<NodeId> {
        self.root
    }

    pub fn set_root(&mut self, root: Option<NodeId>) {
        if let Some(id) = root {
            self.nodes[id.index()].parent = None;
        }
        self.root = root;
    }

    pub fn set_kind(&mut self, id: NodeId, kind: NodeKind) {
        self.nodes[id.index()].kind = kind;
    }

    /// Points `parent`'s `side` slot at `child` and backlinks the child.
    ///
    /// A node previously held in that slot loses its parent link.
    pub fn link(&mut self, parent: NodeId, side: Side, child: Option<NodeId>) {
        let previous = self.nodes[parent.index()].child(side);
        if let Some(previous) = previous
            && self.nodes[previous.index()].parent == Some(parent)
        {
            self.nodes[previous.index()].parent = None;
        }
        let slot = &mut self.nodes[parent.index()];
        match side {
            Side::Left => slot.left = child,
            Side::Right => slot.right = child,
        }
        if let Some(child) = child {
            self.nodes[child.index()].parent = Some(parent);
        }
    }

    pub fn relation(&self, id: NodeId) -> Relation {
        match self.node(id).parent {
            None => Relation::Root,
            Some(parent) if self.node(parent).left == Some(id) => Relation::Left,
            Some(parent) => {
                debug_assert_eq!(self.node(parent).right, Some(id));
                Relation::Right
            }
        }
    }

    /// Replaces `id` by its `keep` child wherever `id` currently hangs,
    /// releasing `id` and the subtree on the other side.
    ///
    /// Returns the node now occupying `id`'s former position.
    pub fn splice(&mut self, id: NodeId, keep: Side) -> NodeId {
        let survivor = self
            .node(id)
            .child(keep)
            .unwrap_or_else(|| panic!("splice of {id} without a {keep:?} child"));
        let discarded = self.node(id).child(keep.other());
        let relation = self.relation(id);
        let parent = self.node(id).parent;

        self.nodes[survivor.index()].parent = None;
        self.nodes[id.index()].left = None;
        self.nodes[id.index()].right = None;

        match (relation, parent) {
            (Relation::Left, Some(parent)) => self.link(parent, Side::Left, Some(survivor)),
            (Relation::Right, Some(parent)) => self.link(parent, Side::Right, Some(survivor)),
            _ => self.set_root(Some(survivor)),
        }

        if let Some(discarded) = discarded {
            self.release_subtree(discarded);
        }
        self.release_subtree(id);
        survivor
    }

    /// Turns `id` into a `Number` leaf, releasing both former subtrees.
    pub fn collapse_to_number(&mut self, id: NodeId, value: f64) {
        let (left, right) = {
            let node = self.node(id);
            (node.left, node.right)
        };
        for child in [left, right].into_iter().flatten() {
            self.release_subtree(child);
        }
        let node = &mut self.nodes[id.index()];
        node.left = None;
        node.right = None;
        node.kind = NodeKind::Number(value);
    }

    /// Returns every node below `id` (inclusive) to the pool.
    pub fn release_subtree(&mut self, id: NodeId) {
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            let node = &mut self.nodes[current.index()];
            debug_assert!(!node.released, "double release of {current}");
            stack.extend(node.left.take());
            stack.extend(node.right.take());
            node.parent = None;
            node.released = true;
            self.released += 1;
        }
    }

    /// Nodes below `root` (inclusive), children before parents and left
    /// subtrees before right ones.
    pub fn postorder(&self, root: NodeId) -> Vec<NodeId> {
        let mut order = Vec::new();
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            order.push(id);
            let node = self.node(id);
            stack.extend(node.left);
            stack.extend(node.right);
        }
        order.reverse();
        order
    }

    /// Walks the tree from the root and verifies that every reachable node is
    /// live, owned exactly once, backlinked to its owner, and that leaves have
    /// no children.
    pub fn check_links(&self) -> Result<(), LinkError> {
        let Some(root) = self.root else {
            return Ok(());
        };
        if self.nodes[root.index()].parent.is_some() {
            return Err(LinkError::RootHasParent { node: root });
        }

        let mut seen = vec![false; self.nodes.len()];
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            let node = &self.nodes[id.index()];
            if node.released {
                return Err(LinkError::Released { node: id });
            }
            if std::mem::replace(&mut seen[id.index()], true) {
                return Err(LinkError::Shared { node: id });
            }
            if node.kind.is_leaf() && (node.left.is_some() || node.right.is_some()) {
                return Err(LinkError::LeafWithChildren { node: id });
            }
            for child in [node.left, node.right].into_iter().flatten() {
                let recorded = self.nodes[child.index()].parent;
                if recorded != Some(id) {
                    return Err(LinkError::ParentMismatch {
                        node: child,
                        owner: id,
                        recorded,
                    });
                }
                stack.push(child);
            }
        }
        Ok(())
    }

    /// Compact prefix rendering such as `(+ 1 (* 2 x))`, used in diagnostics
    /// and tests. Function references print as `@name`; a missing left child
    /// in front of a present right child prints as `_`.
    pub fn to_sexpr(&self, id: Option<NodeId>, names: &SymbolTable) -> String {
        let mut out = String::new();
        match id {
            Some(id) => self.write_sexpr(&mut out, id, names),
            None => out.push('_'),
        }
        out
    }

    /// Recurses into left children only; right children, which carry the
    /// statement spines, are followed in a loop.
    fn write_sexpr(&self, out: &mut String, mut id: NodeId, names: &SymbolTable) {
        let mut open = 0;
        loop {
            let node = self.node(id);
            let op = match node.kind {
                NodeKind::Number(value) => {
                    out.push_str(&value.to_string());
                    break;
                }
                NodeKind::Variable(index) => {
                    out.push_str(names.name(index).unwrap_or("?"));
                    break;
                }
                NodeKind::FunctionRef(index) => {
                    out.push('@');
                    out.push_str(names.name(index).unwrap_or("?"));
                    break;
                }
                NodeKind::Operator(op) => op,
            };
            out.push('(');
            out.push_str(op.spelling());
            open += 1;
            if node.left.is_none() && node.right.is_none() {
                break;
            }
            out.push(' ');
            match node.left {
                Some(left) => self.write_sexpr(out, left, names),
                None => out.push('_'),
            }
            let Some(right) = node.right else {
                break;
            };
            out.push(' ');
            id = right;
        }
        for _ in 0..open {
            out.push(')');
        }
    }
}
