//! Template syntax trees.
//!
//! Trees are produced by an external parser; this module only defines their
//! shape. Positions are byte offsets into the template source. The
//! constructor helpers default every position to 0, use `at` to set one.
//!
//! ```
//! use quill_core::syntax::{Arg, Node, PipeNode, Tree};
//!
//! // Hello {{.Name}}!
//! let tree = Tree::new("hello", vec![
//!     Node::text("Hello "),
//!     Node::action(Arg::field("Name")),
//!     Node::text("!"),
//! ]);
//! assert_eq!(tree.root.nodes.len(), 3);
//! ```

use std::sync::Arc;

/// Byte offset into the template source.
pub type Pos = usize;

#[derive(Debug, Clone, PartialEq)]
pub struct Tree {
    pub name: String,
    pub root: ListNode,
    /// Full template source text, used to turn positions into line:column.
    pub source: Option<Arc<str>>,
}

impl Tree {
    pub fn new(name: impl Into<String>, nodes: Vec<Node>) -> Self {
        Self {
            name: name.into(),
            root: ListNode { pos: 0, nodes },
            source: None,
        }
    }

    pub fn with_source(mut self, source: impl Into<Arc<str>>) -> Self {
        self.source = Some(source.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ListNode {
    pub pos: Pos,
    pub nodes: Vec<Node>,
}

impl From<Vec<Node>> for ListNode {
    fn from(nodes: Vec<Node>) -> Self {
        ListNode { pos: 0, nodes }
    }
}

/// Statement-level nodes.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    List(ListNode),
    Text { pos: Pos, text: String },
    Action { pos: Pos, pipe: PipeNode },
    Comment { pos: Pos, text: String },
    If(BranchNode),
    With(BranchNode),
    Range(BranchNode),
    Template {
        pos: Pos,
        name: String,
        pipe: Option<PipeNode>,
    },
    Break { pos: Pos },
    Continue { pos: Pos },
}

#[derive(Debug, Clone, PartialEq)]
pub struct BranchNode {
    pub pos: Pos,
    pub pipe: PipeNode,
    pub list: ListNode,
    pub else_list: Option<ListNode>,
}

/// A pipeline, optionally declaring (`$x := ...`) or assigning (`$x = ...`)
/// variables.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PipeNode {
    pub pos: Pos,
    pub is_assign: bool,
    pub decl: Vec<VariableNode>,
    pub cmds: Vec<CommandNode>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct CommandNode {
    pub pos: Pos,
    pub args: Vec<Arg>,
}

/// `$name.Field.Field`. The first identifier keeps its `$`; `$` alone is the
/// root data.
#[derive(Debug, Clone, PartialEq)]
pub struct VariableNode {
    pub pos: Pos,
    pub ident: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NumberNode {
    pub pos: Pos,
    pub text: String,
    pub int: Option<i64>,
    pub float: Option<f64>,
}

/// Operands of a command.
#[derive(Debug, Clone, PartialEq)]
pub enum Arg {
    Bool { pos: Pos, value: bool },
    Number(NumberNode),
    /// Already unquoted.
    String { pos: Pos, text: String },
    Nil { pos: Pos },
    Dot { pos: Pos },
    /// `.A.B`
    Field { pos: Pos, ident: Vec<String> },
    /// `(pipeline).A.B`
    Chain {
        pos: Pos,
        node: Box<Arg>,
        field: Vec<String>,
    },
    Variable(VariableNode),
    /// A function name.
    Identifier { pos: Pos, name: String },
    /// A parenthesized pipeline.
    Pipe(PipeNode),
}

// ============================================================================
// Constructors
// ============================================================================

fn split_path(path: &str) -> Vec<String> {
    path.split('.')
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

impl Node {
    pub fn text(text: impl Into<String>) -> Self {
        Node::Text {
            pos: 0,
            text: text.into(),
        }
    }

    pub fn action(pipe: impl Into<PipeNode>) -> Self {
        Node::Action {
            pos: 0,
            pipe: pipe.into(),
        }
    }

    pub fn comment(text: impl Into<String>) -> Self {
        Node::Comment {
            pos: 0,
            text: text.into(),
        }
    }

    pub fn if_(pipe: impl Into<PipeNode>, list: Vec<Node>, else_list: Option<Vec<Node>>) -> Self {
        Node::If(BranchNode::new(pipe, list, else_list))
    }

    pub fn with(pipe: impl Into<PipeNode>, list: Vec<Node>, else_list: Option<Vec<Node>>) -> Self {
        Node::With(BranchNode::new(pipe, list, else_list))
    }

    pub fn range(pipe: impl Into<PipeNode>, list: Vec<Node>, else_list: Option<Vec<Node>>) -> Self {
        Node::Range(BranchNode::new(pipe, list, else_list))
    }

    pub fn template(name: impl Into<String>, pipe: Option<PipeNode>) -> Self {
        Node::Template {
            pos: 0,
            name: name.into(),
            pipe,
        }
    }

    pub fn pos(&self) -> Pos {
        match self {
            Node::List(l) => l.pos,
            Node::If(b) | Node::With(b) | Node::Range(b) => b.pos,
            Node::Text { pos, .. }
            | Node::Action { pos, .. }
            | Node::Comment { pos, .. }
            | Node::Template { pos, .. }
            | Node::Break { pos }
            | Node::Continue { pos } => *pos,
        }
    }

    pub fn at(mut self, at: Pos) -> Self {
        match &mut self {
            Node::List(l) => l.pos = at,
            Node::If(b) | Node::With(b) | Node::Range(b) => b.pos = at,
            Node::Text { pos, .. }
            | Node::Action { pos, .. }
            | Node::Comment { pos, .. }
            | Node::Template { pos, .. }
            | Node::Break { pos }
            | Node::Continue { pos } => *pos = at,
        }
        self
    }
}

impl BranchNode {
    pub fn new(pipe: impl Into<PipeNode>, list: Vec<Node>, else_list: Option<Vec<Node>>) -> Self {
        Self {
            pos: 0,
            pipe: pipe.into(),
            list: list.into(),
            else_list: else_list.map(Into::into),
        }
    }
}

impl PipeNode {
    pub fn new(cmds: Vec<CommandNode>) -> Self {
        Self {
            cmds,
            ..Default::default()
        }
    }

    /// Declare variables, e.g. `["$x"]` or `["$i", "$v"]` in a range.
    pub fn declare(mut self, names: &[&str]) -> Self {
        self.is_assign = false;
        self.decl = names.iter().map(|n| VariableNode::new(n)).collect();
        self
    }

    /// Assign to an existing variable.
    pub fn assign(mut self, name: &str) -> Self {
        self.is_assign = true;
        self.decl = vec![VariableNode::new(name)];
        self
    }

    pub fn at(mut self, pos: Pos) -> Self {
        self.pos = pos;
        self
    }
}

impl From<Arg> for PipeNode {
    fn from(arg: Arg) -> Self {
        PipeNode::new(vec![arg.into()])
    }
}

impl From<CommandNode> for PipeNode {
    fn from(cmd: CommandNode) -> Self {
        PipeNode::new(vec![cmd])
    }
}

/// A pipeline of a single command.
impl From<Vec<Arg>> for PipeNode {
    fn from(args: Vec<Arg>) -> Self {
        PipeNode::new(vec![args.into()])
    }
}

impl From<Vec<CommandNode>> for PipeNode {
    fn from(cmds: Vec<CommandNode>) -> Self {
        PipeNode::new(cmds)
    }
}

impl CommandNode {
    pub fn new(args: Vec<Arg>) -> Self {
        Self { pos: 0, args }
    }
}

impl From<Arg> for CommandNode {
    fn from(arg: Arg) -> Self {
        CommandNode::new(vec![arg])
    }
}

impl From<Vec<Arg>> for CommandNode {
    fn from(args: Vec<Arg>) -> Self {
        CommandNode::new(args)
    }
}

impl VariableNode {
    /// `"$x.A.B"` → `["$x", "A", "B"]`.
    pub fn new(path: &str) -> Self {
        let (head, rest) = match path.find('.') {
            Some(i) => (&path[..i], &path[i..]),
            None => (path, ""),
        };
        let mut ident = vec![head.to_string()];
        ident.extend(split_path(rest));
        Self { pos: 0, ident }
    }
}

impl Arg {
    pub fn bool(value: bool) -> Self {
        Arg::Bool { pos: 0, value }
    }

    pub fn int(value: i64) -> Self {
        Arg::Number(NumberNode {
            pos: 0,
            text: value.to_string(),
            int: Some(value),
            float: Some(value as f64),
        })
    }

    pub fn float(value: f64) -> Self {
        let mut text = value.to_string();
        if !text.contains(['.', 'e', 'E']) {
            text.push_str(".0");
        }
        Arg::Number(NumberNode {
            pos: 0,
            text,
            int: None,
            float: Some(value),
        })
    }

    pub fn string(text: impl Into<String>) -> Self {
        Arg::String {
            pos: 0,
            text: text.into(),
        }
    }

    pub fn nil() -> Self {
        Arg::Nil { pos: 0 }
    }

    pub fn dot() -> Self {
        Arg::Dot { pos: 0 }
    }

    /// `"A.B"` or `".A.B"`.
    pub fn field(path: &str) -> Self {
        Arg::Field {
            pos: 0,
            ident: split_path(path),
        }
    }

    pub fn chain(node: Arg, path: &str) -> Self {
        Arg::Chain {
            pos: 0,
            node: Box::new(node),
            field: split_path(path),
        }
    }

    pub fn var(path: &str) -> Self {
        Arg::Variable(VariableNode::new(path))
    }

    pub fn ident(name: impl Into<String>) -> Self {
        Arg::Identifier {
            pos: 0,
            name: name.into(),
        }
    }

    pub fn pipe(pipe: impl Into<PipeNode>) -> Self {
        Arg::Pipe(pipe.into())
    }

    pub fn pos(&self) -> Pos {
        match self {
            Arg::Number(n) => n.pos,
            Arg::Variable(v) => v.pos,
            Arg::Pipe(p) => p.pos,
            Arg::Bool { pos, .. }
            | Arg::String { pos, .. }
            | Arg::Nil { pos }
            | Arg::Dot { pos }
            | Arg::Field { pos, .. }
            | Arg::Chain { pos, .. }
            | Arg::Identifier { pos, .. } => *pos,
        }
    }

    pub fn at(mut self, at: Pos) -> Self {
        match &mut self {
            Arg::Number(n) => n.pos = at,
            Arg::Variable(v) => v.pos = at,
            Arg::Pipe(p) => p.pos = at,
            Arg::Bool { pos, .. }
            | Arg::String { pos, .. }
            | Arg::Nil { pos }
            | Arg::Dot { pos }
            | Arg::Field { pos, .. }
            | Arg::Chain { pos, .. }
            | Arg::Identifier { pos, .. } => *pos = at,
        }
        self
    }
}
