//! # Mantra AST
//!
//! The core syntax-tree types the expansion engine rewrites: spans, the
//! span-carrying [`WithSpan`] wrapper, and the [`Expr`] node enum.
//!
//! ## Core principles
//!
//! - All nodes carry a span for source tracking; expansion postprocessing
//!   fills in spans that generated code left missing.
//! - Quasiquote markers are ordinary `Expr` variants ([`Expr::Marker`]), so
//!   every generic walker matches them exhaustively. They must never survive
//!   a completed expansion (see `ast::markers`).
//! - The tree is a plain value: transformation never mutates input in place.

use serde::{Deserialize, Serialize};
use std::fmt;

pub mod builder;
pub mod markers;
pub mod value;
pub mod walk;

pub use markers::Marker;
pub use value::Value;

/// Represents a span in the source code.
///
/// A `Span::default()` (zero-width at offset 0) is treated as "missing" and
/// gets filled in from context during expansion postprocessing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    /// True if this span carries no real location information.
    pub fn is_missing(&self) -> bool {
        *self == Span::default()
    }
}

/// Wrapper carrying source span information with any value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WithSpan<T> {
    pub value: T,
    pub span: Span,
}

/// Canonical AST node type.
pub type AstNode = WithSpan<Expr>;

/// Binding context of an identifier: is the name being read or written?
///
/// Left as `None` by code generators; repaired by the expansion
/// postprocessing step (`expander::fixers::fix_missing_ctx`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NameCtx {
    Load,
    Store,
}

/// A dotted reference, such as `mantra.quotes.lookup`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Path(pub Vec<String>);

impl Path {
    pub fn new(segments: &[&str]) -> Self {
        Path(segments.iter().map(|s| s.to_string()).collect())
    }

    /// Dotted rendering, `a.b.c`.
    pub fn dotted(&self) -> String {
        self.0.join(".")
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.dotted())
    }
}

/// The core AST node for Mantra trees.
///
/// Every variant is either an atom, a collection of child nodes, a code
/// shape, or a quasiquote marker. Fields hold child nodes, lists of child
/// nodes, or atomic literals; nothing else.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expr {
    // Atoms.
    Nil,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Bytes(Vec<u8>),

    /// An identifier reference. `ctx` distinguishes reads from writes and is
    /// filled in by expansion postprocessing when generators leave it `None`.
    Symbol {
        name: String,
        ctx: Option<NameCtx>,
    },

    /// A dotted reference into a namespace, such as `mantra.ast.Symbol`.
    Path(Path),

    // Collections.
    List(Vec<AstNode>),
    Tuple(Vec<AstNode>),
    Set(Vec<AstNode>),
    /// Ordered key/value entries; key uniqueness is the producer's concern.
    Map(Vec<(AstNode, AstNode)>),

    // Code shapes.
    Call {
        callee: Box<AstNode>,
        args: Vec<AstNode>,
        kwargs: Vec<AstNode>,
    },
    /// Keyword-argument pairing node, only meaningful inside `Call.kwargs`.
    Kwarg {
        name: String,
        value: Box<AstNode>,
    },
    Assign {
        target: Box<AstNode>,
        value: Box<AstNode>,
    },
    Block(Vec<AstNode>),

    /// Quasiquote marker. Structurally a normal node so generic walkers pass
    /// through it, but it must never reach a finished compilation unit.
    Marker(Marker),
}

impl Expr {
    /// Returns the symbol name if this is a `Symbol`.
    pub fn symbol_name(&self) -> Option<&str> {
        match self {
            Expr::Symbol { name, .. } => Some(name),
            _ => None,
        }
    }

    /// True if this node is a quasiquote marker.
    pub fn is_marker(&self) -> bool {
        matches!(self, Expr::Marker(_))
    }

    /// Renders the expression as surface text, for diagnostics only.
    pub fn pretty(&self) -> String {
        match self {
            Expr::Nil => "nil".to_string(),
            Expr::Bool(b) => b.to_string(),
            Expr::Int(i) => i.to_string(),
            Expr::Float(x) => x.to_string(),
            Expr::Str(s) => format!("{:?}", s),
            Expr::Bytes(bytes) => Self::pretty_bytes(bytes),
            Expr::Symbol { name, .. } => name.clone(),
            Expr::Path(p) => p.dotted(),
            Expr::List(items) => Self::pretty_seq("", items),
            Expr::Tuple(items) => Self::pretty_seq("tuple ", items),
            Expr::Set(items) => Self::pretty_seq("set ", items),
            Expr::Map(entries) => Self::pretty_map(entries),
            Expr::Call {
                callee,
                args,
                kwargs,
            } => Self::pretty_call(callee, args, kwargs),
            Expr::Kwarg { name, value } => format!(":{} {}", name, value.value.pretty()),
            Expr::Assign { target, value } => {
                format!("(set! {} {})", target.value.pretty(), value.value.pretty())
            }
            Expr::Block(items) => Self::pretty_seq("begin ", items),
            Expr::Marker(Marker::Literal(body)) => {
                format!("#<literal: {}>", body.value.pretty())
            }
            Expr::Marker(Marker::CaptureLater { body, name }) => {
                format!("#<capture-later {:?}: {}>", name, body.value.pretty())
            }
        }
    }

    fn pretty_seq(head: &str, items: &[AstNode]) -> String {
        let inner = items
            .iter()
            .map(|e| e.value.pretty())
            .collect::<Vec<_>>()
            .join(" ");
        format!("({}{})", head, inner)
    }

    fn pretty_map(entries: &[(AstNode, AstNode)]) -> String {
        let inner = entries
            .iter()
            .map(|(k, v)| format!("{} {}", k.value.pretty(), v.value.pretty()))
            .collect::<Vec<_>>()
            .join(" ");
        format!("{{{}}}", inner)
    }

    fn pretty_bytes(bytes: &[u8]) -> String {
        let inner = bytes
            .iter()
            .map(|b| b.to_string())
            .collect::<Vec<_>>()
            .join(" ");
        format!("(bytes {})", inner)
    }

    fn pretty_call(callee: &AstNode, args: &[AstNode], kwargs: &[AstNode]) -> String {
        let mut parts = vec![callee.value.pretty()];
        parts.extend(args.iter().map(|a| a.value.pretty()));
        parts.extend(kwargs.iter().map(|k| k.value.pretty()));
        format!("({})", parts.join(" "))
    }
}

/// Renders a node as surface text, for diagnostics only.
///
/// Used by the expander for error messages and by the `h` operator to derive
/// human-readable capture names; not a serialization format.
pub fn render(node: &AstNode) -> String {
    node.value.pretty()
}
