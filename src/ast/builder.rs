//! Node-construction helpers, plus the keyword-argument constructor
//! dispatch (`construct`) used by `unastify` to rebuild nodes from
//! `mantra.ast.<Kind>` calls.
//!
//! All helpers produce nodes with a default (missing) span; expansion
//! postprocessing fills spans in afterwards.

use std::collections::HashMap;

use once_cell::sync::Lazy;

use crate::ast::{AstNode, Expr, Marker, NameCtx, Path, Span, Value, WithSpan};
use crate::diagnostics::{lower_error, MantraError};

/// Wraps an expression in a node with a missing span.
pub fn node(value: Expr) -> AstNode {
    WithSpan {
        value,
        span: Span::default(),
    }
}

/// Wraps an expression in a node at an explicit span.
pub fn with_span(value: Expr, span: Span) -> AstNode {
    WithSpan { value, span }
}

pub fn nil() -> AstNode {
    node(Expr::Nil)
}

pub fn boolean(b: bool) -> AstNode {
    node(Expr::Bool(b))
}

pub fn int(i: i64) -> AstNode {
    node(Expr::Int(i))
}

pub fn float(x: f64) -> AstNode {
    node(Expr::Float(x))
}

pub fn string(s: impl Into<String>) -> AstNode {
    node(Expr::Str(s.into()))
}

pub fn bytes(b: impl Into<Vec<u8>>) -> AstNode {
    node(Expr::Bytes(b.into()))
}

/// A symbol with no binding context; postprocessing assigns one.
pub fn sym(name: impl Into<String>) -> AstNode {
    node(Expr::Symbol {
        name: name.into(),
        ctx: None,
    })
}

pub fn sym_ctx(name: impl Into<String>, ctx: NameCtx) -> AstNode {
    node(Expr::Symbol {
        name: name.into(),
        ctx: Some(ctx),
    })
}

pub fn path(segments: &[&str]) -> AstNode {
    node(Expr::Path(Path::new(segments)))
}

pub fn list(items: Vec<AstNode>) -> AstNode {
    node(Expr::List(items))
}

pub fn tuple(items: Vec<AstNode>) -> AstNode {
    node(Expr::Tuple(items))
}

pub fn set(items: Vec<AstNode>) -> AstNode {
    node(Expr::Set(items))
}

pub fn map(entries: Vec<(AstNode, AstNode)>) -> AstNode {
    node(Expr::Map(entries))
}

pub fn call(callee: AstNode, args: Vec<AstNode>) -> AstNode {
    node(Expr::Call {
        callee: Box::new(callee),
        args,
        kwargs: Vec::new(),
    })
}

pub fn call_kw(callee: AstNode, args: Vec<AstNode>, kwargs: Vec<AstNode>) -> AstNode {
    node(Expr::Call {
        callee: Box::new(callee),
        args,
        kwargs,
    })
}

pub fn kwarg(name: impl Into<String>, value: AstNode) -> AstNode {
    node(Expr::Kwarg {
        name: name.into(),
        value: Box::new(value),
    })
}

pub fn assign(target: AstNode, value: AstNode) -> AstNode {
    node(Expr::Assign {
        target: Box::new(target),
        value: Box::new(value),
    })
}

pub fn block(body: Vec<AstNode>) -> AstNode {
    node(Expr::Block(body))
}

pub fn literal_marker(body: AstNode) -> AstNode {
    node(Expr::Marker(Marker::Literal(Box::new(body))))
}

pub fn capture_marker(body: AstNode, name: impl Into<String>) -> AstNode {
    node(Expr::Marker(Marker::CaptureLater {
        body: Box::new(body),
        name: name.into(),
    }))
}

// ----------------------------------------------------------------------------
// Keyword-argument construction (`mantra.ast.<Kind>` dispatch)
// ----------------------------------------------------------------------------

/// Lowered fields of a constructor call, as seen by a kind constructor.
pub struct CtorFields<'a> {
    kind: &'a str,
    fields: &'a [(String, Value)],
}

impl<'a> CtorFields<'a> {
    fn get(&self, name: &str) -> Option<&'a Value> {
        self.fields
            .iter()
            .find(|(field, _)| field == name)
            .map(|(_, value)| value)
    }

    fn require(&self, name: &str) -> Result<&'a Value, MantraError> {
        let Some(value) = self.get(name) else {
            return Err(lower_error(
                format!("mantra.ast.{} is missing field `{}`", self.kind, name),
                None,
            ));
        };
        Ok(value)
    }

    fn require_str(&self, name: &str) -> Result<&'a str, MantraError> {
        let value = self.require(name)?;
        let Some(s) = value.as_str() else {
            return Err(self.bad_field(name, "a string", value));
        };
        Ok(s)
    }

    fn require_node(&self, name: &str) -> Result<AstNode, MantraError> {
        self.node_from(name, self.require(name)?)
    }

    fn node_from(&self, name: &str, value: &Value) -> Result<AstNode, MantraError> {
        let Some(node) = value.as_node() else {
            return Err(self.bad_field(name, "a node", value));
        };
        Ok(node.clone())
    }

    fn require_nodes(&self, name: &str) -> Result<Vec<AstNode>, MantraError> {
        let value = self.require(name)?;
        let Value::List(items) = value else {
            return Err(self.bad_field(name, "a list of nodes", value));
        };
        items
            .iter()
            .map(|item| self.node_from(name, item))
            .collect()
    }

    fn optional_nodes(&self, name: &str) -> Result<Vec<AstNode>, MantraError> {
        match self.get(name) {
            None => Ok(Vec::new()),
            Some(_) => self.require_nodes(name),
        }
    }

    fn bad_field(&self, name: &str, expected: &str, got: &Value) -> MantraError {
        lower_error(
            format!(
                "mantra.ast.{} field `{}` must be {}, got {}: {}",
                self.kind,
                name,
                expected,
                got.type_name(),
                got
            ),
            None,
        )
    }
}

type Ctor = fn(&CtorFields<'_>) -> Result<Expr, MantraError>;

static CONSTRUCTORS: Lazy<HashMap<&'static str, Ctor>> = Lazy::new(|| {
    let mut table: HashMap<&'static str, Ctor> = HashMap::new();
    table.insert("Nil", |_| Ok(Expr::Nil));
    table.insert("Bool", |f| {
        let Value::Bool(b) = f.require("value")? else {
            return Err(f.bad_field("value", "a bool", f.require("value")?));
        };
        Ok(Expr::Bool(*b))
    });
    table.insert("Int", |f| {
        let Value::Int(i) = f.require("value")? else {
            return Err(f.bad_field("value", "an int", f.require("value")?));
        };
        Ok(Expr::Int(*i))
    });
    table.insert("Float", |f| {
        let Value::Float(x) = f.require("value")? else {
            return Err(f.bad_field("value", "a float", f.require("value")?));
        };
        Ok(Expr::Float(*x))
    });
    table.insert("Str", |f| Ok(Expr::Str(f.require_str("value")?.to_string())));
    table.insert("Bytes", |f| {
        let Value::Bytes(b) = f.require("value")? else {
            return Err(f.bad_field("value", "bytes", f.require("value")?));
        };
        Ok(Expr::Bytes(b.clone()))
    });
    table.insert("Symbol", |f| {
        let name = f.require_str("name")?.to_string();
        let ctx = match f.get("ctx") {
            None | Some(Value::Nil) => None,
            Some(Value::Str(s)) if s == "load" => Some(NameCtx::Load),
            Some(Value::Str(s)) if s == "store" => Some(NameCtx::Store),
            Some(other) => {
                return Err(f.bad_field("ctx", "\"load\", \"store\", or nil", other));
            }
        };
        Ok(Expr::Symbol { name, ctx })
    });
    table.insert("Path", |f| {
        let Value::List(items) = f.require("segments")? else {
            return Err(f.bad_field("segments", "a list of strings", f.require("segments")?));
        };
        let segments = items
            .iter()
            .map(|item| match item.as_str() {
                Some(s) => Ok(s.to_string()),
                None => Err(f.bad_field("segments", "a list of strings", item)),
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Expr::Path(Path(segments)))
    });
    table.insert("List", |f| Ok(Expr::List(f.require_nodes("items")?)));
    table.insert("Tuple", |f| Ok(Expr::Tuple(f.require_nodes("items")?)));
    table.insert("Set", |f| Ok(Expr::Set(f.require_nodes("items")?)));
    table.insert("Map", |f| {
        let Value::List(entries) = f.require("entries")? else {
            return Err(f.bad_field("entries", "a list of key/value pairs", f.require("entries")?));
        };
        let mut out = Vec::with_capacity(entries.len());
        for entry in entries {
            let Value::Tuple(pair) = entry else {
                return Err(f.bad_field("entries", "a list of key/value pairs", entry));
            };
            let [key, value] = pair.as_slice() else {
                return Err(f.bad_field("entries", "a list of key/value pairs", entry));
            };
            out.push((f.node_from("entries", key)?, f.node_from("entries", value)?));
        }
        Ok(Expr::Map(out))
    });
    table.insert("Call", |f| {
        Ok(Expr::Call {
            callee: Box::new(f.require_node("callee")?),
            args: f.optional_nodes("args")?,
            kwargs: f.optional_nodes("kwargs")?,
        })
    });
    table.insert("Kwarg", |f| {
        Ok(Expr::Kwarg {
            name: f.require_str("name")?.to_string(),
            value: Box::new(f.require_node("value")?),
        })
    });
    table.insert("Assign", |f| {
        Ok(Expr::Assign {
            target: Box::new(f.require_node("target")?),
            value: Box::new(f.require_node("value")?),
        })
    });
    table.insert("Block", |f| Ok(Expr::Block(f.require_nodes("body")?)));
    table
});

/// Builds a node of the named kind from lowered keyword arguments, the way
/// an emitted `mantra.ast.<Kind>` call would construct it at run time.
///
/// Positional arguments are rejected: emitted constructor calls use keyword
/// arguments exclusively.
pub fn construct(
    kind: &str,
    args: &[Value],
    fields: &[(String, Value)],
) -> Result<AstNode, MantraError> {
    if !args.is_empty() {
        return Err(lower_error(
            format!(
                "mantra.ast.{} takes keyword arguments only, got {} positional",
                kind,
                args.len()
            ),
            None,
        ));
    }
    let Some(ctor) = CONSTRUCTORS.get(kind) else {
        return Err(lower_error(
            format!("unknown node constructor `mantra.ast.{}`", kind),
            None,
        ));
    };
    let value = ctor(&CtorFields { kind, fields })?;
    Ok(node(value))
}
