//! The runtime-value domain that `astify`/`unastify` map to and from.
//!
//! Trees are first-class values (`Value::Node`), which is what makes the
//! quote operators compositional: lowering a quoted tree yields a value
//! whose node payload can be expanded and re-lifted.

use std::fmt;
use std::rc::Rc;

use serde::{Deserialize, Serialize};

use crate::ast::AstNode;

/// A runtime value, as seen by the lift/lower transform and the hygienic
/// capture registry.
///
/// Captured values are stored behind `Rc` so capture dedup can use pointer
/// identity rather than structural equality.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Nil,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Bytes(Vec<u8>),
    List(Vec<Value>),
    Tuple(Vec<Value>),
    Set(Vec<Value>),
    Map(Vec<(Value, Value)>),
    /// A syntax tree as a value.
    Node(AstNode),
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Nil => "nil",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "string",
            Value::Bytes(_) => "bytes",
            Value::List(_) => "list",
            Value::Tuple(_) => "tuple",
            Value::Set(_) => "set",
            Value::Map(_) => "map",
            Value::Node(_) => "node",
        }
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, Value::Nil)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_node(&self) -> Option<&AstNode> {
        match self {
            Value::Node(node) => Some(node),
            _ => None,
        }
    }

    /// Wraps a value in `Rc` for identity-keyed capture.
    pub fn shared(self) -> Rc<Value> {
        Rc::new(self)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => write!(f, "nil"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(x) => write!(f, "{}", x),
            Value::Str(s) => write!(f, "{:?}", s),
            Value::Bytes(bytes) => {
                write!(f, "(bytes")?;
                for b in bytes {
                    write!(f, " {}", b)?;
                }
                write!(f, ")")
            }
            Value::List(items) => write_seq(f, "", items),
            Value::Tuple(items) => write_seq(f, "tuple ", items),
            Value::Set(items) => write_seq(f, "set ", items),
            Value::Map(entries) => {
                write!(f, "{{")?;
                for (i, (k, v)) in entries.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{} {}", k, v)?;
                }
                write!(f, "}}")
            }
            Value::Node(node) => write!(f, "#<node: {}>", node.value.pretty()),
        }
    }
}

fn write_seq(f: &mut fmt::Formatter<'_>, head: &str, items: &[Value]) -> fmt::Result {
    write!(f, "({}", head)?;
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            write!(f, " ")?;
        }
        write!(f, "{}", item)?;
    }
    write!(f, ")")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::builder;

    #[test]
    fn display_renders_collections() {
        let v = Value::List(vec![
            Value::Int(1),
            Value::Str("a".into()),
            Value::Tuple(vec![Value::Int(2), Value::Int(3)]),
        ]);
        assert_eq!(v.to_string(), "(1 \"a\" (tuple 2 3))");
    }

    #[test]
    fn node_values_carry_trees() {
        let v = Value::Node(builder::sym("x"));
        assert_eq!(v.type_name(), "node");
        assert!(v.as_node().is_some());
    }
}
