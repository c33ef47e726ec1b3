//! Generic tree traversal: read-only preorder visits and a fallible
//! map-over-immediate-children used by the rewriting passes.
//!
//! Markers are transparent to both walks: a marker's body is an ordinary
//! child node.

use crate::ast::{AstNode, Expr, Marker};

/// Calls `f` on `node` and then on every descendant, in preorder.
pub fn visit<'a>(node: &'a AstNode, f: &mut dyn FnMut(&'a AstNode)) {
    f(node);
    match &node.value {
        Expr::Nil
        | Expr::Bool(_)
        | Expr::Int(_)
        | Expr::Float(_)
        | Expr::Str(_)
        | Expr::Bytes(_)
        | Expr::Symbol { .. }
        | Expr::Path(_) => {}
        Expr::List(items) | Expr::Tuple(items) | Expr::Set(items) | Expr::Block(items) => {
            for item in items {
                visit(item, f);
            }
        }
        Expr::Map(entries) => {
            for (k, v) in entries {
                visit(k, f);
                visit(v, f);
            }
        }
        Expr::Call {
            callee,
            args,
            kwargs,
        } => {
            visit(callee, f);
            for a in args {
                visit(a, f);
            }
            for k in kwargs {
                visit(k, f);
            }
        }
        Expr::Kwarg { value, .. } => visit(value, f),
        Expr::Assign { target, value } => {
            visit(target, f);
            visit(value, f);
        }
        Expr::Marker(marker) => visit(marker.body(), f),
    }
}

/// Rebuilds `node` with `f` applied to each immediate child.
///
/// One level only; callers recurse themselves where they need depth. The
/// first `Err` from `f` aborts the rebuild.
pub fn map_children<E>(
    node: AstNode,
    f: &mut dyn FnMut(AstNode) -> Result<AstNode, E>,
) -> Result<AstNode, E> {
    let span = node.span;
    let value = match node.value {
        atom @ (Expr::Nil
        | Expr::Bool(_)
        | Expr::Int(_)
        | Expr::Float(_)
        | Expr::Str(_)
        | Expr::Bytes(_)
        | Expr::Symbol { .. }
        | Expr::Path(_)) => atom,
        Expr::List(items) => Expr::List(map_vec(items, f)?),
        Expr::Tuple(items) => Expr::Tuple(map_vec(items, f)?),
        Expr::Set(items) => Expr::Set(map_vec(items, f)?),
        Expr::Block(items) => Expr::Block(map_vec(items, f)?),
        Expr::Map(entries) => {
            let mut out = Vec::with_capacity(entries.len());
            for (k, v) in entries {
                out.push((f(k)?, f(v)?));
            }
            Expr::Map(out)
        }
        Expr::Call {
            callee,
            args,
            kwargs,
        } => Expr::Call {
            callee: Box::new(f(*callee)?),
            args: map_vec(args, f)?,
            kwargs: map_vec(kwargs, f)?,
        },
        Expr::Kwarg { name, value } => Expr::Kwarg {
            name,
            value: Box::new(f(*value)?),
        },
        Expr::Assign { target, value } => Expr::Assign {
            target: Box::new(f(*target)?),
            value: Box::new(f(*value)?),
        },
        Expr::Marker(Marker::Literal(body)) => Expr::Marker(Marker::Literal(Box::new(f(*body)?))),
        Expr::Marker(Marker::CaptureLater { body, name }) => Expr::Marker(Marker::CaptureLater {
            body: Box::new(f(*body)?),
            name,
        }),
    };
    Ok(AstNode { value, span })
}

fn map_vec<E>(
    items: Vec<AstNode>,
    f: &mut dyn FnMut(AstNode) -> Result<AstNode, E>,
) -> Result<Vec<AstNode>, E> {
    items.into_iter().map(|item| f(item)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::builder;

    #[test]
    fn visit_is_preorder_and_covers_markers() {
        let tree = builder::list(vec![
            builder::sym("a"),
            builder::literal_marker(builder::sym("b")),
        ]);
        let mut names = Vec::new();
        visit(&tree, &mut |node| {
            if let Some(name) = node.value.symbol_name() {
                names.push(name.to_string());
            }
        });
        assert_eq!(names, vec!["a", "b"]);
    }

    #[test]
    fn map_children_touches_one_level_only() {
        let tree = builder::list(vec![
            builder::int(1),
            builder::list(vec![builder::int(2)]),
        ]);
        let mapped = map_children(tree, &mut |child| {
            Ok::<AstNode, std::convert::Infallible>(match child.value {
                Expr::Int(n) => builder::int(n + 10),
                other => AstNode {
                    value: other,
                    span: child.span,
                },
            })
        });
        let mapped = match mapped {
            Ok(node) => node,
            Err(never) => match never {},
        };
        // The nested list is an immediate child and is replaced wholesale,
        // but its own children are untouched.
        assert_eq!(
            mapped,
            builder::list(vec![
                builder::int(11),
                builder::list(vec![builder::int(2)]),
            ])
        );
    }
}
