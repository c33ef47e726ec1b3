//! Postprocessing passes run on every macro expansion before it re-enters
//! the tree: span fill-in and binding-context repair. Transformers may build
//! nodes with the bare builder helpers and leave both concerns to these
//! passes.

use crate::ast::{walk, AstNode, Expr, NameCtx, Span};

/// Fills in missing spans from the nearest enclosing node that has one,
/// starting from the use-site span of the invocation.
pub fn fix_missing_spans(tree: AstNode, reference: Span) -> AstNode {
    let span = if tree.span.is_missing() {
        reference
    } else {
        tree.span
    };
    let tree = AstNode {
        value: tree.value,
        span,
    };
    match walk::map_children(tree, &mut |child| {
        Ok::<AstNode, std::convert::Infallible>(fix_missing_spans(child, span))
    }) {
        Ok(node) => node,
        Err(never) => match never {},
    }
}

/// Assigns a binding context to every `Symbol` that lacks one: assignment
/// targets are stores, everything else is a load. Contexts already present
/// are kept.
pub fn fix_missing_ctx(tree: AstNode) -> AstNode {
    fix_ctx(tree, NameCtx::Load)
}

fn fix_ctx(tree: AstNode, ctx: NameCtx) -> AstNode {
    match tree.value {
        Expr::Symbol { name, ctx: None } => AstNode {
            value: Expr::Symbol {
                name,
                ctx: Some(ctx),
            },
            span: tree.span,
        },
        Expr::Assign { target, value } => AstNode {
            value: Expr::Assign {
                target: Box::new(fix_ctx(*target, NameCtx::Store)),
                value: Box::new(fix_ctx(*value, NameCtx::Load)),
            },
            span: tree.span,
        },
        other => {
            let tree = AstNode {
                value: other,
                span: tree.span,
            };
            match walk::map_children(tree, &mut |child| {
                Ok::<AstNode, std::convert::Infallible>(fix_ctx(child, NameCtx::Load))
            }) {
                Ok(node) => node,
                Err(never) => match never {},
            }
        }
    }
}
