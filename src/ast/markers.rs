//! Quasiquote markers and marker bookkeeping.
//!
//! Markers are internal placeholders the quote operators leave in the tree
//! mid-expansion. A finished compilation unit must contain none; the
//! `check_no_markers_remaining` postcondition enforces that.

use serde::{Deserialize, Serialize};

use crate::ast::{walk, AstNode, Expr};
use crate::diagnostics::{internal_error, MantraError};

/// A quasiquote marker node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Marker {
    /// "This subtree is already final output; do not lift it again."
    /// Pasted verbatim by `astify` when it reaches the marker.
    Literal(Box<AstNode>),

    /// "Capture the value of `body` hygienically when the quoted tree is
    /// lifted." Resolved by `astify`: either into a macro-registry rename or
    /// into an emitted run-time capture call keyed by `name`.
    CaptureLater { body: Box<AstNode>, name: String },
}

impl Marker {
    /// The subtree this marker wraps.
    pub fn body(&self) -> &AstNode {
        match self {
            Marker::Literal(body) => body,
            Marker::CaptureLater { body, .. } => body,
        }
    }
}

/// Collects references to every marker node in `tree`, in preorder.
pub fn get_markers(tree: &AstNode) -> Vec<&AstNode> {
    let mut found = Vec::new();
    walk::visit(tree, &mut |node| {
        if node.value.is_marker() {
            found.push(node);
        }
    });
    found
}

/// Replaces every marker in `tree` with its body, recursively.
pub fn delete_markers(tree: AstNode) -> AstNode {
    let unwrapped = match tree.value {
        Expr::Marker(marker) => {
            let body = match marker {
                Marker::Literal(body) => *body,
                Marker::CaptureLater { body, .. } => *body,
            };
            return delete_markers(body);
        }
        other => AstNode {
            value: other,
            span: tree.span,
        },
    };
    match walk::map_children(unwrapped, &mut |child| {
        Ok::<AstNode, std::convert::Infallible>(delete_markers(child))
    }) {
        Ok(node) => node,
        Err(never) => match never {},
    }
}

/// Verifies that no quasiquote markers survived expansion of a unit.
///
/// Surviving markers mean an operator was used outside a quote context or an
/// engine invariant broke; the unit must not be handed to the host.
pub fn check_no_markers_remaining(tree: &AstNode, filename: &str) -> Result<(), MantraError> {
    let remaining = get_markers(tree);
    let Some(first) = remaining.first() else {
        return Ok(());
    };
    Err(internal_error(
        format!(
            "{} quasiquote marker(s) remaining in expanded unit `{}`, first: {}",
            remaining.len(),
            filename,
            first.value.pretty()
        ),
        Some(first.span),
    ))
}
