//! The generic macro-expansion visitor.
//!
//! An [`Expander`] walks a tree with a binding table mapping macro names to
//! transformer functions, detects invocation sites, calls the transformer,
//! postprocesses the replacement (span fill-in, binding-context repair), and
//! either stops after one step or keeps going until no invocations remain,
//! depending on [`Mode`].

pub mod fixers;

use std::collections::HashMap;

use crate::ast::{self, builder, AstNode, Expr};
use crate::diagnostics::{ErrorContext, MantraError};
use crate::session::Session;

/// A macro transformer: receives the input subtree and the invocation
/// context, returns the replacement subtree.
pub type MacroFn = fn(AstNode, &mut MacroCall<'_, '_>) -> Result<AstNode, MantraError>;

/// Macro name to transformer function.
pub type BindingTable = HashMap<String, MacroFn>;

/// Which surface form the macro was invoked in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Syntax {
    /// `(name expr)`: the transformer receives `expr`.
    Expr,
    /// `(name (as target) stmt...)`: the transformer receives the
    /// statements as a `Block`, plus the optional target.
    Block,
}

/// Traversal mode, threaded explicitly through the walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Expand outermost invocations once and stop.
    Once,
    /// Keep expanding until no invocation sites remain.
    Recursive,
}

/// One invocation's context, handed to the transformer.
pub struct MacroCall<'e, 's> {
    pub syntax: Syntax,
    /// The `(as target)` node in block form, if given.
    pub target: Option<AstNode>,
    /// The expander running this invocation. Transformers use it to expand
    /// sub-trees, reach the session, or consult the binding table.
    pub expander: &'e mut Expander<'s>,
}

impl MacroCall<'_, '_> {
    /// Renders a node as surface text for diagnostics.
    pub fn render(&self, node: &AstNode) -> String {
        ast::render(node)
    }
}

/// The expansion visitor for one unit.
pub struct Expander<'s> {
    pub bindings: BindingTable,
    pub filename: String,
    pub session: &'s Session,
}

impl<'s> Expander<'s> {
    pub fn new(bindings: BindingTable, filename: impl Into<String>, session: &'s Session) -> Self {
        Self {
            bindings,
            filename: filename.into(),
            session,
        }
    }

    /// Expands outermost invocations once, leaving any invocations the
    /// replacement introduced untouched.
    pub fn visit_once(&mut self, tree: AstNode) -> Result<AstNode, MantraError> {
        self.visit_with(tree, Mode::Once)
    }

    /// Expands until no invocation sites remain.
    pub fn visit_recursively(&mut self, tree: AstNode) -> Result<AstNode, MantraError> {
        self.visit_with(tree, Mode::Recursive)
    }

    /// The generic walk. `mode` controls what happens after a successful
    /// expansion: stop (`Once`) or re-visit the replacement (`Recursive`).
    pub fn visit_with(&mut self, tree: AstNode, mode: Mode) -> Result<AstNode, MantraError> {
        // Nothing bound means nothing can expand.
        if self.bindings.is_empty() {
            return Ok(tree);
        }
        if let Some(invocation) = self.recognize_invocation(&tree) {
            return self.expand_invocation(tree, invocation, mode);
        }
        ast::walk::map_children(tree, &mut |child| self.visit_with(child, mode))
    }

    /// An invocation site is a `List` whose head is a `Symbol` bound in the
    /// binding table, with at least one more item. Bare bound symbols and
    /// one-element lists are not invocations.
    fn recognize_invocation(&self, tree: &AstNode) -> Option<Invocation> {
        let Expr::List(items) = &tree.value else {
            return None;
        };
        let (head, rest) = items.split_first()?;
        let name = head.value.symbol_name()?;
        if !self.bindings.contains_key(name) || rest.is_empty() {
            return None;
        }
        if rest.len() == 1 {
            return Some(Invocation {
                name: name.to_string(),
                syntax: Syntax::Expr,
                target: None,
                input: rest[0].clone(),
            });
        }
        // Block form; an optional `(as target)` first item names the target.
        let (target, body) = match Self::as_target(&rest[0]) {
            Some(target) => (Some(target), &rest[1..]),
            None => (None, rest),
        };
        Some(Invocation {
            name: name.to_string(),
            syntax: Syntax::Block,
            target,
            input: builder::with_span(Expr::Block(body.to_vec()), tree.span),
        })
    }

    fn as_target(item: &AstNode) -> Option<AstNode> {
        let Expr::List(parts) = &item.value else {
            return None;
        };
        let [head, target] = parts.as_slice() else {
            return None;
        };
        if head.value.symbol_name() != Some("as") {
            return None;
        }
        Some(target.clone())
    }

    fn expand_invocation(
        &mut self,
        tree: AstNode,
        invocation: Invocation,
        mode: Mode,
    ) -> Result<AstNode, MantraError> {
        let function = self.bindings[&invocation.name];
        let use_span = tree.span;
        let original_code = ast::render(&tree);
        let mut call = MacroCall {
            syntax: invocation.syntax,
            target: invocation.target,
            expander: self,
        };
        let expansion = match function(invocation.input, &mut call) {
            Ok(expansion) => expansion,
            Err(err) => {
                return Err(self.wrap_expansion_error(err, &invocation.name, use_span, &original_code))
            }
        };
        let expansion = fixers::fix_missing_spans(expansion, use_span);
        let expansion = fixers::fix_missing_ctx(expansion);
        match mode {
            Mode::Once => Ok(expansion),
            Mode::Recursive => self.visit_with(expansion, Mode::Recursive),
        }
    }

    /// Wraps a transformer failure with the use site. Re-wrapping an already
    /// wrapped error collapses to one layer around the root cause, so deeply
    /// nested invocations still report a single use site and one cause.
    fn wrap_expansion_error(
        &self,
        err: MantraError,
        macro_name: &str,
        use_span: crate::ast::Span,
        original_code: &str,
    ) -> MantraError {
        let cause = match err {
            MantraError::Expansion { cause, .. } => cause,
            other => Some(Box::new(other)),
        };
        MantraError::Expansion {
            macro_name: macro_name.to_string(),
            site: format!(
                "use site was at {}:{}: {}",
                self.filename, use_span.start, original_code
            ),
            ctx: ErrorContext::with_span(use_span),
            cause,
        }
    }
}

struct Invocation {
    name: String,
    syntax: Syntax,
    target: Option<AstNode>,
    input: AstNode,
}

/// Expands all macro invocations in `tree`, recursively.
pub fn expand_macros(
    tree: AstNode,
    bindings: BindingTable,
    filename: &str,
    session: &Session,
) -> Result<AstNode, MantraError> {
    Expander::new(bindings, filename, session).visit_recursively(tree)
}

/// Expands a whole compilation unit and verifies the marker-free
/// postcondition before handing the tree back.
pub fn expand_unit(
    tree: AstNode,
    bindings: BindingTable,
    filename: &str,
    session: &Session,
) -> Result<AstNode, MantraError> {
    let expanded = expand_macros(tree, bindings, filename, session)?;
    ast::markers::check_no_markers_remaining(&expanded, filename)?;
    Ok(expanded)
}
