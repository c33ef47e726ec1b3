//! # Mantra
//!
//! A macro-expansion engine with a quasiquote and hygiene subsystem,
//! operating on s-expression-flavoured syntax trees.
//!
//! The pipeline: build or receive a tree, merge [`quotes::bindings`] with
//! your own macro bindings, and run [`expander::expand_unit`] over it with a
//! per-unit [`session::Session`]. The expanded tree is guaranteed free of
//! quasiquote markers; evaluating it (including the emitted
//! `mantra.quotes.*` calls) is the host's job.
//!
//! ```
//! use mantra::{expander, quotes, session::Session};
//! use mantra::ast::builder;
//!
//! let session = Session::new();
//! let tree = builder::list(vec![
//!     builder::sym("q"),
//!     builder::list(vec![builder::sym("+"), builder::int(1), builder::int(2)]),
//! ]);
//! let expanded = expander::expand_unit(tree, quotes::bindings(), "demo", &session)?;
//! let lowered = quotes::unastify(&expanded)?;
//! assert!(lowered.as_node().is_some());
//! # Ok::<(), mantra::MantraError>(())
//! ```

pub mod ast;
pub mod diagnostics;
pub mod expander;
pub mod quotes;
pub mod session;

pub use ast::{AstNode, Expr, Span, WithSpan};
pub use diagnostics::{ErrorContext, ErrorType, MantraError};
pub use expander::{expand_macros, expand_unit, BindingTable, Expander, MacroCall, MacroFn, Mode};
pub use session::Session;
