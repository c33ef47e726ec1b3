//! # Mantra Diagnostics
//!
//! The unified, `miette`-based diagnostic system for the Mantra engine. Every
//! failure mode of the expansion pipeline is represented by a [`MantraError`]
//! variant; no stage defines its own error type.
//!
//! Error taxonomy:
//!
//! - `Syntax`: malformed use of an operator (wrong shape, unquote outside a
//!   quote, non-identifier block target). Fatal to the current expansion pass.
//! - `Lift` / `Lower`: a value or tree shape `astify`/`unastify` cannot
//!   handle, surfaced with the offending value's rendering.
//! - `Expansion`: a transformer failed during expansion. Wraps the original
//!   cause and annotates it with the use-site location and source text.
//! - `Lookup`: a hygienic-capture key minted by the engine was never stored.
//!   Always fatal; indicates registry state was lost, never retried.
//! - `Internal`: an engine invariant was violated (for example, quasiquote
//!   markers remaining after a completed quote). Aborts the pass.
//!
//! No operation in this engine is retried; expansion of a unit either fully
//! succeeds or the whole unit fails.

use std::sync::Arc;

use miette::{Diagnostic, LabeledSpan, NamedSource, SourceCode};
use thiserror::Error;

use crate::ast::Span;

/// Shared, named source text for rich diagnostic rendering.
pub type SourceArc = Arc<NamedSource<String>>;

/// Type-safe error classification that corresponds to `MantraError` variants.
/// Lets test code match on error kinds without string comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorType {
    /// Malformed operator use: bad arity/shape, unquote at level 0.
    Syntax,
    /// A value `astify` does not know how to lift.
    Lift,
    /// A tree `unastify` does not know how to lower.
    Lower,
    /// A transformer raised during macro expansion.
    Expansion,
    /// A capture-registry key was absent.
    Lookup,
    /// An engine invariant was violated.
    Internal,
}

impl ErrorType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorType::Syntax => "Syntax",
            ErrorType::Lift => "Lift",
            ErrorType::Lower => "Lower",
            ErrorType::Expansion => "Expansion",
            ErrorType::Lookup => "Lookup",
            ErrorType::Internal => "Internal",
        }
    }
}

impl std::fmt::Display for ErrorType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Minimal, composable error context for diagnostics.
#[derive(Debug, Default)]
pub struct ErrorContext {
    /// The primary source for this error (if any).
    pub source: Option<SourceArc>,
    /// The primary span for this error (if any).
    pub span: Option<Span>,
    /// An optional help message.
    pub help: Option<String>,
}

impl ErrorContext {
    /// Returns an empty error context (no source, span, or help).
    pub fn none() -> Self {
        Self::default()
    }

    /// Creates a context with only a span.
    pub fn with_span(span: Span) -> Self {
        Self {
            source: None,
            span: Some(span),
            help: None,
        }
    }

    /// Creates a context with both source and span.
    pub fn with_source_and_span(source: SourceArc, span: Span) -> Self {
        Self {
            source: Some(source),
            span: Some(span),
            help: None,
        }
    }
}

/// Unified error type for all Mantra engine failure modes.
///
/// `Expansion` carries its original cause as a boxed `#[source]` so the root
/// failure remains inspectable through the standard error chain. Nested
/// expansion wrapping is collapsed at wrap time (see `expander`), so the
/// chain is always `Expansion -> root cause`, never a tower of wrappers.
#[derive(Debug, Error)]
pub enum MantraError {
    #[error("Syntax error: {message}")]
    Syntax { message: String, ctx: ErrorContext },

    #[error("Lift error: {message}")]
    Lift { message: String, ctx: ErrorContext },

    #[error("Lower error: {message}")]
    Lower { message: String, ctx: ErrorContext },

    #[error("Macro expansion failed in `{macro_name}`: {site}")]
    Expansion {
        macro_name: String,
        /// Use-site location and original source text, pre-formatted.
        site: String,
        ctx: ErrorContext,
        #[source]
        cause: Option<Box<MantraError>>,
    },

    #[error("Hygienic capture lookup failed: no value stored under key `{key}`")]
    Lookup { key: String, ctx: ErrorContext },

    #[error("Internal error: {message}")]
    Internal { message: String, ctx: ErrorContext },
}

impl MantraError {
    fn get_ctx(&self) -> &ErrorContext {
        match self {
            MantraError::Syntax { ctx, .. } => ctx,
            MantraError::Lift { ctx, .. } => ctx,
            MantraError::Lower { ctx, .. } => ctx,
            MantraError::Expansion { ctx, .. } => ctx,
            MantraError::Lookup { ctx, .. } => ctx,
            MantraError::Internal { ctx, .. } => ctx,
        }
    }

    /// Returns the type-safe classification for this error.
    pub fn error_type(&self) -> ErrorType {
        match self {
            MantraError::Syntax { .. } => ErrorType::Syntax,
            MantraError::Lift { .. } => ErrorType::Lift,
            MantraError::Lower { .. } => ErrorType::Lower,
            MantraError::Expansion { .. } => ErrorType::Expansion,
            MantraError::Lookup { .. } => ErrorType::Lookup,
            MantraError::Internal { .. } => ErrorType::Internal,
        }
    }

    /// Returns the primary span, if one was recorded.
    pub fn span(&self) -> Option<Span> {
        self.get_ctx().span
    }

    /// Attaches source text to this error for rendering, keeping everything
    /// else intact.
    pub fn with_source(mut self, source: SourceArc) -> Self {
        match &mut self {
            MantraError::Syntax { ctx, .. }
            | MantraError::Lift { ctx, .. }
            | MantraError::Lower { ctx, .. }
            | MantraError::Expansion { ctx, .. }
            | MantraError::Lookup { ctx, .. }
            | MantraError::Internal { ctx, .. } => ctx.source = Some(source),
        }
        self
    }

    fn label_text(&self) -> String {
        match self {
            MantraError::Syntax { message, .. } => message.clone(),
            MantraError::Lift { message, .. } => message.clone(),
            MantraError::Lower { message, .. } => message.clone(),
            MantraError::Expansion { site, .. } => site.clone(),
            MantraError::Lookup { key, .. } => format!("key `{}` not found", key),
            MantraError::Internal { message, .. } => message.clone(),
        }
    }
}

impl Diagnostic for MantraError {
    fn code<'a>(&'a self) -> Option<Box<dyn std::fmt::Display + 'a>> {
        None
    }

    fn help<'a>(&'a self) -> Option<Box<dyn std::fmt::Display + 'a>> {
        self.get_ctx()
            .help
            .as_ref()
            .map(|h| Box::new(h) as Box<dyn std::fmt::Display + 'a>)
    }

    fn source_code(&self) -> Option<&dyn SourceCode> {
        self.get_ctx()
            .source
            .as_ref()
            .map(|s| s.as_ref() as &dyn SourceCode)
    }

    fn labels(&self) -> Option<Box<dyn Iterator<Item = LabeledSpan> + '_>> {
        let ctx = self.get_ctx();
        let span = ctx.span?;
        let len = if span.end > span.start {
            span.end - span.start
        } else {
            1
        };
        let label = LabeledSpan::new(Some(self.label_text()), span.start, len);
        Some(Box::new(std::iter::once(label)))
    }
}

// ----------------------------------------------------------------------------
// Constructor helpers
// ----------------------------------------------------------------------------

/// Creates a Syntax-class error at an optional span.
pub fn syntax_error(message: impl Into<String>, span: Option<Span>) -> MantraError {
    MantraError::Syntax {
        message: message.into(),
        ctx: ErrorContext {
            span,
            ..ErrorContext::none()
        },
    }
}

/// Creates a Lift-class error for a value `astify` cannot handle.
pub fn lift_error(message: impl Into<String>, span: Option<Span>) -> MantraError {
    MantraError::Lift {
        message: message.into(),
        ctx: ErrorContext {
            span,
            ..ErrorContext::none()
        },
    }
}

/// Creates a Lower-class error for a tree `unastify` cannot handle.
pub fn lower_error(message: impl Into<String>, span: Option<Span>) -> MantraError {
    MantraError::Lower {
        message: message.into(),
        ctx: ErrorContext {
            span,
            ..ErrorContext::none()
        },
    }
}

/// Creates a Lookup-class error for an absent capture-registry key.
pub fn lookup_error(key: impl Into<String>) -> MantraError {
    MantraError::Lookup {
        key: key.into(),
        ctx: ErrorContext::none(),
    }
}

/// Creates an Internal-class error for a violated engine invariant.
pub fn internal_error(message: impl Into<String>, span: Option<Span>) -> MantraError {
    MantraError::Internal {
        message: message.into(),
        ctx: ErrorContext {
            span,
            ..ErrorContext::none()
        },
    }
}

/// Converts a source string into a `SourceArc` for use in error contexts.
pub fn to_error_source<S: AsRef<str>>(name: &str, source: S) -> SourceArc {
    Arc::new(NamedSource::new(name, source.as_ref().to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_type_matches_variant() {
        let err = syntax_error("bad shape", None);
        assert_eq!(err.error_type(), ErrorType::Syntax);
        let err = lookup_error("k_1");
        assert_eq!(err.error_type(), ErrorType::Lookup);
    }

    #[test]
    fn expansion_error_exposes_cause_through_source_chain() {
        let root = syntax_error("u[] encountered while quote level < 1", None);
        let wrapped = MantraError::Expansion {
            macro_name: "q".to_string(),
            site: "use site was at test:0: (q (u 1))".to_string(),
            ctx: ErrorContext::none(),
            cause: Some(Box::new(root)),
        };
        let source = std::error::Error::source(&wrapped).expect("cause must be preserved");
        assert!(source.to_string().contains("quote level < 1"));
    }
}
