//! # Quasiquote operators and the lift/lower transform
//!
//! `astify` turns a runtime value into a tree that reconstructs it;
//! `unastify` inverts that for trees built from `mantra.ast.<Kind>`
//! constructor calls. On top of those sit the quote operator family:
//!
//! | operator  | effect                                   | level  |
//! |-----------|------------------------------------------|--------|
//! | `q`       | quote: lift the subtree into ctor calls  | +1     |
//! | `u`       | unquote a value expression               | -1     |
//! | `n`       | unquote a string into an identifier      | -1     |
//! | `a`       | unquote a tree expression, paste as-is   | -1     |
//! | `s`       | unquote a list of trees into a `List`    | none   |
//! | `h`       | hygienic unquote: capture, then refer    | -1     |
//!
//! All unquote operators require the quote level to be at least 1 at entry.
//! `q` inside `q` is rejected outright: quote the outer tree once and build
//! inner quotes with `a`/`s` instead.
//!
//! The composed operators `expand1q`/`expandq` (quote, then expand the
//! quoted code once/fully) and `expand1`/`expand` (expand an already quoted
//! tree once/fully, re-quoting the result) live here too, as does the
//! run-time half of hygienic capture (`capture`/`lookup`).

use std::rc::Rc;

use crate::ast::{self, builder, AstNode, Expr, Marker, NameCtx, Value};
use crate::diagnostics::{
    internal_error, lift_error, lower_error, syntax_error, MantraError,
};
use crate::expander::{BindingTable, Expander, MacroCall, MacroFn, Mode, Syntax};
use crate::session::Session;

/// The binding table of every quote-family operator, ready to merge into a
/// unit's bindings.
pub fn bindings() -> BindingTable {
    let mut table = BindingTable::new();
    table.insert("q".to_string(), q as MacroFn);
    table.insert("u".to_string(), u as MacroFn);
    table.insert("n".to_string(), n as MacroFn);
    table.insert("a".to_string(), a as MacroFn);
    table.insert("s".to_string(), s as MacroFn);
    table.insert("h".to_string(), h as MacroFn);
    table.insert("expand1q".to_string(), expand1q as MacroFn);
    table.insert("expandq".to_string(), expandq as MacroFn);
    table.insert("expand1".to_string(), expand1 as MacroFn);
    table.insert("expand".to_string(), expand as MacroFn);
    table
}

fn quotes_attr(name: &str) -> AstNode {
    builder::path(&["mantra", "quotes", name])
}

fn ast_attr(kind: &str) -> AstNode {
    builder::path(&["mantra", "ast", kind])
}

// ----------------------------------------------------------------------------
// Lift: value -> tree that reconstructs it
// ----------------------------------------------------------------------------

/// Lifts a runtime value into a tree that evaluates back to it.
///
/// Trees lift into `mantra.ast.<Kind>` constructor calls; plain values lift
/// into literal nodes. When an `expander` is given, `CaptureLater` markers
/// naming a bound macro resolve into macro-registry renames instead of
/// run-time capture calls.
pub fn astify(value: &Value, expander: Option<&Expander<'_>>) -> Result<AstNode, MantraError> {
    match value {
        Value::Nil => Ok(builder::nil()),
        Value::Bool(b) => Ok(builder::boolean(*b)),
        Value::Int(i) => Ok(builder::int(*i)),
        Value::Float(x) => {
            check_finite(*x, None)?;
            Ok(builder::float(*x))
        }
        Value::Str(s) => Ok(builder::string(s.clone())),
        Value::Bytes(b) => Ok(builder::bytes(b.clone())),
        Value::List(items) => Ok(builder::list(astify_values(items, expander)?)),
        Value::Tuple(items) => Ok(builder::tuple(astify_values(items, expander)?)),
        Value::Set(items) => Ok(builder::set(astify_values(items, expander)?)),
        Value::Map(entries) => {
            let mut out = Vec::with_capacity(entries.len());
            for (k, v) in entries {
                out.push((astify(k, expander)?, astify(v, expander)?));
            }
            Ok(builder::map(out))
        }
        Value::Node(tree) => astify_tree(tree, expander),
    }
}

fn astify_values(
    items: &[Value],
    expander: Option<&Expander<'_>>,
) -> Result<Vec<AstNode>, MantraError> {
    items.iter().map(|item| astify(item, expander)).collect()
}

/// Lifts a tree into the constructor-call tree that rebuilds it. Markers are
/// resolved here: `Literal` bodies paste verbatim, `CaptureLater` resolves
/// hygienically.
pub fn astify_tree(
    tree: &AstNode,
    expander: Option<&Expander<'_>>,
) -> Result<AstNode, MantraError> {
    let ctor = |kind: &str, kwargs: Vec<AstNode>| builder::call_kw(ast_attr(kind), vec![], kwargs);
    match &tree.value {
        Expr::Nil => Ok(ctor("Nil", vec![])),
        Expr::Bool(b) => Ok(ctor("Bool", vec![builder::kwarg("value", builder::boolean(*b))])),
        Expr::Int(i) => Ok(ctor("Int", vec![builder::kwarg("value", builder::int(*i))])),
        Expr::Float(x) => {
            check_finite(*x, Some(tree))?;
            Ok(ctor("Float", vec![builder::kwarg("value", builder::float(*x))]))
        }
        Expr::Str(s) => Ok(ctor(
            "Str",
            vec![builder::kwarg("value", builder::string(s.clone()))],
        )),
        Expr::Bytes(b) => Ok(ctor(
            "Bytes",
            vec![builder::kwarg("value", builder::bytes(b.clone()))],
        )),
        Expr::Symbol { name, ctx } => {
            let mut kwargs = vec![builder::kwarg("name", builder::string(name.clone()))];
            if let Some(ctx) = ctx {
                let tag = match ctx {
                    NameCtx::Load => "load",
                    NameCtx::Store => "store",
                };
                kwargs.push(builder::kwarg("ctx", builder::string(tag)));
            }
            Ok(ctor("Symbol", kwargs))
        }
        Expr::Path(path) => {
            let segments = path
                .0
                .iter()
                .map(|seg| builder::string(seg.clone()))
                .collect();
            Ok(ctor(
                "Path",
                vec![builder::kwarg("segments", builder::list(segments))],
            ))
        }
        Expr::List(items) => Ok(ctor(
            "List",
            vec![builder::kwarg("items", builder::list(astify_trees(items, expander)?))],
        )),
        Expr::Tuple(items) => Ok(ctor(
            "Tuple",
            vec![builder::kwarg("items", builder::list(astify_trees(items, expander)?))],
        )),
        Expr::Set(items) => Ok(ctor(
            "Set",
            vec![builder::kwarg("items", builder::list(astify_trees(items, expander)?))],
        )),
        Expr::Map(entries) => {
            let mut lifted = Vec::with_capacity(entries.len());
            for (k, v) in entries {
                lifted.push(builder::tuple(vec![
                    astify_tree(k, expander)?,
                    astify_tree(v, expander)?,
                ]));
            }
            Ok(ctor(
                "Map",
                vec![builder::kwarg("entries", builder::list(lifted))],
            ))
        }
        Expr::Call {
            callee,
            args,
            kwargs,
        } => Ok(ctor(
            "Call",
            vec![
                builder::kwarg("callee", astify_tree(callee, expander)?),
                builder::kwarg("args", builder::list(astify_trees(args, expander)?)),
                builder::kwarg("kwargs", builder::list(astify_trees(kwargs, expander)?)),
            ],
        )),
        Expr::Kwarg { name, value } => Ok(ctor(
            "Kwarg",
            vec![
                builder::kwarg("name", builder::string(name.clone())),
                builder::kwarg("value", astify_tree(value, expander)?),
            ],
        )),
        Expr::Assign { target, value } => Ok(ctor(
            "Assign",
            vec![
                builder::kwarg("target", astify_tree(target, expander)?),
                builder::kwarg("value", astify_tree(value, expander)?),
            ],
        )),
        Expr::Block(body) => Ok(ctor(
            "Block",
            vec![builder::kwarg("body", builder::list(astify_trees(body, expander)?))],
        )),
        Expr::Marker(Marker::Literal(body)) => Ok((**body).clone()),
        Expr::Marker(Marker::CaptureLater { body, name }) => {
            astify_capture(body, name, expander)
        }
    }
}

fn astify_trees(
    items: &[AstNode],
    expander: Option<&Expander<'_>>,
) -> Result<Vec<AstNode>, MantraError> {
    items.iter().map(|item| astify_tree(item, expander)).collect()
}

/// Resolves a `CaptureLater` marker. A bare symbol naming a bound macro is
/// captured into the macro registry and replaced by its unique rename; any
/// other body becomes a run-time `mantra.quotes.capture` call.
fn astify_capture(
    body: &AstNode,
    name: &str,
    expander: Option<&Expander<'_>>,
) -> Result<AstNode, MantraError> {
    if let Some(expander) = expander {
        if let Some(symbol) = body.value.symbol_name() {
            if let Some(function) = expander.bindings.get(symbol) {
                let unique = expander.session.capture_macro(*function, symbol);
                return astify_tree(&builder::sym(unique), Some(expander));
            }
        }
    }
    Ok(builder::call(
        quotes_attr("capture"),
        vec![body.clone(), builder::string(name)],
    ))
}

fn check_finite(x: f64, at: Option<&AstNode>) -> Result<(), MantraError> {
    if x.is_finite() {
        return Ok(());
    }
    Err(lift_error(
        format!("cannot lift non-finite float `{}` into source form", x),
        at.map(|node| node.span),
    ))
}

// ----------------------------------------------------------------------------
// Lower: tree -> value
// ----------------------------------------------------------------------------

/// Lowers a tree back into the value it evaluates to. Inverse of [`astify`]
/// for trees made of literals, collections, and `mantra.ast.<Kind>`
/// constructor calls; anything else is a Lower-class error.
pub fn unastify(tree: &AstNode) -> Result<Value, MantraError> {
    match &tree.value {
        Expr::Nil => Ok(Value::Nil),
        Expr::Bool(b) => Ok(Value::Bool(*b)),
        Expr::Int(i) => Ok(Value::Int(*i)),
        Expr::Float(x) => Ok(Value::Float(*x)),
        Expr::Str(s) => Ok(Value::Str(s.clone())),
        Expr::Bytes(b) => Ok(Value::Bytes(b.clone())),
        Expr::List(items) => Ok(Value::List(unastify_all(items)?)),
        Expr::Tuple(items) => Ok(Value::Tuple(unastify_all(items)?)),
        Expr::Set(items) => Ok(Value::Set(unastify_all(items)?)),
        Expr::Map(entries) => {
            let mut out = Vec::with_capacity(entries.len());
            for (k, v) in entries {
                out.push((unastify(k)?, unastify(v)?));
            }
            Ok(Value::Map(out))
        }
        Expr::Kwarg { name, value } => Ok(Value::Tuple(vec![
            Value::Str(name.clone()),
            unastify(value)?,
        ])),
        Expr::Call {
            callee,
            args,
            kwargs,
        } => unastify_ctor(tree, callee, args, kwargs),
        _ => Err(lower_error(
            format!("cannot lower tree to a value: {}", ast::render(tree)),
            Some(tree.span),
        )),
    }
}

fn unastify_all(items: &[AstNode]) -> Result<Vec<Value>, MantraError> {
    items.iter().map(unastify).collect()
}

fn unastify_ctor(
    tree: &AstNode,
    callee: &AstNode,
    args: &[AstNode],
    kwargs: &[AstNode],
) -> Result<Value, MantraError> {
    let Expr::Path(path) = &callee.value else {
        return Err(lower_error(
            format!("cannot lower call to a value: {}", ast::render(tree)),
            Some(tree.span),
        ));
    };
    let [ns, module, kind] = path.0.as_slice() else {
        return Err(unknown_ctor(tree, path.dotted()));
    };
    if ns != "mantra" || module != "ast" {
        return Err(unknown_ctor(tree, path.dotted()));
    }
    let lowered_args = unastify_all(args)?;
    let mut fields = Vec::with_capacity(kwargs.len());
    for kw in kwargs {
        let Expr::Kwarg { name, value } = &kw.value else {
            return Err(lower_error(
                format!(
                    "constructor call arguments must be keyword arguments: {}",
                    ast::render(kw)
                ),
                Some(kw.span),
            ));
        };
        fields.push((name.clone(), unastify(value)?));
    }
    let built = builder::construct(kind, &lowered_args, &fields)?;
    Ok(Value::Node(builder::with_span(built.value, tree.span)))
}

fn unknown_ctor(tree: &AstNode, dotted: String) -> MantraError {
    lower_error(
        format!("`{}` is not a mantra.ast node constructor", dotted),
        Some(tree.span),
    )
}

// ----------------------------------------------------------------------------
// Hygienic capture, run-time half
// ----------------------------------------------------------------------------

/// Stores `value` in the session's capture registry and returns the lookup
/// call that retrieves it at the use site.
pub fn capture(session: &Session, value: Rc<Value>, basename: &str) -> AstNode {
    let key = session.capture_value(value, basename);
    builder::call(quotes_attr("lookup"), vec![builder::string(key)])
}

/// Retrieves a captured value. Keys are engine-minted; a miss is fatal.
pub fn lookup(session: &Session, key: &str) -> Result<Rc<Value>, MantraError> {
    session.lookup_value(key)
}

// ----------------------------------------------------------------------------
// The quote operator family
// ----------------------------------------------------------------------------

/// `q`: quote. Lifts the subtree into constructor calls after resolving any
/// unquotes inside it. In block form, assigns the quoted tree to the `(as
/// target)` symbol at the use site.
pub fn q(tree: AstNode, call: &mut MacroCall<'_, '_>) -> Result<AstNode, MantraError> {
    let session = call.expander.session;
    if session.quote_level.value() >= 1 {
        return Err(syntax_error(
            "nested quasiquotes are not supported; unquote with a[]/s[] and quote once",
            Some(tree.span),
        ));
    }
    let lifted = quote_only(tree, call.expander)?;
    finish_quote(lifted, call)
}

/// `u`: value unquote. The expression is evaluated at run time and its value
/// lifted back into a tree via an emitted `mantra.quotes.astify` call.
pub fn u(tree: AstNode, call: &mut MacroCall<'_, '_>) -> Result<AstNode, MantraError> {
    require_expr("u", call, tree.span)?;
    require_quoted("u", call.expander.session, tree.span)?;
    let _guard = call.expander.session.quote_level.changed_by(-1)?;
    let body = unquote_expand(tree, call.expander)?;
    Ok(builder::literal_marker(builder::call(
        quotes_attr("astify"),
        vec![body],
    )))
}

/// `n`: name unquote. The expression must evaluate to a string at run time;
/// it becomes an identifier in the quoted tree. Binding context is left for
/// postprocessing to assign.
pub fn n(tree: AstNode, call: &mut MacroCall<'_, '_>) -> Result<AstNode, MantraError> {
    require_expr("n", call, tree.span)?;
    require_quoted("n", call.expander.session, tree.span)?;
    let _guard = call.expander.session.quote_level.changed_by(-1)?;
    let body = unquote_expand(tree, call.expander)?;
    Ok(builder::literal_marker(builder::call_kw(
        ast_attr("Symbol"),
        vec![],
        vec![builder::kwarg("name", body)],
    )))
}

/// `a`: tree unquote. The expression must evaluate to a tree at run time;
/// it is pasted into the quoted tree as-is.
pub fn a(tree: AstNode, call: &mut MacroCall<'_, '_>) -> Result<AstNode, MantraError> {
    require_expr("a", call, tree.span)?;
    require_quoted("a", call.expander.session, tree.span)?;
    let _guard = call.expander.session.quote_level.changed_by(-1)?;
    let body = unquote_expand(tree, call.expander)?;
    Ok(builder::literal_marker(body))
}

/// `s`: list unquote. The expression must evaluate to a list of trees at run
/// time; they become the items of a `List` node. The quote level does not
/// change: the expression is still inside the quote.
pub fn s(tree: AstNode, call: &mut MacroCall<'_, '_>) -> Result<AstNode, MantraError> {
    require_expr("s", call, tree.span)?;
    require_quoted("s", call.expander.session, tree.span)?;
    Ok(builder::literal_marker(builder::call_kw(
        ast_attr("List"),
        vec![],
        vec![builder::kwarg("items", tree)],
    )))
}

/// `h`: hygienic unquote. Captures the expression's value (or, for a bare
/// macro name, the macro itself) at definition time; the quoted tree refers
/// to the captured entity, immune to rebinding at the use site.
pub fn h(tree: AstNode, call: &mut MacroCall<'_, '_>) -> Result<AstNode, MantraError> {
    require_expr("h", call, tree.span)?;
    require_quoted("h", call.expander.session, tree.span)?;
    // The human-readable capture name reflects what was written, before any
    // inner unquotes expand.
    let name = ast::render(&tree);
    let _guard = call.expander.session.quote_level.changed_by(-1)?;
    let body = unquote_expand(tree, call.expander)?;
    Ok(builder::capture_marker(body, name))
}

/// `expand1q`: quote, then expand the quoted code once.
pub fn expand1q(tree: AstNode, call: &mut MacroCall<'_, '_>) -> Result<AstNode, MantraError> {
    let quoted = quote_only(tree, call.expander)?;
    expand_quoted(quoted, call, Mode::Once)
}

/// `expandq`: quote, then expand the quoted code until fixpoint.
pub fn expandq(tree: AstNode, call: &mut MacroCall<'_, '_>) -> Result<AstNode, MantraError> {
    let quoted = quote_only(tree, call.expander)?;
    expand_quoted(quoted, call, Mode::Recursive)
}

/// `expand1`: the argument must itself produce a quoted tree (for example a
/// `q` invocation); expand the code it represents once and re-quote.
pub fn expand1(tree: AstNode, call: &mut MacroCall<'_, '_>) -> Result<AstNode, MantraError> {
    let quoted = call.expander.visit_once(tree)?;
    expand_quoted(quoted, call, Mode::Once)
}

/// `expand`: like [`expand1`] but expands the represented code to fixpoint.
pub fn expand(tree: AstNode, call: &mut MacroCall<'_, '_>) -> Result<AstNode, MantraError> {
    let quoted = call.expander.visit_once(tree)?;
    expand_quoted(quoted, call, Mode::Recursive)
}

// ----------------------------------------------------------------------------
// Shared machinery
// ----------------------------------------------------------------------------

/// The quoting core shared by `q` and the expand-family: raise the level,
/// resolve unquotes, lift, and verify no markers survived the lift.
fn quote_only(tree: AstNode, expander: &mut Expander<'_>) -> Result<AstNode, MantraError> {
    let expanded = {
        let _guard = expander.session.quote_level.changed_by(1)?;
        expand_quasiquotes(tree, expander)?
    };
    let lifted = astify_tree(&expanded, Some(expander))?;
    let remaining = ast::markers::get_markers(&lifted);
    if let Some(first) = remaining.first() {
        return Err(internal_error(
            format!(
                "quasiquote markers remaining after lift, first: {}",
                first.value.pretty()
            ),
            Some(first.span),
        ));
    }
    Ok(lifted)
}

/// Block-form `q` assigns the quoted tree to its target symbol; expression
/// form returns it directly.
fn finish_quote(lifted: AstNode, call: &mut MacroCall<'_, '_>) -> Result<AstNode, MantraError> {
    match call.syntax {
        Syntax::Expr => Ok(lifted),
        Syntax::Block => {
            let Some(target) = call.target.take() else {
                return Err(syntax_error(
                    "block-form quote needs an `(as name)` target",
                    Some(lifted.span),
                ));
            };
            if target.value.symbol_name().is_none() {
                return Err(syntax_error(
                    format!("expected a single asname, got {}", ast::render(&target)),
                    Some(target.span),
                ));
            }
            Ok(builder::assign(target, lifted))
        }
    }
}

/// Unquote-then-expand for an unquote operator body. Back at level zero the
/// body is real code and gets the full binding table; at higher levels only
/// the quote operators themselves may run.
fn unquote_expand(tree: AstNode, expander: &mut Expander<'_>) -> Result<AstNode, MantraError> {
    if expander.session.quote_level.value() == 0 {
        expander.visit_recursively(tree)
    } else {
        expand_quasiquotes(tree, expander)
    }
}

/// Expands only the quote-family operators in `tree`, leaving every other
/// binding untouched. Used inside a quote, where user macros must not run.
fn expand_quasiquotes(tree: AstNode, expander: &Expander<'_>) -> Result<AstNode, MantraError> {
    let ops: [MacroFn; 6] = [q, u, n, a, s, h];
    let filtered: BindingTable = expander
        .bindings
        .iter()
        .filter(|(_, function)| ops.iter().any(|op| std::ptr::fn_addr_eq(*op, **function)))
        .map(|(name, function)| (name.clone(), *function))
        .collect();
    let mut sub = Expander::new(filtered, expander.filename.clone(), expander.session);
    sub.visit_recursively(tree)
}

/// Lowers a quoted tree, expands the code it represents in the given mode,
/// and lifts the result back into a quoted tree.
fn expand_quoted(
    quoted: AstNode,
    call: &mut MacroCall<'_, '_>,
    mode: Mode,
) -> Result<AstNode, MantraError> {
    let span = quoted.span;
    let inner = match unastify(&quoted)? {
        Value::Node(inner) => inner,
        other => {
            return Err(lower_error(
                format!("expected a quoted tree, got {}: {}", other.type_name(), other),
                Some(span),
            ))
        }
    };
    let expanded = call.expander.visit_with(inner, mode)?;
    let lifted = astify_tree(&expanded, Some(call.expander))?;
    ast::markers::check_no_markers_remaining(&lifted, &call.expander.filename)?;
    finish_quote(lifted, call)
}

fn require_expr(
    op: &str,
    call: &MacroCall<'_, '_>,
    span: crate::ast::Span,
) -> Result<(), MantraError> {
    if call.syntax == Syntax::Expr {
        return Ok(());
    }
    Err(syntax_error(
        format!("{}[] is an expression-form operator", op),
        Some(span),
    ))
}

fn require_quoted(op: &str, session: &Session, span: crate::ast::Span) -> Result<(), MantraError> {
    if session.quote_level.value() >= 1 {
        return Ok(());
    }
    Err(syntax_error(
        format!("{}[] encountered while quote level < 1", op),
        Some(span),
    ))
}
