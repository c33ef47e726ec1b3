//! The quote operator family end to end: `q` and its unquotes, the level
//! discipline, block-form quoting, and the quote-then-expand operators.

use mantra::ast::{self, builder, AstNode, Expr, NameCtx, Value};
use mantra::diagnostics::ErrorType;
use mantra::expander::{expand_unit, BindingTable, MacroCall};
use mantra::quotes::{self, unastify};
use mantra::session::Session;
use mantra::MantraError;

fn invoke(name: &str, args: Vec<AstNode>) -> AstNode {
    let mut items = vec![builder::sym(name)];
    items.extend(args);
    builder::list(items)
}

fn expand_with(tree: AstNode, bindings: BindingTable) -> Result<AstNode, MantraError> {
    let session = Session::new();
    expand_unit(tree, bindings, "test_unit", &session)
}

fn expand(tree: AstNode) -> Result<AstNode, MantraError> {
    expand_with(tree, quotes::bindings())
}

fn root_cause_message(err: &MantraError) -> String {
    match std::error::Error::source(err) {
        Some(cause) => cause.to_string(),
        None => err.to_string(),
    }
}

// (inc e) -> (+ 1 e)
fn inc_macro(tree: AstNode, _call: &mut MacroCall<'_, '_>) -> Result<AstNode, MantraError> {
    Ok(builder::list(vec![builder::sym("+"), builder::int(1), tree]))
}

#[test]
fn quote_lifts_and_lowering_recovers_the_body() {
    let body = builder::list(vec![builder::sym("+"), builder::int(1), builder::int(2)]);
    let expanded = expand(invoke("q", vec![body])).expect("quote must expand");

    let lowered = unastify(&expanded).expect("quoted output must lower");
    let Value::Node(tree) = lowered else {
        panic!("quoted output must lower to a tree");
    };
    assert_eq!(ast::render(&tree), "(+ 1 2)");
}

#[test]
fn quoted_output_is_marker_free() {
    let body = builder::list(vec![
        builder::sym("f"),
        invoke("u", vec![builder::sym("x")]),
        invoke("a", vec![builder::sym("t")]),
    ]);
    let expanded = expand(invoke("q", vec![body])).expect("quote must expand");
    assert!(ast::markers::get_markers(&expanded).is_empty());
}

#[test]
fn value_unquote_emits_a_deferred_astify_call() {
    let body = builder::list(vec![
        builder::sym("+"),
        invoke("u", vec![builder::sym("x")]),
        builder::int(1),
    ]);
    let expanded = expand(invoke("q", vec![body])).expect("quote must expand");
    assert!(ast::render(&expanded).contains("(mantra.quotes.astify x)"));
}

#[test]
fn name_unquote_emits_a_symbol_constructor() {
    let body = invoke("n", vec![builder::sym("name_expr")]);
    let expanded = expand(invoke("q", vec![body])).expect("quote must expand");
    assert!(ast::render(&expanded).contains("(mantra.ast.Symbol :name name_expr)"));
}

#[test]
fn tree_unquote_pastes_the_expression_verbatim() {
    let body = invoke("a", vec![builder::sym("my_tree")]);
    let expanded = expand(invoke("q", vec![body])).expect("quote must expand");

    let mut found = false;
    ast::walk::visit(&expanded, &mut |node| {
        if node.value.symbol_name() == Some("my_tree") {
            found = true;
        }
    });
    assert!(found, "a[] must paste its expression as a raw reference");
}

#[test]
fn list_unquote_emits_a_list_constructor() {
    let body = invoke("s", vec![builder::sym("xs")]);
    let expanded = expand(invoke("q", vec![body])).expect("quote must expand");
    assert!(ast::render(&expanded).contains("(mantra.ast.List :items xs)"));
}

#[test]
fn hygienic_unquote_emits_a_capture_call_for_values() {
    let body = invoke("h", vec![builder::sym("foo")]);
    let expanded = expand(invoke("q", vec![body])).expect("quote must expand");
    assert!(ast::render(&expanded).contains("(mantra.quotes.capture foo \"foo\")"));
}

#[test]
fn unquote_operators_require_a_quote_context() {
    for op in ["u", "n", "a", "h", "s"] {
        let err = expand(invoke(op, vec![builder::sym("x")])).unwrap_err();
        assert_eq!(err.error_type(), ErrorType::Expansion);
        assert!(
            root_cause_message(&err).contains("quote level < 1"),
            "{}[] outside a quote must report the level",
            op
        );
    }
}

#[test]
fn nested_quotes_are_rejected() {
    let inner = invoke("q", vec![builder::sym("x")]);
    let err = expand(invoke("q", vec![inner])).unwrap_err();
    assert_eq!(err.error_type(), ErrorType::Expansion);
    assert!(root_cause_message(&err).contains("nested quasiquotes"));
}

#[test]
fn block_form_quote_assigns_to_its_target() {
    let tree = builder::list(vec![
        builder::sym("q"),
        builder::list(vec![builder::sym("as"), builder::sym("quoted")]),
        builder::int(1),
        builder::int(2),
    ]);
    let expanded = expand(tree).expect("block-form quote must expand");

    let Expr::Assign { target, value } = &expanded.value else {
        panic!("block-form quote must produce an assignment");
    };
    assert_eq!(
        target.value,
        Expr::Symbol {
            name: "quoted".to_string(),
            ctx: Some(NameCtx::Store),
        }
    );
    let lowered = unastify(value).expect("quoted block must lower");
    let Value::Node(block) = lowered else {
        panic!("quoted block must lower to a tree");
    };
    assert_eq!(ast::render(&block), "(begin 1 2)");
}

#[test]
fn block_form_quote_requires_a_target() {
    let tree = builder::list(vec![builder::sym("q"), builder::int(1), builder::int(2)]);
    let err = expand(tree).unwrap_err();
    assert!(root_cause_message(&err).contains("(as name)"));
}

#[test]
fn block_form_quote_rejects_compound_targets() {
    let tree = builder::list(vec![
        builder::sym("q"),
        builder::list(vec![
            builder::sym("as"),
            builder::list(vec![builder::sym("f"), builder::sym("x")]),
        ]),
        builder::int(1),
        builder::int(2),
    ]);
    let err = expand(tree).unwrap_err();
    assert!(root_cause_message(&err).contains("expected a single asname"));
}

#[test]
fn user_macros_do_not_run_inside_a_quote() {
    let mut bindings = quotes::bindings();
    bindings.insert("inc".to_string(), inc_macro as mantra::MacroFn);

    let body = invoke("inc", vec![builder::int(5)]);
    let expanded = expand_with(invoke("q", vec![body]), bindings).expect("quote must expand");

    let Value::Node(tree) = unastify(&expanded).expect("must lower") else {
        panic!("quoted output must lower to a tree");
    };
    assert_eq!(ast::render(&tree), "(inc 5)", "the invocation stays quoted");
}

#[test]
fn quote_then_expand_runs_the_quoted_code() {
    let mut bindings = quotes::bindings();
    bindings.insert("inc".to_string(), inc_macro as mantra::MacroFn);

    let body = invoke("inc", vec![builder::int(5)]);
    let expanded =
        expand_with(invoke("expandq", vec![body]), bindings).expect("expandq must expand");

    let Value::Node(tree) = unastify(&expanded).expect("must lower") else {
        panic!("expandq output must lower to a tree");
    };
    assert_eq!(ast::render(&tree), "(+ 1 5)");
}

#[test]
fn single_step_and_full_expansion_differ_on_chains() {
    // (a2b e) -> (b2c e) -> (done e)
    fn a2b(tree: AstNode, _call: &mut MacroCall<'_, '_>) -> Result<AstNode, MantraError> {
        Ok(builder::list(vec![builder::sym("b2c"), tree]))
    }
    fn b2c(tree: AstNode, _call: &mut MacroCall<'_, '_>) -> Result<AstNode, MantraError> {
        Ok(builder::list(vec![builder::sym("done"), tree]))
    }
    let table = || {
        let mut bindings = quotes::bindings();
        bindings.insert("a2b".to_string(), a2b as mantra::MacroFn);
        bindings.insert("b2c".to_string(), b2c as mantra::MacroFn);
        bindings
    };

    let once = expand_with(
        invoke("expand1q", vec![invoke("a2b", vec![builder::int(5)])]),
        table(),
    )
    .expect("expand1q must expand");
    let Value::Node(tree) = unastify(&once).expect("must lower") else {
        panic!("expand1q output must lower to a tree");
    };
    assert_eq!(ast::render(&tree), "(b2c 5)", "one step only");

    let full = expand_with(
        invoke("expandq", vec![invoke("a2b", vec![builder::int(5)])]),
        table(),
    )
    .expect("expandq must expand");
    let Value::Node(tree) = unastify(&full).expect("must lower") else {
        panic!("expandq output must lower to a tree");
    };
    assert_eq!(ast::render(&tree), "(done 5)", "expansion runs to fixpoint");
}

#[test]
fn expand_operators_accept_an_already_quoted_argument() {
    let mut bindings = quotes::bindings();
    bindings.insert("inc".to_string(), inc_macro as mantra::MacroFn);

    let quoted_arg = invoke("q", vec![invoke("inc", vec![builder::int(3)])]);
    let expanded =
        expand_with(invoke("expand", vec![quoted_arg]), bindings).expect("expand must expand");

    let Value::Node(tree) = unastify(&expanded).expect("must lower") else {
        panic!("expand output must lower to a tree");
    };
    assert_eq!(ast::render(&tree), "(+ 1 3)");
}
