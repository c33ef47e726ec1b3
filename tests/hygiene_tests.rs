//! Hygienic capture: the run-time capture/lookup pair, identity-based
//! deduplication, and macro capture through `h` inside a quote.

use std::rc::Rc;

use mantra::ast::{self, builder, AstNode, Expr, Value};
use mantra::diagnostics::ErrorType;
use mantra::expander::{expand_unit, MacroCall};
use mantra::quotes;
use mantra::session::Session;
use mantra::MantraError;

fn lookup_key(node: &AstNode) -> String {
    let Expr::Call { args, .. } = &node.value else {
        panic!("capture must emit a lookup call, got {}", ast::render(node));
    };
    let Some(Expr::Str(key)) = args.first().map(|a| &a.value) else {
        panic!("lookup call must carry its key, got {}", ast::render(node));
    };
    key.clone()
}

#[test]
fn captured_values_come_back_by_key() {
    let session = Session::new();
    let value = Value::Str("payload".to_string()).shared();
    let node = quotes::capture(&session, Rc::clone(&value), "payload");

    assert!(ast::render(&node).starts_with("(mantra.quotes.lookup \"payload_"));
    let fetched = quotes::lookup(&session, &lookup_key(&node)).expect("minted keys resolve");
    assert!(Rc::ptr_eq(&fetched, &value), "lookup returns the captured value itself");
}

#[test]
fn recapturing_the_same_value_reuses_the_key() {
    let session = Session::new();
    let value = Value::Int(7).shared();
    let first = quotes::capture(&session, Rc::clone(&value), "v");
    let second = quotes::capture(&session, Rc::clone(&value), "v");
    assert_eq!(lookup_key(&first), lookup_key(&second));

    // A structurally equal but distinct value gets its own key.
    let other = Value::Int(7).shared();
    let third = quotes::capture(&session, other, "v");
    assert_ne!(lookup_key(&first), lookup_key(&third));
}

#[test]
fn unminted_keys_are_a_lookup_error() {
    let session = Session::new();
    let err = quotes::lookup(&session, "never_minted").unwrap_err();
    assert_eq!(err.error_type(), ErrorType::Lookup);
}

#[test]
fn hygienic_unquote_captures_bound_macros_by_rename() {
    fn my_macro(tree: AstNode, _call: &mut MacroCall<'_, '_>) -> Result<AstNode, MantraError> {
        Ok(tree)
    }
    let session = Session::new();
    let mut bindings = quotes::bindings();
    bindings.insert("my_macro".to_string(), my_macro as mantra::MacroFn);

    let tree = builder::list(vec![
        builder::sym("q"),
        builder::list(vec![builder::sym("h"), builder::sym("my_macro")]),
    ]);
    let expanded = expand_unit(tree, bindings, "unit", &session).expect("quote must expand");

    let captured = session.captured_macros();
    assert_eq!(captured.len(), 1, "the macro lands in the macro registry");
    let (unique, _) = &captured[0];
    assert!(unique.starts_with("my_macro_"));
    assert!(
        ast::render(&expanded).contains(&format!("\"{}\"", unique)),
        "the quoted tree refers to the rename: {}",
        ast::render(&expanded)
    );
}

#[test]
fn hygienic_capture_of_a_macro_is_deduplicated() {
    fn my_macro(tree: AstNode, _call: &mut MacroCall<'_, '_>) -> Result<AstNode, MantraError> {
        Ok(tree)
    }
    let session = Session::new();
    let mut bindings = quotes::bindings();
    bindings.insert("my_macro".to_string(), my_macro as mantra::MacroFn);

    let quote_of_h = || {
        builder::list(vec![
            builder::sym("q"),
            builder::list(vec![builder::sym("h"), builder::sym("my_macro")]),
        ])
    };
    let unit = builder::block(vec![quote_of_h(), quote_of_h()]);
    expand_unit(unit, bindings, "unit", &session).expect("quotes must expand");
    assert_eq!(
        session.captured_macros().len(),
        1,
        "the same macro function is captured once per session"
    );
}
