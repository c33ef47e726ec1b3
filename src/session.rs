//! Per-compilation-session state: the hygienic capture registries, the
//! gensym registry, and the quasiquote nesting-level tracker.
//!
//! One `Session` per compilation session. All state lives behind interior
//! mutability and the session is deliberately single-threaded; nothing here
//! is shared across threads.

use std::cell::{Cell, RefCell};
use std::collections::HashSet;
use std::rc::Rc;

use crate::ast::Value;
use crate::diagnostics::{internal_error, lookup_error, MantraError};
use crate::expander::MacroFn;

/// Session-scoped engine state.
///
/// The value registry deduplicates by `Rc` pointer identity, the macro
/// registry by fn-pointer identity; both are linear scans, sized for the
/// handful of captures a unit realistically makes.
pub struct Session {
    values: RefCell<Vec<(String, Rc<Value>)>>,
    macros: RefCell<Vec<(String, MacroFn)>>,
    gensyms: RefCell<HashSet<String>>,
    counter: Cell<u64>,
    /// Current quasiquote nesting level, with scoped save/restore.
    pub quote_level: NestingLevelTracker,
}

impl Session {
    pub fn new() -> Self {
        Self {
            values: RefCell::new(Vec::new()),
            macros: RefCell::new(Vec::new()),
            gensyms: RefCell::new(HashSet::new()),
            counter: Cell::new(0),
            quote_level: NestingLevelTracker::new(),
        }
    }

    /// Mints a fresh name guaranteed unique within this session.
    ///
    /// The random salt keeps names from different sessions unlikely to
    /// collide when their output ends up in the same unit.
    pub fn gensym(&self, basename: &str) -> String {
        loop {
            let n = self.counter.get();
            self.counter.set(n + 1);
            let candidate = format!("{}_{}_{:08x}", basename, n, rand::random::<u32>());
            if self.gensyms.borrow_mut().insert(candidate.clone()) {
                return candidate;
            }
        }
    }

    /// Stores `value` in the value registry under a fresh key, or returns
    /// the existing key if this exact `Rc` was captured before.
    pub fn capture_value(&self, value: Rc<Value>, basename: &str) -> String {
        let mut values = self.values.borrow_mut();
        if let Some((key, _)) = values.iter().find(|(_, v)| Rc::ptr_eq(v, &value)) {
            return key.clone();
        }
        let key = self.gensym(basename);
        values.push((key.clone(), value));
        key
    }

    /// Retrieves a captured value by key. Keys are minted by the engine;
    /// a miss means registry state was lost and is always an error.
    pub fn lookup_value(&self, key: &str) -> Result<Rc<Value>, MantraError> {
        let values = self.values.borrow();
        let Some((_, value)) = values.iter().find(|(k, _)| k == key) else {
            return Err(lookup_error(key));
        };
        Ok(Rc::clone(value))
    }

    /// Registers a macro function under a unique name derived from
    /// `basename`, deduplicating by fn-pointer identity.
    pub fn capture_macro(&self, function: MacroFn, basename: &str) -> String {
        let mut macros = self.macros.borrow_mut();
        if let Some((name, _)) = macros
            .iter()
            .find(|(_, f)| std::ptr::fn_addr_eq(*f, function))
        {
            return name.clone();
        }
        let name = self.gensym(basename);
        macros.push((name.clone(), function));
        name
    }

    /// The macro registry as a snapshot of (unique name, function) pairs.
    pub fn captured_macros(&self) -> Vec<(String, MacroFn)> {
        self.macros.borrow().clone()
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

/// Tracks the quasiquote nesting level as a stack of saved values.
///
/// The current level is the top of the stack. `set_to` and `changed_by` push
/// a new value and return a guard that pops it when dropped, so the level is
/// restored on every exit path, including `?`-propagated errors.
pub struct NestingLevelTracker {
    stack: RefCell<Vec<usize>>,
}

impl NestingLevelTracker {
    pub fn new() -> Self {
        Self {
            stack: RefCell::new(vec![0]),
        }
    }

    /// The current nesting level.
    pub fn value(&self) -> usize {
        self.stack.borrow().last().copied().unwrap_or(0)
    }

    /// Pushes an absolute level for the duration of the returned guard.
    pub fn set_to(&self, level: usize) -> LevelGuard<'_> {
        self.stack.borrow_mut().push(level);
        LevelGuard { tracker: self }
    }

    /// Pushes the current level adjusted by `delta` for the duration of the
    /// returned guard. A level below zero is an engine invariant violation:
    /// operators check the level before adjusting it.
    pub fn changed_by(&self, delta: i64) -> Result<LevelGuard<'_>, MantraError> {
        let current = self.value() as i64;
        let next = current + delta;
        if next < 0 {
            return Err(internal_error(
                format!("quote level would become negative ({})", next),
                None,
            ));
        }
        Ok(self.set_to(next as usize))
    }
}

impl Default for NestingLevelTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// Restores the previous nesting level when dropped.
pub struct LevelGuard<'a> {
    tracker: &'a NestingLevelTracker,
}

impl Drop for LevelGuard<'_> {
    fn drop(&mut self) {
        let mut stack = self.tracker.stack.borrow_mut();
        // The base level stays; only pushed frames pop.
        if stack.len() > 1 {
            stack.pop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::builder;
    use crate::diagnostics::ErrorType;
    use crate::expander::MacroCall;
    use crate::ast::AstNode;

    #[test]
    fn gensym_names_are_unique_and_tagged() {
        let session = Session::new();
        let a = session.gensym("x");
        let b = session.gensym("x");
        assert_ne!(a, b);
        assert!(a.starts_with("x_"));
    }

    #[test]
    fn capture_value_dedups_by_identity_not_structure() {
        let session = Session::new();
        let v1 = Value::Int(42).shared();
        let v2 = Value::Int(42).shared();
        let k1 = session.capture_value(Rc::clone(&v1), "answer");
        let k1_again = session.capture_value(Rc::clone(&v1), "answer");
        let k2 = session.capture_value(Rc::clone(&v2), "answer");
        assert_eq!(k1, k1_again);
        assert_ne!(k1, k2, "structurally equal values must not share a key");
    }

    #[test]
    fn lookup_miss_is_a_lookup_error() {
        let session = Session::new();
        let err = session.lookup_value("never_minted").unwrap_err();
        assert_eq!(err.error_type(), ErrorType::Lookup);
    }

    #[test]
    fn capture_macro_dedups_by_fn_pointer() {
        fn noop(tree: AstNode, _call: &mut MacroCall<'_, '_>) -> Result<AstNode, MantraError> {
            Ok(tree)
        }
        fn other(_tree: AstNode, _call: &mut MacroCall<'_, '_>) -> Result<AstNode, MantraError> {
            Ok(builder::nil())
        }
        let session = Session::new();
        let a = session.capture_macro(noop, "noop");
        let b = session.capture_macro(noop, "noop");
        let c = session.capture_macro(other, "other");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(session.captured_macros().len(), 2);
    }

    #[test]
    fn level_guard_restores_on_drop() {
        let tracker = NestingLevelTracker::new();
        assert_eq!(tracker.value(), 0);
        {
            let _outer = tracker.set_to(1);
            assert_eq!(tracker.value(), 1);
            {
                let _inner = tracker.changed_by(1).unwrap();
                assert_eq!(tracker.value(), 2);
            }
            assert_eq!(tracker.value(), 1);
        }
        assert_eq!(tracker.value(), 0);
    }

    #[test]
    fn level_guard_restores_across_error_paths() {
        fn fails_under_guard(tracker: &NestingLevelTracker) -> Result<(), MantraError> {
            let _guard = tracker.changed_by(1)?;
            Err(internal_error("boom", None))
        }
        let tracker = NestingLevelTracker::new();
        assert!(fails_under_guard(&tracker).is_err());
        assert_eq!(tracker.value(), 0);
    }

    #[test]
    fn level_cannot_go_negative() {
        let tracker = NestingLevelTracker::new();
        match tracker.changed_by(-1) {
            Err(err) => assert_eq!(err.error_type(), ErrorType::Internal),
            Ok(_) => panic!("a negative level must be rejected"),
        }
        assert_eq!(tracker.value(), 0);
    }
}
