//! Behaviour under the `strict-ordering` feature:
//! `cargo test -p vscope-context --features strict-ordering --test strict_ordering_tests`
#![cfg(feature = "strict-ordering")]

use std::sync::Arc;
use vscope_context::prelude::*;
use vscope_context::{ScopeContext, ScopeController};

#[test]
#[should_panic(expected = "scope ordering violation")]
fn test_activate_unassociated_panics() {
    let mut controller: ScopeController<ScopeBag> = ScopeController::new(ScopeKind::Request);
    let _ = controller.activate();
}

#[test]
#[should_panic(expected = "scope ordering violation")]
fn test_conversation_without_session_panics() {
    let mut manager = ContextManager::standard(ContextConfig::new(), Arc::new(ApplicationScope::new()));
    let _ = manager.start_conversation_scope("c1");
}

#[test]
fn test_correlation_mismatch_still_returns_error() {
    let mut controller = ScopeController::new(ScopeKind::Session);
    controller.associate(ScopeBag::new()).unwrap();
    controller.activate().unwrap();
    controller.deactivate().unwrap();

    let other = ScopeBag::new();
    other.put("stray", 1u8);
    let err = controller.dissociate(&other).unwrap_err();

    assert_eq!(
        err,
        ScopeError::Correlation {
            kind: ScopeKind::Session
        }
    );
    assert!(err.is_recoverable());
}
