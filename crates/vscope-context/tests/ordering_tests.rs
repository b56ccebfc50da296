//! Call-order tests for the scope capabilities driven by `ContextManager`

use mockall::{mock, Sequence};
use pretty_assertions::assert_eq;
use std::sync::Arc;
use vscope_context::prelude::*;
use vscope_context::{ConversationCorrelator, ScopeContext, ScopeController};
use vscope_test_utils::{recording_manager, CallLog, IdentityConversationContext};

mock! {
    pub BagContext {}

    impl ScopeContext<ScopeBag> for BagContext {
        fn associate(&mut self, storage: ScopeBag) -> Result<(), ScopeError>;
        fn activate(&mut self) -> Result<(), ScopeError>;
        fn is_active(&self) -> bool;
        fn invalidate(&mut self);
        fn deactivate(&mut self) -> Result<(), ScopeError>;
        fn dissociate(&mut self, storage: &ScopeBag) -> Result<(), ScopeError>;
    }
}

fn manager_with_session(session: MockBagContext) -> ContextManager {
    ContextManager::new(
        ContextConfig::new(),
        Arc::new(ApplicationScope::new()),
        Box::new(session),
        ConversationCorrelator::standard(),
        Box::new(ScopeController::new(ScopeKind::Request)),
    )
}

#[test]
fn test_full_request_call_order() {
    let log = CallLog::new();
    let (mut manager, _application) = recording_manager(ContextConfig::new(), &log);

    {
        let mut request = manager
            .enter(RequestPlan::new().with_conversation("c1"))
            .unwrap();
        request.invalidate_session();
    }

    assert_eq!(
        log.entries(),
        vec![
            "session:associate",
            "session:activate",
            "conversation:associate",
            "conversation:activate",
            "request:associate",
            "request:activate",
            "request:invalidate",
            "request:deactivate",
            "request:dissociate",
            "conversation:invalidate",
            "conversation:deactivate",
            "conversation:dissociate",
            "session:invalidate",
            "session:deactivate",
            "session:dissociate",
        ]
    );
}

#[test]
fn test_released_session_is_not_invalidated() {
    let log = CallLog::new();
    let (mut manager, _application) = recording_manager(ContextConfig::new(), &log);

    drop(manager.enter(RequestPlan::new().with_session()).unwrap());

    let entries = log.entries();
    assert!(!entries.contains(&"session:invalidate".to_string()));
    assert_eq!(
        entries[entries.len() - 2..].to_vec(),
        vec!["session:deactivate", "session:dissociate"]
    );
}

#[test]
fn test_noop_stops_make_no_calls() {
    let log = CallLog::new();
    let (mut manager, _application) = recording_manager(ContextConfig::new(), &log);

    manager.stop_request_scope().unwrap();
    manager.stop_conversation_scope().unwrap();
    manager.stop_session_scope().unwrap();

    assert!(log.entries().is_empty());
}

#[test]
fn test_stop_session_sequence() {
    let mut session = MockBagContext::new();
    let mut seq = Sequence::new();

    session
        .expect_associate()
        .times(1)
        .in_sequence(&mut seq)
        .returning(|_| Ok(()));
    session
        .expect_activate()
        .times(1)
        .in_sequence(&mut seq)
        .returning(|| Ok(()));
    session
        .expect_invalidate()
        .times(1)
        .in_sequence(&mut seq)
        .return_const(());
    session
        .expect_deactivate()
        .times(1)
        .in_sequence(&mut seq)
        .returning(|| Ok(()));
    session
        .expect_dissociate()
        .times(1)
        .in_sequence(&mut seq)
        .returning(|_| Ok(()));
    session.expect_is_active().return_const(true);

    let mut manager = manager_with_session(session);
    manager.start_session_scope().unwrap();
    manager.stop_session_scope().unwrap();
}

#[test]
fn test_inactive_session_stop_is_noop() {
    let mut session = MockBagContext::new();
    session.expect_is_active().return_const(false);
    session.expect_invalidate().never();
    session.expect_deactivate().never();
    session.expect_dissociate().never();

    let mut manager = manager_with_session(session);
    manager.stop_session_scope().unwrap();
    manager.release_session_scope().unwrap();
}

#[test]
fn test_failed_activation_dissociates() {
    let mut session = MockBagContext::new();
    session.expect_is_active().return_const(false);
    session.expect_associate().times(1).returning(|_| Ok(()));
    session.expect_activate().times(1).returning(|| {
        Err(ScopeError::Ordering {
            kind: ScopeKind::Session,
            operation: vscope_context::ScopeOperation::Activate,
            state: vscope_context::ScopeState::Active,
        })
    });
    session.expect_dissociate().times(1).returning(|_| Ok(()));

    let mut manager = manager_with_session(session);
    assert!(manager.start_session_scope().is_err());
}

#[test]
fn test_session_correlation_error_still_replaces_bag() {
    let mut session = MockBagContext::new();
    session.expect_associate().returning(|_| Ok(()));
    session.expect_activate().returning(|| Ok(()));
    session.expect_is_active().return_const(true);
    session.expect_invalidate().return_const(());
    session.expect_deactivate().returning(|| Ok(()));
    session.expect_dissociate().returning(|_| {
        Err(ScopeError::Correlation {
            kind: ScopeKind::Session,
        })
    });

    let mut manager = manager_with_session(session);
    manager.start_session_scope().unwrap();
    let before = manager.session_bag().clone();

    let err = manager.stop_session_scope().unwrap_err();
    assert!(err.is_recoverable());
    assert!(!manager.session_bag().same_bag(&before));
}

#[test]
fn test_value_equal_composite_correlates() {
    let mut manager = ContextManager::standard(ContextConfig::new(), Arc::new(ApplicationScope::new()));
    manager.start_session_scope().unwrap();
    manager.start_conversation_scope("c1").unwrap();
    manager.start_request_scope().unwrap();

    manager.stop_request_scope().unwrap();
    assert_eq!(manager.stop_conversation_scope(), Ok(()));
}

#[test]
fn test_identity_composite_fails_after_request_bag_replaced() {
    let mut manager = ContextManager::new(
        ContextConfig::new(),
        Arc::new(ApplicationScope::new()),
        Box::new(ScopeController::new(ScopeKind::Session)),
        ConversationCorrelator::new(Box::new(IdentityConversationContext::new())),
        Box::new(ScopeController::new(ScopeKind::Request)),
    );
    manager.start_session_scope().unwrap();
    manager.start_conversation_scope("c1").unwrap();
    manager.start_request_scope().unwrap();

    manager.stop_request_scope().unwrap();
    let err = manager.stop_conversation_scope().unwrap_err();

    assert_eq!(
        err,
        ScopeError::Correlation {
            kind: ScopeKind::Conversation
        }
    );
    // The binding was released; a new conversation can start
    assert!(manager.conversation().is_none());
    manager.start_conversation_scope("c2").unwrap();
}

#[test]
fn test_identity_composite_correlates_with_same_bags() {
    let mut manager = ContextManager::new(
        ContextConfig::new(),
        Arc::new(ApplicationScope::new()),
        Box::new(ScopeController::new(ScopeKind::Session)),
        ConversationCorrelator::new(Box::new(IdentityConversationContext::new())),
        Box::new(ScopeController::new(ScopeKind::Request)),
    );
    manager.start_session_scope().unwrap();
    manager.start_conversation_scope("c1").unwrap();

    assert_eq!(manager.stop_conversation_scope(), Ok(()));
}
