//! Scope lifecycle tests
//!
//! End-to-end behaviour of `ContextManager` across start/stop cycles.

use pretty_assertions::assert_eq;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use vscope_context::prelude::*;
use vscope_context::{ScopeContext, ScopeController, ScopeState};
use vscope_test_utils::{bag_with, standard_manager};

#[test]
fn test_stops_without_start_leave_state_unchanged() {
    let (mut manager, application) = standard_manager();
    application.bag().put("k", 1u8);

    manager.stop_request_scope().unwrap();
    manager.stop_conversation_scope().unwrap();
    manager.stop_session_scope().unwrap();
    manager.release_session_scope().unwrap();

    assert_eq!(manager.active_scopes(), vec![ScopeKind::Application]);
    assert!(manager.session().is_none());
    assert!(manager.request().is_none());
    assert!(manager.conversation().is_none());
    assert!(application.bag().contains_key("k"));
}

#[test]
fn test_repeated_stops_are_idempotent() {
    let (mut manager, _application) = standard_manager();
    manager.start_session_scope().unwrap();
    manager.start_request_scope().unwrap();

    for _ in 0..3 {
        manager.stop_request_scope().unwrap();
        manager.stop_session_scope().unwrap();
    }
    assert_eq!(manager.active_scopes(), vec![ScopeKind::Application]);
}

#[test]
fn test_session_bag_is_fresh_per_activation() {
    let (mut manager, _application) = standard_manager();

    manager.start_session_scope().unwrap();
    manager.session().unwrap().put("user", "alice".to_string());
    manager.stop_session_scope().unwrap();
    manager.start_session_scope().unwrap();

    assert!(manager.lookup("user").is_none());
    assert!(manager.session().unwrap().is_empty());
}

#[test]
fn test_conversation_writes_visible_in_request_bag() {
    let (mut manager, _application) = standard_manager();
    manager.start_session_scope().unwrap();
    manager.start_conversation_scope("c1").unwrap();
    manager.start_request_scope().unwrap();

    manager.conversation().unwrap().put("k", "v".to_string());
    let direct = manager.request().unwrap().get_as::<String>("k");

    assert_eq!(direct.as_deref(), Some(&"v".to_string()));
}

#[test]
fn test_request_writes_visible_through_conversation() {
    let (mut manager, _application) = standard_manager();
    manager.start_session_scope().unwrap();
    manager.start_conversation_scope("c1").unwrap();
    manager.start_request_scope().unwrap();

    manager.request().unwrap().put("k", "v".to_string());
    let via_view = manager.conversation().unwrap().get_as::<String>("k");

    assert_eq!(via_view.as_deref(), Some(&"v".to_string()));
}

#[test]
fn test_conversation_view_falls_back_to_session() {
    let (mut manager, _application) = standard_manager();
    manager
        .bind_session(bag_with(&[("user", "alice")]))
        .unwrap();
    manager.start_session_scope().unwrap();
    manager.start_conversation_scope("c1").unwrap();
    manager.start_request_scope().unwrap();

    let user = manager.conversation().unwrap().get_as::<String>("user");
    assert_eq!(user.as_deref(), Some(&"alice".to_string()));
}

#[test]
fn test_long_running_conversation_spans_requests() {
    let (mut manager, _application) = standard_manager();

    {
        let request = manager
            .enter(RequestPlan::new().with_conversation("wizard"))
            .unwrap();
        let conversation = request.conversation().unwrap();
        conversation.begin();
        conversation.put("step", 2u32);
    }
    {
        let request = manager
            .enter(RequestPlan::new().with_conversation("wizard"))
            .unwrap();
        assert_eq!(request.lookup_as::<u32>("step").as_deref(), Some(&2));
        // Restored into the new request bag
        assert!(request.request().unwrap().contains_key("step"));
        request.conversation().unwrap().end();
    }

    let request = manager
        .enter(RequestPlan::new().with_conversation("wizard"))
        .unwrap();
    assert!(request.lookup("step").is_none());
}

#[test]
fn test_transient_conversation_does_not_span_requests() {
    let (mut manager, _application) = standard_manager();

    {
        let request = manager
            .enter(RequestPlan::new().with_conversation("once"))
            .unwrap();
        request.conversation().unwrap().put("draft", "x".to_string());
    }

    let request = manager
        .enter(RequestPlan::new().with_conversation("once"))
        .unwrap();
    assert!(request.lookup("draft").is_none());
}

#[test]
fn test_guard_tears_down_on_panic() {
    let (mut manager, _application) = standard_manager();
    let session = manager.session_bag().clone();

    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        let request = manager
            .enter(RequestPlan::new().with_conversation("c1"))
            .unwrap();
        request.request().unwrap().put("k", 1u8);
        panic!("handler failed");
    }));

    assert!(outcome.is_err());
    assert_eq!(manager.active_scopes(), vec![ScopeKind::Application]);
    assert!(session.try_exclusive().is_some());
    assert!(manager.request_bag().is_empty());
}

#[test]
fn test_guard_tears_down_on_early_return() {
    fn handler(manager: &mut ContextManager) -> Result<(), ScopeError> {
        let _request = manager.enter(RequestPlan::new().with_session())?;
        Err(ScopeError::Correlation {
            kind: ScopeKind::Request,
        })
    }

    let (mut manager, _application) = standard_manager();
    assert!(handler(&mut manager).is_err());
    assert_eq!(manager.active_scopes(), vec![ScopeKind::Application]);
}

#[test]
fn test_registry_sessions_shared_across_managers() {
    let registry = SessionRegistry::new();
    let (id, bag) = registry.create();
    let application = ApplicationScope::new();

    let writer = {
        let registry = registry.clone();
        let application = application.clone();
        thread::spawn(move || {
            let mut manager =
                ContextManager::standard(ContextConfig::new(), Arc::new(application));
            manager.bind_session(registry.get(&id).unwrap()).unwrap();
            let request = manager.enter(RequestPlan::new().with_session()).unwrap();
            request.session().unwrap().put("visits", 1u32);
        })
    };
    writer.join().unwrap();

    let mut manager = ContextManager::standard(ContextConfig::new(), Arc::new(application));
    manager.bind_session(bag).unwrap();
    let request = manager.enter(RequestPlan::new().with_session()).unwrap();
    assert_eq!(request.lookup_as::<u32>("visits").as_deref(), Some(&1));
}

#[test]
fn test_session_lease_serializes_requests() {
    let registry = SessionRegistry::new();
    let (id, _bag) = registry.create();
    let application = ApplicationScope::new();

    let workers: Vec<_> = (0..4)
        .map(|_| {
            let registry = registry.clone();
            let application = application.clone();
            thread::spawn(move || {
                let mut manager =
                    ContextManager::standard(ContextConfig::new(), Arc::new(application));
                for _ in 0..25 {
                    manager.bind_session(registry.get(&id).unwrap()).unwrap();
                    let request = manager.enter(RequestPlan::new().with_session()).unwrap();
                    let session = request.session().unwrap();
                    // Read-modify-write is only safe under the lease
                    let current = session.get_as::<u32>("count").map_or(0, |v| *v);
                    thread::sleep(Duration::from_micros(10));
                    session.put("count", current + 1);
                }
            })
        })
        .collect();
    for worker in workers {
        worker.join().unwrap();
    }

    let count = registry.get(&id).unwrap().get_as::<u32>("count");
    assert_eq!(count.as_deref(), Some(&100));
}

#[test]
fn test_idle_conversations_evicted() {
    let config = ContextConfig::new().with_conversation_max_idle(Duration::ZERO);
    let mut manager = ContextManager::standard(config, Arc::new(ApplicationScope::new()));

    {
        let request = manager
            .enter(RequestPlan::new().with_conversation("stale"))
            .unwrap();
        request.conversation().unwrap().begin();
    }

    manager.start_session_scope().unwrap();
    manager.start_conversation_scope("live").unwrap();
    manager.conversation().unwrap().begin();

    assert_eq!(manager.evict_idle_conversations(), 1);
    assert!(manager.conversation().unwrap().state().is_some());
}

#[test]
fn test_controller_ordering_and_correlation_errors() {
    let mut ctl: ScopeController<ScopeBag> = ScopeController::new(ScopeKind::Request);
    let err = ctl.activate().unwrap_err();
    assert!(matches!(err, ScopeError::Ordering { .. }));
    assert!(err.is_fatal());

    ctl.associate(bag_with(&[("a", "1")])).unwrap();
    ctl.activate().unwrap();
    ctl.deactivate().unwrap();

    let err = ctl.dissociate(&bag_with(&[("b", "2")])).unwrap_err();
    assert_eq!(
        err,
        ScopeError::Correlation {
            kind: ScopeKind::Request
        }
    );
    assert!(err.is_recoverable());
    assert_eq!(ctl.state(), ScopeState::Unassociated);
}
