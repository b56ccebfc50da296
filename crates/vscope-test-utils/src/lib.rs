//! Testing utilities for vscope workspace
//!
//! Shared test helpers, fixtures, and recording scope contexts.

#![allow(missing_docs)]

use parking_lot::Mutex;
use std::sync::Arc;
use vscope_context::{
    ApplicationScope, ContextConfig, ContextManager, ConversationCorrelator, ConversationHandle,
    ScopeBag, ScopeContext, ScopeController, ScopeError, ScopeKind, ScopeState, ScopeStorage,
};

/// Shared, ordered log of `"<scope>:<operation>"` entries
#[derive(Debug, Clone, Default)]
pub struct CallLog(Arc<Mutex<Vec<String>>>);

impl CallLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, entry: String) {
        self.0.lock().push(entry);
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().clone()
    }

    pub fn clear(&self) {
        self.0.lock().clear();
    }
}

/// Bundled controller that logs every call before delegating
#[derive(Debug)]
pub struct RecordingContext<S> {
    inner: ScopeController<S>,
    log: CallLog,
}

impl<S: ScopeStorage> RecordingContext<S> {
    pub fn new(kind: ScopeKind, log: CallLog) -> Self {
        Self {
            inner: ScopeController::new(kind),
            log,
        }
    }

    fn record(&self, operation: &str) {
        self.log.push(format!("{}:{operation}", self.inner.kind()));
    }
}

impl<S: ScopeStorage> ScopeContext<S> for RecordingContext<S> {
    fn associate(&mut self, storage: S) -> Result<(), ScopeError> {
        self.record("associate");
        self.inner.associate(storage)
    }

    fn activate(&mut self) -> Result<(), ScopeError> {
        self.record("activate");
        self.inner.activate()
    }

    fn is_active(&self) -> bool {
        self.inner.is_active()
    }

    fn invalidate(&mut self) {
        self.record("invalidate");
        self.inner.invalidate();
    }

    fn deactivate(&mut self) -> Result<(), ScopeError> {
        self.record("deactivate");
        self.inner.deactivate()
    }

    fn dissociate(&mut self, storage: &S) -> Result<(), ScopeError> {
        self.record("dissociate");
        self.inner.dissociate(storage)
    }
}

/// Conversation context of a host that compares composites by identity.
///
/// Dissociation succeeds only when the given composite references the very
/// same request and session bags that were associated.
#[derive(Debug)]
pub struct IdentityConversationContext {
    inner: ScopeController<ConversationHandle>,
    bound: Option<ConversationHandle>,
}

impl IdentityConversationContext {
    pub fn new() -> Self {
        Self {
            inner: ScopeController::new(ScopeKind::Conversation),
            bound: None,
        }
    }
}

impl Default for IdentityConversationContext {
    fn default() -> Self {
        Self::new()
    }
}

impl ScopeContext<ConversationHandle> for IdentityConversationContext {
    fn associate(&mut self, storage: ConversationHandle) -> Result<(), ScopeError> {
        self.inner.associate(storage.clone())?;
        self.bound = Some(storage);
        Ok(())
    }

    fn activate(&mut self) -> Result<(), ScopeError> {
        self.inner.activate()
    }

    fn is_active(&self) -> bool {
        self.inner.is_active()
    }

    fn invalidate(&mut self) {
        self.inner.invalidate();
    }

    fn deactivate(&mut self) -> Result<(), ScopeError> {
        self.inner.deactivate()
    }

    fn dissociate(&mut self, storage: &ConversationHandle) -> Result<(), ScopeError> {
        if self.inner.state() != ScopeState::Associated {
            // Let the controller report the ordering violation
            return self.inner.dissociate(storage);
        }
        let Some(bound) = self.bound.take() else {
            return self.inner.dissociate(storage);
        };
        let identical = bound.request_bag().same_bag(storage.request_bag())
            && bound.session_bag().same_bag(storage.session_bag());
        self.inner.dissociate(&bound)?;
        if identical {
            Ok(())
        } else {
            Err(ScopeError::Correlation {
                kind: ScopeKind::Conversation,
            })
        }
    }
}

/// Manager whose session, conversation and request contexts log into `log`
pub fn recording_manager(config: ContextConfig, log: &CallLog) -> (ContextManager, ApplicationScope) {
    let application = ApplicationScope::new();
    let manager = ContextManager::new(
        config,
        Arc::new(application.clone()),
        Box::new(RecordingContext::<ScopeBag>::new(ScopeKind::Session, log.clone())),
        ConversationCorrelator::new(Box::new(RecordingContext::<ConversationHandle>::new(
            ScopeKind::Conversation,
            log.clone(),
        ))),
        Box::new(RecordingContext::<ScopeBag>::new(ScopeKind::Request, log.clone())),
    );
    (manager, application)
}

/// Manager over the bundled controllers and a fresh application scope
pub fn standard_manager() -> (ContextManager, ApplicationScope) {
    let application = ApplicationScope::new();
    let manager = ContextManager::standard(ContextConfig::new(), Arc::new(application.clone()));
    (manager, application)
}

/// Bag pre-filled with string values
pub fn bag_with(entries: &[(&str, &str)]) -> ScopeBag {
    let bag = ScopeBag::new();
    for (key, value) in entries {
        bag.put(*key, (*value).to_string());
    }
    bag
}
