//! Conversation correlation
//!
//! A conversation spans several physical requests that share one session.
//! [`ConversationHandle`] is a view over the current request bag and session
//! bag, keyed by the conversation identifier:
//!
//! - reads resolve through the request bag, then the conversation's durable
//!   state, then the session bag
//! - writes land in the request bag and in the durable state, which lives in
//!   the session bag under [`CONVERSATION_KEY_PREFIX`]`<id>`
//!
//! The handle owns nothing; it must not outlive the request it was built for.

use crate::bag::{Attribute, ScopeBag};
use crate::controller::{ScopeContext, ScopeController, ScopeStorage};
use crate::error::ScopeError;
use crate::types::ScopeKind;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::any::Any;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

/// Session key prefix for durable conversation state
pub const CONVERSATION_KEY_PREFIX: &str = "vscope.conversation.";

/// Session key holding the durable state of conversation `id`
#[must_use]
pub fn state_key(id: &str) -> String {
    format!("{CONVERSATION_KEY_PREFIX}{id}")
}

/// Durable conversation state, stored in the session bag
#[derive(Debug)]
pub struct ConversationState {
    attributes: DashMap<String, Attribute>,
    long_running: AtomicBool,
    last_access: Mutex<Instant>,
}

impl ConversationState {
    fn new() -> Self {
        Self {
            attributes: DashMap::new(),
            long_running: AtomicBool::new(false),
            last_access: Mutex::new(Instant::now()),
        }
    }

    /// Whether the conversation survives the end of its request
    #[must_use]
    pub fn is_long_running(&self) -> bool {
        self.long_running.load(Ordering::Acquire)
    }

    /// Time since the conversation was last started
    #[must_use]
    pub fn idle(&self) -> Duration {
        self.last_access.lock().elapsed()
    }

    /// Number of durable attributes
    #[must_use]
    pub fn len(&self) -> usize {
        self.attributes.len()
    }

    /// Whether there are no durable attributes
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }

    fn touch(&self) {
        *self.last_access.lock() = Instant::now();
    }
}

/// Union view over the request and session bags for one conversation
#[derive(Clone, PartialEq)]
pub struct ConversationHandle {
    id: String,
    request: ScopeBag,
    session: ScopeBag,
}

impl ConversationHandle {
    /// Build a view; cheap, only clones bag handles
    #[must_use]
    pub fn new(id: impl Into<String>, request: ScopeBag, session: ScopeBag) -> Self {
        Self {
            id: id.into(),
            request,
            session,
        }
    }

    /// Conversation identifier
    #[inline]
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Request bag this view writes through
    #[inline]
    #[must_use]
    pub fn request_bag(&self) -> &ScopeBag {
        &self.request
    }

    /// Session bag holding the durable state
    #[inline]
    #[must_use]
    pub fn session_bag(&self) -> &ScopeBag {
        &self.session
    }

    /// Resolve `key` through request, durable state, then session
    #[must_use]
    pub fn get(&self, key: &str) -> Option<Attribute> {
        self.request
            .get(key)
            .or_else(|| {
                self.state()
                    .and_then(|state| state.attributes.get(key).map(|v| Arc::clone(v.value())))
            })
            .or_else(|| self.session.get(key))
    }

    /// Typed lookup, see [`get`](Self::get)
    #[must_use]
    pub fn get_as<T: Any + Send + Sync>(&self, key: &str) -> Option<Arc<T>> {
        self.get(key)?.downcast::<T>().ok()
    }

    /// Whether `key` resolves through the view
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Store a value in the request bag and the durable state
    pub fn put<T: Any + Send + Sync>(&self, key: impl Into<String>, value: T) -> Option<Attribute> {
        self.put_attribute(key, Arc::new(value))
    }

    /// Store a shared attribute, see [`put`](Self::put)
    pub fn put_attribute(&self, key: impl Into<String>, value: Attribute) -> Option<Attribute> {
        let key = key.into();
        if let Some(state) = self.state_or_init() {
            state.attributes.insert(key.clone(), Arc::clone(&value));
        }
        self.request.put_attribute(key, value)
    }

    /// Remove `key` from the request bag and the durable state
    pub fn remove(&self, key: &str) -> Option<Attribute> {
        let durable = self
            .state()
            .and_then(|state| state.attributes.remove(key).map(|(_, v)| v));
        self.request.remove(key).or(durable)
    }

    /// Promote to long-running: state survives `stopConversationScope`
    pub fn begin(&self) {
        if let Some(state) = self.state_or_init() {
            state.long_running.store(true, Ordering::Release);
            debug!(conversation_id = %self.id, "conversation promoted to long-running");
        }
    }

    /// Demote to transient: state is discarded at the next stop
    pub fn end(&self) {
        if let Some(state) = self.state() {
            state.long_running.store(false, Ordering::Release);
            debug!(conversation_id = %self.id, "conversation demoted to transient");
        }
    }

    /// Whether the conversation is long-running
    #[must_use]
    pub fn is_long_running(&self) -> bool {
        self.state().is_some_and(|state| state.is_long_running())
    }

    /// Durable state, if any was written
    #[must_use]
    pub fn state(&self) -> Option<Arc<ConversationState>> {
        self.session.get_as::<ConversationState>(&state_key(&self.id))
    }

    fn state_or_init(&self) -> Option<Arc<ConversationState>> {
        self.session
            .get_or_insert_with(&state_key(&self.id), ConversationState::new)
    }

    /// Copy durable attributes into the request bag and refresh the idle clock
    fn restore(&self) {
        let Some(state) = self.state() else {
            return;
        };
        state.touch();
        for entry in state.attributes.iter() {
            if !self.request.contains_key(entry.key()) {
                self.request
                    .put_attribute(entry.key().clone(), Arc::clone(entry.value()));
            }
        }
    }
}

impl ScopeStorage for ConversationHandle {
    fn discard(&self) {
        if self.is_long_running() {
            return;
        }
        if self.session.remove(&state_key(&self.id)).is_some() {
            debug!(conversation_id = %self.id, "transient conversation state discarded");
        }
    }
}

impl fmt::Debug for ConversationHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConversationHandle")
            .field("id", &self.id)
            .field("request", &self.request)
            .field("long_running", &self.is_long_running())
            .finish_non_exhaustive()
    }
}

/// Remove durable state of conversations idle for at least `max_idle`.
///
/// `keep` names a conversation that must survive regardless (the active
/// one). Returns the number of conversations removed.
pub fn evict_idle(session: &ScopeBag, max_idle: Duration, keep: Option<&str>) -> usize {
    let keep_key = keep.map(state_key);
    let mut evicted = 0;
    for key in session.keys_with_prefix(CONVERSATION_KEY_PREFIX) {
        if keep_key.as_deref() == Some(key.as_str()) {
            continue;
        }
        let idle = session
            .get_as::<ConversationState>(&key)
            .is_some_and(|state| state.idle() >= max_idle);
        if idle && session.remove(&key).is_some() {
            evicted += 1;
        }
    }
    if evicted > 0 {
        debug!(evicted, "evicted idle conversations");
    }
    evicted
}

/// Drives the conversation scope controller with composite views
pub struct ConversationCorrelator {
    context: Box<dyn ScopeContext<ConversationHandle>>,
    current: Option<ConversationHandle>,
}

impl ConversationCorrelator {
    /// Wrap a host-supplied conversation context
    #[must_use]
    pub fn new(context: Box<dyn ScopeContext<ConversationHandle>>) -> Self {
        Self {
            context,
            current: None,
        }
    }

    /// Correlator over the bundled [`ScopeController`]
    #[must_use]
    pub fn standard() -> Self {
        Self::new(Box::new(ScopeController::new(ScopeKind::Conversation)))
    }

    /// Whether a conversation is live
    #[inline]
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.context.is_active()
    }

    /// The live conversation view
    #[must_use]
    pub fn current(&self) -> Option<&ConversationHandle> {
        if self.is_active() {
            self.current.as_ref()
        } else {
            None
        }
    }

    /// Build the composite for `id` and activate the conversation scope
    ///
    /// # Errors
    /// Ordering errors from the underlying context.
    pub fn start(
        &mut self,
        id: impl Into<String>,
        request: &ScopeBag,
        session: &ScopeBag,
    ) -> Result<&ConversationHandle, ScopeError> {
        let handle = ConversationHandle::new(id, request.clone(), session.clone());
        self.context.associate(handle.clone())?;
        if let Err(err) = self.context.activate() {
            // Leave the context unassociated again; the activation error wins
            let _ = self.context.dissociate(&handle);
            return Err(err);
        }
        handle.restore();
        debug!(conversation_id = %handle.id(), "conversation scope started");
        Ok(&*self.current.insert(handle))
    }

    /// Invalidate, deactivate and dissociate the live conversation.
    ///
    /// The composite passed to dissociation is rebuilt from `request` and
    /// `session`; it must equal the one that was associated. No-op when no
    /// conversation is live.
    ///
    /// # Errors
    /// Ordering errors from the underlying context, or
    /// [`ScopeError::Correlation`] when the rebuilt composite differs.
    pub fn stop(&mut self, request: &ScopeBag, session: &ScopeBag) -> Result<(), ScopeError> {
        if !self.context.is_active() {
            return Ok(());
        }
        let id = self.current.take().map(|h| h.id).unwrap_or_default();
        self.context.invalidate();
        self.context.deactivate()?;
        let rebuilt = ConversationHandle::new(id.as_str(), request.clone(), session.clone());
        self.context.dissociate(&rebuilt)?;
        debug!(conversation_id = %id, "conversation scope stopped");
        Ok(())
    }

    /// [`evict_idle`] that never evicts the live conversation
    pub fn evict_idle(&self, session: &ScopeBag, max_idle: Duration) -> usize {
        evict_idle(session, max_idle, self.current().map(ConversationHandle::id))
    }
}

impl fmt::Debug for ConversationCorrelator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConversationCorrelator")
            .field("active", &self.is_active())
            .field("current", &self.current)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bags() -> (ScopeBag, ScopeBag) {
        (ScopeBag::new(), ScopeBag::new())
    }

    #[test]
    fn write_via_conversation_read_via_request() {
        let (request, session) = bags();
        let mut correlator = ConversationCorrelator::standard();
        let view = correlator.start("c1", &request, &session).unwrap();

        view.put("k", "v".to_string());
        assert_eq!(request.get_as::<String>("k").as_deref(), Some(&"v".to_string()));
    }

    #[test]
    fn write_via_request_read_via_conversation() {
        let (request, session) = bags();
        let mut correlator = ConversationCorrelator::standard();
        correlator.start("c1", &request, &session).unwrap();

        request.put("k", "v".to_string());
        let view = correlator.current().unwrap();
        assert_eq!(view.get_as::<String>("k").as_deref(), Some(&"v".to_string()));
    }

    #[test]
    fn session_values_resolve_through_view() {
        let (request, session) = bags();
        session.put("user", "alice".to_string());
        let view = ConversationHandle::new("c1", request, session);
        assert!(view.contains_key("user"));
    }

    #[test]
    fn rebuilt_composite_is_equal() {
        let (request, session) = bags();
        let a = ConversationHandle::new("c1", request.clone(), session.clone());
        let b = ConversationHandle::new("c1", request, session);
        assert_eq!(a, b);
        assert_ne!(a, ConversationHandle::new("c2", ScopeBag::new(), ScopeBag::new()));
    }

    #[test]
    fn stop_without_start_is_noop() {
        let (request, session) = bags();
        let mut correlator = ConversationCorrelator::standard();
        correlator.stop(&request, &session).unwrap();
        assert!(!correlator.is_active());
    }

    #[test]
    fn transient_state_discarded_on_stop() {
        let (request, session) = bags();
        let mut correlator = ConversationCorrelator::standard();
        correlator.start("c1", &request, &session).unwrap().put("k", 1u8);
        assert!(session.contains_key(&state_key("c1")));

        correlator.stop(&request, &session).unwrap();
        assert!(!session.contains_key(&state_key("c1")));
    }

    #[test]
    fn long_running_state_survives_across_requests() {
        let session = ScopeBag::new();
        let mut correlator = ConversationCorrelator::standard();

        let first_request = ScopeBag::new();
        let view = correlator.start("c1", &first_request, &session).unwrap();
        view.begin();
        view.put("step", 2u32);
        correlator.stop(&first_request, &session).unwrap();

        let second_request = ScopeBag::new();
        correlator.start("c1", &second_request, &session).unwrap();
        assert_eq!(second_request.get_as::<u32>("step").as_deref(), Some(&2));

        correlator.current().unwrap().end();
        correlator.stop(&second_request, &session).unwrap();
        assert!(session.keys_with_prefix(CONVERSATION_KEY_PREFIX).is_empty());
    }

    #[test]
    fn stop_with_different_session_is_correlation_error() {
        let (request, session) = bags();
        let mut correlator = ConversationCorrelator::standard();
        correlator.start("c1", &request, &session).unwrap();

        let other = ScopeBag::new();
        other.put("stray", 1u8);
        let err = correlator.stop(&request, &other).unwrap_err();
        assert!(err.is_recoverable());
        assert!(!correlator.is_active());
    }

    #[test]
    fn evict_idle_skips_live_conversation() {
        let session = ScopeBag::new();
        let mut correlator = ConversationCorrelator::standard();

        let old = ConversationHandle::new("old", ScopeBag::new(), session.clone());
        old.begin();

        let request = ScopeBag::new();
        correlator.start("live", &request, &session).unwrap().begin();

        assert_eq!(correlator.evict_idle(&session, Duration::ZERO), 1);
        assert!(session.contains_key(&state_key("live")));
        assert!(!session.contains_key(&state_key("old")));
    }
}
