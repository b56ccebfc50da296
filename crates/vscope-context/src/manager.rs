//! Scope orchestration across one inbound request
//!
//! [`ContextManager`] owns the four scope capabilities and the bags bound
//! to them. It enforces nesting: scopes start outer-to-inner (application,
//! session, conversation, request) and stop inner-to-outer. Every `stop_*`
//! is a no-op when its scope is not active.
//!
//! After `stop_session_scope` and `stop_request_scope` the bag is replaced
//! with a fresh one, so nothing written during one session or request is
//! visible to the next.

use crate::application::ApplicationContext;
use crate::bag::{Attribute, ScopeBag};
use crate::config::ContextConfig;
use crate::controller::{ScopeContext, ScopeController};
use crate::conversation::{ConversationCorrelator, ConversationHandle};
use crate::error::ScopeError;
use crate::types::{ScopeKind, ScopeOperation, ScopeState};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

/// Orchestrates application, session, conversation and request scopes
pub struct ContextManager {
    config: ContextConfig,
    application: Arc<dyn ApplicationContext>,
    session: Box<dyn ScopeContext<ScopeBag>>,
    conversation: ConversationCorrelator,
    request: Box<dyn ScopeContext<ScopeBag>>,
    session_bag: ScopeBag,
    request_bag: ScopeBag,
}

impl ContextManager {
    /// Create from explicit host capabilities
    #[must_use]
    pub fn new(
        config: ContextConfig,
        application: Arc<dyn ApplicationContext>,
        session: Box<dyn ScopeContext<ScopeBag>>,
        conversation: ConversationCorrelator,
        request: Box<dyn ScopeContext<ScopeBag>>,
    ) -> Self {
        Self {
            config,
            application,
            session,
            conversation,
            request,
            session_bag: ScopeBag::new(),
            request_bag: ScopeBag::new(),
        }
    }

    /// Create over the bundled [`ScopeController`]s
    #[must_use]
    pub fn standard(config: ContextConfig, application: Arc<dyn ApplicationContext>) -> Self {
        Self::new(
            config,
            application,
            Box::new(ScopeController::new(ScopeKind::Session)),
            ConversationCorrelator::standard(),
            Box::new(ScopeController::new(ScopeKind::Request)),
        )
    }

    /// Active configuration
    #[inline]
    #[must_use]
    pub fn config(&self) -> &ContextConfig {
        &self.config
    }

    /// Whether the scope of `kind` is live
    #[must_use]
    pub fn is_active(&self, kind: ScopeKind) -> bool {
        match kind {
            ScopeKind::Application => self.application.is_active(),
            ScopeKind::Session => self.session.is_active(),
            ScopeKind::Conversation => self.conversation.is_active(),
            ScopeKind::Request => self.request.is_active(),
        }
    }

    /// Live scopes, outermost first
    #[must_use]
    pub fn active_scopes(&self) -> Vec<ScopeKind> {
        ScopeKind::START_ORDER
            .into_iter()
            .filter(|kind| self.is_active(*kind))
            .collect()
    }

    // ------------------------------------------------------------------
    // Application
    // ------------------------------------------------------------------

    /// Application scope is always live; nothing to start
    ///
    /// # Errors
    /// Never fails; the signature matches the other `start_*` calls.
    pub fn start_application_scope(&self) -> Result<(), ScopeError> {
        debug!(active = self.application.is_active(), "application scope start requested");
        Ok(())
    }

    /// Process shutdown: clear the application store if it supports shared
    /// clearing
    ///
    /// The application scope is live from construction, so there is no
    /// "not started" state to make this a no-op: a stop without a prior
    /// [`start_application_scope`](Self::start_application_scope) still clears
    /// the store. Only a host context reporting itself inactive skips the clear.
    ///
    /// # Errors
    /// [`ScopeError::Nesting`] while an inner scope is still active.
    pub fn stop_application_scope(&mut self) -> Result<(), ScopeError> {
        if !self.application.is_active() {
            return Ok(());
        }
        self.ensure_inner_inactive(ScopeKind::Application, ScopeOperation::Stop)?;
        if !self.config.clear_application_on_shutdown {
            return Ok(());
        }
        if let Some(store) = self.application.shared_store() {
            store.clear();
            info!("application scope cleared");
        }
        Ok(())
    }

    /// Host application context
    #[inline]
    #[must_use]
    pub fn application(&self) -> &dyn ApplicationContext {
        self.application.as_ref()
    }

    // ------------------------------------------------------------------
    // Session
    // ------------------------------------------------------------------

    /// Bind the bag of the user's existing session for the next start
    ///
    /// # Errors
    /// [`ScopeError::Ordering`] while the session scope is active.
    pub fn bind_session(&mut self, bag: ScopeBag) -> Result<(), ScopeError> {
        if self.session.is_active() {
            return Err(ScopeError::Ordering {
                kind: ScopeKind::Session,
                operation: ScopeOperation::Bind,
                state: ScopeState::Active,
            }
            .raise());
        }
        self.session_bag = bag;
        Ok(())
    }

    /// Associate and activate the session bag
    ///
    /// # Errors
    /// [`ScopeError::Nesting`] when an inner scope is already live,
    /// [`ScopeError::Ordering`] when the session scope is already started.
    pub fn start_session_scope(&mut self) -> Result<(), ScopeError> {
        self.ensure_inner_inactive(ScopeKind::Session, ScopeOperation::Start)?;
        start_bag_scope(self.session.as_mut(), &self.session_bag)?;
        debug!("session scope started");
        Ok(())
    }

    /// Invalidate, deactivate and dissociate the session, then allocate a
    /// fresh bag for the next session
    ///
    /// # Errors
    /// [`ScopeError::Nesting`] while conversation or request scope is live,
    /// [`ScopeError::Correlation`] from dissociation (the bag is replaced
    /// regardless).
    pub fn stop_session_scope(&mut self) -> Result<(), ScopeError> {
        if !self.session.is_active() {
            return Ok(());
        }
        self.ensure_inner_inactive(ScopeKind::Session, ScopeOperation::Stop)?;
        self.session.invalidate();
        self.session.deactivate()?;
        let result = self.session.dissociate(&self.session_bag);
        self.session_bag = ScopeBag::new();
        debug!("session scope stopped");
        result
    }

    /// Deactivate and dissociate the session without invalidating it.
    ///
    /// The bag and its contents are kept for the session's next request.
    ///
    /// # Errors
    /// As [`stop_session_scope`](Self::stop_session_scope).
    pub fn release_session_scope(&mut self) -> Result<(), ScopeError> {
        if !self.session.is_active() {
            return Ok(());
        }
        self.ensure_inner_inactive(ScopeKind::Session, ScopeOperation::Release)?;
        self.session.deactivate()?;
        self.session.dissociate(&self.session_bag)?;
        debug!("session scope released");
        Ok(())
    }

    /// Live session bag
    #[must_use]
    pub fn session(&self) -> Option<&ScopeBag> {
        self.session.is_active().then_some(&self.session_bag)
    }

    /// Bag the session scope is (or will be) bound to
    #[inline]
    #[must_use]
    pub fn session_bag(&self) -> &ScopeBag {
        &self.session_bag
    }

    // ------------------------------------------------------------------
    // Conversation
    // ------------------------------------------------------------------

    /// Start the conversation `id` over the current request and session bags
    ///
    /// # Errors
    /// [`ScopeError::MissingScope`] without a live session,
    /// [`ScopeError::Nesting`] when the request scope is already live.
    pub fn start_conversation_scope(&mut self, id: impl Into<String>) -> Result<(), ScopeError> {
        self.ensure_inner_inactive(ScopeKind::Conversation, ScopeOperation::Start)?;
        if !self.session.is_active() {
            return Err(ScopeError::MissingScope {
                kind: ScopeKind::Conversation,
                required: ScopeKind::Session,
            }
            .raise());
        }
        self.conversation
            .start(id, &self.request_bag, &self.session_bag)?;
        Ok(())
    }

    /// Start a conversation under a freshly generated identifier
    ///
    /// # Errors
    /// As [`start_conversation_scope`](Self::start_conversation_scope).
    pub fn start_new_conversation_scope(&mut self) -> Result<String, ScopeError> {
        let id = Uuid::new_v4().to_string();
        self.start_conversation_scope(id.as_str())?;
        Ok(id)
    }

    /// Invalidate, deactivate and dissociate the live conversation
    ///
    /// Writes made through the conversation land in the pending request bag,
    /// so that bag is replaced here as well when no request scope holds it.
    ///
    /// # Errors
    /// [`ScopeError::Nesting`] while the request scope is live,
    /// [`ScopeError::Correlation`] from dissociation.
    pub fn stop_conversation_scope(&mut self) -> Result<(), ScopeError> {
        if !self.conversation.is_active() {
            return Ok(());
        }
        self.ensure_inner_inactive(ScopeKind::Conversation, ScopeOperation::Stop)?;
        let result = self.conversation.stop(&self.request_bag, &self.session_bag);
        if !self.request.is_active() {
            self.request_bag = ScopeBag::new();
        }
        result
    }

    /// Live conversation view
    #[inline]
    #[must_use]
    pub fn conversation(&self) -> Option<&ConversationHandle> {
        self.conversation.current()
    }

    /// Evict abandoned conversations of the bound session
    pub fn evict_idle_conversations(&self) -> usize {
        self.conversation
            .evict_idle(&self.session_bag, self.config.conversation_max_idle())
    }

    // ------------------------------------------------------------------
    // Request
    // ------------------------------------------------------------------

    /// Associate and activate the request bag
    ///
    /// # Errors
    /// [`ScopeError::Ordering`] when the request scope is already started.
    pub fn start_request_scope(&mut self) -> Result<(), ScopeError> {
        start_bag_scope(self.request.as_mut(), &self.request_bag)?;
        debug!("request scope started");
        Ok(())
    }

    /// Invalidate, deactivate and dissociate the request, then allocate a
    /// fresh bag for the next request
    ///
    /// # Errors
    /// [`ScopeError::Correlation`] from dissociation (the bag is replaced
    /// regardless).
    pub fn stop_request_scope(&mut self) -> Result<(), ScopeError> {
        if !self.request.is_active() {
            return Ok(());
        }
        self.request.invalidate();
        self.request.deactivate()?;
        let result = self.request.dissociate(&self.request_bag);
        self.request_bag = ScopeBag::new();
        debug!("request scope stopped");
        result
    }

    /// Live request bag
    #[must_use]
    pub fn request(&self) -> Option<&ScopeBag> {
        self.request.is_active().then_some(&self.request_bag)
    }

    /// Bag the request scope is (or will be) bound to
    #[inline]
    #[must_use]
    pub fn request_bag(&self) -> &ScopeBag {
        &self.request_bag
    }

    // ------------------------------------------------------------------
    // Lookup
    // ------------------------------------------------------------------

    /// Resolve `key` through live scopes, innermost first
    #[must_use]
    pub fn lookup(&self, key: &str) -> Option<Attribute> {
        self.request()
            .and_then(|bag| bag.get(key))
            .or_else(|| self.conversation().and_then(|view| view.get(key)))
            .or_else(|| self.session().and_then(|bag| bag.get(key)))
            .or_else(|| {
                if self.application.is_active() {
                    self.application.lookup(key)
                } else {
                    None
                }
            })
    }

    /// Typed [`lookup`](Self::lookup)
    #[must_use]
    pub fn lookup_as<T: std::any::Any + Send + Sync>(&self, key: &str) -> Option<Arc<T>> {
        self.lookup(key)?.downcast::<T>().ok()
    }

    fn ensure_inner_inactive(
        &self,
        kind: ScopeKind,
        operation: ScopeOperation,
    ) -> Result<(), ScopeError> {
        let blocking = ScopeKind::START_ORDER
            .into_iter()
            .rev()
            .find(|inner| kind.encloses(*inner) && self.is_active(*inner));
        match blocking {
            Some(blocking) => Err(ScopeError::Nesting {
                kind,
                operation,
                blocking,
            }
            .raise()),
            None => Ok(()),
        }
    }
}

/// Associate then activate; undo the association if activation fails
fn start_bag_scope(
    context: &mut dyn ScopeContext<ScopeBag>,
    bag: &ScopeBag,
) -> Result<(), ScopeError> {
    context.associate(bag.clone())?;
    if let Err(err) = context.activate() {
        let _ = context.dissociate(bag);
        return Err(err);
    }
    Ok(())
}

impl fmt::Debug for ContextManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContextManager")
            .field("config", &self.config)
            .field("active", &self.active_scopes())
            .field("session_bag", &self.session_bag)
            .field("request_bag", &self.request_bag)
            .field("conversation", &self.conversation)
            .finish()
    }
}
