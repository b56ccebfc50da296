//! Request-lifetime scope guard
//!
//! [`ContextManager::enter`] starts the scopes a request needs and hands
//! back a [`RequestGuard`]. Teardown runs when the guard is dropped, so
//! scopes are stopped on every exit path: normal return, `?` propagation and
//! panic unwinding alike.

use crate::bag::BagLease;
use crate::error::ScopeError;
use crate::manager::ContextManager;
use std::ops::Deref;
use tracing::{error, warn};

/// Scopes one request needs
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestPlan {
    /// Start the session scope
    pub session: bool,
    /// Start the conversation scope under this identifier
    pub conversation_id: Option<String>,
}

impl RequestPlan {
    /// Request scope only
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Also start the session scope
    #[inline]
    #[must_use]
    pub fn with_session(mut self) -> Self {
        self.session = true;
        self
    }

    /// Also start the conversation `id` (implies a session)
    #[inline]
    #[must_use]
    pub fn with_conversation(mut self, id: impl Into<String>) -> Self {
        self.session = true;
        self.conversation_id = Some(id.into());
        self
    }

    /// Plan from request parameters: a non-empty `conversation_parameter`
    /// value starts that conversation.
    #[must_use]
    pub fn from_parameters<'a, I>(parameters: I, conversation_parameter: &str) -> Self
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let cid = parameters
            .into_iter()
            .find(|(name, value)| *name == conversation_parameter && !value.is_empty())
            .map(|(_, value)| value);
        match cid {
            Some(id) => Self::new().with_conversation(id),
            None => Self::new(),
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct Started {
    session: bool,
    conversation: bool,
    request: bool,
}

/// Live scopes of one request; stops them when dropped
pub struct RequestGuard<'a> {
    manager: &'a mut ContextManager,
    started: Started,
    invalidate_session: bool,
    completed: bool,
    // Released after teardown: fields drop after `Drop::drop` returns
    _lease: Option<BagLease>,
}

impl ContextManager {
    /// Start the scopes in `plan`, outer to inner, and guard them.
    ///
    /// With `serialize_session_access`, a plan that includes the session
    /// blocks until no other guard holds the session bag's lease.
    ///
    /// # Errors
    /// The first start failure. Scopes started before it are stopped before
    /// the error is returned.
    pub fn enter(&mut self, plan: RequestPlan) -> Result<RequestGuard<'_>, ScopeError> {
        let lease = (plan.session && self.config().serialize_session_access)
            .then(|| self.session_bag().exclusive());
        let mut guard = RequestGuard {
            manager: self,
            started: Started::default(),
            invalidate_session: false,
            completed: false,
            _lease: lease,
        };

        if plan.session {
            guard.manager.start_session_scope()?;
            guard.started.session = true;
        }
        if let Some(id) = plan.conversation_id {
            guard.manager.start_conversation_scope(id)?;
            guard.started.conversation = true;
        }
        guard.manager.start_request_scope()?;
        guard.started.request = true;

        Ok(guard)
    }
}

impl RequestGuard<'_> {
    /// Stop the session scope at teardown instead of releasing it
    pub fn invalidate_session(&mut self) {
        self.invalidate_session = true;
    }

    /// Whether the session will be invalidated at teardown
    #[inline]
    #[must_use]
    pub fn session_invalidated(&self) -> bool {
        self.invalidate_session
    }

    /// Tear down now and report the first error
    ///
    /// # Errors
    /// First error raised by a stop; later stops still run.
    pub fn finish(mut self) -> Result<(), ScopeError> {
        self.teardown()
    }

    fn teardown(&mut self) -> Result<(), ScopeError> {
        if self.completed {
            return Ok(());
        }
        self.completed = true;

        let mut first_error = None;
        let mut record = |result: Result<(), ScopeError>| {
            if let Err(err) = result {
                if err.is_fatal() {
                    error!(scope = %err.kind(), error = %err, "scope teardown failed");
                } else {
                    warn!(scope = %err.kind(), error = %err, "scope teardown reported a mismatch");
                }
                first_error.get_or_insert(err);
            }
        };

        if self.started.request {
            record(self.manager.stop_request_scope());
        }
        if self.started.conversation {
            record(self.manager.stop_conversation_scope());
        }
        if self.started.session {
            record(if self.invalidate_session {
                self.manager.stop_session_scope()
            } else {
                self.manager.release_session_scope()
            });
        }

        first_error.map_or(Ok(()), Err)
    }
}

impl Deref for RequestGuard<'_> {
    type Target = ContextManager;

    fn deref(&self) -> &Self::Target {
        self.manager
    }
}

impl Drop for RequestGuard<'_> {
    fn drop(&mut self) {
        // Errors were logged by teardown
        let _ = self.teardown();
    }
}
