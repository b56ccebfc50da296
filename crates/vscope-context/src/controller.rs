//! Per-scope state machine
//!
//! [`ScopeContext`] is the capability a host container exposes for one scope
//! kind. [`ScopeController`] is the bundled implementation: a tagged state
//! (see [`ScopeState`]) plus the storage bound to it.
//!
//! ```text
//! Unassociated -associate-> Associated -activate-> Active -invalidate-> Invalidated
//!       ^                        |   ^                |                      |
//!       +------dissociate--------+   +---deactivate---+----------------------+
//! ```

use crate::bag::ScopeBag;
use crate::error::ScopeError;
use crate::state_machine::validate_transition;
use crate::types::{ScopeKind, ScopeOperation, ScopeState};
use std::fmt;
use tracing::{debug, warn};

/// Storage that can be bound to a controller
pub trait ScopeStorage: Clone + PartialEq + fmt::Debug + Send + 'static {
    /// Drop the contents owned by this scope instance
    fn discard(&self);
}

impl ScopeStorage for ScopeBag {
    fn discard(&self) {
        self.clear();
    }
}

/// Lifecycle capability for one scope kind
pub trait ScopeContext<S>: Send {
    /// Bind storage. Legal only while unassociated.
    ///
    /// # Errors
    /// [`ScopeError::Ordering`] when storage is already bound.
    fn associate(&mut self, storage: S) -> Result<(), ScopeError>;

    /// Make the bound storage live
    ///
    /// # Errors
    /// [`ScopeError::Ordering`] unless associated and inactive.
    fn activate(&mut self) -> Result<(), ScopeError>;

    /// Whether storage is live
    fn is_active(&self) -> bool;

    /// Mark contents for discard. No-op when inactive.
    fn invalidate(&mut self);

    /// End the live period
    ///
    /// # Errors
    /// [`ScopeError::Ordering`] when not active.
    fn deactivate(&mut self) -> Result<(), ScopeError>;

    /// Unbind storage equal to the bound storage
    ///
    /// # Errors
    /// [`ScopeError::Ordering`] unless associated and inactive,
    /// [`ScopeError::Correlation`] when `storage` differs from the bound one.
    fn dissociate(&mut self, storage: &S) -> Result<(), ScopeError>;
}

/// State machine wrapping the storage of one scope kind
#[derive(Debug)]
pub struct ScopeController<S> {
    kind: ScopeKind,
    state: ScopeState,
    storage: Option<S>,
}

impl<S: ScopeStorage> ScopeController<S> {
    /// Create an unassociated controller
    #[inline]
    #[must_use]
    pub fn new(kind: ScopeKind) -> Self {
        Self {
            kind,
            state: ScopeState::Unassociated,
            storage: None,
        }
    }

    /// Scope kind this controller manages
    #[inline]
    #[must_use]
    pub fn kind(&self) -> ScopeKind {
        self.kind
    }

    /// Current state
    #[inline]
    #[must_use]
    pub fn state(&self) -> ScopeState {
        self.state
    }

    /// Bound storage, visible only while live
    #[must_use]
    pub fn storage(&self) -> Option<&S> {
        if self.state.is_active() {
            self.storage.as_ref()
        } else {
            None
        }
    }

    fn advance(&mut self, operation: ScopeOperation) -> Result<ScopeState, ScopeError> {
        let next = validate_transition(self.kind, self.state, operation)?;
        debug!(scope = %self.kind, from = %self.state, to = %next, %operation, "scope transition");
        Ok(next)
    }
}

impl<S: ScopeStorage> ScopeContext<S> for ScopeController<S> {
    fn associate(&mut self, storage: S) -> Result<(), ScopeError> {
        self.state = self.advance(ScopeOperation::Associate)?;
        self.storage = Some(storage);
        Ok(())
    }

    fn activate(&mut self) -> Result<(), ScopeError> {
        self.state = self.advance(ScopeOperation::Activate)?;
        Ok(())
    }

    fn is_active(&self) -> bool {
        self.state.is_active()
    }

    fn invalidate(&mut self) {
        if !self.state.is_active() {
            return;
        }
        // Active and Invalidated both accept Invalidate
        if let Ok(next) = self.advance(ScopeOperation::Invalidate) {
            self.state = next;
        }
    }

    fn deactivate(&mut self) -> Result<(), ScopeError> {
        let next = self.advance(ScopeOperation::Deactivate)?;
        if self.state == ScopeState::Invalidated {
            if let Some(storage) = &self.storage {
                storage.discard();
            }
        }
        self.state = next;
        Ok(())
    }

    fn dissociate(&mut self, storage: &S) -> Result<(), ScopeError> {
        let next = self.advance(ScopeOperation::Dissociate)?;
        let matches = self.storage.as_ref() == Some(storage);
        // The binding is released either way so the next associate starts clean
        self.storage = None;
        self.state = next;

        if matches {
            Ok(())
        } else {
            warn!(scope = %self.kind, "dissociated storage does not match the associated storage");
            Err(ScopeError::Correlation { kind: self.kind })
        }
    }
}
