//! Scope identities, controller states and lifecycle operations

use serde::{Deserialize, Serialize};
use std::fmt;

/// The four nested storage contexts, outermost first
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScopeKind {
    /// Process-wide, created once and outlives every request
    Application,
    /// One user session
    Session,
    /// One or more requests correlated by a conversation identifier
    Conversation,
    /// Exactly one request
    Request,
}

impl ScopeKind {
    /// All kinds in start order (outer to inner)
    pub const START_ORDER: [ScopeKind; 4] = [
        ScopeKind::Application,
        ScopeKind::Session,
        ScopeKind::Conversation,
        ScopeKind::Request,
    ];

    /// Nesting depth, 0 for the application scope
    #[inline]
    #[must_use]
    pub fn depth(self) -> u8 {
        match self {
            ScopeKind::Application => 0,
            ScopeKind::Session => 1,
            ScopeKind::Conversation => 2,
            ScopeKind::Request => 3,
        }
    }

    /// Whether `self` encloses `other`
    #[inline]
    #[must_use]
    pub fn encloses(self, other: ScopeKind) -> bool {
        self.depth() < other.depth()
    }

    /// Lowercase name
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ScopeKind::Application => "application",
            ScopeKind::Session => "session",
            ScopeKind::Conversation => "conversation",
            ScopeKind::Request => "request",
        }
    }
}

impl fmt::Display for ScopeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Controller state
///
/// `Invalidated` is still active: lookups keep working until the scope is
/// deactivated, at which point the storage contents are discarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ScopeState {
    /// No storage bound
    #[default]
    Unassociated,
    /// Storage bound but not live
    Associated,
    /// Storage live for attribute lookup
    Active,
    /// Live, contents marked for discard
    Invalidated,
}

impl ScopeState {
    /// Whether storage is live in this state
    #[inline]
    #[must_use]
    pub fn is_active(self) -> bool {
        matches!(self, ScopeState::Active | ScopeState::Invalidated)
    }
}

impl fmt::Display for ScopeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ScopeState::Unassociated => "unassociated",
            ScopeState::Associated => "associated",
            ScopeState::Active => "active",
            ScopeState::Invalidated => "invalidated",
        };
        f.write_str(s)
    }
}

/// Lifecycle operations, both controller-level and manager-level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScopeOperation {
    /// Bind storage
    Associate,
    /// Make storage live
    Activate,
    /// Mark contents for discard
    Invalidate,
    /// End the live period
    Deactivate,
    /// Unbind storage
    Dissociate,
    /// Manager-level start (associate + activate)
    Start,
    /// Manager-level stop (invalidate + deactivate + dissociate)
    Stop,
    /// Manager-level release (deactivate + dissociate, no invalidation)
    Release,
    /// Replace the storage a manager will associate next
    Bind,
}

impl fmt::Display for ScopeOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ScopeOperation::Associate => "associate",
            ScopeOperation::Activate => "activate",
            ScopeOperation::Invalidate => "invalidate",
            ScopeOperation::Deactivate => "deactivate",
            ScopeOperation::Dissociate => "dissociate",
            ScopeOperation::Start => "start",
            ScopeOperation::Stop => "stop",
            ScopeOperation::Release => "release",
            ScopeOperation::Bind => "bind",
        };
        f.write_str(s)
    }
}
