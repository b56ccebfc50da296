//! Scope controller transition table

use crate::error::ScopeError;
use crate::types::{ScopeKind, ScopeOperation, ScopeState};

/// Validates a controller operation and returns the state it leads to.
///
/// Only the five controller operations appear in the table; manager-level
/// operations are never legal here.
pub fn validate_transition(
    kind: ScopeKind,
    from: ScopeState,
    operation: ScopeOperation,
) -> Result<ScopeState, ScopeError> {
    next_state(from, operation).ok_or_else(|| {
        ScopeError::Ordering {
            kind,
            operation,
            state: from,
        }
        .raise()
    })
}

/// Controller operations legal from `from`
#[must_use]
pub fn allowed_operations(from: ScopeState) -> Vec<ScopeOperation> {
    use ScopeOperation::*;
    match from {
        ScopeState::Unassociated => vec![Associate],
        ScopeState::Associated => vec![Activate, Dissociate],
        ScopeState::Active => vec![Invalidate, Deactivate],
        ScopeState::Invalidated => vec![Invalidate, Deactivate],
    }
}

fn next_state(from: ScopeState, operation: ScopeOperation) -> Option<ScopeState> {
    use ScopeOperation::*;
    use ScopeState::*;
    match (from, operation) {
        (Unassociated, Associate) => Some(Associated),
        (Associated, Activate) => Some(Active),
        (Active | Invalidated, Invalidate) => Some(Invalidated),
        (Active | Invalidated, Deactivate) => Some(Associated),
        (Associated, Dissociate) => Some(Unassociated),
        _ => None,
    }
}
