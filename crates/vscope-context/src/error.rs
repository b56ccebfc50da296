//! Error types for scope lifecycle management
//!
//! Two families:
//! - Ordering errors: an operation invoked outside its legal state. These
//!   are bugs in the surrounding request pipeline and are fatal.
//! - Correlation errors: dissociation with storage that does not equal the
//!   associated storage. Recoverable; other scopes are unaffected.

use crate::types::{ScopeKind, ScopeOperation, ScopeState};
use std::path::PathBuf;

/// Scope lifecycle error
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ScopeError {
    /// Controller operation outside its legal state
    #[error("cannot {operation} {kind} scope while {state}")]
    Ordering {
        /// Scope the operation targeted
        kind: ScopeKind,
        /// Rejected operation
        operation: ScopeOperation,
        /// State at the time of the call
        state: ScopeState,
    },

    /// Manager-level start/stop that breaks nesting order
    #[error("cannot {operation} {kind} scope while {blocking} scope is active")]
    Nesting {
        /// Scope the operation targeted
        kind: ScopeKind,
        /// Rejected operation
        operation: ScopeOperation,
        /// Active scope that must be stopped first
        blocking: ScopeKind,
    },

    /// Scope started without the enclosing scope it builds on
    #[error("{kind} scope requires an active {required} scope")]
    MissingScope {
        /// Scope being started
        kind: ScopeKind,
        /// Enclosing scope that is not active
        required: ScopeKind,
    },

    /// Dissociated storage does not equal the associated storage
    #[error("{kind} scope dissociated with storage that does not match the associated storage")]
    Correlation {
        /// Scope whose dissociation failed
        kind: ScopeKind,
    },
}

impl ScopeError {
    /// Ordering violations are programming errors in the pipeline
    #[inline]
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Ordering { .. } | Self::Nesting { .. } | Self::MissingScope { .. }
        )
    }

    /// Correlation mismatches can be reported and carried on from
    #[inline]
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        !self.is_fatal()
    }

    /// Scope the error concerns
    #[must_use]
    pub fn kind(&self) -> ScopeKind {
        match self {
            Self::Ordering { kind, .. }
            | Self::Nesting { kind, .. }
            | Self::MissingScope { kind, .. }
            | Self::Correlation { kind } => *kind,
        }
    }

    /// Raise a fatal error, panicking first under `strict-ordering`
    pub(crate) fn raise(self) -> Self {
        #[cfg(feature = "strict-ordering")]
        assert!(!self.is_fatal(), "scope ordering violation: {self}");

        self
    }
}

/// Configuration loading errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Could not read the configuration file
    #[error("failed to read {path}: {source}")]
    Io {
        /// File that was read
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// Malformed TOML
    #[error("invalid configuration: {0}")]
    Parse(#[from] toml::de::Error),

    /// Well-formed but unusable values
    #[error("invalid configuration value: {0}")]
    Invalid(String),
}
