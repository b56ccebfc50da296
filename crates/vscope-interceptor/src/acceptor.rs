//! Interceptor acceptance
//!
//! An acceptor decides whether an interceptor takes part in handling the
//! current request. [`WithMarkerAcceptor`] accepts when the handler's class
//! or method carries at least one of the configured marker types.

use crate::marker::MarkerType;
use indexmap::IndexSet;
use tracing::{debug, trace};

/// Accepted marker types for a [`WithMarkerAcceptor`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AcceptsWithMarkers {
    markers: IndexSet<MarkerType>,
}

impl AcceptsWithMarkers {
    /// Empty configuration; accepts nothing
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Also accept marker `T`
    #[must_use]
    pub fn with_marker<T: ?Sized + 'static>(mut self) -> Self {
        self.markers.insert(MarkerType::of::<T>());
        self
    }

    /// Also accept `marker`
    #[must_use]
    pub fn with(mut self, marker: MarkerType) -> Self {
        self.markers.insert(marker);
        self
    }

    /// Accepted markers, in configuration order
    #[inline]
    #[must_use]
    pub fn markers(&self) -> &IndexSet<MarkerType> {
        &self.markers
    }
}

impl FromIterator<MarkerType> for AcceptsWithMarkers {
    fn from_iter<I: IntoIterator<Item = MarkerType>>(iter: I) -> Self {
        Self {
            markers: iter.into_iter().collect(),
        }
    }
}

/// Handler method selected for the current request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerMethod {
    name: String,
    markers: Vec<MarkerType>,
}

impl ControllerMethod {
    /// Method `name` carrying `markers`
    #[must_use]
    pub fn new(name: impl Into<String>, markers: Vec<MarkerType>) -> Self {
        Self {
            name: name.into(),
            markers,
        }
    }

    /// Method name
    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Method-level markers
    #[inline]
    #[must_use]
    pub fn markers(&self) -> &[MarkerType] {
        &self.markers
    }
}

/// Controller instance that owns the handler method
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerInstance {
    type_name: String,
    markers: Vec<MarkerType>,
}

impl ControllerInstance {
    /// Controller `type_name` carrying class-level `markers`
    #[must_use]
    pub fn new(type_name: impl Into<String>, markers: Vec<MarkerType>) -> Self {
        Self {
            type_name: type_name.into(),
            markers,
        }
    }

    /// Controller for the Rust type `T`
    #[must_use]
    pub fn of<T: ?Sized + 'static>(markers: Vec<MarkerType>) -> Self {
        Self::new(std::any::type_name::<T>(), markers)
    }

    /// Controller type name
    #[inline]
    #[must_use]
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Class-level markers
    #[inline]
    #[must_use]
    pub fn markers(&self) -> &[MarkerType] {
        &self.markers
    }
}

/// Decides whether an interceptor participates in a request
pub trait AcceptsValidator<C> {
    /// Load the acceptor's configuration
    fn initialize(&mut self, config: C);

    /// Whether the interceptor applies to `method` on `instance`
    fn validate(&self, method: &ControllerMethod, instance: &ControllerInstance) -> bool;
}

/// Accepts handlers marked with any configured marker type
#[derive(Debug, Clone, Default)]
pub struct WithMarkerAcceptor {
    allowed: IndexSet<MarkerType>,
}

impl WithMarkerAcceptor {
    /// Uninitialized acceptor; rejects every handler
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Acceptor initialized from `config`
    #[must_use]
    pub fn with_config(config: AcceptsWithMarkers) -> Self {
        let mut acceptor = Self::new();
        acceptor.initialize(config);
        acceptor
    }

    /// Currently accepted markers
    #[inline]
    #[must_use]
    pub fn allowed(&self) -> &IndexSet<MarkerType> {
        &self.allowed
    }

    /// True iff the allowed set intersects the union of method and class
    /// markers
    #[must_use]
    pub fn validate_markers(&self, method_markers: &[MarkerType], class_markers: &[MarkerType]) -> bool {
        let matched = class_markers
            .iter()
            .chain(method_markers)
            .find(|marker| self.allowed.contains(*marker));
        if let Some(marker) = matched {
            trace!(%marker, "marker accepted");
        }
        matched.is_some()
    }
}

impl AcceptsValidator<AcceptsWithMarkers> for WithMarkerAcceptor {
    fn initialize(&mut self, config: AcceptsWithMarkers) {
        debug!(markers = config.markers.len(), "marker acceptor initialized");
        self.allowed = config.markers;
    }

    fn validate(&self, method: &ControllerMethod, instance: &ControllerInstance) -> bool {
        let accepted = self.validate_markers(method.markers(), instance.markers());
        debug!(
            controller = instance.type_name(),
            method = method.name(),
            accepted,
            "acceptor decision"
        );
        accepted
    }
}
