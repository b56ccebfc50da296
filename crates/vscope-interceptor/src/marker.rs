//! Marker types
//!
//! A marker is a zero-sized type attached to a controller or one of its
//! methods. Markers are compared by [`TypeId`]; the type name is kept only
//! for display and logging.

use std::any::{type_name, TypeId};
use std::fmt;
use std::hash::{Hash, Hasher};

/// Runtime identity of a marker type
#[derive(Clone, Copy)]
pub struct MarkerType {
    id: TypeId,
    name: &'static str,
}

impl MarkerType {
    /// Identity of `T`
    #[inline]
    #[must_use]
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: type_name::<T>(),
        }
    }

    /// Type identifier
    #[inline]
    #[must_use]
    pub fn id(&self) -> TypeId {
        self.id
    }

    /// Fully qualified type name
    #[inline]
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Type name without its module path
    #[must_use]
    pub fn short_name(&self) -> &'static str {
        self.name.rsplit("::").next().unwrap_or(self.name)
    }

    /// Whether this is the marker `T`
    #[inline]
    #[must_use]
    pub fn is<T: ?Sized + 'static>(&self) -> bool {
        self.id == TypeId::of::<T>()
    }
}

impl PartialEq for MarkerType {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for MarkerType {}

impl Hash for MarkerType {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for MarkerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MarkerType({})", self.name)
    }
}

impl fmt::Display for MarkerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{}", self.short_name())
    }
}

/// Marker identities for a list of types
///
/// ```rust
/// use vscope_interceptor::{markers, MarkerType};
///
/// struct Audited;
/// struct Public;
///
/// let set = markers![Audited, Public];
/// assert_eq!(set, vec![MarkerType::of::<Audited>(), MarkerType::of::<Public>()]);
/// ```
#[macro_export]
macro_rules! markers {
    ($($marker:ty),* $(,)?) => {
        vec![$($crate::MarkerType::of::<$marker>()),*]
    };
}
