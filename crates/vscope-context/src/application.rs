//! Application scope
//!
//! The application scope is live for the whole process. Its only lifecycle
//! event is shutdown, where a store that supports shared clearing is
//! emptied.

use crate::bag::{Attribute, ScopeBag};

/// Storage that can be emptied in place, shared by every holder
pub trait SharedStore: Send + Sync {
    /// Drop every entry
    fn clear(&self);
}

/// Application-wide context supplied by the host
pub trait ApplicationContext: Send + Sync {
    /// Whether the context is live
    fn is_active(&self) -> bool;

    /// Store supporting shared clearing, if the backend has one
    fn shared_store(&self) -> Option<&dyn SharedStore>;

    /// Application-scoped attribute for `key`
    fn lookup(&self, key: &str) -> Option<Attribute>;
}

/// Application scope backed by one process-wide [`ScopeBag`]
///
/// Clones share the bag, so one instance can be handed to every request
/// worker.
#[derive(Debug, Clone, Default)]
pub struct ApplicationScope {
    bag: ScopeBag,
}

impl ApplicationScope {
    /// Create with an empty bag
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create around an existing bag
    #[inline]
    #[must_use]
    pub fn with_bag(bag: ScopeBag) -> Self {
        Self { bag }
    }

    /// The process-wide bag
    #[inline]
    #[must_use]
    pub fn bag(&self) -> &ScopeBag {
        &self.bag
    }
}

impl ApplicationContext for ApplicationScope {
    fn is_active(&self) -> bool {
        true
    }

    fn shared_store(&self) -> Option<&dyn SharedStore> {
        Some(&self.bag)
    }

    fn lookup(&self, key: &str) -> Option<Attribute> {
        self.bag.get(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn always_active() {
        assert!(ApplicationScope::new().is_active());
    }

    #[test]
    fn shared_store_clears_all_clones() {
        let app = ApplicationScope::new();
        let other = app.clone();
        app.bag().put("config", 1u8);

        other.shared_store().unwrap().clear();
        assert!(app.bag().is_empty());
    }
}
