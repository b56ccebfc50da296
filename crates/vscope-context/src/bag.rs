//! Scope bags: the key-value storage behind one scope instance
//!
//! A [`ScopeBag`] is a cheap, cloneable handle. Clones share the same
//! entries, so a bag handed to a controller and the handle kept by the
//! [`ContextManager`](crate::ContextManager) observe the same writes.
//! Entries live in a `DashMap`, which makes a bag safe to share between
//! concurrent requests (application and session scopes).

use crate::application::SharedStore;
use dashmap::DashMap;
use parking_lot::lock_api::ArcMutexGuard;
use parking_lot::{Mutex, RawMutex};
use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// Opaque attribute value
pub type Attribute = Arc<dyn Any + Send + Sync>;

/// Exclusive lease on a bag, see [`ScopeBag::exclusive`]
pub type BagLease = ArcMutexGuard<RawMutex, ()>;

/// Mutable string-keyed storage for one scope instance
#[derive(Clone, Default)]
pub struct ScopeBag {
    entries: Arc<DashMap<String, Attribute>>,
    gate: Arc<Mutex<()>>,
}

impl ScopeBag {
    /// Create an empty bag
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Raw attribute for `key`
    #[must_use]
    pub fn get(&self, key: &str) -> Option<Attribute> {
        self.entries.get(key).map(|entry| Arc::clone(entry.value()))
    }

    /// Typed attribute for `key`, `None` if absent or of another type
    #[must_use]
    pub fn get_as<T: Any + Send + Sync>(&self, key: &str) -> Option<Arc<T>> {
        self.get(key)?.downcast::<T>().ok()
    }

    /// Store a value, returning the previous attribute
    pub fn put<T: Any + Send + Sync>(&self, key: impl Into<String>, value: T) -> Option<Attribute> {
        self.put_attribute(key, Arc::new(value))
    }

    /// Store an already shared attribute
    pub fn put_attribute(&self, key: impl Into<String>, value: Attribute) -> Option<Attribute> {
        self.entries.insert(key.into(), value)
    }

    /// Typed attribute for `key`, inserting `init()` when absent.
    ///
    /// Returns `None` when `key` holds a value of another type.
    pub fn get_or_insert_with<T, F>(&self, key: &str, init: F) -> Option<Arc<T>>
    where
        T: Any + Send + Sync,
        F: FnOnce() -> T,
    {
        let entry = self
            .entries
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(init()));
        Arc::clone(entry.value()).downcast::<T>().ok()
    }

    /// Remove `key`, returning its attribute
    pub fn remove(&self, key: &str) -> Option<Attribute> {
        self.entries.remove(key).map(|(_, value)| value)
    }

    /// Whether `key` is present
    #[inline]
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Number of entries
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the bag has no entries
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Snapshot of the keys, sorted
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.entries.iter().map(|e| e.key().clone()).collect();
        keys.sort();
        keys
    }

    /// Snapshot of the keys starting with `prefix`
    #[must_use]
    pub fn keys_with_prefix(&self, prefix: &str) -> Vec<String> {
        self.entries
            .iter()
            .filter(|e| e.key().starts_with(prefix))
            .map(|e| e.key().clone())
            .collect()
    }

    /// Drop every entry
    pub fn clear(&self) {
        self.entries.clear();
    }

    /// Whether both handles point at the same storage
    #[inline]
    #[must_use]
    pub fn same_bag(&self, other: &ScopeBag) -> bool {
        Arc::ptr_eq(&self.entries, &other.entries)
    }

    /// Acquire the bag's exclusive lease.
    ///
    /// Blocks while another holder exists. Entries stay readable and
    /// writable through any handle; the lease only serializes holders.
    #[must_use]
    pub fn exclusive(&self) -> BagLease {
        self.gate.lock_arc()
    }

    /// Try to acquire the exclusive lease without blocking
    #[must_use]
    pub fn try_exclusive(&self) -> Option<BagLease> {
        self.gate.try_lock_arc()
    }
}

/// Value equality: same storage, or the same keys bound to the same
/// attribute allocations.
impl PartialEq for ScopeBag {
    fn eq(&self, other: &Self) -> bool {
        if self.same_bag(other) {
            return true;
        }
        self.entries.len() == other.entries.len()
            && self.entries.iter().all(|entry| {
                other
                    .entries
                    .get(entry.key())
                    .is_some_and(|theirs| Arc::ptr_eq(entry.value(), theirs.value()))
            })
    }
}

impl fmt::Debug for ScopeBag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScopeBag").field("keys", &self.keys()).finish()
    }
}

impl SharedStore for ScopeBag {
    fn clear(&self) {
        ScopeBag::clear(self);
    }
}
