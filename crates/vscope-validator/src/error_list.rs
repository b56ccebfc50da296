//! Message list with a cached category grouping
//!
//! The grouping is computed on first read and dropped by every mutating
//! method, so it never reflects a stale list.

use crate::message::{Message, Severity};
use indexmap::IndexMap;
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use std::ops::Deref;

/// Ordered validation messages plus a lazily built category index
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ErrorList {
    messages: Vec<Message>,
    #[serde(skip)]
    grouped: OnceCell<IndexMap<String, Vec<Message>>>,
}

impl ErrorList {
    /// Empty list
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Messages grouped by category.
    ///
    /// Categories appear in order of first occurrence; messages keep their
    /// list order within each group.
    pub fn grouped(&self) -> &IndexMap<String, Vec<Message>> {
        self.grouped.get_or_init(|| {
            let mut groups: IndexMap<String, Vec<Message>> = IndexMap::new();
            for message in &self.messages {
                groups
                    .entry(message.category.clone())
                    .or_default()
                    .push(message.clone());
            }
            groups
        })
    }

    /// Messages filed under `category`; empty when there are none
    #[must_use]
    pub fn messages_for(&self, category: &str) -> &[Message] {
        self.grouped()
            .get(category)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Whether any message is filed under `category`
    #[must_use]
    pub fn has_category(&self, category: &str) -> bool {
        self.grouped().contains_key(category)
    }

    /// Categories in order of first occurrence
    pub fn categories(&self) -> impl Iterator<Item = &str> {
        self.grouped().keys().map(String::as_str)
    }

    /// Whether any message has [`Severity::Error`]
    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.messages.iter().any(|m| m.severity == Severity::Error)
    }

    /// Append a message
    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
        self.invalidate();
    }

    /// Remove the message at `index`
    ///
    /// # Panics
    /// If `index` is out of bounds.
    pub fn remove(&mut self, index: usize) -> Message {
        let removed = self.messages.remove(index);
        self.invalidate();
        removed
    }

    /// Keep only messages matching `keep`
    pub fn retain<F: FnMut(&Message) -> bool>(&mut self, keep: F) {
        self.messages.retain(keep);
        self.invalidate();
    }

    /// Remove every message
    pub fn clear(&mut self) {
        self.messages.clear();
        self.invalidate();
    }

    /// Underlying messages
    #[inline]
    #[must_use]
    pub fn as_slice(&self) -> &[Message] {
        &self.messages
    }

    /// Unwrap into the message vector
    #[must_use]
    pub fn into_vec(self) -> Vec<Message> {
        self.messages
    }

    fn invalidate(&mut self) {
        self.grouped.take();
    }
}

impl From<Vec<Message>> for ErrorList {
    fn from(messages: Vec<Message>) -> Self {
        Self {
            messages,
            grouped: OnceCell::new(),
        }
    }
}

impl PartialEq for ErrorList {
    fn eq(&self, other: &Self) -> bool {
        self.messages == other.messages
    }
}

impl Eq for ErrorList {}

impl Deref for ErrorList {
    type Target = [Message];

    fn deref(&self) -> &Self::Target {
        &self.messages
    }
}

impl Extend<Message> for ErrorList {
    fn extend<I: IntoIterator<Item = Message>>(&mut self, iter: I) {
        self.messages.extend(iter);
        self.invalidate();
    }
}

impl FromIterator<Message> for ErrorList {
    fn from_iter<I: IntoIterator<Item = Message>>(iter: I) -> Self {
        Self::from(iter.into_iter().collect::<Vec<_>>())
    }
}

impl IntoIterator for ErrorList {
    type Item = Message;
    type IntoIter = std::vec::IntoIter<Message>;

    fn into_iter(self) -> Self::IntoIter {
        self.messages.into_iter()
    }
}

impl<'a> IntoIterator for &'a ErrorList {
    type Item = &'a Message;
    type IntoIter = std::slice::Iter<'a, Message>;

    fn into_iter(self) -> Self::IntoIter {
        self.messages.iter()
    }
}
