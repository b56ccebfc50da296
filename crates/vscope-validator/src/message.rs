//! Validation messages

use serde::{Deserialize, Serialize};
use std::fmt;

/// How serious a message is
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Input rejected
    #[default]
    Error,
    /// Accepted with reservations
    Warning,
    /// Informational only
    Info,
    /// Operation succeeded
    Success,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Error => "error",
            Self::Warning => "warning",
            Self::Info => "info",
            Self::Success => "success",
        };
        f.write_str(s)
    }
}

/// One validation message, filed under a category (usually a field path)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Message {
    /// Grouping key
    pub category: String,
    /// Human-readable text
    pub text: String,
    /// Severity
    #[serde(default)]
    pub severity: Severity,
}

impl Message {
    /// Message with explicit severity
    #[must_use]
    pub fn new(category: impl Into<String>, text: impl Into<String>, severity: Severity) -> Self {
        Self {
            category: category.into(),
            text: text.into(),
            severity,
        }
    }

    /// [`Severity::Error`] message
    #[must_use]
    pub fn error(category: impl Into<String>, text: impl Into<String>) -> Self {
        Self::new(category, text, Severity::Error)
    }

    /// [`Severity::Warning`] message
    #[must_use]
    pub fn warning(category: impl Into<String>, text: impl Into<String>) -> Self {
        Self::new(category, text, Severity::Warning)
    }

    /// [`Severity::Info`] message
    #[must_use]
    pub fn info(category: impl Into<String>, text: impl Into<String>) -> Self {
        Self::new(category, text, Severity::Info)
    }

    /// [`Severity::Success`] message
    #[must_use]
    pub fn success(category: impl Into<String>, text: impl Into<String>) -> Self {
        Self::new(category, text, Severity::Success)
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.severity, self.category, self.text)
    }
}
