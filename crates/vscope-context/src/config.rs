//! Context manager configuration

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Configuration for a [`ContextManager`](crate::ContextManager)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextConfig {
    /// Hold an exclusive per-session lease for the duration of each request
    pub serialize_session_access: bool,
    /// Request parameter carrying the conversation identifier
    pub conversation_parameter: String,
    /// Idle time after which abandoned conversations may be evicted
    pub conversation_max_idle_secs: u64,
    /// Clear the application store at shutdown when the backend supports it
    pub clear_application_on_shutdown: bool,
}

impl ContextConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// With session serialization on or off
    #[inline]
    #[must_use]
    pub fn with_serialized_sessions(mut self, enabled: bool) -> Self {
        self.serialize_session_access = enabled;
        self
    }

    /// With conversation parameter name
    #[inline]
    #[must_use]
    pub fn with_conversation_parameter(mut self, name: impl Into<String>) -> Self {
        self.conversation_parameter = name.into();
        self
    }

    /// With conversation idle threshold
    #[inline]
    #[must_use]
    pub fn with_conversation_max_idle(mut self, idle: Duration) -> Self {
        self.conversation_max_idle_secs = idle.as_secs();
        self
    }

    /// With application clearing at shutdown on or off
    #[inline]
    #[must_use]
    pub fn with_application_clearing(mut self, enabled: bool) -> Self {
        self.clear_application_on_shutdown = enabled;
        self
    }

    /// Conversation idle threshold as a duration
    #[inline]
    #[must_use]
    pub fn conversation_max_idle(&self) -> Duration {
        Duration::from_secs(self.conversation_max_idle_secs)
    }

    /// Parse and validate TOML
    ///
    /// # Errors
    /// [`ConfigError::Parse`] on malformed input, [`ConfigError::Invalid`]
    /// when [`validate`](Self::validate) fails.
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(input)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a TOML file
    ///
    /// # Errors
    /// [`ConfigError::Io`] when the file cannot be read, otherwise as
    /// [`from_toml_str`](Self::from_toml_str).
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let input = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&input)
    }

    /// Reject unusable values
    ///
    /// # Errors
    /// [`ConfigError::Invalid`] for an empty conversation parameter or a
    /// zero idle threshold.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.conversation_parameter.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "conversation_parameter must not be empty".to_string(),
            ));
        }
        if self.conversation_max_idle_secs == 0 {
            return Err(ConfigError::Invalid(
                "conversation_max_idle_secs must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            serialize_session_access: true,
            conversation_parameter: "cid".to_string(),
            conversation_max_idle_secs: 30 * 60,
            clear_application_on_shutdown: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults() {
        let config = ContextConfig::new();
        assert!(config.serialize_session_access);
        assert_eq!(config.conversation_parameter, "cid");
        assert_eq!(config.conversation_max_idle(), Duration::from_secs(1800));
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config = ContextConfig::from_toml_str("conversation_parameter = \"conv\"").unwrap();
        assert_eq!(config.conversation_parameter, "conv");
        assert!(config.clear_application_on_shutdown);
    }

    #[test]
    fn rejects_empty_parameter() {
        let err = ContextConfig::from_toml_str("conversation_parameter = \" \"").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn rejects_malformed_toml() {
        let err = ContextConfig::from_toml_str("serialize_session_access = maybe").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "conversation_max_idle_secs = 60").unwrap();
        writeln!(file, "serialize_session_access = false").unwrap();

        let config = ContextConfig::load(file.path()).unwrap();
        assert_eq!(config.conversation_max_idle_secs, 60);
        assert!(!config.serialize_session_access);
    }

    #[test]
    fn load_missing_file() {
        let err = ContextConfig::load("/nonexistent/vscope.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn builder() {
        let config = ContextConfig::new()
            .with_serialized_sessions(false)
            .with_conversation_parameter("conversation")
            .with_conversation_max_idle(Duration::from_secs(5))
            .with_application_clearing(false);
        assert!(!config.serialize_session_access);
        assert_eq!(config.conversation_max_idle_secs, 5);
        assert!(config.validate().is_ok());
    }
}
