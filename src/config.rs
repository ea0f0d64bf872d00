//! Engine configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration for the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Idle session lifetime in milliseconds.
    pub session_lifetime_ms: u64,
    /// Prefix prepended to every generated callback URL.
    pub callback_prefix: String,
    /// Include fault details in error response bodies (development only).
    pub dev_diagnostics: bool,
    /// Maximum accepted upload size in bytes.
    pub upload_limit: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            session_lifetime_ms: 30 * 60 * 1000,
            callback_prefix: String::new(),
            dev_diagnostics: false,
            upload_limit: 1024 * 1024,
        }
    }
}

impl EngineConfig {
    /// Create a new default config.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the idle session lifetime (builder).
    pub fn with_session_lifetime(mut self, lifetime: Duration) -> Self {
        self.session_lifetime_ms = lifetime.as_millis() as u64;
        self
    }

    /// Set the callback URL prefix (builder).
    pub fn with_callback_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.callback_prefix = prefix.into();
        self
    }

    /// Enable diagnostic error bodies (builder).
    pub fn with_dev_diagnostics(mut self, enabled: bool) -> Self {
        self.dev_diagnostics = enabled;
        self
    }

    /// Set the upload size limit (builder).
    pub fn with_upload_limit(mut self, bytes: usize) -> Self {
        self.upload_limit = bytes;
        self
    }

    /// The idle session lifetime as a `Duration`.
    pub fn session_lifetime(&self) -> Duration {
        Duration::from_millis(self.session_lifetime_ms)
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = EngineConfig::new();
        assert_eq!(config.session_lifetime(), Duration::from_secs(30 * 60));
        assert_eq!(config.callback_prefix, "");
        assert!(!config.dev_diagnostics);
        assert_eq!(config.upload_limit, 1024 * 1024);
    }

    #[test]
    fn builder() {
        let config = EngineConfig::new()
            .with_session_lifetime(Duration::from_secs(60))
            .with_callback_prefix("/app")
            .with_dev_diagnostics(true)
            .with_upload_limit(4096);
        assert_eq!(config.session_lifetime_ms, 60_000);
        assert_eq!(config.callback_prefix, "/app");
        assert!(config.dev_diagnostics);
        assert_eq!(config.upload_limit, 4096);
    }

    #[test]
    fn deserializes_with_defaults_filled_in() {
        let config: EngineConfig =
            serde_json::from_str(r#"{ "callback_prefix": "/ui" }"#).unwrap();
        assert_eq!(config.callback_prefix, "/ui");
        assert_eq!(config.session_lifetime_ms, 30 * 60 * 1000);
    }

    #[test]
    fn serializes_round_trip() {
        let config = EngineConfig::new().with_upload_limit(123);
        let json = serde_json::to_string(&config).unwrap();
        let back: EngineConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.upload_limit, 123);
    }
}
