//! Configuration for sandbox sessions.

use std::time::Duration;

/// Default limit on waiting for the guest context to come up.
pub const DEFAULT_CREATE_TIMEOUT: Duration = Duration::from_secs(10);

/// Options for creating one sandbox session.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Optional debug name; a generated one is used when absent.
    pub name: Option<String>,

    /// Policy relaxations appended to the default-deny baseline.
    ///
    /// Trusted host-application configuration in directive syntax; embedded
    /// escaping is handled by the document builder, not the caller.
    pub policy_extra: String,

    /// How long session creation may wait for the guest to initialize.
    pub create_timeout: Duration,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            name: None,
            policy_extra: String::new(),
            create_timeout: DEFAULT_CREATE_TIMEOUT,
        }
    }
}

impl SessionOptions {
    /// Create options with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the debug name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set the policy relaxation string.
    pub fn with_policy(mut self, extra: impl Into<String>) -> Self {
        self.policy_extra = extra.into();
        self
    }

    /// Set the creation timeout.
    pub fn with_create_timeout(mut self, timeout: Duration) -> Self {
        self.create_timeout = timeout;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = SessionOptions::default();
        assert!(options.name.is_none());
        assert!(options.policy_extra.is_empty());
        assert_eq!(options.create_timeout, DEFAULT_CREATE_TIMEOUT);
    }

    #[test]
    fn test_builder() {
        let options = SessionOptions::new()
            .with_name("worker")
            .with_policy("connect-src https://api.example.com")
            .with_create_timeout(Duration::from_secs(2));

        assert_eq!(options.name.as_deref(), Some("worker"));
        assert!(options.policy_extra.starts_with("connect-src"));
        assert_eq!(options.create_timeout, Duration::from_secs(2));
    }
}
