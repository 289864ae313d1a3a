//! Account identity and credential handling.

use serde::{Deserialize, Serialize};
use std::fmt;

/// An opaque secret (portal password, relay shared secret).
///
/// The wrapper exists so secrets never leak through `Debug` output or log
/// lines. Code that genuinely needs the value calls [`Credential::expose`].
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Credential(String);

impl Credential {
    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    /// Returns the underlying secret value.
    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(***)")
    }
}

impl From<String> for Credential {
    fn from(secret: String) -> Self {
        Self(secret)
    }
}

/// A portal account to process during a run.
///
/// Immutable for the run's lifetime; supplied by configuration. The `name`
/// is the human-facing identifier used in notifications and as the session
/// file key, `username` is the portal login identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    pub name: String,
    pub username: String,
    pub password: Credential,
}

impl Account {
    pub fn new(
        name: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<Credential>,
    ) -> Self {
        Self {
            name: name.into(),
            username: username.into(),
            password: password.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credential_debug_is_redacted() {
        let account = Account::new("alice", "alice@example.com", "hunter2".to_string());
        let debug = format!("{account:?}");
        assert!(!debug.contains("hunter2"));
        assert!(debug.contains("Credential(***)"));
    }

    #[test]
    fn test_credential_expose() {
        let credential = Credential::new("s3cret");
        assert_eq!(credential.expose(), "s3cret");
        assert!(!credential.is_empty());
        assert!(Credential::new("").is_empty());
    }
}
