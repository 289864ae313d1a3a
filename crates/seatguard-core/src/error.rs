//! Error types shared across the Seatguard workspace.

use thiserror::Error;

/// The shared error type for the whole Seatguard workspace.
///
/// Variants map one-to-one onto the failure taxonomy of the run: startup
/// configuration problems are fatal, authentication problems are fatal for
/// a single account, confirmation problems are fatal for a single
/// reservation, and relay protocol hiccups are retried inside the OTP wait
/// window.
#[derive(Error, Debug, Clone)]
pub enum SeatguardError {
    /// Missing or malformed required configuration. Fatal at startup.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Login verification failed after a full authentication attempt.
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// The code relay never produced a usable code within the wait window.
    #[error("No one-time code after {waited_secs}s")]
    TwoFactorTimeout { waited_secs: u64 },

    /// An authenticated navigation unexpectedly landed on a login page.
    #[error("Portal session expired")]
    SessionExpired,

    /// Extraction was attempted but the page yielded nothing usable.
    #[error("Harvest error: {0}")]
    Harvest(String),

    /// Confirm control missing, or post-click verification failed.
    #[error("Confirmation error: {0}")]
    Confirmation(String),

    /// Non-JSON or error-page response from the code relay. Retryable
    /// inside the OTP poll loop.
    #[error("Relay protocol error: {0}")]
    RelayProtocol(String),

    /// A browser command failed (navigation, element lookup, click, ...).
    #[error("Page error: {0}")]
    Page(String),

    /// IO error (session files, screenshots).
    #[error("IO error: {message}")]
    Io { message: String },

    /// Serialization/deserialization error.
    #[error("Serialization error: {format} - {message}")]
    Serialization { format: String, message: String },

    /// Internal error (should not happen in normal operation).
    #[error("Internal error: {0}")]
    Internal(String),
}

impl SeatguardError {
    /// Creates a Config error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Creates an Authentication error.
    pub fn authentication(message: impl Into<String>) -> Self {
        Self::Authentication(message.into())
    }

    /// Creates a Harvest error.
    pub fn harvest(message: impl Into<String>) -> Self {
        Self::Harvest(message.into())
    }

    /// Creates a Confirmation error.
    pub fn confirmation(message: impl Into<String>) -> Self {
        Self::Confirmation(message.into())
    }

    /// Creates a RelayProtocol error.
    pub fn relay_protocol(message: impl Into<String>) -> Self {
        Self::RelayProtocol(message.into())
    }

    /// Creates a Page error.
    pub fn page(message: impl Into<String>) -> Self {
        Self::Page(message.into())
    }

    /// Creates an Internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Check if this is a Config error.
    pub fn is_config(&self) -> bool {
        matches!(self, Self::Config(_))
    }

    /// Check if this is an expired-session signal that should force a
    /// re-authentication instead of failing the account outright.
    pub fn is_session_expired(&self) -> bool {
        matches!(self, Self::SessionExpired)
    }

    /// Check if this error is retryable inside the OTP wait loop.
    pub fn is_retryable_relay(&self) -> bool {
        matches!(self, Self::RelayProtocol(_))
    }
}

impl From<std::io::Error> for SeatguardError {
    fn from(err: std::io::Error) -> Self {
        Self::Io {
            message: format!("{} (kind: {:?})", err, err.kind()),
        }
    }
}

impl From<serde_json::Error> for SeatguardError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization {
            format: "JSON".to_string(),
            message: err.to_string(),
        }
    }
}

impl From<toml::de::Error> for SeatguardError {
    fn from(err: toml::de::Error) -> Self {
        Self::Serialization {
            format: "TOML".to_string(),
            message: err.to_string(),
        }
    }
}

/// A type alias for `Result<T, SeatguardError>`.
pub type Result<T> = std::result::Result<T, SeatguardError>;
