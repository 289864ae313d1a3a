//! One-time code model and retrieval contract.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::time::Duration as StdDuration;

use crate::error::Result;

/// Codes older than this are useless to the portal; the relay reports the
/// capture timestamp so the channel can discard them without submitting.
pub const OTP_TTL_MINUTES: i64 = 10;

/// A one-time login code as reported by the relay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OneTimeCode {
    pub code: String,
    pub captured_at: DateTime<Utc>,
}

impl OneTimeCode {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now - self.captured_at > Duration::minutes(OTP_TTL_MINUTES)
    }
}

/// Out-of-band channel that produces the one-time login code.
///
/// Implementations poll the external relay until a non-expired code shows
/// up or the wall-clock deadline passes, and invalidate the code after a
/// successful read so it can never be returned twice.
///
/// # Returns
///
/// - `Ok(String)`: a fresh, single-use code
/// - `Err(TwoFactorTimeout)`: nothing usable within `max_wait`
#[async_trait]
pub trait OtpChannel: Send + Sync {
    async fn wait_for_code(
        &self,
        max_wait: StdDuration,
        poll_interval: StdDuration,
    ) -> Result<String>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expiry_window() {
        let now = Utc::now();
        let fresh = OneTimeCode {
            code: "123456".to_string(),
            captured_at: now - Duration::minutes(9),
        };
        let expired = OneTimeCode {
            code: "123456".to_string(),
            captured_at: now - Duration::minutes(11),
        };
        assert!(!fresh.is_expired(now));
        assert!(expired.is_expired(now));
    }
}
