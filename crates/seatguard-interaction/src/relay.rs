//! HTTP client for the one-time-code relay.
//!
//! The relay watches the account's inbox, caches the most recent login
//! code and exposes it over HTTP behind a shared-secret query parameter.
//! This channel polls until a usable (non-expired) code appears, then
//! clears the relay's cache so the code can never be read twice.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

use seatguard_core::account::Credential;
use seatguard_core::error::{Result, SeatguardError};
use seatguard_core::otp::{OneTimeCode, OtpChannel};
use seatguard_core::retry::{RetryPolicy, poll_until_deadline};

/// Relay payload for both the fetch and the clear endpoints.
#[derive(Debug, Deserialize)]
struct RelayResponse {
    success: bool,
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    timestamp: Option<String>,
    #[serde(default)]
    #[allow(dead_code)]
    source: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// `OtpChannel` implementation over the relay's HTTP contract.
pub struct HttpOtpChannel {
    client: Client,
    url: String,
    secret: Credential,
    clear_retry: RetryPolicy,
}

impl HttpOtpChannel {
    pub fn new(url: impl Into<String>, secret: Credential) -> Self {
        Self {
            client: Client::new(),
            url: url.into(),
            secret,
            clear_retry: RetryPolicy::new(3, Duration::from_millis(500)),
        }
    }

    /// One poll against the relay.
    ///
    /// # Returns
    ///
    /// - `Ok(Some)`: a fresh code is available
    /// - `Ok(None)`: the relay answered properly but has no usable code yet
    /// - `Err(RelayProtocol)`: transport failure, non-200 status or a body
    ///   that is not the expected JSON, retryable inside the wait loop
    async fn fetch_code(&self) -> Result<Option<OneTimeCode>> {
        let response = self
            .client
            .get(&self.url)
            .query(&[("secret", self.secret.expose())])
            .send()
            .await
            .map_err(|err| SeatguardError::relay_protocol(format!("Relay fetch failed: {err}")))?;

        let status = response.status();
        let body = response.text().await.map_err(|err| {
            SeatguardError::relay_protocol(format!("Failed to read relay body: {err}"))
        })?;

        if !status.is_success() {
            return Err(SeatguardError::relay_protocol(format!(
                "Relay returned HTTP {status}"
            )));
        }

        let parsed = parse_relay_body(&body)?;
        if !parsed.success {
            if let Some(error) = &parsed.error {
                tracing::debug!("Relay has no code yet: {error}");
            }
            return Ok(None);
        }

        let code = parsed.code.clone().ok_or_else(|| {
            SeatguardError::relay_protocol("Relay reported success without a code")
        })?;
        let captured_at = parse_capture_timestamp(&parsed)?;

        let otp = OneTimeCode { code, captured_at };
        if otp.is_expired(Utc::now()) {
            tracing::debug!(
                "Relay code captured at {} is past its TTL, waiting for a fresh one",
                otp.captured_at
            );
            return Ok(None);
        }

        Ok(Some(otp))
    }

    /// Clears the relay's cached code so it cannot be read again.
    async fn invalidate(&self) -> Result<()> {
        let response = self
            .client
            .post(&self.url)
            .query(&[("secret", self.secret.expose()), ("action", "clear")])
            .send()
            .await
            .map_err(|err| SeatguardError::relay_protocol(format!("Relay clear failed: {err}")))?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(SeatguardError::relay_protocol(format!(
                "Relay clear returned HTTP {status}"
            )));
        }

        let parsed = parse_relay_body(&body)?;
        if !parsed.success {
            return Err(SeatguardError::relay_protocol(format!(
                "Relay refused to clear: {}",
                parsed.error.unwrap_or_else(|| "unknown".to_string())
            )));
        }
        Ok(())
    }
}

/// Non-JSON (typically an HTML error page) is a protocol error, not a
/// "no code yet" signal.
fn parse_relay_body(body: &str) -> Result<RelayResponse> {
    serde_json::from_str(body).map_err(|_| {
        let preview: String = body.chars().take(80).collect();
        SeatguardError::relay_protocol(format!("Relay returned non-JSON body: {preview:?}"))
    })
}

/// The capture timestamp bounds the code's usefulness; a relay that omits
/// it just produced the code, so "now" is the honest fallback.
fn parse_capture_timestamp(response: &RelayResponse) -> Result<DateTime<Utc>> {
    match &response.timestamp {
        None => Ok(Utc::now()),
        Some(raw) => raw
            .parse::<DateTime<Utc>>()
            .map(|ts| ts.with_timezone(&Utc))
            .map_err(|err| {
                SeatguardError::relay_protocol(format!("Unparseable relay timestamp {raw:?}: {err}"))
            }),
    }
}

#[async_trait]
impl OtpChannel for HttpOtpChannel {
    async fn wait_for_code(&self, max_wait: Duration, poll_interval: Duration) -> Result<String> {
        tracing::info!(
            "Waiting up to {}s for a one-time code (poll every {}s)",
            max_wait.as_secs(),
            poll_interval.as_secs()
        );

        let found = poll_until_deadline(max_wait, poll_interval, || {
            let channel = self;
            async move {
                match channel.fetch_code().await {
                    Ok(found) => found,
                    Err(err) => {
                        // Transient by taxonomy: log and keep polling until
                        // the window closes.
                        tracing::warn!("Relay poll failed: {err}");
                        None
                    }
                }
            }
        })
        .await;

        match found {
            Some(otp) => {
                if let Err(err) = self
                    .clear_retry
                    .run("relay invalidation", || self.invalidate())
                    .await
                {
                    // The code is still usable; the TTL bounds any reuse.
                    tracing::warn!("Could not invalidate one-time code on relay: {err}");
                }
                tracing::info!("One-time code received");
                Ok(otp.code)
            }
            None => Err(SeatguardError::TwoFactorTimeout {
                waited_secs: max_wait.as_secs(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    #[test]
    fn test_non_json_body_is_protocol_error() {
        let err = parse_relay_body("<html>502 Bad Gateway</html>").unwrap_err();
        assert!(err.is_retryable_relay());
    }

    #[test]
    fn test_missing_timestamp_falls_back_to_now() {
        let response = RelayResponse {
            success: true,
            code: Some("123456".to_string()),
            timestamp: None,
            source: None,
            error: None,
        };
        let captured = parse_capture_timestamp(&response).unwrap();
        assert!((Utc::now() - captured).num_seconds() < 5);
    }

    // ------------------------------------------------------------------
    // Loop behavior against a local relay stub
    // ------------------------------------------------------------------

    #[derive(Default)]
    struct StubRelay {
        /// (code, rfc3339 capture timestamp)
        code: Option<(String, String)>,
        gets: u32,
        clears: u32,
    }

    impl StubRelay {
        fn respond(&mut self, request: &str) -> String {
            if request.contains("action=clear") {
                self.clears += 1;
                self.code = None;
                return r#"{"success": true}"#.to_string();
            }
            self.gets += 1;
            match &self.code {
                Some((code, timestamp)) => format!(
                    r#"{{"success": true, "code": "{code}", "timestamp": "{timestamp}", "source": "cache"}}"#
                ),
                None => r#"{"success": false, "error": "No code found"}"#.to_string(),
            }
        }
    }

    async fn spawn_stub(state: Arc<Mutex<StubRelay>>) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            loop {
                let Ok((mut socket, _)) = listener.accept().await else {
                    break;
                };
                let state = state.clone();
                tokio::spawn(async move {
                    let mut buf = vec![0u8; 4096];
                    let n = socket.read(&mut buf).await.unwrap_or(0);
                    let request = String::from_utf8_lossy(&buf[..n]).to_string();
                    let body = state.lock().unwrap().respond(&request);
                    let response = format!(
                        "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                        body.len(),
                        body
                    );
                    let _ = socket.write_all(response.as_bytes()).await;
                });
            }
        });
        format!("http://{addr}")
    }

    fn fast_windows() -> (Duration, Duration) {
        (Duration::from_millis(400), Duration::from_millis(50))
    }

    #[tokio::test]
    async fn test_code_is_returned_and_invalidated() {
        let state = Arc::new(Mutex::new(StubRelay {
            code: Some(("482913".to_string(), Utc::now().to_rfc3339())),
            ..Default::default()
        }));
        let url = spawn_stub(state.clone()).await;
        let channel = HttpOtpChannel::new(url, Credential::new("s"));

        let (max_wait, poll) = fast_windows();
        let code = channel.wait_for_code(max_wait, poll).await.unwrap();
        assert_eq!(code, "482913");

        let stub = state.lock().unwrap();
        assert_eq!(stub.clears, 1, "code must be invalidated after the read");
        assert!(stub.code.is_none());
    }

    #[tokio::test]
    async fn test_code_read_once_is_not_returned_again() {
        let state = Arc::new(Mutex::new(StubRelay {
            code: Some(("482913".to_string(), Utc::now().to_rfc3339())),
            ..Default::default()
        }));
        let url = spawn_stub(state.clone()).await;
        let channel = HttpOtpChannel::new(url, Credential::new("s"));

        let (max_wait, poll) = fast_windows();
        channel.wait_for_code(max_wait, poll).await.unwrap();

        // The relay slot is now empty; a second wait must time out.
        let err = channel.wait_for_code(max_wait, poll).await.unwrap_err();
        assert!(matches!(err, SeatguardError::TwoFactorTimeout { .. }));
    }

    #[tokio::test]
    async fn test_empty_relay_times_out() {
        let state = Arc::new(Mutex::new(StubRelay::default()));
        let url = spawn_stub(state.clone()).await;
        let channel = HttpOtpChannel::new(url, Credential::new("s"));

        let (max_wait, poll) = fast_windows();
        let err = channel.wait_for_code(max_wait, poll).await.unwrap_err();
        assert!(matches!(
            err,
            SeatguardError::TwoFactorTimeout { waited_secs: 0 }
        ));
        // The loop kept polling for the whole window instead of giving up
        // on the first empty answer.
        assert!(state.lock().unwrap().gets >= 5);
    }

    #[tokio::test]
    async fn test_expired_code_is_ignored() {
        let stale = (Utc::now() - chrono::Duration::minutes(11)).to_rfc3339();
        let state = Arc::new(Mutex::new(StubRelay {
            code: Some(("482913".to_string(), stale)),
            ..Default::default()
        }));
        let url = spawn_stub(state.clone()).await;
        let channel = HttpOtpChannel::new(url, Credential::new("s"));

        let (max_wait, poll) = fast_windows();
        let err = channel.wait_for_code(max_wait, poll).await.unwrap_err();
        assert!(matches!(err, SeatguardError::TwoFactorTimeout { .. }));
        // Expired codes are never cleared; a fresh one may supersede them.
        assert_eq!(state.lock().unwrap().clears, 0);
    }
}
