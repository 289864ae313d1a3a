//! Run configuration model.
//!
//! Non-secret settings come from `config.toml`, credentials from
//! `secret.json`; the infrastructure layer merges both into a validated
//! [`RunConfig`]. Anything missing or malformed at that point is a fatal
//! startup error, never a per-run error.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use crate::account::{Account, Credential};
use crate::error::{Result, SeatguardError};

/// One-time-code relay settings.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub url: String,
    pub secret: Credential,
    pub poll_interval_secs: u64,
    pub timeout_secs: u64,
}

impl RelayConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Browser/WebDriver settings.
#[derive(Debug, Clone)]
pub struct BrowserConfig {
    pub webdriver_url: String,
    pub headless: bool,
    pub screenshot_on_error: bool,
    /// Where diagnostic screenshots land; `None` disables capture even
    /// when `screenshot_on_error` is set.
    pub screenshots_dir: Option<PathBuf>,
}

/// Fully validated configuration for one run.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub relay: RelayConfig,
    pub browser: BrowserConfig,
    pub accounts: Vec<Account>,
}

impl RunConfig {
    /// Checks the invariants that make a run possible at all.
    pub fn validate(&self) -> Result<()> {
        if self.relay.url.trim().is_empty() {
            return Err(SeatguardError::config("relay url is empty"));
        }
        if self.relay.secret.is_empty() {
            return Err(SeatguardError::config("relay secret is empty"));
        }
        if self.browser.webdriver_url.trim().is_empty() {
            return Err(SeatguardError::config("webdriver url is empty"));
        }
        if self.accounts.is_empty() {
            return Err(SeatguardError::config("no accounts configured"));
        }
        for account in &self.accounts {
            if account.name.trim().is_empty() {
                return Err(SeatguardError::config("account with empty name"));
            }
            if account.username.trim().is_empty() {
                return Err(SeatguardError::config(format!(
                    "account '{}' has no username",
                    account.name
                )));
            }
            if account.password.is_empty() {
                return Err(SeatguardError::config(format!(
                    "account '{}' has no credential",
                    account.name
                )));
            }
        }
        Ok(())
    }
}

// ============================================================================
// On-disk shapes
// ============================================================================

fn default_poll_interval_secs() -> u64 {
    5
}

fn default_timeout_secs() -> u64 {
    120
}

fn default_webdriver_url() -> String {
    "http://localhost:9515".to_string()
}

fn default_headless() -> bool {
    true
}

/// `config.toml` as written on disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortalConfigFile {
    pub relay_url: String,
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_webdriver_url")]
    pub webdriver_url: String,
    #[serde(default = "default_headless")]
    pub headless: bool,
    #[serde(default)]
    pub screenshot_on_error: bool,
    #[serde(default, rename = "account")]
    pub accounts: Vec<AccountEntry>,
}

/// One `[[account]]` table in `config.toml`. The password lives in
/// `secret.json`, keyed by `name`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountEntry {
    pub name: String,
    pub username: String,
}

/// `secret.json` as written on disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecretConfig {
    pub relay_secret: String,
    /// Account name to portal password.
    #[serde(default)]
    pub passwords: HashMap<String, String>,
}
