//! Configuration loading.
//!
//! Reads the non-secret `config.toml` and the credential-bearing
//! `secret.json`, merges them into a validated [`RunConfig`]. Every
//! failure here is a [`SeatguardError::Config`]: configuration problems
//! abort startup, they never surface mid-run.

use std::fs;
use std::path::PathBuf;

use seatguard_core::account::{Account, Credential};
use seatguard_core::config::{
    BrowserConfig, PortalConfigFile, RelayConfig, RunConfig, SecretConfig,
};
use seatguard_core::error::{Result, SeatguardError};

use crate::paths::SeatguardPaths;

/// Loads and validates the run configuration from disk.
///
/// Read-only: the service never writes or repairs configuration files.
pub struct ConfigService {
    config_path: PathBuf,
    secret_path: PathBuf,
}

impl ConfigService {
    /// Creates a service reading from the default locations
    /// (`~/.config/seatguard/config.toml` and `secret.json`).
    pub fn new() -> Result<Self> {
        let config_path = SeatguardPaths::config_file()
            .map_err(|e| SeatguardError::config(format!("Failed to resolve config path: {e}")))?;
        let secret_path = SeatguardPaths::secret_file()
            .map_err(|e| SeatguardError::config(format!("Failed to resolve secret path: {e}")))?;
        Ok(Self {
            config_path,
            secret_path,
        })
    }

    /// Creates a service reading from explicit paths (for testing).
    pub fn with_paths(config_path: PathBuf, secret_path: PathBuf) -> Self {
        Self {
            config_path,
            secret_path,
        }
    }

    /// Loads both files, merges credentials into accounts and validates.
    pub fn load(&self) -> Result<RunConfig> {
        let portal = self.load_portal_config()?;
        let secrets = self.load_secrets()?;

        let mut accounts = Vec::with_capacity(portal.accounts.len());
        for entry in &portal.accounts {
            let password = secrets.passwords.get(&entry.name).ok_or_else(|| {
                SeatguardError::config(format!(
                    "secret.json has no password for account '{}'",
                    entry.name
                ))
            })?;
            accounts.push(Account::new(
                entry.name.clone(),
                entry.username.clone(),
                password.clone(),
            ));
        }

        let screenshots_dir = if portal.screenshot_on_error {
            Some(SeatguardPaths::screenshots_dir().map_err(|e| {
                SeatguardError::config(format!("Failed to resolve screenshots dir: {e}"))
            })?)
        } else {
            None
        };

        let config = RunConfig {
            relay: RelayConfig {
                url: portal.relay_url,
                secret: Credential::new(secrets.relay_secret),
                poll_interval_secs: portal.poll_interval_secs,
                timeout_secs: portal.timeout_secs,
            },
            browser: BrowserConfig {
                webdriver_url: portal.webdriver_url,
                headless: portal.headless,
                screenshot_on_error: portal.screenshot_on_error,
                screenshots_dir,
            },
            accounts,
        };

        config.validate()?;
        Ok(config)
    }

    fn load_portal_config(&self) -> Result<PortalConfigFile> {
        if !self.config_path.exists() {
            return Err(SeatguardError::config(format!(
                "Configuration file not found at: {}",
                self.config_path.display()
            )));
        }
        let content = fs::read_to_string(&self.config_path)
            .map_err(|e| SeatguardError::config(format!("Failed to read config.toml: {e}")))?;
        toml::from_str(&content)
            .map_err(|e| SeatguardError::config(format!("Invalid config.toml: {e}")))
    }

    fn load_secrets(&self) -> Result<SecretConfig> {
        if !self.secret_path.exists() {
            return Err(SeatguardError::config(format!(
                "Secret file not found at: {}",
                self.secret_path.display()
            )));
        }
        let content = fs::read_to_string(&self.secret_path)
            .map_err(|e| SeatguardError::config(format!("Failed to read secret.json: {e}")))?;
        serde_json::from_str(&content)
            .map_err(|e| SeatguardError::config(format!("Invalid secret.json: {e}")))
    }
}
