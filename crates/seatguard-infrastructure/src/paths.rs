//! Unified path management for seatguard files.
//!
//! Everything lives under the platform config directory:
//!
//! ```text
//! ~/.config/seatguard/
//! ├── config.toml         # non-secret run configuration
//! ├── secret.json         # relay secret + account passwords (0600)
//! ├── sessions/           # one JSON session file per account
//! └── screenshots/        # diagnostic screenshots on error
//! ```

use std::path::PathBuf;

/// Errors that can occur during path resolution.
#[derive(Debug)]
pub enum PathError {
    /// Home directory could not be determined.
    HomeDirNotFound,
}

impl std::fmt::Display for PathError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PathError::HomeDirNotFound => write!(f, "Cannot find home directory"),
        }
    }
}

impl std::error::Error for PathError {}

/// Unified path management for seatguard.
pub struct SeatguardPaths;

impl SeatguardPaths {
    /// Returns the seatguard configuration directory
    /// (e.g. `~/.config/seatguard/`).
    pub fn config_dir() -> Result<PathBuf, PathError> {
        dirs::config_dir()
            .map(|dir| dir.join("seatguard"))
            .ok_or(PathError::HomeDirNotFound)
    }

    /// Returns the path to the main configuration file.
    pub fn config_file() -> Result<PathBuf, PathError> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    /// Returns the path to the secrets file.
    ///
    /// # Security Note
    ///
    /// Ensure this file has appropriate permissions (e.g., 600) to prevent
    /// unauthorized access.
    pub fn secret_file() -> Result<PathBuf, PathError> {
        Ok(Self::config_dir()?.join("secret.json"))
    }

    /// Returns the path to the per-account session directory.
    pub fn sessions_dir() -> Result<PathBuf, PathError> {
        Ok(Self::config_dir()?.join("sessions"))
    }

    /// Returns the path to the diagnostic screenshot directory.
    pub fn screenshots_dir() -> Result<PathBuf, PathError> {
        Ok(Self::config_dir()?.join("screenshots"))
    }
}
