//! Run events published to the notification surface.

use async_trait::async_trait;
use serde::Serialize;
use std::path::PathBuf;

use crate::reservation::{AccountResult, Reservation};

/// High-level events emitted during a run.
///
/// The core never formats human-readable text; sinks receive the
/// structured event (plus an optional diagnostic screenshot path) and
/// render it however their surface requires.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RunEvent {
    /// A run is starting.
    Startup { accounts: usize },
    /// The saved session did not hold and a full login is needed.
    AuthRequired { account: String },
    /// Login verified; `restored` is true when the saved session held and
    /// no credentials were submitted.
    AuthSuccess { account: String, restored: bool },
    /// Login verification failed; the account is skipped for this run.
    AuthFailure {
        account: String,
        error: String,
        screenshot: Option<PathBuf>,
    },
    /// Harvest finished for an account.
    ReservationsFound {
        account: String,
        reservations: Vec<Reservation>,
    },
    ConfirmationSuccess {
        account: String,
        reservation: Reservation,
    },
    ConfirmationFailure {
        account: String,
        reservation: Reservation,
        error: String,
        screenshot: Option<PathBuf>,
    },
    /// All accounts processed.
    RunComplete { results: Vec<AccountResult> },
}

/// Receiver for run events.
///
/// Sinks are collaborators outside the core workflow; publishing must
/// never fail the run, so the contract is infallible and implementations
/// swallow (and log) their own delivery problems.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn publish(&self, event: RunEvent);
}
