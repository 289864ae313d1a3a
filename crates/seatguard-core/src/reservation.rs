//! Reservation domain model and run result aggregates.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Reservations departing within this many hours require re-confirmation
/// on the portal before they are cancelled.
pub const CONFIRMATION_WINDOW_HOURS: f64 = 48.0;

/// Lifecycle status of a harvested reservation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReservationStatus {
    Pending,
    Confirmed,
    Cancelled,
}

/// One trip discovered on the reservations page.
///
/// Rebuilt fresh on every harvest; the identifier is synthesized from the
/// trip fields and is not guaranteed stable across runs. `status` moves to
/// `Confirmed` only after the confirm action has been verified.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reservation {
    pub id: String,
    pub origin: String,
    pub destination: String,
    /// Departure in portal-local time.
    pub departure: NaiveDateTime,
    /// Departure time exactly as displayed on the page.
    pub departure_display: String,
    /// Arrival time as displayed, when the page exposed one.
    #[serde(default)]
    pub arrival_display: Option<String>,
    pub train_number: String,
    pub status: ReservationStatus,
    /// Whether the confirm control was enabled at harvest time.
    pub confirmable: bool,
}

impl Reservation {
    /// Hours from `now` until departure; negative once the train has left.
    pub fn hours_until_departure(&self, now: NaiveDateTime) -> f64 {
        (self.departure - now).num_seconds() as f64 / 3600.0
    }

    /// True iff the trip is inside the portal's confirmation window:
    /// strictly more than zero hours out, at most 48.
    pub fn needs_confirmation(&self, now: NaiveDateTime) -> bool {
        let hours = self.hours_until_departure(now);
        hours > 0.0 && hours <= CONFIRMATION_WINDOW_HOURS
    }
}

/// Outcome of one confirmation attempt. Immutable once produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfirmationResult {
    pub reservation: Reservation,
    pub success: bool,
    #[serde(default)]
    pub error: Option<String>,
    /// True when confirmation was not yet permitted and nothing was done.
    pub skipped: bool,
}

impl ConfirmationResult {
    pub fn confirmed(mut reservation: Reservation) -> Self {
        reservation.status = ReservationStatus::Confirmed;
        Self {
            reservation,
            success: true,
            error: None,
            skipped: false,
        }
    }

    pub fn skipped(reservation: Reservation) -> Self {
        Self {
            reservation,
            success: false,
            error: None,
            skipped: true,
        }
    }

    pub fn failed(reservation: Reservation, error: impl Into<String>) -> Self {
        Self {
            reservation,
            success: false,
            error: Some(error.into()),
            skipped: false,
        }
    }
}

/// Per-account aggregate produced once per run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountResult {
    pub account: String,
    pub confirmed: usize,
    pub failed: usize,
    pub skipped: usize,
    /// Set when the account never reached the confirmation stage
    /// (authentication or harvest failed outright); such a result counts
    /// as all-failed.
    #[serde(default)]
    pub error: Option<String>,
}

impl AccountResult {
    /// Folds a batch of confirmation results into the per-account counts.
    pub fn from_confirmations(account: impl Into<String>, results: &[ConfirmationResult]) -> Self {
        let mut aggregate = Self {
            account: account.into(),
            confirmed: 0,
            failed: 0,
            skipped: 0,
            error: None,
        };
        for result in results {
            if result.skipped {
                aggregate.skipped += 1;
            } else if result.success {
                aggregate.confirmed += 1;
            } else {
                aggregate.failed += 1;
            }
        }
        aggregate
    }

    /// The all-failed result recorded when an account never reaches the
    /// confirmation stage.
    pub fn run_failed(account: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            account: account.into(),
            confirmed: 0,
            failed: 0,
            skipped: 0,
            error: Some(error.into()),
        }
    }
}
