//! Default notification sink backed by tracing.
//!
//! Chat/webhook surfaces are external collaborators; until one is wired
//! in, run events land in the structured log stream.

use async_trait::async_trait;

use seatguard_core::event::{NotificationSink, RunEvent};

/// Logs every run event through `tracing`.
pub struct LogSink;

#[async_trait]
impl NotificationSink for LogSink {
    async fn publish(&self, event: RunEvent) {
        match &event {
            RunEvent::Startup { accounts } => {
                tracing::info!(target: "run_events", "Run starting for {accounts} account(s)");
            }
            RunEvent::AuthRequired { account } => {
                tracing::info!(target: "run_events", "Account '{account}' needs a full login");
            }
            RunEvent::AuthSuccess { account, restored } => {
                tracing::info!(
                    target: "run_events",
                    "Account '{account}' authenticated (restored session: {restored})"
                );
            }
            RunEvent::AuthFailure {
                account,
                error,
                screenshot,
            } => {
                tracing::error!(
                    target: "run_events",
                    "Account '{account}' failed to authenticate: {error} (screenshot: {screenshot:?})"
                );
            }
            RunEvent::ReservationsFound {
                account,
                reservations,
            } => {
                tracing::info!(
                    target: "run_events",
                    "Account '{account}': {} reservation(s) found, {} confirmable",
                    reservations.len(),
                    reservations.iter().filter(|r| r.confirmable).count()
                );
            }
            RunEvent::ConfirmationSuccess {
                account,
                reservation,
            } => {
                tracing::info!(
                    target: "run_events",
                    "Account '{account}': confirmed {} {} - {} dep {}",
                    reservation.train_number,
                    reservation.origin,
                    reservation.destination,
                    reservation.departure_display
                );
            }
            RunEvent::ConfirmationFailure {
                account,
                reservation,
                error,
                screenshot,
            } => {
                tracing::error!(
                    target: "run_events",
                    "Account '{account}': could not confirm {} - {}: {error} (screenshot: {screenshot:?})",
                    reservation.origin,
                    reservation.destination
                );
            }
            RunEvent::RunComplete { results } => {
                for result in results {
                    tracing::info!(
                        target: "run_events",
                        "Account '{}': {} confirmed, {} failed, {} skipped{}",
                        result.account,
                        result.confirmed,
                        result.failed,
                        result.skipped,
                        result
                            .error
                            .as_ref()
                            .map(|e| format!(" (run error: {e})"))
                            .unwrap_or_default()
                    );
                }
            }
        }
    }
}
