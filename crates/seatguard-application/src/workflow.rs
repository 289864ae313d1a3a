//! Confirm-and-verify sequence for one reservation.
//!
//! Everything that can go wrong here dies at this boundary: an error
//! becomes a failed [`ConfirmationResult`] with a notification, never an
//! exception crossing into sibling reservations.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDateTime;

use seatguard_core::error::{Result, SeatguardError};
use seatguard_core::event::{NotificationSink, RunEvent};
use seatguard_core::page::{ElementRef, PageHandle};
use seatguard_core::profile::PortalProfile;
use seatguard_core::reservation::{ConfirmationResult, Reservation};
use seatguard_core::retry::poll_until_deadline;

use crate::page_support::{
    NAV_SETTLE_TIMEOUT, ancestors, capture_diagnostic, find_confirm_controls, first_match,
};

/// How long to wait for the optional secondary confirmation dialog.
/// Absence is normal; the portal only shows it on some layouts.
const DIALOG_WAIT: Duration = Duration::from_secs(3);
const DIALOG_POLL: Duration = Duration::from_millis(250);

/// What the post-click verification concluded.
enum Outcome {
    Confirmed,
    /// The control had been disabled between harvest and the click
    /// attempt; nothing was done.
    DisabledMeanwhile,
}

/// Performs the confirm action for one reservation and verifies it.
pub struct ConfirmationWorkflow {
    sink: Arc<dyn NotificationSink>,
    profile: PortalProfile,
    screenshots_dir: Option<PathBuf>,
}

impl ConfirmationWorkflow {
    pub fn new(
        sink: Arc<dyn NotificationSink>,
        profile: PortalProfile,
        screenshots_dir: Option<PathBuf>,
    ) -> Self {
        Self {
            sink,
            profile,
            screenshots_dir,
        }
    }

    /// Confirms `reservation` on the page. Non-confirmable trips and trips
    /// outside the 48-hour window are skipped without any page
    /// interaction.
    pub async fn confirm(
        &self,
        page: &dyn PageHandle,
        account: &str,
        reservation: Reservation,
        now: NaiveDateTime,
    ) -> ConfirmationResult {
        if !reservation.confirmable {
            tracing::debug!(
                "'{}' {} - {}: confirm control disabled, skipping",
                account,
                reservation.origin,
                reservation.destination
            );
            return ConfirmationResult::skipped(reservation);
        }
        if !reservation.needs_confirmation(now) {
            tracing::debug!(
                "'{}' {} - {}: outside the confirmation window ({:.1}h to departure), skipping",
                account,
                reservation.origin,
                reservation.destination,
                reservation.hours_until_departure(now)
            );
            return ConfirmationResult::skipped(reservation);
        }

        match self.attempt(page, &reservation).await {
            Ok(Outcome::Confirmed) => {
                tracing::info!(
                    "Confirmed {} - {} dep {}",
                    reservation.origin,
                    reservation.destination,
                    reservation.departure_display
                );
                let result = ConfirmationResult::confirmed(reservation);
                self.sink
                    .publish(RunEvent::ConfirmationSuccess {
                        account: account.to_string(),
                        reservation: result.reservation.clone(),
                    })
                    .await;
                result
            }
            Ok(Outcome::DisabledMeanwhile) => {
                tracing::info!(
                    "Confirm control for {} - {} went disabled since harvest, skipping",
                    reservation.origin,
                    reservation.destination
                );
                ConfirmationResult::skipped(reservation)
            }
            Err(err) => {
                let screenshot = capture_diagnostic(
                    page,
                    self.screenshots_dir.as_deref(),
                    "confirm",
                    &reservation.id,
                )
                .await;
                self.sink
                    .publish(RunEvent::ConfirmationFailure {
                        account: account.to_string(),
                        reservation: reservation.clone(),
                        error: err.to_string(),
                        screenshot,
                    })
                    .await;
                ConfirmationResult::failed(reservation, err.to_string())
            }
        }
    }

    async fn attempt(&self, page: &dyn PageHandle, reservation: &Reservation) -> Result<Outcome> {
        let control = self
            .locate_control(page, reservation)
            .await?
            .ok_or_else(|| SeatguardError::confirmation("confirm control not found"))?;

        // The page may have moved on since harvest; never click a control
        // the portal has since disabled.
        if !page.is_enabled(&control).await? {
            return Ok(Outcome::DisabledMeanwhile);
        }

        page.click(&control).await?;
        self.dismiss_dialog(page).await?;
        page.wait_until_settled(NAV_SETTLE_TIMEOUT).await?;

        self.verify(page, &control).await
    }

    /// Finds the confirm control belonging to this reservation: the one
    /// with the trip's origin and destination in a nearby ancestor. Falls
    /// back to the first visible confirm control.
    async fn locate_control(
        &self,
        page: &dyn PageHandle,
        reservation: &Reservation,
    ) -> Result<Option<ElementRef>> {
        let controls = find_confirm_controls(page, &self.profile).await?;

        for control in &controls {
            if self.matches_route(page, control, reservation).await? {
                return Ok(Some(control.clone()));
            }
        }

        for control in &controls {
            if page.is_displayed(control).await? {
                tracing::debug!(
                    "No control matched {} - {}, falling back to the first visible one",
                    reservation.origin,
                    reservation.destination
                );
                return Ok(Some(control.clone()));
            }
        }
        Ok(None)
    }

    async fn matches_route(
        &self,
        page: &dyn PageHandle,
        control: &ElementRef,
        reservation: &Reservation,
    ) -> Result<bool> {
        let origin = reservation.origin.to_lowercase();
        let destination = reservation.destination.to_lowercase();
        for ancestor in ancestors(page, control).await? {
            let text = page.text(&ancestor).await?.to_lowercase();
            if text.contains(&origin) && text.contains(&destination) {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Waits briefly for the secondary confirmation dialog and accepts it.
    /// No dialog within the window is not an error.
    async fn dismiss_dialog(&self, page: &dyn PageHandle) -> Result<()> {
        let dialog = poll_until_deadline(DIALOG_WAIT, DIALOG_POLL, || {
            let this = self;
            async move {
                match first_match(page, this.profile.dialog_confirm_selectors).await {
                    Ok(found) => found,
                    Err(err) => {
                        tracing::debug!("Dialog probe failed: {err}");
                        None
                    }
                }
            }
        })
        .await;

        if let Some(accept) = dialog {
            tracing::debug!("Accepting secondary confirmation dialog");
            page.click(&accept).await?;
            page.wait_until_settled(NAV_SETTLE_TIMEOUT).await?;
        }
        Ok(())
    }

    /// Post-click verification ladder: control gone, invisible or
    /// disabled all mean the portal accepted the confirmation; a control
    /// still present, visible and enabled means it did not.
    async fn verify(&self, page: &dyn PageHandle, control: &ElementRef) -> Result<Outcome> {
        if !page.is_present(control).await? {
            return Ok(Outcome::Confirmed);
        }
        if !page.is_displayed(control).await? {
            return Ok(Outcome::Confirmed);
        }
        if !page.is_enabled(control).await? {
            return Ok(Outcome::Confirmed);
        }
        Err(SeatguardError::confirmation(
            "confirm control still enabled after the click",
        ))
    }
}
