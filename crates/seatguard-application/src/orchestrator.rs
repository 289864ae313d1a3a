//! Per-account run orchestration.
//!
//! Accounts are processed strictly sequentially: each needs its own
//! authenticated browser context, and concurrent automated sessions
//! against the portal invite detection and rate limiting. No failure in
//! one account ever crosses into the next; the page resource is released
//! on every path before the next account begins.

use chrono::{DateTime, Local, Utc};
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;

use seatguard_core::account::Account;
use seatguard_core::error::{Result, SeatguardError};
use seatguard_core::event::{NotificationSink, RunEvent};
use seatguard_core::page::{PageFactory, PageHandle};
use seatguard_core::reservation::{AccountResult, Reservation};
use seatguard_core::session::SessionStore;

use crate::authenticator::Authenticator;
use crate::harvester::ReservationHarvester;
use crate::workflow::ConfirmationWorkflow;

/// Pause between reservation confirmations, randomized to avoid bursty
/// interaction with the portal.
const PAUSE_BETWEEN_RESERVATIONS_MS: (u64, u64) = (2_000, 6_000);

/// Explicit run-lock value owned by whoever triggers runs (scheduler,
/// CLI). Two overlapping runs would race on the same per-account session
/// files, so the orchestrator refuses to start while one is marked
/// running.
#[derive(Debug, Default)]
pub struct RunState {
    running: bool,
    last_run: Option<DateTime<Utc>>,
}

impl RunState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn last_run(&self) -> Option<DateTime<Utc>> {
        self.last_run
    }

    fn try_begin(&mut self) -> bool {
        if self.running {
            return false;
        }
        self.running = true;
        true
    }

    fn finish(&mut self) {
        self.running = false;
        self.last_run = Some(Utc::now());
    }
}

/// Drives authenticate -> harvest -> confirm for every account.
pub struct AccountOrchestrator {
    factory: Arc<dyn PageFactory>,
    store: Arc<dyn SessionStore>,
    sink: Arc<dyn NotificationSink>,
    authenticator: Authenticator,
    harvester: ReservationHarvester,
    workflow: ConfirmationWorkflow,
    pause_ms: (u64, u64),
}

impl AccountOrchestrator {
    pub fn new(
        factory: Arc<dyn PageFactory>,
        store: Arc<dyn SessionStore>,
        sink: Arc<dyn NotificationSink>,
        authenticator: Authenticator,
        harvester: ReservationHarvester,
        workflow: ConfirmationWorkflow,
    ) -> Self {
        Self {
            factory,
            store,
            sink,
            authenticator,
            harvester,
            workflow,
            pause_ms: PAUSE_BETWEEN_RESERVATIONS_MS,
        }
    }

    /// Removes the inter-reservation pause (tests).
    pub fn without_pauses(mut self) -> Self {
        self.pause_ms = (0, 0);
        self
    }

    /// Processes every account and aggregates results. The result list
    /// length always equals the account count; a failed account yields an
    /// all-failed entry instead of being dropped.
    pub async fn run(
        &self,
        state: &mut RunState,
        accounts: &[Account],
    ) -> Result<Vec<AccountResult>> {
        if !state.try_begin() {
            return Err(SeatguardError::internal("a run is already in progress"));
        }

        self.sink
            .publish(RunEvent::Startup {
                accounts: accounts.len(),
            })
            .await;

        let mut results = Vec::with_capacity(accounts.len());
        for account in accounts {
            results.push(self.process_account(account).await);
        }

        self.sink
            .publish(RunEvent::RunComplete {
                results: results.clone(),
            })
            .await;

        state.finish();
        Ok(results)
    }

    /// One account, with the page released on every path.
    async fn process_account(&self, account: &Account) -> AccountResult {
        tracing::info!("Processing account '{}'", account.name);

        let page = match self.factory.open().await {
            Ok(page) => page,
            Err(err) => {
                tracing::error!("Could not open a browser for '{}': {err}", account.name);
                return AccountResult::run_failed(&account.name, err.to_string());
            }
        };

        let result = self.drive_account(page.as_ref(), account).await;

        if let Err(err) = page.close().await {
            tracing::warn!("Failed to close the page for '{}': {err}", account.name);
        }

        result
    }

    async fn drive_account(&self, page: &dyn PageHandle, account: &Account) -> AccountResult {
        if let Err(err) = self.authenticator.authenticate(page, account).await {
            tracing::warn!("Account '{}' skipped for this run: {err}", account.name);
            return AccountResult::run_failed(&account.name, err.to_string());
        }

        let reservations = match self.harvest_with_reauth(page, account).await {
            Ok(reservations) => reservations,
            Err(err) => {
                tracing::error!("Harvest failed for '{}': {err}", account.name);
                return AccountResult::run_failed(&account.name, err.to_string());
            }
        };

        self.sink
            .publish(RunEvent::ReservationsFound {
                account: account.name.clone(),
                reservations: reservations.clone(),
            })
            .await;

        let now = Local::now().naive_local();
        let mut outcomes = Vec::with_capacity(reservations.len());
        for (index, reservation) in reservations.into_iter().enumerate() {
            if index > 0 {
                self.pause_between_reservations().await;
            }
            outcomes.push(
                self.workflow
                    .confirm(page, &account.name, reservation, now)
                    .await,
            );
        }

        AccountResult::from_confirmations(&account.name, &outcomes)
    }

    /// A session that expired between login and harvest gets exactly one
    /// forced re-authentication after dropping the stored session.
    async fn harvest_with_reauth(
        &self,
        page: &dyn PageHandle,
        account: &Account,
    ) -> Result<Vec<Reservation>> {
        match self.harvester.fetch_pending(page).await {
            Err(err) if err.is_session_expired() => {
                tracing::info!(
                    "Session for '{}' expired mid-run, re-authenticating",
                    account.name
                );
                self.store.clear(&account.name).await?;
                self.authenticator.authenticate(page, account).await?;
                self.harvester.fetch_pending(page).await
            }
            other => other,
        }
    }

    async fn pause_between_reservations(&self) {
        let (min, max) = self.pause_ms;
        if max == 0 {
            return;
        }
        let millis = {
            let mut rng = rand::thread_rng();
            rng.gen_range(min..=max)
        };
        tracing::debug!("Pausing {millis}ms before the next reservation");
        tokio::time::sleep(Duration::from_millis(millis)).await;
    }
}
