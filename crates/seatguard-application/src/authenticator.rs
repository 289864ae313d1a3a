//! Login state machine.
//!
//! ```text
//! Init -> PortalLoaded -> AlreadyAuthenticated -> Done
//!                      \-> NeedsLogin -> CredentialsSubmitted
//!                            -> OtpNotRequired ------------\
//!                            -> OtpRequired -> AwaitingCode \
//!                                 -> CodeSubmitted ----------> VerifyLogin
//!                                                                -> Done | Failure
//! ```
//!
//! Entry restores a saved session before re-navigating; when the restored
//! state already passes the logged-in probe the machine short-circuits to
//! Done without ever touching the code relay. A failed verification is
//! reported and never retried within the run.

use chrono::Utc;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use seatguard_core::account::Account;
use seatguard_core::error::{Result, SeatguardError};
use seatguard_core::event::{NotificationSink, RunEvent};
use seatguard_core::otp::OtpChannel;
use seatguard_core::page::{ElementRef, PageHandle};
use seatguard_core::profile::PortalProfile;
use seatguard_core::retry::poll_until_deadline;
use seatguard_core::session::{PortalSession, SessionStore};

use crate::page_support::{NAV_SETTLE_TIMEOUT, capture_diagnostic, first_match};

/// How long the verify step keeps re-probing the logged-in indicators
/// before declaring the attempt failed.
const LOGIN_VERIFY_TIMEOUT: Duration = Duration::from_secs(15);
const LOGIN_VERIFY_POLL: Duration = Duration::from_millis(500);

/// How the portal asks for the one-time code on this page.
enum OtpEntry {
    /// One input per digit, filled left to right.
    Digits(Vec<ElementRef>),
    /// A single combined field.
    Single(ElementRef),
}

/// Drives a page from cold to verified-logged-in for one account.
pub struct Authenticator {
    store: Arc<dyn SessionStore>,
    otp: Arc<dyn OtpChannel>,
    sink: Arc<dyn NotificationSink>,
    profile: PortalProfile,
    otp_max_wait: Duration,
    otp_poll_interval: Duration,
    screenshots_dir: Option<PathBuf>,
}

impl Authenticator {
    pub fn new(
        store: Arc<dyn SessionStore>,
        otp: Arc<dyn OtpChannel>,
        sink: Arc<dyn NotificationSink>,
        profile: PortalProfile,
        otp_max_wait: Duration,
        otp_poll_interval: Duration,
        screenshots_dir: Option<PathBuf>,
    ) -> Self {
        Self {
            store,
            otp,
            sink,
            profile,
            otp_max_wait,
            otp_poll_interval,
            screenshots_dir,
        }
    }

    /// Runs the full state machine. On success the page is verified
    /// logged-in and the session has been persisted; on failure the
    /// account is done for this run.
    pub async fn authenticate(&self, page: &dyn PageHandle, account: &Account) -> Result<()> {
        if self.try_restore(page, account).await? {
            tracing::info!("Account '{}' restored from saved session", account.name);
            self.sink
                .publish(RunEvent::AuthSuccess {
                    account: account.name.clone(),
                    restored: true,
                })
                .await;
            return Ok(());
        }

        self.sink
            .publish(RunEvent::AuthRequired {
                account: account.name.clone(),
            })
            .await;

        match self.full_login(page, account).await {
            Ok(()) => {
                if let Err(err) = self.persist_session(page, account).await {
                    // The login itself is good; only the next run pays for
                    // a failed save.
                    tracing::warn!("Could not persist session for '{}': {err}", account.name);
                }
                self.sink
                    .publish(RunEvent::AuthSuccess {
                        account: account.name.clone(),
                        restored: false,
                    })
                    .await;
                Ok(())
            }
            Err(err) => {
                let screenshot = capture_diagnostic(
                    page,
                    self.screenshots_dir.as_deref(),
                    "auth",
                    &account.name,
                )
                .await;
                self.sink
                    .publish(RunEvent::AuthFailure {
                        account: account.name.clone(),
                        error: err.to_string(),
                        screenshot,
                    })
                    .await;
                Err(err)
            }
        }
    }

    /// Init -> PortalLoaded, restoring any saved session first. True when
    /// the restored state already satisfies the logged-in check.
    async fn try_restore(&self, page: &dyn PageHandle, account: &Account) -> Result<bool> {
        let saved = self.store.load(&account.name).await?;

        page.goto(self.profile.portal_url).await?;
        page.wait_until_settled(NAV_SETTLE_TIMEOUT).await?;

        let Some(session) = saved else {
            return Ok(false);
        };

        let live_agent = page.user_agent().await.unwrap_or_default();
        if !session.user_agent.is_empty() && session.user_agent != live_agent {
            tracing::debug!(
                "Saved session for '{}' was recorded under a different client signature",
                account.name
            );
        }

        page.set_cookies(&session.cookies).await?;
        page.restore_local_storage(&session.local_storage).await?;

        // Reload so the restored state actually applies.
        page.goto(self.profile.portal_url).await?;
        page.wait_until_settled(NAV_SETTLE_TIMEOUT).await?;

        self.is_logged_in(page).await
    }

    async fn is_logged_in(&self, page: &dyn PageHandle) -> Result<bool> {
        for selector in self.profile.logged_in_probes {
            if !page.query(selector).await?.is_empty() {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// NeedsLogin -> CredentialsSubmitted -> [OTP] -> VerifyLogin.
    async fn full_login(&self, page: &dyn PageHandle, account: &Account) -> Result<()> {
        let username_field = first_match(page, self.profile.username_fields)
            .await?
            .ok_or_else(|| {
                SeatguardError::authentication("no username field on the login page")
            })?;
        page.fill(&username_field, &account.username).await?;

        let password_field = first_match(page, self.profile.password_fields)
            .await?
            .ok_or_else(|| {
                SeatguardError::authentication("no password field on the login page")
            })?;
        page.fill(&password_field, account.password.expose()).await?;

        let submit = first_match(page, self.profile.login_submit)
            .await?
            .ok_or_else(|| SeatguardError::authentication("no login submit control"))?;
        page.click(&submit).await?;
        page.wait_until_settled(NAV_SETTLE_TIMEOUT).await?;

        if let Some(entry) = self.probe_otp_entry(page).await? {
            tracing::info!("Portal asks for a one-time code for '{}'", account.name);
            let code = self
                .otp
                .wait_for_code(self.otp_max_wait, self.otp_poll_interval)
                .await?;
            self.submit_code(page, entry, &code).await?;
        }

        self.verify_login(page).await
    }

    /// Probes the known one-time-code affordances, per-digit inputs first.
    async fn probe_otp_entry(&self, page: &dyn PageHandle) -> Result<Option<OtpEntry>> {
        for selector in self.profile.otp_digit_fields {
            let fields = page.query(selector).await?;
            if fields.len() >= 2 {
                return Ok(Some(OtpEntry::Digits(fields)));
            }
        }
        for selector in self.profile.otp_single_fields {
            if let Some(field) = page.query(selector).await?.into_iter().next() {
                return Ok(Some(OtpEntry::Single(field)));
            }
        }
        Ok(None)
    }

    async fn submit_code(&self, page: &dyn PageHandle, entry: OtpEntry, code: &str) -> Result<()> {
        match entry {
            OtpEntry::Digits(fields) => {
                let digits: Vec<char> = code.chars().collect();
                if digits.len() != fields.len() {
                    tracing::warn!(
                        "Code has {} digits but the form has {} fields",
                        digits.len(),
                        fields.len()
                    );
                }
                for (field, digit) in fields.iter().zip(digits.iter()) {
                    page.fill(field, &digit.to_string()).await?;
                }
            }
            OtpEntry::Single(field) => {
                page.fill(&field, code).await?;
            }
        }

        if let Some(submit) = first_match(page, self.profile.otp_submit).await? {
            page.click(&submit).await?;
        }
        page.wait_until_settled(NAV_SETTLE_TIMEOUT).await?;
        Ok(())
    }

    /// VerifyLogin: re-probe the logged-in indicators over a bounded wait.
    async fn verify_login(&self, page: &dyn PageHandle) -> Result<()> {
        let verified = poll_until_deadline(LOGIN_VERIFY_TIMEOUT, LOGIN_VERIFY_POLL, || {
            let this = self;
            async move {
                match this.is_logged_in(page).await {
                    Ok(true) => Some(()),
                    _ => None,
                }
            }
        })
        .await;

        verified.ok_or_else(|| {
            SeatguardError::authentication("logged-in indicators never appeared after submit")
        })
    }

    /// Persists cookies + client storage + client signature for the next
    /// run.
    async fn persist_session(&self, page: &dyn PageHandle, account: &Account) -> Result<()> {
        let session = PortalSession {
            cookies: page.cookies().await?,
            local_storage: page.local_storage().await?,
            last_authenticated: Utc::now(),
            user_agent: page.user_agent().await.unwrap_or_default(),
        };
        self.store.save(&account.name, &session).await
    }
}
