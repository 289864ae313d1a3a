//! Reservation discovery.
//!
//! Two strategies, tried in order:
//!
//! 1. **Card strategy**: ranked "reservation card" selectors; cards whose
//!    text does not mark them as awaiting confirmation are dropped.
//! 2. **Control-anchored strategy**: every confirm affordance on the page
//!    (disabled ones included, so not-yet-confirmable trips still surface)
//!    anchors an upward walk to the smallest ancestor showing at least two
//!    time markers, which bounds extraction to one trip's container.
//!
//! `confirmable` always comes from the control's disabled state, never
//! from scraped text: the control is the one signal the portal keeps
//! accurate across layout changes.

use chrono::{Datelike, Duration as ChronoDuration, Local, NaiveDate, NaiveTime};
use once_cell::sync::Lazy;
use regex::Regex;

use seatguard_core::error::{Result, SeatguardError};
use seatguard_core::page::{ElementRef, PageHandle};
use seatguard_core::profile::{PortalProfile, month_from_name};
use seatguard_core::reservation::{Reservation, ReservationStatus};

use crate::page_support::{
    NAV_SETTLE_TIMEOUT, ancestors, find_confirm_controls, first_nonempty,
};

/// Clock times as the portal renders them: "08:14" or "18h06".
static TIME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b([01]?\d|2[0-3])[:h]([0-5]\d)\b").unwrap());

/// Labelled train numbers: "TGV INOUI N° 8472", "TER 83214", "Train #912".
static TRAIN_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:TGV(?:\s+INOUI)?|INOUI|OUIGO|TER|INTERCITES|TRAIN)\s*(?:N°|NO\.?|#)?\s*(\d{3,5})\b")
        .unwrap()
});

/// Natural-language dates: "12 mars 2025", "1er avril", "3 Sept. 2025".
static NATURAL_DATE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(\d{1,2})(?:er)?\s+(\p{L}+\.?)(?:\s+(\d{4}))?").unwrap());

/// One clock time found in container text.
#[derive(Debug, Clone, PartialEq, Eq)]
struct TimeMarker {
    hour: u32,
    minute: u32,
    display: String,
}

impl TimeMarker {
    fn minutes_of_day(&self) -> u32 {
        self.hour * 60 + self.minute
    }

    fn to_naive(&self) -> NaiveTime {
        NaiveTime::from_hms_opt(self.hour, self.minute, 0).unwrap_or_default()
    }
}

/// Enumerates reservations on the authenticated reservations view.
pub struct ReservationHarvester {
    profile: PortalProfile,
}

impl Default for ReservationHarvester {
    fn default() -> Self {
        Self::new(PortalProfile::default())
    }
}

impl ReservationHarvester {
    pub fn new(profile: PortalProfile) -> Self {
        Self { profile }
    }

    /// Returns pending reservations in discovery order (not stable across
    /// runs). A silent redirect to the login flow is `SessionExpired`; a
    /// page where extraction was attempted but produced nothing is logged
    /// and treated as "no reservations".
    pub async fn fetch_pending(&self, page: &dyn PageHandle) -> Result<Vec<Reservation>> {
        page.goto(self.profile.reservations_url).await?;
        page.wait_until_settled(NAV_SETTLE_TIMEOUT).await?;

        let url = page.current_url().await?;
        if self.profile.is_login_url(&url) {
            tracing::warn!("Reservations view redirected to login ({url})");
            return Err(SeatguardError::SessionExpired);
        }

        let today = Local::now().date_naive();

        let from_cards = self.harvest_cards(page, today).await?;
        if !from_cards.is_empty() {
            return Ok(from_cards);
        }
        self.harvest_from_controls(page, today).await
    }

    /// Per-card strategy: first card selector that matches anything wins.
    async fn harvest_cards(&self, page: &dyn PageHandle, today: NaiveDate) -> Result<Vec<Reservation>> {
        let cards = first_nonempty(page, self.profile.card_selectors).await?;
        if cards.is_empty() {
            return Ok(vec![]);
        }

        let mut reservations = vec![];
        for card in &cards {
            let text = page.text(card).await?;
            // This strategy only surfaces trips the page itself marks as
            // awaiting confirmation.
            if !self.profile.is_needs_confirmation_text(&text) {
                continue;
            }
            let confirmable = match self.confirm_control_within(page, card).await? {
                Some(control) => page.is_enabled(&control).await?,
                None => false,
            };
            if let Some(reservation) = self
                .parse_container(page, card, &text, confirmable, today)
                .await?
            {
                reservations.push(reservation);
            }
        }
        tracing::debug!(
            "Card strategy: {} card(s), {} reservation(s)",
            cards.len(),
            reservations.len()
        );
        Ok(reservations)
    }

    async fn confirm_control_within(
        &self,
        page: &dyn PageHandle,
        card: &ElementRef,
    ) -> Result<Option<ElementRef>> {
        for selector in self.profile.confirm_button_selectors {
            if let Some(control) = page.query_within(card, selector).await?.into_iter().next() {
                return Ok(Some(control));
            }
        }
        for button in page.query_within(card, "button").await? {
            let label = page.text(&button).await?;
            if self.profile.is_confirm_label(&label) {
                return Ok(Some(button));
            }
        }
        Ok(None)
    }

    /// Control-anchored strategy.
    async fn harvest_from_controls(
        &self,
        page: &dyn PageHandle,
        today: NaiveDate,
    ) -> Result<Vec<Reservation>> {
        let controls = find_confirm_controls(page, &self.profile).await?;
        if controls.is_empty() {
            tracing::info!("No confirm controls on the reservations view");
            return Ok(vec![]);
        }

        let mut reservations = vec![];
        for control in &controls {
            let confirmable = page.is_enabled(control).await.unwrap_or(false);
            let Some(container) = self.trip_container(page, control).await? else {
                tracing::debug!("No trip container found around a confirm control");
                continue;
            };
            let text = page.text(&container).await?;
            if let Some(reservation) = self
                .parse_container(page, &container, &text, confirmable, today)
                .await?
            {
                reservations.push(reservation);
            }
        }

        if reservations.is_empty() {
            // Extraction was attempted and produced nothing: report the
            // harvest failure but hand back an empty list.
            let err = SeatguardError::harvest(format!(
                "{} confirm control(s) but no parseable trip container",
                controls.len()
            ));
            tracing::warn!("{err}");
        }
        Ok(reservations)
    }

    /// Walks upward to the smallest container holding full trip
    /// information: the first ancestor whose text shows at least two time
    /// markers.
    async fn trip_container(
        &self,
        page: &dyn PageHandle,
        control: &ElementRef,
    ) -> Result<Option<ElementRef>> {
        for ancestor in ancestors(page, control).await? {
            let text = page.text(&ancestor).await?;
            if count_time_markers(&text) >= 2 {
                return Ok(Some(ancestor));
            }
        }
        Ok(None)
    }

    async fn parse_container(
        &self,
        page: &dyn PageHandle,
        container: &ElementRef,
        text: &str,
        confirmable: bool,
        today: NaiveDate,
    ) -> Result<Option<Reservation>> {
        let times = extract_times(text);
        if times.len() < 2 {
            tracing::debug!("Container shows fewer than two time markers");
            return Ok(None);
        }

        let stations = extract_stations(text);
        if stations.len() < 2 {
            tracing::debug!("Could not find two station names in container text");
            return Ok(None);
        }

        let date = match self.machine_date(page, container).await? {
            Some(date) => Some(date),
            None => parse_natural_date(text, today),
        };
        let Some(date) = date else {
            tracing::debug!("No departure date in container");
            return Ok(None);
        };

        let train_number = extract_train_number(text).unwrap_or_default();

        // The two earliest clock times are departure and arrival.
        let mut by_clock = times.clone();
        by_clock.sort_by_key(TimeMarker::minutes_of_day);
        let departure_time = &by_clock[0];
        let arrival_time = &by_clock[1];

        let id = if train_number.is_empty() {
            uuid::Uuid::new_v4().to_string()
        } else {
            format!(
                "{}-{}-{}",
                train_number,
                date.format("%Y-%m-%d"),
                slug(&stations[0])
            )
        };

        Ok(Some(Reservation {
            id,
            origin: stations[0].clone(),
            destination: stations[1].clone(),
            departure: date.and_time(departure_time.to_naive()),
            departure_display: departure_time.display.clone(),
            arrival_display: Some(arrival_time.display.clone()),
            train_number,
            status: ReservationStatus::Pending,
            confirmable,
        }))
    }

    /// Machine-readable date from a `<time datetime=...>` marker inside
    /// the container, preferred over natural-language parsing.
    async fn machine_date(
        &self,
        page: &dyn PageHandle,
        container: &ElementRef,
    ) -> Result<Option<NaiveDate>> {
        for marker in page.query_within(container, "time").await? {
            if let Some(raw) = page.attr(&marker, "datetime").await? {
                if let Some(date) = parse_machine_date(&raw) {
                    return Ok(Some(date));
                }
            }
        }
        Ok(None)
    }
}

// ============================================================================
// Text heuristics
// ============================================================================

fn count_time_markers(text: &str) -> usize {
    TIME_RE.find_iter(text).count()
}

/// Clock times in appearance order, normalized to HH:MM for display.
fn extract_times(text: &str) -> Vec<TimeMarker> {
    TIME_RE
        .captures_iter(text)
        .filter_map(|caps| {
            let hour: u32 = caps.get(1)?.as_str().parse().ok()?;
            let minute: u32 = caps.get(2)?.as_str().parse().ok()?;
            Some(TimeMarker {
                hour,
                minute,
                display: format!("{hour:02}:{minute:02}"),
            })
        })
        .collect()
}

/// Station names from text adjacent to time markers: each line holding a
/// time marker is split at the markers and the surrounding text segments
/// become candidates.
fn extract_stations(text: &str) -> Vec<String> {
    let mut stations: Vec<String> = vec![];
    for line in text.lines() {
        if !TIME_RE.is_match(line) {
            continue;
        }
        for segment in TIME_RE.split(line) {
            let cleaned = clean_station_segment(segment);
            if cleaned.chars().filter(|c| c.is_alphabetic()).count() < 3 {
                continue;
            }
            let duplicate = stations
                .last()
                .map(|last| last.eq_ignore_ascii_case(&cleaned))
                .unwrap_or(false);
            if !duplicate {
                stations.push(cleaned);
            }
        }
    }
    stations
}

/// Strips separators and decoration around a station name, keeping inner
/// spaces ("PARIS GARE DE LYON").
fn clean_station_segment(segment: &str) -> String {
    segment
        .trim_matches(|c: char| !c.is_alphanumeric())
        .trim()
        .to_string()
}

fn extract_train_number(text: &str) -> Option<String> {
    TRAIN_RE
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

/// "2025-03-12", or any ISO-8601 datetime starting with a date.
fn parse_machine_date(raw: &str) -> Option<NaiveDate> {
    if raw.len() < 10 || !raw.is_char_boundary(10) {
        return None;
    }
    NaiveDate::parse_from_str(&raw[..10], "%Y-%m-%d").ok()
}

/// Natural-language date with a month-name lookup. A missing year is
/// inferred forward: the portal only shows upcoming trips, so a
/// day/month that already passed this year means next year.
fn parse_natural_date(text: &str, today: NaiveDate) -> Option<NaiveDate> {
    for caps in NATURAL_DATE_RE.captures_iter(text) {
        let Some(month) = caps.get(2).and_then(|m| month_from_name(m.as_str())) else {
            continue;
        };
        let Some(day) = caps.get(1).and_then(|m| m.as_str().parse::<u32>().ok()) else {
            continue;
        };

        if let Some(year) = caps.get(3).and_then(|m| m.as_str().parse::<i32>().ok()) {
            if let Some(date) = NaiveDate::from_ymd_opt(year, month, day) {
                return Some(date);
            }
            continue;
        }

        let this_year = NaiveDate::from_ymd_opt(today.year(), month, day);
        if let Some(date) = this_year {
            if date < today - ChronoDuration::days(1) {
                return NaiveDate::from_ymd_opt(today.year() + 1, month, day);
            }
            return Some(date);
        }
    }
    None
}

fn slug(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut last_dash = false;
    for c in value.chars() {
        if c.is_alphanumeric() {
            out.extend(c.to_lowercase());
            last_dash = false;
        } else if !last_dash && !out.is_empty() {
            out.push('-');
            last_dash = true;
        }
    }
    out.trim_end_matches('-').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{FakePage, node};

    const CARD_TEXT: &str = "TGV INOUI N° 8472\n\
                             mer. 12 mars 2025\n\
                             PARIS GARE DE LYON 08:14\n\
                             LYON PART DIEU 10:02\n\
                             À confirmer avant le départ";

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, 10).unwrap()
    }

    #[test]
    fn test_extract_times_normalizes_both_formats() {
        let times = extract_times("départ 08:14 arrivée 18h06");
        assert_eq!(times.len(), 2);
        assert_eq!(times[0].display, "08:14");
        assert_eq!(times[1].display, "18:06");
        assert_eq!(times[1].minutes_of_day(), 18 * 60 + 6);
    }

    #[test]
    fn test_extract_stations_adjacent_to_times() {
        let stations = extract_stations(CARD_TEXT);
        assert_eq!(
            stations,
            vec!["PARIS GARE DE LYON".to_string(), "LYON PART DIEU".to_string()]
        );
    }

    #[test]
    fn test_extract_stations_single_line_layout() {
        let stations = extract_stations("PARIS MONTPARNASSE 06:52 → BORDEAUX ST-JEAN 09:04");
        assert_eq!(stations, vec!["PARIS MONTPARNASSE", "BORDEAUX ST-JEAN"]);
    }

    #[test]
    fn test_extract_train_number() {
        assert_eq!(extract_train_number(CARD_TEXT).as_deref(), Some("8472"));
        assert_eq!(
            extract_train_number("TER 83214 direction Grenoble").as_deref(),
            Some("83214")
        );
        assert_eq!(extract_train_number("aucun numéro ici"), None);
    }

    #[test]
    fn test_parse_natural_date_with_year() {
        assert_eq!(
            parse_natural_date("mer. 12 mars 2025", today()),
            NaiveDate::from_ymd_opt(2025, 3, 12)
        );
    }

    #[test]
    fn test_parse_natural_date_infers_forward_year() {
        let late_december = NaiveDate::from_ymd_opt(2025, 12, 30).unwrap();
        assert_eq!(
            parse_natural_date("départ le 2 janvier", late_december),
            NaiveDate::from_ymd_opt(2026, 1, 2)
        );
        assert_eq!(
            parse_natural_date("départ le 31 décembre", late_december),
            NaiveDate::from_ymd_opt(2025, 12, 31)
        );
    }

    #[test]
    fn test_station_names_do_not_parse_as_dates() {
        // "10 MARSEILLE" must not read as the 10th of March.
        assert_eq!(parse_natural_date("voie 10 MARSEILLE ST-CHARLES", today()), None);
    }

    #[test]
    fn test_parse_machine_date() {
        assert_eq!(
            parse_machine_date("2025-03-12T08:14:00+01:00"),
            NaiveDate::from_ymd_opt(2025, 3, 12)
        );
        assert_eq!(parse_machine_date("2025-03-12"), NaiveDate::from_ymd_opt(2025, 3, 12));
        assert_eq!(parse_machine_date("demain"), None);
    }

    #[test]
    fn test_slug() {
        assert_eq!(slug("PARIS GARE DE LYON"), "paris-gare-de-lyon");
        assert_eq!(slug("  Lyon  Part-Dieu "), "lyon-part-dieu");
    }

    // ------------------------------------------------------------------
    // Page-level strategies
    // ------------------------------------------------------------------

    /// A trip card reachable only through the control-anchored walk: the
    /// confirm button sits two levels below the container carrying the
    /// trip text.
    fn add_trip(page: &FakePage, suffix: &str, trip_text: &str, enabled: bool) {
        let card = format!("card-{suffix}");
        let inner = format!("inner-{suffix}");
        let button = format!("btn-{suffix}");
        page.add(node(&card).text(trip_text));
        page.add(node(&inner).child_of(&card));
        let mut control = node(&button)
            .selector("button[class*='confirm']")
            .text("Confirmer")
            .child_of(&inner);
        if !enabled {
            control = control.disabled();
        }
        page.add(control);
    }

    #[tokio::test]
    async fn test_control_anchored_harvest_keeps_disabled_controls() {
        let page = FakePage::new();
        let trip_a = "TGV INOUI N° 8472\n12 mars 2025\nPARIS GARE DE LYON 08:14\nLYON PART DIEU 10:02";
        let trip_b = "TGV INOUI N° 6603\n13 mars 2025\nLYON PART DIEU 17:04\nMARSEILLE ST-CHARLES 18h46";
        let trip_c = "TER 83214\n20 mars 2025\nGRENOBLE 07:12\nVALENCE TGV 08:05";
        add_trip(&page, "a", trip_a, true);
        add_trip(&page, "b", trip_b, true);
        add_trip(&page, "c", trip_c, false);

        let harvester = ReservationHarvester::default();
        let reservations = harvester.fetch_pending(&page).await.unwrap();

        assert_eq!(reservations.len(), 3);
        let confirmable: Vec<bool> = reservations.iter().map(|r| r.confirmable).collect();
        assert_eq!(confirmable, vec![true, true, false]);
        assert_eq!(reservations[0].origin, "PARIS GARE DE LYON");
        assert_eq!(reservations[0].destination, "LYON PART DIEU");
        assert_eq!(reservations[0].train_number, "8472");
        assert_eq!(reservations[0].departure_display, "08:14");
        assert_eq!(reservations[1].arrival_display.as_deref(), Some("18:46"));
    }

    #[tokio::test]
    async fn test_card_strategy_wins_and_filters_unmarked_cards() {
        let page = FakePage::new();
        page.add(
            node("card-1")
                .selector("[data-testid='reservation-card']")
                .text("TGV INOUI N° 8472\n12 mars 2025\nPARIS GARE DE LYON 08:14\nLYON PART DIEU 10:02\nÀ confirmer"),
        );
        page.add(
            node("b1")
                .selector("button[class*='confirm']")
                .text("Confirmer")
                .child_of("card-1"),
        );
        // Already confirmed: no needs-confirmation marker, dropped.
        page.add(
            node("card-2")
                .selector("[data-testid='reservation-card']")
                .text("TGV INOUI N° 6603\n13 mars 2025\nLYON PART DIEU 17:04\nMARSEILLE ST-CHARLES 18:46\nConfirmé"),
        );

        let harvester = ReservationHarvester::default();
        let reservations = harvester.fetch_pending(&page).await.unwrap();

        assert_eq!(reservations.len(), 1);
        assert_eq!(reservations[0].train_number, "8472");
        assert!(reservations[0].confirmable);
    }

    #[tokio::test]
    async fn test_login_redirect_is_session_expired() {
        let page = FakePage::new();
        page.redirect(
            "mes-reservations",
            "https://www.maxjeune-tgvinoui.sncf/connexion?next=mes-reservations",
        );

        let harvester = ReservationHarvester::default();
        let err = harvester.fetch_pending(&page).await.unwrap_err();
        assert!(err.is_session_expired());
    }

    #[tokio::test]
    async fn test_empty_page_is_no_reservations() {
        let page = FakePage::new();
        let harvester = ReservationHarvester::default();
        let reservations = harvester.fetch_pending(&page).await.unwrap();
        assert!(reservations.is_empty());
    }

    #[tokio::test]
    async fn test_unparseable_container_is_logged_not_fatal() {
        let page = FakePage::new();
        // A confirm control with no trip information anywhere above it.
        page.add(node("stray").text("Confirmer"));
        page.add(
            node("btn")
                .selector("button[class*='confirm']")
                .text("Confirmer")
                .child_of("stray"),
        );

        let harvester = ReservationHarvester::default();
        let reservations = harvester.fetch_pending(&page).await.unwrap();
        assert!(reservations.is_empty());
    }
}
