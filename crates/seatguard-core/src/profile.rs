//! Portal layout heuristics as data.
//!
//! The portal ships layout changes without notice, so everything the
//! workflow knows about the page lives here as ranked candidate lists:
//! selectors are tried in order and the first match wins. Adding support
//! for a new layout means appending to these lists, not touching control
//! flow.

/// Upper bound on upward DOM walks (trip-container search, proximity
/// matching). Prevents unbounded traversal on malformed or unexpected
/// pages; real trip cards sit well within this depth.
pub const ANCESTOR_SCAN_LIMIT: usize = 12;

/// Month-name lookup for natural-language dates on the page. The portal
/// renders French month names; English is included for the mobile layout
/// served to some locales. Names are matched exactly (after lowercasing
/// and stripping a trailing dot), never by prefix: station names like
/// MARSEILLE must not read as "mars".
pub const MONTH_NAMES: &[(&str, u32)] = &[
    ("janvier", 1),
    ("janv", 1),
    ("jan", 1),
    ("january", 1),
    ("février", 2),
    ("fevrier", 2),
    ("févr", 2),
    ("fevr", 2),
    ("feb", 2),
    ("february", 2),
    ("mars", 3),
    ("mar", 3),
    ("march", 3),
    ("avril", 4),
    ("avr", 4),
    ("apr", 4),
    ("april", 4),
    ("mai", 5),
    ("may", 5),
    ("juin", 6),
    ("jun", 6),
    ("june", 6),
    ("juillet", 7),
    ("juil", 7),
    ("jul", 7),
    ("july", 7),
    ("août", 8),
    ("aout", 8),
    ("aug", 8),
    ("august", 8),
    ("septembre", 9),
    ("sept", 9),
    ("sep", 9),
    ("september", 9),
    ("octobre", 10),
    ("oct", 10),
    ("october", 10),
    ("novembre", 11),
    ("nov", 11),
    ("november", 11),
    ("décembre", 12),
    ("decembre", 12),
    ("déc", 12),
    ("dec", 12),
    ("december", 12),
];

/// Everything the workflow knows about the target portal's layout.
///
/// Ranked candidate lists, first match wins. The default profile encodes
/// the layouts observed so far.
#[derive(Debug, Clone)]
pub struct PortalProfile {
    /// Landing page; navigating here with restored cookies re-establishes
    /// an existing session.
    pub portal_url: &'static str,
    /// Authenticated reservations view.
    pub reservations_url: &'static str,
    /// URL fragments that betray a silent redirect to the login flow.
    pub login_url_markers: &'static [&'static str],

    /// Present only when a user is logged in.
    pub logged_in_probes: &'static [&'static str],
    /// Present only when the login form is shown.
    pub login_form_probes: &'static [&'static str],

    pub username_fields: &'static [&'static str],
    pub password_fields: &'static [&'static str],
    pub login_submit: &'static [&'static str],

    /// One input per code digit; tried before the combined field.
    pub otp_digit_fields: &'static [&'static str],
    /// Single combined code field.
    pub otp_single_fields: &'static [&'static str],
    pub otp_submit: &'static [&'static str],

    /// Confirm controls, including disabled ones.
    pub confirm_button_selectors: &'static [&'static str],
    /// Lowercase substrings identifying a confirm control by its label,
    /// used when no selector matches.
    pub confirm_text_patterns: &'static [&'static str],

    /// Reservation card containers for the per-element strategy.
    pub card_selectors: &'static [&'static str],
    /// Lowercase substrings a card must show to count as awaiting
    /// confirmation.
    pub needs_confirmation_markers: &'static [&'static str],

    /// Accept controls of the secondary confirmation dialog.
    pub dialog_confirm_selectors: &'static [&'static str],
}

impl Default for PortalProfile {
    fn default() -> Self {
        Self {
            portal_url: "https://www.maxjeune-tgvinoui.sncf",
            reservations_url: "https://www.maxjeune-tgvinoui.sncf/sncf-connect/mes-reservations",
            login_url_markers: &["login", "connexion", "signin", "auth"],

            logged_in_probes: &[
                "[data-testid='account-menu']",
                "[class*='user-menu']",
                "a[href*='deconnexion']",
                "button[aria-label*='compte']",
            ],
            login_form_probes: &[
                "form[action*='login']",
                "input[type='password']",
                "[data-testid='login-form']",
            ],

            username_fields: &[
                "input[name='login']",
                "input[name='username']",
                "input[type='email']",
                "#login-email",
            ],
            password_fields: &["input[name='password']", "input[type='password']"],
            login_submit: &[
                "button[type='submit']",
                "button[data-testid='login-submit']",
            ],

            otp_digit_fields: &[
                "input[data-testid='otp-digit']",
                "input[autocomplete='one-time-code'][maxlength='1']",
                "input[maxlength='1'][inputmode='numeric']",
            ],
            otp_single_fields: &[
                "input[name='otp']",
                "input[name='code']",
                "input[autocomplete='one-time-code']",
            ],
            otp_submit: &[
                "button[type='submit']",
                "button[data-testid='otp-submit']",
            ],

            confirm_button_selectors: &[
                "button[data-testid*='confirm']",
                "button[class*='confirm']",
                "button[aria-label*='confirmer']",
            ],
            confirm_text_patterns: &["confirmer", "confirm"],

            card_selectors: &[
                "[data-testid='reservation-card']",
                "article[class*='reservation']",
                "li[class*='travel-card']",
            ],
            needs_confirmation_markers: &["à confirmer", "a confirmer", "confirmation requise"],

            dialog_confirm_selectors: &[
                "[role='dialog'] button[class*='confirm']",
                "[role='dialog'] button[data-testid*='confirm']",
                ".modal button[type='submit']",
            ],
        }
    }
}

impl PortalProfile {
    /// True when `url` looks like the login flow rather than an
    /// authenticated page.
    pub fn is_login_url(&self, url: &str) -> bool {
        let lower = url.to_lowercase();
        self.login_url_markers
            .iter()
            .any(|marker| lower.contains(marker))
    }

    /// True when `label` reads as a confirm control.
    pub fn is_confirm_label(&self, label: &str) -> bool {
        let lower = label.to_lowercase();
        self.confirm_text_patterns
            .iter()
            .any(|pattern| lower.contains(pattern))
    }

    /// True when a card's text marks it as awaiting confirmation.
    pub fn is_needs_confirmation_text(&self, text: &str) -> bool {
        let lower = text.to_lowercase();
        self.needs_confirmation_markers
            .iter()
            .any(|marker| lower.contains(marker))
    }
}

/// Looks up a month number from a (possibly abbreviated) month name.
pub fn month_from_name(name: &str) -> Option<u32> {
    let lower = name.trim().trim_end_matches('.').to_lowercase();
    MONTH_NAMES
        .iter()
        .find(|(known, _)| *known == lower)
        .map(|(_, month)| *month)
}
