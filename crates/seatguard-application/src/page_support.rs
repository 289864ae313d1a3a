//! Small shared helpers over the page capability trait.

use std::path::{Path, PathBuf};
use std::time::Duration;

use seatguard_core::error::Result;
use seatguard_core::page::{ElementRef, PageHandle};
use seatguard_core::profile::{ANCESTOR_SCAN_LIMIT, PortalProfile};

/// Upper bound on page settles after navigation and form submits.
pub(crate) const NAV_SETTLE_TIMEOUT: Duration = Duration::from_secs(10);

/// First element matching any selector in the ranked list.
pub(crate) async fn first_match(
    page: &dyn PageHandle,
    selectors: &[&str],
) -> Result<Option<ElementRef>> {
    for selector in selectors {
        if let Some(element) = page.query(selector).await?.into_iter().next() {
            return Ok(Some(element));
        }
    }
    Ok(None)
}

/// All matches of the first selector in the ranked list that matches
/// anything.
pub(crate) async fn first_nonempty(
    page: &dyn PageHandle,
    selectors: &[&str],
) -> Result<Vec<ElementRef>> {
    for selector in selectors {
        let elements = page.query(selector).await?;
        if !elements.is_empty() {
            return Ok(elements);
        }
    }
    Ok(vec![])
}

/// Every confirm affordance on the page, disabled ones included: ranked
/// selectors first, then a label scan over plain buttons.
pub(crate) async fn find_confirm_controls(
    page: &dyn PageHandle,
    profile: &PortalProfile,
) -> Result<Vec<ElementRef>> {
    let by_selector = first_nonempty(page, profile.confirm_button_selectors).await?;
    if !by_selector.is_empty() {
        return Ok(by_selector);
    }

    let mut by_label = vec![];
    for button in page.query("button").await? {
        let label = page.text(&button).await?;
        if profile.is_confirm_label(&label) {
            by_label.push(button);
        }
    }
    Ok(by_label)
}

/// Ancestor chain of `element`, nearest first, bounded by
/// [`ANCESTOR_SCAN_LIMIT`].
pub(crate) async fn ancestors(
    page: &dyn PageHandle,
    element: &ElementRef,
) -> Result<Vec<ElementRef>> {
    let mut chain = vec![];
    let mut current = element.clone();
    for _ in 0..ANCESTOR_SCAN_LIMIT {
        match page.parent(&current).await? {
            Some(parent) => {
                chain.push(parent.clone());
                current = parent;
            }
            None => break,
        }
    }
    Ok(chain)
}

/// Captures a diagnostic screenshot when a directory is configured.
/// Capture failures are logged and swallowed: diagnostics must never turn
/// a recoverable failure into a fatal one.
pub(crate) async fn capture_diagnostic(
    page: &dyn PageHandle,
    dir: Option<&Path>,
    stage: &str,
    label: &str,
) -> Option<PathBuf> {
    let dir = dir?;
    let stamp = chrono::Utc::now().format("%Y%m%d-%H%M%S");
    let safe_label: String = label
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    let path = dir.join(format!("{stage}-{safe_label}-{stamp}.png"));
    match page.screenshot(&path).await {
        Ok(path) => Some(path),
        Err(err) => {
            tracing::warn!("Could not capture diagnostic screenshot: {err}");
            None
        }
    }
}
