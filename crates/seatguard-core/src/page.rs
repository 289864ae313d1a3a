//! Browser capability boundary.
//!
//! The portal is driven entirely through [`PageHandle`], a narrow
//! capability trait covering navigation, queries, interaction and state
//! capture. The authenticator, harvester and workflow never see a browser
//! engine directly, which keeps them testable against a scripted fake.

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::Result;
use crate::session::CookieEntry;

/// Opaque handle to a DOM element owned by a live page.
///
/// The wrapped identifier is only meaningful to the `PageHandle` that
/// produced it and may go stale when the page mutates.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ElementRef(String);

impl ElementRef {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn id(&self) -> &str {
        &self.0
    }
}

/// Capability interface over one live browser page.
///
/// All waits are bounded; a settle wait that times out is not an error,
/// it just means the caller proceeds with whatever the page currently is.
#[async_trait]
pub trait PageHandle: Send + Sync {
    async fn goto(&self, url: &str) -> Result<()>;

    async fn current_url(&self) -> Result<String>;

    /// Waits until the document reports itself settled, or the timeout
    /// elapses. Timeout expiry is not an error.
    async fn wait_until_settled(&self, timeout: Duration) -> Result<()>;

    /// All elements matching a CSS selector, in document order.
    async fn query(&self, selector: &str) -> Result<Vec<ElementRef>>;

    /// Matching descendants of `scope`, in document order.
    async fn query_within(&self, scope: &ElementRef, selector: &str) -> Result<Vec<ElementRef>>;

    /// The parent element, or `None` at the document root.
    async fn parent(&self, element: &ElementRef) -> Result<Option<ElementRef>>;

    /// Visible text content of the element and its descendants.
    async fn text(&self, element: &ElementRef) -> Result<String>;

    async fn attr(&self, element: &ElementRef, name: &str) -> Result<Option<String>>;

    async fn is_enabled(&self, element: &ElementRef) -> Result<bool>;

    async fn is_displayed(&self, element: &ElementRef) -> Result<bool>;

    /// False when the element has been removed from the page or the handle
    /// has gone stale. Never errors for a missing element.
    async fn is_present(&self, element: &ElementRef) -> Result<bool>;

    async fn click(&self, element: &ElementRef) -> Result<()>;

    /// Clears the field and types `text` into it.
    async fn fill(&self, element: &ElementRef, text: &str) -> Result<()>;

    /// Runs a script in the page and returns its JSON result.
    async fn execute(
        &self,
        script: &str,
        args: Vec<serde_json::Value>,
    ) -> Result<serde_json::Value>;

    async fn cookies(&self) -> Result<Vec<CookieEntry>>;

    async fn set_cookies(&self, cookies: &[CookieEntry]) -> Result<()>;

    /// Flat snapshot of the page's localStorage.
    async fn local_storage(&self) -> Result<HashMap<String, String>>;

    async fn restore_local_storage(&self, entries: &HashMap<String, String>) -> Result<()>;

    async fn user_agent(&self) -> Result<String>;

    /// Captures a screenshot to `path` and returns the written path.
    async fn screenshot(&self, path: &Path) -> Result<PathBuf>;

    /// Releases the underlying browser resources. Must be called on every
    /// exit path; dropping the handle does not close the browser.
    async fn close(&self) -> Result<()>;
}

/// Opens a fresh page/browser context per account.
#[async_trait]
pub trait PageFactory: Send + Sync {
    async fn open(&self) -> Result<Box<dyn PageHandle>>;
}
