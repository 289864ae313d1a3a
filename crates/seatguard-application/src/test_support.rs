//! Hand-written fakes for the workflow components.
//!
//! `FakePage` models a page as a flat node list with parent links and
//! scripted click effects, which is all the heuristics need: selector
//! queries, subtree text, enabled/visible/present state and a mutable URL.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use seatguard_core::error::{Result, SeatguardError};
use seatguard_core::event::{NotificationSink, RunEvent};
use seatguard_core::otp::OtpChannel;
use seatguard_core::page::{ElementRef, PageFactory, PageHandle};
use seatguard_core::session::{CookieEntry, PortalSession, SessionStore};

// ============================================================================
// FakePage
// ============================================================================

#[derive(Debug, Clone)]
pub struct FakeNode {
    pub id: String,
    pub selectors: Vec<String>,
    pub text: String,
    pub enabled: bool,
    pub displayed: bool,
    pub present: bool,
    pub parent: Option<String>,
    pub attrs: HashMap<String, String>,
}

/// Starts a node builder.
pub fn node(id: &str) -> FakeNode {
    FakeNode {
        id: id.to_string(),
        selectors: vec![],
        text: String::new(),
        enabled: true,
        displayed: true,
        present: true,
        parent: None,
        attrs: HashMap::new(),
    }
}

impl FakeNode {
    pub fn selector(mut self, selector: &str) -> Self {
        self.selectors.push(selector.to_string());
        self
    }

    pub fn text(mut self, text: &str) -> Self {
        self.text = text.to_string();
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    pub fn hidden(mut self) -> Self {
        self.displayed = false;
        self
    }

    /// Node exists in the script but is not on the page yet (revealed by a
    /// click effect).
    pub fn absent(mut self) -> Self {
        self.present = false;
        self
    }

    pub fn child_of(mut self, parent: &str) -> Self {
        self.parent = Some(parent.to_string());
        self
    }

    pub fn attr(mut self, name: &str, value: &str) -> Self {
        self.attrs.insert(name.to_string(), value.to_string());
        self
    }
}

/// What a click on a node does to the fake page.
#[derive(Debug, Clone, Default)]
pub struct ClickEffect {
    pub remove_self: bool,
    pub disable_self: bool,
    pub hide_self: bool,
    pub reveal: Vec<String>,
    pub hide: Vec<String>,
    pub set_url: Option<String>,
}

impl ClickEffect {
    pub fn disable_self() -> Self {
        Self {
            disable_self: true,
            ..Default::default()
        }
    }

    pub fn remove_self() -> Self {
        Self {
            remove_self: true,
            ..Default::default()
        }
    }

    pub fn reveal(ids: &[&str]) -> Self {
        Self {
            reveal: ids.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        }
    }
}

#[derive(Default)]
pub struct FakePageState {
    pub url: String,
    pub nodes: Vec<FakeNode>,
    pub cookies: Vec<CookieEntry>,
    pub local_storage: HashMap<String, String>,
    pub user_agent: String,
    pub clicks: Vec<String>,
    pub fills: Vec<(String, String)>,
    pub gotos: Vec<String>,
    pub screenshots: Vec<PathBuf>,
    pub closed: bool,
    pub click_effects: HashMap<String, ClickEffect>,
    /// Requested-URL substring to the URL the page actually lands on
    /// (silent redirect simulation).
    pub redirects: HashMap<String, String>,
}

impl FakePageState {
    fn find(&self, id: &str) -> Option<&FakeNode> {
        self.nodes.iter().find(|n| n.id == id)
    }

    fn find_mut(&mut self, id: &str) -> Option<&mut FakeNode> {
        self.nodes.iter_mut().find(|n| n.id == id)
    }

    fn is_descendant_of(&self, id: &str, ancestor: &str) -> bool {
        let mut current = self.find(id).and_then(|n| n.parent.clone());
        let mut hops = 0;
        while let Some(parent_id) = current {
            if parent_id == ancestor {
                return true;
            }
            hops += 1;
            if hops > self.nodes.len() {
                break;
            }
            current = self.find(&parent_id).and_then(|n| n.parent.clone());
        }
        false
    }

    /// Own text plus all present descendants' text, document order.
    fn subtree_text(&self, id: &str) -> String {
        let mut parts = vec![];
        if let Some(own) = self.find(id) {
            if !own.text.is_empty() {
                parts.push(own.text.clone());
            }
        }
        for child in &self.nodes {
            if child.present && child.id != id && self.is_descendant_of(&child.id, id) {
                if !child.text.is_empty() {
                    parts.push(child.text.clone());
                }
            }
        }
        parts.join("\n")
    }
}

#[derive(Clone)]
pub struct FakePage {
    state: Arc<Mutex<FakePageState>>,
}

impl FakePage {
    pub fn new() -> Self {
        let state = FakePageState {
            url: "about:blank".to_string(),
            user_agent: "FakeAgent/1.0".to_string(),
            ..Default::default()
        };
        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }

    pub fn add(&self, node: FakeNode) -> &Self {
        self.state.lock().unwrap().nodes.push(node);
        self
    }

    pub fn on_click(&self, id: &str, effect: ClickEffect) -> &Self {
        self.state
            .lock()
            .unwrap()
            .click_effects
            .insert(id.to_string(), effect);
        self
    }

    pub fn redirect(&self, requested_contains: &str, lands_on: &str) -> &Self {
        self.state
            .lock()
            .unwrap()
            .redirects
            .insert(requested_contains.to_string(), lands_on.to_string());
        self
    }

    pub fn state(&self) -> MutexGuard<'_, FakePageState> {
        self.state.lock().unwrap()
    }
}

#[async_trait]
impl PageHandle for FakePage {
    async fn goto(&self, url: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.gotos.push(url.to_string());
        let landed = state
            .redirects
            .iter()
            .find(|(needle, _)| url.contains(needle.as_str()))
            .map(|(_, target)| target.clone())
            .unwrap_or_else(|| url.to_string());
        state.url = landed;
        Ok(())
    }

    async fn current_url(&self) -> Result<String> {
        Ok(self.state.lock().unwrap().url.clone())
    }

    async fn wait_until_settled(&self, _timeout: Duration) -> Result<()> {
        Ok(())
    }

    async fn query(&self, selector: &str) -> Result<Vec<ElementRef>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .nodes
            .iter()
            .filter(|n| n.present && n.selectors.iter().any(|s| s == selector))
            .map(|n| ElementRef::new(n.id.clone()))
            .collect())
    }

    async fn query_within(&self, scope: &ElementRef, selector: &str) -> Result<Vec<ElementRef>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .nodes
            .iter()
            .filter(|n| {
                n.present
                    && n.selectors.iter().any(|s| s == selector)
                    && state.is_descendant_of(&n.id, scope.id())
            })
            .map(|n| ElementRef::new(n.id.clone()))
            .collect())
    }

    async fn parent(&self, element: &ElementRef) -> Result<Option<ElementRef>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .find(element.id())
            .and_then(|n| n.parent.clone())
            .map(ElementRef::new))
    }

    async fn text(&self, element: &ElementRef) -> Result<String> {
        let state = self.state.lock().unwrap();
        Ok(state.subtree_text(element.id()))
    }

    async fn attr(&self, element: &ElementRef, name: &str) -> Result<Option<String>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .find(element.id())
            .and_then(|n| n.attrs.get(name).cloned()))
    }

    async fn is_enabled(&self, element: &ElementRef) -> Result<bool> {
        let state = self.state.lock().unwrap();
        Ok(state
            .find(element.id())
            .map(|n| n.present && n.enabled)
            .unwrap_or(false))
    }

    async fn is_displayed(&self, element: &ElementRef) -> Result<bool> {
        let state = self.state.lock().unwrap();
        Ok(state
            .find(element.id())
            .map(|n| n.present && n.displayed)
            .unwrap_or(false))
    }

    async fn is_present(&self, element: &ElementRef) -> Result<bool> {
        let state = self.state.lock().unwrap();
        Ok(state.find(element.id()).map(|n| n.present).unwrap_or(false))
    }

    async fn click(&self, element: &ElementRef) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        let id = element.id().to_string();
        if state.find(&id).map(|n| !n.present).unwrap_or(true) {
            return Err(SeatguardError::page(format!(
                "stale element reference: {id}"
            )));
        }
        state.clicks.push(id.clone());

        if let Some(effect) = state.click_effects.get(&id).cloned() {
            if let Some(node) = state.find_mut(&id) {
                if effect.remove_self {
                    node.present = false;
                }
                if effect.disable_self {
                    node.enabled = false;
                }
                if effect.hide_self {
                    node.displayed = false;
                }
            }
            for reveal_id in &effect.reveal {
                if let Some(node) = state.find_mut(reveal_id) {
                    node.present = true;
                }
            }
            for hide_id in &effect.hide {
                if let Some(node) = state.find_mut(hide_id) {
                    node.present = false;
                }
            }
            if let Some(url) = effect.set_url {
                state.url = url;
            }
        }
        Ok(())
    }

    async fn fill(&self, element: &ElementRef, text: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        let id = element.id().to_string();
        state.fills.push((id.clone(), text.to_string()));
        if let Some(node) = state.find_mut(&id) {
            node.attrs.insert("value".to_string(), text.to_string());
        }
        Ok(())
    }

    async fn execute(&self, _script: &str, _args: Vec<Value>) -> Result<Value> {
        Ok(Value::Null)
    }

    async fn cookies(&self) -> Result<Vec<CookieEntry>> {
        Ok(self.state.lock().unwrap().cookies.clone())
    }

    async fn set_cookies(&self, cookies: &[CookieEntry]) -> Result<()> {
        self.state
            .lock()
            .unwrap()
            .cookies
            .extend(cookies.iter().cloned());
        Ok(())
    }

    async fn local_storage(&self) -> Result<HashMap<String, String>> {
        Ok(self.state.lock().unwrap().local_storage.clone())
    }

    async fn restore_local_storage(&self, entries: &HashMap<String, String>) -> Result<()> {
        self.state
            .lock()
            .unwrap()
            .local_storage
            .extend(entries.iter().map(|(k, v)| (k.clone(), v.clone())));
        Ok(())
    }

    async fn user_agent(&self) -> Result<String> {
        Ok(self.state.lock().unwrap().user_agent.clone())
    }

    async fn screenshot(&self, path: &Path) -> Result<PathBuf> {
        self.state
            .lock()
            .unwrap()
            .screenshots
            .push(path.to_path_buf());
        Ok(path.to_path_buf())
    }

    async fn close(&self) -> Result<()> {
        self.state.lock().unwrap().closed = true;
        Ok(())
    }
}

/// Hands out pre-scripted pages, one per `open` call.
pub struct FakePageFactory {
    pages: Mutex<VecDeque<FakePage>>,
}

impl FakePageFactory {
    pub fn new(pages: Vec<FakePage>) -> Self {
        Self {
            pages: Mutex::new(pages.into()),
        }
    }
}

#[async_trait]
impl PageFactory for FakePageFactory {
    async fn open(&self) -> Result<Box<dyn PageHandle>> {
        let page = self
            .pages
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| SeatguardError::page("no scripted page left"))?;
        Ok(Box::new(page))
    }
}

// ============================================================================
// Other collaborator fakes
// ============================================================================

pub struct FakeOtpChannel {
    code: Option<String>,
    pub calls: Mutex<u32>,
}

impl FakeOtpChannel {
    pub fn with_code(code: &str) -> Self {
        Self {
            code: Some(code.to_string()),
            calls: Mutex::new(0),
        }
    }

    pub fn empty() -> Self {
        Self {
            code: None,
            calls: Mutex::new(0),
        }
    }
}

#[async_trait]
impl OtpChannel for FakeOtpChannel {
    async fn wait_for_code(&self, max_wait: Duration, _poll: Duration) -> Result<String> {
        *self.calls.lock().unwrap() += 1;
        self.code
            .clone()
            .ok_or(SeatguardError::TwoFactorTimeout {
                waited_secs: max_wait.as_secs(),
            })
    }
}

#[derive(Default)]
pub struct MemorySessionStore {
    pub sessions: Mutex<HashMap<String, PortalSession>>,
    pub cleared: Mutex<Vec<String>>,
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn load(&self, account: &str) -> Result<Option<PortalSession>> {
        let sessions = self.sessions.lock().unwrap();
        match sessions.get(account) {
            Some(session) if session.is_stale(chrono::Utc::now()) => Ok(None),
            other => Ok(other.cloned()),
        }
    }

    async fn save(&self, account: &str, session: &PortalSession) -> Result<()> {
        self.sessions
            .lock()
            .unwrap()
            .insert(account.to_string(), session.clone());
        Ok(())
    }

    async fn clear(&self, account: &str) -> Result<()> {
        self.sessions.lock().unwrap().remove(account);
        self.cleared.lock().unwrap().push(account.to_string());
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingSink {
    pub events: Mutex<Vec<RunEvent>>,
}

#[async_trait]
impl NotificationSink for RecordingSink {
    async fn publish(&self, event: RunEvent) {
        self.events.lock().unwrap().push(event);
    }
}
