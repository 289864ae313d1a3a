//! WebDriver-backed implementation of the page capability trait.
//!
//! Talks the W3C WebDriver REST protocol to a locally running driver
//! (chromedriver). Each account gets its own driver session, opened via
//! [`WebDriverFactory`] and torn down explicitly with `close`.

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use reqwest::{Client, Method};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use seatguard_core::error::{Result, SeatguardError};
use seatguard_core::page::{ElementRef, PageFactory, PageHandle};
use seatguard_core::retry::RetryPolicy;
use seatguard_core::session::CookieEntry;

/// W3C element identifier key in WebDriver payloads.
const ELEMENT_KEY: &str = "element-6066-11e4-a52e-4f735466cecf";

/// How often the settle wait re-checks `document.readyState`.
const SETTLE_POLL: Duration = Duration::from_millis(100);

/// Grace period after `readyState` turns complete, for late scripts that
/// rewrite the page right after load.
const SETTLE_GRACE: Duration = Duration::from_millis(250);

/// Cookie as it crosses the WebDriver wire.
#[derive(Debug, Serialize, Deserialize)]
struct WireCookie {
    name: String,
    value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    domain: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    path: Option<String>,
    #[serde(default)]
    secure: bool,
    #[serde(default, rename = "httpOnly")]
    http_only: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    expiry: Option<i64>,
}

impl From<WireCookie> for CookieEntry {
    fn from(wire: WireCookie) -> Self {
        CookieEntry {
            name: wire.name,
            value: wire.value,
            domain: wire.domain,
            path: wire.path,
            secure: wire.secure,
            http_only: wire.http_only,
            expiry: wire.expiry,
        }
    }
}

impl From<&CookieEntry> for WireCookie {
    fn from(cookie: &CookieEntry) -> Self {
        WireCookie {
            name: cookie.name.clone(),
            value: cookie.value.clone(),
            domain: cookie.domain.clone(),
            path: cookie.path.clone(),
            secure: cookie.secure,
            http_only: cookie.http_only,
            expiry: cookie.expiry,
        }
    }
}

/// Opens one WebDriver session per account.
pub struct WebDriverFactory {
    client: Client,
    driver_url: String,
    headless: bool,
}

impl WebDriverFactory {
    pub fn new(driver_url: impl Into<String>, headless: bool) -> Self {
        let driver_url: String = driver_url.into();
        Self {
            client: Client::new(),
            driver_url: driver_url.trim_end_matches('/').to_string(),
            headless,
        }
    }

    async fn new_session(&self) -> Result<String> {
        let mut args = vec![
            "--disable-gpu".to_string(),
            "--window-size=1400,1000".to_string(),
            "--disable-blink-features=AutomationControlled".to_string(),
        ];
        if self.headless {
            args.push("--headless=new".to_string());
        }

        let body = json!({
            "capabilities": {
                "alwaysMatch": {
                    "browserName": "chrome",
                    "goog:chromeOptions": { "args": args }
                }
            }
        });

        let response = self
            .client
            .post(format!("{}/session", self.driver_url))
            .json(&body)
            .send()
            .await
            .map_err(|err| {
                SeatguardError::page(format!("Failed to reach WebDriver endpoint: {err}"))
            })?;

        let status = response.status();
        let payload: Value = response
            .json()
            .await
            .map_err(|err| SeatguardError::page(format!("Invalid WebDriver response: {err}")))?;

        if !status.is_success() {
            return Err(wire_error(&payload));
        }

        payload
            .pointer("/value/sessionId")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| SeatguardError::page("WebDriver session response without sessionId"))
    }
}

#[async_trait]
impl PageFactory for WebDriverFactory {
    async fn open(&self) -> Result<Box<dyn PageHandle>> {
        // The driver process may still be warming up when the run starts.
        let policy = RetryPolicy::new(3, Duration::from_millis(500));
        let session_id = policy.run("webdriver session", || self.new_session()).await?;
        tracing::debug!("Opened WebDriver session {session_id}");
        Ok(Box::new(WebDriverPage {
            client: self.client.clone(),
            session_url: format!("{}/session/{}", self.driver_url, session_id),
        }))
    }
}

/// One live WebDriver session.
pub struct WebDriverPage {
    client: Client,
    session_url: String,
}

impl WebDriverPage {
    /// Issues one WebDriver command and unwraps the `value` envelope.
    async fn command(&self, method: Method, path: &str, body: Option<Value>) -> Result<Value> {
        let url = format!("{}{}", self.session_url, path);
        let mut request = self.client.request(method.clone(), &url);
        if method == Method::POST {
            // W3C requires a JSON body on every POST, even an empty one.
            request = request.json(&body.unwrap_or_else(|| json!({})));
        }

        let response = request
            .send()
            .await
            .map_err(|err| SeatguardError::page(format!("WebDriver request failed: {err}")))?;

        let status = response.status();
        let payload: Value = response
            .json()
            .await
            .map_err(|err| SeatguardError::page(format!("Invalid WebDriver response: {err}")))?;

        if !status.is_success() {
            return Err(wire_error(&payload));
        }
        Ok(payload.get("value").cloned().unwrap_or(Value::Null))
    }

    fn element_path(element: &ElementRef, tail: &str) -> String {
        format!("/element/{}{}", element.id(), tail)
    }

    fn element_arg(element: &ElementRef) -> Value {
        json!({ ELEMENT_KEY: element.id() })
    }

    /// Element probes where absence is an answer, not an error.
    async fn probe(&self, element: &ElementRef, tail: &str) -> Result<Option<Value>> {
        match self
            .command(Method::GET, &Self::element_path(element, tail), None)
            .await
        {
            Ok(value) => Ok(Some(value)),
            Err(err) if is_gone_error(&err) => Ok(None),
            Err(err) => Err(err),
        }
    }
}

/// Maps a WebDriver error envelope to a page error, keeping the protocol
/// error code in the message for `is_gone_error` to classify.
fn wire_error(payload: &Value) -> SeatguardError {
    let error = payload
        .pointer("/value/error")
        .and_then(Value::as_str)
        .unwrap_or("unknown error");
    let message = payload
        .pointer("/value/message")
        .and_then(Value::as_str)
        .unwrap_or("");
    SeatguardError::page(format!("{error}: {message}"))
}

/// True when the error means the element no longer exists on the page.
fn is_gone_error(err: &SeatguardError) -> bool {
    match err {
        SeatguardError::Page(message) => {
            message.contains("stale element reference") || message.contains("no such element")
        }
        _ => false,
    }
}

fn parse_elements(value: &Value) -> Vec<ElementRef> {
    value
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(|item| item.get(ELEMENT_KEY))
                .filter_map(Value::as_str)
                .map(ElementRef::new)
                .collect()
        })
        .unwrap_or_default()
}

#[async_trait]
impl PageHandle for WebDriverPage {
    async fn goto(&self, url: &str) -> Result<()> {
        self.command(Method::POST, "/url", Some(json!({ "url": url })))
            .await?;
        Ok(())
    }

    async fn current_url(&self) -> Result<String> {
        let value = self.command(Method::GET, "/url", None).await?;
        value
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| SeatguardError::page("WebDriver returned a non-string URL"))
    }

    async fn wait_until_settled(&self, timeout: Duration) -> Result<()> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let state = self
                .execute("return document.readyState;", vec![])
                .await
                .ok()
                .and_then(|value| value.as_str().map(str::to_string));
            if state.as_deref() == Some("complete") {
                tokio::time::sleep(SETTLE_GRACE).await;
                return Ok(());
            }
            if tokio::time::Instant::now() >= deadline {
                // A page that never settles is handled by the caller's
                // probes, not here.
                tracing::debug!("Settle wait expired after {timeout:?}");
                return Ok(());
            }
            tokio::time::sleep(SETTLE_POLL).await;
        }
    }

    async fn query(&self, selector: &str) -> Result<Vec<ElementRef>> {
        let value = self
            .command(
                Method::POST,
                "/elements",
                Some(json!({ "using": "css selector", "value": selector })),
            )
            .await?;
        Ok(parse_elements(&value))
    }

    async fn query_within(&self, scope: &ElementRef, selector: &str) -> Result<Vec<ElementRef>> {
        let value = match self
            .command(
                Method::POST,
                &Self::element_path(scope, "/elements"),
                Some(json!({ "using": "css selector", "value": selector })),
            )
            .await
        {
            Ok(value) => value,
            Err(err) if is_gone_error(&err) => return Ok(vec![]),
            Err(err) => return Err(err),
        };
        Ok(parse_elements(&value))
    }

    async fn parent(&self, element: &ElementRef) -> Result<Option<ElementRef>> {
        let value = self
            .execute(
                "return arguments[0].parentElement;",
                vec![Self::element_arg(element)],
            )
            .await?;
        Ok(value
            .get(ELEMENT_KEY)
            .and_then(Value::as_str)
            .map(ElementRef::new))
    }

    async fn text(&self, element: &ElementRef) -> Result<String> {
        let value = self
            .command(Method::GET, &Self::element_path(element, "/text"), None)
            .await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    async fn attr(&self, element: &ElementRef, name: &str) -> Result<Option<String>> {
        let value = self
            .command(
                Method::GET,
                &Self::element_path(element, &format!("/attribute/{name}")),
                None,
            )
            .await?;
        Ok(value.as_str().map(str::to_string))
    }

    async fn is_enabled(&self, element: &ElementRef) -> Result<bool> {
        let value = self
            .command(Method::GET, &Self::element_path(element, "/enabled"), None)
            .await?;
        Ok(value.as_bool().unwrap_or(false))
    }

    async fn is_displayed(&self, element: &ElementRef) -> Result<bool> {
        let value = self
            .command(Method::GET, &Self::element_path(element, "/displayed"), None)
            .await?;
        Ok(value.as_bool().unwrap_or(false))
    }

    async fn is_present(&self, element: &ElementRef) -> Result<bool> {
        Ok(self.probe(element, "/enabled").await?.is_some())
    }

    async fn click(&self, element: &ElementRef) -> Result<()> {
        self.command(Method::POST, &Self::element_path(element, "/click"), None)
            .await?;
        Ok(())
    }

    async fn fill(&self, element: &ElementRef, text: &str) -> Result<()> {
        self.command(Method::POST, &Self::element_path(element, "/clear"), None)
            .await?;
        self.command(
            Method::POST,
            &Self::element_path(element, "/value"),
            Some(json!({ "text": text })),
        )
        .await?;
        Ok(())
    }

    async fn execute(&self, script: &str, args: Vec<Value>) -> Result<Value> {
        self.command(
            Method::POST,
            "/execute/sync",
            Some(json!({ "script": script, "args": args })),
        )
        .await
    }

    async fn cookies(&self) -> Result<Vec<CookieEntry>> {
        let value = self.command(Method::GET, "/cookie", None).await?;
        let wires: Vec<WireCookie> = serde_json::from_value(value)?;
        Ok(wires.into_iter().map(CookieEntry::from).collect())
    }

    async fn set_cookies(&self, cookies: &[CookieEntry]) -> Result<()> {
        for cookie in cookies {
            let wire = WireCookie::from(cookie);
            if let Err(err) = self
                .command(Method::POST, "/cookie", Some(json!({ "cookie": wire })))
                .await
            {
                // The portal rotates cookie names; rejecting one entry must
                // not abort the whole restore.
                tracing::warn!("Could not restore cookie '{}': {err}", cookie.name);
            }
        }
        Ok(())
    }

    async fn local_storage(&self) -> Result<HashMap<String, String>> {
        let value = self
            .execute(
                "var out = {}; \
                 for (var i = 0; i < localStorage.length; i++) { \
                   var key = localStorage.key(i); \
                   out[key] = localStorage.getItem(key); \
                 } \
                 return out;",
                vec![],
            )
            .await?;
        Ok(serde_json::from_value(value).unwrap_or_default())
    }

    async fn restore_local_storage(&self, entries: &HashMap<String, String>) -> Result<()> {
        if entries.is_empty() {
            return Ok(());
        }
        self.execute(
            "var entries = arguments[0]; \
             for (var key in entries) { localStorage.setItem(key, entries[key]); }",
            vec![serde_json::to_value(entries)?],
        )
        .await?;
        Ok(())
    }

    async fn user_agent(&self) -> Result<String> {
        let value = self.execute("return navigator.userAgent;", vec![]).await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    async fn screenshot(&self, path: &Path) -> Result<PathBuf> {
        let value = self.command(Method::GET, "/screenshot", None).await?;
        let encoded = value
            .as_str()
            .ok_or_else(|| SeatguardError::page("WebDriver screenshot was not a string"))?;
        let bytes = BASE64_STANDARD
            .decode(encoded)
            .map_err(|err| SeatguardError::page(format!("Invalid screenshot payload: {err}")))?;

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(path, bytes).await?;
        Ok(path.to_path_buf())
    }

    async fn close(&self) -> Result<()> {
        self.command(Method::DELETE, "", None).await?;
        Ok(())
    }
}
