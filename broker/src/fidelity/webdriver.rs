//! Minimal blocking W3C WebDriver client (chromedriver, geckodriver).
//!
//! Only the commands the Fidelity session needs: navigation, element lookup
//! and interaction, script execution, and screenshots.

use std::thread;
use std::time::{Duration, Instant};

use data_encoding::BASE64;
use log::{debug, warn};
use reqwest::Method;
use reqwest::blocking::Client;
use serde_json::{Value, json};

use crate::error::BrokerError;

/// W3C element reference key.
const ELEMENT_KEY: &str = "element-6066-11e4-a52f-4d737a3f2d8b";

/// Key code for Enter/Return in `send_keys`.
pub const KEY_RETURN: char = '\u{E006}';

const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Element locator.
#[derive(Clone, Debug)]
pub enum By {
    Css(String),
    XPath(String),
}

impl By {
    pub fn css(selector: &str) -> Self {
        By::Css(selector.to_string())
    }

    pub fn xpath(path: &str) -> Self {
        By::XPath(path.to_string())
    }

    fn to_json(&self) -> Value {
        match self {
            By::Css(s) => json!({ "using": "css selector", "value": s }),
            By::XPath(s) => json!({ "using": "xpath", "value": s }),
        }
    }

    fn describe(&self) -> &str {
        match self {
            By::Css(s) | By::XPath(s) => s,
        }
    }
}

/// Opaque handle on a located element. Goes stale when the page re-renders.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Element(String);

impl Element {
    /// JSON form used to pass the element as a script argument.
    pub fn as_arg(&self) -> Value {
        json!({ ELEMENT_KEY: self.0 })
    }
}

/// One browser session on a WebDriver server.
pub struct WebDriver {
    client: Client,
    base_url: String,
    session_id: String,
    closed: bool,
}

impl WebDriver {
    /// Start a new Chrome session on the server at `base_url`.
    pub fn start(base_url: &str, headless: bool, http_timeout: Duration) -> Result<Self, BrokerError> {
        let client = Client::builder()
            .timeout(http_timeout)
            .build()
            .map_err(|e| BrokerError::Connection(format!("failed to build HTTP client: {e}")))?;
        let base_url = base_url.trim_end_matches('/').to_string();

        let mut args = vec![
            "--disable-blink-features=AutomationControlled",
            "--disable-dev-shm-usage",
            "--no-sandbox",
            "--window-size=1920,1080",
        ];
        if headless {
            args.push("--headless=new");
        }
        let body = json!({
            "capabilities": {
                "alwaysMatch": {
                    "browserName": "chrome",
                    "goog:chromeOptions": { "args": args }
                }
            }
        });

        let value = send(&client, Method::POST, &format!("{base_url}/session"), Some(body))
            .map_err(|e| BrokerError::Connection(format!("could not start browser: {e}")))?;
        let session_id = value
            .get("sessionId")
            .and_then(Value::as_str)
            .ok_or_else(|| BrokerError::Parse("new session response had no sessionId".into()))?
            .to_string();

        debug!("WebDriver session {session_id} started at {base_url}");
        Ok(Self {
            client,
            base_url,
            session_id,
            closed: false,
        })
    }

    fn command(&self, method: Method, path: &str, body: Option<Value>) -> Result<Value, BrokerError> {
        if self.closed {
            return Err(BrokerError::NotConnected);
        }
        let url = format!("{}/session/{}{}", self.base_url, self.session_id, path);
        send(&self.client, method, &url, body)
    }

    /// Close the browser. Safe to call twice.
    pub fn quit(&mut self) -> Result<(), BrokerError> {
        if self.closed {
            return Ok(());
        }
        let result = self.command(Method::DELETE, "", None).map(|_| ());
        self.closed = true;
        result
    }

    pub fn goto(&self, url: &str) -> Result<(), BrokerError> {
        self.command(Method::POST, "/url", Some(json!({ "url": url })))?;
        Ok(())
    }

    pub fn current_url(&self) -> Result<String, BrokerError> {
        let value = self.command(Method::GET, "/url", None)?;
        value
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| BrokerError::Parse("current url was not a string".into()))
    }

    pub fn find(&self, by: &By) -> Result<Element, BrokerError> {
        let value = self.command(Method::POST, "/element", Some(by.to_json()))?;
        element_from(&value)
    }

    /// Like `find`, but a missing element is `Ok(None)`.
    pub fn try_find(&self, by: &By) -> Result<Option<Element>, BrokerError> {
        match self.find(by) {
            Ok(el) => Ok(Some(el)),
            Err(BrokerError::Element(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub fn find_all_in(&self, parent: &Element, by: &By) -> Result<Vec<Element>, BrokerError> {
        let value = self.command(
            Method::POST,
            &format!("/element/{}/elements", parent.0),
            Some(by.to_json()),
        )?;
        value
            .as_array()
            .ok_or_else(|| BrokerError::Parse("elements response was not an array".into()))?
            .iter()
            .map(element_from)
            .collect()
    }

    pub fn click(&self, el: &Element) -> Result<(), BrokerError> {
        self.command(Method::POST, &format!("/element/{}/click", el.0), Some(json!({})))?;
        Ok(())
    }

    /// Click through script; works on elements hidden behind overlays.
    pub fn js_click(&self, el: &Element) -> Result<(), BrokerError> {
        self.execute("arguments[0].click();", vec![el.as_arg()])?;
        Ok(())
    }

    pub fn clear(&self, el: &Element) -> Result<(), BrokerError> {
        self.command(Method::POST, &format!("/element/{}/clear", el.0), Some(json!({})))?;
        Ok(())
    }

    pub fn send_keys(&self, el: &Element, text: &str) -> Result<(), BrokerError> {
        self.command(
            Method::POST,
            &format!("/element/{}/value", el.0),
            Some(json!({ "text": text })),
        )?;
        Ok(())
    }

    /// Type one character at a time; some login forms drop bulk input.
    pub fn type_slowly(&self, el: &Element, text: &str, delay: Duration) -> Result<(), BrokerError> {
        let mut buf = [0u8; 4];
        for ch in text.chars() {
            self.send_keys(el, ch.encode_utf8(&mut buf))?;
            thread::sleep(delay);
        }
        Ok(())
    }

    pub fn text(&self, el: &Element) -> Result<String, BrokerError> {
        let value = self.command(Method::GET, &format!("/element/{}/text", el.0), None)?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    fn is_clickable(&self, el: &Element) -> Result<bool, BrokerError> {
        let displayed = self.command(Method::GET, &format!("/element/{}/displayed", el.0), None)?;
        let enabled = self.command(Method::GET, &format!("/element/{}/enabled", el.0), None)?;
        Ok(displayed.as_bool().unwrap_or(false) && enabled.as_bool().unwrap_or(false))
    }

    pub fn execute(&self, script: &str, args: Vec<Value>) -> Result<Value, BrokerError> {
        self.command(
            Method::POST,
            "/execute/sync",
            Some(json!({ "script": script, "args": args })),
        )
    }

    /// PNG bytes of the current viewport.
    pub fn screenshot_png(&self) -> Result<Vec<u8>, BrokerError> {
        let value = self.command(Method::GET, "/screenshot", None)?;
        let encoded = value
            .as_str()
            .ok_or_else(|| BrokerError::Parse("screenshot was not a string".into()))?;
        BASE64
            .decode(encoded.as_bytes())
            .map_err(|e| BrokerError::Parse(format!("screenshot was not base64: {e}")))
    }

    /// Poll `condition` until it holds or `timeout` passes.
    ///
    /// Element-not-found errors inside the condition count as "not yet".
    pub fn wait_until<F>(&self, timeout: Duration, what: &str, mut condition: F) -> Result<(), BrokerError>
    where
        F: FnMut(&Self) -> Result<bool, BrokerError>,
    {
        let start = Instant::now();
        loop {
            match condition(self) {
                Ok(true) => return Ok(()),
                Ok(false) | Err(BrokerError::Element(_)) => {}
                Err(e) => return Err(e),
            }
            if start.elapsed() >= timeout {
                return Err(BrokerError::Timeout(format!(
                    "{what} after {}s",
                    timeout.as_secs()
                )));
            }
            thread::sleep(POLL_INTERVAL);
        }
    }

    /// Wait for `document.readyState == "complete"`.
    pub fn wait_page_loaded(&self, timeout: Duration) -> Result<(), BrokerError> {
        self.wait_until(timeout, "page load", |d| {
            let state = d.execute("return document.readyState;", vec![])?;
            Ok(state.as_str() == Some("complete"))
        })
    }

    /// Wait until the element exists, then return it.
    pub fn wait_for(&self, by: &By, timeout: Duration) -> Result<Element, BrokerError> {
        let mut found = None;
        self.wait_until(timeout, by.describe(), |d| {
            found = d.try_find(by)?;
            Ok(found.is_some())
        })?;
        found.ok_or_else(|| BrokerError::Element(by.describe().to_string()))
    }

    /// Wait until the element exists, is displayed and enabled.
    pub fn wait_clickable(&self, by: &By, timeout: Duration) -> Result<Element, BrokerError> {
        let mut found = None;
        self.wait_until(timeout, by.describe(), |d| {
            let Some(el) = d.try_find(by)? else {
                return Ok(false);
            };
            let ready = d.is_clickable(&el)?;
            found = Some(el);
            Ok(ready)
        })?;
        found.ok_or_else(|| BrokerError::Element(by.describe().to_string()))
    }

    pub fn wait_url_contains(&self, fragment: &str, timeout: Duration) -> Result<(), BrokerError> {
        self.wait_until(timeout, &format!("url containing {fragment:?}"), |d| {
            Ok(d.current_url()?.contains(fragment))
        })
    }
}

impl Drop for WebDriver {
    fn drop(&mut self) {
        if let Err(e) = self.quit() {
            warn!("WebDriver session {} did not close cleanly: {e}", self.session_id);
        }
    }
}

/// Send one command and unwrap the `value` member of the response.
fn send(client: &Client, method: Method, url: &str, body: Option<Value>) -> Result<Value, BrokerError> {
    let mut request = client.request(method, url);
    if let Some(body) = body {
        request = request.json(&body);
    }
    let resp = request
        .send()
        .map_err(|e| BrokerError::Connection(format!("webdriver request failed: {e}")))?;
    let status = resp.status();
    let payload: Value = resp
        .json()
        .map_err(|e| BrokerError::Parse(format!("webdriver returned non-JSON ({status}): {e}")))?;
    let value = payload.get("value").cloned().unwrap_or(Value::Null);

    if status.is_success() {
        return Ok(value);
    }
    Err(command_error(&value))
}

/// Map a WebDriver error body to a `BrokerError`.
pub(crate) fn command_error(value: &Value) -> BrokerError {
    let kind = value.get("error").and_then(Value::as_str).unwrap_or("unknown error");
    let message = value.get("message").and_then(Value::as_str).unwrap_or_default();
    match kind {
        "no such element" | "stale element reference" | "element not interactable"
        | "element click intercepted" => BrokerError::Element(format!("{kind}: {message}")),
        "timeout" | "script timeout" => BrokerError::Timeout(message.to_string()),
        "invalid session id" => BrokerError::NotConnected,
        _ => BrokerError::Connection(format!("{kind}: {message}")),
    }
}

fn element_from(value: &Value) -> Result<Element, BrokerError> {
    value
        .get(ELEMENT_KEY)
        .and_then(Value::as_str)
        .map(|id| Element(id.to_string()))
        .ok_or_else(|| BrokerError::Parse("response did not contain an element reference".into()))
}
