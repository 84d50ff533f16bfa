use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, Method, Url};
use serde_json::{json, Value};
use std::fmt;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::browser::{BrowserError, BrowserSession, Cookie, ElementHandle, Target};
use crate::config;
use crate::webdriver::model::{
    element_arg, element_ids, FindElements, Locator, NewSessionValue, WireError, WireResponse,
};

pub mod model;

const PAGE_LOAD_TIMEOUT_MS: u64 = 30_000;
/// Upper bound on candidate elements inspected per locator.
const MAX_CANDIDATES: usize = 30;

const LINKS_SCRIPT: &str = "return Array.from(document.querySelectorAll('a[href*=\"' + arguments[0] + '\"]')).map(function (a) { return a.href; });";
const SCROLL_WINDOW_SCRIPT: &str = "window.scrollBy(0, arguments[0]);";
const SCROLL_ELEMENT_SCRIPT: &str = "arguments[0].scrollTop += arguments[1];";
const JS_CLICK_SCRIPT: &str = "arguments[0].scrollIntoView(true); arguments[0].click();";

/// Thin W3C WebDriver client bound to one session on an already running
/// driver (chromedriver).
#[derive(Clone)]
pub struct WebDriverClient {
    http: Client,
    base_url: Url,
    session_id: String,
}

impl fmt::Debug for WebDriverClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WebDriverClient")
            .field("base_url", &self.base_url)
            .field("session_id", &self.session_id)
            .finish_non_exhaustive()
    }
}

/// Chrome capabilities for a new session.
pub fn chrome_capabilities(cfg: &config::Browser, use_profile: bool) -> Value {
    let mut args = vec![
        "--disable-blink-features=AutomationControlled".to_string(),
        "--no-sandbox".to_string(),
        "--disable-dev-shm-usage".to_string(),
        "--disable-gpu".to_string(),
        "--window-size=1920,1080".to_string(),
        "--log-level=3".to_string(),
    ];
    if cfg.headless {
        args.push("--headless=new".to_string());
    }
    if use_profile && !cfg.chrome_profile_path.trim().is_empty() {
        args.push(format!("user-data-dir={}", cfg.chrome_profile_path));
    }
    json!({
        "capabilities": {
            "alwaysMatch": {
                "browserName": "chrome",
                "goog:chromeOptions": {
                    "args": args,
                    "excludeSwitches": ["enable-automation", "enable-logging"],
                    "useAutomationExtension": false
                }
            }
        }
    })
}

impl WebDriverClient {
    /// Open a new session and set the implicit element wait.
    pub async fn connect(cfg: &config::Browser, use_profile: bool) -> Result<Self> {
        let base_url = Url::parse(&ensure_trailing_slash(&cfg.webdriver_url))
            .context("invalid browser.webdriver_url")?;
        let http = Client::builder()
            .user_agent("pin-copier/0.1")
            .no_proxy()
            .build()
            .context("failed to build HTTP client")?;

        let endpoint = base_url.join("session").context("invalid WebDriver base URL")?;
        let res = http
            .post(endpoint)
            .json(&chrome_capabilities(cfg, use_profile))
            .send()
            .await
            .context("failed to reach WebDriver; is chromedriver running?")?;
        let status = res.status();
        let body = res.text().await.context("failed to read new-session response")?;
        if !status.is_success() {
            anyhow::bail!("WebDriver refused new session {}: {}", status, body);
        }
        let wire: WireResponse =
            serde_json::from_str(&body).context("invalid new-session response JSON")?;
        let session: NewSessionValue =
            serde_json::from_value(wire.value).context("new-session response has no sessionId")?;
        info!(session_id = %session.session_id, headless = cfg.headless, "browser session started");

        let client = Self {
            http,
            base_url,
            session_id: session.session_id,
        };
        client
            .set_timeouts(Duration::from_secs(cfg.wait_timeout_secs))
            .await
            .context("failed to configure WebDriver timeouts")?;
        Ok(client)
    }

    pub fn with_session(base_url: Url, session_id: String) -> Self {
        Self {
            http: Client::new(),
            base_url,
            session_id,
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    async fn set_timeouts(&self, implicit: Duration) -> Result<(), BrowserError> {
        self.command(
            Method::POST,
            "timeouts",
            Some(json!({
                "implicit": implicit.as_millis() as u64,
                "pageLoad": PAGE_LOAD_TIMEOUT_MS,
            })),
        )
        .await
        .map(|_| ())
    }

    /// Build a session-scoped command. `path` is relative to
    /// `session/{id}/`; an empty path addresses the session itself.
    pub fn build_command(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<reqwest::Request, BrowserError> {
        let relative = if path.is_empty() {
            format!("session/{}", self.session_id)
        } else {
            format!("session/{}/{}", self.session_id, path)
        };
        let endpoint = self
            .base_url
            .join(&relative)
            .map_err(|e| BrowserError::Transport(format!("invalid command URL: {e}")))?;
        let mut builder = self.http.request(method, endpoint);
        if let Some(body) = body {
            builder = builder.json(body);
        }
        builder
            .build()
            .map_err(|e| BrowserError::Transport(e.to_string()))
    }

    async fn command(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<Value, BrowserError> {
        let request = self.build_command(method, path, body.as_ref())?;
        debug!(method = %request.method(), url = %request.url(), "webdriver command");
        let res = self
            .http
            .execute(request)
            .await
            .map_err(|e| BrowserError::Transport(e.to_string()))?;
        let status = res.status();
        let text = res
            .text()
            .await
            .map_err(|e| BrowserError::Transport(e.to_string()))?;
        parse_response(status.is_success(), &text)
    }

    async fn execute(&self, script: &str, args: Vec<Value>) -> Result<Value, BrowserError> {
        self.command(
            Method::POST,
            "execute/sync",
            Some(json!({ "script": script, "args": args })),
        )
        .await
    }

    async fn find_all(&self, locator: &Locator) -> Result<Vec<String>, BrowserError> {
        let body = serde_json::to_value(FindElements {
            using: locator.strategy(),
            value: locator.selector(),
        })
        .map_err(|e| BrowserError::Response(e.to_string()))?;
        let value = self.command(Method::POST, "elements", Some(body)).await?;
        Ok(element_ids(&value))
    }

    async fn element_flag(&self, id: &str, flag: &str) -> Result<bool, BrowserError> {
        let value = self
            .command(Method::GET, &format!("element/{}/{}", id, flag), None)
            .await?;
        Ok(value.as_bool().unwrap_or(false))
    }
}

/// Turn a raw WebDriver reply into its `value` or a typed error.
pub fn parse_response(success: bool, body: &str) -> Result<Value, BrowserError> {
    let wire: WireResponse = serde_json::from_str(body)
        .map_err(|e| BrowserError::Response(format!("{e}: {body}")))?;
    if success {
        return Ok(wire.value);
    }
    let err: WireError = serde_json::from_value(wire.value)
        .map_err(|e| BrowserError::Response(format!("{e}: {body}")))?;
    if err.error == "timeout" || err.error == "script timeout" {
        return Err(BrowserError::Timeout(err.message));
    }
    Err(BrowserError::Protocol {
        kind: err.error,
        message: err.message,
    })
}

fn ensure_trailing_slash(url: &str) -> String {
    if url.ends_with('/') {
        url.to_string()
    } else {
        format!("{}/", url)
    }
}

/// XPath 1.0 string literal for arbitrary text.
pub fn xpath_literal(text: &str) -> String {
    if !text.contains('\'') {
        format!("'{}'", text)
    } else if !text.contains('"') {
        format!("\"{}\"", text)
    } else {
        let parts: Vec<String> = text.split('\'').map(|p| format!("'{}'", p)).collect();
        format!("concat({})", parts.join(", \"'\", "))
    }
}

const UPPER: &str = "ABCDEFGHIJKLMNOPQRSTUVWXYZ";
const LOWER: &str = "abcdefghijklmnopqrstuvwxyz";

/// Selector list for each target, most specific first. These are the parts
/// expected to need maintenance when the site changes its markup.
pub fn locators(target: &Target) -> Vec<Locator> {
    match target {
        Target::SaveButton => vec![
            Locator::XPath(
                "//button[contains(@aria-label, 'Save') or contains(@aria-label, 'Kaydet')]".into(),
            ),
            Locator::XPath("//button[contains(text(), 'Save') or contains(text(), 'Kaydet')]".into()),
            Locator::XPath(
                "//div[@role='button' and (contains(., 'Save') or contains(., 'Kaydet'))]".into(),
            ),
            Locator::Css("[data-test-id='save-button']".into()),
        ],
        Target::SavedButton => vec![
            Locator::XPath("//button[contains(., 'Saved') or contains(., 'Kaydedildi')]".into()),
            Locator::XPath(
                "//div[@role='button' and (contains(., 'Saved') or contains(., 'Kaydedildi'))]"
                    .into(),
            ),
        ],
        Target::BoardDialog => vec![Locator::XPath("//div[@role='dialog']".into())],
        Target::SeeAllBoards => vec![
            Locator::XPath("//button[contains(text(), 'All') or contains(text(), 'See')]".into()),
            Locator::XPath("//div[contains(@role, 'button') and contains(text(), 'All')]".into()),
        ],
        Target::BoardOption { name, exact } => {
            let wanted = xpath_literal(&name.trim().to_lowercase());
            let text = format!("translate(normalize-space(.), '{}', '{}')", UPPER, LOWER);
            let predicate = if *exact {
                format!("{} = {}", text, wanted)
            } else {
                format!("contains({}, {})", text, wanted)
            };
            vec![Locator::XPath(format!(
                "//div[@role='dialog']//*[text()][{}]",
                predicate
            ))]
        }
        Target::EmailField => vec![Locator::Css("#email".into())],
        Target::PasswordField => vec![Locator::Css("#password".into())],
        Target::LoginSubmit => vec![Locator::XPath("//button[@type='submit']".into())],
    }
}

#[async_trait]
impl BrowserSession for WebDriverClient {
    async fn navigate(&self, url: &str) -> Result<(), BrowserError> {
        self.command(Method::POST, "url", Some(json!({ "url": url })))
            .await
            .map(|_| ())
    }

    async fn current_location(&self) -> Result<String, BrowserError> {
        let value = self.command(Method::GET, "url", None).await?;
        value
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| BrowserError::Response("current URL is not a string".into()))
    }

    async fn page_text(&self) -> Result<String, BrowserError> {
        let value = self.command(Method::GET, "source", None).await?;
        value
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| BrowserError::Response("page source is not a string".into()))
    }

    async fn find_clickable(&self, target: &Target) -> Result<Option<ElementHandle>, BrowserError> {
        for locator in locators(target) {
            let ids = self.find_all(&locator).await?;
            for id in ids.into_iter().take(MAX_CANDIDATES) {
                if self.element_flag(&id, "displayed").await?
                    && self.element_flag(&id, "enabled").await?
                {
                    return Ok(Some(ElementHandle(id)));
                }
            }
        }
        Ok(None)
    }

    async fn click(&self, element: &ElementHandle) -> Result<(), BrowserError> {
        let native = self
            .command(
                Method::POST,
                &format!("element/{}/click", element.0),
                Some(json!({})),
            )
            .await;
        match native {
            Ok(_) => Ok(()),
            // Overlays intercept native clicks on this site; a script click
            // still reaches the element.
            Err(BrowserError::Protocol { kind, .. }) if kind == "element click intercepted" => {
                warn!("native click intercepted; retrying with script click");
                self.execute(JS_CLICK_SCRIPT, vec![element_arg(&element.0)])
                    .await
                    .map(|_| ())
            }
            Err(err) => Err(err),
        }
    }

    async fn send_keys(&self, element: &ElementHandle, text: &str) -> Result<(), BrowserError> {
        self.command(
            Method::POST,
            &format!("element/{}/value", element.0),
            Some(json!({ "text": text })),
        )
        .await
        .map(|_| ())
    }

    async fn link_targets(&self, fragment: &str) -> Result<Vec<String>, BrowserError> {
        let value = self.execute(LINKS_SCRIPT, vec![json!(fragment)]).await?;
        let links = value
            .as_array()
            .map(|items| {
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();
        Ok(links)
    }

    async fn scroll_by(&self, pixels: u32) -> Result<(), BrowserError> {
        self.execute(SCROLL_WINDOW_SCRIPT, vec![json!(pixels)])
            .await
            .map(|_| ())
    }

    async fn scroll_element(&self, element: &ElementHandle, pixels: u32) -> Result<(), BrowserError> {
        self.execute(
            SCROLL_ELEMENT_SCRIPT,
            vec![element_arg(&element.0), json!(pixels)],
        )
        .await
        .map(|_| ())
    }

    async fn cookies(&self) -> Result<Vec<Cookie>, BrowserError> {
        let value = self.command(Method::GET, "cookie", None).await?;
        serde_json::from_value(value).map_err(|e| BrowserError::Response(e.to_string()))
    }

    async fn add_cookie(&self, cookie: &Cookie) -> Result<(), BrowserError> {
        self.command(Method::POST, "cookie", Some(json!({ "cookie": cookie })))
            .await
            .map(|_| ())
    }

    async fn refresh(&self) -> Result<(), BrowserError> {
        self.command(Method::POST, "refresh", Some(json!({})))
            .await
            .map(|_| ())
    }

    async fn close(&self) -> Result<(), BrowserError> {
        self.command(Method::DELETE, "", None).await.map(|_| ())
    }
}
