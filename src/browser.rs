//! UI-automation capability consumed by the collector, saver and login flow.
//!
//! Selectors live behind [`Target`] so callers name *what* they want to click
//! and the session implementation decides *how* to find it.
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BrowserError {
    #[error("webdriver transport error: {0}")]
    Transport(String),
    #[error("webdriver error `{kind}`: {message}")]
    Protocol { kind: String, message: String },
    #[error("timed out waiting for {0}")]
    Timeout(String),
    #[error("unexpected webdriver response: {0}")]
    Response(String),
}

/// Things on a page the automation needs to find.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    SaveButton,
    SavedButton,
    BoardDialog,
    SeeAllBoards,
    /// A board entry inside the save dialog; `exact` disables partial matches.
    BoardOption { name: String, exact: bool },
    EmailField,
    PasswordField,
    LoginSubmit,
}

/// Opaque reference to a located element, valid for the current page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementHandle(pub String);

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Cookie {
    pub name: String,
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secure: Option<bool>,
    #[serde(default, rename = "httpOnly", skip_serializing_if = "Option::is_none")]
    pub http_only: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry: Option<u64>,
    #[serde(default, rename = "sameSite", skip_serializing_if = "Option::is_none")]
    pub same_site: Option<String>,
}

/// A single browser session. Not safe for overlapping use: callers drive it
/// strictly one operation at a time.
#[async_trait]
pub trait BrowserSession: Send + Sync {
    async fn navigate(&self, url: &str) -> Result<(), BrowserError>;

    async fn current_location(&self) -> Result<String, BrowserError>;

    /// Full page source, lowercased matching is left to callers.
    async fn page_text(&self) -> Result<String, BrowserError>;

    /// First visible element for `target`, or `Ok(None)` when it is absent.
    async fn find_clickable(&self, target: &Target) -> Result<Option<ElementHandle>, BrowserError>;

    async fn click(&self, element: &ElementHandle) -> Result<(), BrowserError>;

    async fn send_keys(&self, element: &ElementHandle, text: &str) -> Result<(), BrowserError>;

    /// `href` of every rendered anchor whose link contains `fragment`.
    async fn link_targets(&self, fragment: &str) -> Result<Vec<String>, BrowserError>;

    async fn scroll_by(&self, pixels: u32) -> Result<(), BrowserError>;

    /// Scroll inside a scrollable element (e.g. the board dialog).
    async fn scroll_element(&self, element: &ElementHandle, pixels: u32) -> Result<(), BrowserError>;

    async fn cookies(&self) -> Result<Vec<Cookie>, BrowserError>;

    async fn add_cookie(&self, cookie: &Cookie) -> Result<(), BrowserError>;

    async fn refresh(&self) -> Result<(), BrowserError>;

    async fn close(&self) -> Result<(), BrowserError>;
}
