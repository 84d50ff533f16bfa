//! Saving a single pin to a board.
//!
//! [`PinSaver::save_pin`] answers one of three ways: `Ok(true)` when the pin
//! landed on the board, `Ok(false)` for ordinary failures worth recording, and
//! [`SaveError::Blocked`] when the site is actively refusing automation.
use crate::browser::{BrowserError, BrowserSession, ElementHandle, Target};
use crate::pacing::Pacer;
use crate::pin_ref::PinRef;
use crate::records::{append_lost_pin, LogPaths};
use async_trait::async_trait;
use reqwest::Url;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

const PAGE_SETTLE: Duration = Duration::from_secs(2);
const AFTER_SAVE_CLICK: Duration = Duration::from_secs(1);
const AFTER_SAVED_CLICK: Duration = Duration::from_millis(500);
const AFTER_BOARD_CLICK: Duration = Duration::from_millis(800);
const DIALOG_SCROLL: Duration = Duration::from_millis(300);
const DIALOG_SCROLL_STEPS: u32 = 4;
const DIALOG_SCROLL_PX: u32 = 400;

const LOST_MARKERS: &[&str] = &[
    "sorry! we couldn't find that pin",
    "this pin doesn't exist",
    "pin not found",
    "pin bulunamadı",
];

#[derive(Debug, Error)]
pub enum SaveError {
    #[error("blocked: {0}")]
    Blocked(String),
    #[error("save failed: {0}")]
    Failed(String),
    #[error(transparent)]
    Browser(#[from] BrowserError),
}

#[async_trait]
pub trait PinSaver: Send + Sync {
    async fn save_pin(&self, pin: &PinRef, target_board: &str) -> Result<bool, SaveError>;
}

/// Only strong signals count as a block: a login redirect away from the pin
/// page, or a captcha frame. A merely missing button is an ordinary failure.
pub fn classify_block(location: &str, page_text: &str) -> Option<&'static str> {
    // Only the path counts: login redirects carry the pin in `?next=`.
    let path = Url::parse(location)
        .map(|url| url.path().to_string())
        .unwrap_or_else(|_| location.to_string());
    if path.contains("login") && !path.contains("/pin/") {
        return Some("Redirected to login");
    }
    let text = page_text.to_lowercase();
    if text.contains("<iframe") && (text.contains("hcaptcha") || text.contains("recaptcha")) {
        return Some("Captcha iframe detected");
    }
    None
}

/// A pin page that has been removed, or that bounced back to the home feed.
pub fn looks_lost(location: &str, page_text: &str) -> bool {
    let path = location
        .split_once("pinterest.com")
        .map(|(_, rest)| rest)
        .unwrap_or(location);
    if matches!(path, "" | "/" | "/home" | "/home/") {
        return true;
    }
    let text = page_text.to_lowercase();
    LOST_MARKERS.iter().any(|m| text.contains(m))
}

pub struct BrowserPinSaver {
    browser: Arc<dyn BrowserSession>,
    pacer: Arc<dyn Pacer>,
    paths: LogPaths,
}

impl BrowserPinSaver {
    /// Waits here go through `pacer` directly: a save in flight is never
    /// abandoned halfway.
    pub fn new(browser: Arc<dyn BrowserSession>, pacer: Arc<dyn Pacer>, paths: LogPaths) -> Self {
        Self {
            browser,
            pacer,
            paths,
        }
    }

    async fn check_blocked(&self) -> Result<(), SaveError> {
        let location = self.browser.current_location().await?;
        let text = self.browser.page_text().await?;
        match classify_block(&location, &text) {
            Some(reason) => Err(SaveError::Blocked(reason.to_string())),
            None => Ok(()),
        }
    }

    async fn open_board_dialog(&self) -> Result<Option<ElementHandle>, SaveError> {
        if let Some(dialog) = self.browser.find_clickable(&Target::BoardDialog).await? {
            return Ok(Some(dialog));
        }
        if let Some(see_all) = self.browser.find_clickable(&Target::SeeAllBoards).await? {
            debug!("expanding board list");
            self.browser.click(&see_all).await?;
            self.pacer.sleep(AFTER_SAVE_CLICK).await;
            return Ok(self.browser.find_clickable(&Target::BoardDialog).await?);
        }
        Ok(None)
    }

    async fn select_board(&self, target_board: &str) -> Result<bool, SaveError> {
        let Some(dialog) = self.open_board_dialog().await? else {
            warn!("board dialog did not open");
            return Ok(false);
        };

        // Long board lists render lazily.
        for _ in 0..DIALOG_SCROLL_STEPS {
            if let Err(err) = self.browser.scroll_element(&dialog, DIALOG_SCROLL_PX).await {
                debug!(?err, "dialog scroll failed");
                break;
            }
            self.pacer.sleep(DIALOG_SCROLL).await;
        }

        for exact in [true, false] {
            let target = Target::BoardOption {
                name: target_board.to_string(),
                exact,
            };
            if let Some(option) = self.browser.find_clickable(&target).await? {
                self.browser.click(&option).await?;
                self.pacer.sleep(AFTER_BOARD_CLICK).await;
                debug!(exact, "board selected");
                return Ok(true);
            }
        }
        warn!(board = target_board, "target board not found in dialog");
        Ok(false)
    }
}

#[async_trait]
impl PinSaver for BrowserPinSaver {
    #[instrument(skip(self), fields(pin = %pin))]
    async fn save_pin(&self, pin: &PinRef, target_board: &str) -> Result<bool, SaveError> {
        self.browser.navigate(&pin.url()).await?;
        self.pacer.sleep(PAGE_SETTLE).await;

        let location = self.browser.current_location().await?;
        let text = self.browser.page_text().await?;
        if looks_lost(&location, &text) {
            warn!("pin page no longer exists");
            if let Err(err) = append_lost_pin(&self.paths, pin) {
                warn!(?err, "could not record lost pin");
            }
            return Ok(false);
        }

        if let Some(saved) = self.browser.find_clickable(&Target::SavedButton).await? {
            // Already saved somewhere; reopen the dialog to pick our board.
            self.browser.click(&saved).await?;
            self.pacer.sleep(AFTER_SAVED_CLICK).await;
        } else if let Some(save) = self.browser.find_clickable(&Target::SaveButton).await? {
            self.browser.click(&save).await?;
            self.pacer.sleep(AFTER_SAVE_CLICK).await;
        } else {
            self.check_blocked().await?;
            warn!("save button not found");
            return Ok(false);
        }

        let saved = self.select_board(target_board).await?;
        if saved {
            info!(board = target_board, "pin saved");
        }
        Ok(saved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn login_redirect_is_a_block() {
        assert_eq!(
            classify_block("https://www.pinterest.com/login/?next=/pin/1/", ""),
            Some("Redirected to login")
        );
    }

    #[test]
    fn login_redirect_with_encoded_next_is_a_block() {
        assert_eq!(
            classify_block("https://www.pinterest.com/login/?next=%2Fpin%2F1%2F", ""),
            Some("Redirected to login")
        );
    }

    #[test]
    fn login_in_query_of_pin_page_is_not_a_block() {
        assert_eq!(classify_block("https://www.pinterest.com/pin/1/?ref=login", ""), None);
    }

    #[test]
    fn login_word_on_pin_page_is_not_a_block() {
        assert_eq!(classify_block("https://www.pinterest.com/pin/login-ideas-1/", ""), None);
    }

    #[test]
    fn captcha_frame_is_a_block() {
        let html = r#"<div><IFRAME src="https://hcaptcha.com/x"></iframe></div>"#;
        assert_eq!(
            classify_block("https://www.pinterest.com/pin/1/", html),
            Some("Captcha iframe detected")
        );
    }

    #[test]
    fn captcha_word_without_frame_is_not_a_block() {
        assert_eq!(
            classify_block("https://www.pinterest.com/pin/1/", "we use recaptcha elsewhere"),
            None
        );
    }

    #[test]
    fn lost_pin_detection() {
        assert!(looks_lost("https://www.pinterest.com/", ""));
        assert!(looks_lost("https://tr.pinterest.com/home/", ""));
        assert!(looks_lost(
            "https://www.pinterest.com/pin/1/",
            "<h1>Sorry! We couldn't find that Pin</h1>"
        ));
        assert!(!looks_lost("https://www.pinterest.com/pin/1/", "<button>Save</button>"));
    }
}
