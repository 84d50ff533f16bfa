//! Scroll-driven pin link collection.
use crate::browser::BrowserSession;
use crate::config::Config;
use crate::error::RunError;
use crate::pacing::Pacing;
use crate::pin_ref::PinRef;
use std::collections::HashSet;
use std::time::Duration;
use tracing::{info, instrument, warn};

const PIN_LINK_FRAGMENT: &str = "/pin/";
const INITIAL_LOAD: Duration = Duration::from_secs(3);
const ERROR_PAUSE: Duration = Duration::from_secs(2);
const MAX_CONSECUTIVE_ERRORS: u32 = 3;
const PROGRESS_EVERY: u32 = 5;

#[derive(Debug, Clone, PartialEq)]
pub struct CollectorSettings {
    pub scroll_step_px: u32,
    pub render_delay: Duration,
    pub no_change_threshold: u32,
    pub max_consecutive_errors: u32,
    pub error_pause: Duration,
    pub initial_load: Duration,
}

impl CollectorSettings {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            scroll_step_px: cfg.pacing.scroll_step_px,
            render_delay: cfg.scroll_pause(),
            no_change_threshold: cfg.pacing.no_change_threshold,
            max_consecutive_errors: MAX_CONSECUTIVE_ERRORS,
            error_pause: ERROR_PAUSE,
            initial_load: INITIAL_LOAD,
        }
    }
}

/// Result of one collection pass.
#[derive(Debug, Clone)]
pub struct Collection {
    /// Deduplicated, in first-seen order.
    pub pins: Vec<PinRef>,
    /// Successful extraction steps performed.
    pub steps: u32,
    /// True when collection stopped because extraction kept failing.
    pub aborted: bool,
}

pub struct LinkCollector<'a> {
    browser: &'a dyn BrowserSession,
    pacing: &'a Pacing,
    settings: CollectorSettings,
}

impl<'a> LinkCollector<'a> {
    pub fn new(browser: &'a dyn BrowserSession, pacing: &'a Pacing, settings: CollectorSettings) -> Self {
        Self {
            browser,
            pacing,
            settings,
        }
    }

    /// Scroll the board in small steps until `no_change_threshold`
    /// consecutive steps add no new pins. There is no cap on the number of
    /// steps; large boards simply take longer.
    #[instrument(skip(self))]
    pub async fn collect(&self, board_url: &str) -> Result<Collection, RunError> {
        info!("collecting pins");
        self.browser
            .navigate(board_url)
            .await
            .map_err(|err| RunError::Collection(format!("{board_url}: {err}")))?;
        self.pacing.pause(self.settings.initial_load).await?;

        let mut seen: HashSet<PinRef> = HashSet::new();
        let mut pins: Vec<PinRef> = Vec::new();
        let mut steps = 0u32;
        let mut no_change = 0u32;
        let mut errors = 0u32;
        let mut aborted = false;

        loop {
            match self.browser.link_targets(PIN_LINK_FRAGMENT).await {
                Ok(links) => {
                    errors = 0;
                    steps += 1;
                    let before = pins.len();
                    for link in links {
                        if let Ok(pin) = PinRef::parse(&link) {
                            if seen.insert(pin.clone()) {
                                pins.push(pin);
                            }
                        }
                    }
                    if pins.len() == before {
                        no_change += 1;
                    } else {
                        no_change = 0;
                    }
                    if steps % PROGRESS_EVERY == 0 {
                        info!(step = steps, pins = pins.len(), "scroll progress");
                    }
                    if no_change >= self.settings.no_change_threshold {
                        info!(step = steps, pins = pins.len(), "no new pins; reached end of board");
                        break;
                    }
                }
                Err(err) => {
                    errors += 1;
                    warn!(?err, consecutive = errors, "pin extraction failed");
                    if errors > self.settings.max_consecutive_errors {
                        warn!(pins = pins.len(), "too many consecutive extraction errors; keeping what was collected");
                        aborted = true;
                        break;
                    }
                    self.pacing.pause(self.settings.error_pause).await?;
                    continue;
                }
            }

            if let Err(err) = self.browser.scroll_by(self.settings.scroll_step_px).await {
                warn!(?err, "scroll failed");
            }
            self.pacing.pause(self.settings.render_delay).await?;
        }

        info!(steps, pins = pins.len(), "collection finished");
        Ok(Collection {
            pins,
            steps,
            aborted,
        })
    }
}
