#![allow(dead_code)]

use async_trait::async_trait;
use pin_copier::browser::{BrowserError, BrowserSession, Cookie, ElementHandle, Target};
use pin_copier::config::Config;
use pin_copier::pacing::{Pacer, Pacing};
use pin_copier::pin_ref::PinRef;
use pin_copier::saver::{PinSaver, SaveError};
use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

pub fn pin(id: &str) -> PinRef {
    PinRef::parse(id).unwrap()
}

pub fn pin_links(ids: &[&str]) -> Vec<String> {
    ids.iter()
        .map(|id| format!("https://tr.pinterest.com/pin/{id}/"))
        .collect()
}

pub fn test_config(logs_dir: &Path) -> Config {
    let mut cfg = Config::default();
    cfg.app.logs_dir = logs_dir.to_string_lossy().into_owned();
    cfg.boards.source_url = "https://www.pinterest.com/someone/source/".into();
    cfg.boards.target_name = "Target".into();
    cfg.pacing.min_delay_secs = 0.0;
    cfg.pacing.max_delay_secs = 0.0;
    cfg
}

/// Returns immediately and remembers every requested wait. With
/// `cancel_at(n)` the n-th wait cancels the run and never finishes.
#[derive(Clone, Default)]
pub struct RecordingPacer {
    sleeps: Arc<Mutex<Vec<Duration>>>,
    cancel_at: Option<(usize, CancellationToken)>,
}

impl RecordingPacer {
    pub fn cancel_at(n: usize, token: CancellationToken) -> Self {
        Self {
            cancel_at: Some((n, token)),
            ..Default::default()
        }
    }

    pub async fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.lock().await.clone()
    }
}

#[async_trait]
impl Pacer for RecordingPacer {
    async fn sleep(&self, duration: Duration) {
        let n = {
            let mut guard = self.sleeps.lock().await;
            guard.push(duration);
            guard.len()
        };
        if let Some((at, token)) = &self.cancel_at {
            if n == *at {
                token.cancel();
                std::future::pending::<()>().await;
            }
        }
    }
}

pub fn recording_pacing() -> (RecordingPacer, Pacing) {
    let pacer = RecordingPacer::default();
    let pacing = Pacing::new(Arc::new(pacer.clone()), CancellationToken::new());
    (pacer, pacing)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Saved,
    Failed,
    Blocked,
}

/// Answers `save_pin` from a per-pin script; unscripted pins save fine.
#[derive(Clone, Default)]
pub struct ScriptedSaver {
    script: Arc<Mutex<HashMap<String, VecDeque<Step>>>>,
    calls: Arc<Mutex<Vec<(String, String)>>>,
    cancel_after: Option<(usize, CancellationToken)>,
}

impl ScriptedSaver {
    pub fn new(script: Vec<(&str, Vec<Step>)>) -> Self {
        let map = script
            .into_iter()
            .map(|(id, steps)| (id.to_string(), VecDeque::from(steps)))
            .collect();
        Self {
            script: Arc::new(Mutex::new(map)),
            ..Default::default()
        }
    }

    /// Cancel the run while the n-th save is in flight.
    pub fn cancelling_after(mut self, n: usize, token: CancellationToken) -> Self {
        self.cancel_after = Some((n, token));
        self
    }

    pub async fn calls(&self) -> Vec<String> {
        self.calls.lock().await.iter().map(|(id, _)| id.clone()).collect()
    }

    pub async fn boards(&self) -> Vec<String> {
        self.calls.lock().await.iter().map(|(_, b)| b.clone()).collect()
    }
}

#[async_trait]
impl PinSaver for ScriptedSaver {
    async fn save_pin(&self, pin: &PinRef, target_board: &str) -> Result<bool, SaveError> {
        let n = {
            let mut calls = self.calls.lock().await;
            calls.push((pin.id().to_string(), target_board.to_string()));
            calls.len()
        };
        if let Some((at, token)) = &self.cancel_after {
            if n == *at {
                token.cancel();
            }
        }
        let step = self
            .script
            .lock()
            .await
            .get_mut(pin.id())
            .and_then(VecDeque::pop_front)
            .unwrap_or(Step::Saved);
        match step {
            Step::Saved => Ok(true),
            Step::Failed => Ok(false),
            Step::Blocked => Err(SaveError::Blocked("Captcha iframe detected".into())),
        }
    }
}

/// In-memory browser. Link extraction follows a per-step script and then
/// repeats `fallback`; element lookups succeed for targets listed in
/// `present`.
#[derive(Clone)]
pub struct ScriptedBrowser {
    links: Arc<Mutex<VecDeque<Result<Vec<String>, String>>>>,
    fallback: Arc<Mutex<Result<Vec<String>, String>>>,
    present: Arc<Mutex<Vec<Target>>>,
    location: Arc<Mutex<String>>,
    text: Arc<Mutex<String>>,
    pub navigations: Arc<Mutex<Vec<String>>>,
    pub clicks: Arc<Mutex<Vec<String>>>,
    pub extractions: Arc<Mutex<usize>>,
    pub scrolls: Arc<Mutex<usize>>,
}

impl Default for ScriptedBrowser {
    fn default() -> Self {
        Self {
            links: Arc::default(),
            fallback: Arc::new(Mutex::new(Ok(Vec::new()))),
            present: Arc::default(),
            location: Arc::new(Mutex::new("https://www.pinterest.com/pin/1/".into())),
            text: Arc::default(),
            navigations: Arc::default(),
            clicks: Arc::default(),
            extractions: Arc::default(),
            scrolls: Arc::default(),
        }
    }
}

impl ScriptedBrowser {
    pub fn with_links(steps: Vec<Result<Vec<String>, String>>, fallback: Result<Vec<String>, String>) -> Self {
        Self {
            links: Arc::new(Mutex::new(VecDeque::from(steps))),
            fallback: Arc::new(Mutex::new(fallback)),
            ..Default::default()
        }
    }

    pub fn with_page(location: &str, text: &str, present: Vec<Target>) -> Self {
        Self {
            location: Arc::new(Mutex::new(location.into())),
            text: Arc::new(Mutex::new(text.into())),
            present: Arc::new(Mutex::new(present)),
            ..Default::default()
        }
    }

    pub async fn extraction_count(&self) -> usize {
        *self.extractions.lock().await
    }

    pub async fn scroll_count(&self) -> usize {
        *self.scrolls.lock().await
    }

    pub async fn clicked(&self) -> Vec<String> {
        self.clicks.lock().await.clone()
    }
}

#[async_trait]
impl BrowserSession for ScriptedBrowser {
    async fn navigate(&self, url: &str) -> Result<(), BrowserError> {
        self.navigations.lock().await.push(url.to_string());
        Ok(())
    }

    async fn current_location(&self) -> Result<String, BrowserError> {
        Ok(self.location.lock().await.clone())
    }

    async fn page_text(&self) -> Result<String, BrowserError> {
        Ok(self.text.lock().await.clone())
    }

    async fn find_clickable(&self, target: &Target) -> Result<Option<ElementHandle>, BrowserError> {
        let present = self.present.lock().await;
        Ok(present
            .iter()
            .find(|t| *t == target)
            .map(|t| ElementHandle(format!("{t:?}"))))
    }

    async fn click(&self, element: &ElementHandle) -> Result<(), BrowserError> {
        self.clicks.lock().await.push(element.0.clone());
        Ok(())
    }

    async fn send_keys(&self, _element: &ElementHandle, _text: &str) -> Result<(), BrowserError> {
        Ok(())
    }

    async fn link_targets(&self, _fragment: &str) -> Result<Vec<String>, BrowserError> {
        *self.extractions.lock().await += 1;
        let next = self.links.lock().await.pop_front();
        let step = match next {
            Some(step) => step,
            None => self.fallback.lock().await.clone(),
        };
        step.map_err(BrowserError::Transport)
    }

    async fn scroll_by(&self, _pixels: u32) -> Result<(), BrowserError> {
        *self.scrolls.lock().await += 1;
        Ok(())
    }

    async fn scroll_element(&self, _element: &ElementHandle, _pixels: u32) -> Result<(), BrowserError> {
        Ok(())
    }

    async fn cookies(&self) -> Result<Vec<Cookie>, BrowserError> {
        Ok(Vec::new())
    }

    async fn add_cookie(&self, _cookie: &Cookie) -> Result<(), BrowserError> {
        Ok(())
    }

    async fn refresh(&self) -> Result<(), BrowserError> {
        Ok(())
    }

    async fn close(&self) -> Result<(), BrowserError> {
        Ok(())
    }
}
