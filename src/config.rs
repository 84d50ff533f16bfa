//! Configuration loader and validator for the board copier.
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML parse error: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Invalid value in environment variable {0}")]
    Env(&'static str),
    #[error("Invalid configuration: {0}")]
    Invalid(&'static str),
}

/// Root configuration struct mirroring the YAML schema.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub app: App,
    pub browser: Browser,
    pub boards: Boards,
    pub pacing: Pacing,
    pub run: Run,
}

/// App-level settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct App {
    pub logs_dir: String,
    pub cookie_file: String,
}

/// WebDriver session settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Browser {
    pub webdriver_url: String,
    pub headless: bool,
    pub chrome_profile_path: String,
    pub wait_timeout_secs: u64,
}

/// Source and target boards.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Boards {
    pub source_url: String,
    pub target_name: String,
}

/// Timing knobs for scrolling, inter-pin delays and block backoff.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Pacing {
    pub scroll_pause_secs: f64,
    pub scroll_step_px: u32,
    pub no_change_threshold: u32,
    pub min_delay_secs: f64,
    pub max_delay_secs: f64,
    pub block_backoff_secs: Vec<u64>,
}

/// Run bookkeeping intervals.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Run {
    pub checkpoint_interval: usize,
    pub progress_interval: usize,
    pub max_parallel_workers: usize,
}

impl Default for App {
    fn default() -> Self {
        Self {
            logs_dir: "./logs".into(),
            cookie_file: "pinterest_cookies.json".into(),
        }
    }
}

impl Default for Browser {
    fn default() -> Self {
        Self {
            webdriver_url: "http://localhost:9515".into(),
            headless: false,
            chrome_profile_path: String::new(),
            wait_timeout_secs: 5,
        }
    }
}

impl Default for Pacing {
    fn default() -> Self {
        Self {
            scroll_pause_secs: 0.8,
            scroll_step_px: 800,
            no_change_threshold: 3,
            min_delay_secs: 2.0,
            max_delay_secs: 5.0,
            block_backoff_secs: vec![300, 600, 900],
        }
    }
}

impl Default for Run {
    fn default() -> Self {
        Self {
            checkpoint_interval: 100,
            progress_interval: 50,
            max_parallel_workers: 1,
        }
    }
}

impl Config {
    /// Ensure required directories exist (creates `app.logs_dir` if missing).
    pub fn ensure_dirs(&self) -> Result<(), std::io::Error> {
        fs::create_dir_all(self.logs_dir())
    }

    pub fn logs_dir(&self) -> PathBuf {
        PathBuf::from(&self.app.logs_dir)
    }

    pub fn scroll_pause(&self) -> Duration {
        Duration::from_secs_f64(self.pacing.scroll_pause_secs)
    }

    pub fn block_backoff(&self) -> Vec<Duration> {
        self.pacing
            .block_backoff_secs
            .iter()
            .map(|secs| Duration::from_secs(*secs))
            .collect()
    }

    /// Apply the environment variables the tool has always honored on top of
    /// whatever the YAML file provided.
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("SOURCE_BOARD_URL") {
            self.boards.source_url = v;
        }
        if let Some(v) = lookup("TARGET_BOARD_NAME") {
            self.boards.target_name = v;
        }
        if let Some(v) = lookup("CHROME_PROFILE_PATH") {
            self.browser.chrome_profile_path = v;
        }
        if let Some(v) = lookup("WEBDRIVER_URL") {
            self.browser.webdriver_url = v;
        }
        if let Some(v) = lookup("HEADLESS_MODE") {
            self.browser.headless = v.trim().eq_ignore_ascii_case("true");
        }
        if let Some(v) = lookup("SCROLL_PAUSE_TIME") {
            self.pacing.scroll_pause_secs = parse_env("SCROLL_PAUSE_TIME", &v)?;
        }
        if let Some(v) = lookup("RANDOM_DELAY_MIN") {
            self.pacing.min_delay_secs = parse_env("RANDOM_DELAY_MIN", &v)?;
        }
        if let Some(v) = lookup("RANDOM_DELAY_MAX") {
            self.pacing.max_delay_secs = parse_env("RANDOM_DELAY_MAX", &v)?;
        }
        if let Some(v) = lookup("MAX_PARALLEL_WORKERS") {
            self.run.max_parallel_workers = parse_env("MAX_PARALLEL_WORKERS", &v)?;
        }
        Ok(())
    }
}

fn parse_env<T: std::str::FromStr>(key: &'static str, raw: &str) -> Result<T, ConfigError> {
    raw.trim().parse().map_err(|_| ConfigError::Env(key))
}

/// Load configuration from a YAML file, apply environment overrides and
/// validate it.
/// - If `path` is None, uses `config.yaml` in the current working directory.
/// - A missing file is not an error: defaults plus environment are used.
pub fn load(path: Option<&Path>) -> Result<Config, ConfigError> {
    let path = path.unwrap_or_else(|| Path::new("config.yaml"));
    let mut cfg = if path.exists() {
        let content = fs::read_to_string(path)?;
        serde_yaml::from_str(&content)?
    } else {
        info!(path = %path.display(), "config file not found; using defaults and environment");
        Config::default()
    };
    cfg.apply_env_overrides()?;
    validate(&cfg)?;
    if cfg.run.max_parallel_workers > 1 {
        warn!(
            workers = cfg.run.max_parallel_workers,
            "parallel board sessions are not supported; running with a single worker"
        );
    }
    Ok(cfg)
}

/// Validate a configuration instance.
pub fn validate(cfg: &Config) -> Result<(), ConfigError> {
    if cfg.app.logs_dir.trim().is_empty() {
        return Err(ConfigError::Invalid("app.logs_dir must be non-empty"));
    }
    if cfg.app.cookie_file.trim().is_empty() {
        return Err(ConfigError::Invalid("app.cookie_file must be non-empty"));
    }
    if cfg.browser.webdriver_url.trim().is_empty() {
        return Err(ConfigError::Invalid("browser.webdriver_url must be non-empty"));
    }
    if cfg.browser.wait_timeout_secs == 0 || cfg.browser.wait_timeout_secs > 9 {
        return Err(ConfigError::Invalid(
            "browser.wait_timeout_secs must be between 1 and 9",
        ));
    }

    if cfg.boards.source_url.trim().is_empty() {
        return Err(ConfigError::Invalid("boards.source_url (SOURCE_BOARD_URL) is required"));
    }
    if cfg.boards.target_name.trim().is_empty() {
        return Err(ConfigError::Invalid("boards.target_name (TARGET_BOARD_NAME) is required"));
    }

    let p = &cfg.pacing;
    if !(p.scroll_pause_secs > 0.0 && p.scroll_pause_secs.is_finite()) {
        return Err(ConfigError::Invalid("pacing.scroll_pause_secs must be positive and finite"));
    }
    if p.scroll_step_px == 0 {
        return Err(ConfigError::Invalid("pacing.scroll_step_px must be > 0"));
    }
    if p.no_change_threshold == 0 {
        return Err(ConfigError::Invalid("pacing.no_change_threshold must be > 0"));
    }
    if !(p.min_delay_secs >= 0.0 && p.max_delay_secs >= p.min_delay_secs && p.max_delay_secs.is_finite()) {
        return Err(ConfigError::Invalid(
            "pacing.min_delay_secs/max_delay_secs must be finite and satisfy 0 <= min <= max",
        ));
    }
    if p.block_backoff_secs.is_empty() {
        return Err(ConfigError::Invalid("pacing.block_backoff_secs must not be empty"));
    }

    if cfg.run.checkpoint_interval == 0 {
        return Err(ConfigError::Invalid("run.checkpoint_interval must be > 0"));
    }
    if cfg.run.progress_interval == 0 {
        return Err(ConfigError::Invalid("run.progress_interval must be > 0"));
    }
    if cfg.run.max_parallel_workers == 0 {
        return Err(ConfigError::Invalid("run.max_parallel_workers must be >= 1"));
    }

    Ok(())
}

/// Returns the documented example YAML content.
pub fn example() -> &'static str {
    r#"app:
  logs_dir: "./logs"
  cookie_file: "pinterest_cookies.json"

browser:
  webdriver_url: "http://localhost:9515"
  headless: false
  chrome_profile_path: ""
  wait_timeout_secs: 5

boards:
  source_url: "https://www.pinterest.com/someone/recipes/"
  target_name: "Recipes"

pacing:
  scroll_pause_secs: 0.8
  scroll_step_px: 800
  no_change_threshold: 3
  min_delay_secs: 2
  max_delay_secs: 5
  block_backoff_secs: [300, 600, 900]

run:
  checkpoint_interval: 100
  progress_interval: 50
  max_parallel_workers: 1
"#
}
