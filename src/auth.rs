//! Session establishment: credential login, cookie persistence and the
//! logged-in check.
use crate::browser::{BrowserSession, Cookie, Target};
use crate::config::ConfigError;
use crate::error::RunError;
use crate::pacing::Pacing;
use crate::records::{read_json, write_json};
use std::fmt;
use std::path::Path;
use std::time::Duration;
use tracing::{error, info, instrument, warn};

pub const HOME_URL: &str = "https://www.pinterest.com/";
pub const LOGIN_URL: &str = "https://www.pinterest.com/login/";

const LOGIN_FORM_LOAD: Duration = Duration::from_secs(3);
const AFTER_SUBMIT: Duration = Duration::from_secs(5);
const AFTER_COOKIES: Duration = Duration::from_secs(3);
pub const TWO_FACTOR_WAIT: Duration = Duration::from_secs(120);

#[derive(Clone)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

impl Credentials {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup<F: Fn(&str) -> Option<String>>(lookup: F) -> Result<Self, ConfigError> {
        let email = lookup("PINTEREST_EMAIL").filter(|v| !v.trim().is_empty());
        let password = lookup("PINTEREST_PASSWORD").filter(|v| !v.is_empty());
        match (email, password) {
            (Some(email), Some(password)) => Ok(Self { email, password }),
            _ => Err(ConfigError::Invalid(
                "PINTEREST_EMAIL and PINTEREST_PASSWORD must be set for login",
            )),
        }
    }
}

pub fn load_credentials() -> Result<Credentials, ConfigError> {
    Credentials::from_env()
}

/// Logged in means we are on the site and not sitting on the login page.
pub async fn is_logged_in(browser: &dyn BrowserSession) -> Result<bool, RunError> {
    let location = browser.current_location().await?;
    Ok(location.contains("pinterest.") && !location.contains("/login"))
}

/// Fill and submit the login form. If the site asks for a verification code
/// we wait `two_factor_wait` for the operator to enter it by hand.
#[instrument(skip_all, fields(email = %creds.email))]
pub async fn login_with_credentials(
    browser: &dyn BrowserSession,
    pacing: &Pacing,
    creds: &Credentials,
    two_factor_wait: Duration,
) -> Result<bool, RunError> {
    browser.navigate(LOGIN_URL).await?;
    pacing.pause(LOGIN_FORM_LOAD).await?;

    let email = browser
        .find_clickable(&Target::EmailField)
        .await?
        .ok_or_else(|| RunError::Login("email field not found".into()))?;
    browser.send_keys(&email, &creds.email).await?;

    let password = browser
        .find_clickable(&Target::PasswordField)
        .await?
        .ok_or_else(|| RunError::Login("password field not found".into()))?;
    browser.send_keys(&password, &creds.password).await?;

    let submit = browser
        .find_clickable(&Target::LoginSubmit)
        .await?
        .ok_or_else(|| RunError::Login("login button not found".into()))?;
    browser.click(&submit).await?;
    pacing.pause(AFTER_SUBMIT).await?;

    let text = browser.page_text().await?.to_lowercase();
    if text.contains("verification code") || text.contains("doğrulama kodu") {
        warn!(
            wait_secs = two_factor_wait.as_secs(),
            "two-factor verification requested; enter the code in the browser window"
        );
        pacing.pause(two_factor_wait).await?;
        pacing.pause(AFTER_SUBMIT).await?;
    }

    let ok = is_logged_in(browser).await?;
    if ok {
        info!("login succeeded");
    } else {
        error!("login did not complete");
    }
    Ok(ok)
}

pub async fn save_cookies(browser: &dyn BrowserSession, path: &Path) -> Result<usize, RunError> {
    let cookies = browser.cookies().await?;
    write_json(path, &cookies)?;
    info!(count = cookies.len(), path = %path.display(), "cookies saved");
    Ok(cookies.len())
}

/// Restore a saved session. Returns `Ok(false)` when there is no cookie file
/// or the restored session is not logged in.
#[instrument(skip_all, fields(path = %path.display()))]
pub async fn load_cookies(
    browser: &dyn BrowserSession,
    pacing: &Pacing,
    path: &Path,
) -> Result<bool, RunError> {
    let Some(cookies) = read_json::<Vec<Cookie>>(path)? else {
        error!("cookie file not found; run `login` first");
        return Ok(false);
    };

    browser.navigate(HOME_URL).await?;
    pacing.pause(Duration::from_secs(2)).await?;
    let mut added = 0usize;
    for cookie in &cookies {
        match browser.add_cookie(cookie).await {
            Ok(()) => added += 1,
            Err(err) => warn!(name = %cookie.name, ?err, "cookie rejected"),
        }
    }
    browser.refresh().await?;
    pacing.pause(AFTER_COOKIES).await?;

    let ok = is_logged_in(browser).await?;
    info!(added, logged_in = ok, "cookies restored");
    Ok(ok)
}
