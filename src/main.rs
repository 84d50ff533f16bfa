use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use pin_copier::auth;
use pin_copier::browser::{BrowserError, BrowserSession};
use pin_copier::config::{self, ConfigError};
use pin_copier::controller::{RunContext, RunController, RunOutcome};
use pin_copier::error::RunError;
use pin_copier::pacing::Pacing;
use pin_copier::saver::BrowserPinSaver;
use pin_copier::webdriver::WebDriverClient;

#[derive(Debug, Parser)]
#[command(author, version, about = "Copy every pin from one Pinterest board to another")]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Log in with PINTEREST_EMAIL / PINTEREST_PASSWORD and save the session cookies
    Login,
    /// Copy pins using the saved session cookies
    Copy {
        /// Accept the duplicates currently recorded instead of halting
        #[arg(long)]
        acknowledge_duplicates: bool,
    },
    /// Copy pins using an existing Chrome profile (CHROME_PROFILE_PATH)
    Profile {
        #[arg(long)]
        acknowledge_duplicates: bool,
    },
    /// Retry the pins in the most recent failure record
    Retry,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();

    let args = Args::parse();
    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(%err, "pin-copier failed");
            ExitCode::from(err.exit_code())
        }
    }
}

async fn run(args: Args) -> Result<(), RunError> {
    let cfg = config::load(Some(&args.config))?;
    cfg.ensure_dirs()?;

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received; stopping after the current pin");
            on_signal.cancel();
        }
    });

    let use_profile = matches!(args.command, Command::Profile { .. });
    if use_profile && cfg.browser.chrome_profile_path.trim().is_empty() {
        return Err(ConfigError::Invalid(
            "browser.chrome_profile_path (CHROME_PROFILE_PATH) is required for profile mode",
        )
        .into());
    }

    let ctx = RunContext::new(cfg, Pacing::real(cancel));
    let browser = Arc::new(
        WebDriverClient::connect(&ctx.config.browser, use_profile)
            .await
            .map_err(|err| BrowserError::Transport(format!("{err:#}")))?,
    );

    let result = dispatch(&ctx, browser.clone(), args.command).await;
    if let Err(err) = browser.close().await {
        warn!(?err, "browser did not close cleanly");
    }
    result
}

async fn dispatch(
    ctx: &RunContext,
    browser: Arc<WebDriverClient>,
    command: Command,
) -> Result<(), RunError> {
    let cookie_file = Path::new(&ctx.config.app.cookie_file);
    match command {
        Command::Login => {
            let creds = auth::load_credentials()?;
            if !auth::login_with_credentials(browser.as_ref(), &ctx.pacing, &creds, auth::TWO_FACTOR_WAIT)
                .await?
            {
                return Err(RunError::Login("still on the login page after submitting".into()));
            }
            auth::save_cookies(browser.as_ref(), cookie_file).await?;
            Ok(())
        }
        Command::Copy {
            acknowledge_duplicates,
        } => {
            require_session(ctx, browser.as_ref(), cookie_file).await?;
            copy(ctx, browser, acknowledge_duplicates).await
        }
        Command::Profile {
            acknowledge_duplicates,
        } => {
            if !auth::is_logged_in(browser.as_ref()).await? {
                // A fresh profile lands on about:blank; the home page tells us more.
                browser.navigate(auth::HOME_URL).await?;
                if !auth::is_logged_in(browser.as_ref()).await? {
                    return Err(RunError::Login("the Chrome profile is not logged in".into()));
                }
            }
            copy(ctx, browser, acknowledge_duplicates).await
        }
        Command::Retry => {
            require_session(ctx, browser.as_ref(), cookie_file).await?;
            let saver = BrowserPinSaver::new(browser, ctx.pacing.pacer(), ctx.paths.clone());
            let mut controller = RunController::new(ctx);
            report(controller.run_retry(&saver).await?);
            Ok(())
        }
    }
}

async fn require_session(
    ctx: &RunContext,
    browser: &dyn BrowserSession,
    cookie_file: &Path,
) -> Result<(), RunError> {
    if auth::load_cookies(browser, &ctx.pacing, cookie_file).await? {
        Ok(())
    } else {
        Err(RunError::Login(
            "saved session is missing or expired; run `pin-copier login` first".into(),
        ))
    }
}

async fn copy(
    ctx: &RunContext,
    browser: Arc<WebDriverClient>,
    acknowledge_duplicates: bool,
) -> Result<(), RunError> {
    let saver = BrowserPinSaver::new(browser.clone(), ctx.pacing.pacer(), ctx.paths.clone());
    let mut controller = RunController::new(ctx).acknowledge_duplicates(acknowledge_duplicates);
    report(controller.run_copy(browser.as_ref(), &saver).await?);
    Ok(())
}

fn report(outcome: RunOutcome) {
    match outcome {
        RunOutcome::Completed => info!("done"),
        RunOutcome::NothingToDo => info!("nothing left to copy"),
    }
}
