//! CLI entry point for the sciaccess tool.

use std::env;
use std::fs::OpenOptions;
use std::path::Path;
use std::process::ExitCode;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use sciaccess_core::config::{DEFAULT_IDP_ENTITY, DEFAULT_SSO_ENDPOINT, build_sso_login_url};
use sciaccess_core::{AccessError, AccessorConfig, Credentials, DriverFactory, PaperAccessor, PaperRecord};
use tracing::{debug, error, info, warn};

mod app_config;
mod cli;

use app_config::FileConfig;
use cli::Args;

const USERNAME_ENV: &str = "SCIACCESS_USERNAME";
const PASSWORD_ENV: &str = "SCIACCESS_PASSWORD";
const SUMMARY_ABSTRACT_CHARS: usize = 200;

/// Process outcome mapped to the exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ProcessExit {
    /// Every requested article was retrieved.
    Success,
    /// Some articles were retrieved, some failed.
    Partial,
    /// Nothing was retrieved.
    Failure,
}

impl From<ProcessExit> for ExitCode {
    fn from(outcome: ProcessExit) -> Self {
        match outcome {
            ProcessExit::Success => ExitCode::SUCCESS,
            ProcessExit::Partial => ExitCode::from(1),
            ProcessExit::Failure => ExitCode::from(2),
        }
    }
}

fn determine_exit_outcome(completed: usize, failed: usize) -> ProcessExit {
    if failed == 0 {
        ProcessExit::Success
    } else if completed > 0 {
        ProcessExit::Partial
    } else {
        ProcessExit::Failure
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = Args::parse();

    let loaded = app_config::load_file_config_from(args.config.as_deref())?;
    let file = loaded.config.unwrap_or_default();

    // Priority: RUST_LOG env var > quiet flag > verbose flag > default (info)
    let default_level = if args.quiet {
        "error"
    } else {
        match args.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };
    let log_file = args.log_file.clone().or_else(|| file.log_file.clone());
    init_tracing(default_level, log_file.as_deref())?;

    debug!(?args, config_path = ?loaded.path, "CLI arguments parsed");

    if args.urls.is_empty() && !args.login_only {
        info!("No article URLs provided. Pass one or more URLs, or --login-only.");
        info!("Example: sciaccess https://www.sciencedirect.com/science/article/pii/S0000000000000000");
        return Ok(ExitCode::SUCCESS);
    }

    let config = build_accessor_config(&args, &file);
    let credentials = read_credentials(&config.institution_domain)?;
    let factory = driver_factory(args.headless || file.headless.unwrap_or(false))?;
    let cookie_file = config.cookie_file.clone();
    let accessor = PaperAccessor::new(config, credentials, factory)
        .context("Failed to initialise the accessor")?;

    let cancel = accessor.cancel_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel.cancel();
        }
    });

    if args.login_only {
        accessor.login().await.context("Login failed")?;
        println!("Logged in; session cookies saved to {}", cookie_file.display());
        return Ok(ExitCode::SUCCESS);
    }

    let mut completed = 0_usize;
    let mut failed = 0_usize;
    for url in &args.urls {
        match accessor.get_paper_content(url).await {
            Ok(record) => {
                completed += 1;
                if args.json {
                    println!("{}", serde_json::to_string(&record)?);
                } else {
                    print_summary(&record);
                }
            }
            Err(AccessError::Cancelled) => {
                warn!("Interrupted; skipping remaining URLs");
                failed += args.urls.len() - completed - failed;
                break;
            }
            Err(err) => {
                failed += 1;
                error!(url = %url, error = %err, "Failed to retrieve article");
            }
        }
    }

    info!(completed, failed, total = args.urls.len(), "Run complete");
    Ok(determine_exit_outcome(completed, failed).into())
}

fn init_tracing(default_level: &str, log_file: Option<&Path>) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new(format!("{default_level},chromiumoxide=error"))
    });

    match log_file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file '{}'", path.display()))?;
            let _ = tracing_subscriber::fmt()
                .with_writer(Mutex::new(file))
                .with_ansi(false)
                .with_env_filter(filter)
                .try_init();
        }
        None => {
            let _ = tracing_subscriber::fmt()
                .with_writer(std::io::stderr)
                .with_env_filter(filter)
                .try_init();
        }
    }
    Ok(())
}

/// Layers CLI flags over file values over library defaults.
fn build_accessor_config(args: &Args, file: &FileConfig) -> AccessorConfig {
    let mut config = AccessorConfig::default();

    if let Some(base) = &file.content_base_url {
        config.content_base_url.clone_from(base);
        config.proxy.probe_url.clone_from(base);
        config.sso_login_url = build_sso_login_url(DEFAULT_SSO_ENDPOINT, DEFAULT_IDP_ENTITY, base);
    }
    if let Some(sso) = &file.sso_login_url {
        config.sso_login_url.clone_from(sso);
    }
    if let Some(domain) = &file.institution_domain {
        config.institution_domain.clone_from(domain);
    }
    if let Some(secs) = args.rate_limit_secs.or(file.min_request_interval_secs) {
        config.min_request_interval = Duration::from_secs(secs);
    }
    if let Some(secs) = file.max_session_duration_secs {
        config.max_session_duration = Duration::from_secs(secs);
    }
    if let Some(path) = args.cookie_file.clone().or_else(|| file.cookie_file.clone()) {
        config.cookie_file = path;
    }
    config.artifacts_dir = args
        .artifacts_dir
        .clone()
        .or_else(|| file.artifacts_dir.clone());
    config.proxy.source_url = args.proxy_api.clone().or_else(|| file.proxy_api.clone());
    config.proxy.require_proxy = args.require_proxy || file.require_proxy.unwrap_or(false);
    if let Some(secs) = args.captcha_timeout_secs.or(file.captcha_timeout_secs) {
        config.login.captcha_timeout = Duration::from_secs(secs);
    }
    config.operation_timeout = args
        .timeout_secs
        .or(file.operation_timeout_secs)
        .map(Duration::from_secs);
    if let Some(secs) = file.connect_timeout_secs {
        config.http.connect_timeout = Duration::from_secs(secs);
    }
    if let Some(secs) = file.read_timeout_secs {
        config.http.read_timeout = Duration::from_secs(secs);
    }
    config
}

fn read_credentials(institution_domain: &str) -> Result<Credentials> {
    let identity = env::var(USERNAME_ENV)
        .with_context(|| format!("{USERNAME_ENV} must be set to your institutional email"))?;
    let secret =
        env::var(PASSWORD_ENV).with_context(|| format!("{PASSWORD_ENV} must be set"))?;
    Credentials::new(identity, secret, institution_domain).context("Invalid credentials")
}

#[cfg(feature = "chromium")]
#[allow(clippy::unnecessary_wraps)]
fn driver_factory(headless: bool) -> Result<Arc<dyn DriverFactory>> {
    if headless {
        warn!("Running headless; a CAPTCHA cannot be solved without a window");
    }
    Ok(Arc::new(sciaccess_core::ChromiumFactory::new(headless)))
}

#[cfg(not(feature = "chromium"))]
fn driver_factory(_headless: bool) -> Result<Arc<dyn DriverFactory>> {
    anyhow::bail!("sciaccess was built without the `chromium` feature; no browser driver is available")
}

fn print_summary(record: &PaperRecord) {
    println!("Title:    {}", record.title);
    println!("Authors:  {}", record.authors.join(", "));
    if !record.doi.is_empty() {
        println!("DOI:      {}", record.doi);
    }
    println!("Abstract: {}", truncate_chars(&record.abstract_text, SUMMARY_ABSTRACT_CHARS));
    println!("URL:      {}", record.url);
    println!();
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((index, _)) => format!("{}...", &text[..index]),
        None => text.to_string(),
    }
}
