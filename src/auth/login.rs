//! Federated SSO login state machine.
//!
//! One attempt walks the states below with a freshly launched browser:
//!
//! ```text
//! Init -> DriverReady -> SsoRedirect -> [CaptchaGate] -> CredentialEntry
//!      -> Submitted -> RedirectWait -> Success
//! ```
//!
//! Any error moves the attempt to `Failed`: diagnostics are captured, the
//! browser is shut down, and the outer [`RetryPolicy`] (linear, 5s steps by
//! default) starts over from `Init`. Once the attempt ceiling is reached the
//! last error is reported inside [`AccessError::Authentication`].
//!
//! The CAPTCHA gate is a human-in-the-loop wait: the browser window stays open
//! and the gate polls until someone solves the challenge, the portal reports a
//! block, or `captcha_timeout` runs out. Only the redirect wait insists on the
//! browser being back on the content host.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio::time::{Instant, sleep};
use tracing::{debug, info, instrument, warn};

use crate::browser::{BrowserDriver, DriverFactory, Fingerprint};
use crate::config::AccessorConfig;
use crate::error::AccessError;
use crate::fetch::{ProxyEntry, RetryPolicy, Session};
use crate::utils::url_on_host;

use super::{CookieStore, Credentials, Diagnostics, StoredCookie};

/// States of one login attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginState {
    /// Nothing started yet.
    Init,
    /// Browser launched with a fresh fingerprint.
    DriverReady,
    /// Navigated to the SSO entry point.
    SsoRedirect,
    /// Waiting for a human to solve a challenge.
    CaptchaGate,
    /// Filling the identity and secret fields.
    CredentialEntry,
    /// Login form submitted.
    Submitted,
    /// Waiting for the portal to take the browser back.
    RedirectWait,
    /// Cookies captured.
    Success,
    /// The attempt ended with an error.
    Failed,
}

impl LoginState {
    /// Returns the stable label used in logs.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Init => "init",
            Self::DriverReady => "driver_ready",
            Self::SsoRedirect => "sso_redirect",
            Self::CaptchaGate => "captcha_gate",
            Self::CredentialEntry => "credential_entry",
            Self::Submitted => "submitted",
            Self::RedirectWait => "redirect_wait",
            Self::Success => "success",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for LoginState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Selectors and timings for the login flow.
#[derive(Debug, Clone)]
pub struct LoginSettings {
    /// Identity input.
    pub username_selector: String,
    /// Secret input.
    pub password_selector: String,
    /// Submit control.
    pub submit_selector: String,
    /// Substring of an iframe `src` that marks a challenge frame.
    pub challenge_marker: String,
    /// Login attempts before giving up.
    pub max_attempts: u32,
    /// Linear backoff step between attempts.
    pub retry_step: Duration,
    /// Pause after navigation and after the redirect completes.
    pub settle: Duration,
    /// Poll interval for element and redirect waits.
    pub poll_interval: Duration,
    /// Poll interval while a challenge is shown.
    pub captcha_poll: Duration,
    /// How long to wait for a human to solve a challenge.
    pub captcha_timeout: Duration,
    /// How long to wait for form elements.
    pub element_timeout: Duration,
    /// How long to wait for the post-submit redirect.
    pub redirect_timeout: Duration,
    /// Shortest pause between form interactions.
    pub human_pause_min: Duration,
    /// Longest pause between form interactions.
    pub human_pause_max: Duration,
}

impl Default for LoginSettings {
    fn default() -> Self {
        Self {
            username_selector: "#user".to_string(),
            password_selector: "#pass".to_string(),
            submit_selector: "#submit-button".to_string(),
            challenge_marker: "challenge".to_string(),
            max_attempts: 3,
            retry_step: Duration::from_secs(5),
            settle: Duration::from_secs(5),
            poll_interval: Duration::from_secs(1),
            captcha_poll: Duration::from_secs(5),
            captcha_timeout: Duration::from_secs(300),
            element_timeout: Duration::from_secs(30),
            redirect_timeout: Duration::from_secs(30),
            human_pause_min: Duration::from_secs(1),
            human_pause_max: Duration::from_secs(2),
        }
    }
}

/// Drives the browser through the SSO login and captures the session cookies.
pub struct Authenticator {
    credentials: Credentials,
    settings: LoginSettings,
    sso_login_url: String,
    /// Content host the browser must land back on.
    portal_host: String,
    factory: Arc<dyn DriverFactory>,
    store: CookieStore,
    diagnostics: Diagnostics,
}

impl fmt::Debug for Authenticator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Authenticator")
            .field("credentials", &self.credentials)
            .field("sso_login_url", &self.sso_login_url)
            .field("portal_host", &self.portal_host)
            .field("store", &self.store)
            .finish_non_exhaustive()
    }
}

impl Authenticator {
    /// Builds an authenticator from the accessor configuration.
    ///
    /// # Errors
    ///
    /// Returns [`AccessError::Configuration`] when the content URL has no host.
    pub fn new(
        credentials: Credentials,
        config: &AccessorConfig,
        factory: Arc<dyn DriverFactory>,
    ) -> Result<Self, AccessError> {
        Ok(Self {
            credentials,
            settings: config.login.clone(),
            sso_login_url: config.sso_login_url.clone(),
            portal_host: config.content_host()?,
            factory,
            store: CookieStore::new(&config.cookie_file),
            diagnostics: Diagnostics::new(config.artifacts_dir.clone()),
        })
    }

    /// Returns the cookie store written on success.
    #[must_use]
    pub fn store(&self) -> &CookieStore {
        &self.store
    }

    /// Runs the login state machine until it succeeds or the attempt ceiling
    /// is reached.
    ///
    /// # Errors
    ///
    /// Returns [`AccessError::Authentication`] wrapping the last attempt's error.
    #[instrument(skip(self, proxy), fields(identity = %self.credentials.identity()))]
    pub async fn login(&self, proxy: Option<&ProxyEntry>) -> Result<Session, AccessError> {
        let policy = RetryPolicy::linear(self.settings.max_attempts, self.settings.retry_step);
        info!(max_attempts = policy.max_attempts(), "starting SSO login");
        let session = policy
            .execute("login", |attempt| self.attempt(attempt, proxy))
            .await
            .map_err(|last| AccessError::authentication(policy.max_attempts(), last))?;
        info!(cookies = session.cookies().len(), "SSO login succeeded");
        Ok(session)
    }

    async fn attempt(
        &self,
        attempt: u32,
        proxy: Option<&ProxyEntry>,
    ) -> Result<Session, AccessError> {
        let mut state = LoginState::Init;
        let fingerprint = Fingerprint::random();
        debug!(
            attempt,
            width = fingerprint.width,
            height = fingerprint.height,
            timezone = fingerprint.timezone,
            "launching browser"
        );
        let driver = self.factory.launch(&fingerprint, proxy).await?;
        transition(&mut state, LoginState::DriverReady);

        let outcome = self.drive(driver.as_ref(), attempt, &mut state).await;
        if let Err(error) = &outcome {
            warn!(attempt, state = %state, error = %error, "login attempt failed");
            transition(&mut state, LoginState::Failed);
            self.diagnostics
                .capture(driver.as_ref(), "login_error", attempt)
                .await;
        }
        if let Err(error) = driver.quit().await {
            warn!(error = %error, "failed to shut down browser");
        }

        let cookies = outcome?;
        if let Err(error) = self.store.save(&cookies) {
            warn!(error = %error, "could not persist session cookies");
        }
        Ok(Session::new(cookies))
    }

    async fn drive(
        &self,
        driver: &dyn BrowserDriver,
        attempt: u32,
        state: &mut LoginState,
    ) -> Result<Vec<StoredCookie>, AccessError> {
        transition(state, LoginState::SsoRedirect);
        driver.navigate(&self.sso_login_url).await?;
        sleep(self.settings.settle).await;

        if self.challenge_present(driver).await? {
            transition(state, LoginState::CaptchaGate);
            self.await_captcha(driver).await?;
        }
        self.diagnostics.snapshot(driver, "sso_page", attempt).await;

        transition(state, LoginState::CredentialEntry);
        self.enter_credentials(driver).await?;

        transition(state, LoginState::Submitted);
        self.wait_for_element(driver, &self.settings.submit_selector, true)
            .await?;
        driver.click(&self.settings.submit_selector).await?;

        transition(state, LoginState::RedirectWait);
        self.await_redirect(driver).await?;
        sleep(self.settings.settle).await;
        self.diagnostics
            .snapshot(driver, "after_login", attempt)
            .await;

        let cookies = driver.cookies().await?;
        transition(state, LoginState::Success);
        Ok(cookies)
    }

    async fn challenge_present(&self, driver: &dyn BrowserDriver) -> Result<bool, AccessError> {
        let marker = self.settings.challenge_marker.to_ascii_lowercase();
        let sources = driver.attribute_values("iframe", "src").await?;
        Ok(sources
            .iter()
            .any(|src| src.to_ascii_lowercase().contains(&marker)))
    }

    /// Polls until the browser is back on the portal or the challenge frame is
    /// gone.
    ///
    /// A challenge on the SSO page clears onto the identity provider's form, so
    /// leaving the frame behind on any other non-blocked location also counts.
    async fn await_captcha(&self, driver: &dyn BrowserDriver) -> Result<(), AccessError> {
        let timeout = self.settings.captcha_timeout;
        info!(
            timeout_secs = timeout.as_secs(),
            "CAPTCHA detected; solve it in the browser window"
        );
        let deadline = Instant::now() + timeout;
        loop {
            let url = driver.current_url().await?;
            if is_blocked_location(&url) {
                return Err(AccessError::captcha_blocked(url));
            }
            if url_on_host(&url, &self.portal_host) || !self.challenge_present(driver).await? {
                info!(url = %url, "CAPTCHA resolved");
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(AccessError::timeout("CAPTCHA resolution", timeout));
            }
            sleep(self.settings.captcha_poll).await;
        }
    }

    async fn enter_credentials(&self, driver: &dyn BrowserDriver) -> Result<(), AccessError> {
        let user = &self.settings.username_selector;
        let pass = &self.settings.password_selector;
        self.wait_for_element(driver, user, false).await?;
        self.wait_for_element(driver, pass, false).await?;

        driver.clear(user).await?;
        driver.clear(pass).await?;
        self.human_pause().await;
        driver.type_into(user, self.credentials.identity()).await?;
        self.human_pause().await;
        driver.type_into(pass, self.credentials.secret()).await?;
        self.human_pause().await;
        debug!("credentials entered");
        Ok(())
    }

    async fn wait_for_element(
        &self,
        driver: &dyn BrowserDriver,
        selector: &str,
        clickable: bool,
    ) -> Result<(), AccessError> {
        let timeout = self.settings.element_timeout;
        let deadline = Instant::now() + timeout;
        loop {
            let ready = if clickable {
                driver.is_clickable(selector).await?
            } else {
                driver.is_present(selector).await?
            };
            if ready {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(AccessError::timeout(
                    format!("waiting for element {selector}"),
                    timeout,
                ));
            }
            sleep(self.settings.poll_interval).await;
        }
    }

    /// Polls until the browser lands back on the portal, passing through the
    /// CAPTCHA gate whenever a challenge appears.
    async fn await_redirect(&self, driver: &dyn BrowserDriver) -> Result<(), AccessError> {
        let timeout = self.settings.redirect_timeout;
        let deadline = Instant::now() + timeout;
        loop {
            if self.challenge_present(driver).await? {
                self.await_captcha(driver).await?;
            }
            let url = driver.current_url().await?;
            if url_on_host(&url, &self.portal_host) {
                debug!(url = %url, "redirected back to portal");
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(AccessError::timeout("post-login redirect", timeout));
            }
            sleep(self.settings.poll_interval).await;
        }
    }

    async fn human_pause(&self) {
        sleep(self.pick_pause()).await;
    }

    fn pick_pause(&self) -> Duration {
        let (min, max) = (self.settings.human_pause_min, self.settings.human_pause_max);
        if max <= min {
            return min;
        }
        rand::thread_rng().gen_range(min..=max)
    }
}

fn transition(state: &mut LoginState, next: LoginState) {
    debug!(from = %state, to = %next, "login state transition");
    *state = next;
}

fn is_blocked_location(url: &str) -> bool {
    let url = url.to_ascii_lowercase();
    url.contains("blocked") || url.contains("error")
}
