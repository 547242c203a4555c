//! Authenticated content fetching.
//!
//! [`ContentFetcher`] owns the session and everything that touches it: the
//! cookie jar, the [`SessionGuard`], the [`ProxyPool`] and the
//! [`Authenticator`]. A fetch validates the target, makes sure a session
//! exists (restoring persisted cookies when they still work), clears the
//! guard, sends the request under a [`RetryPolicy`], and finally checks the
//! body for sign-in prompts. A page that asks for sign-in triggers exactly one
//! re-authentication and one more fetch.

mod http_client;
mod proxy;
mod retry;
mod session_guard;

use std::sync::Arc;

use reqwest::Client;
use reqwest::cookie::Jar;
use tracing::{debug, info, instrument, warn};
use url::Url;

use crate::auth::{Authenticator, CookieStore, load_cookies_into_jar};
use crate::config::{AccessorConfig, DEFAULT_RELOGIN_MARKERS};
use crate::error::AccessError;
use crate::extract::PageDocument;

pub use http_client::{HttpSettings, build_content_client};
pub use proxy::{
    DEFAULT_PROBE_TIMEOUT, DEFAULT_REFRESH_INTERVAL, DEFAULT_VALIDATION_ATTEMPTS, ProxyEntry,
    ProxyPool, ProxySettings,
};
pub use retry::{Backoff, DEFAULT_FETCH_ATTEMPTS, DEFAULT_FETCH_DELAY, RetryDecision, RetryPolicy};
pub use session_guard::{
    Clearance, DEFAULT_MAX_SESSION_DURATION, DEFAULT_MIN_REQUEST_INTERVAL, Session, SessionGuard,
};

/// Result of scanning a fetched page for sign-in prompts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageCheck {
    /// The page is usable content.
    Ok,
    /// The portal served a sign-in prompt instead of content.
    NeedsRelogin,
}

/// Returns true when `url` is an http(s) URL whose host is exactly `content_host`.
///
/// ```
/// use sciaccess_core::fetch::validate_url;
///
/// assert!(validate_url("https://www.sciencedirect.com/science/article/pii/S1", "www.sciencedirect.com"));
/// assert!(!validate_url("https://example.com/paper", "www.sciencedirect.com"));
/// ```
#[must_use]
pub fn validate_url(url: &str, content_host: &str) -> bool {
    let Ok(parsed) = Url::parse(url) else {
        return false;
    };
    matches!(parsed.scheme(), "http" | "https")
        && parsed
            .host_str()
            .is_some_and(|host| host.eq_ignore_ascii_case(content_host))
}

/// Scans the visible text of `html` for any of `markers`, ignoring case.
#[must_use]
pub fn check_page<S: AsRef<str>>(html: &str, markers: &[S]) -> PageCheck {
    let text = PageDocument::parse(html).visible_text().to_lowercase();
    let flagged = markers
        .iter()
        .map(AsRef::as_ref)
        .filter(|marker| !marker.trim().is_empty())
        .any(|marker| text.contains(&marker.to_lowercase()));
    if flagged {
        PageCheck::NeedsRelogin
    } else {
        PageCheck::Ok
    }
}

/// Returns true when `html` carries one of the default sign-in prompts.
#[must_use]
pub fn needs_relogin(html: &str) -> bool {
    check_page(html, DEFAULT_RELOGIN_MARKERS) == PageCheck::NeedsRelogin
}

/// Fetches article pages with an authenticated, rate-limited session.
pub struct ContentFetcher {
    base_url: Url,
    content_host: String,
    http: HttpSettings,
    retry: RetryPolicy,
    relogin_markers: Vec<String>,
    anonymous_marker: String,
    authenticator: Authenticator,
    guard: SessionGuard,
    proxies: ProxyPool,
    store: CookieStore,
    jar: Arc<Jar>,
    /// Direct (proxy-less) client bound to `jar`.
    client: Client,
    session: Option<Session>,
}

impl std::fmt::Debug for ContentFetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContentFetcher")
            .field("content_host", &self.content_host)
            .field("has_session", &self.session.is_some())
            .field("guard", &self.guard)
            .finish_non_exhaustive()
    }
}

impl ContentFetcher {
    /// Builds a fetcher with no session yet.
    ///
    /// # Errors
    ///
    /// Returns [`AccessError::Configuration`] for an unusable base URL and
    /// [`AccessError::HttpClient`] if a client cannot be built.
    pub fn new(config: &AccessorConfig, authenticator: Authenticator) -> Result<Self, AccessError> {
        let base_url = config.content_url()?;
        let content_host = config.content_host()?;
        let jar = Arc::new(Jar::default());
        let client = build_content_client(&config.http, Arc::clone(&jar), None)?;
        Ok(Self {
            base_url,
            content_host,
            http: config.http,
            retry: RetryPolicy::exponential(config.fetch_max_attempts, config.fetch_initial_delay),
            relogin_markers: config.relogin_markers.clone(),
            anonymous_marker: config.anonymous_marker.clone(),
            authenticator,
            guard: SessionGuard::new(config.min_request_interval, config.max_session_duration),
            proxies: ProxyPool::new(config.proxy.clone())?,
            store: CookieStore::new(&config.cookie_file),
            jar,
            client,
            session: None,
        })
    }

    /// Returns the host every content URL must use.
    #[must_use]
    pub fn content_host(&self) -> &str {
        &self.content_host
    }

    /// Returns the current session, if any.
    #[must_use]
    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    /// Returns the proxy pool.
    #[must_use]
    pub fn proxies(&self) -> &ProxyPool {
        &self.proxies
    }

    /// Fetches the raw page body for `url`.
    ///
    /// # Errors
    ///
    /// - [`AccessError::InvalidTarget`] when `url` is not on the content host.
    /// - [`AccessError::Authentication`] when a required login fails.
    /// - [`AccessError::SessionRejected`] when the page still asks for sign-in
    ///   after a fresh login.
    /// - Network, status and proxy errors once retries are exhausted.
    #[instrument(skip(self), fields(host = %self.content_host))]
    pub async fn fetch(&mut self, url: &str) -> Result<String, AccessError> {
        if !validate_url(url, &self.content_host) {
            return Err(AccessError::invalid_target(url, &self.content_host));
        }

        self.ensure_session().await?;
        let body = self.guarded_fetch(url).await?;
        if check_page(&body, &self.relogin_markers) == PageCheck::Ok {
            return Ok(body);
        }

        info!(url, "page asks for sign-in; re-authenticating once");
        self.reauthenticate().await?;
        let body = self.guarded_fetch(url).await?;
        match check_page(&body, &self.relogin_markers) {
            PageCheck::Ok => Ok(body),
            PageCheck::NeedsRelogin => Err(AccessError::session_rejected(url)),
        }
    }

    /// Discards the current session and logs in again.
    ///
    /// # Errors
    ///
    /// Returns the login error, or [`AccessError::NoProxyAvailable`] when a
    /// proxy is required and none validates.
    pub async fn relogin(&mut self) -> Result<(), AccessError> {
        self.reauthenticate().await
    }

    async fn ensure_session(&mut self) -> Result<(), AccessError> {
        if self.session.is_some() {
            return Ok(());
        }

        match self.store.load() {
            Ok(Some(cookies)) if !cookies.is_empty() => {
                debug!(count = cookies.len(), "trying persisted cookies");
                self.install(Session::new(cookies))?;
                if self.probe_cookies().await {
                    info!("restored session from persisted cookies");
                    return Ok(());
                }
                info!("persisted cookies no longer accepted");
                self.session = None;
            }
            Ok(_) => debug!("no persisted cookies"),
            Err(error) => warn!(error = %error, "could not read persisted cookies"),
        }

        self.reauthenticate().await
    }

    /// Sends a paced GET for the portal home page with the installed cookies.
    async fn probe_cookies(&self) -> bool {
        self.guard.throttle().await;
        let response = match self.client.get(self.base_url.as_str()).send().await {
            Ok(response) => response,
            Err(error) => {
                debug!(error = %error, "cookie probe failed");
                return false;
            }
        };
        if !response.status().is_success() {
            debug!(status = response.status().as_u16(), "cookie probe rejected");
            return false;
        }
        match response.text().await {
            Ok(body) => !body.contains(&self.anonymous_marker),
            Err(error) => {
                debug!(error = %error, "cookie probe body unreadable");
                false
            }
        }
    }

    async fn reauthenticate(&mut self) -> Result<(), AccessError> {
        self.session = None;
        let proxy = self.select_proxy().await?;
        let session = self.authenticator.login(proxy.as_ref()).await?;
        self.install(session)
    }

    /// Replaces the jar and direct client with ones holding `session`'s cookies.
    fn install(&mut self, session: Session) -> Result<(), AccessError> {
        let jar = load_cookies_into_jar(session.cookies(), &self.base_url);
        self.client = build_content_client(&self.http, Arc::clone(&jar), None)?;
        self.jar = jar;
        self.session = Some(session);
        Ok(())
    }

    async fn select_proxy(&self) -> Result<Option<ProxyEntry>, AccessError> {
        if !self.proxies.is_configured() {
            return Ok(None);
        }
        match self.proxies.acquire().await {
            Some(entry) => Ok(Some(entry)),
            None if self.proxies.requires_proxy() => Err(AccessError::NoProxyAvailable),
            None => {
                warn!("no working proxy; falling back to a direct connection");
                Ok(None)
            }
        }
    }

    async fn guarded_fetch(&mut self, url: &str) -> Result<String, AccessError> {
        match self.guard.clear(&mut self.session).await {
            Clearance::Granted => {}
            Clearance::NeedsLogin | Clearance::SessionExpired => {
                self.reauthenticate().await?;
            }
        }

        let proxy = self.select_proxy().await?;
        let client = match &proxy {
            Some(entry) => build_content_client(&self.http, Arc::clone(&self.jar), Some(entry))?,
            None => self.client.clone(),
        };

        // `clear` paced the first attempt; every retry is paced again.
        let guard = &self.guard;
        let client = &client;
        let result = self
            .retry
            .execute_if(
                "content fetch",
                |attempt| async move {
                    if attempt > 0 {
                        guard.throttle().await;
                    }
                    fetch_body(client, url, attempt).await
                },
                AccessError::is_retryable,
            )
            .await;

        if let (Err(AccessError::Network { .. }), Some(entry)) = (&result, &proxy) {
            self.proxies.release(entry).await;
        }
        result
    }
}

async fn fetch_body(client: &Client, url: &str, attempt: u32) -> Result<String, AccessError> {
    debug!(url, attempt, "requesting content");
    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| AccessError::network(url, e))?;
    let status = response.status();
    if !status.is_success() {
        return Err(AccessError::http_status(url, status.as_u16()));
    }
    response
        .text()
        .await
        .map_err(|e| AccessError::network(url, e))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_url_requires_exact_host() {
        let host = "www.sciencedirect.com";
        assert!(validate_url(
            "https://www.sciencedirect.com/science/article/pii/S0000",
            host
        ));
        assert!(validate_url("https://WWW.SCIENCEDIRECT.COM/x", host));
        assert!(!validate_url("https://example.com/paper", host));
        assert!(!validate_url("https://sciencedirect.com/x", host));
        assert!(!validate_url("https://evil.www.sciencedirect.com.example/x", host));
    }

    #[test]
    fn test_validate_url_rejects_other_schemes_and_garbage() {
        let host = "www.sciencedirect.com";
        assert!(!validate_url("ftp://www.sciencedirect.com/x", host));
        assert!(!validate_url("not a url", host));
        assert!(!validate_url("", host));
    }

    #[test]
    fn test_needs_relogin_detects_each_marker() {
        for marker in DEFAULT_RELOGIN_MARKERS {
            let html = format!("<html><body><p>{marker}</p></body></html>");
            assert!(needs_relogin(&html), "marker not detected: {marker}");
        }
    }

    #[test]
    fn test_needs_relogin_ignores_case() {
        assert!(needs_relogin(
            "<html><body>PLEASE SIGN IN to access this content</body></html>"
        ));
        assert!(needs_relogin("Please sign in to access this content"));
    }

    #[test]
    fn test_needs_relogin_false_for_normal_page() {
        assert!(!needs_relogin("<html><body>Welcome to ScienceDirect</body></html>"));
    }

    #[test]
    fn test_check_page_uses_visible_text_only() {
        let html = r#"<html><body><a href="/signin" title="Sign in">Home</a></body></html>"#;
        assert_eq!(check_page(html, &["Sign in"]), PageCheck::Ok);
    }

    #[test]
    fn test_check_page_ignores_blank_markers() {
        assert_eq!(check_page("<p>content</p>", &["", "  "]), PageCheck::Ok);
    }
}
