//! HTTP client construction for content requests.
//!
//! Every content client shares the same policy: connect and read timeouts, the
//! browser header set, gzip, and the session cookie jar. A proxy, when one is
//! in use, is baked into a dedicated client because reqwest proxies are
//! per-client.

use std::sync::Arc;
use std::time::Duration;

use reqwest::cookie::Jar;
use reqwest::{Client, ClientBuilder};
use tracing::debug;

use crate::error::AccessError;
use crate::user_agent::{BROWSER_USER_AGENT, browser_headers};

use super::ProxyEntry;

const CONNECT_TIMEOUT_SECS: u64 = 10;
const READ_TIMEOUT_SECS: u64 = 30;

/// Timeouts applied to content clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HttpSettings {
    /// TCP/TLS connect timeout.
    pub connect_timeout: Duration,
    /// Whole-request timeout.
    pub read_timeout: Duration,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(CONNECT_TIMEOUT_SECS),
            read_timeout: Duration::from_secs(READ_TIMEOUT_SECS),
        }
    }
}

/// Builds a content client bound to `jar`, optionally routed through `proxy`.
///
/// # Errors
///
/// Returns [`AccessError::HttpClient`] when a proxy address is invalid or the
/// client cannot be constructed.
pub fn build_content_client(
    settings: &HttpSettings,
    jar: Arc<Jar>,
    proxy: Option<&ProxyEntry>,
) -> Result<Client, AccessError> {
    let mut builder = base_builder(settings, jar);
    if let Some(entry) = proxy {
        for resolved in entry.to_proxies().map_err(AccessError::HttpClient)? {
            builder = builder.proxy(resolved);
        }
        debug!(proxy = entry.browser_server().unwrap_or("-"), "content client uses proxy");
    }
    builder.build().map_err(AccessError::HttpClient)
}

fn base_builder(settings: &HttpSettings, jar: Arc<Jar>) -> ClientBuilder {
    Client::builder()
        .connect_timeout(settings.connect_timeout)
        .timeout(settings.read_timeout)
        .user_agent(BROWSER_USER_AGENT)
        .default_headers(browser_headers())
        .gzip(true)
        .cookie_provider(jar)
}
