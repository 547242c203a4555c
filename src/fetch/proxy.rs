//! Refreshable pool of egress proxies.
//!
//! The pool is fed from an optional proxy-source endpoint that returns a JSON
//! array of scheme-to-address mappings:
//!
//! ```json
//! [{"http": "http://10.0.0.1:8080", "https": "http://10.0.0.1:8080"}]
//! ```
//!
//! Without a source the pool stays empty and [`ProxyPool::acquire`] returns
//! `None` without touching the network. With one, entries are refreshed when
//! the pool is empty or older than the refresh interval, and every candidate
//! is probed before it is handed out. Candidates that fail the probe are
//! removed immediately.

use std::collections::BTreeMap;
use std::time::Duration;

use rand::seq::SliceRandom;
use reqwest::{Client, Proxy, StatusCode};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

use crate::error::AccessError;
use crate::user_agent::BROWSER_USER_AGENT;

/// Default interval after which the pool is refreshed unconditionally.
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(300);

/// Default timeout for a proxy liveness probe.
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// Default number of random pick-and-validate attempts per acquire.
pub const DEFAULT_VALIDATION_ATTEMPTS: u32 = 3;

/// A scheme-to-proxy-address mapping, e.g. `{"http": ..., "https": ...}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProxyEntry(BTreeMap<String, String>);

impl ProxyEntry {
    /// Creates an entry from an explicit mapping.
    #[must_use]
    pub fn new(mapping: BTreeMap<String, String>) -> Self {
        Self(mapping)
    }

    /// Creates an entry that routes both `http` and `https` through `address`.
    #[must_use]
    pub fn uniform(address: impl Into<String>) -> Self {
        let address = address.into();
        let mut mapping = BTreeMap::new();
        mapping.insert("http".to_string(), address.clone());
        mapping.insert("https".to_string(), address);
        Self(mapping)
    }

    /// Returns the proxy address for `scheme`.
    #[must_use]
    pub fn get(&self, scheme: &str) -> Option<&str> {
        self.0.get(scheme).map(String::as_str)
    }

    /// Returns the address a browser should use as its single proxy server.
    #[must_use]
    pub fn browser_server(&self) -> Option<&str> {
        self.get("https").or_else(|| self.get("http"))
    }

    /// Converts the mapping into reqwest proxies.
    ///
    /// Unknown schemes are ignored.
    ///
    /// # Errors
    ///
    /// Returns the reqwest error for an unparseable proxy address.
    pub fn to_proxies(&self) -> Result<Vec<Proxy>, reqwest::Error> {
        let mut proxies = Vec::with_capacity(self.0.len());
        for (scheme, address) in &self.0 {
            match scheme.as_str() {
                "http" => proxies.push(Proxy::http(address)?),
                "https" => proxies.push(Proxy::https(address)?),
                "all" => proxies.push(Proxy::all(address)?),
                other => debug!(scheme = other, "ignoring unsupported proxy scheme"),
            }
        }
        Ok(proxies)
    }
}

/// Proxy pool settings.
#[derive(Debug, Clone)]
pub struct ProxySettings {
    /// Endpoint returning the candidate list; `None` disables proxying.
    pub source_url: Option<String>,
    /// Age after which the pool is refreshed.
    pub refresh_interval: Duration,
    /// URL requested through a candidate to check it is alive.
    pub probe_url: String,
    /// Timeout for the probe and for the source request.
    pub probe_timeout: Duration,
    /// Random candidates tried per acquire.
    pub validation_attempts: u32,
    /// Fail instead of falling back to a direct connection when no proxy works.
    pub require_proxy: bool,
}

impl Default for ProxySettings {
    fn default() -> Self {
        Self {
            source_url: None,
            refresh_interval: DEFAULT_REFRESH_INTERVAL,
            probe_url: crate::config::DEFAULT_CONTENT_BASE_URL.to_string(),
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
            validation_attempts: DEFAULT_VALIDATION_ATTEMPTS,
            require_proxy: false,
        }
    }
}

#[derive(Debug, Default)]
struct PoolState {
    entries: Vec<ProxyEntry>,
    refreshed_at: Option<Instant>,
}

/// Pool of validated egress proxies.
///
/// All methods take `&self`; the entry list sits behind a `tokio::sync::Mutex`
/// that is never held across a network request.
#[derive(Debug)]
pub struct ProxyPool {
    settings: ProxySettings,
    client: Client,
    state: Mutex<PoolState>,
}

impl ProxyPool {
    /// Creates an empty pool.
    ///
    /// # Errors
    ///
    /// Returns [`AccessError::HttpClient`] if the source client cannot be built.
    pub fn new(settings: ProxySettings) -> Result<Self, AccessError> {
        let client = Client::builder()
            .timeout(settings.probe_timeout)
            .user_agent(BROWSER_USER_AGENT)
            .build()
            .map_err(AccessError::HttpClient)?;
        Ok(Self {
            settings,
            client,
            state: Mutex::new(PoolState::default()),
        })
    }

    /// Returns true when a proxy source is configured.
    #[must_use]
    pub fn is_configured(&self) -> bool {
        self.settings.source_url.is_some()
    }

    /// Returns true when callers must not fall back to direct connections.
    #[must_use]
    pub fn requires_proxy(&self) -> bool {
        self.settings.require_proxy
    }

    /// Returns the number of entries currently held.
    pub async fn len(&self) -> usize {
        self.state.lock().await.entries.len()
    }

    /// Returns true when the pool holds no entries.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Replaces the pool with a fresh candidate list from the source.
    ///
    /// Returns false, leaving the pool untouched, when no source is configured
    /// or the source does not answer 200 with a JSON array.
    #[instrument(skip(self))]
    pub async fn refresh(&self) -> bool {
        let Some(source) = self.settings.source_url.as_deref() else {
            return false;
        };

        let response = match self.client.get(source).send().await {
            Ok(response) => response,
            Err(error) => {
                warn!(error = %error, "proxy source request failed");
                return false;
            }
        };
        if response.status() != StatusCode::OK {
            warn!(status = response.status().as_u16(), "proxy source returned non-200");
            return false;
        }
        let candidates = match response.json::<Vec<ProxyEntry>>().await {
            Ok(candidates) => candidates,
            Err(error) => {
                warn!(error = %error, "proxy source returned an unexpected body");
                return false;
            }
        };

        let mut entries: Vec<ProxyEntry> = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            if !entries.contains(&candidate) {
                entries.push(candidate);
            }
        }

        info!(count = entries.len(), "proxy pool refreshed");
        let mut state = self.state.lock().await;
        state.entries = entries;
        state.refreshed_at = Some(Instant::now());
        true
    }

    /// Probes `entry` and returns true only on HTTP 200.
    #[instrument(skip(self, entry), fields(proxy = entry.browser_server().unwrap_or("-")))]
    pub async fn validate(&self, entry: &ProxyEntry) -> bool {
        let proxies = match entry.to_proxies() {
            Ok(proxies) if !proxies.is_empty() => proxies,
            Ok(_) => {
                debug!("proxy entry has no usable scheme");
                return false;
            }
            Err(error) => {
                debug!(error = %error, "proxy entry has an invalid address");
                return false;
            }
        };

        let mut builder = Client::builder()
            .timeout(self.settings.probe_timeout)
            .user_agent(BROWSER_USER_AGENT);
        for proxy in proxies {
            builder = builder.proxy(proxy);
        }
        let client = match builder.build() {
            Ok(client) => client,
            Err(error) => {
                debug!(error = %error, "could not build probe client");
                return false;
            }
        };

        match client.get(&self.settings.probe_url).send().await {
            Ok(response) => {
                let ok = response.status() == StatusCode::OK;
                debug!(status = response.status().as_u16(), ok, "proxy probe finished");
                ok
            }
            Err(error) => {
                debug!(error = %error, "proxy probe failed");
                false
            }
        }
    }

    /// Hands out a validated proxy, or `None` for a direct connection.
    ///
    /// Refreshes first when the pool is empty or stale. Each candidate that
    /// fails validation is removed before the next random pick.
    #[instrument(skip(self))]
    pub async fn acquire(&self) -> Option<ProxyEntry> {
        if !self.is_configured() {
            return None;
        }

        let stale = {
            let state = self.state.lock().await;
            state.entries.is_empty()
                || state
                    .refreshed_at
                    .is_none_or(|at| at.elapsed() >= self.settings.refresh_interval)
        };
        if stale && !self.refresh().await {
            return None;
        }

        for attempt in 0..self.settings.validation_attempts {
            let candidate = {
                let state = self.state.lock().await;
                state.entries.choose(&mut rand::thread_rng()).cloned()
            };
            let Some(candidate) = candidate else {
                debug!("proxy pool exhausted");
                break;
            };
            if self.validate(&candidate).await {
                debug!(attempt, "proxy validated");
                return Some(candidate);
            }
            self.release(&candidate).await;
        }

        warn!("no proxy passed validation");
        None
    }

    /// Removes `entry` from the pool. Removing an absent entry is a no-op.
    pub async fn release(&self, entry: &ProxyEntry) {
        let mut state = self.state.lock().await;
        let before = state.entries.len();
        state.entries.retain(|candidate| candidate != entry);
        if state.entries.len() < before {
            debug!(remaining = state.entries.len(), "proxy removed from pool");
        }
    }

    #[cfg(test)]
    async fn seed(&self, entries: Vec<ProxyEntry>) {
        let mut state = self.state.lock().await;
        state.entries = entries;
        state.refreshed_at = Some(Instant::now());
    }
}
