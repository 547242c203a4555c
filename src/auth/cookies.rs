//! Persisted session cookies and the reqwest jar loader.
//!
//! Cookies captured from the browser after login are stored as a JSON array of
//! WebDriver-shaped cookie objects:
//!
//! ```json
//! [{"name": "SDSESSION", "value": "...", "domain": ".sciencedirect.com",
//!   "path": "/", "expiry": 1767225600, "secure": true, "httpOnly": true,
//!   "sameSite": "Lax"}]
//! ```
//!
//! Fields this crate does not model are kept in [`StoredCookie::extra`] so a
//! load/save cycle never drops data.

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use reqwest::cookie::Jar;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};
use url::Url;

/// Default location of the persisted cookie file.
pub const DEFAULT_COOKIE_FILE: &str = "cookies.json";

/// A single browser cookie.
///
/// The value is redacted in Debug output to prevent accidental logging of
/// session secrets.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredCookie {
    /// Cookie name.
    pub name: String,
    /// Cookie value (sensitive, never log).
    value: String,
    /// Cookie domain; a leading dot marks a domain cookie.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    /// URL path scope.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    /// Unix timestamp of expiry; `None` for session cookies.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry: Option<i64>,
    /// Only sent over HTTPS.
    #[serde(default)]
    pub secure: bool,
    /// Hidden from page scripts.
    #[serde(default, rename = "httpOnly")]
    pub http_only: bool,
    /// `SameSite` policy as reported by the browser.
    #[serde(default, rename = "sameSite", skip_serializing_if = "Option::is_none")]
    pub same_site: Option<String>,
    /// Any other fields present in the stored object.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl StoredCookie {
    /// Creates a host-only session cookie with no attributes set.
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            domain: None,
            path: None,
            expiry: None,
            secure: false,
            http_only: false,
            same_site: None,
            extra: serde_json::Map::new(),
        }
    }

    /// Sets the cookie domain.
    #[must_use]
    pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = Some(domain.into());
        self
    }

    /// Sets the cookie path.
    #[must_use]
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Returns the cookie value.
    ///
    /// Cookie values are sensitive; avoid logging the return value.
    #[must_use]
    pub fn value(&self) -> &str {
        &self.value
    }
}

// Custom Debug impl that redacts the cookie value.
impl fmt::Debug for StoredCookie {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoredCookie")
            .field("name", &self.name)
            .field("value", &"[REDACTED]")
            .field("domain", &self.domain)
            .field("path", &self.path)
            .field("expiry", &self.expiry)
            .field("secure", &self.secure)
            .field("http_only", &self.http_only)
            .field("same_site", &self.same_site)
            .finish_non_exhaustive()
    }
}

/// Errors from reading or writing the cookie file.
#[derive(Debug, thiserror::Error)]
pub enum CookieStoreError {
    /// Filesystem failure.
    #[error("cookie file {path}: {source}")]
    Io {
        /// The cookie file path.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: io::Error,
    },

    /// The file is not a JSON array of cookie objects.
    #[error("cookie file {path} is malformed: {source}")]
    Format {
        /// The cookie file path.
        path: PathBuf,
        /// The underlying JSON error.
        #[source]
        source: serde_json::Error,
    },
}

/// JSON file holding the cookie set of the last successful login.
#[derive(Debug, Clone)]
pub struct CookieStore {
    path: PathBuf,
}

impl CookieStore {
    /// Creates a store backed by `path`. Nothing is read until [`load`](Self::load).
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Returns the backing file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the persisted cookies. Returns `Ok(None)` when the file does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`CookieStoreError`] when the file cannot be read or parsed.
    #[instrument(level = "debug", skip(self), fields(path = %self.path.display()))]
    pub fn load(&self) -> Result<Option<Vec<StoredCookie>>, CookieStoreError> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(error) if error.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(CookieStoreError::Io {
                    path: self.path.clone(),
                    source,
                });
            }
        };
        let cookies: Vec<StoredCookie> =
            serde_json::from_str(&raw).map_err(|source| CookieStoreError::Format {
                path: self.path.clone(),
                source,
            })?;
        debug!(count = cookies.len(), "loaded persisted cookies");
        Ok(Some(cookies))
    }

    /// Writes `cookies`, replacing the file atomically via a sibling temp file.
    ///
    /// # Errors
    ///
    /// Returns [`CookieStoreError`] on serialization or filesystem failure.
    #[instrument(level = "debug", skip(self, cookies), fields(path = %self.path.display(), count = cookies.len()))]
    pub fn save(&self, cookies: &[StoredCookie]) -> Result<(), CookieStoreError> {
        let json =
            serde_json::to_string_pretty(cookies).map_err(|source| CookieStoreError::Format {
                path: self.path.clone(),
                source,
            })?;

        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(|source| self.io_error(source))?;
        }

        let mut temp = self.path.clone().into_os_string();
        temp.push(".tmp");
        let temp = PathBuf::from(temp);
        fs::write(&temp, json).map_err(|source| self.io_error(source))?;
        fs::rename(&temp, &self.path).map_err(|source| self.io_error(source))?;
        debug!("persisted cookies");
        Ok(())
    }

    /// Deletes the cookie file if present.
    ///
    /// # Errors
    ///
    /// Returns [`CookieStoreError::Io`] when the file exists but cannot be removed.
    pub fn clear(&self) -> Result<(), CookieStoreError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(self.io_error(source)),
        }
    }

    fn io_error(&self, source: io::Error) -> CookieStoreError {
        CookieStoreError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

/// Loads cookies into a fresh `reqwest::cookie::Jar`.
///
/// Cookies without a domain are scoped to `fallback`'s host.
///
/// # Returns
///
/// An `Arc<Jar>` suitable for passing to `reqwest::ClientBuilder::cookie_provider()`.
#[instrument(level = "debug", skip(cookies, fallback))]
pub fn load_cookies_into_jar(cookies: &[StoredCookie], fallback: &Url) -> Arc<Jar> {
    let jar = Arc::new(Jar::default());

    for cookie in cookies {
        let set_cookie = build_set_cookie_string(cookie);
        match build_origin_url(cookie, fallback) {
            Some(origin) => {
                jar.add_cookie_str(&set_cookie, &origin);
                debug!(name = %cookie.name, origin = %origin, "loaded cookie into jar");
            }
            None => warn!(
                name = %cookie.name,
                domain = ?cookie.domain,
                "skipping cookie with unparseable domain"
            ),
        }
    }

    jar
}

/// Builds a `Set-Cookie` header string from a stored cookie.
///
/// Only dot-prefixed domains become a `Domain` attribute; anything else stays
/// host-only, matching how browsers report host cookies.
fn build_set_cookie_string(cookie: &StoredCookie) -> String {
    let mut parts = vec![format!("{}={}", cookie.name, cookie.value())];

    if let Some(domain) = cookie.domain.as_deref()
        && domain.starts_with('.')
    {
        parts.push(format!("Domain={domain}"));
    }

    parts.push(format!("Path={}", cookie.path.as_deref().unwrap_or("/")));

    if cookie.secure {
        parts.push("Secure".to_string());
    }
    if cookie.http_only {
        parts.push("HttpOnly".to_string());
    }

    if let Some(expiry) = cookie.expiry
        && let Ok(expiry) = u64::try_from(expiry)
        && expiry > 0
    {
        if let Some(expires) = unix_to_http_date(expiry) {
            parts.push(format!("Expires={expires}"));
        } else {
            warn!(
                name = %cookie.name,
                expiry,
                "cookie expiry timestamp overflows SystemTime; treating as session cookie"
            );
        }
    }

    parts.join("; ")
}

/// Builds the origin URL for `Jar::add_cookie_str`.
///
/// Secure cookies get `https://`; others inherit the fallback scheme.
fn build_origin_url(cookie: &StoredCookie, fallback: &Url) -> Option<Url> {
    let host = match cookie.domain.as_deref() {
        Some(domain) => domain.strip_prefix('.').unwrap_or(domain).to_string(),
        None => fallback.host_str()?.to_string(),
    };
    let scheme = if cookie.secure {
        "https"
    } else {
        fallback.scheme()
    };
    let port = match (cookie.domain.as_deref(), fallback.port()) {
        (None, Some(port)) => format!(":{port}"),
        (Some(domain), Some(port)) if fallback.host_str() == Some(domain) => format!(":{port}"),
        _ => String::new(),
    };
    let path = cookie.path.as_deref().unwrap_or("/");
    Url::parse(&format!("{scheme}://{host}{port}{path}")).ok()
}

/// Converts a Unix timestamp to an HTTP-date string (RFC 7231).
fn unix_to_http_date(timestamp: u64) -> Option<String> {
    use std::time::{Duration, UNIX_EPOCH};

    let time = UNIX_EPOCH.checked_add(Duration::from_secs(timestamp))?;
    Some(httpdate::fmt_http_date(time))
}
