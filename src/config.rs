//! Typed accessor configuration with defaults for every tunable.
//!
//! Components are built from an [`AccessorConfig`] passed in explicitly; nothing
//! is read from globals or the environment here.

use std::path::PathBuf;
use std::time::Duration;

use url::Url;

use crate::auth::{DEFAULT_COOKIE_FILE, LoginSettings};
use crate::error::AccessError;
use crate::fetch::{
    DEFAULT_FETCH_ATTEMPTS, DEFAULT_FETCH_DELAY, DEFAULT_MAX_SESSION_DURATION,
    DEFAULT_MIN_REQUEST_INTERVAL, HttpSettings, ProxySettings,
};

/// Content portal all article URLs must belong to.
pub const DEFAULT_CONTENT_BASE_URL: &str = "https://www.sciencedirect.com";

/// Portal SSO endpoint that starts the federated login.
pub const DEFAULT_SSO_ENDPOINT: &str = "https://sso.sciencedirect.com/v1/login";

/// Institutional identity provider entity id.
pub const DEFAULT_IDP_ENTITY: &str = "https://jaccount.sjtu.edu.cn/idp";

/// Email domain institutional identities must belong to.
pub const DEFAULT_INSTITUTION_DOMAIN: &str = "sjtu.edu.cn";

/// Text on the portal home page that only anonymous visitors see.
pub const ANONYMOUS_MARKER: &str = "Sign in";

/// Phrases in a content page meaning the session is no longer accepted.
pub const DEFAULT_RELOGIN_MARKERS: &[&str] = &[
    "Sign in",
    "Please sign in",
    "Access denied",
    "Please log in",
    "请登录",
    "访问受限",
];

/// Builds the federated SSO entry URL.
///
/// ```
/// use sciaccess_core::config::build_sso_login_url;
///
/// let url = build_sso_login_url(
///     "https://sso.example.com/v1/login",
///     "https://idp.example.edu/idp",
///     "https://portal.example.com",
/// );
/// assert_eq!(
///     url,
///     "https://sso.example.com/v1/login?federation=https://idp.example.edu/idp&returnUrl=https://portal.example.com"
/// );
/// ```
#[must_use]
pub fn build_sso_login_url(endpoint: &str, idp_entity: &str, return_url: &str) -> String {
    format!("{endpoint}?federation={idp_entity}&returnUrl={return_url}")
}

/// Everything needed to build a [`PaperAccessor`](crate::PaperAccessor).
#[derive(Debug, Clone)]
pub struct AccessorConfig {
    /// Base URL of the content portal; its host is the only allowed target.
    pub content_base_url: String,
    /// Federated SSO entry URL opened by the browser.
    pub sso_login_url: String,
    /// Email domain credentials must match.
    pub institution_domain: String,
    /// Minimum gap between outbound content requests.
    pub min_request_interval: Duration,
    /// Maximum session age before a fresh login is forced.
    pub max_session_duration: Duration,
    /// Where session cookies are persisted.
    pub cookie_file: PathBuf,
    /// Where login diagnostics are written; `None` disables them.
    pub artifacts_dir: Option<PathBuf>,
    /// Attempts per content request.
    pub fetch_max_attempts: u32,
    /// First backoff delay for content requests.
    pub fetch_initial_delay: Duration,
    /// Phrases that mark a page as requiring sign-in.
    pub relogin_markers: Vec<String>,
    /// Phrase that marks the portal home page as anonymous.
    pub anonymous_marker: String,
    /// Upper bound on one whole accessor operation.
    pub operation_timeout: Option<Duration>,
    /// Content client timeouts.
    pub http: HttpSettings,
    /// Proxy pool settings.
    pub proxy: ProxySettings,
    /// Login flow selectors and timings.
    pub login: LoginSettings,
}

impl Default for AccessorConfig {
    fn default() -> Self {
        Self {
            content_base_url: DEFAULT_CONTENT_BASE_URL.to_string(),
            sso_login_url: build_sso_login_url(
                DEFAULT_SSO_ENDPOINT,
                DEFAULT_IDP_ENTITY,
                DEFAULT_CONTENT_BASE_URL,
            ),
            institution_domain: DEFAULT_INSTITUTION_DOMAIN.to_string(),
            min_request_interval: DEFAULT_MIN_REQUEST_INTERVAL,
            max_session_duration: DEFAULT_MAX_SESSION_DURATION,
            cookie_file: PathBuf::from(DEFAULT_COOKIE_FILE),
            artifacts_dir: None,
            fetch_max_attempts: DEFAULT_FETCH_ATTEMPTS,
            fetch_initial_delay: DEFAULT_FETCH_DELAY,
            relogin_markers: DEFAULT_RELOGIN_MARKERS
                .iter()
                .map(ToString::to_string)
                .collect(),
            anonymous_marker: ANONYMOUS_MARKER.to_string(),
            operation_timeout: None,
            http: HttpSettings::default(),
            proxy: ProxySettings::default(),
            login: LoginSettings::default(),
        }
    }
}

impl AccessorConfig {
    /// Parses the content base URL.
    ///
    /// # Errors
    ///
    /// Returns [`AccessError::Configuration`] if it is not an absolute URL.
    pub fn content_url(&self) -> Result<Url, AccessError> {
        Url::parse(&self.content_base_url).map_err(|e| {
            AccessError::configuration(format!(
                "content_base_url '{}' is not a valid URL: {e}",
                self.content_base_url
            ))
        })
    }

    /// Returns the lowercased content host.
    ///
    /// # Errors
    ///
    /// Returns [`AccessError::Configuration`] if the base URL has no host.
    pub fn content_host(&self) -> Result<String, AccessError> {
        self.content_url()?
            .host_str()
            .map(str::to_ascii_lowercase)
            .ok_or_else(|| {
                AccessError::configuration(format!(
                    "content_base_url '{}' has no host",
                    self.content_base_url
                ))
            })
    }

    /// Checks values that would otherwise fail deep inside a fetch.
    ///
    /// # Errors
    ///
    /// Returns [`AccessError::Configuration`] naming the first bad field.
    pub fn validate(&self) -> Result<(), AccessError> {
        let content = self.content_url()?;
        if !matches!(content.scheme(), "http" | "https") {
            return Err(AccessError::configuration(format!(
                "content_base_url must be http(s), got '{}'",
                content.scheme()
            )));
        }
        self.content_host()?;
        Url::parse(&self.sso_login_url).map_err(|e| {
            AccessError::configuration(format!(
                "sso_login_url '{}' is not a valid URL: {e}",
                self.sso_login_url
            ))
        })?;
        if self.institution_domain.trim().is_empty() {
            return Err(AccessError::configuration("institution_domain is empty"));
        }
        if self.max_session_duration.is_zero() {
            return Err(AccessError::configuration(
                "max_session_duration must be greater than zero",
            ));
        }
        if self.fetch_max_attempts == 0 {
            return Err(AccessError::configuration(
                "fetch_max_attempts must be at least 1",
            ));
        }
        if self.login.max_attempts == 0 {
            return Err(AccessError::configuration(
                "login max_attempts must be at least 1",
            ));
        }
        if self.login.captcha_timeout.is_zero() {
            return Err(AccessError::configuration(
                "captcha_timeout must be greater than zero",
            ));
        }
        if self.login.human_pause_min > self.login.human_pause_max {
            return Err(AccessError::configuration(
                "human_pause_min must not exceed human_pause_max",
            ));
        }
        if self.relogin_markers.iter().all(|m| m.trim().is_empty()) {
            return Err(AccessError::configuration(
                "relogin_markers must contain at least one phrase",
            ));
        }
        if let Some(source) = &self.proxy.source_url {
            Url::parse(source).map_err(|e| {
                AccessError::configuration(format!("proxy source '{source}' is not a valid URL: {e}"))
            })?;
        }
        if self.proxy.require_proxy && self.proxy.source_url.is_none() {
            return Err(AccessError::configuration(
                "require_proxy is set but no proxy source is configured",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = AccessorConfig::default();
        config.validate().unwrap();
        assert_eq!(config.content_host().unwrap(), "www.sciencedirect.com");
        assert_eq!(config.min_request_interval, Duration::from_secs(5));
        assert_eq!(config.max_session_duration, Duration::from_secs(3600));
        assert_eq!(config.login.captcha_timeout, Duration::from_secs(300));
        assert_eq!(config.relogin_markers.len(), 6);
    }

    #[test]
    fn test_default_sso_url_carries_federation_and_return() {
        let config = AccessorConfig::default();
        assert_eq!(
            config.sso_login_url,
            "https://sso.sciencedirect.com/v1/login?federation=https://jaccount.sjtu.edu.cn/idp&returnUrl=https://www.sciencedirect.com"
        );
    }

    #[test]
    fn test_validate_rejects_bad_base_url() {
        let config = AccessorConfig {
            content_base_url: "not a url".to_string(),
            ..AccessorConfig::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("content_base_url"), "got: {err}");
    }

    #[test]
    fn test_validate_rejects_required_proxy_without_source() {
        let mut config = AccessorConfig::default();
        config.proxy.require_proxy = true;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("require_proxy"), "got: {err}");
    }

    #[test]
    fn test_validate_rejects_inverted_pause_range() {
        let mut config = AccessorConfig::default();
        config.login.human_pause_min = Duration::from_secs(3);
        config.login.human_pause_max = Duration::from_secs(1);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_content_host_is_lowercased() {
        let config = AccessorConfig {
            content_base_url: "https://WWW.Example.COM/".to_string(),
            ..AccessorConfig::default()
        };
        assert_eq!(config.content_host().unwrap(), "www.example.com");
    }
}
