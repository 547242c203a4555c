//! Error types for the accessor.
//!
//! [`AccessError`] is the single error surfaced to callers. Structural failures
//! (bad configuration, exhausted login attempts, blocked access, unusable
//! content) carry enough context to diagnose; transient transport failures are
//! classified by [`AccessError::is_retryable`] so call sites can retry them.
//!
//! Session expiry is deliberately absent: it is reported as
//! [`Clearance::SessionExpired`](crate::fetch::Clearance) and handled inside the
//! fetch path.

use std::time::Duration;

use thiserror::Error;

use crate::auth::CookieStoreError;
use crate::browser::DriverError;

/// Errors that can occur while authenticating, fetching or extracting articles.
#[derive(Debug, Error)]
pub enum AccessError {
    /// Missing or malformed credentials or configuration values.
    #[error("invalid configuration: {reason}")]
    Configuration {
        /// What was wrong with the supplied value.
        reason: String,
    },

    /// The login state machine failed on every attempt.
    #[error("authentication failed after {attempts} attempt(s): {source}")]
    Authentication {
        /// Number of login attempts made.
        attempts: u32,
        /// The error from the last attempt.
        #[source]
        source: Box<AccessError>,
    },

    /// The portal put the browser on an explicit block or error page while
    /// waiting for a human to solve the CAPTCHA.
    #[error("CAPTCHA gate reported a blocked state at {url}")]
    CaptchaBlocked {
        /// Browser location when the block was detected.
        url: String,
    },

    /// The portal still asked for sign-in after a fresh login.
    #[error("portal still requires sign-in for {url} after re-authentication")]
    SessionRejected {
        /// The article URL being fetched.
        url: String,
    },

    /// Transport-level failure (DNS, connect, TLS, body read).
    #[error("network error fetching {url}: {source}")]
    Network {
        /// The URL being requested.
        url: String,
        /// The underlying reqwest error.
        #[source]
        source: reqwest::Error,
    },

    /// The portal answered with a non-success status.
    #[error("HTTP {status} fetching {url}")]
    HttpStatus {
        /// The URL being requested.
        url: String,
        /// The HTTP status code.
        status: u16,
    },

    /// A bounded wait ran out.
    #[error("{operation} timed out after {after:?}")]
    Timeout {
        /// What was being waited for.
        operation: String,
        /// The bound that was exceeded.
        after: Duration,
    },

    /// The URL does not belong to the content host.
    #[error("refusing to fetch {url}: host is not {expected_host}")]
    InvalidTarget {
        /// The rejected URL.
        url: String,
        /// The only host content requests may go to.
        expected_host: String,
    },

    /// The page was fetched but lacks the fields a usable record needs.
    #[error("article at {url} is missing required fields: {}", .missing.join(", "))]
    ExtractionValidation {
        /// The article URL.
        url: String,
        /// Names of the fields that came back empty.
        missing: Vec<&'static str>,
    },

    /// A proxy is required but none passed validation.
    #[error("no working proxy available and direct connections are disabled")]
    NoProxyAvailable,

    /// The HTTP client could not be constructed.
    #[error("failed to build HTTP client: {0}")]
    HttpClient(#[source] reqwest::Error),

    /// Browser driver failure.
    #[error(transparent)]
    Driver(#[from] DriverError),

    /// Cookie persistence failure.
    #[error(transparent)]
    CookieStore(#[from] CookieStoreError),

    /// The caller cancelled the operation.
    #[error("operation cancelled")]
    Cancelled,
}

impl AccessError {
    /// Creates a configuration error.
    pub fn configuration(reason: impl Into<String>) -> Self {
        Self::Configuration {
            reason: reason.into(),
        }
    }

    /// Wraps the last login failure once the attempt ceiling is reached.
    #[must_use]
    pub fn authentication(attempts: u32, last: AccessError) -> Self {
        Self::Authentication {
            attempts,
            source: Box::new(last),
        }
    }

    /// Creates a CAPTCHA-blocked error.
    pub fn captcha_blocked(url: impl Into<String>) -> Self {
        Self::CaptchaBlocked { url: url.into() }
    }

    /// Creates a session-rejected error.
    pub fn session_rejected(url: impl Into<String>) -> Self {
        Self::SessionRejected { url: url.into() }
    }

    /// Creates a network error from a reqwest error.
    pub fn network(url: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Network {
            url: url.into(),
            source,
        }
    }

    /// Creates an HTTP status error.
    pub fn http_status(url: impl Into<String>, status: u16) -> Self {
        Self::HttpStatus {
            url: url.into(),
            status,
        }
    }

    /// Creates a timeout error.
    pub fn timeout(operation: impl Into<String>, after: Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            after,
        }
    }

    /// Creates an invalid-target error.
    pub fn invalid_target(url: impl Into<String>, expected_host: impl Into<String>) -> Self {
        Self::InvalidTarget {
            url: url.into(),
            expected_host: expected_host.into(),
        }
    }

    /// Creates an extraction-validation error.
    pub fn extraction_validation(url: impl Into<String>, missing: Vec<&'static str>) -> Self {
        Self::ExtractionValidation {
            url: url.into(),
            missing,
        }
    }

    /// Returns true for failures a content request may recover from on retry.
    ///
    /// Transport errors and timeouts are retryable, as are 408, 429 and 5xx
    /// responses. Everything else is structural.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Network { .. } | Self::Timeout { .. } => true,
            Self::HttpStatus { status, .. } => {
                matches!(*status, 408 | 429) || (500..600).contains(status)
            }
            _ => false,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_access_error_http_status_display() {
        let error = AccessError::http_status("https://www.sciencedirect.com/x", 503);
        let msg = error.to_string();
        assert!(msg.contains("503"), "Expected '503' in: {msg}");
        assert!(
            msg.contains("https://www.sciencedirect.com/x"),
            "Expected URL in: {msg}"
        );
    }

    #[test]
    fn test_access_error_timeout_display_whole_seconds() {
        let error = AccessError::timeout("CAPTCHA resolution", Duration::from_secs(300));
        assert_eq!(error.to_string(), "CAPTCHA resolution timed out after 300s");
    }

    #[test]
    fn test_access_error_timeout_display_keeps_sub_second_bounds() {
        let error = AccessError::timeout("post-login redirect", Duration::from_millis(30));
        assert_eq!(error.to_string(), "post-login redirect timed out after 30ms");
    }

    #[test]
    fn test_access_error_extraction_lists_missing_fields() {
        let error =
            AccessError::extraction_validation("https://x/y", vec!["authors", "abstract"]);
        let msg = error.to_string();
        assert!(msg.contains("authors, abstract"), "got: {msg}");
    }

    #[test]
    fn test_access_error_authentication_keeps_last_error() {
        let error = AccessError::authentication(3, AccessError::captcha_blocked("https://b/blocked"));
        assert!(error.to_string().contains("after 3 attempt(s)"));
        let AccessError::Authentication { source, .. } = error else {
            panic!("expected Authentication variant");
        };
        assert!(matches!(*source, AccessError::CaptchaBlocked { .. }));
    }

    #[test]
    fn test_access_error_retryable_classification() {
        assert!(AccessError::http_status("u", 503).is_retryable());
        assert!(AccessError::http_status("u", 429).is_retryable());
        assert!(AccessError::http_status("u", 408).is_retryable());
        assert!(AccessError::timeout("op", Duration::from_secs(1)).is_retryable());
        assert!(!AccessError::http_status("u", 404).is_retryable());
        assert!(!AccessError::invalid_target("u", "h").is_retryable());
        assert!(!AccessError::Cancelled.is_retryable());
        assert!(!AccessError::configuration("bad").is_retryable());
    }
}
