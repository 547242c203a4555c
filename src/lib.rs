//! Sciaccess Core Library
//!
//! Authenticated retrieval of article pages from a publisher portal that sits
//! behind institutional single sign-on and anti-automation defenses.
//!
//! # Architecture
//!
//! - [`auth`] - Credentials, the SSO login state machine and cookie persistence
//! - [`browser`] - Browser-driver seam, fingerprints and the Chromium adapter
//! - [`fetch`] - Session guard, retry policy, proxy pool and the content fetcher
//! - [`extract`] - Article field extraction and validation
//! - [`accessor`] - The [`PaperAccessor`] facade tying it together
//!
//! Components never read global state: an [`AccessorConfig`] and
//! [`Credentials`] are passed in when the accessor is built.

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod accessor;
pub mod auth;
pub mod browser;
pub mod cancel;
pub mod config;
pub mod error;
pub mod extract;
pub mod fetch;
pub mod user_agent;
pub mod utils;

// Re-export commonly used types
pub use accessor::PaperAccessor;
pub use auth::{Authenticator, CookieStore, Credentials, LoginSettings, LoginState, StoredCookie};
#[cfg(feature = "chromium")]
pub use browser::ChromiumFactory;
pub use browser::{BrowserDriver, DriverError, DriverFactory, Fingerprint};
pub use cancel::CancelToken;
pub use config::AccessorConfig;
pub use error::AccessError;
pub use extract::{PaperRecord, extract_paper, validate_record};
pub use fetch::{
    Clearance, ContentFetcher, PageCheck, ProxyEntry, ProxyPool, ProxySettings, RetryPolicy,
    Session, SessionGuard, needs_relogin, validate_url,
};
