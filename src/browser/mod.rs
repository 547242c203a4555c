//! Browser automation seam used by the login state machine.
//!
//! The core drives a real browser only through [`BrowserDriver`], obtained from
//! a [`DriverFactory`]. Each login attempt launches a fresh driver with a new
//! [`Fingerprint`] and quits it when the attempt ends, successful or not.
//!
//! The shipped adapter is [`ChromiumFactory`] (feature `chromium`); tests use
//! scripted drivers.

use async_trait::async_trait;

use crate::auth::StoredCookie;
use crate::fetch::ProxyEntry;

#[cfg(feature = "chromium")]
mod chromium;
mod fingerprint;

#[cfg(feature = "chromium")]
pub use chromium::ChromiumFactory;
pub use fingerprint::{DEVICE_MEMORY_GB, Fingerprint, LOCALES, TIMEZONES};

/// Errors raised by a browser driver.
#[derive(Debug, thiserror::Error)]
pub enum DriverError {
    /// The browser process or page could not be started.
    #[error("failed to launch browser: {0}")]
    Launch(String),

    /// A command sent to a running browser failed.
    #[error("browser command '{action}' failed: {message}")]
    Command {
        /// The driver operation that failed.
        action: &'static str,
        /// The driver's error message.
        message: String,
    },

    /// No element matched a selector the operation requires.
    #[error("no element matches selector '{0}'")]
    ElementNotFound(String),
}

impl DriverError {
    /// Creates a command error.
    pub fn command(action: &'static str, message: impl Into<String>) -> Self {
        Self::Command {
            action,
            message: message.into(),
        }
    }
}

/// A live browser session.
///
/// Selectors are CSS selectors. Methods take `&self`; implementations
/// synchronize internally.
#[async_trait]
pub trait BrowserDriver: Send + Sync {
    /// Loads `url` in the current page.
    async fn navigate(&self, url: &str) -> Result<(), DriverError>;

    /// Returns the current page location.
    async fn current_url(&self) -> Result<String, DriverError>;

    /// Returns true when at least one element matches `selector`.
    async fn is_present(&self, selector: &str) -> Result<bool, DriverError>;

    /// Returns true when the first match is visible and enabled.
    async fn is_clickable(&self, selector: &str) -> Result<bool, DriverError>;

    /// Returns `attribute` of every element matching `selector` that has it.
    async fn attribute_values(
        &self,
        selector: &str,
        attribute: &str,
    ) -> Result<Vec<String>, DriverError>;

    /// Empties the input matched by `selector`.
    async fn clear(&self, selector: &str) -> Result<(), DriverError>;

    /// Focuses the input matched by `selector` and types `text` into it.
    async fn type_into(&self, selector: &str, text: &str) -> Result<(), DriverError>;

    /// Clicks the element matched by `selector`.
    async fn click(&self, selector: &str) -> Result<(), DriverError>;

    /// Returns every cookie visible to the browser session.
    async fn cookies(&self) -> Result<Vec<StoredCookie>, DriverError>;

    /// Returns the serialized DOM of the current page.
    async fn page_source(&self) -> Result<String, DriverError>;

    /// Returns a full-page PNG screenshot.
    async fn screenshot(&self) -> Result<Vec<u8>, DriverError>;

    /// Shuts the browser down.
    async fn quit(&self) -> Result<(), DriverError>;
}

/// Launches browser sessions.
#[async_trait]
pub trait DriverFactory: Send + Sync {
    /// Starts a fresh browser with `fingerprint` applied, optionally routed
    /// through `proxy`.
    async fn launch(
        &self,
        fingerprint: &Fingerprint,
        proxy: Option<&ProxyEntry>,
    ) -> Result<Box<dyn BrowserDriver>, DriverError>;
}
