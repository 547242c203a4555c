//! Chromium adapter over the Chrome DevTools Protocol.
//!
//! The browser runs headed by default so a human can solve a CAPTCHA in the
//! window. The fingerprint is applied through launch flags plus CDP overrides,
//! and the stealth script is registered to run before any page script.

use std::path::PathBuf;

use async_trait::async_trait;
use chromiumoxide::Page;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::emulation::{
    SetTimezoneOverrideParams, SetUserAgentOverrideParams,
};
use chromiumoxide::cdp::browser_protocol::network::Cookie;
use chromiumoxide::cdp::browser_protocol::page::AddScriptToEvaluateOnNewDocumentParams;
use chromiumoxide::error::CdpError;
use chromiumoxide::page::ScreenshotParams;
use futures_util::StreamExt;
use serde::de::DeserializeOwned;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, instrument, warn};

use crate::auth::StoredCookie;
use crate::fetch::ProxyEntry;
use crate::user_agent::BROWSER_USER_AGENT;

use super::{BrowserDriver, DriverError, DriverFactory, Fingerprint};

/// Launches Chromium through chromiumoxide.
#[derive(Debug, Clone, Default)]
pub struct ChromiumFactory {
    headless: bool,
    executable: Option<PathBuf>,
}

impl ChromiumFactory {
    /// Creates a factory; headed unless `headless` is set.
    #[must_use]
    pub fn new(headless: bool) -> Self {
        Self {
            headless,
            executable: None,
        }
    }

    /// Uses an explicit Chrome/Chromium binary instead of auto-detection.
    #[must_use]
    pub fn with_executable(mut self, path: impl Into<PathBuf>) -> Self {
        self.executable = Some(path.into());
        self
    }
}

#[async_trait]
impl DriverFactory for ChromiumFactory {
    #[instrument(skip(self, fingerprint, proxy), fields(headless = self.headless))]
    async fn launch(
        &self,
        fingerprint: &Fingerprint,
        proxy: Option<&ProxyEntry>,
    ) -> Result<Box<dyn BrowserDriver>, DriverError> {
        let mut builder = BrowserConfig::builder()
            .window_size(fingerprint.width, fingerprint.height)
            .arg("--disable-blink-features=AutomationControlled")
            .arg(format!("--lang={}", fingerprint.primary_language()));
        if !self.headless {
            builder = builder.with_head();
        }
        if let Some(path) = &self.executable {
            builder = builder.chrome_executable(path);
        }
        if let Some(server) = proxy.and_then(ProxyEntry::browser_server) {
            builder = builder.arg(format!("--proxy-server={server}"));
        }
        let config = builder.build().map_err(DriverError::Launch)?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| DriverError::Launch(e.to_string()))?;
        let events = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        });

        let page = match browser.new_page("about:blank").await {
            Ok(page) => page,
            Err(error) => {
                events.abort();
                return Err(DriverError::Launch(error.to_string()));
            }
        };

        let driver = ChromiumDriver {
            browser: Mutex::new(browser),
            page,
            events,
        };
        if let Err(error) = driver.prepare(fingerprint).await {
            if let Err(quit_error) = driver.quit().await {
                warn!(error = %quit_error, "failed to close browser after setup error");
            }
            return Err(error);
        }

        debug!(
            width = fingerprint.width,
            height = fingerprint.height,
            timezone = fingerprint.timezone,
            "browser launched"
        );
        Ok(Box::new(driver))
    }
}

struct ChromiumDriver {
    browser: Mutex<Browser>,
    page: Page,
    events: JoinHandle<()>,
}

fn command(action: &'static str) -> impl FnOnce(CdpError) -> DriverError {
    move |error| DriverError::command(action, error.to_string())
}

fn js_string(action: &'static str, value: &str) -> Result<String, DriverError> {
    serde_json::to_string(value).map_err(|e| DriverError::command(action, e.to_string()))
}

impl ChromiumDriver {
    async fn prepare(&self, fingerprint: &Fingerprint) -> Result<(), DriverError> {
        self.page
            .execute(AddScriptToEvaluateOnNewDocumentParams::new(
                fingerprint.stealth_script(),
            ))
            .await
            .map_err(command("inject_script"))?;
        self.page
            .execute(SetTimezoneOverrideParams::new(fingerprint.timezone))
            .await
            .map_err(command("set_timezone"))?;
        let mut agent = SetUserAgentOverrideParams::new(BROWSER_USER_AGENT);
        agent.accept_language = Some(fingerprint.locale.to_string());
        self.page
            .execute(agent)
            .await
            .map_err(command("set_user_agent"))?;
        Ok(())
    }

    async fn evaluate<T: DeserializeOwned>(
        &self,
        action: &'static str,
        expression: String,
    ) -> Result<T, DriverError> {
        self.page
            .evaluate(expression)
            .await
            .map_err(command(action))?
            .into_value::<T>()
            .map_err(|e| DriverError::command(action, e.to_string()))
    }
}

#[allow(clippy::cast_possible_truncation)]
fn stored_cookie(cookie: Cookie) -> StoredCookie {
    let mut stored = StoredCookie::new(cookie.name, cookie.value)
        .with_domain(cookie.domain)
        .with_path(cookie.path);
    if !cookie.session && cookie.expires > 0.0 {
        stored.expiry = Some(cookie.expires as i64);
    }
    stored.secure = cookie.secure;
    stored.http_only = cookie.http_only;
    stored.same_site = cookie.same_site.map(|policy| format!("{policy:?}"));
    stored
}

#[async_trait]
impl BrowserDriver for ChromiumDriver {
    async fn navigate(&self, url: &str) -> Result<(), DriverError> {
        self.page
            .goto(url)
            .await
            .map(|_| ())
            .map_err(command("navigate"))
    }

    async fn current_url(&self) -> Result<String, DriverError> {
        let url = self.page.url().await.map_err(command("current_url"))?;
        Ok(url.unwrap_or_default())
    }

    async fn is_present(&self, selector: &str) -> Result<bool, DriverError> {
        let selector = js_string("is_present", selector)?;
        self.evaluate(
            "is_present",
            format!("document.querySelector({selector}) !== null"),
        )
        .await
    }

    async fn is_clickable(&self, selector: &str) -> Result<bool, DriverError> {
        let selector = js_string("is_clickable", selector)?;
        self.evaluate(
            "is_clickable",
            format!(
                "(() => {{ const el = document.querySelector({selector}); \
                 if (!el) return false; const rect = el.getBoundingClientRect(); \
                 return !el.disabled && rect.width > 0 && rect.height > 0; }})()"
            ),
        )
        .await
    }

    async fn attribute_values(
        &self,
        selector: &str,
        attribute: &str,
    ) -> Result<Vec<String>, DriverError> {
        let selector = js_string("attribute_values", selector)?;
        let attribute = js_string("attribute_values", attribute)?;
        self.evaluate(
            "attribute_values",
            format!(
                "Array.from(document.querySelectorAll({selector}))\
                 .map(el => el.getAttribute({attribute}))\
                 .filter(value => value !== null)"
            ),
        )
        .await
    }

    async fn clear(&self, selector: &str) -> Result<(), DriverError> {
        let quoted = js_string("clear", selector)?;
        let found: bool = self
            .evaluate(
                "clear",
                format!(
                    "(() => {{ const el = document.querySelector({quoted}); \
                     if (!el) return false; el.value = ''; \
                     el.dispatchEvent(new Event('input', {{ bubbles: true }})); return true; }})()"
                ),
            )
            .await?;
        if found {
            Ok(())
        } else {
            Err(DriverError::ElementNotFound(selector.to_string()))
        }
    }

    async fn type_into(&self, selector: &str, text: &str) -> Result<(), DriverError> {
        let element = self
            .page
            .find_element(selector)
            .await
            .map_err(|_| DriverError::ElementNotFound(selector.to_string()))?;
        element.click().await.map_err(command("focus"))?;
        element.type_str(text).await.map_err(command("type"))?;
        Ok(())
    }

    async fn click(&self, selector: &str) -> Result<(), DriverError> {
        let quoted = js_string("click", selector)?;
        let found: bool = self
            .evaluate(
                "click",
                format!(
                    "(() => {{ const el = document.querySelector({quoted}); \
                     if (!el) return false; el.click(); return true; }})()"
                ),
            )
            .await?;
        if found {
            Ok(())
        } else {
            Err(DriverError::ElementNotFound(selector.to_string()))
        }
    }

    async fn cookies(&self) -> Result<Vec<StoredCookie>, DriverError> {
        let cookies = self.page.get_cookies().await.map_err(command("cookies"))?;
        Ok(cookies.into_iter().map(stored_cookie).collect())
    }

    async fn page_source(&self) -> Result<String, DriverError> {
        self.page.content().await.map_err(command("page_source"))
    }

    async fn screenshot(&self) -> Result<Vec<u8>, DriverError> {
        self.page
            .screenshot(ScreenshotParams::builder().full_page(true).build())
            .await
            .map_err(command("screenshot"))
    }

    async fn quit(&self) -> Result<(), DriverError> {
        let mut browser = self.browser.lock().await;
        let closed = browser.close().await.map(|_| ()).map_err(command("quit"));
        if let Err(error) = browser.wait().await {
            debug!(error = %error, "browser process wait failed");
        }
        self.events.abort();
        closed
    }
}
