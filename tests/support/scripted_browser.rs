//! Scripted browser driver for exercising the login state machine offline.

use std::sync::{Arc, Mutex};
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use sciaccess_core::auth::StoredCookie;
use sciaccess_core::browser::{BrowserDriver, DriverError, DriverFactory, Fingerprint};
use sciaccess_core::{LoginSettings, ProxyEntry};

pub const CHALLENGE_FRAME: &str = "https://captcha.example.test/Challenge?k=1";
pub const SSO_BLOCKED_URL: &str = "https://sso.example.test/blocked";
pub const IDP_LOGIN_URL: &str = "https://idp.example.test/jaccount/login";

/// How the CAPTCHA behaves for every launched driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Challenge {
    /// No challenge frame is ever shown.
    None,
    /// The frame disappears after this many location polls; the browser then
    /// moves to the factory's cleared URL.
    SolvedAfter(u32),
    /// The portal reports a block as soon as the gate polls.
    Blocked,
    /// The frame never goes away.
    Unsolved,
}

/// Login settings with every wait shrunk for tests.
#[must_use]
pub fn fast_login_settings() -> LoginSettings {
    LoginSettings {
        max_attempts: 3,
        retry_step: Duration::ZERO,
        settle: Duration::ZERO,
        poll_interval: Duration::from_millis(5),
        captcha_poll: Duration::from_millis(5),
        captcha_timeout: Duration::from_millis(100),
        element_timeout: Duration::from_secs(1),
        redirect_timeout: Duration::from_secs(1),
        human_pause_min: Duration::ZERO,
        human_pause_max: Duration::ZERO,
        ..LoginSettings::default()
    }
}

/// Factory handing out [`ScriptedDriver`]s and counting launches.
#[derive(Debug)]
pub struct ScriptedFactory {
    landing_url: String,
    cleared_url: Option<String>,
    challenge: Challenge,
    cookies: Vec<StoredCookie>,
    failing_launches: u32,
    launches: AtomicU32,
    typed: Arc<Mutex<Vec<(String, String)>>>,
}

impl ScriptedFactory {
    /// Drivers land on `landing_url` after the form is submitted.
    #[must_use]
    pub fn new(landing_url: impl Into<String>) -> Self {
        Self {
            landing_url: landing_url.into(),
            cleared_url: None,
            challenge: Challenge::None,
            cookies: vec![StoredCookie::new("SDSESSION", "abc")],
            failing_launches: 0,
            launches: AtomicU32::new(0),
            typed: Arc::new(Mutex::new(Vec::new())),
        }
    }

    #[must_use]
    pub fn with_challenge(mut self, challenge: Challenge) -> Self {
        self.challenge = challenge;
        self
    }

    /// Where a solved challenge leaves the browser; defaults to the landing URL.
    #[must_use]
    pub fn clearing_onto(mut self, url: impl Into<String>) -> Self {
        self.cleared_url = Some(url.into());
        self
    }

    #[must_use]
    pub fn with_cookies(mut self, cookies: Vec<StoredCookie>) -> Self {
        self.cookies = cookies;
        self
    }

    /// The first `count` launches fail.
    #[must_use]
    pub fn failing_launches(mut self, count: u32) -> Self {
        self.failing_launches = count;
        self
    }

    pub fn launch_count(&self) -> u32 {
        self.launches.load(Ordering::SeqCst)
    }

    /// `(selector, text)` pairs typed across all drivers.
    pub fn typed(&self) -> Vec<(String, String)> {
        self.typed.lock().unwrap().clone()
    }
}

#[async_trait]
impl DriverFactory for ScriptedFactory {
    async fn launch(
        &self,
        _fingerprint: &Fingerprint,
        _proxy: Option<&ProxyEntry>,
    ) -> Result<Box<dyn BrowserDriver>, DriverError> {
        let launch = self.launches.fetch_add(1, Ordering::SeqCst);
        if launch < self.failing_launches {
            return Err(DriverError::Launch(format!("scripted launch failure {launch}")));
        }
        let challenge_polls = match self.challenge {
            Challenge::None => None,
            Challenge::SolvedAfter(polls) => Some(polls),
            Challenge::Blocked | Challenge::Unsolved => Some(u32::MAX),
        };
        Ok(Box::new(ScriptedDriver {
            landing_url: self.landing_url.clone(),
            cleared_url: self
                .cleared_url
                .clone()
                .unwrap_or_else(|| self.landing_url.clone()),
            blocked: self.challenge == Challenge::Blocked,
            cookies: self.cookies.clone(),
            state: Mutex::new(DriverState {
                url: "about:blank".to_string(),
                challenge_polls,
            }),
            typed: Arc::clone(&self.typed),
        }))
    }
}

#[derive(Debug)]
struct DriverState {
    url: String,
    /// Remaining polls until the challenge clears; `None` once solved.
    challenge_polls: Option<u32>,
}

/// Driver whose page reacts to the login flow without a real browser.
#[derive(Debug)]
pub struct ScriptedDriver {
    landing_url: String,
    cleared_url: String,
    blocked: bool,
    cookies: Vec<StoredCookie>,
    state: Mutex<DriverState>,
    typed: Arc<Mutex<Vec<(String, String)>>>,
}

#[async_trait]
impl BrowserDriver for ScriptedDriver {
    async fn navigate(&self, url: &str) -> Result<(), DriverError> {
        self.state.lock().unwrap().url = url.to_string();
        Ok(())
    }

    async fn current_url(&self) -> Result<String, DriverError> {
        let mut state = self.state.lock().unwrap();
        if let Some(remaining) = state.challenge_polls {
            if self.blocked {
                state.url = SSO_BLOCKED_URL.to_string();
            } else if remaining == 0 {
                state.challenge_polls = None;
                state.url.clone_from(&self.cleared_url);
            } else if remaining != u32::MAX {
                state.challenge_polls = Some(remaining - 1);
            }
        }
        Ok(state.url.clone())
    }

    async fn is_present(&self, _selector: &str) -> Result<bool, DriverError> {
        Ok(true)
    }

    async fn is_clickable(&self, _selector: &str) -> Result<bool, DriverError> {
        Ok(true)
    }

    async fn attribute_values(
        &self,
        selector: &str,
        attribute: &str,
    ) -> Result<Vec<String>, DriverError> {
        let state = self.state.lock().unwrap();
        if selector == "iframe" && attribute == "src" && state.challenge_polls.is_some() {
            Ok(vec![CHALLENGE_FRAME.to_string()])
        } else {
            Ok(Vec::new())
        }
    }

    async fn clear(&self, _selector: &str) -> Result<(), DriverError> {
        Ok(())
    }

    async fn type_into(&self, selector: &str, text: &str) -> Result<(), DriverError> {
        self.typed
            .lock()
            .unwrap()
            .push((selector.to_string(), text.to_string()));
        Ok(())
    }

    async fn click(&self, _selector: &str) -> Result<(), DriverError> {
        self.state.lock().unwrap().url.clone_from(&self.landing_url);
        Ok(())
    }

    async fn cookies(&self) -> Result<Vec<StoredCookie>, DriverError> {
        Ok(self.cookies.clone())
    }

    async fn page_source(&self) -> Result<String, DriverError> {
        let url = self.state.lock().unwrap().url.clone();
        Ok(format!("<html><body>scripted page at {url}</body></html>"))
    }

    async fn screenshot(&self) -> Result<Vec<u8>, DriverError> {
        Ok(b"\x89PNG\r\n\x1a\n".to_vec())
    }

    async fn quit(&self) -> Result<(), DriverError> {
        Ok(())
    }
}
