//! Request pacing and session-age enforcement.
//!
//! Every outbound content request passes through [`SessionGuard::clear`],
//! which first enforces the minimum gap between requests and then checks the
//! age of the in-memory [`Session`]. The outcome is an explicit [`Clearance`]
//! value; the caller re-authenticates on anything but
//! [`Clearance::Granted`].
//!
//! Timing uses `tokio::time::Instant` so tests can drive the clock with
//! `tokio::time::pause()`.

use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, instrument};

use crate::auth::StoredCookie;

/// Default minimum gap between two content requests.
pub const DEFAULT_MIN_REQUEST_INTERVAL: Duration = Duration::from_secs(5);

/// Default maximum age of an authenticated session.
pub const DEFAULT_MAX_SESSION_DURATION: Duration = Duration::from_secs(3600);

/// Authenticated state: the cookie set plus its timestamps.
#[derive(Debug, Clone)]
pub struct Session {
    cookies: Vec<StoredCookie>,
    started_at: Instant,
    last_request_at: Option<Instant>,
}

impl Session {
    /// Starts a session from a freshly captured or restored cookie set.
    #[must_use]
    pub fn new(cookies: Vec<StoredCookie>) -> Self {
        Self {
            cookies,
            started_at: Instant::now(),
            last_request_at: None,
        }
    }

    /// Returns the session cookies.
    #[must_use]
    pub fn cookies(&self) -> &[StoredCookie] {
        &self.cookies
    }

    /// Returns when the session was established.
    #[must_use]
    pub fn started_at(&self) -> Instant {
        self.started_at
    }

    /// Returns when the session last cleared the guard, if ever.
    #[must_use]
    pub fn last_request_at(&self) -> Option<Instant> {
        self.last_request_at
    }

    /// Returns how long ago the session was established.
    #[must_use]
    pub fn age(&self) -> Duration {
        self.started_at.elapsed()
    }

    fn touch(&mut self, at: Instant) {
        self.last_request_at = Some(at);
    }
}

/// Outcome of a guard check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Clearance {
    /// The request may proceed with the current session.
    Granted,
    /// There is no session; the caller must log in.
    NeedsLogin,
    /// The session exceeded its maximum age and was dropped.
    SessionExpired,
}

/// Rate limiter and session-age check wrapped around every content request.
#[derive(Debug)]
pub struct SessionGuard {
    min_request_interval: Duration,
    max_session_duration: Duration,
    /// `None` until the first request passes the guard.
    last_request: Mutex<Option<Instant>>,
}

impl SessionGuard {
    /// Creates a guard with the given pacing and session-age limits.
    #[must_use]
    pub fn new(min_request_interval: Duration, max_session_duration: Duration) -> Self {
        Self {
            min_request_interval,
            max_session_duration,
            last_request: Mutex::new(None),
        }
    }

    /// Returns the minimum gap between requests.
    #[must_use]
    pub fn min_request_interval(&self) -> Duration {
        self.min_request_interval
    }

    /// Returns the maximum session age.
    #[must_use]
    pub fn max_session_duration(&self) -> Duration {
        self.max_session_duration
    }

    /// Blocks until at least `min_request_interval` has passed since the last
    /// throttled request, then records the current instant.
    ///
    /// Returns how long the call waited.
    #[instrument(skip(self), fields(interval_ms = self.min_request_interval.as_millis()))]
    pub async fn throttle(&self) -> Duration {
        let mut last_request = self.last_request.lock().await;

        let mut waited = Duration::ZERO;
        if let Some(previous) = *last_request {
            let elapsed = previous.elapsed();
            if elapsed < self.min_request_interval {
                waited = self.min_request_interval.saturating_sub(elapsed);
                debug!(delay_ms = waited.as_millis(), "applying request interval");
                tokio::time::sleep(waited).await;
            }
        }

        // Recorded after any delay
        *last_request = Some(Instant::now());
        waited
    }

    /// Returns true while `session` is younger than the maximum duration.
    #[must_use]
    pub fn is_session_valid(&self, session: &Session) -> bool {
        session.age() <= self.max_session_duration
    }

    /// Paces the request, then checks the session.
    ///
    /// An expired session is dropped from `session`; a valid one has its
    /// last-request time updated.
    pub async fn clear(&self, session: &mut Option<Session>) -> Clearance {
        self.throttle().await;

        let Some(current) = session.as_mut() else {
            debug!("no session held");
            return Clearance::NeedsLogin;
        };

        if !self.is_session_valid(current) {
            info!(
                age_secs = current.age().as_secs(),
                max_secs = self.max_session_duration.as_secs(),
                "session expired"
            );
            *session = None;
            return Clearance::SessionExpired;
        }

        current.touch(Instant::now());
        Clearance::Granted
    }
}
