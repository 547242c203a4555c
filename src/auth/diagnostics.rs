//! Post-mortem artifacts written during login.
//!
//! Page snapshots (`<label>_<attempt>.html`) and screenshots
//! (`<label>_<attempt>.png`) are written to the artifacts directory when one is
//! configured. They are a debugging side channel: write failures are logged and
//! never interrupt the login flow.

use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::browser::BrowserDriver;

/// Writer for login diagnostics.
#[derive(Debug, Clone, Default)]
pub struct Diagnostics {
    dir: Option<PathBuf>,
}

impl Diagnostics {
    /// Creates a writer; `None` disables artifacts entirely.
    #[must_use]
    pub fn new(dir: Option<PathBuf>) -> Self {
        Self { dir }
    }

    /// Returns the artifacts directory, if enabled.
    #[must_use]
    pub fn dir(&self) -> Option<&Path> {
        self.dir.as_deref()
    }

    /// Writes the current page source as `<label>_<attempt>.html`.
    pub async fn snapshot(&self, driver: &dyn BrowserDriver, label: &str, attempt: u32) {
        let Some(dir) = self.dir.as_deref() else {
            return;
        };
        match driver.page_source().await {
            Ok(html) => write_artifact(dir, &format!("{label}_{attempt}.html"), html.as_bytes()).await,
            Err(error) => warn!(label, attempt, error = %error, "could not read page source"),
        }
    }

    /// Writes both the page source and a screenshot.
    pub async fn capture(&self, driver: &dyn BrowserDriver, label: &str, attempt: u32) {
        let Some(dir) = self.dir.as_deref() else {
            return;
        };
        self.snapshot(driver, label, attempt).await;
        match driver.screenshot().await {
            Ok(png) => write_artifact(dir, &format!("{label}_{attempt}.png"), &png).await,
            Err(error) => warn!(label, attempt, error = %error, "could not take screenshot"),
        }
    }
}

async fn write_artifact(dir: &Path, file_name: &str, bytes: &[u8]) {
    if let Err(error) = tokio::fs::create_dir_all(dir).await {
        warn!(dir = %dir.display(), error = %error, "could not create artifacts directory");
        return;
    }
    let path = dir.join(file_name);
    match tokio::fs::write(&path, bytes).await {
        Ok(()) => debug!(path = %path.display(), "wrote diagnostic artifact"),
        Err(error) => warn!(path = %path.display(), error = %error, "could not write diagnostic artifact"),
    }
}
