//! Top-level facade: fetch, extract and validate behind one lock.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tracing::{info, instrument, warn};

use crate::auth::{Authenticator, Credentials};
use crate::browser::DriverFactory;
use crate::cancel::CancelToken;
use crate::config::AccessorConfig;
use crate::error::AccessError;
use crate::extract::{PaperRecord, extract_paper};
use crate::fetch::ContentFetcher;

/// Authenticated article accessor.
///
/// One accessor holds one session. Calls are serialized, so at most one fetch
/// or login is in flight at a time.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use sciaccess_core::{AccessorConfig, ChromiumFactory, Credentials, PaperAccessor};
///
/// # async fn example() -> Result<(), sciaccess_core::AccessError> {
/// let config = AccessorConfig::default();
/// let credentials = Credentials::new("alice@sjtu.edu.cn", "correct-horse", &config.institution_domain)?;
/// let accessor = PaperAccessor::new(config, credentials, Arc::new(ChromiumFactory::new(false)))?;
/// let paper = accessor
///     .get_paper_content("https://www.sciencedirect.com/science/article/pii/S0000000000000000")
///     .await?;
/// println!("{}", paper.title);
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct PaperAccessor {
    fetcher: Mutex<ContentFetcher>,
    operation_timeout: Option<Duration>,
    cancel: CancelToken,
}

impl PaperAccessor {
    /// Validates `config` and builds every component.
    ///
    /// # Errors
    ///
    /// Returns [`AccessError::Configuration`] for invalid settings and
    /// [`AccessError::HttpClient`] when an HTTP client cannot be built.
    pub fn new(
        config: AccessorConfig,
        credentials: Credentials,
        factory: Arc<dyn DriverFactory>,
    ) -> Result<Self, AccessError> {
        config.validate()?;
        let authenticator = Authenticator::new(credentials, &config, factory)?;
        let fetcher = ContentFetcher::new(&config, authenticator)?;
        Ok(Self {
            fetcher: Mutex::new(fetcher),
            operation_timeout: config.operation_timeout,
            cancel: CancelToken::new(),
        })
    }

    /// Returns a handle that cancels in-flight and future operations.
    #[must_use]
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Fetches `url` and returns its validated record.
    ///
    /// # Errors
    ///
    /// Any fetch error, [`AccessError::ExtractionValidation`] for an unusable
    /// page, [`AccessError::Timeout`] when the operation timeout runs out, or
    /// [`AccessError::Cancelled`].
    #[instrument(skip(self))]
    pub async fn get_paper_content(&self, url: &str) -> Result<PaperRecord, AccessError> {
        let record = self
            .run("get_paper_content", async {
                let mut fetcher = self.fetcher.lock().await;
                let html = fetcher.fetch(url).await?;
                extract_paper(&html, url)
            })
            .await?;
        info!(title = %record.title, authors = record.authors.len(), "article retrieved");
        Ok(record)
    }

    /// Forces a fresh login, replacing any current session.
    ///
    /// # Errors
    ///
    /// Returns the login error, [`AccessError::Timeout`] or
    /// [`AccessError::Cancelled`].
    #[instrument(skip(self))]
    pub async fn login(&self) -> Result<(), AccessError> {
        self.run("login", async {
            let mut fetcher = self.fetcher.lock().await;
            fetcher.relogin().await
        })
        .await
    }

    /// Applies the operation timeout and the cancel token to `operation`.
    async fn run<T>(
        &self,
        label: &'static str,
        operation: impl Future<Output = Result<T, AccessError>>,
    ) -> Result<T, AccessError> {
        if self.cancel.is_cancelled() {
            return Err(AccessError::Cancelled);
        }
        let bounded = async {
            match self.operation_timeout {
                Some(limit) => tokio::time::timeout(limit, operation)
                    .await
                    .map_err(|_| AccessError::timeout(label, limit))?,
                None => operation.await,
            }
        };
        tokio::select! {
            result = bounded => result,
            () = self.cancel.cancelled() => {
                warn!(operation = label, "operation cancelled");
                Err(AccessError::Cancelled)
            }
        }
    }
}
