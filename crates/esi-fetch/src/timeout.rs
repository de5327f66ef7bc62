//! Timeout selection and enforcement for fetch operations.

use std::future::Future;
use std::time::Duration;

use esi_core::{EsiConfig, RequestContext};

use crate::client::FetchError;

/// Picks the timeout for one tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeoutPolicy {
    /// Used when the tag declares no timeout.
    pub default: Duration,
    /// Upper bound for any timeout.
    pub max: Option<Duration>,
}

impl TimeoutPolicy {
    /// Create a policy with no ceiling.
    pub fn new(default: Duration) -> Self {
        Self { default, max: None }
    }

    /// Create from config.
    pub fn from_config(config: &EsiConfig) -> Self {
        Self {
            default: config.default_timeout,
            max: config.max_timeout,
        }
    }

    /// Set the ceiling.
    pub fn with_max(mut self, max: Duration) -> Self {
        self.max = Some(max);
        self
    }

    /// Timeout for a tag that asked for `requested` (zero when absent).
    pub fn resolve(&self, requested: Duration) -> Duration {
        let timeout = if requested.is_zero() {
            self.default
        } else {
            requested
        };
        match self.max {
            Some(max) => timeout.min(max),
            None => timeout,
        }
    }
}

impl Default for TimeoutPolicy {
    fn default() -> Self {
        Self::from_config(&EsiConfig::default())
    }
}

/// Run `fut` until it completes, `timeout` elapses, or `req` is cancelled
/// or past its deadline.
pub async fn bounded<T, F>(timeout: Duration, req: &RequestContext, fut: F) -> Result<T, FetchError>
where
    F: Future<Output = Result<T, FetchError>>,
{
    let deadline = async {
        match req.deadline {
            Some(at) => tokio::time::sleep_until(at).await,
            None => std::future::pending().await,
        }
    };

    tokio::select! {
        biased;
        _ = req.cancel_token().cancelled() => Err(FetchError::Cancelled),
        _ = deadline => Err(FetchError::Cancelled),
        _ = tokio::time::sleep(timeout) => Err(FetchError::Timeout(timeout)),
        res = fut => res,
    }
}
