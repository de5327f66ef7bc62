//! Fetch contract.

use std::time::Duration;

use async_trait::async_trait;
use esi_core::RequestContext;
use esi_tag::Entity;

/// Error type for fetch operations.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("HTTP error: {status} for {url}")]
    Http { status: u16, url: String },

    #[error("Timeout after {0:?}")]
    Timeout(Duration),

    #[error("Request cancelled")]
    Cancelled,

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("No resource available for tag {0:?}")]
    NotFound(String),

    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

impl FetchError {
    /// Whether the fetch ended because time ran out or the request went away.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Self::Timeout(_) | Self::Cancelled)
    }
}

/// Fetches the fragment for one ESI tag.
///
/// Implementations own transport, caching, pooling and retries. They must
/// give up once `timeout` has elapsed or the request's cancellation token
/// fires; `bounded` does both.
#[async_trait]
pub trait ResourceFetcher: Send + Sync {
    /// Fetch the fragment bytes for `entity`.
    async fn fetch(
        &self,
        entity: &Entity,
        timeout: Duration,
        req: &RequestContext,
    ) -> Result<Vec<u8>, FetchError>;
}

#[async_trait]
impl<F: ResourceFetcher + ?Sized> ResourceFetcher for std::sync::Arc<F> {
    async fn fetch(
        &self,
        entity: &Entity,
        timeout: Duration,
        req: &RequestContext,
    ) -> Result<Vec<u8>, FetchError> {
        (**self).fetch(entity, timeout, req).await
    }
}
