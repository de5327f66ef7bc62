//! Closure-backed fetcher.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use esi_core::RequestContext;
use esi_tag::Entity;

use crate::client::{FetchError, ResourceFetcher};
use crate::timeout::bounded;

/// Adapts an async closure into a [`ResourceFetcher`].
///
/// The closure gets owned copies of the entity and the request. The
/// adapter enforces the timeout and the request's cancellation, so the
/// closure only has to produce the bytes.
///
/// ```ignore
/// let fetcher = FnFetcher::new(|entity: Entity, _req: RequestContext| async move {
///     Ok(entity.raw_tag_str().into_owned().into_bytes())
/// });
/// ```
pub struct FnFetcher<F> {
    fetch: F,
}

impl<F> FnFetcher<F> {
    /// Wrap `fetch`.
    pub fn new(fetch: F) -> Self {
        Self { fetch }
    }
}

impl<F> fmt::Debug for FnFetcher<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnFetcher").finish_non_exhaustive()
    }
}

#[async_trait]
impl<F, Fut> ResourceFetcher for FnFetcher<F>
where
    F: Fn(Entity, RequestContext) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Vec<u8>, FetchError>> + Send + 'static,
{
    async fn fetch(
        &self,
        entity: &Entity,
        timeout: Duration,
        req: &RequestContext,
    ) -> Result<Vec<u8>, FetchError> {
        let fut = (self.fetch)(entity.clone(), req.clone());
        bounded(timeout, req, fut).await
    }
}
