//! In-memory fetcher.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use esi_core::RequestContext;
use esi_tag::Entity;

use crate::client::{FetchError, ResourceFetcher};
use crate::timeout::bounded;

/// Serves fragments from a table keyed by source URL or lookup key.
///
/// Slots are tried in declaration order; within a slot the source comes
/// before the key. Templated addresses are rendered against the request
/// first.
#[derive(Debug, Clone, Default)]
pub struct MemoryFetcher {
    fragments: HashMap<String, Vec<u8>>,
    latency: Duration,
}

impl MemoryFetcher {
    /// Create an empty fetcher.
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `body` for `address`.
    pub fn with_fragment(mut self, address: impl Into<String>, body: impl Into<Vec<u8>>) -> Self {
        self.fragments.insert(address.into(), body.into());
        self
    }

    /// Delay every fetch by `latency`.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    fn lookup(&self, entity: &Entity, req: &RequestContext) -> Option<Vec<u8>> {
        entity.resources.iter().find_map(|slot| {
            [slot.url_for(req), slot.key_for(req)]
                .into_iter()
                .flatten()
                .find_map(|address| self.fragments.get(&address).cloned())
        })
    }
}

#[async_trait]
impl ResourceFetcher for MemoryFetcher {
    async fn fetch(
        &self,
        entity: &Entity,
        timeout: Duration,
        req: &RequestContext,
    ) -> Result<Vec<u8>, FetchError> {
        bounded(timeout, req, async {
            if !self.latency.is_zero() {
                tokio::time::sleep(self.latency).await;
            }
            self.lookup(entity, req)
                .ok_or_else(|| FetchError::NotFound(entity.raw_tag_str().into_owned()))
        })
        .await
    }
}
