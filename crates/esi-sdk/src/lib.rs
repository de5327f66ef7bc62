//! Public SDK for ESI fragment assembly.
//!
//! This crate re-exports the parser, fetch contract and resolver:
//!
//! ```ignore
//! use esi_sdk::prelude::*;
//!
//! let mut page = EntityCollection::new().with_sink(Arc::new(TracingSink));
//! for (start, end) in tag_offsets {
//!     page.push(Entity::new(&html[start..end], start, end));
//! }
//! page.parse_raw()?;
//!
//! let resolver = ParallelResolver::from_config(fetcher, &config, Arc::new(TracingSink));
//! let fragments = resolver.resolve(&page, &request).await?;
//! ```

pub use esi_core;
pub use esi_fetch;
pub use esi_observability;
pub use esi_resolve;
pub use esi_tag;

/// Prelude for convenient imports.
pub mod prelude {
    pub use esi_core::*;
    pub use esi_fetch::*;
    pub use esi_observability::*;
    pub use esi_resolve::*;
    pub use esi_tag::*;
}
