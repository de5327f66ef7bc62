//! Backend fetch contract for ESI resources.
//!
//! This crate provides:
//! - `ResourceFetcher` - The fetch contract the resolver calls per tag
//! - `FetchError` - Failure classes of a single fetch
//! - `TimeoutPolicy` / `bounded` - Timeout selection and enforcement
//! - `FnFetcher` - Adapter turning an async closure into a fetcher
//! - `MemoryFetcher` - In-memory fetcher walking resource slots in order

mod client;
mod func;
mod memory;
mod timeout;

pub use client::*;
pub use func::*;
pub use memory::*;
pub use timeout::*;
