//! Core abstractions for ESI fragment assembly.
//!
//! This crate provides the fundamental types shared by the parser and the
//! resolver:
//! - `RequestContext` - The inbound request, borrowed read-only
//! - `CancelToken` - Hierarchical cancellation scope
//! - `parse_duration` - Duration grammar for `timeout`/`ttl` attributes
//! - `EsiConfig` - File-backed configuration

mod cancel;
mod config;
mod context;
mod duration;

pub use cancel::*;
pub use config::*;
pub use context::*;
pub use duration::*;
