//! Parallel resolution of ESI tags.
//!
//! This crate fans out one fetch per parsed tag and fans the fragments back
//! in:
//! - `ParallelResolver` - All-or-nothing resolution under one cancellation scope
//! - `ResolveError` / `CancelReason` - Batch failure classes

mod error;
mod resolver;

pub use error::*;
pub use resolver::*;
