//! Diagnostic logging for ESI fragment assembly.
//!
//! This crate provides:
//! - `LogSink` - Destination for formatted diagnostic lines
//! - `StructuredLogger` - Structured entries with request context
//! - `TracingSink` / `StderrSink` / `MemorySink` - Sink implementations

mod logging;
mod sink;

pub use logging::*;
pub use sink::*;

// Re-export RequestId from esi-core for convenience
pub use esi_core::RequestId;
