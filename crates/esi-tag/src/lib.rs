//! ESI tag parsing.
//!
//! This crate turns the raw bytes of one `<esi:include .../>` tag into an
//! `Entity`:
//! - `AttributeScanner` - Quote-agnostic `name="value"` tokenizer
//! - `Template` - Inline `{{ ... }}` templates in addresses and conditions
//! - `ResourceSlotBuilder` - Merges `src`/`key` pairs into ordered slots
//! - `Conditioner` / `CompiledCondition` - Per-request inclusion hook
//! - `EntityParser` / `EntityCollection` - Single tag and whole page parsing

mod collection;
mod condition;
mod entity;
mod error;
mod resource;
mod scanner;
mod template;

pub use collection::*;
pub use condition::*;
pub use entity::*;
pub use error::*;
pub use resource::*;
pub use scanner::*;
pub use template::*;
