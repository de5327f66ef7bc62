//! Parse errors.

use esi_core::DurationError;

use crate::template::TemplateError;

/// Error raised while parsing a tag or a page of tags.
///
/// Every variant carries the raw tag text it was raised for.
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    /// An attribute match could not be read.
    #[error("malformed attribute in tag {raw_tag:?}: {detail}")]
    Format { raw_tag: String, detail: String },

    /// No `src` attribute, so no usable resource.
    #[error("src cannot be empty in tag {raw_tag:?}, which requires at least one resource")]
    MissingSource { raw_tag: String },

    /// A `src`, `key` or `condition` template does not compile.
    #[error("failed to parse {attribute} {value:?} as template in tag {raw_tag:?}: {source}")]
    Template {
        attribute: &'static str,
        value: String,
        raw_tag: String,
        #[source]
        source: TemplateError,
    },

    /// A `timeout` or `ttl` value is not a duration.
    #[error("cannot parse duration in {attribute}: {value:?} in tag {raw_tag:?}: {source}")]
    Duration {
        attribute: &'static str,
        value: String,
        raw_tag: String,
        #[source]
        source: DurationError,
    },

    /// A tag of a collection failed; `index` is its position on the page.
    #[error("entity {index} failed to parse: {source}")]
    AtIndex {
        index: usize,
        #[source]
        source: Box<ParseError>,
    },
}

impl ParseError {
    /// The underlying error, unwrapping collection positions.
    pub fn root(&self) -> &ParseError {
        match self {
            Self::AtIndex { source, .. } => source.root(),
            other => other,
        }
    }

    /// The raw tag the error was raised for.
    pub fn raw_tag(&self) -> &str {
        match self {
            Self::Format { raw_tag, .. }
            | Self::MissingSource { raw_tag }
            | Self::Template { raw_tag, .. }
            | Self::Duration { raw_tag, .. } => raw_tag,
            Self::AtIndex { source, .. } => source.raw_tag(),
        }
    }

    /// Position on the page, for errors raised by a collection.
    pub fn index(&self) -> Option<usize> {
        match self {
            Self::AtIndex { index, .. } => Some(*index),
            _ => None,
        }
    }
}
