//! Parsed ESI tags.

use std::borrow::Cow;
use std::sync::Arc;
use std::time::Duration;

use esi_core::{parse_duration, RequestContext};
use esi_observability::{LogLevel, StructuredLogger};
use http::HeaderMap;

use crate::condition::{CompiledCondition, Conditioner};
use crate::error::ParseError;
use crate::resource::{ResourceSlotBuilder, ResourceSlots};
use crate::scanner::AttributeScanner;
use crate::template::TemplateError;

/// Location of an ESI tag in the page, plus the fragment fetched for it.
///
/// `start` and `end` are fixed when the page is scanned; `data` is only
/// filled in by resolution.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Tag {
    /// Fragment bytes from the backend.
    pub data: Vec<u8>,
    /// Start position in the page.
    pub start: usize,
    /// End position in the page.
    pub end: usize,
}

impl Tag {
    /// Create a tag covering `start..end`.
    pub fn new(start: usize, end: usize) -> Self {
        Self {
            data: Vec::new(),
            start,
            end,
        }
    }
}

/// Header forwarding policy from `forwardheaders` / `returnheaders`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderPolicy {
    /// Every header is selected.
    pub all: bool,
    /// Explicitly selected header names, as written.
    pub names: Vec<String>,
}

impl HeaderPolicy {
    /// Parse `all` or a comma separated list of names.
    pub fn parse(value: &str) -> Self {
        if value == "all" {
            return Self {
                all: true,
                names: Vec::new(),
            };
        }
        Self {
            all: false,
            names: value
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect(),
        }
    }

    /// Whether `name` is selected (case-insensitive).
    pub fn allows(&self, name: &str) -> bool {
        self.all || self.names.iter().any(|n| n.eq_ignore_ascii_case(name))
    }
}

/// One fully parsed ESI tag.
#[derive(Debug, Clone, Default)]
pub struct Entity {
    /// The tag bytes as found in the page.
    pub raw_tag: Vec<u8>,
    /// Position in the page.
    pub tag: Tag,
    /// Backend sources in declaration order.
    pub resources: ResourceSlots,
    /// Cache lifetime requested by the tag.
    pub ttl: Duration,
    /// Fetch timeout requested by the tag.
    pub timeout: Duration,
    /// `onerror` value, unvalidated.
    pub on_error: String,
    /// Request headers to forward to the backend.
    pub forward_headers: HeaderPolicy,
    /// Backend headers to return to the client.
    pub return_headers: HeaderPolicy,
    /// Inclusion condition.
    pub conditioner: Option<Arc<dyn Conditioner>>,
}

impl Entity {
    /// Create an unparsed entity for the tag found at `start..end`.
    pub fn new(raw_tag: impl Into<Vec<u8>>, start: usize, end: usize) -> Self {
        Self {
            raw_tag: raw_tag.into(),
            tag: Tag::new(start, end),
            ..Self::default()
        }
    }

    /// The raw tag as text, for diagnostics.
    pub fn raw_tag_str(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.raw_tag)
    }

    /// Parse `raw_tag` and fill in the remaining fields.
    pub fn parse_raw(&mut self) -> Result<(), ParseError> {
        EntityParser::default().parse(self)
    }

    /// Evaluate the condition, if the tag has one.
    pub fn evaluate_condition(&self, req: &RequestContext) -> Option<bool> {
        self.conditioner.as_ref().map(|c| c.evaluate(req))
    }

    /// The request headers this tag forwards to its backend.
    pub fn forwarded_headers(&self, req: &RequestContext) -> HeaderMap {
        if self.forward_headers.all {
            return req.headers.clone();
        }
        let mut headers = HeaderMap::new();
        for (name, value) in req.headers.iter() {
            if self.forward_headers.allows(name.as_str()) {
                headers.append(name.clone(), value.clone());
            }
        }
        headers
    }

    /// Whether a backend response header may be returned to the client.
    pub fn allows_return_header(&self, name: &str) -> bool {
        self.return_headers.allows(name)
    }
}

/// Fields collected during one parse, applied only on success.
#[derive(Default)]
struct Parsed {
    ttl: Duration,
    timeout: Duration,
    on_error: String,
    forward_headers: HeaderPolicy,
    return_headers: HeaderPolicy,
    conditioner: Option<Arc<dyn Conditioner>>,
}

/// Parses raw tags into entities.
#[derive(Debug, Clone, Default)]
pub struct EntityParser {
    logger: StructuredLogger,
}

impl EntityParser {
    /// Create a parser that reports to `logger`.
    pub fn new(logger: StructuredLogger) -> Self {
        Self { logger }
    }

    /// Parse `entity.raw_tag` into the entity's fields.
    ///
    /// An empty raw tag is left untouched. On error the entity is not
    /// modified.
    pub fn parse(&self, entity: &mut Entity) -> Result<(), ParseError> {
        if entity.raw_tag.is_empty() {
            return Ok(());
        }

        let result = self.parse_fields(&entity.raw_tag);
        let raw = entity.raw_tag_str();
        let (resources, parsed) = match result {
            Ok(ok) => ok,
            Err(err) => {
                self.logger
                    .entry(LogLevel::Error, "esi tag parse failed")
                    .field("tag", raw)
                    .field("error", err.to_string())
                    .emit();
                return Err(err);
            }
        };

        self.logger
            .entry(LogLevel::Debug, "esi tag parsed")
            .field("tag", raw)
            .field_u64("resources", resources.len() as u64)
            .duration_ms("timeout_ms", parsed.timeout)
            .duration_ms("ttl_ms", parsed.ttl)
            .emit();

        entity.resources = resources;
        entity.ttl = parsed.ttl;
        entity.timeout = parsed.timeout;
        entity.on_error = parsed.on_error;
        entity.forward_headers = parsed.forward_headers;
        entity.return_headers = parsed.return_headers;
        entity.conditioner = parsed.conditioner;
        Ok(())
    }

    fn parse_fields(&self, raw_tag: &[u8]) -> Result<(ResourceSlots, Parsed), ParseError> {
        let raw = || String::from_utf8_lossy(raw_tag).into_owned();
        let mut slots = ResourceSlotBuilder::new();
        let mut parsed = Parsed::default();

        for attr in AttributeScanner::new(raw_tag) {
            let attr = attr.map_err(|e| ParseError::Format {
                raw_tag: raw(),
                detail: e.to_string(),
            })?;
            let value = attr.value.as_str();

            let template_error = |attribute: &'static str| {
                move |source: TemplateError| ParseError::Template {
                    attribute,
                    value: value.to_string(),
                    raw_tag: raw(),
                    source,
                }
            };
            let duration = |attribute: &'static str| {
                parse_duration(value).map_err(|source| ParseError::Duration {
                    attribute,
                    value: value.to_string(),
                    raw_tag: raw(),
                    source,
                })
            };

            match attr.name.as_str() {
                "src" => slots.add_src(value).map_err(template_error("src"))?,
                "key" => slots.add_key(value).map_err(template_error("key"))?,
                "condition" => {
                    let condition =
                        CompiledCondition::compile(value).map_err(template_error("condition"))?;
                    parsed.conditioner = Some(Arc::new(condition));
                }
                "onerror" => parsed.on_error = value.to_string(),
                "timeout" => parsed.timeout = duration("timeout")?,
                "ttl" => parsed.ttl = duration("ttl")?,
                "forwardheaders" => parsed.forward_headers = HeaderPolicy::parse(value),
                "returnheaders" => parsed.return_headers = HeaderPolicy::parse(value),
                _ => {}
            }
        }

        let resources = slots
            .finish()
            .ok_or_else(|| ParseError::MissingSource { raw_tag: raw() })?;
        Ok((resources, parsed))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use esi_observability::MemorySink;

    use super::*;
    use crate::resource::Address;

    fn parse(raw: &str) -> Result<Entity, ParseError> {
        let mut entity = Entity::new(raw, 0, raw.len());
        entity.parse_raw()?;
        Ok(entity)
    }

    #[test]
    fn test_full_tag() {
        let e = parse(
            r#"<esi:include src="http://cart/1" key="cart_1" timeout="2s" ttl="10m" onerror="<p>down</p>" forwardheaders="X-A, X-B" returnheaders="all" />"#,
        )
        .unwrap();

        assert_eq!(e.resources.len(), 1);
        assert_eq!(e.timeout, Duration::from_secs(2));
        assert_eq!(e.ttl, Duration::from_secs(600));
        assert_eq!(e.on_error, "<p>down</p>");
        assert_eq!(e.forward_headers.names, vec!["X-A", "X-B"]);
        assert!(!e.forward_headers.all);
        assert!(e.return_headers.all);
        assert!(e.return_headers.names.is_empty());
        assert!(e.conditioner.is_none());
    }

    #[test]
    fn test_quote_styles_are_equivalent() {
        let double = parse(r#"<esi:include src="http://a/b" key="k" timeout="1s" forwardheaders="X-A"/>"#)
            .unwrap();
        let single = parse(r#"<esi:include src='http://a/b' key='k' timeout='1s' forwardheaders='X-A'/>"#)
            .unwrap();

        assert_eq!(double.resources, single.resources);
        assert_eq!(double.timeout, single.timeout);
        assert_eq!(double.forward_headers, single.forward_headers);
    }

    #[test]
    fn test_src_and_key_one_slot() {
        let e = parse(r#"<esi:include src="http://a/b" key="k1"/>"#).unwrap();

        assert_eq!(e.resources.len(), 1);
        let slot = e.resources.get(0).unwrap();
        assert_eq!(slot.index, 0);
        assert_eq!(slot.url, Some(Address::Literal("http://a/b".into())));
        assert_eq!(slot.key, Some(Address::Literal("k1".into())));
    }

    #[test]
    fn test_key_without_src_fails() {
        let err = parse(r#"<esi:include key="k1"/>"#).unwrap_err();
        assert!(matches!(err, ParseError::MissingSource { .. }));
        assert!(err.to_string().contains("src cannot be empty"));
    }

    #[test]
    fn test_no_attributes_fails() {
        let err = parse("<esi:include/>").unwrap_err();
        assert!(matches!(err, ParseError::MissingSource { ref raw_tag } if raw_tag == "<esi:include/>"));
    }

    #[test]
    fn test_empty_raw_tag_is_noop() {
        let mut e = Entity::new(Vec::<u8>::new(), 3, 9);
        e.parse_raw().unwrap();
        assert!(e.resources.is_empty());
        assert_eq!(e.tag, Tag::new(3, 9));
    }

    #[test]
    fn test_bad_timeout() {
        let err = parse(r#"<esi:include src="http://a" timeout="bogus"/>"#).unwrap_err();
        match &err {
            ParseError::Duration { attribute, value, .. } => {
                assert_eq!(*attribute, "timeout");
                assert_eq!(value, "bogus");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(err.to_string().contains("\"bogus\""));
    }

    #[test]
    fn test_bad_ttl() {
        let err = parse(r#"<esi:include src="http://a" ttl="10 minutes"/>"#).unwrap_err();
        assert!(matches!(err, ParseError::Duration { attribute: "ttl", .. }));
    }

    #[test]
    fn test_bad_templates() {
        let err = parse(r#"<esi:include src="http://a/{{ nope }}"/>"#).unwrap_err();
        assert!(matches!(err, ParseError::Template { attribute: "src", .. }));

        let err = parse(r#"<esi:include src="http://a" key="{{ header"/>"#).unwrap_err();
        assert!(matches!(err, ParseError::Template { attribute: "key", .. }));

        let err = parse(r#"<esi:include src="http://a" condition="{{ }}"/>"#).unwrap_err();
        assert!(matches!(err, ParseError::Template { attribute: "condition", .. }));
        assert!(err.raw_tag().contains("condition"));
    }

    #[test]
    fn test_condition_is_compiled_and_false() {
        let e = parse(r#"<esi:include src="http://a" condition='{{ header "X-Beta" }}'/>"#).unwrap();
        let req = RequestContext::get("/").with_header("X-Beta", "1");
        assert_eq!(e.evaluate_condition(&req), Some(false));
    }

    #[test]
    fn test_failed_parse_leaves_entity_untouched() {
        let mut e = Entity::new(r#"<esi:include src="http://a" timeout="x"/>"#, 0, 10);
        assert!(e.parse_raw().is_err());
        assert!(e.resources.is_empty());
        assert_eq!(e.timeout, Duration::ZERO);
    }

    #[test]
    fn test_unknown_attributes_ignored() {
        let e = parse(r#"<esi:include src="http://a" future="yes" alt="x"/>"#).unwrap();
        assert_eq!(e.resources.len(), 1);
    }

    #[test]
    fn test_invalid_utf8_is_format_error() {
        let mut e = Entity::new(b"<esi:include src=\"http://\xff\"/>".to_vec(), 0, 10);
        let err = e.parse_raw().unwrap_err();
        assert!(matches!(err, ParseError::Format { .. }));
    }

    #[test]
    fn test_forwarded_headers() {
        let e = parse(r#"<esi:include src="http://a" forwardheaders="x-a,Cookie"/>"#).unwrap();
        let req = RequestContext::get("/")
            .with_header("X-A", "1")
            .with_header("cookie", "c=1")
            .with_header("X-Other", "no");

        let headers = e.forwarded_headers(&req);
        assert_eq!(headers.len(), 2);
        assert_eq!(headers.get("x-a").unwrap(), "1");
        assert!(headers.get("x-other").is_none());
        assert!(!e.allows_return_header("Set-Cookie"));
    }

    #[test]
    fn test_parser_logs_to_sink() {
        let sink = Arc::new(MemorySink::new());
        let logger = StructuredLogger::new(sink.clone()).with_min_level(LogLevel::Debug);
        let parser = EntityParser::new(logger);

        let mut ok = Entity::new(r#"<esi:include src="http://a"/>"#, 0, 1);
        parser.parse(&mut ok).unwrap();
        let mut bad = Entity::new(r#"<esi:include key="k"/>"#, 0, 1);
        parser.parse(&mut bad).unwrap_err();

        assert_eq!(sink.lines_at(LogLevel::Debug).len(), 1);
        assert_eq!(sink.lines_at(LogLevel::Error).len(), 1);
        assert!(sink.contains("esi tag parse failed"));
    }
}
