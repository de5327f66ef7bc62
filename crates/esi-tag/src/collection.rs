//! All ESI tags of one page.

use std::fmt;
use std::sync::Arc;

use esi_observability::{LogSink, StructuredLogger};

use crate::entity::{Entity, EntityParser};
use crate::error::ParseError;

/// The entities of one page, in the order their tags appear.
#[derive(Debug, Clone, Default)]
pub struct EntityCollection {
    entities: Vec<Entity>,
    logger: StructuredLogger,
}

impl EntityCollection {
    /// Create an empty collection.
    pub fn new() -> Self {
        Self::default()
    }

    /// Use `logger` for parse diagnostics.
    pub fn with_logger(mut self, logger: StructuredLogger) -> Self {
        self.logger = logger.with_component("esi-parser");
        self
    }

    /// Use `sink` for parse diagnostics, with default level and format.
    pub fn with_sink(self, sink: Arc<dyn LogSink>) -> Self {
        self.with_logger(StructuredLogger::new(sink))
    }

    /// Append an entity.
    pub fn push(&mut self, entity: Entity) {
        self.entities.push(entity);
    }

    /// Parse every entity in order, stopping at the first failure.
    pub fn parse_raw(&mut self) -> Result<(), ParseError> {
        let parser = EntityParser::new(self.logger.clone());
        for (index, entity) in self.entities.iter_mut().enumerate() {
            parser
                .parse(entity)
                .map_err(|source| ParseError::AtIndex {
                    index,
                    source: Box::new(source),
                })?;
        }
        Ok(())
    }

    /// Number of entities.
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    /// Whether the page has no entities.
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Entity at `index`.
    pub fn get(&self, index: usize) -> Option<&Entity> {
        self.entities.get(index)
    }

    /// Entities in page order.
    pub fn iter(&self) -> std::slice::Iter<'_, Entity> {
        self.entities.iter()
    }

    /// The logger used for diagnostics.
    pub fn logger(&self) -> &StructuredLogger {
        &self.logger
    }
}

impl FromIterator<Entity> for EntityCollection {
    fn from_iter<I: IntoIterator<Item = Entity>>(iter: I) -> Self {
        Self {
            entities: iter.into_iter().collect(),
            logger: StructuredLogger::default(),
        }
    }
}

impl<'a> IntoIterator for &'a EntityCollection {
    type Item = &'a Entity;
    type IntoIter = std::slice::Iter<'a, Entity>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Debug listing, one entry per entity followed by its raw tag.
impl fmt::Display for EntityCollection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, e) in self.entities.iter().enumerate() {
            let sources: Vec<&str> = e
                .resources
                .iter()
                .filter_map(|r| r.url.as_ref().map(|a| a.source()))
                .collect();
            let keys: Vec<&str> = e
                .resources
                .iter()
                .filter_map(|r| r.key.as_ref().map(|a| a.source()))
                .collect();

            writeln!(
                f,
                "{}: tag={}..{} src={:?} key={:?} timeout={:?} ttl={:?} onerror={:?} forward={:?} return={:?} condition={}",
                i,
                e.tag.start,
                e.tag.end,
                sources,
                keys,
                e.timeout,
                e.ttl,
                e.on_error,
                e.forward_headers,
                e.return_headers,
                e.conditioner.is_some(),
            )?;
            writeln!(f, "{}: RawTag: {:?}", i, e.raw_tag_str())?;
            writeln!(f)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use esi_observability::{LogLevel, MemorySink};

    use super::*;

    fn collection(tags: &[&str]) -> EntityCollection {
        let mut offset = 0;
        tags.iter()
            .map(|raw| {
                let e = Entity::new(*raw, offset, offset + raw.len());
                offset += raw.len() + 10;
                e
            })
            .collect()
    }

    #[test]
    fn test_parses_all_in_order() {
        let mut page = collection(&[
            r#"<esi:include src="http://a"/>"#,
            r#"<esi:include src="http://b" timeout="1s"/>"#,
        ]);
        page.parse_raw().unwrap();

        assert_eq!(page.len(), 2);
        assert_eq!(page.get(1).unwrap().timeout.as_secs(), 1);
        assert_eq!(page.get(0).unwrap().tag.start, 0);
    }

    #[test]
    fn test_stops_at_first_failure_with_index() {
        let mut page = collection(&[
            r#"<esi:include src="http://a"/>"#,
            r#"<esi:include key="only"/>"#,
            r#"<esi:include src="http://c" ttl="nope"/>"#,
        ]);
        let err = page.parse_raw().unwrap_err();

        assert_eq!(err.index(), Some(1));
        assert!(matches!(err.root(), ParseError::MissingSource { .. }));
        assert!(err.to_string().starts_with("entity 1 failed to parse"));
        assert!(err.raw_tag().contains("only"));
        // the third entity was never touched
        assert!(page.get(2).unwrap().resources.is_empty());
    }

    #[test]
    fn test_empty_collection() {
        let mut page = EntityCollection::new();
        page.parse_raw().unwrap();
        assert!(page.is_empty());
    }

    #[test]
    fn test_display_lists_raw_tags() {
        let mut page = collection(&[r#"<esi:include src="http://a" key="k"/>"#]);
        page.parse_raw().unwrap();
        let text = page.to_string();

        assert!(text.starts_with("0: tag=0.."));
        assert!(text.contains(r#"src=["http://a"]"#));
        assert!(text.contains("0: RawTag: "));
    }

    #[test]
    fn test_with_sink_receives_errors() {
        let sink = Arc::new(MemorySink::new());
        let mut page = collection(&[r#"<esi:include ttl="1s"/>"#]).with_sink(sink.clone());

        page.parse_raw().unwrap_err();
        let lines = sink.lines_at(LogLevel::Error);
        assert_eq!(lines.len(), 1);
        assert!(lines[0].contains("esi-parser"));
    }
}
