//! Resource slots declared by `src` and `key` attributes.

use std::borrow::Cow;
use std::collections::HashMap;

use esi_core::RequestContext;

use crate::template::{Template, TemplateError};

/// Separator that marks a `src` value as a URL.
pub const SCHEME_SEPARATOR: &str = "://";

/// A literal or templated address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Address {
    /// Used as written.
    Literal(String),
    /// Rendered per request.
    Template(Template),
}

impl Address {
    /// Compile `value` as a template when it carries the marker, otherwise
    /// keep it literal.
    pub fn parse(value: &str) -> Result<Self, TemplateError> {
        if Template::is_template(value) {
            Template::compile(value).map(Self::Template)
        } else {
            Ok(Self::Literal(value.to_string()))
        }
    }

    /// Resolve the address for a request.
    pub fn render(&self, req: &RequestContext) -> Cow<'_, str> {
        match self {
            Self::Literal(s) => Cow::Borrowed(s),
            Self::Template(t) => Cow::Owned(t.render(req)),
        }
    }

    /// The address as written in the tag.
    pub fn source(&self) -> &str {
        match self {
            Self::Literal(s) => s,
            Self::Template(t) => t.source(),
        }
    }

    /// Whether the address is rendered per request.
    pub fn is_template(&self) -> bool {
        matches!(self, Self::Template(_))
    }
}

/// One candidate backend source inside a tag.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResourceSlot {
    /// Declaration index, counted over `src` attributes.
    pub index: usize,
    /// Whether `url` holds a URL rather than a backend alias.
    pub is_url: bool,
    /// Primary source from `src`.
    pub url: Option<Address>,
    /// Fallback lookup key from `key`.
    pub key: Option<Address>,
}

impl ResourceSlot {
    /// Create an empty slot at `index`.
    pub fn new(index: usize) -> Self {
        Self {
            index,
            ..Self::default()
        }
    }

    /// The source for a request, if the slot has one.
    pub fn url_for(&self, req: &RequestContext) -> Option<String> {
        self.url.as_ref().map(|a| a.render(req).into_owned())
    }

    /// The lookup key for a request, if the slot has one.
    pub fn key_for(&self, req: &RequestContext) -> Option<String> {
        self.key.as_ref().map(|a| a.render(req).into_owned())
    }

    /// Whether the slot was declared with a key but no source.
    pub fn is_key_only(&self) -> bool {
        self.url.is_none() && self.key.is_some()
    }
}

/// Resource slots in declaration order, addressable by slot index.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResourceSlots {
    items: Vec<ResourceSlot>,
    positions: HashMap<usize, usize>,
}

impl ResourceSlots {
    /// Create an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of slots.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether there are no slots.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Slot with the given declaration index.
    pub fn get(&self, index: usize) -> Option<&ResourceSlot> {
        self.positions.get(&index).map(|&pos| &self.items[pos])
    }

    /// Slot with the given declaration index, created when missing.
    pub fn get_or_insert(&mut self, index: usize) -> &mut ResourceSlot {
        let pos = match self.positions.get(&index) {
            Some(&pos) => pos,
            None => {
                self.items.push(ResourceSlot::new(index));
                let pos = self.items.len() - 1;
                self.positions.insert(index, pos);
                pos
            }
        };
        &mut self.items[pos]
    }

    /// Slots in declaration order.
    pub fn iter(&self) -> std::slice::Iter<'_, ResourceSlot> {
        self.items.iter()
    }

    /// First slot in declaration order.
    pub fn primary(&self) -> Option<&ResourceSlot> {
        self.items.first()
    }
}

impl<'a> IntoIterator for &'a ResourceSlots {
    type Item = &'a ResourceSlot;
    type IntoIter = std::slice::Iter<'a, ResourceSlot>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Builds resource slots from `src` and `key` attributes in tag order.
///
/// Every `src` opens the next slot. A `key` attaches to the slot of the most
/// recent `src`, or to slot 0 when no `src` has been seen yet; a later `src`
/// for that index then fills in the source of the same slot.
#[derive(Debug, Default)]
pub struct ResourceSlotBuilder {
    slots: ResourceSlots,
    src_count: usize,
}

impl ResourceSlotBuilder {
    /// Create an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a `src` attribute.
    pub fn add_src(&mut self, value: &str) -> Result<(), TemplateError> {
        let is_url = value.contains(SCHEME_SEPARATOR);
        let url = if is_url {
            Address::parse(value)?
        } else {
            Address::Literal(value.to_string())
        };

        let slot = self.slots.get_or_insert(self.src_count);
        slot.is_url = is_url;
        slot.url = Some(url);
        self.src_count += 1;
        Ok(())
    }

    /// Record a `key` attribute.
    ///
    /// The key belongs to the most recent `src` (slot 0 before any). A second
    /// key for the same slot replaces the first.
    pub fn add_key(&mut self, value: &str) -> Result<(), TemplateError> {
        let key = Address::parse(value)?;
        let index = self.src_count.saturating_sub(1);
        self.slots.get_or_insert(index).key = Some(key);
        Ok(())
    }

    /// Number of `src` attributes seen so far.
    pub fn src_count(&self) -> usize {
        self.src_count
    }

    /// Finish building. Returns `None` unless at least one slot exists and
    /// at least one `src` was declared.
    pub fn finish(self) -> Option<ResourceSlots> {
        if self.slots.is_empty() || self.src_count == 0 {
            return None;
        }
        Some(self.slots)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_src_then_key_share_slot() {
        let mut b = ResourceSlotBuilder::new();
        b.add_src("http://a/b").unwrap();
        b.add_key("k1").unwrap();
        let slots = b.finish().unwrap();

        assert_eq!(slots.len(), 1);
        let slot = slots.get(0).unwrap();
        assert!(slot.is_url);
        assert_eq!(slot.url, Some(Address::Literal("http://a/b".into())));
        assert_eq!(slot.key, Some(Address::Literal("k1".into())));
    }

    #[test]
    fn test_key_before_src_merges() {
        let mut b = ResourceSlotBuilder::new();
        b.add_key("k0").unwrap();
        b.add_src("http://a").unwrap();
        let slots = b.finish().unwrap();

        assert_eq!(slots.len(), 1);
        let slot = slots.primary().unwrap();
        assert_eq!(slot.index, 0);
        assert!(slot.url.is_some() && slot.key.is_some());
    }

    #[test]
    fn test_later_key_replaces_earlier_on_same_slot() {
        let mut b = ResourceSlotBuilder::new();
        b.add_key("k0").unwrap();
        b.add_src("http://a").unwrap();
        b.add_key("k1").unwrap();
        let slots = b.finish().unwrap();

        assert_eq!(slots.len(), 1);
        let slot = slots.primary().unwrap();
        assert_eq!(slot.key.as_ref().unwrap().source(), "k1");
        assert!(!slot.is_key_only());
    }

    #[test]
    fn test_multiple_sources_keep_order() {
        let mut b = ResourceSlotBuilder::new();
        b.add_src("http://one").unwrap();
        b.add_key("k1").unwrap();
        b.add_src("http://two").unwrap();
        b.add_key("k2").unwrap();
        b.add_src("redis").unwrap();
        let slots = b.finish().unwrap();

        let indexes: Vec<usize> = slots.iter().map(|s| s.index).collect();
        assert_eq!(indexes, vec![0, 1, 2]);
        assert_eq!(slots.get(1).unwrap().key.as_ref().unwrap().source(), "k2");
        assert!(slots.get(2).unwrap().key.is_none());
    }

    #[test]
    fn test_non_url_src_is_literal_even_with_marker() {
        let mut b = ResourceSlotBuilder::new();
        b.add_src("alias_{{ path }}").unwrap();
        let slot = b.finish().unwrap().get(0).cloned().unwrap();

        assert!(!slot.is_url);
        assert_eq!(slot.url, Some(Address::Literal("alias_{{ path }}".into())));
    }

    #[test]
    fn test_templated_url_and_key() {
        let mut b = ResourceSlotBuilder::new();
        b.add_src(r#"http://cart/{{ param "id" }}"#).unwrap();
        b.add_key(r#"cart_{{ header "X-Store" }}"#).unwrap();
        let slots = b.finish().unwrap();
        let slot = slots.get(0).unwrap();

        let req = RequestContext::get("/").with_param("id", "7").with_header("X-Store", "fr");
        assert!(slot.url.as_ref().unwrap().is_template());
        assert_eq!(slot.url_for(&req).as_deref(), Some("http://cart/7"));
        assert_eq!(slot.key_for(&req).as_deref(), Some("cart_fr"));
    }

    #[test]
    fn test_malformed_template_fails() {
        let mut b = ResourceSlotBuilder::new();
        assert!(b.add_src("http://x/{{ nope }}").is_err());
        assert!(b.add_key("{{ header ").is_err());
    }

    #[test]
    fn test_key_only_is_incomplete() {
        let mut b = ResourceSlotBuilder::new();
        b.add_key("k1").unwrap();
        assert!(b.finish().is_none());
        assert!(ResourceSlotBuilder::new().finish().is_none());
    }

    #[test]
    fn test_get_or_insert_is_stable() {
        let mut slots = ResourceSlots::new();
        slots.get_or_insert(3).is_url = true;
        slots.get_or_insert(1);
        assert!(slots.get_or_insert(3).is_url);
        assert_eq!(slots.len(), 2);
        assert_eq!(slots.iter().map(|s| s.index).collect::<Vec<_>>(), vec![3, 1]);
    }
}
