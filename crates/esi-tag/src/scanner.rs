//! Attribute tokenizer for raw ESI tags.

use std::ops::Range;

/// Quote style an attribute value was written in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuoteKind {
    /// `name="value"`
    Double,
    /// `name='value'`
    Single,
}

impl QuoteKind {
    fn from_byte(b: u8) -> Option<Self> {
        match b {
            b'"' => Some(Self::Double),
            b'\'' => Some(Self::Single),
            _ => None,
        }
    }

    fn byte(self) -> u8 {
        match self {
            Self::Double => b'"',
            Self::Single => b'\'',
        }
    }
}

/// One `name=value` pair found in a tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    /// Lower-cased attribute name.
    pub name: String,
    /// Value with surrounding whitespace removed.
    pub value: String,
    /// Quote style of the value.
    pub quote: QuoteKind,
    /// Byte offset of the name within the raw tag.
    pub offset: usize,
}

/// Error when a matched attribute cannot be turned into text.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ScanError {
    #[error("attribute at byte {offset} is not valid UTF-8")]
    NotUtf8 { offset: usize },
}

/// Iterates over the attributes of one raw tag in declaration order.
///
/// A match is a run of ASCII letters, `=`, an opening quote, at least one
/// byte that is neither that quote nor CR/LF, and the same closing quote.
/// Text that does not match is skipped.
#[derive(Debug, Clone)]
pub struct AttributeScanner<'a> {
    raw: &'a [u8],
    pos: usize,
}

impl<'a> AttributeScanner<'a> {
    /// Create a scanner over `raw`.
    pub fn new(raw: &'a [u8]) -> Self {
        Self { raw, pos: 0 }
    }

    /// Match `="value"` or `='value'` starting at `at`.
    ///
    /// Returns the quote kind, the value range and the end of the match.
    fn quoted_value(&self, at: usize) -> Option<(QuoteKind, Range<usize>, usize)> {
        if self.raw.get(at) != Some(&b'=') {
            return None;
        }
        let quote = QuoteKind::from_byte(*self.raw.get(at + 1)?)?;
        let value_start = at + 2;
        let value_len = self.raw[value_start..]
            .iter()
            .position(|&b| b == quote.byte() || b == b'\r' || b == b'\n')?;

        if value_len == 0 || self.raw[value_start + value_len] != quote.byte() {
            return None;
        }
        let value_end = value_start + value_len;
        Some((quote, value_start..value_end, value_end + 1))
    }

    fn attribute(
        &self,
        name: Range<usize>,
        value: Range<usize>,
        quote: QuoteKind,
    ) -> Result<Attribute, ScanError> {
        let offset = name.start;
        let name = std::str::from_utf8(&self.raw[name]).map_err(|_| ScanError::NotUtf8 { offset })?;
        let value = std::str::from_utf8(&self.raw[value.clone()])
            .map_err(|_| ScanError::NotUtf8 { offset: value.start })?;

        Ok(Attribute {
            name: name.to_ascii_lowercase(),
            value: value.trim().to_string(),
            quote,
            offset,
        })
    }
}

impl Iterator for AttributeScanner<'_> {
    type Item = Result<Attribute, ScanError>;

    fn next(&mut self) -> Option<Self::Item> {
        while self.pos < self.raw.len() {
            let start = self.pos;
            let name_len = self.raw[start..]
                .iter()
                .take_while(|b| b.is_ascii_alphabetic())
                .count();
            if name_len == 0 {
                self.pos += 1;
                continue;
            }

            let name_end = start + name_len;
            self.pos = name_end;
            if let Some((quote, value, end)) = self.quoted_value(name_end) {
                self.pos = end;
                return Some(self.attribute(start..name_end, value, quote));
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scan(raw: &str) -> Vec<(String, String)> {
        AttributeScanner::new(raw.as_bytes())
            .map(|a| {
                let a = a.unwrap();
                (a.name, a.value)
            })
            .collect()
    }

    fn pair(name: &str, value: &str) -> (String, String) {
        (name.to_string(), value.to_string())
    }

    #[test]
    fn test_double_and_single_quotes() {
        assert_eq!(
            scan(r#"<esi:include src="http://a/b" key='k1' />"#),
            vec![pair("src", "http://a/b"), pair("key", "k1")]
        );
    }

    #[test]
    fn test_quote_kind_is_reported() {
        let attrs: Vec<_> = AttributeScanner::new(br#"a="1" b='2'"#)
            .map(Result::unwrap)
            .collect();
        assert_eq!(attrs[0].quote, QuoteKind::Double);
        assert_eq!(attrs[1].quote, QuoteKind::Single);
        assert_eq!(attrs[1].offset, 6);
    }

    #[test]
    fn test_names_lowercased_values_trimmed() {
        assert_eq!(scan(r#"SRC="  http://x/  ""#), vec![pair("src", "http://x/")]);
    }

    #[test]
    fn test_other_quote_allowed_inside_value() {
        assert_eq!(
            scan(r#"key='p_{{ header "X-Id" }}'"#),
            vec![pair("key", r#"p_{{ header "X-Id" }}"#)]
        );
    }

    #[test]
    fn test_empty_value_is_skipped() {
        assert_eq!(scan(r#"src="" key="k""#), vec![pair("key", "k")]);
    }

    #[test]
    fn test_line_break_in_value_is_skipped() {
        assert_eq!(scan("src=\"a\nb\" ttl=\"1s\""), vec![pair("ttl", "1s")]);
    }

    #[test]
    fn test_unclosed_value_yields_nothing() {
        assert_eq!(scan(r#"src="http://a"#), Vec::<(String, String)>::new());
    }

    #[test]
    fn test_namespaced_tag_name_is_not_an_attribute() {
        assert_eq!(
            scan(r#"<esi:include timeout="2s"/>"#),
            vec![pair("timeout", "2s")]
        );
    }

    #[test]
    fn test_invalid_utf8_is_reported() {
        let raw = b"src=\"\xff\xfe\"";
        let first = AttributeScanner::new(raw).next().unwrap();
        assert_eq!(first, Err(ScanError::NotUtf8 { offset: 5 }));
    }
}
