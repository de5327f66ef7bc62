//! Inline templates for resource addresses and conditions.
//!
//! A template is literal text with `{{ action }}` blocks. An action names a
//! request accessor followed by its quoted arguments:
//!
//! ```text
//! https://cart.local/{{ param "id" }}?store={{ header "X-Store" }}
//! ```

use std::fmt;

use esi_core::RequestContext;

/// Text marking a value as a template.
pub const TEMPLATE_MARKER: &str = "{{";

const CLOSE: &str = "}}";

/// Error when template text cannot be compiled.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TemplateError {
    #[error("unclosed action starting at byte {offset}")]
    UnclosedAction { offset: usize },

    #[error("empty action at byte {offset}")]
    EmptyAction { offset: usize },

    #[error("unterminated string starting at byte {offset}")]
    UnterminatedString { offset: usize },

    #[error("unknown function {name:?}")]
    UnknownFunction { name: String },

    #[error("function {function:?} takes {expected} argument(s), got {found}")]
    Arity {
        function: String,
        expected: usize,
        found: usize,
    },

    #[error("unexpected {token:?} in action")]
    UnexpectedToken { token: String },
}

/// A request accessor used inside `{{ }}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// `header "Name"`
    Header(String),
    /// `query "name"`
    Query(String),
    /// `param "name"`
    Param(String),
    /// `path`
    Path,
    /// `method`
    Method,
    /// `request_id`
    RequestId,
}

impl Action {
    fn from_tokens(function: &str, args: Vec<String>) -> Result<Self, TemplateError> {
        let arity = |expected: usize| {
            if args.len() == expected {
                Ok(())
            } else {
                Err(TemplateError::Arity {
                    function: function.to_string(),
                    expected,
                    found: args.len(),
                })
            }
        };

        match function {
            "header" | "query" | "param" => {
                arity(1)?;
                let arg = args.into_iter().next().unwrap_or_default();
                Ok(match function {
                    "header" => Self::Header(arg),
                    "query" => Self::Query(arg),
                    _ => Self::Param(arg),
                })
            }
            "path" => arity(0).map(|_| Self::Path),
            "method" => arity(0).map(|_| Self::Method),
            "request_id" => arity(0).map(|_| Self::RequestId),
            _ => Err(TemplateError::UnknownFunction {
                name: function.to_string(),
            }),
        }
    }

    fn render_into(&self, req: &RequestContext, out: &mut String) {
        match self {
            Self::Header(name) => out.push_str(req.header(name).unwrap_or_default()),
            Self::Query(name) => out.push_str(req.query_param(name).unwrap_or_default()),
            Self::Param(name) => out.push_str(req.param(name).unwrap_or_default()),
            Self::Path => out.push_str(&req.path),
            Self::Method => out.push_str(req.method.as_str()),
            Self::RequestId => out.push_str(req.request_id.as_str()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Part {
    Text(String),
    Action(Action),
}

/// A compiled template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    source: String,
    parts: Vec<Part>,
}

impl Template {
    /// Check whether `text` should be compiled as a template.
    pub fn is_template(text: &str) -> bool {
        text.contains(TEMPLATE_MARKER)
    }

    /// Compile template text.
    pub fn compile(source: &str) -> Result<Self, TemplateError> {
        let mut parts = Vec::new();
        let mut rest = source;
        let mut consumed = 0;

        while let Some(open) = rest.find(TEMPLATE_MARKER) {
            if open > 0 {
                parts.push(Part::Text(rest[..open].to_string()));
            }
            let action_offset = consumed + open;
            let body_start = open + TEMPLATE_MARKER.len();
            let (action, body_len) = parse_action(&rest[body_start..], action_offset)?;
            parts.push(Part::Action(action));

            let next = body_start + body_len + CLOSE.len();
            consumed += next;
            rest = &rest[next..];
        }
        if !rest.is_empty() {
            parts.push(Part::Text(rest.to_string()));
        }

        Ok(Self {
            source: source.to_string(),
            parts,
        })
    }

    /// The text this template was compiled from.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// The actions in declaration order.
    pub fn actions(&self) -> impl Iterator<Item = &Action> {
        self.parts.iter().filter_map(|p| match p {
            Part::Action(a) => Some(a),
            Part::Text(_) => None,
        })
    }

    /// Render against a request. Missing values render as empty text.
    pub fn render(&self, req: &RequestContext) -> String {
        let mut out = String::with_capacity(self.source.len());
        for part in &self.parts {
            match part {
                Part::Text(text) => out.push_str(text),
                Part::Action(action) => action.render_into(req, &mut out),
            }
        }
        out
    }
}

impl fmt::Display for Template {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

/// Parse one action body up to its closing `}}`.
///
/// Returns the action and the byte length of the body, excluding `}}`.
fn parse_action(body: &str, offset: usize) -> Result<(Action, usize), TemplateError> {
    let mut tokens: Vec<Token> = Vec::new();
    let mut chars = body.char_indices().peekable();

    let end = loop {
        let Some(&(i, c)) = chars.peek() else {
            return Err(TemplateError::UnclosedAction { offset });
        };

        if body[i..].starts_with(CLOSE) {
            break i;
        }
        if c.is_whitespace() {
            chars.next();
            continue;
        }

        if c == '"' || c == '`' {
            chars.next();
            let start = i + c.len_utf8();
            let close = body[start..]
                .find(c)
                .ok_or(TemplateError::UnterminatedString { offset: offset + 2 + i })?;
            tokens.push(Token::Str(body[start..start + close].to_string()));
            while chars.peek().is_some_and(|&(j, _)| j <= start + close) {
                chars.next();
            }
            continue;
        }

        let mut word = String::new();
        while let Some(&(j, c)) = chars.peek() {
            if c.is_whitespace() || c == '"' || c == '`' || body[j..].starts_with(CLOSE) {
                break;
            }
            word.push(c);
            chars.next();
        }
        tokens.push(Token::Word(word));
    };

    let mut tokens = tokens.into_iter();
    let function = match tokens.next() {
        None => return Err(TemplateError::EmptyAction { offset }),
        Some(Token::Word(w)) if w.bytes().all(|b| b.is_ascii_lowercase() || b == b'_') => w,
        Some(other) => return Err(TemplateError::UnexpectedToken { token: other.to_string() }),
    };
    let args = tokens
        .map(|t| match t {
            Token::Str(s) => Ok(s),
            Token::Word(w) => Err(TemplateError::UnexpectedToken { token: w }),
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok((Action::from_tokens(&function, args)?, end))
}

enum Token {
    Word(String),
    Str(String),
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Word(w) => f.write_str(w),
            Self::Str(s) => write!(f, "{:?}", s),
        }
    }
}
