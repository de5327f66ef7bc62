//! Inclusion conditions.

use std::fmt;

use esi_core::RequestContext;

use crate::template::{Template, TemplateError};

/// Decides per request whether a tag should be included.
pub trait Conditioner: fmt::Debug + Send + Sync {
    /// Evaluate the condition for `req`.
    fn evaluate(&self, req: &RequestContext) -> bool;
}

/// A condition compiled from the `condition` attribute.
///
/// Evaluation semantics are not defined yet, so `evaluate` always answers
/// `false`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledCondition {
    template: Template,
}

impl CompiledCondition {
    /// Compile condition text.
    pub fn compile(text: &str) -> Result<Self, TemplateError> {
        Ok(Self {
            template: Template::compile(text)?,
        })
    }

    /// The compiled template.
    pub fn template(&self) -> &Template {
        &self.template
    }
}

impl Conditioner for CompiledCondition {
    fn evaluate(&self, _req: &RequestContext) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compiles_and_keeps_source() {
        let cond = CompiledCondition::compile(r#"{{ header "X-Beta" }}"#).unwrap();
        assert_eq!(cond.template().source(), r#"{{ header "X-Beta" }}"#);
    }

    #[test]
    fn test_evaluate_is_always_false() {
        let cond = CompiledCondition::compile("true").unwrap();
        let req = RequestContext::get("/").with_header("X-Beta", "1");
        assert!(!cond.evaluate(&req));
    }

    #[test]
    fn test_malformed_condition_fails() {
        assert!(matches!(
            CompiledCondition::compile("{{ header"),
            Err(TemplateError::UnclosedAction { .. })
        ));
    }
}
