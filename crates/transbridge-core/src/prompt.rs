//! Prompt templates.
//!
//! A template is plain text with the placeholders `{{input}}`, `{{source_lang}}`
//! and `{{target_lang}}`. Substitution is a single left-to-right pass, so
//! placeholder-like text inside the substituted values is left untouched.

use crate::language::{display_name, source_display_name};
use thiserror::Error;

/// Placeholder for the text to translate.
pub const INPUT_PLACEHOLDER: &str = "{{input}}";
/// Placeholder for the source language name.
pub const SOURCE_LANG_PLACEHOLDER: &str = "{{source_lang}}";
/// Placeholder for the target language name.
pub const TARGET_LANG_PLACEHOLDER: &str = "{{target_lang}}";

/// Template used when the configuration does not provide one.
pub const DEFAULT_TEMPLATE: &str = "Translate the following text from {{source_lang}} to {{target_lang}}. \
Reply with the translation only, without explanations.\n\n{{input}}";

/// Errors raised by template validation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TemplateError {
    /// The template has no input placeholder.
    #[error("invalid prompt template: must contain {{{{input}}}}")]
    MissingInput,
}

/// A validated prompt template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptTemplate {
    template: String,
}

impl PromptTemplate {
    /// Validates and wraps a template.
    ///
    /// # Errors
    /// Returns `TemplateError::MissingInput` if `{{input}}` does not occur.
    pub fn new(template: impl Into<String>) -> Result<Self, TemplateError> {
        let template = template.into();
        if !template.contains(INPUT_PLACEHOLDER) {
            return Err(TemplateError::MissingInput);
        }
        Ok(Self { template })
    }

    /// The raw template text.
    pub fn as_str(&self) -> &str {
        &self.template
    }

    /// Renders the template for one request, naming languages in English.
    pub fn render(&self, input: &str, source_lang: &str, target_lang: &str) -> String {
        let source = source_display_name(source_lang);
        let target = display_name(target_lang);
        substitute(
            &self.template,
            &[
                (INPUT_PLACEHOLDER, input),
                (SOURCE_LANG_PLACEHOLDER, &source),
                (TARGET_LANG_PLACEHOLDER, &target),
            ],
        )
    }
}

impl Default for PromptTemplate {
    fn default() -> Self {
        Self { template: DEFAULT_TEMPLATE.to_string() }
    }
}

fn substitute(template: &str, replacements: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let tail = &rest[start..];
        match replacements.iter().find(|(placeholder, _)| tail.starts_with(placeholder)) {
            Some((placeholder, value)) => {
                out.push_str(value);
                rest = &tail[placeholder.len()..];
            }
            None => {
                out.push_str("{{");
                rest = &tail[2..];
            }
        }
    }

    out.push_str(rest);
    out
}
