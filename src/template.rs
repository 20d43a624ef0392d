//! Manifest template rendering
//!
//! Uses minijinja with its default `{{ ... }}` syntax. Undefined variables
//! render as empty strings, so a template can reference pipeline variables
//! that are only set on some builds.

use base64::{engine::general_purpose::STANDARD, Engine};
use minijinja::{Environment, ErrorKind, UndefinedBehavior};

use crate::context::TemplateContext;
use crate::{Error, Result};

/// Template engine for resource manifests
///
/// Besides minijinja's builtins, provides `base64_encode` and
/// `base64_decode` filters.
pub struct TemplateEngine {
    env: Environment<'static>,
}

impl Default for TemplateEngine {
    fn default() -> Self {
        Self::new()
    }
}

fn base64_encode(value: &str) -> String {
    STANDARD.encode(value.as_bytes())
}

fn base64_decode(value: &str) -> std::result::Result<String, minijinja::Error> {
    let bytes = STANDARD.decode(value).map_err(|e| {
        minijinja::Error::new(
            ErrorKind::InvalidOperation,
            format!("base64 decode error: {}", e),
        )
    })?;
    String::from_utf8(bytes).map_err(|e| {
        minijinja::Error::new(
            ErrorKind::InvalidOperation,
            format!("decoded value is not UTF-8: {}", e),
        )
    })
}

impl TemplateEngine {
    /// Create an engine with lenient undefined handling
    pub fn new() -> Self {
        let mut env = Environment::new();
        env.set_undefined_behavior(UndefinedBehavior::Lenient);
        env.set_keep_trailing_newline(true);
        env.add_filter("base64_encode", base64_encode);
        env.add_filter("base64_decode", base64_decode);
        Self { env }
    }

    /// Render a manifest template against the context
    pub fn render(&self, template: &str, ctx: &TemplateContext) -> Result<String> {
        self.env
            .render_str(template, ctx)
            .map_err(|e| Error::template(e.to_string()))
    }
}
