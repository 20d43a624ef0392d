//! Template context built from pipeline environment variables
//!
//! Every `PLUGIN_*` and `DRONE_*` variable becomes a template variable named
//! after the rest of the key, lower-cased: `DRONE_COMMIT_SHA` is available as
//! `{{ commit_sha }}` and `PLUGIN_APP` as `{{ app }}`.

use std::collections::BTreeMap;

/// Environment prefixes exported into the template context
pub const CONTEXT_PREFIXES: [&str; 2] = ["PLUGIN_", "DRONE_"];

/// Variables available to the manifest template
pub type TemplateContext = BTreeMap<String, String>;

/// Build a context from `(key, value)` pairs.
///
/// Pairs are applied in order, so a later variable overrides an earlier one
/// that maps to the same name.
pub fn context_from_vars<I, K, V>(vars: I) -> TemplateContext
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: Into<String>,
{
    let mut ctx = TemplateContext::new();
    for (key, value) in vars {
        let key = key.as_ref();
        if let Some(name) = CONTEXT_PREFIXES
            .iter()
            .find_map(|prefix| key.strip_prefix(prefix))
        {
            ctx.insert(name.to_lowercase(), value.into());
        }
    }
    ctx
}

/// Build a context from the process environment.
///
/// Variables that are not valid unicode are skipped.
pub fn context_from_env() -> TemplateContext {
    context_from_vars(
        std::env::vars_os()
            .filter_map(|(k, v)| Some((k.into_string().ok()?, v.into_string().ok()?))),
    )
}
