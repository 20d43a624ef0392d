//! kube-deploy - apply a templated Kubernetes manifest from a CI pipeline
//!
//! The plugin renders a manifest template against pipeline variables,
//! decodes it into one of a closed set of resource kinds, creates or updates
//! it in the target cluster, and waits until the resource has settled.
//!
//! # Modules
//!
//! - [`config`] - Plugin settings from flags and `PLUGIN_*` variables
//! - [`context`] - Template context from pipeline environment variables
//! - [`template`] - Manifest template rendering
//! - [`manifest`] - Decoding into [`manifest::ResourceDescriptor`] and namespace resolution
//! - [`client`] - Kubernetes client from server, token and CA
//! - [`store`] - Resource store trait and its kube-rs implementation
//! - [`apply`] - Per-kind create-or-update logic
//! - [`settle`] - Bounded watch loop deciding when a resource is ready
//! - [`deploy`] - Kind dispatch tying apply and settle together
//! - [`error`] - Error types

#![deny(missing_docs)]

pub mod apply;
pub mod client;
pub mod config;
pub mod context;
pub mod deploy;
pub mod error;
pub mod manifest;
pub mod settle;
pub mod store;
pub mod template;

use tracing::{info, warn};

use crate::config::PluginSettings;
use crate::deploy::{apply_and_settle, DeployOptions, Outcome};
use crate::store::KubeStores;
use crate::template::TemplateEngine;

pub use error::Error;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Namespace used when neither the settings nor the manifest name one
pub const DEFAULT_NAMESPACE: &str = "default";

/// Run the plugin end to end: render, decode, connect, apply and settle.
///
/// A settlement timeout is returned as part of the [`Outcome`]; only errors
/// fail the step.
pub async fn run(settings: PluginSettings) -> Result<Outcome> {
    let ctx = context::context_from_env();

    let raw = tokio::fs::read_to_string(&settings.template)
        .await
        .map_err(|e| {
            Error::template(format!(
                "failed to read template {}: {}",
                settings.template.display(),
                e
            ))
        })?;
    let rendered = TemplateEngine::new().render(&raw, &ctx)?;
    let resource = manifest::decode(&rendered)?;

    let client = client::create_client(&settings.kube, settings.settle_timeout).await?;
    let stores = KubeStores::new(client);

    let options = DeployOptions {
        namespace: settings.kube.namespace.clone(),
        config_map_file: settings.config_map_file.clone(),
        settle_timeout: settings.settle_timeout,
    };
    let outcome = apply_and_settle(&stores, resource, &options).await?;

    match &outcome.settlement {
        Some(settlement) if settlement.is_ready() => info!(
            kind = %outcome.kind,
            name = %outcome.name,
            namespace = %outcome.namespace,
            "{}",
            settlement
        ),
        // Not settled in time is reported, but does not fail the step
        Some(settlement) => warn!(
            kind = %outcome.kind,
            name = %outcome.name,
            namespace = %outcome.namespace,
            "{}",
            settlement
        ),
        None => info!(
            kind = %outcome.kind,
            name = %outcome.name,
            namespace = %outcome.namespace,
            "Applied"
        ),
    }
    Ok(outcome)
}
