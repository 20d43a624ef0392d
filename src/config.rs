//! Plugin settings
//!
//! Each setting can be passed as a flag or through the `PLUGIN_<NAME>`
//! environment variable that the CI runner derives from the step's
//! `settings:` block.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use crate::{Error, Result};

/// Upper bound for `settle-timeout`.
///
/// The API server ends a watch after its minimum request timeout (30 minutes
/// by default); a longer wait would see the stream close before the deadline.
pub const MAX_SETTLE_TIMEOUT_SECS: u64 = 1800;

/// Apply a templated Kubernetes manifest and wait for it to settle
#[derive(Parser, Debug, Clone)]
#[command(name = "kube-deploy")]
#[command(version, about, long_about = None)]
pub struct PluginArgs {
    /// Kubernetes API server URL
    #[arg(long, env = "PLUGIN_SERVER")]
    pub server: Option<String>,

    /// Bearer token for the API server
    #[arg(long, env = "PLUGIN_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Cluster CA certificate, base64-encoded or PEM
    #[arg(long, env = "PLUGIN_CA", hide_env_values = true)]
    pub ca: Option<String>,

    /// Namespace override; takes precedence over the manifest's namespace
    #[arg(long, env = "PLUGIN_NAMESPACE")]
    pub namespace: Option<String>,

    /// Path to the manifest template
    #[arg(long, env = "PLUGIN_TEMPLATE")]
    pub template: Option<PathBuf>,

    /// File uploaded as binary data when the manifest is a ConfigMap
    #[arg(long, env = "PLUGIN_CONFIG_MAP_FILE")]
    pub config_map_file: Option<PathBuf>,

    /// Skip verification of the API server certificate
    #[arg(long, env = "PLUGIN_INSECURE_SKIP_TLS_VERIFY")]
    pub insecure_skip_tls_verify: bool,

    /// Seconds to wait for the resource to settle
    #[arg(
        long,
        env = "PLUGIN_SETTLE_TIMEOUT",
        default_value = "120",
        value_parser = clap::value_parser!(u64).range(1..=MAX_SETTLE_TIMEOUT_SECS)
    )]
    pub settle_timeout: u64,
}

/// Connection settings for the cluster
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KubeSettings {
    /// API server URL
    pub server: String,
    /// Bearer token
    pub token: String,
    /// CA certificate, base64-encoded or PEM
    pub ca: String,
    /// Namespace override
    pub namespace: Option<String>,
    /// Skip TLS verification
    pub insecure_skip_tls_verify: bool,
}

/// Validated plugin settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginSettings {
    /// Cluster connection
    pub kube: KubeSettings,
    /// Manifest template path
    pub template: PathBuf,
    /// ConfigMap payload file
    pub config_map_file: Option<PathBuf>,
    /// Settlement deadline
    pub settle_timeout: Duration,
}

fn required(value: Option<String>, name: &str) -> Result<String> {
    value.filter(|v| !v.is_empty()).ok_or_else(|| {
        Error::config(format!(
            "PLUGIN_{} or settings.{} must be defined",
            name.to_uppercase(),
            name
        ))
    })
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

impl PluginArgs {
    /// Check that every required setting is present.
    ///
    /// Runs before any file or network access.
    pub fn validate(self) -> Result<PluginSettings> {
        let server = required(self.server, "server")?;
        let token = required(self.token, "token")?;
        let ca = required(self.ca, "ca")?;
        let template = required(
            self.template.map(|p| p.to_string_lossy().into_owned()),
            "template",
        )?;

        Ok(PluginSettings {
            kube: KubeSettings {
                server,
                token,
                ca,
                namespace: non_empty(self.namespace),
                insecure_skip_tls_verify: self.insecure_skip_tls_verify,
            },
            template: PathBuf::from(template),
            config_map_file: self.config_map_file.filter(|p| !p.as_os_str().is_empty()),
            settle_timeout: Duration::from_secs(self.settle_timeout),
        })
    }
}
