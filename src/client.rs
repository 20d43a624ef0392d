//! Kubernetes client construction from raw pipeline credentials

use std::time::Duration;

use base64::{engine::general_purpose::STANDARD, Engine};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Client, Config};

use crate::config::KubeSettings;
use crate::{Error, Result};

/// Default connection timeout for the API server
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
/// Default read timeout; must outlast idle periods on a watch stream
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(295);
/// Slack between the settle deadline and the read timeout
const READ_TIMEOUT_MARGIN: Duration = Duration::from_secs(30);

const CONTEXT_NAME: &str = "pipeline";

/// Normalize the CA setting to base64-encoded PEM.
///
/// CI secrets usually hold the CA base64-encoded already; a raw PEM block is
/// encoded here.
pub fn ca_data(ca: &str) -> String {
    let ca = ca.trim();
    if ca.starts_with("-----BEGIN") {
        STANDARD.encode(ca.as_bytes())
    } else {
        ca.to_string()
    }
}

/// Build an in-memory kubeconfig with one cluster, user and context
pub fn kubeconfig(settings: &KubeSettings) -> Result<Kubeconfig> {
    let cluster = if settings.insecure_skip_tls_verify {
        serde_json::json!({
            "server": settings.server,
            "insecure-skip-tls-verify": true,
        })
    } else {
        serde_json::json!({
            "server": settings.server,
            "certificate-authority-data": ca_data(&settings.ca),
        })
    };

    let doc = serde_json::json!({
        "apiVersion": "v1",
        "kind": "Config",
        "clusters": [{ "name": CONTEXT_NAME, "cluster": cluster }],
        "users": [{ "name": CONTEXT_NAME, "user": { "token": settings.token } }],
        "contexts": [{
            "name": CONTEXT_NAME,
            "context": { "cluster": CONTEXT_NAME, "user": CONTEXT_NAME },
        }],
        "current-context": CONTEXT_NAME,
    });

    serde_json::from_value(doc).map_err(|e| Error::client(format!("invalid kubeconfig: {}", e)))
}

/// Read timeout for a client whose watches may idle for `settle_timeout`.
///
/// A quiet watch must reach the settle deadline before the connection times
/// out, otherwise the wait ends in a transport error.
pub fn read_timeout(settle_timeout: Duration) -> Duration {
    settle_timeout
        .saturating_add(READ_TIMEOUT_MARGIN)
        .max(DEFAULT_READ_TIMEOUT)
}

/// Create a client for the configured cluster
pub async fn create_client(settings: &KubeSettings, settle_timeout: Duration) -> Result<Client> {
    let kubeconfig = kubeconfig(settings)?;
    let mut config = Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
        .await
        .map_err(|e| Error::client(format!("failed to load kubeconfig: {}", e)))?;
    config.connect_timeout = Some(DEFAULT_CONNECT_TIMEOUT);
    config.read_timeout = Some(read_timeout(settle_timeout));
    if let Some(namespace) = &settings.namespace {
        config.default_namespace = namespace.clone();
    }
    Client::try_from(config).map_err(|e| Error::client(format!("failed to create client: {}", e)))
}
