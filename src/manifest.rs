//! Manifest decoding into a closed set of resource kinds
//!
//! A rendered manifest is one YAML document. Its `apiVersion` and `kind`
//! select the typed `k8s-openapi` struct; anything outside the supported set
//! decodes to [`ResourceDescriptor::Unsupported`] so dispatch can report it.

use std::fmt;

use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{ConfigMap, Service};
use k8s_openapi::api::networking::v1::Ingress;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use serde::de::DeserializeOwned;

use crate::{Error, Result, DEFAULT_NAMESPACE};

/// Supported resource kinds
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResourceKind {
    /// `apps/v1` Deployment
    Deployment,
    /// `v1` Service
    Service,
    /// `v1` ConfigMap
    ConfigMap,
    /// `networking.k8s.io/v1` Ingress
    Ingress,
}

impl ResourceKind {
    /// Kind name as it appears in manifests
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Deployment => "Deployment",
            Self::Service => "Service",
            Self::ConfigMap => "ConfigMap",
            Self::Ingress => "Ingress",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Decoded manifest
#[derive(Clone, Debug)]
pub enum ResourceDescriptor {
    /// A Deployment
    Deployment(Box<Deployment>),
    /// A Service
    Service(Box<Service>),
    /// A ConfigMap
    ConfigMap(Box<ConfigMap>),
    /// An Ingress
    Ingress(Box<Ingress>),
    /// Any other `apiVersion`/`kind` pair
    Unsupported {
        /// Declared `apiVersion`
        api_version: String,
        /// Declared `kind`
        kind: String,
        /// Declared `metadata`, kept for logging
        metadata: ObjectMeta,
    },
}

impl ResourceDescriptor {
    fn metadata(&self) -> &ObjectMeta {
        match self {
            Self::Deployment(d) => &d.metadata,
            Self::Service(s) => &s.metadata,
            Self::ConfigMap(c) => &c.metadata,
            Self::Ingress(i) => &i.metadata,
            Self::Unsupported { metadata, .. } => metadata,
        }
    }

    fn metadata_mut(&mut self) -> &mut ObjectMeta {
        match self {
            Self::Deployment(d) => &mut d.metadata,
            Self::Service(s) => &mut s.metadata,
            Self::ConfigMap(c) => &mut c.metadata,
            Self::Ingress(i) => &mut i.metadata,
            Self::Unsupported { metadata, .. } => metadata,
        }
    }

    /// Supported kind, `None` for unsupported manifests
    pub fn kind(&self) -> Option<ResourceKind> {
        match self {
            Self::Deployment(_) => Some(ResourceKind::Deployment),
            Self::Service(_) => Some(ResourceKind::Service),
            Self::ConfigMap(_) => Some(ResourceKind::ConfigMap),
            Self::Ingress(_) => Some(ResourceKind::Ingress),
            Self::Unsupported { .. } => None,
        }
    }

    /// `apiVersion/kind` type identifier, used in error reports
    pub fn type_name(&self) -> String {
        match self {
            Self::Deployment(_) => "apps/v1/Deployment".to_string(),
            Self::Service(_) => "v1/Service".to_string(),
            Self::ConfigMap(_) => "v1/ConfigMap".to_string(),
            Self::Ingress(_) => "networking.k8s.io/v1/Ingress".to_string(),
            Self::Unsupported {
                api_version, kind, ..
            } => format!("{}/{}", api_version, kind),
        }
    }

    /// `metadata.name`, empty when absent
    pub fn name(&self) -> &str {
        self.metadata().name.as_deref().unwrap_or_default()
    }

    /// `metadata.namespace` when present and non-empty
    pub fn namespace(&self) -> Option<&str> {
        self.metadata()
            .namespace
            .as_deref()
            .filter(|ns| !ns.is_empty())
    }

    /// Overwrite `metadata.namespace`
    pub fn set_namespace(&mut self, namespace: &str) {
        self.metadata_mut().namespace = Some(namespace.to_string());
    }
}

/// Resolve the target namespace.
///
/// An explicit setting wins over the manifest's namespace; with neither,
/// [`DEFAULT_NAMESPACE`] is used.
pub fn resolve_namespace(explicit: Option<&str>, resource: &ResourceDescriptor) -> String {
    explicit
        .filter(|ns| !ns.is_empty())
        .or_else(|| resource.namespace())
        .unwrap_or(DEFAULT_NAMESPACE)
        .to_string()
}

fn typed<K: DeserializeOwned>(value: serde_yaml::Value, type_name: &str) -> Result<Box<K>> {
    serde_yaml::from_value(value)
        .map(Box::new)
        .map_err(|e| Error::decode(format!("invalid {}: {}", type_name, e)))
}

/// Decode one rendered YAML document
pub fn decode(manifest: &str) -> Result<ResourceDescriptor> {
    let value: serde_yaml::Value = serde_yaml::from_str(manifest)
        .map_err(|e| Error::decode(format!("invalid YAML: {}", e)))?;

    let field = |key: &str| {
        value
            .get(key)
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .ok_or_else(|| Error::decode(format!("manifest is missing '{}'", key)))
    };
    let api_version = field("apiVersion")?;
    let kind = field("kind")?;

    match (api_version.as_str(), kind.as_str()) {
        ("apps/v1", "Deployment") => {
            return Ok(ResourceDescriptor::Deployment(typed(value, &kind)?));
        }
        ("v1", "Service") => return Ok(ResourceDescriptor::Service(typed(value, &kind)?)),
        ("v1", "ConfigMap") => return Ok(ResourceDescriptor::ConfigMap(typed(value, &kind)?)),
        ("networking.k8s.io/v1", "Ingress") => {
            return Ok(ResourceDescriptor::Ingress(typed(value, &kind)?));
        }
        _ => {}
    }

    let metadata = value
        .get("metadata")
        .cloned()
        .map(serde_yaml::from_value)
        .transpose()
        .map_err(|e| Error::decode(format!("invalid metadata: {}", e)))?
        .unwrap_or_default();
    Ok(ResourceDescriptor::Unsupported {
        api_version,
        kind,
        metadata,
    })
}
