//! Error types for kube-deploy

use thiserror::Error;

/// Main error type for apply-and-settle operations
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Kubernetes API error
    #[error("kubernetes error: {0}")]
    Kube(#[from] kube::Error),

    /// A required setting is missing or invalid
    #[error("configuration error: {0}")]
    Config(String),

    /// Template rendering failed
    #[error("template error: {0}")]
    Template(String),

    /// Rendered manifest could not be decoded into a resource
    #[error("decode error: {0}")]
    Decode(String),

    /// The manifest decoded to a kind this plugin does not apply
    #[error("unsupported resource kind: {type_name}")]
    UnsupportedResourceKind {
        /// The observed `apiVersion/kind` of the manifest
        type_name: String,
    },

    /// The named resource does not exist in the store
    #[error("{kind} '{name}' not found")]
    NotFound {
        /// Resource kind
        kind: String,
        /// Resource name
        name: String,
    },

    /// Watch subscription failed or closed before a decision
    #[error("watch error: {0}")]
    Watch(String),

    /// Failed to build a cluster client from the provided credentials
    #[error("client error: {0}")]
    Client(String),

    /// Local file I/O error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create a configuration error with the given message
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a template error with the given message
    pub fn template(msg: impl Into<String>) -> Self {
        Self::Template(msg.into())
    }

    /// Create a decode error with the given message
    pub fn decode(msg: impl Into<String>) -> Self {
        Self::Decode(msg.into())
    }

    /// Create an unsupported kind error for the observed type name
    pub fn unsupported_kind(type_name: impl Into<String>) -> Self {
        Self::UnsupportedResourceKind {
            type_name: type_name.into(),
        }
    }

    /// Create a not-found error for a resource
    pub fn not_found(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self::NotFound {
            kind: kind.into(),
            name: name.into(),
        }
    }

    /// Create a watch error with the given message
    pub fn watch(msg: impl Into<String>) -> Self {
        Self::Watch(msg.into())
    }

    /// Create a client construction error with the given message
    pub fn client(msg: impl Into<String>) -> Self {
        Self::Client(msg.into())
    }

    /// Whether this error only signals that the resource is absent.
    ///
    /// Existence checks and deletes treat absence as a normal outcome.
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::NotFound { .. } => true,
            Self::Kube(kube::Error::Api(e)) => e.code == 404,
            _ => false,
        }
    }
}
