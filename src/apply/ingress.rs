//! Ingress passthrough

use k8s_openapi::api::networking::v1::Ingress;
use tracing::info;

use crate::store::ResourceStore;
use crate::Result;

/// Create the Ingress. No existence check and no settlement wait.
pub async fn apply_ingress(store: &dyn ResourceStore<Ingress>, ingress: &Ingress) -> Result<Ingress> {
    info!(
        name = %ingress.metadata.name.as_deref().unwrap_or_default(),
        "Creating ingress"
    );
    store.create(ingress).await
}
