//! Deployment create-or-update

use k8s_openapi::api::apps::v1::Deployment;
use tracing::info;

use super::find_existing;
use crate::store::ResourceStore;
use crate::Result;

/// Create the Deployment, or replace the spec of an existing one in place.
///
/// The replace carries the live `resourceVersion`, so a concurrent writer
/// makes it fail with a conflict instead of being overwritten.
pub async fn create_or_update_deployment(
    store: &dyn ResourceStore<Deployment>,
    deployment: &Deployment,
) -> Result<Deployment> {
    let name = deployment.metadata.name.as_deref().unwrap_or_default();

    match find_existing(store, name).await? {
        Some(existing) => {
            info!(name = %name, "Found existing deployment, updating");
            let mut desired = deployment.clone();
            desired.metadata.resource_version = existing.metadata.resource_version;
            store.replace(name, &desired).await
        }
        None => {
            info!(name = %name, "Creating deployment");
            store.create(deployment).await
        }
    }
}
