//! Service create-or-replace

use std::time::Duration;

use k8s_openapi::api::core::v1::Service;
use tracing::{debug, info, warn};

use super::find_existing;
use crate::store::ResourceStore;
use crate::Result;

/// Interval between existence checks while the old Service terminates
pub const DELETION_POLL_INTERVAL: Duration = Duration::from_secs(1);
/// Existence checks before creating regardless
pub const DELETION_POLL_ATTEMPTS: u32 = 60;

/// Create the Service, deleting an existing one with the same name first.
///
/// A Service is replaced by delete-then-create, so it is briefly absent. If
/// the delete succeeds and the create fails, the Service stays deleted.
///
/// A LoadBalancer Service carries the load-balancer cleanup finalizer, so it
/// outlives the delete call until the cloud provider releases the balancer.
/// The create waits for the old object to disappear, bounded by
/// [`DELETION_POLL_ATTEMPTS`]; past that the API server's conflict is
/// returned.
pub async fn create_or_replace_service(
    store: &dyn ResourceStore<Service>,
    service: &Service,
) -> Result<Service> {
    let name = service.metadata.name.as_deref().unwrap_or_default();

    if find_existing(store, name).await?.is_some() {
        info!(name = %name, "Found existing service, removing");
        match store.delete(name).await {
            Ok(()) => wait_until_gone(store, name).await?,
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e),
        }
    }

    info!(name = %name, "Creating service");
    store.create(service).await
}

async fn wait_until_gone(store: &dyn ResourceStore<Service>, name: &str) -> Result<()> {
    for _ in 0..DELETION_POLL_ATTEMPTS {
        if find_existing(store, name).await?.is_none() {
            return Ok(());
        }
        debug!(name = %name, "Service still terminating");
        tokio::time::sleep(DELETION_POLL_INTERVAL).await;
    }
    warn!(
        name = %name,
        attempts = DELETION_POLL_ATTEMPTS,
        "Service still terminating, creating anyway"
    );
    Ok(())
}
