//! Per-kind appliers
//!
//! Each applier creates or updates one resource kind through a
//! [`ResourceStore`](crate::store::ResourceStore). None of them retries a
//! mutating call or rolls back on failure.

mod config_map;
mod deployment;
mod ingress;
mod service;

pub use config_map::{apply_config_map, apply_config_map_from_file};
pub use deployment::create_or_update_deployment;
pub use ingress::apply_ingress;
pub use service::create_or_replace_service;

use crate::store::ResourceStore;
use crate::Result;

/// Fetch the named resource, mapping not-found to `None`.
///
/// Any other failure is propagated.
pub(crate) async fn find_existing<K>(store: &dyn ResourceStore<K>, name: &str) -> Result<Option<K>>
where
    K: Send + Sync + 'static,
{
    match store.get(name).await {
        Ok(resource) => Ok(Some(resource)),
        Err(e) if e.is_not_found() => Ok(None),
        Err(e) => Err(e),
    }
}
