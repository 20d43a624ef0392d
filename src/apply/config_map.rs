//! ConfigMap upload from a local file

use std::collections::BTreeMap;
use std::path::Path;

use k8s_openapi::api::core::v1::ConfigMap;
use k8s_openapi::ByteString;
use tracing::info;

use crate::store::ResourceStore;
use crate::Result;

/// Create the ConfigMap with `binary_data` set to one entry keyed by `key`.
///
/// There is no existence check: applying the same ConfigMap twice fails
/// with the store's conflict error on the second call.
pub async fn apply_config_map(
    store: &dyn ResourceStore<ConfigMap>,
    config_map: &ConfigMap,
    key: &str,
    contents: Vec<u8>,
) -> Result<ConfigMap> {
    let mut config_map = config_map.clone();
    config_map.binary_data = Some(BTreeMap::from([(key.to_string(), ByteString(contents))]));

    info!(
        name = %config_map.metadata.name.as_deref().unwrap_or_default(),
        key = %key,
        "Creating config map"
    );
    store.create(&config_map).await
}

/// Read `path` and upload its bytes under a key equal to the path string
pub async fn apply_config_map_from_file(
    store: &dyn ResourceStore<ConfigMap>,
    config_map: &ConfigMap,
    path: &Path,
) -> Result<ConfigMap> {
    info!(path = %path.display(), "Reading config map payload");
    let contents = tokio::fs::read(path).await?;
    apply_config_map(store, config_map, &path.to_string_lossy(), contents).await
}
