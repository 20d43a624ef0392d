//! Shared helpers for cluster-backed tests

use k8s_openapi::api::core::v1::{ConfigMap, Service};
use kube::api::{Api, DeleteParams};
use kube::Client;

/// Namespace the tests apply into
pub const TEST_NAMESPACE: &str = "default";

/// Connect with the ambient kubeconfig
pub async fn test_client() -> Result<Client, kube::Error> {
    Client::try_default().await
}

/// Remove leftovers from previous runs
pub async fn cleanup(client: &Client, name: &str) {
    let services: Api<Service> = Api::namespaced(client.clone(), TEST_NAMESPACE);
    let _ = services.delete(name, &DeleteParams::default()).await;
    let config_maps: Api<ConfigMap> = Api::namespaced(client.clone(), TEST_NAMESPACE);
    let _ = config_maps.delete(name, &DeleteParams::default()).await;
}
