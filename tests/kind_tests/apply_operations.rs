//! Stories about applying manifests to a live cluster

use std::io::Write;
use std::time::Duration;

use k8s_openapi::api::core::v1::{ConfigMap, Service};
use kube::api::Api;

use kube_deploy::deploy::{apply_and_settle, DeployOptions};
use kube_deploy::manifest::{decode, ResourceKind};
use kube_deploy::store::KubeStores;
use kube_deploy::Error;

use super::helpers::{cleanup, test_client, TEST_NAMESPACE};

fn service_manifest(name: &str) -> String {
    format!(
        "apiVersion: v1\nkind: Service\nmetadata:\n  name: {}\nspec:\n  type: ClusterIP\n  ports:\n    - port: 80\n",
        name
    )
}

/// Story: A ConfigMap is uploaded once and a second upload conflicts
///
/// The ConfigMap applier does no existence check, so re-running the same
/// pipeline step surfaces the API server's conflict instead of silently
/// succeeding.
#[tokio::test]
#[ignore = "requires a cluster - run with: cargo test --test kind -- --ignored"]
async fn story_config_map_upload_is_not_idempotent() {
    let client = test_client().await.expect("failed to connect");
    let name = "kube-deploy-it-config";
    cleanup(&client, name).await;

    let mut payload = tempfile::NamedTempFile::new().unwrap();
    payload.write_all(b"feature_flag=true").unwrap();
    let stores = KubeStores::new(client.clone());
    let options = DeployOptions {
        namespace: Some(TEST_NAMESPACE.to_string()),
        config_map_file: Some(payload.path().to_path_buf()),
        ..Default::default()
    };
    let manifest = format!("apiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: {}\n", name);

    let outcome = apply_and_settle(&stores, decode(&manifest).unwrap(), &options)
        .await
        .expect("first apply should succeed");
    assert_eq!(outcome.kind, ResourceKind::ConfigMap);

    let err = apply_and_settle(&stores, decode(&manifest).unwrap(), &options)
        .await
        .expect_err("second apply should conflict");
    assert!(matches!(err, Error::Kube(_)), "got {:?}", err);

    let api: Api<ConfigMap> = Api::namespaced(client.clone(), TEST_NAMESPACE);
    let stored = api.get(name).await.expect("config map should exist");
    assert_eq!(stored.binary_data.map(|d| d.len()), Some(1));

    cleanup(&client, name).await;
}

/// Story: A Service without a load balancer never settles, and that is not a failure
///
/// A ClusterIP Service gets no load balancer ingress. Re-applying it
/// replaces the existing object, and the settlement wait ends with a
/// timeout status rather than an error.
#[tokio::test]
#[ignore = "requires a cluster - run with: cargo test --test kind -- --ignored"]
async fn story_service_is_replaced_and_times_out_without_load_balancer() {
    let client = test_client().await.expect("failed to connect");
    let name = "kube-deploy-it-svc";
    cleanup(&client, name).await;

    let stores = KubeStores::new(client.clone());
    let options = DeployOptions {
        namespace: Some(TEST_NAMESPACE.to_string()),
        settle_timeout: Duration::from_secs(5),
        ..Default::default()
    };

    let api: Api<Service> = Api::namespaced(client.clone(), TEST_NAMESPACE);
    for _ in 0..2 {
        let outcome = apply_and_settle(&stores, decode(&service_manifest(name)).unwrap(), &options)
            .await
            .expect("apply should succeed");
        let settlement = outcome.settlement.expect("services are watched");
        assert!(!settlement.is_ready(), "{}", settlement);
        assert!(api.get(name).await.is_ok());
    }

    cleanup(&client, name).await;
}
