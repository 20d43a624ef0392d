//! Apply-and-settle dispatch
//!
//! Routes a decoded [`ResourceDescriptor`] to the applier for its kind and,
//! for kinds that converge asynchronously, waits for settlement.

use std::path::PathBuf;
use std::time::Duration;

use tracing::info;

use crate::apply;
use crate::manifest::{resolve_namespace, ResourceDescriptor, ResourceKind};
use crate::settle::{
    wait_until_settled, SettlePolicy, Settlement, DEFAULT_SETTLE_TIMEOUT,
    DEPLOYMENT_SETTLE_ATTEMPTS, SERVICE_SETTLE_ATTEMPTS,
};
use crate::store::StoreFactory;
use crate::{Error, Result};

/// Per-invocation options for [`apply_and_settle`]
#[derive(Clone, Debug)]
pub struct DeployOptions {
    /// Explicit namespace, overriding the manifest's
    pub namespace: Option<String>,
    /// Payload file for ConfigMap manifests
    pub config_map_file: Option<PathBuf>,
    /// Wall-clock budget for the settlement wait
    pub settle_timeout: Duration,
}

impl Default for DeployOptions {
    fn default() -> Self {
        Self {
            namespace: None,
            config_map_file: None,
            settle_timeout: DEFAULT_SETTLE_TIMEOUT,
        }
    }
}

/// Result of one apply-and-settle run
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Outcome {
    /// Kind that was applied
    pub kind: ResourceKind,
    /// Resource name
    pub name: String,
    /// Namespace the resource was applied in
    pub namespace: String,
    /// Settlement result, `None` for kinds that are not watched
    pub settlement: Option<Settlement>,
}

/// Apply the resource and wait for it to settle where its kind requires.
///
/// The namespace is resolved once, before dispatch, and written into the
/// resource metadata. Unsupported kinds fail without touching the store.
pub async fn apply_and_settle(
    stores: &dyn StoreFactory,
    mut resource: ResourceDescriptor,
    options: &DeployOptions,
) -> Result<Outcome> {
    let namespace = resolve_namespace(options.namespace.as_deref(), &resource);
    resource.set_namespace(&namespace);
    let name = resource.name().to_string();

    let (kind, settlement) = match &resource {
        ResourceDescriptor::Deployment(deployment) => {
            info!(name = %name, namespace = %namespace, "Resource type: Deployment");
            let store = stores.deployments(&namespace);
            apply::create_or_update_deployment(store.as_ref(), deployment).await?;

            let policy = SettlePolicy::with_max_attempts(DEPLOYMENT_SETTLE_ATTEMPTS)
                .timeout(options.settle_timeout);
            let settlement = wait_until_settled(store.as_ref(), &name, &policy).await?;
            (ResourceKind::Deployment, Some(settlement))
        }
        ResourceDescriptor::Service(service) => {
            info!(name = %name, namespace = %namespace, "Resource type: Service");
            let store = stores.services(&namespace);
            apply::create_or_replace_service(store.as_ref(), service).await?;

            let policy = SettlePolicy::with_max_attempts(SERVICE_SETTLE_ATTEMPTS)
                .timeout(options.settle_timeout);
            let settlement = wait_until_settled(store.as_ref(), &name, &policy).await?;
            (ResourceKind::Service, Some(settlement))
        }
        ResourceDescriptor::ConfigMap(config_map) => {
            info!(name = %name, namespace = %namespace, "Resource type: ConfigMap");
            let path = options.config_map_file.as_deref().ok_or_else(|| {
                Error::config(
                    "PLUGIN_CONFIG_MAP_FILE or settings.config_map_file must be defined for a ConfigMap",
                )
            })?;
            let store = stores.config_maps(&namespace);
            apply::apply_config_map_from_file(store.as_ref(), config_map, path).await?;
            (ResourceKind::ConfigMap, None)
        }
        ResourceDescriptor::Ingress(ingress) => {
            info!(name = %name, namespace = %namespace, "Resource type: Ingress");
            let store = stores.ingresses(&namespace);
            apply::apply_ingress(store.as_ref(), ingress).await?;
            (ResourceKind::Ingress, None)
        }
        ResourceDescriptor::Unsupported { .. } => {
            return Err(Error::unsupported_kind(resource.type_name()));
        }
    };

    Ok(Outcome {
        kind,
        name,
        namespace,
        settlement,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::decode;
    use crate::store::{MockResourceStore, ResourceStore, WatchSubscription};
    use futures::{stream, StreamExt};
    use k8s_openapi::api::apps::v1::Deployment;
    use k8s_openapi::api::core::v1::{
        ConfigMap, LoadBalancerIngress, LoadBalancerStatus, Service, ServiceStatus,
    };
    use k8s_openapi::api::networking::v1::Ingress;
    use std::io::Write;
    use std::sync::{Arc, Mutex};

    /// Test factory that hands out pre-configured mocks and records which
    /// namespaces were requested per kind.
    #[derive(Default)]
    struct FakeStores {
        deployments: Option<Arc<MockResourceStore<Deployment>>>,
        services: Option<Arc<MockResourceStore<Service>>>,
        config_maps: Option<Arc<MockResourceStore<ConfigMap>>>,
        ingresses: Option<Arc<MockResourceStore<Ingress>>>,
        requested: Mutex<Vec<(&'static str, String)>>,
    }

    impl FakeStores {
        fn record(&self, kind: &'static str, namespace: &str) {
            self.requested
                .lock()
                .unwrap()
                .push((kind, namespace.to_string()));
        }

        fn requested(&self) -> Vec<(&'static str, String)> {
            self.requested.lock().unwrap().clone()
        }
    }

    fn handout<K: Send + Sync + 'static>(
        store: &Option<Arc<MockResourceStore<K>>>,
        kind: &str,
    ) -> Arc<dyn ResourceStore<K>> {
        let Some(store) = store else {
            panic!("unexpected {} store request", kind);
        };
        store.clone()
    }

    impl StoreFactory for FakeStores {
        fn deployments(&self, namespace: &str) -> Arc<dyn ResourceStore<Deployment>> {
            self.record("Deployment", namespace);
            handout(&self.deployments, "Deployment")
        }

        fn services(&self, namespace: &str) -> Arc<dyn ResourceStore<Service>> {
            self.record("Service", namespace);
            handout(&self.services, "Service")
        }

        fn config_maps(&self, namespace: &str) -> Arc<dyn ResourceStore<ConfigMap>> {
            self.record("ConfigMap", namespace);
            handout(&self.config_maps, "ConfigMap")
        }

        fn ingresses(&self, namespace: &str) -> Arc<dyn ResourceStore<Ingress>> {
            self.record("Ingress", namespace);
            handout(&self.ingresses, "Ingress")
        }
    }

    fn with_ingress_ip(mut service: Service, ip: &str) -> Service {
        service.status = Some(ServiceStatus {
            load_balancer: Some(LoadBalancerStatus {
                ingress: Some(vec![LoadBalancerIngress {
                    ip: Some(ip.to_string()),
                    ..Default::default()
                }]),
            }),
            ..Default::default()
        });
        service
    }

    // =========================================================================
    // Story: Dispatch by kind
    // =========================================================================

    #[tokio::test]
    async fn unsupported_kind_fails_without_store_access() {
        let stores = FakeStores::default();
        let resource = decode("apiVersion: batch/v1\nkind: Job\nmetadata:\n  name: migrate\n")
            .unwrap();

        let err = apply_and_settle(&stores, resource, &DeployOptions::default())
            .await
            .unwrap_err();

        match err {
            Error::UnsupportedResourceKind { type_name } => assert_eq!(type_name, "batch/v1/Job"),
            other => panic!("expected UnsupportedResourceKind, got {:?}", other),
        }
        assert!(stores.requested().is_empty());
    }

    #[tokio::test]
    async fn ingress_is_applied_without_watch() {
        let mut ingresses = MockResourceStore::<Ingress>::new();
        ingresses.expect_watch().never();
        ingresses
            .expect_create()
            .times(1)
            .returning(|i| Ok(i.clone()));
        let stores = FakeStores {
            ingresses: Some(Arc::new(ingresses)),
            ..Default::default()
        };
        let resource = decode(
            "apiVersion: networking.k8s.io/v1\nkind: Ingress\nmetadata:\n  name: web\n  namespace: edge\n",
        )
        .unwrap();

        let outcome = apply_and_settle(&stores, resource, &DeployOptions::default())
            .await
            .unwrap();

        assert_eq!(outcome.kind, ResourceKind::Ingress);
        assert_eq!(outcome.namespace, "edge");
        assert_eq!(outcome.settlement, None);
        assert_eq!(stores.requested(), vec![("Ingress", "edge".to_string())]);
    }

    #[tokio::test]
    async fn config_map_without_payload_file_is_a_config_error() {
        let stores = FakeStores::default();
        let resource =
            decode("apiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: app\n").unwrap();

        let err = apply_and_settle(&stores, resource, &DeployOptions::default())
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Config(_)));
        assert!(stores.requested().is_empty());
    }

    #[tokio::test]
    async fn config_map_uploads_payload_in_override_namespace() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"key=value").unwrap();

        let mut config_maps = MockResourceStore::<ConfigMap>::new();
        config_maps
            .expect_create()
            .times(1)
            .withf(|c| {
                c.metadata.namespace.as_deref() == Some("prod")
                    && c.binary_data.as_ref().map(|d| d.len()) == Some(1)
            })
            .returning(|c| Ok(c.clone()));
        let stores = FakeStores {
            config_maps: Some(Arc::new(config_maps)),
            ..Default::default()
        };
        let resource = decode(
            "apiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: app\n  namespace: team-a\n",
        )
        .unwrap();
        let options = DeployOptions {
            namespace: Some("prod".to_string()),
            config_map_file: Some(file.path().to_path_buf()),
            ..Default::default()
        };

        let outcome = apply_and_settle(&stores, resource, &options).await.unwrap();

        assert_eq!(outcome.kind, ResourceKind::ConfigMap);
        assert_eq!(outcome.namespace, "prod");
        assert_eq!(stores.requested(), vec![("ConfigMap", "prod".to_string())]);
    }

    #[tokio::test]
    async fn deployment_is_applied_and_watched() {
        let mut deployments = MockResourceStore::<Deployment>::new();
        // existence check, then the settlement snapshot
        let mut lookups = 0;
        deployments.expect_get().times(2).returning(move |name| {
            lookups += 1;
            if lookups == 1 {
                Err(Error::not_found("Deployment", name))
            } else {
                Ok(Deployment {
                    status: Some(Default::default()),
                    ..Default::default()
                })
            }
        });
        deployments
            .expect_create()
            .times(1)
            .returning(|d| Ok(d.clone()));
        deployments.expect_watch().times(1).return_once(|name| {
            Ok(WatchSubscription::new(
                name,
                stream::empty::<Result<Deployment>>().boxed(),
            ))
        });
        let stores = FakeStores {
            deployments: Some(Arc::new(deployments)),
            ..Default::default()
        };
        let resource =
            decode("apiVersion: apps/v1\nkind: Deployment\nmetadata:\n  name: web\n").unwrap();

        let outcome = apply_and_settle(&stores, resource, &DeployOptions::default())
            .await
            .unwrap();

        assert_eq!(outcome.kind, ResourceKind::Deployment);
        assert_eq!(outcome.namespace, crate::DEFAULT_NAMESPACE);
        assert!(outcome.settlement.unwrap().is_ready());
    }

    // =========================================================================
    // Story: End-to-end Service deploy from a template
    // =========================================================================

    #[tokio::test]
    async fn templated_service_is_created_and_settles_on_first_ingress() {
        use crate::context::context_from_vars;
        use crate::template::TemplateEngine;

        let template = "apiVersion: v1\nkind: Service\nmetadata:\n  name: {{app}}\nspec:\n  type: LoadBalancer\n";
        let ctx = context_from_vars([("PLUGIN_APP", "demo")]);
        let rendered = TemplateEngine::new().render(template, &ctx).unwrap();
        let resource = decode(&rendered).unwrap();
        assert_eq!(resource.name(), "demo");

        let created: Arc<Mutex<Option<Service>>> = Arc::default();
        let mut services = MockResourceStore::<Service>::new();
        // existence check, then the settlement snapshot
        let mut lookups = 0;
        let snapshot = created.clone();
        services.expect_get().times(2).returning(move |name| {
            lookups += 1;
            if lookups == 1 {
                Err(Error::not_found("Service", name))
            } else {
                Ok(snapshot.lock().unwrap().clone().unwrap_or_default())
            }
        });
        services.expect_delete().never();
        let sink = created.clone();
        services.expect_create().times(1).returning(move |s| {
            *sink.lock().unwrap() = Some(s.clone());
            Ok(s.clone())
        });
        let event = with_ingress_ip(Service::default(), "10.0.0.5");
        services
            .expect_watch()
            .times(1)
            .return_once(move |name| {
                Ok(WatchSubscription::new(
                    name,
                    stream::iter(vec![Ok(event)]).boxed(),
                ))
            });
        let stores = FakeStores {
            services: Some(Arc::new(services)),
            ..Default::default()
        };

        let outcome = apply_and_settle(&stores, resource, &DeployOptions::default())
            .await
            .unwrap();

        assert_eq!(outcome.name, "demo");
        assert_eq!(
            outcome.settlement,
            Some(Settlement::Ready {
                status: "Updated: 10.0.0.5".to_string()
            })
        );
        let created = created.lock().unwrap().clone().unwrap();
        assert_eq!(created.metadata.namespace.as_deref(), Some("default"));
    }
}
