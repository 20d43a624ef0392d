//! Resource store abstraction over one namespaced collection
//!
//! Appliers and the settlement watcher only talk to [`ResourceStore`], which
//! lets tests substitute mocks for the real kube-rs backed [`KubeStore`].

use std::fmt::Debug;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use async_trait::async_trait;
use futures::stream::{BoxStream, Stream, StreamExt};
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{ConfigMap, Service};
use k8s_openapi::api::networking::v1::Ingress;
use k8s_openapi::NamespaceResourceScope;
use kube::api::{Api, DeleteParams, PostParams, WatchEvent, WatchParams};
use kube::{Client, Resource};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

#[cfg(test)]
use mockall::automock;

use crate::Error;

/// Live subscription to change events for one named resource.
///
/// Each item is the resource snapshot carried by an event. The underlying
/// server-side watch is closed when the subscription is dropped, so owning
/// it in a scope is enough to release it on every exit path.
pub struct WatchSubscription<K> {
    name: String,
    events: BoxStream<'static, Result<K, Error>>,
}

impl<K> WatchSubscription<K> {
    /// Wrap an event stream for the named resource
    pub fn new(name: impl Into<String>, events: BoxStream<'static, Result<K, Error>>) -> Self {
        Self {
            name: name.into(),
            events,
        }
    }

    /// Name of the watched resource
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl<K> Stream for WatchSubscription<K> {
    type Item = Result<K, Error>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.events.poll_next_unpin(cx)
    }
}

impl<K> Drop for WatchSubscription<K> {
    fn drop(&mut self) {
        debug!(name = %self.name, "Closing watch subscription");
    }
}

/// Create, read, replace, delete and watch operations on one namespaced
/// resource collection.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ResourceStore<K: Send + Sync + 'static>: Send + Sync {
    /// Fetch the named resource.
    ///
    /// Returns [`Error::NotFound`] when it does not exist.
    async fn get(&self, name: &str) -> Result<K, Error>;

    /// Create a new resource. Fails with a conflict if it already exists.
    async fn create(&self, resource: &K) -> Result<K, Error>;

    /// Replace the spec of an existing resource in place
    async fn replace(&self, name: &str, resource: &K) -> Result<K, Error>;

    /// Delete the named resource.
    ///
    /// Returns [`Error::NotFound`] when it does not exist.
    async fn delete(&self, name: &str) -> Result<(), Error>;

    /// Open a watch filtered to the named resource
    async fn watch(&self, name: &str) -> Result<WatchSubscription<K>, Error>;
}

/// [`ResourceStore`] backed by a namespaced `kube::Api`
pub struct KubeStore<K> {
    api: Api<K>,
}

impl<K> KubeStore<K>
where
    K: Resource<Scope = NamespaceResourceScope>,
    <K as Resource>::DynamicType: Default,
{
    /// Create a store for `K` in the given namespace
    pub fn namespaced(client: Client, namespace: &str) -> Self {
        Self {
            api: Api::namespaced(client, namespace),
        }
    }
}

fn kind_of<K>() -> String
where
    K: Resource,
    <K as Resource>::DynamicType: Default,
{
    K::kind(&Default::default()).into_owned()
}

/// Map a kube-rs error, turning 404 responses into [`Error::NotFound`]
fn map_kube_error<K>(err: kube::Error, name: &str) -> Error
where
    K: Resource,
    <K as Resource>::DynamicType: Default,
{
    match err {
        kube::Error::Api(e) if e.code == 404 => Error::not_found(kind_of::<K>(), name),
        other => Error::Kube(other),
    }
}

/// Flatten a raw watch event into a resource snapshot.
///
/// Bookmarks carry no object and are skipped.
fn event_snapshot<K>(event: kube::Result<WatchEvent<K>>) -> Option<Result<K, Error>> {
    match event {
        Ok(WatchEvent::Added(obj))
        | Ok(WatchEvent::Modified(obj))
        | Ok(WatchEvent::Deleted(obj)) => Some(Ok(obj)),
        Ok(WatchEvent::Bookmark(_)) => None,
        Ok(WatchEvent::Error(e)) => Some(Err(Error::watch(format!(
            "watch returned error {}: {}",
            e.code, e.message
        )))),
        Err(e) => Some(Err(Error::Kube(e))),
    }
}

#[async_trait]
impl<K> ResourceStore<K> for KubeStore<K>
where
    K: Resource<Scope = NamespaceResourceScope>
        + Clone
        + Debug
        + DeserializeOwned
        + Serialize
        + Send
        + Sync
        + 'static,
    <K as Resource>::DynamicType: Default,
{
    async fn get(&self, name: &str) -> Result<K, Error> {
        self.api
            .get(name)
            .await
            .map_err(|e| map_kube_error::<K>(e, name))
    }

    async fn create(&self, resource: &K) -> Result<K, Error> {
        Ok(self.api.create(&PostParams::default(), resource).await?)
    }

    async fn replace(&self, name: &str, resource: &K) -> Result<K, Error> {
        self.api
            .replace(name, &PostParams::default(), resource)
            .await
            .map_err(|e| map_kube_error::<K>(e, name))
    }

    async fn delete(&self, name: &str) -> Result<(), Error> {
        self.api
            .delete(name, &DeleteParams::default())
            .await
            .map(|_| ())
            .map_err(|e| map_kube_error::<K>(e, name))
    }

    async fn watch(&self, name: &str) -> Result<WatchSubscription<K>, Error> {
        let params = WatchParams::default().fields(&format!("metadata.name={}", name));
        let events = self.api.watch(&params, "0").await?;
        let snapshots = events.filter_map(|event| futures::future::ready(event_snapshot(event)));
        Ok(WatchSubscription::new(name, snapshots.boxed()))
    }
}

/// Hands out one store per supported kind for a namespace
pub trait StoreFactory: Send + Sync {
    /// Deployment store
    fn deployments(&self, namespace: &str) -> Arc<dyn ResourceStore<Deployment>>;
    /// Service store
    fn services(&self, namespace: &str) -> Arc<dyn ResourceStore<Service>>;
    /// ConfigMap store
    fn config_maps(&self, namespace: &str) -> Arc<dyn ResourceStore<ConfigMap>>;
    /// Ingress store
    fn ingresses(&self, namespace: &str) -> Arc<dyn ResourceStore<Ingress>>;
}

/// [`StoreFactory`] producing [`KubeStore`]s from a shared client
#[derive(Clone)]
pub struct KubeStores {
    client: Client,
}

impl KubeStores {
    /// Wrap a kube client
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

impl StoreFactory for KubeStores {
    fn deployments(&self, namespace: &str) -> Arc<dyn ResourceStore<Deployment>> {
        Arc::new(KubeStore::namespaced(self.client.clone(), namespace))
    }

    fn services(&self, namespace: &str) -> Arc<dyn ResourceStore<Service>> {
        Arc::new(KubeStore::namespaced(self.client.clone(), namespace))
    }

    fn config_maps(&self, namespace: &str) -> Arc<dyn ResourceStore<ConfigMap>> {
        Arc::new(KubeStore::namespaced(self.client.clone(), namespace))
    }

    fn ingresses(&self, namespace: &str) -> Arc<dyn ResourceStore<Ingress>> {
        Arc::new(KubeStore::namespaced(self.client.clone(), namespace))
    }
}
