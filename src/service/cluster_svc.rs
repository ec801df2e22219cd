use std::fmt::Debug;

use async_trait::async_trait;
use k8s_openapi::NamespaceResourceScope;
use kube::api::{Patch, PatchParams, PostParams};
use kube::{Api, Client, Resource, ResourceExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::json;

/// Namespaced objects the operator reads and writes.
pub trait ClusterObject:
    Resource<DynamicType = (), Scope = NamespaceResourceScope>
    + Clone
    + Debug
    + Serialize
    + DeserializeOwned
    + Send
    + Sync
    + 'static
{
}

impl<K> ClusterObject for K where
    K: Resource<DynamicType = (), Scope = NamespaceResourceScope>
        + Clone
        + Debug
        + Serialize
        + DeserializeOwned
        + Send
        + Sync
        + 'static
{
}

/// The slice of the apiserver the reconciler depends on.
///
/// `update` is optimistic: the object carries the `resourceVersion` it was read at and the
/// write is rejected with a 409 Conflict if the stored object moved on since.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn get<K: ClusterObject>(&self, namespace: &str, name: &str) -> Result<K, kube::Error>;

    async fn create<K: ClusterObject>(&self, obj: &K) -> Result<K, kube::Error>;

    async fn update<K: ClusterObject>(&self, obj: &K) -> Result<K, kube::Error>;

    /// Merge-patches the status subresource.
    async fn patch_status<K: ClusterObject, S: Serialize + Send + Sync>(&self, namespace: &str, name: &str, status: &S) -> Result<K, kube::Error>;
}

#[derive(Clone)]
pub struct KubeObjectStore {
    client: Client,
}

impl KubeObjectStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn api<K: ClusterObject>(&self, namespace: &str) -> Api<K> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

fn object_key<K: ClusterObject>(obj: &K) -> (String, String) {
    (obj.namespace().unwrap_or_default(), obj.name_any())
}

#[async_trait]
impl ObjectStore for KubeObjectStore {
    async fn get<K: ClusterObject>(&self, namespace: &str, name: &str) -> Result<K, kube::Error> {
        self.api::<K>(namespace).get(name).await
    }

    async fn create<K: ClusterObject>(&self, obj: &K) -> Result<K, kube::Error> {
        let (namespace, _) = object_key(obj);
        self.api::<K>(&namespace).create(&PostParams::default(), obj).await
    }

    async fn update<K: ClusterObject>(&self, obj: &K) -> Result<K, kube::Error> {
        let (namespace, name) = object_key(obj);
        self.api::<K>(&namespace).replace(&name, &PostParams::default(), obj).await
    }

    async fn patch_status<K: ClusterObject, S: Serialize + Send + Sync>(&self, namespace: &str, name: &str, status: &S) -> Result<K, kube::Error> {
        let update_status = json!({
            "status": status
        });
        self.api::<K>(namespace)
            .patch_status(name, &PatchParams::default(), &Patch::Merge(&update_status))
            .await
    }
}
