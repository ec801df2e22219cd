use std::collections::{BTreeMap, BTreeSet};
use std::sync::Mutex;

use async_trait::async_trait;
use json_server_operator::service::cluster_svc::{ClusterObject, ObjectStore};
use kube::error::ErrorResponse;
use kube::ResourceExt;
use serde::Serialize;
use serde_json::Value;

type ObjectKey = (String, String, String);

/// In-memory apiserver: resource versions, uids, optimistic concurrency on update and a
/// stand-in deployment controller publishing `status.replicas`.
#[derive(Default)]
pub struct InMemoryStore {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    objects: BTreeMap<ObjectKey, Value>,
    last_version: u64,
    writes: BTreeMap<String, usize>,
    status_writes: usize,
    concurrent_writers: BTreeMap<String, u32>,
    failing_reads: BTreeSet<String>,
    failing_status: bool,
}

pub fn api_error(code: u16, reason: &str, message: &str) -> kube::Error {
    kube::Error::Api(ErrorResponse {
        status: String::from("Failure"),
        message: String::from(message),
        reason: String::from(reason),
        code,
    })
}

fn kind_of<K: ClusterObject>() -> String {
    K::kind(&()).to_string()
}

fn key_of(kind: &str, value: &Value) -> ObjectKey {
    let meta = &value["metadata"];
    (
        String::from(kind),
        meta["namespace"].as_str().unwrap_or_default().to_string(),
        meta["name"].as_str().unwrap_or_default().to_string(),
    )
}

fn merge(target: &mut Value, patch: &Value) {
    match (target, patch) {
        (Value::Object(target), Value::Object(patch)) => {
            for (k, v) in patch {
                if v.is_null() {
                    target.remove(k);
                } else {
                    merge(target.entry(k.clone()).or_insert(Value::Null), v);
                }
            }
        }
        (target, patch) => *target = patch.clone(),
    }
}

impl Inner {
    fn next_version(&mut self) -> String {
        self.last_version += 1;
        self.last_version.to_string()
    }

    /// What the deployment controller would eventually report.
    fn observe(kind: &str, value: &mut Value) {
        if kind == "Deployment" {
            let replicas = value["spec"]["replicas"].as_i64().unwrap_or(1);
            value["status"] = serde_json::json!({ "replicas": replicas });
        }
    }

    fn store(&mut self, kind: &str, mut value: Value) -> Value {
        let version = self.next_version();
        value["metadata"]["resourceVersion"] = Value::String(version.clone());
        if value["metadata"]["uid"].is_null() {
            value["metadata"]["uid"] = Value::String(format!("uid-{version}"));
        }
        Self::observe(kind, &mut value);
        self.objects.insert(key_of(kind, &value), value.clone());
        value
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds an object as if a client had created it.
    pub fn insert<K: ClusterObject>(&self, obj: &K) -> K {
        let value = serde_json::to_value(obj).expect("serializable object");
        let stored = self.inner.lock().unwrap().store(&kind_of::<K>(), value);
        serde_json::from_value(stored).expect("deserializable object")
    }

    pub fn object<K: ClusterObject>(&self, namespace: &str, name: &str) -> Option<K> {
        let inner = self.inner.lock().unwrap();
        inner.objects
            .get(&(kind_of::<K>(), String::from(namespace), String::from(name)))
            .map(|value| serde_json::from_value(value.clone()).expect("deserializable object"))
    }

    /// Overwrites an object out of band, bumping its resource version.
    pub fn edit<K: ClusterObject, F: FnOnce(&mut K)>(&self, namespace: &str, name: &str, edit: F) {
        let mut obj = self.object::<K>(namespace, name).expect("object to edit");
        edit(&mut obj);
        self.insert(&obj);
    }

    pub fn count(&self, kind: &str) -> usize {
        self.inner.lock().unwrap().objects.keys().filter(|(k, _, _)| k == kind).count()
    }

    pub fn writes(&self, kind: &str) -> usize {
        self.inner.lock().unwrap().writes.get(kind).copied().unwrap_or(0)
    }

    pub fn status_writes(&self) -> usize {
        self.inner.lock().unwrap().status_writes
    }

    /// The next `times` updates of `kind` race with another writer and lose.
    pub fn race_updates(&self, kind: &str, times: u32) {
        self.inner.lock().unwrap().concurrent_writers.insert(String::from(kind), times);
    }

    pub fn fail_reads(&self, kind: &str, failing: bool) {
        let mut inner = self.inner.lock().unwrap();
        if failing {
            inner.failing_reads.insert(String::from(kind));
        } else {
            inner.failing_reads.remove(kind);
        }
    }

    pub fn fail_status_updates(&self, failing: bool) {
        self.inner.lock().unwrap().failing_status = failing;
    }
}

#[async_trait]
impl ObjectStore for InMemoryStore {
    async fn get<K: ClusterObject>(&self, namespace: &str, name: &str) -> Result<K, kube::Error> {
        let kind = kind_of::<K>();
        let inner = self.inner.lock().unwrap();
        if inner.failing_reads.contains(&kind) {
            return Err(api_error(500, "InternalError", "etcdserver: request timed out"));
        }
        let value = inner.objects
            .get(&(kind.clone(), String::from(namespace), String::from(name)))
            .cloned()
            .ok_or_else(|| api_error(404, "NotFound", &format!("{kind} \"{name}\" not found")))?;
        serde_json::from_value(value).map_err(kube::Error::SerdeError)
    }

    async fn create<K: ClusterObject>(&self, obj: &K) -> Result<K, kube::Error> {
        let kind = kind_of::<K>();
        let value = serde_json::to_value(obj).map_err(kube::Error::SerdeError)?;
        let mut inner = self.inner.lock().unwrap();
        if inner.objects.contains_key(&key_of(&kind, &value)) {
            return Err(api_error(409, "AlreadyExists", &format!("{kind} \"{}\" already exists", obj.name_any())));
        }
        *inner.writes.entry(kind.clone()).or_default() += 1;
        let stored = inner.store(&kind, value);
        serde_json::from_value(stored).map_err(kube::Error::SerdeError)
    }

    async fn update<K: ClusterObject>(&self, obj: &K) -> Result<K, kube::Error> {
        let kind = kind_of::<K>();
        let value = serde_json::to_value(obj).map_err(kube::Error::SerdeError)?;
        let key = key_of(&kind, &value);
        let mut inner = self.inner.lock().unwrap();

        let racing = inner.concurrent_writers.get(&kind).copied().unwrap_or(0);
        if racing > 0 {
            inner.concurrent_writers.insert(kind.clone(), racing - 1);
            if let Some(mut current) = inner.objects.get(&key).cloned() {
                current["metadata"]["annotations"]["touched-by"] = Value::String(String::from("someone-else"));
                inner.store(&kind, current);
            }
        }

        let current_version = inner.objects
            .get(&key)
            .map(|current| current["metadata"]["resourceVersion"].clone())
            .ok_or_else(|| api_error(404, "NotFound", &format!("{kind} \"{}\" not found", obj.name_any())))?;
        if current_version != value["metadata"]["resourceVersion"] {
            return Err(api_error(409, "Conflict", "the object has been modified; please apply your changes to the latest version and try again"));
        }

        *inner.writes.entry(kind.clone()).or_default() += 1;
        let stored = inner.store(&kind, value);
        serde_json::from_value(stored).map_err(kube::Error::SerdeError)
    }

    async fn patch_status<K: ClusterObject, S: Serialize + Send + Sync>(&self, namespace: &str, name: &str, status: &S) -> Result<K, kube::Error> {
        let kind = kind_of::<K>();
        let patch = serde_json::to_value(status).map_err(kube::Error::SerdeError)?;
        let mut inner = self.inner.lock().unwrap();
        if inner.failing_status {
            return Err(api_error(500, "InternalError", "status update refused"));
        }
        let mut current = inner.objects
            .get(&(kind.clone(), String::from(namespace), String::from(name)))
            .cloned()
            .ok_or_else(|| api_error(404, "NotFound", &format!("{kind} \"{name}\" not found")))?;

        merge(current.as_object_mut().map(|obj| obj.entry("status").or_insert(Value::Null)).expect("object"), &patch);
        inner.status_writes += 1;
        let stored = inner.store(&kind, current);
        serde_json::from_value(stored).map_err(kube::Error::SerdeError)
    }
}
