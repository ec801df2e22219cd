use std::future::Future;
use std::time::Duration;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};
use kube::ResourceExt;
use rand::Rng;

use crate::model::error::{is_not_found, Error};
use crate::service::cluster_svc::{ClusterObject, ObjectStore};

/// Wait schedule between conflicting attempts. `DEFAULT` matches the apiserver client default
/// retry (5 attempts, 10ms apart, 10% jitter).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Backoff {
    pub steps: u32,
    pub duration: Duration,
    pub factor: f64,
    pub jitter: f64,
}

impl Backoff {
    pub const DEFAULT: Backoff = Backoff {
        steps: 5,
        duration: Duration::from_millis(10),
        factor: 1.0,
        jitter: 0.1,
    };

    pub fn with_steps(self, steps: u32) -> Self {
        Self { steps: steps.max(1), ..self }
    }

    fn delay(&self, attempt: u32) -> Duration {
        let base = self.duration.as_secs_f64() * self.factor.powi(attempt as i32);
        let jitter = if self.jitter > 0.0 {
            rand::thread_rng().gen_range(0.0..=self.jitter) * base
        } else {
            0.0
        };
        Duration::from_secs_f64(base + jitter)
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::DEFAULT
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationResult {
    Created,
    Updated,
    Unchanged,
}

/// Runs `attempt` again while it fails with a write conflict, at most `backoff.steps` times.
/// Every attempt must read the object afresh, a retry never reuses a stale copy.
pub async fn retry_on_conflict<T, F, Fut>(backoff: &Backoff, kind: &'static str, name: &str, mut attempt: F) -> Result<T, Error>
    where F: FnMut() -> Fut,
          Fut: Future<Output = Result<T, Error>>,
{
    let steps = backoff.steps.max(1);
    for step in 0..steps {
        match attempt().await {
            Err(err) if err.is_conflict() => {
                log::debug!("Conflict writing {kind} {name} (attempt {}/{steps}) - {err}", step + 1);
                if step + 1 < steps {
                    tokio::time::sleep(backoff.delay(step)).await;
                }
            }
            out => return out,
        }
    }
    Err(Error::ConflictRetriesExhausted {
        kind,
        name: String::from(name),
        attempts: steps,
    })
}

/// Read-modify-write of a single object. A missing object is created from an empty one that
/// only carries its identity; a write is skipped when `mutate` left the object untouched.
pub async fn create_or_update<S, K, F>(store: &S, namespace: &str, name: &str, mutate: &F) -> Result<OperationResult, Error>
    where S: ObjectStore,
          K: ClusterObject + k8s_openapi::Resource + Default,
          F: Fn(&mut K) -> Result<(), Error> + Sync,
{
    let kind = K::KIND;
    let current = match store.get::<K>(namespace, name).await {
        Ok(obj) => Some(obj),
        Err(err) if is_not_found(&err) => None,
        Err(source) => return Err(Error::ReadFailed { kind, name: String::from(name), source }),
    };

    match current {
        None => {
            let mut obj = K::default();
            obj.meta_mut().name = Some(String::from(name));
            obj.meta_mut().namespace = Some(String::from(namespace));
            mutate(&mut obj)?;
            store.create(&obj).await
                .map_err(|source| Error::WriteFailed { kind, name: String::from(name), source })?;
            log::info!("{kind} {namespace}/{name} created");
            Ok(OperationResult::Created)
        }
        Some(existing) => {
            let mut obj = existing.clone();
            mutate(&mut obj)?;
            if same_content(&existing, &obj)? {
                log::debug!("{kind} {namespace}/{name} already up to date");
                return Ok(OperationResult::Unchanged);
            }
            store.update(&obj).await
                .map_err(|source| Error::WriteFailed { kind, name: String::from(name), source })?;
            log::info!("{kind} {namespace}/{name} updated");
            Ok(OperationResult::Updated)
        }
    }
}

/// `create_or_update` wrapped in `retry_on_conflict`.
pub async fn converge<S, K, F>(store: &S, backoff: &Backoff, namespace: &str, name: &str, mutate: F) -> Result<OperationResult, Error>
    where S: ObjectStore,
          K: ClusterObject + k8s_openapi::Resource + Default,
          F: Fn(&mut K) -> Result<(), Error> + Sync,
{
    let mutate = &mutate;
    retry_on_conflict(backoff, K::KIND, name, move || create_or_update::<S, K, F>(store, namespace, name, mutate)).await
}

/// Makes `owner` the controller of the object. Fails when another controller already owns it.
pub fn set_controller_reference(kind: &'static str, meta: &mut ObjectMeta, owner: &OwnerReference) -> Result<(), Error> {
    let refs = meta.owner_references.get_or_insert_with(Vec::new);

    if let Some(other) = refs.iter().find(|oref| oref.controller == Some(true) && oref.uid != owner.uid) {
        return Err(Error::AlreadyOwned {
            kind,
            name: meta.name.clone().unwrap_or_default(),
            owner: format!("{}/{}", other.kind, other.name),
        });
    }

    match refs.iter_mut().find(|oref| oref.uid == owner.uid) {
        Some(existing) => *existing = owner.clone(),
        None => refs.push(owner.clone()),
    }
    Ok(())
}

fn same_content<K: ClusterObject>(a: &K, b: &K) -> Result<bool, Error> {
    let a = serde_json::to_value(a).map_err(|err| Error::InternalError(format!("Cannot serialize {} - {err}", a.name_any())))?;
    let b = serde_json::to_value(b).map_err(|err| Error::InternalError(format!("Cannot serialize object - {err}")))?;
    Ok(a == b)
}
