use std::collections::BTreeMap;

use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec};
use k8s_openapi::api::core::v1::{ConfigMap, ConfigMapVolumeSource, Container, ContainerPort, KeyToPath, PodSpec, PodTemplateSpec, Service, ServicePort, Volume, VolumeMount};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta, OwnerReference};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::Resource;
use serde_json::Value;

use crate::model::error::{is_not_found, Error};
use crate::model::selector::{app_labels, format_label_selector};
use crate::model::spec::{JsonServer, JsonServerSpec, JsonServerStatus};
use crate::policy::validation::{validate_spec, INVALID_JSON_CONFIG_MESSAGE};
use crate::service::cluster_svc::ObjectStore;
use crate::service::retry::{converge, set_controller_reference, Backoff, OperationResult};

pub static CONFIG_KEY: &str = "db.json";
pub static CONTAINER_NAME: &str = "json-server";
pub static DATA_VOLUME: &str = "data";
pub static DATA_MOUNT_PATH: &str = "/data";
pub const SERVER_PORT: i32 = 3000;

pub static SYNCED_MESSAGE: &str = "Synced successfully!";
pub static UNEXPECTED_FAILURE_MESSAGE: &str = "Error: json-server unexpected failure";

/// What a single pass ended with.
#[derive(Debug, Clone, PartialEq)]
pub enum ReconcileOutcome {
    /// The JsonServer no longer exists, children are left to the garbage collector.
    Gone,
    /// The configuration was rejected, no child was touched.
    Invalid,
    Synced(JsonServerStatus),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChildrenReport {
    pub config_map: OperationResult,
    pub deployment: OperationResult,
    pub service: OperationResult,
}

/// One reconciliation pass over a JsonServer identified by namespace and name.
///
/// The pass is level triggered: it always starts from a fresh read and can be re-run from
/// the top at any point, including after a partial failure.
pub struct JsonServerReconciler<'a, S> {
    store: &'a S,
    backoff: Backoff,
    namespace: String,
    name: String,
}

impl<'a, S: ObjectStore> JsonServerReconciler<'a, S> {
    pub fn new(store: &'a S, backoff: Backoff, namespace: &str, name: &str) -> Self {
        Self {
            store,
            backoff,
            namespace: String::from(namespace),
            name: String::from(name),
        }
    }

    pub async fn reconcile(&self) -> Result<ReconcileOutcome, Error> {
        let server = match self.store.get::<JsonServer>(&self.namespace, &self.name).await {
            Ok(server) => server,
            Err(err) if is_not_found(&err) => {
                log::debug!("JsonServer {}/{} not found, nothing to do", self.namespace, self.name);
                return Ok(ReconcileOutcome::Gone);
            }
            Err(source) => return Err(Error::ReadFailed { kind: "JsonServer", name: self.name.clone(), source }),
        };

        if let Err(err) = validate_spec(&server.spec) {
            log::warn!("JsonServer {}/{} rejected - {err}", self.namespace, self.name);
            self.publish_status(&server, JsonServerStatus::error(INVALID_JSON_CONFIG_MESSAGE)).await?;
            return Ok(ReconcileOutcome::Invalid);
        }

        match self.converge_all(&server).await {
            Ok(status) => Ok(ReconcileOutcome::Synced(status)),
            Err(err) => {
                log::error!("Failed to reconcile JsonServer {}/{} - {err}", self.namespace, self.name);
                if let Err(status_err) = self.publish_status(&server, JsonServerStatus::error(UNEXPECTED_FAILURE_MESSAGE)).await {
                    log::warn!("Cannot record failure on {}/{} - {status_err}", self.namespace, self.name);
                }
                Err(err)
            }
        }
    }

    async fn converge_all(&self, server: &JsonServer) -> Result<JsonServerStatus, Error> {
        let report = self.converge_children(server).await?;
        log::debug!("Children of {}/{}: {report:?}", self.namespace, self.name);

        let deployment = self.store.get::<Deployment>(&self.namespace, &self.name).await
            .map_err(|source| Error::ReadFailed { kind: "Deployment", name: self.name.clone(), source })?;
        let observed_replicas = deployment.status
            .as_ref()
            .and_then(|status| status.replicas)
            .unwrap_or(0);

        let status = JsonServerStatus::synced(SYNCED_MESSAGE, observed_replicas, self.selector());
        self.publish_status(server, status.clone()).await?;
        Ok(status)
    }

    /// Converges ConfigMap, Deployment and Service in that order, each with conflict retry.
    pub async fn converge_children(&self, server: &JsonServer) -> Result<ChildrenReport, Error> {
        let owner = owner_reference(server)?;
        let spec = &server.spec;

        let config_map = converge(self.store, &self.backoff, &self.namespace, &self.name, |cm: &mut ConfigMap| {
            mutate_config_map(cm, spec, &owner)
        }).await?;

        let desired = desired_deployment_spec(&self.name, spec);
        let deployment = converge(self.store, &self.backoff, &self.namespace, &self.name, |deploy: &mut Deployment| {
            mutate_deployment(deploy, &self.name, &desired, &owner)
        }).await?;

        let service = converge(self.store, &self.backoff, &self.namespace, &self.name, |svc: &mut Service| {
            mutate_service(svc, &self.name, &owner)
        }).await?;

        Ok(ChildrenReport { config_map, deployment, service })
    }

    fn selector(&self) -> String {
        format_label_selector(&LabelSelector {
            match_labels: Some(app_labels(&self.name)),
            match_expressions: None,
        })
    }

    /// Writes `status` unless the stored object already shows it.
    async fn publish_status(&self, server: &JsonServer, status: JsonServerStatus) -> Result<(), Error> {
        if status.is_applied_on(server.status.as_ref()) {
            log::debug!("Status of {}/{} already up to date", self.namespace, self.name);
            return Ok(());
        }
        self.store
            .patch_status::<JsonServer, _>(&self.namespace, &self.name, &status)
            .await
            .map_err(|source| Error::StatusUpdateFailed { name: self.name.clone(), source })?;
        Ok(())
    }
}

fn owner_reference(server: &JsonServer) -> Result<OwnerReference, Error> {
    server.controller_owner_ref(&())
        .ok_or(Error::MissingObjectKey(".metadata.uid"))
}

pub fn mutate_config_map(cm: &mut ConfigMap, spec: &JsonServerSpec, owner: &OwnerReference) -> Result<(), Error> {
    cm.data
        .get_or_insert_with(BTreeMap::new)
        .insert(String::from(CONFIG_KEY), spec.json_config.clone());
    set_controller_reference("ConfigMap", &mut cm.metadata, owner)
}

/// Replaces the whole spec unless the live one already carries every desired field. Fields the
/// apiserver defaults (strategy, revisionHistoryLimit, dnsPolicy, ...) do not count as drift.
pub fn mutate_deployment(deploy: &mut Deployment, name: &str, desired: &DeploymentSpec, owner: &OwnerReference) -> Result<(), Error> {
    deploy.metadata.labels
        .get_or_insert_with(BTreeMap::new)
        .extend(app_labels(name));
    if !spec_covers(deploy.spec.as_ref(), desired)? {
        deploy.spec = Some(desired.clone());
    }
    set_controller_reference("Deployment", &mut deploy.metadata, owner)
}

fn spec_covers(live: Option<&DeploymentSpec>, desired: &DeploymentSpec) -> Result<bool, Error> {
    let Some(live) = live else {
        return Ok(false);
    };
    let to_value = |spec: &DeploymentSpec| serde_json::to_value(spec)
        .map_err(|err| Error::InternalError(format!("Cannot serialize deployment spec - {err}")));
    Ok(covers(&to_value(live)?, &to_value(desired)?))
}

/// Every field of `desired` has the same value in `live`. Lists match element by element.
fn covers(live: &Value, desired: &Value) -> bool {
    match (live, desired) {
        (Value::Object(live), Value::Object(desired)) => desired
            .iter()
            .all(|(key, value)| live.get(key).map_or(false, |live| covers(live, value))),
        (Value::Array(live), Value::Array(desired)) => {
            live.len() == desired.len() && live.iter().zip(desired).all(|(live, desired)| covers(live, desired))
        }
        (live, desired) => live == desired,
    }
}

/// Only selector and ports are managed, any other live field of the service is kept.
pub fn mutate_service(svc: &mut Service, name: &str, owner: &OwnerReference) -> Result<(), Error> {
    let spec = svc.spec.get_or_insert_with(Default::default);
    spec.selector = Some(app_labels(name));
    spec.ports = Some(vec![ServicePort {
        port: SERVER_PORT,
        target_port: Some(IntOrString::Int(SERVER_PORT)),
        protocol: Some(String::from("TCP")),
        ..Default::default()
    }]);
    set_controller_reference("Service", &mut svc.metadata, owner)
}

/// The full desired deployment spec, built only from the JsonServer name and spec.
pub fn desired_deployment_spec(name: &str, spec: &JsonServerSpec) -> DeploymentSpec {
    let labels = app_labels(name);

    DeploymentSpec {
        replicas: Some(spec.effective_replicas()),
        selector: LabelSelector {
            match_expressions: None,
            match_labels: Some(labels.clone()),
        },
        template: PodTemplateSpec {
            metadata: Some(ObjectMeta {
                labels: Some(labels),
                ..ObjectMeta::default()
            }),
            spec: Some(PodSpec {
                containers: vec![Container {
                    name: String::from(CONTAINER_NAME),
                    image: Some(String::from(spec.effective_image())),
                    image_pull_policy: Some(String::from("IfNotPresent")),
                    args: Some(vec![format!("{DATA_MOUNT_PATH}/{CONFIG_KEY}")]),
                    ports: Some(vec![ContainerPort {
                        container_port: SERVER_PORT,
                        ..ContainerPort::default()
                    }]),
                    volume_mounts: Some(vec![VolumeMount {
                        name: String::from(DATA_VOLUME),
                        mount_path: String::from(DATA_MOUNT_PATH),
                        read_only: Some(true),
                        ..VolumeMount::default()
                    }]),
                    ..Container::default()
                }],
                volumes: Some(vec![Volume {
                    name: String::from(DATA_VOLUME),
                    config_map: Some(ConfigMapVolumeSource {
                        name: Some(String::from(name)),
                        items: Some(vec![KeyToPath {
                            key: String::from(CONFIG_KEY),
                            path: String::from(CONFIG_KEY),
                            ..KeyToPath::default()
                        }]),
                        ..ConfigMapVolumeSource::default()
                    }),
                    ..Volume::default()
                }]),
                ..PodSpec::default()
            }),
        },
        ..DeploymentSpec::default()
    }
}
