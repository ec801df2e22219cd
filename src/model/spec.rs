use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

pub static DEFAULT_IMAGE: &str = "backplane/json-server";
pub const DEFAULT_REPLICAS: i32 = 1;

/// Spec object for JsonServer
#[derive(CustomResource, Deserialize, Serialize, Clone, Debug, PartialEq, Eq, JsonSchema)]
#[kube(group = "example.com", version = "v1", kind = "JsonServer", namespaced)]
#[kube(status = "JsonServerStatus")]
#[kube(scale = r#"{"specReplicasPath":".spec.replicas", "statusReplicasPath":".status.replicas", "labelSelectorPath":".status.selector"}"#)]
#[kube(printcolumn = r#"{"name":"State", "type":"string", "jsonPath":".status.state"}"#)]
#[kube(printcolumn = r#"{"name":"Replicas", "type":"integer", "jsonPath":".status.replicas"}"#)]
#[serde(rename_all = "camelCase")]
pub struct JsonServerSpec {
    /// Unset is distinct from zero: the admission webhook fills it with 1.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(range(min = 0))]
    pub replicas: Option<i32>,
    /// Served verbatim as `db.json`, must be a JSON object.
    pub json_config: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

impl JsonServerSpec {
    pub fn effective_replicas(&self) -> i32 {
        self.replicas.unwrap_or(DEFAULT_REPLICAS)
    }

    pub fn effective_image(&self) -> &str {
        match self.image.as_deref() {
            Some(image) if !image.is_empty() => image,
            _ => DEFAULT_IMAGE,
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq, JsonSchema)]
pub enum JsonServerState {
    Synced,
    Error,
}

/// Status object for JsonServer
///
/// `replicas` and `selector` back the scale subresource and are only a read model of the
/// owned deployment.
#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct JsonServerStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<JsonServerState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replicas: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selector: Option<String>,
}

impl JsonServerStatus {
    pub fn error(message: &str) -> Self {
        Self {
            state: Some(JsonServerState::Error),
            message: Some(String::from(message)),
            ..Default::default()
        }
    }

    pub fn synced(message: &str, replicas: i32, selector: String) -> Self {
        Self {
            state: Some(JsonServerState::Synced),
            message: Some(String::from(message)),
            replicas: Some(replicas),
            selector: Some(selector),
        }
    }

    /// True when every field set on `self` already has the same value in `current`.
    pub fn is_applied_on(&self, current: Option<&JsonServerStatus>) -> bool {
        let Some(current) = current else {
            return false;
        };
        (self.state.is_none() || self.state == current.state)
            && (self.message.is_none() || self.message == current.message)
            && (self.replicas.is_none() || self.replicas == current.replicas)
            && (self.selector.is_none() || self.selector == current.selector)
    }
}
