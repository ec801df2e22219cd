use kube::ResourceExt;

use crate::model::spec::{JsonServer, DEFAULT_REPLICAS};
use crate::policy::validation::{validate_name, validate_spec, ValidationError};

/// Fills unset fields before the object is persisted. Never fails.
pub fn default(server: &mut JsonServer) {
    log::info!("default {}", server.name_any());
    if server.spec.replicas.is_none() {
        server.spec.replicas = Some(DEFAULT_REPLICAS);
    }
}

pub fn validate_create(server: &JsonServer) -> Result<(), ValidationError> {
    log::info!("validate create {}", server.name_any());
    validate(server)
}

/// Same checks as on create, the previous object does not relax or tighten them.
pub fn validate_update(server: &JsonServer, _old: &JsonServer) -> Result<(), ValidationError> {
    log::info!("validate update {}", server.name_any());
    validate(server)
}

pub fn validate_delete(server: &JsonServer) -> Result<(), ValidationError> {
    log::info!("validate delete {}", server.name_any());
    Ok(())
}

fn validate(server: &JsonServer) -> Result<(), ValidationError> {
    validate_name(&server.name_any())?;
    validate_spec(&server.spec)
}
