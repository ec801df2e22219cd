use serde_json::{Map, Value};
use thiserror::Error;

use crate::model::spec::JsonServerSpec;

pub static NAME_PREFIX: &str = "app-";

pub static INVALID_JSON_CONFIG_MESSAGE: &str = "Error: spec.jsonConfig is not a valid json object";

/// Structural rules shared by the admission webhook and the reconciler.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("name must start with app-")]
    InvalidName,
    #[error("{}", INVALID_JSON_CONFIG_MESSAGE)]
    InvalidJsonConfig,
}

pub fn validate_name(name: &str) -> Result<(), ValidationError> {
    if name.starts_with(NAME_PREFIX) {
        Ok(())
    } else {
        Err(ValidationError::InvalidName)
    }
}

/// Accepts only text that parses as a JSON object; arrays, scalars and `null` are rejected.
/// Documents nested deeper than the parser's 128 levels are rejected as well.
pub fn validate_json_config(raw: &str) -> Result<(), ValidationError> {
    serde_json::from_str::<Map<String, Value>>(raw)
        .map(|_| ())
        .map_err(|err| {
            log::debug!("jsonConfig rejected - {err}");
            ValidationError::InvalidJsonConfig
        })
}

pub fn validate_spec(spec: &JsonServerSpec) -> Result<(), ValidationError> {
    validate_json_config(&spec.json_config)
}
