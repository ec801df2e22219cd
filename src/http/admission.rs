use axum::Json;
use kube::core::admission::{AdmissionRequest, AdmissionResponse, AdmissionReview, Operation};
use kube::core::DynamicObject;

use crate::model::spec::JsonServer;
use crate::policy::admission;

pub static MUTATE_PATH: &str = "/mutate-example-v1-jsonserver";
pub static VALIDATE_PATH: &str = "/validate-example-v1-jsonserver";

pub static ADMISSION_TOTAL_METRIC_NAME: &str = "jsonserver_admission_total";

pub async fn mutate_handler(
    Json(review): Json<AdmissionReview<DynamicObject>>,
) -> Json<AdmissionReview<DynamicObject>> {
    let req: Result<AdmissionRequest<DynamicObject>, _> = review.try_into();
    let response = match req {
        Ok(req) => mutate(&req),
        Err(err) => {
            log::error!("Invalid mutation review - {err}");
            AdmissionResponse::invalid(err.to_string())
        }
    };
    record(MUTATE_PATH, &response);
    Json(response.into_review())
}

pub async fn validate_handler(
    Json(review): Json<AdmissionReview<DynamicObject>>,
) -> Json<AdmissionReview<DynamicObject>> {
    let req: Result<AdmissionRequest<DynamicObject>, _> = review.try_into();
    let response = match req {
        Ok(req) => validate(&req),
        Err(err) => {
            log::error!("Invalid validation review - {err}");
            AdmissionResponse::invalid(err.to_string())
        }
    };
    record(VALIDATE_PATH, &response);
    Json(response.into_review())
}

/// Applies defaults and answers with the JSON patch leading from the submitted object to the
/// defaulted one.
pub fn mutate(req: &AdmissionRequest<DynamicObject>) -> AdmissionResponse {
    let response = AdmissionResponse::from(req);
    let original = match decode(req.object.as_ref()) {
        Ok(server) => server,
        Err(reason) => return response.deny(reason),
    };

    let mut defaulted = original.clone();
    admission::default(&mut defaulted);

    let patch = match (serde_json::to_value(&original), serde_json::to_value(&defaulted)) {
        (Ok(before), Ok(after)) => json_patch::diff(&before, &after),
        (Err(err), _) | (_, Err(err)) => return response.deny(format!("Cannot serialize JsonServer - {err}")),
    };

    if patch.0.is_empty() {
        return response;
    }
    response.with_patch(patch)
        .unwrap_or_else(|err| AdmissionResponse::from(req).deny(format!("Cannot serialize patch - {err}")))
}

pub fn validate(req: &AdmissionRequest<DynamicObject>) -> AdmissionResponse {
    let response = AdmissionResponse::from(req);

    let outcome = match req.operation {
        Operation::Create => decode(req.object.as_ref())
            .map(|server| (admission::validate_create(&server), "create validated")),
        Operation::Update => decode(req.object.as_ref())
            .and_then(|server| decode(req.old_object.as_ref()).map(|old| (server, old)))
            .map(|(server, old)| (admission::validate_update(&server, &old), "update validated")),
        Operation::Delete => match decode(req.old_object.as_ref()) {
            Ok(old) => Ok((admission::validate_delete(&old), "operation allowed")),
            Err(_) => Ok((Ok(()), "operation allowed")),
        },
        Operation::Connect => Ok((Ok(()), "operation allowed")),
    };

    match outcome {
        Ok((Ok(()), message)) => allowed_with_message(response, message),
        Ok((Err(rejection), _)) => {
            log::info!("Denied {:?} of {} - {rejection}", req.operation, req.name);
            response.deny(rejection.to_string())
        }
        Err(reason) => response.deny(reason),
    }
}

fn allowed_with_message(mut response: AdmissionResponse, message: &str) -> AdmissionResponse {
    response.result.message = String::from(message);
    response
}

fn decode(object: Option<&DynamicObject>) -> Result<JsonServer, String> {
    let object = object.ok_or_else(|| String::from("admission request carries no object"))?;
    serde_json::to_value(object)
        .and_then(serde_json::from_value)
        .map_err(|err| format!("cannot decode JsonServer - {err}"))
}

fn record(path: &'static str, response: &AdmissionResponse) {
    let allowed = if response.allowed { "true" } else { "false" };
    metrics::counter!(ADMISSION_TOTAL_METRIC_NAME, "path" => path, "allowed" => allowed).increment(1);
}
