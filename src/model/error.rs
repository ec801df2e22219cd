use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Failed to read {kind} {name}: {source}")]
    ReadFailed {
        kind: &'static str,
        name: String,
        #[source]
        source: kube::Error,
    },
    #[error("Failed to write {kind} {name}: {source}")]
    WriteFailed {
        kind: &'static str,
        name: String,
        #[source]
        source: kube::Error,
    },
    #[error("Giving up on {kind} {name} after {attempts} conflicting writes")]
    ConflictRetriesExhausted {
        kind: &'static str,
        name: String,
        attempts: u32,
    },
    #[error("Failed to update status of {name}: {source}")]
    StatusUpdateFailed {
        name: String,
        #[source]
        source: kube::Error,
    },
    #[error("{kind} {name} is already controlled by {owner}")]
    AlreadyOwned {
        kind: &'static str,
        name: String,
        owner: String,
    },
    #[error("MissingObjectKey: {0}")]
    MissingObjectKey(&'static str),
    #[error("Internal error - {0}")]
    InternalError(String),
}

impl Error {
    pub fn is_conflict(&self) -> bool {
        match self {
            Error::WriteFailed { source, .. } => is_conflict(source),
            _ => false,
        }
    }

    /// Short label used for metrics.
    pub fn metric_label(&self) -> &'static str {
        match self {
            Error::ReadFailed { .. } => "read_failed",
            Error::WriteFailed { .. } => "write_failed",
            Error::ConflictRetriesExhausted { .. } => "conflict_retries_exhausted",
            Error::StatusUpdateFailed { .. } => "status_update_failed",
            Error::AlreadyOwned { .. } => "already_owned",
            Error::MissingObjectKey(_) => "missing_object_key",
            Error::InternalError(_) => "internal_error",
        }
    }
}

pub fn is_not_found(err: &kube::Error) -> bool {
    matches!(err, kube::Error::Api(response) if response.code == 404)
}

/// Optimistic-concurrency rejection: the object changed since it was read.
pub fn is_conflict(err: &kube::Error) -> bool {
    matches!(err, kube::Error::Api(response) if response.code == 409 && response.reason == "Conflict")
}
