use std::time::Duration;

use kube::Client;

use crate::service::retry::Backoff;

pub struct ContextData {
    /// Kubernetes client to make Kubernetes API requests with. Required for K8S resource management.
    pub client: Client,
    /// Retry policy for conflicting child writes.
    pub backoff: Backoff,
    pub error_requeue: Duration,
    pub resync_interval: Option<Duration>,
}
