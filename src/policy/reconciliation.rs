use std::sync::Arc;
use std::time::Instant;

use kube::runtime::controller::Action;
use kube::ResourceExt;

use crate::model::context::ContextData;
use crate::model::error::Error;
use crate::model::spec::JsonServer;
use crate::service::cluster_svc::KubeObjectStore;
use crate::service::reconciler_svc::{JsonServerReconciler, ReconcileOutcome};

pub static RECONCILE_TOTAL_METRIC_NAME: &str = "jsonserver_reconcile_total";
pub static RECONCILE_DURATION_METRIC_NAME: &str = "jsonserver_reconcile_duration_seconds";

/// The reconciler that will be called when either the JsonServer or one of its children change
pub async fn reconcile(server: Arc<JsonServer>, context: Arc<ContextData>) -> Result<Action, Error> {
    let namespace = server.namespace()
        .ok_or(Error::MissingObjectKey(".metadata.namespace"))?;
    let name = server.name_any();

    let store = KubeObjectStore::new(context.client.clone());
    let started = Instant::now();
    let result = JsonServerReconciler::new(&store, context.backoff, &namespace, &name)
        .reconcile()
        .await;
    metrics::histogram!(RECONCILE_DURATION_METRIC_NAME).record(started.elapsed().as_secs_f64());

    let outcome = match &result {
        Ok(ReconcileOutcome::Gone) => "gone",
        Ok(ReconcileOutcome::Invalid) => "invalid",
        Ok(ReconcileOutcome::Synced(_)) => "synced",
        Err(err) => err.metric_label(),
    };
    metrics::counter!(RECONCILE_TOTAL_METRIC_NAME, "outcome" => outcome).increment(1);

    match result? {
        ReconcileOutcome::Synced(status) => {
            log::info!("JsonServer {namespace}/{name} synced with {} replicas", status.replicas.unwrap_or_default());
            Ok(next_action(&context))
        }
        ReconcileOutcome::Invalid => Ok(Action::await_change()),
        ReconcileOutcome::Gone => Ok(Action::await_change()),
    }
}

fn next_action(context: &ContextData) -> Action {
    match context.resync_interval {
        Some(interval) => Action::requeue(interval),
        None => Action::await_change(),
    }
}
