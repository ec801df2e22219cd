use std::sync::Arc;

use kube::runtime::controller::Action;
use kube::ResourceExt;

use crate::model::context::ContextData;
use crate::model::error::Error;
use crate::model::spec::JsonServer;

/// an error handler that will be called when the reconciler fails with access to both the
/// object that caused the failure and the actual error
pub fn error_policy(server: Arc<JsonServer>, error: &Error, ctx: Arc<ContextData>) -> Action {
    log::warn!(
        "Reconciliation of {}/{} failed, retrying in {}s - {error}",
        server.namespace().unwrap_or_default(),
        server.name_any(),
        ctx.error_requeue.as_secs(),
    );
    Action::requeue(ctx.error_requeue)
}
