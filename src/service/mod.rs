pub mod cluster_svc;
pub mod reconciler_svc;
pub mod retry;
