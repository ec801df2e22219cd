pub mod core;
pub mod http;
pub mod model;
pub mod policy;
pub mod service;

pub use model::spec::{JsonServer, JsonServerSpec, JsonServerState, JsonServerStatus};
