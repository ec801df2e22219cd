use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

use crate::service::retry::Backoff;

pub fn compose_config<'de, CFG: Deserialize<'de>>(external_path: &str, env_prefix: &str) -> Result<CFG, ConfigError> {
    Config::builder()

        // Add in a local configuration file
        .add_source(File::with_name(external_path).required(false))

        // Add in settings from the environment (e.g. JSO_WEBHOOK_ADDRESS)
        .add_source(Environment::with_prefix(env_prefix))

        .build()?
        .try_deserialize()
}

#[derive(Deserialize, Debug, Clone)]
pub struct OperatorConfig {
    #[serde(default = "default_webhook_address")]
    pub webhook_address: SocketAddr,
    #[serde(default = "default_metrics_address")]
    pub metrics_address: SocketAddr,
    #[serde(default = "default_webhook_enabled")]
    pub webhook_enabled: bool,
    #[serde(default = "default_tls_cert_path")]
    pub tls_cert_path: PathBuf,
    #[serde(default = "default_tls_key_path")]
    pub tls_key_path: PathBuf,
    /// Watch a single namespace instead of the whole cluster.
    #[serde(default)]
    pub watch_namespace: Option<String>,
    #[serde(default = "default_error_requeue_secs")]
    pub error_requeue_secs: u64,
    #[serde(default)]
    pub resync_interval_secs: Option<u64>,
    #[serde(default = "default_conflict_retry_steps")]
    pub conflict_retry_steps: u32,
}

impl OperatorConfig {
    pub fn backoff(&self) -> Backoff {
        Backoff::DEFAULT.with_steps(self.conflict_retry_steps)
    }

    pub fn error_requeue(&self) -> Duration {
        Duration::from_secs(self.error_requeue_secs)
    }

    pub fn resync_interval(&self) -> Option<Duration> {
        self.resync_interval_secs
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }
}

fn default_webhook_address() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 9443))
}

fn default_metrics_address() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8080))
}

fn default_webhook_enabled() -> bool {
    true
}

fn default_tls_cert_path() -> PathBuf {
    PathBuf::from("/tmp/k8s-webhook-server/serving-certs/tls.crt")
}

fn default_tls_key_path() -> PathBuf {
    PathBuf::from("/tmp/k8s-webhook-server/serving-certs/tls.key")
}

fn default_error_requeue_secs() -> u64 {
    60
}

fn default_conflict_retry_steps() -> u32 {
    Backoff::DEFAULT.steps
}
