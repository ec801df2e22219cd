use std::sync::Arc;

use anyhow::Context;
use axum_server::tls_rustls::RustlsConfig;
use clap::{Parser, Subcommand};
use futures::{StreamExt, TryFutureExt};
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{ConfigMap, Service};
use kube::runtime::controller::Controller;
use kube::runtime::watcher::Config;
use kube::{Api, Client, CustomResourceExt};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};

use json_server_operator::core::config::{compose_config, OperatorConfig};
use json_server_operator::http;
use json_server_operator::model::context::ContextData;
use json_server_operator::model::spec::JsonServer;
use json_server_operator::policy::error::error_policy;
use json_server_operator::policy::reconciliation::{reconcile, RECONCILE_DURATION_METRIC_NAME};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Configuration file, without extension
    #[arg(short, long, default_value = "json-server-operator")]
    config: String,
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the controller, the admission webhook and the management endpoints
    Run,
    /// Print the JsonServer CustomResourceDefinition as yaml
    Crd,
}

fn setup_metrics_recorder() -> anyhow::Result<PrometheusHandle> {
    const RECONCILE_SECONDS: &[f64] = &[
        0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
    ];

    let handle = PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Full(String::from(RECONCILE_DURATION_METRIC_NAME)),
            RECONCILE_SECONDS,
        )?
        .install_recorder()?;
    Ok(handle)
}

async fn run_controller(client: Client, app_config: &OperatorConfig) {
    let context = Arc::new(ContextData {
        client: client.clone(),
        backoff: app_config.backoff(),
        error_requeue: app_config.error_requeue(),
        resync_interval: app_config.resync_interval(),
    });

    let (servers, config_maps, deployments, services) = match &app_config.watch_namespace {
        Some(namespace) => (
            Api::<JsonServer>::namespaced(client.clone(), namespace),
            Api::<ConfigMap>::namespaced(client.clone(), namespace),
            Api::<Deployment>::namespaced(client.clone(), namespace),
            Api::<Service>::namespaced(client.clone(), namespace),
        ),
        None => (
            Api::<JsonServer>::all(client.clone()),
            Api::<ConfigMap>::all(client.clone()),
            Api::<Deployment>::all(client.clone()),
            Api::<Service>::all(client.clone()),
        ),
    };

    Controller::new(servers, Config::default())
        .owns(config_maps, Config::default())
        .owns(deployments, Config::default())
        .owns(services, Config::default())
        .shutdown_on_signal()
        .run(reconcile, error_policy, context)
        .for_each(|reconciliation_result| async move {
            match reconciliation_result {
                Ok((server, _action)) => {
                    log::debug!("Reconciliation successful. Resource: {server:?}");
                }
                Err(reconciliation_err) => {
                    log::warn!("Reconciliation error: {reconciliation_err:?}")
                }
            }
        })
        .await;
}

async fn run_webhook(app_config: &OperatorConfig) -> anyhow::Result<()> {
    if !app_config.webhook_enabled {
        log::info!("Admission webhook disabled");
        return futures::future::pending().await;
    }
    let tls = RustlsConfig::from_pem_file(&app_config.tls_cert_path, &app_config.tls_key_path)
        .await
        .with_context(|| format!("Error loading webhook certificate {}", app_config.tls_cert_path.display()))?;

    log::info!("Admission webhook listening on {}", app_config.webhook_address);
    axum_server::bind_rustls(app_config.webhook_address, tls)
        .serve(http::webhook_router().into_make_service())
        .await
        .context("Admission webhook server failed")
}

async fn run(app_config: OperatorConfig) -> anyhow::Result<()> {
    let client = Client::try_default().await
        .context("Error building kubernetes client")?;
    let recorder_handle = setup_metrics_recorder()
        .context("Error installing metrics recorder")?;

    let management = axum::Server::bind(&app_config.metrics_address)
        .serve(http::management_router(recorder_handle).into_make_service())
        .map_err(anyhow::Error::from);

    log::info!("Starting JsonServer operator");
    tokio::select! {
        _ = run_controller(client, &app_config) => {
            log::info!("Controller terminated");
            Ok(())
        }
        out = run_webhook(&app_config) => out,
        out = management => out,
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();

    match args.command.unwrap_or(Command::Run) {
        Command::Crd => {
            let crd = serde_yaml::to_string(&JsonServer::crd())
                .context("Error serializing CRD")?;
            print!("{crd}");
            Ok(())
        }
        Command::Run => {
            let app_config: OperatorConfig = compose_config(&args.config, "JSO")
                .context("Error loading configuration")?;
            run(app_config).await
        }
    }
}
