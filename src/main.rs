//! Foundry Operator - Kubernetes machine lifecycle management

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use futures::StreamExt;
use kube::runtime::watcher::Config as WatcherConfig;
use kube::runtime::Controller;
use kube::{Api, Client, CustomResourceExt};
use tokio_stream::wrappers::ReceiverStream;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use foundry::controller::{error_policy, reconcile, Context};
use foundry::crd::{Cluster, Machine};

/// Foundry - CRD-driven Kubernetes operator for machine lifecycle management
#[derive(Parser, Debug)]
#[command(name = "foundry", version, about, long_about = None)]
struct Cli {
    /// Generate CRD manifests and exit
    #[arg(long)]
    crd: bool,

    /// Seconds to wait before re-checking a missing or not-ready provider
    /// object
    #[arg(
        long,
        env = "FOUNDRY_EXTERNAL_READY_WAIT_SECS",
        default_value_t = foundry::DEFAULT_EXTERNAL_READY_WAIT_SECS
    )]
    external_ready_wait_secs: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Install crypto provider - FIPS-validated aws-lc-rs
    // This MUST succeed for the application to operate securely.
    if let Err(e) = rustls::crypto::aws_lc_rs::default_provider().install_default() {
        eprintln!(
            "CRITICAL: Failed to install crypto provider: {:?}. \
             The operator cannot talk to the API server without a working \
             TLS implementation.",
            e
        );
        std::process::exit(1);
    }

    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    if cli.crd {
        // Generate CRD YAML for both resources
        let machine_crd = serde_yaml::to_string(&Machine::crd())
            .map_err(|e| anyhow::anyhow!("Failed to serialize Machine CRD: {}", e))?;
        let cluster_crd = serde_yaml::to_string(&Cluster::crd())
            .map_err(|e| anyhow::anyhow!("Failed to serialize Cluster CRD: {}", e))?;
        println!("{machine_crd}---\n{cluster_crd}");
        return Ok(());
    }

    run_controller(Duration::from_secs(cli.external_ready_wait_secs)).await
}

/// Ensure all Foundry CRDs are installed
///
/// The operator installs its own CRDs on startup using server-side apply.
/// This ensures the CRD versions always match the operator version.
async fn ensure_crds_installed(client: &Client) -> anyhow::Result<()> {
    use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
    use kube::api::{Patch, PatchParams};

    let crds: Api<CustomResourceDefinition> = Api::all(client.clone());
    let params = PatchParams::apply(foundry::FIELD_MANAGER).force();

    tracing::info!("Installing Machine CRD...");
    crds.patch("machines.foundry.dev", &params, &Patch::Apply(&Machine::crd()))
        .await
        .map_err(|e| anyhow::anyhow!("Failed to install Machine CRD: {}", e))?;

    tracing::info!("Installing Cluster CRD...");
    crds.patch("clusters.foundry.dev", &params, &Patch::Apply(&Cluster::crd()))
        .await
        .map_err(|e| anyhow::anyhow!("Failed to install Cluster CRD: {}", e))?;

    tracing::info!("All Foundry CRDs installed/updated");
    Ok(())
}

/// Run in controller mode - manages machines
///
/// External provider objects are watched lazily: the first Machine that
/// references a kind registers a watch for it, and events on watched
/// objects feed back into the controller through the trigger channel.
async fn run_controller(external_ready_wait: Duration) -> anyhow::Result<()> {
    tracing::info!("Foundry controller starting...");

    let client = Client::try_default()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to create Kubernetes client: {}", e))?;

    // Operator installs its own CRDs on startup
    ensure_crds_installed(&client).await?;

    // Channel carrying re-enqueue triggers from external-object watchers
    let (trigger_tx, trigger_rx) = tokio::sync::mpsc::channel(128);

    let ctx = Arc::new(
        Context::builder(client.clone())
            .trigger(trigger_tx)
            .external_ready_wait(external_ready_wait)
            .build(),
    );

    let machines: Api<Machine> = Api::all(client);

    tracing::info!("Starting Machine controller...");
    Controller::new(machines, WatcherConfig::default())
        .reconcile_on(ReceiverStream::new(trigger_rx))
        .shutdown_on_signal()
        .run(reconcile, error_policy, ctx)
        .for_each(|result| async move {
            match result {
                Ok((machine, action)) => {
                    tracing::debug!(machine = %machine.name, ?action, "Machine reconciliation completed");
                }
                Err(e) => {
                    tracing::error!(error = ?e, "Machine reconciliation error");
                }
            }
        })
        .await;

    tracing::info!("Foundry controller shutting down");
    Ok(())
}
