use std::sync::Arc;

use clap::Parser;
use kube::Client;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use clusterscan_operator::{
    config::Config,
    controllers::ScanController,
    reconcile::Reconciler,
    server::Server,
    store::{ClusterStore, KubeStore},
    Result,
};

#[derive(Debug, Parser)]
#[command(name = "clusterscan-operator", about = "Reconciles ClusterScan resources into Jobs and CronJobs")]
struct Args {
    /// Namespace to watch (overrides WATCH_NAMESPACE)
    #[arg(long)]
    namespace: Option<String>,

    /// Address for the health and metrics server (overrides SERVER_ADDR)
    #[arg(long)]
    addr: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();

    // Load configuration
    let mut config = Config::load()?;
    if let Some(namespace) = args.namespace {
        config.kube.namespace = Some(namespace);
    }
    if let Some(addr) = args.addr {
        config.server.addr = addr;
    }
    info!("Loaded configuration: {:?}", config);

    let client = Client::try_default().await?;
    let store: Arc<dyn ClusterStore> = Arc::new(KubeStore::new(client.clone()));
    let reconciler = Reconciler::new(store, &config.reconcile);
    let controller = Arc::new(ScanController::new(client, reconciler, &config.kube, &config.reconcile));

    let server = Server::new(&config.server);
    tokio::spawn(async move {
        if let Err(e) = server.start().await {
            error!("Health server failed: {}", e);
        }
    });

    // Returns once a shutdown signal has drained in-flight passes
    controller.run().await;

    Ok(())
}
