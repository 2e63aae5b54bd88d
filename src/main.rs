use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use clusterinfo_agent::{
    config::{AgentConfig, DEFAULT_RESYNC_INTERVAL},
    controller::{self, conditions, KubeClusterInfoStore, KubeClusterReader},
    crd::ManagedClusterInfo,
    leader, Error,
};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Api, Client, ResourceExt};
use tracing::{info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the agent
    Run(RunArgs),
    /// Show version and build information
    Version,
    /// Show the ManagedClusterInfo objects and whether they are synced
    Info(InfoArgs),
}

#[derive(Parser, Debug)]
struct RunArgs {
    /// Name of the managed cluster this agent reports for
    #[arg(long, env = "CLUSTER_NAME")]
    cluster_name: String,

    /// Namespace of the ManagedClusterInfo to reconcile (default: all)
    #[arg(long, env = "CLUSTER_INFO_NAMESPACE")]
    namespace: Option<String>,

    /// Static agent endpoint, host:port
    #[arg(long, env = "AGENT_ADDRESS")]
    agent_address: Option<String>,

    /// Load balancer service exposing the agent, namespace/name
    #[arg(long, env = "AGENT_SERVICE")]
    agent_service: Option<String>,

    /// Ingress exposing the agent, namespace/name
    #[arg(long, env = "AGENT_INGRESS")]
    agent_ingress: Option<String>,

    /// OpenShift route exposing the agent, namespace/name
    #[arg(long, env = "AGENT_ROUTE")]
    agent_route: Option<String>,

    /// Kubeconfig of the managed cluster; the default client is used when unset
    #[arg(long, env = "MANAGED_KUBECONFIG")]
    managed_kubeconfig: Option<PathBuf>,

    /// Seconds between periodic re-reconciliations
    #[arg(long, env = "RESYNC_INTERVAL_SECS", default_value_t = DEFAULT_RESYNC_INTERVAL.as_secs())]
    resync_interval_secs: u64,

    /// Only reconcile while holding the leader lease
    #[arg(long, env = "LEADER_ELECT")]
    leader_elect: bool,

    /// Namespace of the leader lease
    #[arg(long, env = "POD_NAMESPACE", default_value = "default")]
    leader_election_namespace: String,

    /// Emit logs as JSON
    #[arg(long, env = "LOG_JSON")]
    log_json: bool,
}

#[derive(Parser, Debug)]
struct InfoArgs {
    /// Namespace to list (default: all)
    #[arg(long, env = "CLUSTER_INFO_NAMESPACE")]
    namespace: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    let args = Args::parse();

    match args.command {
        Commands::Version => {
            println!("clusterinfo-agent v{}", env!("CARGO_PKG_VERSION"));
            println!("Build Date: {}", env!("BUILD_DATE"));
            Ok(())
        }
        Commands::Info(info_args) => run_info(info_args).await,
        Commands::Run(run_args) => run_agent(run_args).await,
    }
}

fn init_tracing(json: bool) {
    let env_filter = EnvFilter::builder()
        .with_default_directive(Level::INFO.into())
        .from_env_lossy();
    let registry = tracing_subscriber::registry().with(env_filter);

    if json {
        registry.with(fmt::layer().json().with_target(true)).init();
    } else {
        registry.with(fmt::layer().with_target(true)).init();
    }
}

async fn run_info(args: InfoArgs) -> Result<(), Error> {
    let client = Client::try_default().await.map_err(Error::KubeError)?;

    let api: Api<ManagedClusterInfo> = match args.namespace.as_deref() {
        Some(ns) => Api::namespaced(client, ns),
        None => Api::all(client),
    };
    let infos = api
        .list(&Default::default())
        .await
        .map_err(Error::KubeError)?;

    println!("ManagedClusterInfo objects: {}", infos.items.len());
    for mci in &infos.items {
        let status = mci.status.clone().unwrap_or_default();
        println!(
            "  {}/{}  version={}  synced={}",
            mci.namespace().unwrap_or_default(),
            mci.name_any(),
            status.kubernetes_version.as_deref().unwrap_or("-"),
            conditions::synced_status(&status.conditions)
        );
    }
    Ok(())
}

/// Client for the managed cluster
async fn managed_client(kubeconfig: Option<&Path>, hub: &Client) -> Result<Client, Error> {
    let Some(path) = kubeconfig else {
        return Ok(hub.clone());
    };

    let kubeconfig = Kubeconfig::read_from(path)
        .map_err(|e| Error::ConfigError(format!("reading {}: {}", path.display(), e)))?;
    let config = kube::Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
        .await
        .map_err(|e| Error::ConfigError(format!("loading {}: {}", path.display(), e)))?;
    Client::try_from(config).map_err(Error::KubeError)
}

async fn run_agent(args: RunArgs) -> Result<(), Error> {
    init_tracing(args.log_json);

    info!("Starting clusterinfo-agent v{}", env!("CARGO_PKG_VERSION"));

    let config = AgentConfig::from_parts(
        &args.cluster_name,
        args.agent_address.as_deref(),
        args.agent_service.as_deref(),
        args.agent_ingress.as_deref(),
        args.agent_route.as_deref(),
        args.resync_interval_secs,
    )?;

    let hub = Client::try_default().await.map_err(Error::KubeError)?;
    let managed = managed_client(args.managed_kubeconfig.as_deref(), &hub).await?;

    info!("Connected to Kubernetes cluster");

    let is_leader = Arc::new(AtomicBool::new(!args.leader_elect));
    if args.leader_elect {
        let identity = leader::holder_identity();
        info!("Leader election using holder ID: {}", identity);

        let lease_client = hub.clone();
        let lease_ns = args.leader_election_namespace.clone();
        let is_leader_bg = Arc::clone(&is_leader);
        tokio::spawn(async move {
            leader::run_leader_election(lease_client, &lease_ns, &identity, is_leader_bg).await;
        });
    }

    let state = Arc::new(
        controller::ControllerState::new(
            &config,
            Arc::new(KubeClusterInfoStore::new(hub.clone())),
            Arc::new(KubeClusterReader::new(managed)),
        )
        .with_leader_flag(is_leader),
    );

    controller::run_controller(hub, args.namespace.as_deref(), &config.cluster_name, state).await
}
