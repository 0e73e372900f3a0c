//! # Initialization
//!
//! Controller initialization logic including rustls setup, tracing, metrics,
//! server startup, and Kubernetes client setup.

use crate::config::ControllerConfig;
use crate::constants::{DEFAULT_SERVER_POLL_INTERVAL_MS, DEFAULT_SERVER_STARTUP_TIMEOUT_SECS};
use crate::controller::reconciler::{
    KubeStore, ManagedResource, Reconciler, ReconcilerSettings, ResourceKind,
};
use crate::controller::server::{start_server, ServerState};
use crate::crd::{Policy, Role};
use crate::keto::{AcpEngine, KetoClient};
use crate::runtime::leader_election::LeaderElector;
use crate::observability;
use anyhow::{Context, Result};
use kube::api::{Api, ListParams};
use kube::{Client, Resource};
use std::collections::BTreeMap;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

/// Initialization result containing all necessary components for the controller
pub struct InitializationResult {
    /// Kubernetes client
    pub client: Client,
    /// Reconciler context of `Policy` resources
    pub policy_reconciler: Arc<Reconciler<Policy>>,
    /// Reconciler context of `Role` resources
    pub role_reconciler: Arc<Reconciler<Role>>,
    /// Server state for health checks
    pub server_state: Arc<ServerState>,
    /// Maximum number of reconciliations running at the same time, per kind
    pub max_concurrent_reconciliations: u16,
    /// Lease gate, `None` unless leader election is enabled
    pub leader_elector: Option<LeaderElector>,
}

impl std::fmt::Debug for InitializationResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InitializationResult")
            .field(
                "server_ready",
                &self.server_state.is_ready.load(Ordering::Relaxed),
            )
            .field(
                "max_concurrent_reconciliations",
                &self.max_concurrent_reconciliations,
            )
            .field("leader_elector", &self.leader_elector)
            .finish_non_exhaustive()
    }
}

/// Initialize the controller runtime
///
/// This function handles:
/// - rustls crypto provider setup
/// - Tracing subscriber setup
/// - Metrics registration
/// - HTTP server startup
/// - Kubernetes and Keto client creation
/// - Reconciler setup for both kinds
/// - Leader elector setup when enabled
pub async fn initialize(config: &ControllerConfig) -> Result<InitializationResult> {
    // Required for rustls 0.23+ when no default provider is selected via features
    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        return Err(anyhow::anyhow!("Failed to install rustls crypto provider"));
    }

    init_tracing(config.json_logs());

    info!("Starting Keto Maester");
    info!(
        "Build info: datetime={}, git_hash={}",
        env!("BUILD_DATETIME"),
        env!("BUILD_GIT_HASH")
    );

    config.validate()?;
    let settings = ReconcilerSettings {
        sync_period: config.sync_period()?,
        backoff_min_secs: config.backoff_min_secs,
        backoff_max_secs: config.backoff_max_secs,
    };

    observability::metrics::register_metrics()?;

    let server_state = Arc::new(ServerState::default());
    let server_state_clone = Arc::clone(&server_state);
    let server_port = config.metrics_port;
    let server_handle = tokio::spawn(async move {
        if let Err(e) = start_server(server_port, server_state_clone).await {
            error!("HTTP server error: {}", e);
        }
    });
    wait_for_server_ready(&server_state, &server_handle).await?;

    let client = Client::try_default()
        .await
        .context("Failed to create Kubernetes client")?;

    let engine: Arc<dyn AcpEngine> = Arc::new(KetoClient::from_config(config)?);
    info!(
        keto.url = %config.engine_base_url()?,
        sync_period = %config.sync_period,
        "Configured Keto ACP engine client"
    );

    let policy_reconciler = Arc::new(Reconciler::new(
        Arc::new(KubeStore::<Policy>::new(client.clone())),
        Arc::clone(&engine),
        settings,
    ));
    let role_reconciler = Arc::new(Reconciler::new(
        Arc::new(KubeStore::<Role>::new(client.clone())),
        engine,
        settings,
    ));

    let leader_elector = config.enable_leader_election.then(|| {
        let elector = LeaderElector::from_config(client.clone(), config);
        info!(
            identity = %elector.identity(),
            lease = %config.leader_election_lease_name,
            namespace = %config.leader_election_namespace,
            "Leader election enabled"
        );
        elector
    });

    summarize_existing::<Policy>(&client).await;
    summarize_existing::<Role>(&client).await;

    info!("Controller initialized, starting watch loop...");

    Ok(InitializationResult {
        client,
        policy_reconciler,
        role_reconciler,
        server_state,
        max_concurrent_reconciliations: config.max_concurrent_reconciliations,
        leader_elector,
    })
}

/// Install the global tracing subscriber, `RUST_LOG` overrides the default filter
fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "keto_maester=info".into());

    let result = if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .try_init()
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).try_init()
    };

    if let Err(e) = result {
        warn!("Tracing subscriber already initialized: {}", e);
    }
}

/// Wait for the HTTP server to become ready
async fn wait_for_server_ready(
    server_state: &Arc<ServerState>,
    server_handle: &tokio::task::JoinHandle<()>,
) -> Result<()> {
    let startup_timeout = Duration::from_secs(DEFAULT_SERVER_STARTUP_TIMEOUT_SECS);
    let poll_interval = Duration::from_millis(DEFAULT_SERVER_POLL_INTERVAL_MS);
    let start_time = Instant::now();

    loop {
        if server_handle.is_finished() {
            return Err(anyhow::anyhow!("HTTP server failed to start"));
        }

        // Set by start_server once bound
        if server_state.is_ready.load(Ordering::Relaxed) {
            info!("HTTP server is ready and accepting connections");
            return Ok(());
        }

        if start_time.elapsed() > startup_timeout {
            return Err(anyhow::anyhow!(
                "HTTP server failed to become ready within {} seconds",
                startup_timeout.as_secs()
            ));
        }

        tokio::time::sleep(poll_interval).await;
    }
}

/// Log the resources of kind `K` present at startup, by namespace
///
/// A failure here usually means the CRD is not installed or RBAC is missing.
/// The watch loop reports the same problem, so it is not fatal.
async fn summarize_existing<K: ManagedResource>(client: &Client) {
    let kind: ResourceKind = K::KIND;
    let api: Api<K> = Api::all(client.clone());

    match api.list(&ListParams::default()).await {
        Ok(list) => {
            let mut by_namespace: BTreeMap<String, usize> = BTreeMap::new();
            for item in &list.items {
                let namespace = item.meta().namespace.clone().unwrap_or_default();
                *by_namespace.entry(namespace).or_default() += 1;
            }

            info!(
                resource.kind = %kind,
                total = list.items.len(),
                namespaces = by_namespace.len(),
                "CRD is queryable"
            );
            for (namespace, count) in &by_namespace {
                info!(resource.kind = %kind, namespace = %namespace, count, "Existing resources");
            }
        }
        Err(e) => {
            warn!(
                resource.kind = %kind,
                error = %e,
                "Failed to list existing resources, is the CRD installed?"
            );
        }
    }
}
