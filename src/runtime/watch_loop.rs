//! # Watch Loop
//!
//! Runs one kube-runtime `Controller` per managed kind. The controller
//! serializes reconciliations per object and bounds them across objects.

use crate::controller::reconciler::{ManagedResource, Reconciler, ReconcilerError, ResourceKey};
use crate::controller::server::ServerState;
use crate::crd::{Policy, Role};
use crate::runtime::error_policy::handle_reconciliation_error;
use crate::runtime::initialization::InitializationResult;
use anyhow::Context;
use futures::StreamExt;
use kube::api::Api;
use kube::Client;
use kube_runtime::{controller, controller::Action, watcher, Controller};
use std::sync::atomic::Ordering;
use std::sync::Arc;
#[cfg(unix)]
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::watch;
use tracing::{debug, info, warn, Instrument};

/// Run the watch loops of `Policy` and `Role` until a shutdown signal arrives
///
/// With leader election enabled the loops only start once this replica holds
/// the lease, and stop with an error when it loses it.
pub async fn run_watch_loop(init: InitializationResult) -> Result<(), anyhow::Error> {
    let InitializationResult {
        client,
        policy_reconciler,
        role_reconciler,
        server_state,
        max_concurrent_reconciliations,
        leader_elector,
    } = init;

    let mut shutdown = spawn_shutdown_handler(Arc::clone(&server_state))
        .context("Failed to install signal handlers")?;

    let controllers = async {
        tokio::join!(
            run_controller::<Policy>(&client, policy_reconciler, max_concurrent_reconciliations),
            run_controller::<Role>(&client, role_reconciler, max_concurrent_reconciliations),
        );
    };

    let Some(elector) = leader_elector else {
        controllers.await;
        info!("Controller stopped gracefully");
        return Ok(());
    };

    tokio::select! {
        () = elector.acquire() => {}
        _ = shutdown.changed() => {
            info!("Shutdown before leadership was acquired");
            return Ok(());
        }
    }
    if *shutdown.borrow() {
        elector.release().await;
        return Ok(());
    }

    tokio::select! {
        () = controllers => {
            elector.release().await;
            info!("Controller stopped gracefully");
            Ok(())
        }
        lost = elector.hold() => {
            server_state.is_ready.store(false, Ordering::Relaxed);
            Err(lost.context("Leadership lost, stopping controllers"))
        }
    }
}

/// Mark the server as not ready once SIGTERM or SIGINT is received
///
/// The returned receiver flips to `true` at that point. SIGTERM is registered
/// before this returns, so a signal sent right after is not missed.
fn spawn_shutdown_handler(
    server_state: Arc<ServerState>,
) -> std::io::Result<watch::Receiver<bool>> {
    #[cfg(unix)]
    let mut terminate = signal(SignalKind::terminate())?;
    let (tx, rx) = watch::channel(false);

    tokio::spawn(async move {
        #[cfg(unix)]
        let terminated = terminate.recv();
        #[cfg(not(unix))]
        let terminated = std::future::pending::<Option<()>>();

        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                if let Err(e) = result {
                    warn!(error = %e, "Failed to listen for SIGINT");
                }
                info!("Received SIGINT, initiating graceful shutdown...");
            }
            _ = terminated => {
                info!("Received SIGTERM, initiating graceful shutdown...");
            }
        }
        server_state.is_ready.store(false, Ordering::Relaxed);
        info!("Marked server as not ready");
        tx.send_replace(true);
    });

    Ok(rx)
}

async fn run_controller<K: ManagedResource>(
    client: &Client,
    reconciler: Arc<Reconciler<K>>,
    max_concurrent_reconciliations: u16,
) {
    let api: Api<K> = Api::all(client.clone());
    let watch_span = tracing::info_span!("controller.watch", resource.kind = %K::KIND);

    async move {
        info!("Starting controller watch loop...");

        Controller::new(api, watcher::Config::default().any_semantic())
            .with_config(
                controller::Config::default().concurrency(max_concurrent_reconciliations),
            )
            .shutdown_on_signal()
            .run(reconcile::<K>, handle_reconciliation_error::<K>, reconciler)
            .for_each(|result| {
                match result {
                    Ok((object, action)) => {
                        debug!(object = %object, ?action, "watch.event.success");
                    }
                    Err(e) => {
                        warn!(error = %e, "Controller stream error");
                    }
                }
                futures::future::ready(())
            })
            .await;

        info!("Controller watch loop ended");
    }
    .instrument(watch_span)
    .await;
}

async fn reconcile<K: ManagedResource>(
    obj: Arc<K>,
    ctx: Arc<Reconciler<K>>,
) -> Result<Action, ReconcilerError> {
    let key = ResourceKey::of(obj.as_ref()).ok_or_else(|| {
        ReconcilerError::Validation("resource has no namespace or name".to_string())
    })?;
    ctx.reconcile(&key).await
}
