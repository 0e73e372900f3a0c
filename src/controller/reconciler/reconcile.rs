//! # Reconcile
//!
//! One reconciliation pass for a single resource.
//!
//! The resource is always re-read before acting, and every change is written
//! back through the store. A write that lost a race against a concurrent
//! change restarts the pass on fresh state.

use crate::constants::{CONFLICT_REQUEUE_SECS, MAX_CONFLICT_RETRIES};
use crate::controller::finalizer::{self, FinalizerAction};
use crate::controller::mapper;
use crate::controller::reconciler::{
    status, BackoffState, ManagedResource, Reconciler, ReconcilerError, ResourceKey, ResourceStore,
    StoreError,
};
use crate::keto::AcpEngine;
use crate::observability::metrics;
use kube::Resource;
use kube_runtime::controller::Action;
use std::time::{Duration, Instant};
use tracing::{debug, info, info_span, warn, Instrument};

/// Result of a successful reconciliation pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// The resource no longer exists
    Gone,
    /// The finalizer was registered, the resulting update triggers the next pass
    FinalizerAdded,
    /// Keto already holds the current generation
    UpToDate,
    /// The document was written to Keto
    Applied,
    /// The spec cannot be applied, the error is recorded in the status
    Invalid(String),
    /// The document was removed from Keto and the finalizer released
    CleanedUp,
    /// The resource is being deleted and no longer carries our finalizer
    Released,
    /// Every attempt lost a race against a concurrent change
    Conflicted,
}

/// Reconcile the resource at `key`
///
/// Conflicting writes restart the pass on freshly read state, at most
/// [`MAX_CONFLICT_RETRIES`] times.
pub async fn reconcile_resource<K: ManagedResource>(
    key: &ResourceKey,
    store: &dyn ResourceStore<K>,
    engine: &dyn AcpEngine,
) -> Result<ReconcileOutcome, ReconcilerError> {
    for attempt in 1..=MAX_CONFLICT_RETRIES {
        match reconcile_once(key, store, engine).await {
            Err(e) if e.is_conflict() => {
                debug!(attempt, "Resource changed during reconciliation, re-reading");
            }
            Err(ReconcilerError::Store(StoreError::NotFound)) => {
                debug!("Resource disappeared during reconciliation");
                return Ok(ReconcileOutcome::Gone);
            }
            result => return result,
        }
    }

    warn!(
        attempts = MAX_CONFLICT_RETRIES,
        "Giving up on conflicting updates for now"
    );
    Ok(ReconcileOutcome::Conflicted)
}

async fn reconcile_once<K: ManagedResource>(
    key: &ResourceKey,
    store: &dyn ResourceStore<K>,
    engine: &dyn AcpEngine,
) -> Result<ReconcileOutcome, ReconcilerError> {
    let Some(resource) = store.get(key).await? else {
        debug!("Resource not found, nothing to do");
        return Ok(ReconcileOutcome::Gone);
    };

    match finalizer::evaluate(resource.meta()) {
        FinalizerAction::Add => {
            store
                .update_finalizers(&resource, finalizer::with_finalizer(resource.meta()))
                .await?;
            info!("Added finalizer");
            Ok(ReconcileOutcome::FinalizerAdded)
        }
        FinalizerAction::Upsert => apply(key, &resource, store, engine).await,
        FinalizerAction::Cleanup => cleanup(key, &resource, store, engine).await,
        FinalizerAction::Nothing => Ok(ReconcileOutcome::Released),
    }
}

async fn apply<K: ManagedResource>(
    key: &ResourceKey,
    resource: &K,
    store: &dyn ResourceStore<K>,
    engine: &dyn AcpEngine,
) -> Result<ReconcileOutcome, ReconcilerError> {
    let flavour = match resource.upsert_flavour() {
        Ok(flavour) => flavour,
        Err(e) => {
            let message = e.to_string();
            warn!(error = %message, "Resource cannot be applied to Keto");
            status::record_error(store, resource, &message).await?;
            return Ok(ReconcileOutcome::Invalid(message));
        }
    };
    let id = mapper::document_id(&key.namespace, &key.name);

    // A failed lookup only costs an extra upsert
    let exists = match resource.document_exists(engine, flavour, &id).await {
        Ok(exists) => exists,
        Err(e) => {
            warn!(error = %e, "Failed to look up document in Keto");
            false
        }
    };

    let generation = resource.meta().generation;
    if exists
        && resource
            .reconciliation_status()
            .is_some_and(|s| s.is_converged(generation))
    {
        debug!(document.id = %id, "Keto is up to date");
        return Ok(ReconcileOutcome::UpToDate);
    }

    match resource.upsert_document(engine, flavour, id.clone()).await {
        Ok(()) => {
            info!(document.id = %id, engine.flavour = %flavour, "Applied document to Keto");
            status::record_success(store, resource).await?;
            Ok(ReconcileOutcome::Applied)
        }
        Err(e) => {
            warn!(document.id = %id, error = %e, "Failed to apply document to Keto");
            status::record_error(store, resource, &e.to_string()).await?;
            Err(e.into())
        }
    }
}

async fn cleanup<K: ManagedResource>(
    key: &ResourceKey,
    resource: &K,
    store: &dyn ResourceStore<K>,
    engine: &dyn AcpEngine,
) -> Result<ReconcileOutcome, ReconcilerError> {
    if let Some(flavour) = resource.cleanup_flavour() {
        let id = mapper::document_id(&key.namespace, &key.name);
        if let Err(e) = resource.delete_document(engine, flavour, &id).await {
            warn!(document.id = %id, error = %e, "Failed to delete document from Keto");
            status::record_error(store, resource, &e.to_string()).await?;
            return Err(e.into());
        }
        info!(document.id = %id, engine.flavour = %flavour, "Deleted document from Keto");
    } else {
        debug!("No document to delete from Keto");
    }

    store
        .update_finalizers(resource, finalizer::without_finalizer(resource.meta()))
        .await?;
    info!("Removed finalizer");
    Ok(ReconcileOutcome::CleanedUp)
}

impl<K: ManagedResource> Reconciler<K> {
    /// Reconcile the resource at `key` and decide when to look at it again
    pub async fn reconcile(&self, key: &ResourceKey) -> Result<Action, ReconcilerError> {
        let span = info_span!(
            "controller.reconcile",
            resource.kind = %K::KIND,
            resource.namespace = %key.namespace,
            resource.name = %key.name
        );
        async move {
            let start = Instant::now();
            metrics::increment_reconciliations(K::KIND.as_str());

            let result =
                reconcile_resource(key, self.store.as_ref(), self.engine.as_ref()).await;
            metrics::observe_reconciliation_duration(
                K::KIND.as_str(),
                start.elapsed().as_secs_f64(),
            );

            let outcome = result?;
            self.reset_backoff(key);
            Ok(self.action_for(&outcome))
        }
        .instrument(span)
        .await
    }

    fn action_for(&self, outcome: &ReconcileOutcome) -> Action {
        match outcome {
            ReconcileOutcome::Gone
            | ReconcileOutcome::Released
            | ReconcileOutcome::CleanedUp
            | ReconcileOutcome::Invalid(_) => Action::await_change(),
            ReconcileOutcome::Conflicted => {
                metrics::increment_requeues_total("conflict");
                Action::requeue(Duration::from_secs(CONFLICT_REQUEUE_SECS))
            }
            ReconcileOutcome::FinalizerAdded
            | ReconcileOutcome::UpToDate
            | ReconcileOutcome::Applied => {
                metrics::increment_requeues_total("sync-period");
                Action::requeue(self.settings.sync_period)
            }
        }
    }

    /// Advance the error backoff of `key`
    ///
    /// Returns the delay before the next attempt in seconds and the number of
    /// consecutive failures.
    pub fn next_error_backoff(&self, key: &ResourceKey) -> (u64, u32) {
        match self.backoff_states.lock() {
            Ok(mut states) => {
                let state = states.entry(key.to_string()).or_insert_with(|| {
                    BackoffState::new(
                        self.settings.backoff_min_secs,
                        self.settings.backoff_max_secs,
                    )
                });
                state.increment_error();
                (state.backoff.next_backoff_seconds(), state.error_count)
            }
            Err(e) => {
                warn!("Failed to lock backoff_states: {e}, using maximum backoff");
                (self.settings.backoff_max_secs, 0)
            }
        }
    }

    fn reset_backoff(&self, key: &ResourceKey) {
        if let Ok(mut states) = self.backoff_states.lock() {
            states.remove(&key.to_string());
        }
    }
}
