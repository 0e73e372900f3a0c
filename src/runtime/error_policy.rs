//! # Error Policy
//!
//! Error handling and backoff logic for the controller watch loop.

use crate::controller::reconciler::{ManagedResource, Reconciler, ReconcilerError, ResourceKey};
use crate::observability;
use kube::Resource;
use kube_runtime::controller::Action;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

/// Handle reconciliation errors with Fibonacci backoff
///
/// Backoff state is tracked per resource, so one failing resource does not
/// slow down the others. A successful reconciliation resets it.
pub fn handle_reconciliation_error<K: ManagedResource>(
    obj: Arc<K>,
    error: &ReconcilerError,
    ctx: Arc<Reconciler<K>>,
) -> Action {
    let meta = obj.meta();
    let key = ResourceKey::new(
        meta.namespace.as_deref().unwrap_or("default"),
        meta.name.as_deref().unwrap_or("unknown"),
    );

    let error_span = tracing::span!(
        tracing::Level::ERROR,
        "controller.watch.reconciliation_error",
        resource.kind = %K::KIND,
        resource.name = %key.name,
        resource.namespace = %key.namespace,
        error = %error
    );
    let _error_guard = error_span.enter();

    error!("Reconciliation error for {} {}: {}", K::KIND, key, error);
    observability::metrics::increment_reconciliation_errors(K::KIND.as_str());

    let (backoff_seconds, error_count) = ctx.next_error_backoff(&key);
    let backoff = Duration::from_secs(backoff_seconds);
    let next_trigger_time = chrono::Duration::from_std(backoff)
        .ok()
        .and_then(|delay| chrono::Utc::now().checked_add_signed(delay))
        .map_or_else(|| "unknown".to_string(), |time| time.to_rfc3339());

    info!(
        "Retrying with Fibonacci backoff: {}s (error count: {}, next retry: {})",
        backoff_seconds, error_count, next_trigger_time
    );

    observability::metrics::increment_requeues_total("error-backoff");
    Action::requeue(backoff)
}
