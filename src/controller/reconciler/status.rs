//! # Status
//!
//! Writes the outcome of a reconciliation back to the resource.
//!
//! `observedGeneration` is the generation that was last attempted, whether it
//! succeeded or not. A non-empty `reconciliationError` marks a failed attempt.
//! Identical outcomes are not written again, so a resource failing repeatedly
//! does not generate a watch event per attempt.

use crate::controller::reconciler::{ManagedResource, ResourceStore, StoreError};
use crate::crd::{ReconciliationError, ReconciliationStatus};
use kube::Resource;
use tracing::{debug, error};

/// Record a successful attempt at the current generation
///
/// Returns whether the status was written.
pub async fn record_success<K: ManagedResource>(
    store: &dyn ResourceStore<K>,
    resource: &K,
) -> Result<bool, StoreError> {
    write(store, resource, String::new()).await
}

/// Record a failed attempt at the current generation
///
/// Returns whether the status was written.
pub async fn record_error<K: ManagedResource>(
    store: &dyn ResourceStore<K>,
    resource: &K,
    description: &str,
) -> Result<bool, StoreError> {
    write(store, resource, description.to_string()).await
}

async fn write<K: ManagedResource>(
    store: &dyn ResourceStore<K>,
    resource: &K,
    description: String,
) -> Result<bool, StoreError> {
    let generation = resource.meta().generation;
    let name = resource.meta().name.as_deref().unwrap_or("unknown");

    if let Some(current) = resource.reconciliation_status() {
        if current.observed_generation == generation
            && current.reconciliation_error.description == description
        {
            debug!(resource.name = name, "Status already up to date");
            return Ok(false);
        }
    }

    let status = ReconciliationStatus {
        observed_generation: generation,
        reconciliation_error: ReconciliationError { description },
        last_reconcile_time: Some(chrono::Utc::now().to_rfc3339()),
    };

    match store.update_status(resource, &status).await {
        Ok(()) => Ok(true),
        Err(StoreError::Conflict) => {
            debug!(resource.name = name, "Status update conflicted, resource changed");
            Err(StoreError::Conflict)
        }
        Err(e) => {
            error!(
                resource.kind = %K::KIND,
                resource.name = name,
                error = %e,
                "Failed to update status"
            );
            Err(e)
        }
    }
}
