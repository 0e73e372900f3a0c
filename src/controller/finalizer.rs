//! # Finalizer
//!
//! Lifecycle guard that keeps a resource around until its Keto document is
//! gone.
//!
//! | deletion requested | finalizer | action |
//! |---|---|---|
//! | no | absent | add the finalizer |
//! | no | present | upsert the document |
//! | yes | present | delete the document, then drop the finalizer |
//! | yes | absent | nothing |

use crate::constants::FINALIZER_NAME;
use kube::api::ObjectMeta;

/// What the reconciler must do next for a resource
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinalizerAction {
    /// Register the finalizer and stop, the resulting update triggers the upsert
    Add,
    /// Create or update the document in Keto
    Upsert,
    /// Delete the document from Keto and release the resource
    Cleanup,
    /// The resource is on its way out and no longer ours
    Nothing,
}

#[must_use]
pub fn evaluate(meta: &ObjectMeta) -> FinalizerAction {
    match (is_deletion_requested(meta), has_finalizer(meta)) {
        (false, false) => FinalizerAction::Add,
        (false, true) => FinalizerAction::Upsert,
        (true, true) => FinalizerAction::Cleanup,
        (true, false) => FinalizerAction::Nothing,
    }
}

#[must_use]
pub fn is_deletion_requested(meta: &ObjectMeta) -> bool {
    meta.deletion_timestamp.is_some()
}

#[must_use]
pub fn has_finalizer(meta: &ObjectMeta) -> bool {
    meta.finalizers
        .as_ref()
        .is_some_and(|finalizers| finalizers.iter().any(|f| f == FINALIZER_NAME))
}

/// Finalizers of `meta` with ours appended
#[must_use]
pub fn with_finalizer(meta: &ObjectMeta) -> Vec<String> {
    let mut finalizers = meta.finalizers.clone().unwrap_or_default();
    if !finalizers.iter().any(|f| f == FINALIZER_NAME) {
        finalizers.push(FINALIZER_NAME.to_string());
    }
    finalizers
}

/// Finalizers of `meta` with ours removed, others are kept in order
#[must_use]
pub fn without_finalizer(meta: &ObjectMeta) -> Vec<String> {
    meta.finalizers
        .iter()
        .flatten()
        .filter(|f| *f != FINALIZER_NAME)
        .cloned()
        .collect()
}
