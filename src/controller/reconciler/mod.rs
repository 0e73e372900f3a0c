//! # Reconciler
//!
//! Per-resource control loop converging Keto towards `Policy` and `Role`
//! resources.
//!
//! - `resource`: the kinds the controller manages
//! - `store`: access to the resources in the cluster
//! - `reconcile`: one reconciliation pass
//! - `status`: observed generation and error reporting
//! - `types`: reconciler context and errors

mod reconcile;
mod resource;
pub mod status;
mod store;
mod types;

pub use reconcile::{reconcile_resource, ReconcileOutcome};
pub use resource::{ManagedResource, ResourceKind};
pub use store::{KubeStore, ResourceKey, ResourceStore, StoreError};
pub use types::{BackoffState, Reconciler, ReconcilerError, ReconcilerSettings};
