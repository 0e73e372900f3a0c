//! # Prelude
//!
//! Re-exports commonly used types and traits for convenience.
//!
//! ```rust
//! use keto_maester::prelude::*;
//! ```

// CRD types
pub use crate::crd::*;

// Keto ACP engine
pub use crate::keto::{AcpEngine, EngineError, Flavour, KetoClient, PolicyDocument, RoleDocument};

// Reconciler types
pub use crate::controller::reconciler::{
    reconcile_resource, ManagedResource, ReconcileOutcome, Reconciler, ReconcilerError,
    ReconcilerSettings, ResourceKey, ResourceKind, ResourceStore, StoreError,
};

pub use crate::config::ControllerConfig;
