//! # Custom Resource Definitions
//!
//! CRD types for the Keto Maester controller.
//!
//! ## Module Structure
//!
//! - `policy.rs` - `Policy` resource (an ORY Keto ACP policy)
//! - `role.rs` - `Role` resource (an ORY Keto ACP role)
//! - `status.rs` - status shared by both kinds

mod policy;
mod role;
mod status;

pub use policy::{Effect, PatternMatching, Policy, PolicySpec};
pub use role::{Role, RoleSpec};
pub use status::{ReconciliationError, ReconciliationStatus};
