//! # Status
//!
//! Status shared by `Policy` and `Role`.

use serde::{Deserialize, Serialize};

/// Observed state of a Policy or Role
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ReconciliationStatus {
    /// Generation the controller last attempted to apply to Keto
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
    /// Error of the last attempt, empty when it succeeded
    #[serde(default)]
    pub reconciliation_error: ReconciliationError,
    /// Time of the last attempt (RFC3339)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_reconcile_time: Option<String>,
}

/// Error that occurred during the reconciliation process
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ReconciliationError {
    /// Description of the reconciliation error
    /// Always serialized so that a merge patch clears a previous error
    #[serde(default)]
    pub description: String,
}

impl ReconciliationStatus {
    /// Whether the last attempt failed
    #[must_use]
    pub fn has_error(&self) -> bool {
        !self.reconciliation_error.description.is_empty()
    }

    /// Whether `generation` was applied and the attempt succeeded
    #[must_use]
    pub fn is_converged(&self, generation: Option<i64>) -> bool {
        generation.is_some() && self.observed_generation == generation && !self.has_error()
    }
}
