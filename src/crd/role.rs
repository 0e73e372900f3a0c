//! # Role
//!
//! `Role` custom resource, the desired state of one ORY Keto ACP role.

use crate::crd::PatternMatching;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Role Custom Resource Definition
///
/// # Example
///
/// ```yaml
/// apiVersion: keto.ory.sh/v1alpha1
/// kind: Role
/// metadata:
///   name: photo-admins
///   namespace: default
/// spec:
///   members: ["users:maria", "users:peter"]
/// ```
#[derive(kube::CustomResource, Debug, Clone, Default, Deserialize, Serialize, JsonSchema)]
#[kube(
    kind = "Role",
    group = "keto.ory.sh",
    version = "v1alpha1",
    namespaced,
    status = "crate::crd::ReconciliationStatus",
    shortname = "ketorole",
    printcolumn = r#"{"name":"Observed", "type":"integer", "jsonPath":".status.observedGeneration"}, {"name":"Error", "type":"string", "jsonPath":".status.reconciliationError.description"}"#
)]
pub struct RoleSpec {
    /// Members of the role
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub members: Vec<String>,
    /// Pattern matching strategy the role is stored under (defaults to exact)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern_matching: Option<PatternMatching>,
}
