//! # Policy
//!
//! `Policy` custom resource, the desired state of one ORY Keto ACP policy.

use schemars::{JsonSchema, Schema, SchemaGenerator};
use serde::{Deserialize, Serialize};

/// Policy Custom Resource Definition
///
/// # Example
///
/// ```yaml
/// apiVersion: keto.ory.sh/v1alpha1
/// kind: Policy
/// metadata:
///   name: p1
///   namespace: default
/// spec:
///   pattern_matching: exact
///   description: allow maria to list photos
///   subjects: ["users:maria"]
///   actions: ["list"]
///   effect: allow
///   resources: ["resources:photos"]
/// ```
#[derive(kube::CustomResource, Debug, Clone, Default, Deserialize, Serialize, JsonSchema)]
#[kube(
    kind = "Policy",
    group = "keto.ory.sh",
    version = "v1alpha1",
    namespaced,
    status = "crate::crd::ReconciliationStatus",
    shortname = "ketopolicy",
    printcolumn = r#"{"name":"Matching", "type":"string", "jsonPath":".spec.pattern_matching"}, {"name":"Effect", "type":"string", "jsonPath":".spec.effect"}, {"name":"Observed", "type":"integer", "jsonPath":".status.observedGeneration"}, {"name":"Error", "type":"string", "jsonPath":".status.reconciliationError.description"}"#
)]
pub struct PolicySpec {
    /// Rule matching strategy, see
    /// https://www.ory.sh/keto/docs/engines/acp-ory#pattern-matching-strategies
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern_matching: Option<PatternMatching>,
    /// Human-readable description of the permission
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Subjects the policy applies to (users: `users:<name>`, groups: `<scope>:<group>`)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub subjects: Vec<String>,
    /// Actions, for example `read` or `write`
    #[serde(default)]
    pub actions: Vec<String>,
    /// Allow or deny access
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub effect: Option<Effect>,
    /// Objects access is restricted to
    #[serde(default)]
    pub resources: Vec<String>,
    /// Conditions under which the policy applies, passed to Keto untouched, see
    /// https://www.ory.sh/keto/docs/engines/acp-ory#conditions
    #[serde(default, rename = "condition", skip_serializing_if = "Option::is_none")]
    #[schemars(schema_with = "condition_schema")]
    pub conditions: Option<serde_json::Value>,
}

/// Pattern matching strategy of a policy or role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum PatternMatching {
    Exact,
    Regex,
    Glob,
}

/// Effect of a matching policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Effect {
    Allow,
    Deny,
}

impl Effect {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Effect::Allow => "allow",
            Effect::Deny => "deny",
        }
    }
}

// Conditions are an arbitrary object, so the API server must not prune them
fn condition_schema(_gen: &mut SchemaGenerator) -> Schema {
    schemars::json_schema!({
        "type": "object",
        "nullable": true,
        "x-kubernetes-preserve-unknown-fields": true,
        "description": "Conditions under which the policy applies, passed to Keto untouched"
    })
}
