//! # Mapper
//!
//! Translation of `Policy` and `Role` resources into Keto ACP documents.
//!
//! The document id is derived from the resource identity only, so renaming a
//! field in the spec never orphans a document in Keto.

use crate::crd::{PolicySpec, RoleSpec};
use crate::keto::{Flavour, PolicyDocument, RoleDocument};

/// Keto document id of the resource `namespace/name`
#[must_use]
pub fn document_id(namespace: &str, name: &str) -> String {
    format!("{namespace}:{name}")
}

/// Policy document for `spec`, stored under `id`
#[must_use]
pub fn policy_document(id: String, spec: &PolicySpec) -> PolicyDocument {
    PolicyDocument {
        id,
        actions: spec.actions.clone(),
        conditions: spec.conditions.clone(),
        description: spec.description.clone().unwrap_or_default(),
        effect: spec.effect.map(|e| e.as_str().to_string()).unwrap_or_default(),
        resources: spec.resources.clone(),
        subjects: spec.subjects.clone(),
    }
}

/// Flavour a policy is stored under, `None` when the spec does not name one
#[must_use]
pub fn policy_flavour(spec: &PolicySpec) -> Option<Flavour> {
    spec.pattern_matching.map(Flavour::from)
}

/// Whether a policy spec is too empty to have ever produced a document
#[must_use]
pub fn is_blank_policy(spec: &PolicySpec) -> bool {
    spec.effect.is_none() && spec.pattern_matching.is_none()
}

/// Role document for `spec`, stored under `id`
#[must_use]
pub fn role_document(id: String, spec: &RoleSpec) -> RoleDocument {
    RoleDocument {
        id,
        members: spec.members.clone(),
    }
}

/// Flavour a role is stored under, exact unless the spec says otherwise
#[must_use]
pub fn role_flavour(spec: &RoleSpec) -> Flavour {
    spec.pattern_matching.map_or(Flavour::Exact, Flavour::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::{Effect, PatternMatching};
    use serde_json::json;

    #[test]
    fn test_document_id() {
        assert_eq!(document_id("default", "p1"), "default:p1");
        assert_ne!(document_id("a", "b:c"), document_id("a:b", "c:"));
    }

    #[test]
    fn test_policy_document() {
        let spec = PolicySpec {
            pattern_matching: Some(PatternMatching::Exact),
            description: Some("allow maria to list photos".to_string()),
            subjects: vec!["users:maria".to_string()],
            actions: vec!["list".to_string()],
            effect: Some(Effect::Allow),
            resources: vec!["resources:photos".to_string()],
            conditions: Some(json!({"remoteIP": {"type": "CIDRCondition"}})),
        };

        let document = policy_document(document_id("default", "p1"), &spec);
        assert_eq!(
            serde_json::to_value(&document).unwrap(),
            json!({
                "id": "default:p1",
                "actions": ["list"],
                "conditions": {"remoteIP": {"type": "CIDRCondition"}},
                "description": "allow maria to list photos",
                "effect": "allow",
                "resources": ["resources:photos"],
                "subjects": ["users:maria"]
            })
        );
        assert_eq!(policy_flavour(&spec), Some(Flavour::Exact));
        assert!(!is_blank_policy(&spec));
    }

    #[test]
    fn test_blank_policy() {
        let spec = PolicySpec::default();
        assert!(is_blank_policy(&spec));
        assert_eq!(policy_flavour(&spec), None);
        assert_eq!(policy_document("ns:x".to_string(), &spec).effect, "");
    }

    #[test]
    fn test_role_defaults_to_exact() {
        let spec = RoleSpec {
            members: vec!["users:maria".to_string()],
            pattern_matching: None,
        };
        assert_eq!(role_flavour(&spec), Flavour::Exact);
        assert_eq!(role_document("default:admins".to_string(), &spec).members, spec.members);

        let spec = RoleSpec {
            pattern_matching: Some(PatternMatching::Regex),
            ..spec
        };
        assert_eq!(role_flavour(&spec), Flavour::Regex);
    }
}
