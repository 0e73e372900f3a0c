//! Documents exchanged with the Keto ACP engine.

use crate::crd::PatternMatching;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// Pattern matching flavour of the ACP engine, part of every engine path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Flavour {
    Exact,
    Regex,
    Glob,
}

impl Flavour {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Flavour::Exact => "exact",
            Flavour::Regex => "regex",
            Flavour::Glob => "glob",
        }
    }
}

impl fmt::Display for Flavour {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<PatternMatching> for Flavour {
    fn from(pattern_matching: PatternMatching) -> Self {
        match pattern_matching {
            PatternMatching::Exact => Flavour::Exact,
            PatternMatching::Regex => Flavour::Regex,
            PatternMatching::Glob => Flavour::Glob,
        }
    }
}

/// ACP policy as stored by Keto
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PolicyDocument {
    pub id: String,
    #[serde(default, deserialize_with = "null_as_default", skip_serializing_if = "Vec::is_empty")]
    pub actions: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conditions: Option<serde_json::Value>,
    #[serde(default, deserialize_with = "null_as_default", skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(default, deserialize_with = "null_as_default", skip_serializing_if = "String::is_empty")]
    pub effect: String,
    #[serde(default, deserialize_with = "null_as_default", skip_serializing_if = "Vec::is_empty")]
    pub resources: Vec<String>,
    #[serde(default, deserialize_with = "null_as_default", skip_serializing_if = "Vec::is_empty")]
    pub subjects: Vec<String>,
}

/// ACP role as stored by Keto
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleDocument {
    pub id: String,
    #[serde(default, deserialize_with = "null_as_default", skip_serializing_if = "Vec::is_empty")]
    pub members: Vec<String>,
}

// Keto serializes empty lists as null
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
