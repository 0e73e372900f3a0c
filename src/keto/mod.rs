//! # Keto ACP Engine
//!
//! Client for the ORY Keto `acp/ory` engine admin API.
//!
//! The controller only talks to Keto through the [`AcpEngine`] trait, so the
//! reconciler can be exercised against in-memory engines.

mod client;
mod error;
mod types;

pub use client::KetoClient;
pub use error::EngineError;
pub use types::{Flavour, PolicyDocument, RoleDocument};

use async_trait::async_trait;

/// Operations of the ORY Keto ACP engine, per flavour
///
/// Every call is a single request: retries are left to the caller.
#[async_trait]
pub trait AcpEngine: Send + Sync {
    /// Fetch a policy, `None` when Keto answers 404
    async fn get_policy(&self, flavour: Flavour, id: &str)
        -> Result<Option<PolicyDocument>, EngineError>;

    async fn list_policies(&self, flavour: Flavour) -> Result<Vec<PolicyDocument>, EngineError>;

    /// Create or replace a policy, returns the document stored by Keto
    async fn upsert_policy(
        &self,
        flavour: Flavour,
        policy: &PolicyDocument,
    ) -> Result<PolicyDocument, EngineError>;

    /// Delete a policy, a missing policy is not an error
    async fn delete_policy(&self, flavour: Flavour, id: &str) -> Result<(), EngineError>;

    /// Fetch a role, `None` when Keto answers 404
    async fn get_role(&self, flavour: Flavour, id: &str) -> Result<Option<RoleDocument>, EngineError>;

    async fn list_roles(&self, flavour: Flavour) -> Result<Vec<RoleDocument>, EngineError>;

    /// Create or replace a role, returns the document stored by Keto
    async fn upsert_role(
        &self,
        flavour: Flavour,
        role: &RoleDocument,
    ) -> Result<RoleDocument, EngineError>;

    /// Delete a role, a missing role is not an error
    async fn delete_role(&self, flavour: Flavour, id: &str) -> Result<(), EngineError>;
}
