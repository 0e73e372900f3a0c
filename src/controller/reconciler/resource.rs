//! # Managed Resources
//!
//! The kinds the controller manages and how each one maps onto the Keto ACP
//! engine.

use crate::controller::mapper;
use crate::controller::reconciler::ReconcilerError;
use crate::crd::{Policy, ReconciliationStatus, Role};
use crate::keto::{AcpEngine, EngineError, Flavour};
use async_trait::async_trait;
use kube::core::NamespaceResourceScope;
use kube::Resource;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt;
use tracing::warn;

/// Kinds managed by the controller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Policy,
    Role,
}

impl ResourceKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ResourceKind::Policy => "Policy",
            ResourceKind::Role => "Role",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A custom resource mirrored as a document in Keto
#[async_trait]
pub trait ManagedResource:
    Resource<DynamicType = (), Scope = NamespaceResourceScope>
    + Clone
    + fmt::Debug
    + Serialize
    + DeserializeOwned
    + Send
    + Sync
    + 'static
{
    const KIND: ResourceKind;

    fn reconciliation_status(&self) -> Option<&ReconciliationStatus>;

    /// Flavour to store the document under, a validation error when the spec has none
    fn upsert_flavour(&self) -> Result<Flavour, ReconcilerError>;

    /// Flavour the document was stored under, `None` when there is nothing to clean up
    fn cleanup_flavour(&self) -> Option<Flavour>;

    async fn document_exists(
        &self,
        engine: &dyn AcpEngine,
        flavour: Flavour,
        id: &str,
    ) -> Result<bool, EngineError>;

    async fn upsert_document(
        &self,
        engine: &dyn AcpEngine,
        flavour: Flavour,
        id: String,
    ) -> Result<(), EngineError>;

    async fn delete_document(
        &self,
        engine: &dyn AcpEngine,
        flavour: Flavour,
        id: &str,
    ) -> Result<(), EngineError>;
}

#[async_trait]
impl ManagedResource for Policy {
    const KIND: ResourceKind = ResourceKind::Policy;

    fn reconciliation_status(&self) -> Option<&ReconciliationStatus> {
        self.status.as_ref()
    }

    fn upsert_flavour(&self) -> Result<Flavour, ReconcilerError> {
        mapper::policy_flavour(&self.spec).ok_or_else(|| {
            ReconcilerError::Validation(
                "spec.pattern_matching must be one of exact, regex, glob".to_string(),
            )
        })
    }

    fn cleanup_flavour(&self) -> Option<Flavour> {
        if mapper::is_blank_policy(&self.spec) {
            return None;
        }
        let flavour = mapper::policy_flavour(&self.spec);
        if flavour.is_none() {
            warn!(
                resource.name = self.metadata.name.as_deref().unwrap_or("unknown"),
                "Policy has no pattern_matching, it cannot have been stored in Keto"
            );
        }
        flavour
    }

    async fn document_exists(
        &self,
        engine: &dyn AcpEngine,
        flavour: Flavour,
        id: &str,
    ) -> Result<bool, EngineError> {
        Ok(engine.get_policy(flavour, id).await?.is_some())
    }

    async fn upsert_document(
        &self,
        engine: &dyn AcpEngine,
        flavour: Flavour,
        id: String,
    ) -> Result<(), EngineError> {
        let document = mapper::policy_document(id, &self.spec);
        engine.upsert_policy(flavour, &document).await?;
        Ok(())
    }

    async fn delete_document(
        &self,
        engine: &dyn AcpEngine,
        flavour: Flavour,
        id: &str,
    ) -> Result<(), EngineError> {
        engine.delete_policy(flavour, id).await
    }
}

#[async_trait]
impl ManagedResource for Role {
    const KIND: ResourceKind = ResourceKind::Role;

    fn reconciliation_status(&self) -> Option<&ReconciliationStatus> {
        self.status.as_ref()
    }

    fn upsert_flavour(&self) -> Result<Flavour, ReconcilerError> {
        Ok(mapper::role_flavour(&self.spec))
    }

    fn cleanup_flavour(&self) -> Option<Flavour> {
        Some(mapper::role_flavour(&self.spec))
    }

    async fn document_exists(
        &self,
        engine: &dyn AcpEngine,
        flavour: Flavour,
        id: &str,
    ) -> Result<bool, EngineError> {
        Ok(engine.get_role(flavour, id).await?.is_some())
    }

    async fn upsert_document(
        &self,
        engine: &dyn AcpEngine,
        flavour: Flavour,
        id: String,
    ) -> Result<(), EngineError> {
        let document = mapper::role_document(id, &self.spec);
        engine.upsert_role(flavour, &document).await?;
        Ok(())
    }

    async fn delete_document(
        &self,
        engine: &dyn AcpEngine,
        flavour: Flavour,
        id: &str,
    ) -> Result<(), EngineError> {
        engine.delete_role(flavour, id).await
    }
}
