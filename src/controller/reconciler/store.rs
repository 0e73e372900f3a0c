//! # Resource Store
//!
//! Reads and writes of managed resources in the cluster.
//!
//! Every write carries the `resourceVersion` the resource was read at, so a
//! write based on stale state fails with [`StoreError::Conflict`] instead of
//! overwriting a concurrent change.

use crate::constants::FIELD_MANAGER;
use crate::controller::reconciler::ManagedResource;
use crate::crd::ReconciliationStatus;
use async_trait::async_trait;
use kube::api::{Api, Patch, PatchParams};
use kube::{Client, Resource};
use serde_json::json;
use std::fmt;
use std::marker::PhantomData;
use tracing::debug;

/// Namespace and name of a resource
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceKey {
    pub namespace: String,
    pub name: String,
}

impl ResourceKey {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Key of `resource`, `None` unless it has both a namespace and a name
    pub fn of<K: Resource>(resource: &K) -> Option<Self> {
        let meta = resource.meta();
        Some(Self::new(meta.namespace.clone()?, meta.name.clone()?))
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("resource not found")]
    NotFound,

    /// The resource changed since it was read
    #[error("conflicting update, the resource was modified since it was read")]
    Conflict,

    #[error("Kubernetes API request failed: {0}")]
    Api(#[source] kube::Error),
}

impl From<kube::Error> for StoreError {
    fn from(error: kube::Error) -> Self {
        match error {
            kube::Error::Api(api_err) if api_err.code == 409 => StoreError::Conflict,
            kube::Error::Api(api_err) if api_err.code == 404 => StoreError::NotFound,
            other => StoreError::Api(other),
        }
    }
}

/// Access to managed resources of kind `K`
#[async_trait]
pub trait ResourceStore<K>: Send + Sync {
    /// Current state of the resource, `None` once it is gone
    async fn get(&self, key: &ResourceKey) -> Result<Option<K>, StoreError>;

    /// Replace the finalizers of `resource`
    async fn update_finalizers(&self, resource: &K, finalizers: Vec<String>)
        -> Result<(), StoreError>;

    /// Replace the status of `resource`
    async fn update_status(
        &self,
        resource: &K,
        status: &ReconciliationStatus,
    ) -> Result<(), StoreError>;
}

/// [`ResourceStore`] backed by the Kubernetes API
pub struct KubeStore<K> {
    client: Client,
    kind: PhantomData<fn() -> K>,
}

impl<K> KubeStore<K> {
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self {
            client,
            kind: PhantomData,
        }
    }
}

impl<K> fmt::Debug for KubeStore<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KubeStore").finish_non_exhaustive()
    }
}

impl<K: ManagedResource> KubeStore<K> {
    fn api(&self, namespace: &str) -> Api<K> {
        Api::namespaced(self.client.clone(), namespace)
    }

    fn key(resource: &K) -> Result<ResourceKey, StoreError> {
        ResourceKey::of(resource).ok_or(StoreError::NotFound)
    }

    fn patch_params() -> PatchParams {
        PatchParams {
            field_manager: Some(FIELD_MANAGER.to_string()),
            ..PatchParams::default()
        }
    }
}

#[async_trait]
impl<K: ManagedResource> ResourceStore<K> for KubeStore<K> {
    async fn get(&self, key: &ResourceKey) -> Result<Option<K>, StoreError> {
        Ok(self.api(&key.namespace).get_opt(&key.name).await?)
    }

    async fn update_finalizers(
        &self,
        resource: &K,
        finalizers: Vec<String>,
    ) -> Result<(), StoreError> {
        let key = Self::key(resource)?;
        let patch = json!({
            "metadata": {
                "finalizers": finalizers,
                "resourceVersion": resource.meta().resource_version,
            }
        });

        self.api(&key.namespace)
            .patch(&key.name, &Self::patch_params(), &Patch::Merge(&patch))
            .await?;
        debug!(resource.namespace = %key.namespace, resource.name = %key.name, "Updated finalizers");
        Ok(())
    }

    async fn update_status(
        &self,
        resource: &K,
        status: &ReconciliationStatus,
    ) -> Result<(), StoreError> {
        let key = Self::key(resource)?;
        let patch = json!({
            "metadata": {
                "resourceVersion": resource.meta().resource_version,
            },
            "status": status,
        });

        self.api(&key.namespace)
            .patch_status(&key.name, &Self::patch_params(), &Patch::Merge(&patch))
            .await?;
        debug!(resource.namespace = %key.namespace, resource.name = %key.name, "Updated status");
        Ok(())
    }
}
