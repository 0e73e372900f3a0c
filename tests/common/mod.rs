//! Common test utilities
//!
//! In-memory stand-ins for the Kubernetes API and the Keto ACP engine, plus
//! shared rustls setup for the tests that talk HTTP.

#![allow(dead_code, reason = "each test binary uses a different subset")]

use async_trait::async_trait;
use keto_maester::constants::FINALIZER_NAME;
use keto_maester::crd::{Effect, PatternMatching, Policy, PolicySpec, ReconciliationStatus, Role, RoleSpec};
use keto_maester::keto::{AcpEngine, EngineError, Flavour, PolicyDocument, RoleDocument};
use keto_maester::controller::reconciler::{ManagedResource, ResourceKey, ResourceStore, StoreError};
use kube::Resource;
use reqwest::StatusCode;
use serde_json::json;
use std::collections::HashMap;
use std::sync::{Mutex, Once};

static RUSTLS_INIT: Once = Once::new();

/// Initialize rustls crypto provider for tests
///
/// Uses a `Once` to ensure it's only called once per test binary.
pub fn init_rustls() {
    RUSTLS_INIT.call_once(|| {
        // The pact mock server may already have installed a provider
        if rustls::crypto::CryptoProvider::get_default().is_none() {
            rustls::crypto::ring::default_provider()
                .install_default()
                .expect("Failed to install rustls crypto provider");
        }
    });
}

/// Policy `default/p1` as in the ORY Keto documentation
pub fn sample_policy(name: &str) -> Policy {
    let mut policy = Policy::new(
        name,
        PolicySpec {
            pattern_matching: Some(PatternMatching::Exact),
            description: Some("allow maria to list photos".to_string()),
            subjects: vec!["users:maria".to_string()],
            actions: vec!["list".to_string()],
            effect: Some(Effect::Allow),
            resources: vec!["resources:photos".to_string()],
            conditions: None,
        },
    );
    policy.metadata.namespace = Some("default".to_string());
    policy
}

pub fn sample_role(name: &str) -> Role {
    let mut role = Role::new(
        name,
        RoleSpec {
            members: vec!["users:maria".to_string(), "users:peter".to_string()],
            pattern_matching: None,
        },
    );
    role.metadata.namespace = Some("default".to_string());
    role
}

/// Kubernetes API stand-in
///
/// Emulates what the reconciler relies on: generations bumped on spec
/// changes, `resourceVersion` preconditions and removal of resources whose
/// deletion was requested once their last finalizer is gone.
pub struct InMemoryStore<K> {
    objects: Mutex<HashMap<ResourceKey, K>>,
    next_version: Mutex<u64>,
    pending_conflicts: Mutex<u32>,
    status_writes: Mutex<u32>,
}

impl<K: ManagedResource> Default for InMemoryStore<K> {
    fn default() -> Self {
        Self {
            objects: Mutex::new(HashMap::new()),
            next_version: Mutex::new(1),
            pending_conflicts: Mutex::new(0),
            status_writes: Mutex::new(0),
        }
    }
}

impl<K: ManagedResource> InMemoryStore<K> {
    fn bump_version(&self, resource: &mut K) {
        let mut next = self.next_version.lock().unwrap();
        resource.meta_mut().resource_version = Some(next.to_string());
        *next += 1;
    }

    /// Create a resource, as `kubectl apply` would
    pub fn create(&self, mut resource: K) -> ResourceKey {
        let key = ResourceKey::of(&resource).expect("resource needs a namespace and a name");
        resource.meta_mut().generation = Some(1);
        self.bump_version(&mut resource);
        self.objects.lock().unwrap().insert(key.clone(), resource);
        key
    }

    pub fn get_now(&self, key: &ResourceKey) -> Option<K> {
        self.objects.lock().unwrap().get(key).cloned()
    }

    pub fn finalizers(&self, key: &ResourceKey) -> Vec<String> {
        self.get_now(key)
            .and_then(|r| r.meta().finalizers.clone())
            .unwrap_or_default()
    }

    pub fn has_finalizer(&self, key: &ResourceKey) -> bool {
        self.finalizers(key).iter().any(|f| f == FINALIZER_NAME)
    }

    pub fn status(&self, key: &ResourceKey) -> Option<ReconciliationStatus> {
        self.get_now(key)
            .and_then(|r| r.reconciliation_status().cloned())
    }

    pub fn status_writes(&self) -> u32 {
        *self.status_writes.lock().unwrap()
    }

    /// Change the spec, bumping the generation
    pub fn edit(&self, key: &ResourceKey, edit: impl FnOnce(&mut K)) {
        let mut objects = self.objects.lock().unwrap();
        let resource = objects.get_mut(key).expect("resource exists");
        edit(resource);
        let generation = resource.meta().generation.unwrap_or(0);
        resource.meta_mut().generation = Some(generation + 1);
        self.bump_version(resource);
    }

    /// `kubectl delete`: sets the deletion timestamp, or removes the
    /// resource right away when it carries no finalizers
    pub fn request_deletion(&self, key: &ResourceKey) {
        let mut objects = self.objects.lock().unwrap();
        let Some(resource) = objects.get_mut(key) else {
            return;
        };
        if resource.meta().finalizers.as_ref().is_none_or(Vec::is_empty) {
            objects.remove(key);
            return;
        }
        resource.meta_mut().deletion_timestamp =
            serde_json::from_value(json!("2026-01-01T00:00:00Z")).unwrap();
        self.bump_version(resource);
    }

    /// Make the next `count` writes fail as if somebody else wrote first
    pub fn fail_next_writes_with_conflict(&self, count: u32) {
        *self.pending_conflicts.lock().unwrap() = count;
    }

    fn check_write(&self, resource: &K) -> Result<ResourceKey, StoreError> {
        let key = ResourceKey::of(resource).ok_or(StoreError::NotFound)?;
        {
            let mut pending = self.pending_conflicts.lock().unwrap();
            if *pending > 0 {
                *pending -= 1;
                return Err(StoreError::Conflict);
            }
        }
        let objects = self.objects.lock().unwrap();
        let stored = objects.get(&key).ok_or(StoreError::NotFound)?;
        if stored.meta().resource_version != resource.meta().resource_version {
            return Err(StoreError::Conflict);
        }
        Ok(key)
    }
}

#[async_trait]
impl<K: ManagedResource> ResourceStore<K> for InMemoryStore<K> {
    async fn get(&self, key: &ResourceKey) -> Result<Option<K>, StoreError> {
        Ok(self.get_now(key))
    }

    async fn update_finalizers(
        &self,
        resource: &K,
        finalizers: Vec<String>,
    ) -> Result<(), StoreError> {
        let key = self.check_write(resource)?;
        let mut objects = self.objects.lock().unwrap();
        let stored = objects.get_mut(&key).ok_or(StoreError::NotFound)?;
        stored.meta_mut().finalizers = Some(finalizers);

        let releasable = stored.meta().deletion_timestamp.is_some()
            && stored.meta().finalizers.as_ref().is_none_or(Vec::is_empty);
        if releasable {
            objects.remove(&key);
        } else {
            self.bump_version(stored);
        }
        Ok(())
    }

    async fn update_status(
        &self,
        resource: &K,
        status: &ReconciliationStatus,
    ) -> Result<(), StoreError> {
        let key = self.check_write(resource)?;
        let mut objects = self.objects.lock().unwrap();
        let stored = objects.get_mut(&key).ok_or(StoreError::NotFound)?;

        let mut value = serde_json::to_value(&*stored).unwrap();
        value["status"] = serde_json::to_value(status).unwrap();
        *stored = serde_json::from_value(value).unwrap();
        self.bump_version(stored);

        *self.status_writes.lock().unwrap() += 1;
        Ok(())
    }
}

/// One call received by [`FakeEngine`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineCall {
    GetPolicy(Flavour, String),
    UpsertPolicy(Flavour, String),
    DeletePolicy(Flavour, String),
    GetRole(Flavour, String),
    UpsertRole(Flavour, String),
    DeleteRole(Flavour, String),
}

/// Keto ACP engine stand-in with failure injection
#[derive(Default)]
pub struct FakeEngine {
    policies: Mutex<HashMap<(Flavour, String), PolicyDocument>>,
    roles: Mutex<HashMap<(Flavour, String), RoleDocument>>,
    calls: Mutex<Vec<EngineCall>>,
    upsert_status: Mutex<Option<StatusCode>>,
    delete_status: Mutex<Option<StatusCode>>,
    unreachable: Mutex<bool>,
}

impl FakeEngine {
    pub fn calls(&self) -> Vec<EngineCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    pub fn upserts(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, EngineCall::UpsertPolicy(..) | EngineCall::UpsertRole(..)))
            .count()
    }

    pub fn policy(&self, flavour: Flavour, id: &str) -> Option<PolicyDocument> {
        self.policies
            .lock()
            .unwrap()
            .get(&(flavour, id.to_string()))
            .cloned()
    }

    pub fn role(&self, flavour: Flavour, id: &str) -> Option<RoleDocument> {
        self.roles
            .lock()
            .unwrap()
            .get(&(flavour, id.to_string()))
            .cloned()
    }

    /// Drop a policy behind the controller's back
    pub fn forget_policy(&self, flavour: Flavour, id: &str) {
        self.policies.lock().unwrap().remove(&(flavour, id.to_string()));
    }

    /// Answer upserts with `status`, `None` restores normal behavior
    pub fn fail_upserts_with(&self, status: Option<StatusCode>) {
        *self.upsert_status.lock().unwrap() = status;
    }

    /// Answer deletes with `status`, `None` restores normal behavior
    pub fn fail_deletes_with(&self, status: Option<StatusCode>) {
        *self.delete_status.lock().unwrap() = status;
    }

    /// Fail every call at the transport level
    pub fn set_unreachable(&self, unreachable: bool) {
        *self.unreachable.lock().unwrap() = unreachable;
    }

    fn record(&self, call: EngineCall, method: &str, path: String) -> Result<(), EngineError> {
        self.calls.lock().unwrap().push(call);
        if *self.unreachable.lock().unwrap() {
            return Err(EngineError::Transport {
                method: method.to_string(),
                url: format!("http://keto:4456{path}"),
                source: "connection refused".into(),
            });
        }
        Ok(())
    }

    fn injected(&self, status: &Mutex<Option<StatusCode>>, method: &str, path: String) -> Result<(), EngineError> {
        match *status.lock().unwrap() {
            Some(status) => Err(EngineError::UnexpectedStatus {
                method: method.to_string(),
                url: format!("http://keto:4456{path}"),
                status,
            }),
            None => Ok(()),
        }
    }
}

fn path(flavour: Flavour, collection: &str, id: Option<&str>) -> String {
    match id {
        Some(id) => format!("/engines/acp/ory/{flavour}/{collection}/{id}"),
        None => format!("/engines/acp/ory/{flavour}/{collection}"),
    }
}

#[async_trait]
impl AcpEngine for FakeEngine {
    async fn get_policy(&self, flavour: Flavour, id: &str) -> Result<Option<PolicyDocument>, EngineError> {
        self.record(EngineCall::GetPolicy(flavour, id.to_string()), "GET", path(flavour, "policies", Some(id)))?;
        Ok(self.policy(flavour, id))
    }

    async fn list_policies(&self, flavour: Flavour) -> Result<Vec<PolicyDocument>, EngineError> {
        Ok(self
            .policies
            .lock()
            .unwrap()
            .iter()
            .filter(|((f, _), _)| *f == flavour)
            .map(|(_, p)| p.clone())
            .collect())
    }

    async fn upsert_policy(&self, flavour: Flavour, policy: &PolicyDocument) -> Result<PolicyDocument, EngineError> {
        let collection = path(flavour, "policies", None);
        self.record(EngineCall::UpsertPolicy(flavour, policy.id.clone()), "PUT", collection.clone())?;
        self.injected(&self.upsert_status, "PUT", collection)?;
        self.policies
            .lock()
            .unwrap()
            .insert((flavour, policy.id.clone()), policy.clone());
        Ok(policy.clone())
    }

    async fn delete_policy(&self, flavour: Flavour, id: &str) -> Result<(), EngineError> {
        let path = path(flavour, "policies", Some(id));
        self.record(EngineCall::DeletePolicy(flavour, id.to_string()), "DELETE", path.clone())?;
        self.injected(&self.delete_status, "DELETE", path)?;
        // A missing document is a 404, which counts as deleted
        self.policies.lock().unwrap().remove(&(flavour, id.to_string()));
        Ok(())
    }

    async fn get_role(&self, flavour: Flavour, id: &str) -> Result<Option<RoleDocument>, EngineError> {
        self.record(EngineCall::GetRole(flavour, id.to_string()), "GET", path(flavour, "roles", Some(id)))?;
        Ok(self.role(flavour, id))
    }

    async fn list_roles(&self, flavour: Flavour) -> Result<Vec<RoleDocument>, EngineError> {
        Ok(self
            .roles
            .lock()
            .unwrap()
            .iter()
            .filter(|((f, _), _)| *f == flavour)
            .map(|(_, r)| r.clone())
            .collect())
    }

    async fn upsert_role(&self, flavour: Flavour, role: &RoleDocument) -> Result<RoleDocument, EngineError> {
        let collection = path(flavour, "roles", None);
        self.record(EngineCall::UpsertRole(flavour, role.id.clone()), "PUT", collection.clone())?;
        self.injected(&self.upsert_status, "PUT", collection)?;
        self.roles
            .lock()
            .unwrap()
            .insert((flavour, role.id.clone()), role.clone());
        Ok(role.clone())
    }

    async fn delete_role(&self, flavour: Flavour, id: &str) -> Result<(), EngineError> {
        let path = path(flavour, "roles", Some(id));
        self.record(EngineCall::DeleteRole(flavour, id.to_string()), "DELETE", path.clone())?;
        self.injected(&self.delete_status, "DELETE", path)?;
        self.roles.lock().unwrap().remove(&(flavour, id.to_string()));
        Ok(())
    }
}
