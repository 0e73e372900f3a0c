//! # Leader Election
//!
//! Lease based leader election. Only the replica holding the
//! `coordination.k8s.io/v1` `Lease` runs the controllers, which keeps
//! reconciliations of a given resource from overlapping across replicas.
//!
//! A lease is free when nobody holds it or when its holder stopped renewing it
//! for longer than `leaseDurationSeconds`. Every write carries the
//! `resourceVersion` it was based on, so two replicas racing for a free lease
//! cannot both win.

use crate::config::ControllerConfig;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use k8s_openapi::api::coordination::v1::Lease;
use kube::api::{Api, PostParams};
use kube::Client;
use serde_json::{json, Value};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// State of the lease as far as the election is concerned
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LeaseRecord {
    pub holder_identity: Option<String>,
    pub acquire_time: Option<DateTime<Utc>>,
    pub renew_time: Option<DateTime<Utc>>,
    pub lease_duration_seconds: i32,
    pub lease_transitions: i32,
    /// Version the record was read at, `None` for a lease that does not exist yet
    pub resource_version: Option<String>,
}

impl LeaseRecord {
    fn holder(&self) -> Option<&str> {
        self.holder_identity
            .as_deref()
            .filter(|holder| !holder.is_empty())
    }

    /// Whether the lease has not been renewed within its duration
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        let Some(last_renewal) = self.renew_time.or(self.acquire_time) else {
            return true;
        };
        last_renewal + chrono::Duration::seconds(i64::from(self.lease_duration_seconds)) < now
    }

    /// Whether `identity` may take or keep the lease at `now`
    #[must_use]
    pub fn can_be_acquired_by(&self, identity: &str, now: DateTime<Utc>) -> bool {
        match self.holder() {
            None => true,
            Some(holder) if holder == identity => true,
            Some(_) => self.is_expired(now),
        }
    }

    /// The record `identity` writes to take or renew the lease
    #[must_use]
    pub fn acquired_by(&self, identity: &str, now: DateTime<Utc>, lease_duration_seconds: i32) -> Self {
        let renewal = self.holder() == Some(identity);
        Self {
            holder_identity: Some(identity.to_string()),
            acquire_time: if renewal { self.acquire_time.or(Some(now)) } else { Some(now) },
            renew_time: Some(now),
            lease_duration_seconds,
            lease_transitions: if renewal || (self.holder().is_none() && self.resource_version.is_none()) {
                self.lease_transitions
            } else {
                self.lease_transitions.saturating_add(1)
            },
            resource_version: self.resource_version.clone(),
        }
    }
}

/// Storage of the election lease
#[async_trait]
pub trait LeaseStore: Send + Sync {
    async fn get(&self) -> Result<Option<LeaseRecord>>;

    /// Create the lease, `false` when another replica created it first
    async fn create(&self, record: &LeaseRecord) -> Result<bool>;

    /// Replace the lease, `false` when it changed since `record` was read
    async fn replace(&self, record: &LeaseRecord) -> Result<bool>;
}

/// [`LeaseStore`] backed by a `Lease` in the Kubernetes API
pub struct KubeLeaseStore {
    api: Api<Lease>,
    name: String,
}

impl KubeLeaseStore {
    #[must_use]
    pub fn new(client: Client, namespace: &str, name: &str) -> Self {
        Self {
            api: Api::namespaced(client, namespace),
            name: name.to_string(),
        }
    }

    fn to_lease(&self, record: &LeaseRecord) -> Result<Lease> {
        let micro_time =
            |time: Option<DateTime<Utc>>| time.map(|t| t.to_rfc3339_opts(SecondsFormat::Micros, true));
        serde_json::from_value(json!({
            "apiVersion": "coordination.k8s.io/v1",
            "kind": "Lease",
            "metadata": {
                "name": self.name,
                "resourceVersion": record.resource_version,
            },
            "spec": {
                "holderIdentity": record.holder_identity,
                "acquireTime": micro_time(record.acquire_time),
                "renewTime": micro_time(record.renew_time),
                "leaseDurationSeconds": record.lease_duration_seconds,
                "leaseTransitions": record.lease_transitions,
            }
        }))
        .context("Failed to build Lease")
    }
}

impl fmt::Debug for KubeLeaseStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KubeLeaseStore")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Read the election fields of a `Lease`
pub fn lease_record(lease: &Lease) -> Result<LeaseRecord> {
    let spec = serde_json::to_value(&lease.spec).context("Failed to read Lease spec")?;
    let time = |field: &str| -> Result<Option<DateTime<Utc>>> {
        spec.get(field)
            .and_then(Value::as_str)
            .map(|raw| {
                DateTime::parse_from_rfc3339(raw)
                    .map(|t| t.with_timezone(&Utc))
                    .with_context(|| format!("Invalid Lease {field} '{raw}'"))
            })
            .transpose()
    };
    let int = |field: &str| {
        spec.get(field)
            .and_then(Value::as_i64)
            .and_then(|value| i32::try_from(value).ok())
            .unwrap_or_default()
    };

    Ok(LeaseRecord {
        holder_identity: spec
            .get("holderIdentity")
            .and_then(Value::as_str)
            .map(str::to_string),
        acquire_time: time("acquireTime")?,
        renew_time: time("renewTime")?,
        lease_duration_seconds: int("leaseDurationSeconds"),
        lease_transitions: int("leaseTransitions"),
        resource_version: lease.metadata.resource_version.clone(),
    })
}

fn lost_race(error: &kube::Error) -> bool {
    matches!(error, kube::Error::Api(api_err) if api_err.code == 409 || api_err.code == 404)
}

#[async_trait]
impl LeaseStore for KubeLeaseStore {
    async fn get(&self) -> Result<Option<LeaseRecord>> {
        self.api
            .get_opt(&self.name)
            .await
            .with_context(|| format!("Failed to get Lease '{}'", self.name))?
            .as_ref()
            .map(lease_record)
            .transpose()
    }

    async fn create(&self, record: &LeaseRecord) -> Result<bool> {
        match self.api.create(&PostParams::default(), &self.to_lease(record)?).await {
            Ok(_) => Ok(true),
            Err(e) if lost_race(&e) => Ok(false),
            Err(e) => Err(e).with_context(|| format!("Failed to create Lease '{}'", self.name)),
        }
    }

    async fn replace(&self, record: &LeaseRecord) -> Result<bool> {
        match self
            .api
            .replace(&self.name, &PostParams::default(), &self.to_lease(record)?)
            .await
        {
            Ok(_) => Ok(true),
            Err(e) if lost_race(&e) => Ok(false),
            Err(e) => Err(e).with_context(|| format!("Failed to update Lease '{}'", self.name)),
        }
    }
}

/// Timing and identity of one election participant
#[derive(Debug, Clone)]
pub struct LeaderElectionSettings {
    pub identity: String,
    pub lease_duration: Duration,
    pub renew_interval: Duration,
}

impl LeaderElectionSettings {
    #[must_use]
    pub fn from_config(config: &ControllerConfig) -> Self {
        Self {
            identity: config.leader_election_identity(),
            lease_duration: Duration::from_secs(config.lease_duration_secs),
            renew_interval: Duration::from_secs(config.lease_renew_interval_secs),
        }
    }

    fn lease_duration_seconds(&self) -> i32 {
        i32::try_from(self.lease_duration.as_secs()).unwrap_or(i32::MAX)
    }
}

/// Participant in the election
pub struct LeaderElector {
    store: Arc<dyn LeaseStore>,
    settings: LeaderElectionSettings,
}

impl fmt::Debug for LeaderElector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LeaderElector")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl LeaderElector {
    pub fn new(store: Arc<dyn LeaseStore>, settings: LeaderElectionSettings) -> Self {
        Self { store, settings }
    }

    /// Elector for the lease named in `config`
    pub fn from_config(client: Client, config: &ControllerConfig) -> Self {
        let store = KubeLeaseStore::new(
            client,
            &config.leader_election_namespace,
            &config.leader_election_lease_name,
        );
        Self::new(Arc::new(store), LeaderElectionSettings::from_config(config))
    }

    #[must_use]
    pub fn identity(&self) -> &str {
        &self.settings.identity
    }

    /// Take or renew the lease, returns whether this replica holds it
    pub async fn try_acquire_or_renew(&self, now: DateTime<Utc>) -> Result<bool> {
        let identity = self.settings.identity.as_str();
        let duration = self.settings.lease_duration_seconds();

        let Some(current) = self.store.get().await? else {
            return self
                .store
                .create(&LeaseRecord::default().acquired_by(identity, now, duration))
                .await;
        };

        if !current.can_be_acquired_by(identity, now) {
            debug!(
                leader = current.holder().unwrap_or_default(),
                "Lease is held by another replica"
            );
            return Ok(false);
        }
        self.store
            .replace(&current.acquired_by(identity, now, duration))
            .await
    }

    /// Wait until this replica holds the lease
    pub async fn acquire(&self) {
        info!(identity = %self.settings.identity, "Waiting for leadership");
        loop {
            match self.try_acquire_or_renew(Utc::now()).await {
                Ok(true) => {
                    info!(identity = %self.settings.identity, "Acquired leadership");
                    return;
                }
                Ok(false) => {}
                Err(e) => warn!(error = %e, "Failed to acquire leadership"),
            }
            tokio::time::sleep(self.settings.renew_interval).await;
        }
    }

    /// Keep renewing the lease, returns once leadership is lost
    ///
    /// Leadership is lost when another replica took the lease, or when no
    /// renewal succeeded for a whole lease duration.
    pub async fn hold(&self) -> anyhow::Error {
        let mut last_renewal = Instant::now();
        loop {
            tokio::time::sleep(self.settings.renew_interval).await;
            match self.try_acquire_or_renew(Utc::now()).await {
                Ok(true) => {
                    debug!("Renewed leadership");
                    last_renewal = Instant::now();
                }
                Ok(false) => return anyhow::anyhow!("Lease was taken over by another replica"),
                Err(e) => {
                    warn!(error = %e, "Failed to renew leadership");
                    if last_renewal.elapsed() >= self.settings.lease_duration {
                        return e.context("Lease could not be renewed within its duration");
                    }
                }
            }
        }
    }

    /// Give up the lease so another replica can take over right away
    pub async fn release(&self) {
        let result = async {
            let Some(current) = self.store.get().await? else {
                return Ok(false);
            };
            if current.holder() != Some(self.settings.identity.as_str()) {
                return Ok(false);
            }
            let released = LeaseRecord {
                holder_identity: None,
                renew_time: Some(Utc::now()),
                ..current
            };
            self.store.replace(&released).await
        }
        .await;

        match result {
            Ok(true) => info!("Released leadership"),
            Ok(false) => debug!("Lease not held, nothing to release"),
            Err(e) => warn!(error = %e, "Failed to release leadership"),
        }
    }
}
