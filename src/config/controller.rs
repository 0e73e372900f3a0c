//! # Controller Configuration
//!
//! Controller-level settings. Every flag can also be set through an
//! environment variable, so the deployment can populate them from a ConfigMap
//! using `envFrom`.

use crate::config::parse_kubernetes_duration;
use crate::constants::{
    DEFAULT_BACKOFF_MAX_SECS, DEFAULT_BACKOFF_MIN_SECS, DEFAULT_KETO_PORT,
    DEFAULT_LEADER_ELECTION_LEASE_NAME, DEFAULT_LEADER_ELECTION_NAMESPACE,
    DEFAULT_LEASE_DURATION_SECS, DEFAULT_LEASE_RENEW_INTERVAL_SECS,
    DEFAULT_MAX_CONCURRENT_RECONCILIATIONS, DEFAULT_METRICS_PORT, DEFAULT_REQUEST_TIMEOUT_SECS,
    DEFAULT_SYNC_PERIOD,
};
use anyhow::{Context, Result};
use clap::Parser;
use reqwest::Url;
use std::time::Duration;

/// Keto Maester controller
///
/// Keeps ORY Keto ACP engine policies and roles in sync with `Policy` and
/// `Role` custom resources.
#[derive(Parser, Debug, Clone)]
#[command(name = "keto-maester", version, about, long_about = None)]
pub struct ControllerConfig {
    /// URL of the Keto admin API, without the port (e.g. http://keto-api.default.svc)
    #[arg(long, env = "KETO_URL")]
    pub keto_url: String,

    /// Port of the Keto admin API
    #[arg(long, env = "KETO_PORT", default_value_t = DEFAULT_KETO_PORT)]
    pub keto_port: u16,

    /// Value of the X-Forwarded-Proto header sent to Keto, if any
    #[arg(long, env = "FORWARDED_PROTO")]
    pub forwarded_proto: Option<String>,

    /// Value of the Origin header sent to Keto, if any
    #[arg(long, env = "ORIGIN")]
    pub origin: Option<String>,

    /// Minimum interval at which every resource is reconciled again (e.g. 10h, 1h30m)
    #[arg(long, env = "SYNC_PERIOD", default_value = DEFAULT_SYNC_PERIOD)]
    pub sync_period: String,

    /// Port of the metrics and health probe server
    #[arg(long, env = "METRICS_PORT", default_value_t = DEFAULT_METRICS_PORT)]
    pub metrics_port: u16,

    /// Timeout of a single request to Keto (seconds)
    #[arg(long, env = "REQUEST_TIMEOUT_SECS", default_value_t = DEFAULT_REQUEST_TIMEOUT_SECS)]
    pub request_timeout_secs: u64,

    /// Maximum number of reconciliations running at the same time, per kind
    #[arg(
        long,
        env = "MAX_CONCURRENT_RECONCILIATIONS",
        default_value_t = DEFAULT_MAX_CONCURRENT_RECONCILIATIONS
    )]
    pub max_concurrent_reconciliations: u16,

    /// Fibonacci backoff floor after a failed reconciliation (seconds)
    #[arg(long, env = "BACKOFF_MIN_SECS", default_value_t = DEFAULT_BACKOFF_MIN_SECS)]
    pub backoff_min_secs: u64,

    /// Fibonacci backoff ceiling after a failed reconciliation (seconds)
    #[arg(long, env = "BACKOFF_MAX_SECS", default_value_t = DEFAULT_BACKOFF_MAX_SECS)]
    pub backoff_max_secs: u64,

    /// Log format (text, json)
    #[arg(long, env = "LOG_FORMAT", default_value = "text")]
    pub log_format: String,

    /// Only run the controllers while holding a Lease, so a single replica is active
    #[arg(long, env = "ENABLE_LEADER_ELECTION")]
    pub enable_leader_election: bool,

    /// Name of the leader election Lease
    #[arg(
        long,
        env = "LEADER_ELECTION_LEASE_NAME",
        default_value = DEFAULT_LEADER_ELECTION_LEASE_NAME
    )]
    pub leader_election_lease_name: String,

    /// Namespace of the leader election Lease, usually the controller's own
    #[arg(
        long,
        env = "POD_NAMESPACE",
        default_value = DEFAULT_LEADER_ELECTION_NAMESPACE
    )]
    pub leader_election_namespace: String,

    /// Identity recorded in the Lease (defaults to the pod name, then the hostname)
    #[arg(long, env = "POD_NAME")]
    pub leader_election_identity: Option<String>,

    /// Validity of the Lease without renewal (seconds)
    #[arg(long, env = "LEASE_DURATION_SECS", default_value_t = DEFAULT_LEASE_DURATION_SECS)]
    pub lease_duration_secs: u64,

    /// Interval between Lease renewals (seconds)
    #[arg(
        long,
        env = "LEASE_RENEW_INTERVAL_SECS",
        default_value_t = DEFAULT_LEASE_RENEW_INTERVAL_SECS
    )]
    pub lease_renew_interval_secs: u64,
}

impl ControllerConfig {
    /// Base URL of the Keto admin API, `keto_url` with `keto_port` applied
    pub fn engine_base_url(&self) -> Result<Url> {
        let raw = self.keto_url.trim();
        if raw.is_empty() {
            return Err(anyhow::anyhow!("keto-url cannot be empty"));
        }

        let mut url =
            Url::parse(raw).with_context(|| format!("Invalid keto-url '{raw}'"))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(anyhow::anyhow!(
                "keto-url '{raw}' must use the http or https scheme"
            ));
        }
        if url.host_str().is_none_or(str::is_empty) {
            return Err(anyhow::anyhow!("keto-url '{raw}' has no host"));
        }

        if url.set_port(Some(self.keto_port)).is_err() {
            return Err(anyhow::anyhow!(
                "Cannot set port {} on keto-url '{raw}'",
                self.keto_port
            ));
        }
        Ok(url)
    }

    /// Parsed sync period
    pub fn sync_period(&self) -> Result<Duration> {
        parse_kubernetes_duration(&self.sync_period)
            .with_context(|| format!("Invalid sync-period '{}'", self.sync_period))
    }

    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Whether logs should be emitted as JSON
    #[must_use]
    pub fn json_logs(&self) -> bool {
        self.log_format.eq_ignore_ascii_case("json")
    }

    /// Identity of this replica in the leader election Lease
    #[must_use]
    pub fn leader_election_identity(&self) -> String {
        self.leader_election_identity
            .clone()
            .filter(|identity| !identity.trim().is_empty())
            .or_else(|| {
                std::env::var("HOSTNAME")
                    .ok()
                    .filter(|hostname| !hostname.is_empty())
            })
            .unwrap_or_else(|| format!("keto-maester-{}", std::process::id()))
    }

    /// Reject settings the controller cannot start with
    pub fn validate(&self) -> Result<()> {
        self.engine_base_url()?;
        self.sync_period()?;

        if self.request_timeout_secs == 0 {
            return Err(anyhow::anyhow!("request-timeout-secs must be greater than 0"));
        }
        if self.max_concurrent_reconciliations == 0 {
            return Err(anyhow::anyhow!(
                "max-concurrent-reconciliations must be greater than 0"
            ));
        }
        if self.enable_leader_election {
            if self.leader_election_lease_name.trim().is_empty()
                || self.leader_election_namespace.trim().is_empty()
            {
                return Err(anyhow::anyhow!(
                    "leader-election-lease-name and leader-election-namespace cannot be empty"
                ));
            }
            if self.lease_renew_interval_secs == 0
                || self.lease_renew_interval_secs >= self.lease_duration_secs
            {
                return Err(anyhow::anyhow!(
                    "lease-renew-interval-secs ({}) must be greater than 0 and less than lease-duration-secs ({})",
                    self.lease_renew_interval_secs,
                    self.lease_duration_secs
                ));
            }
        }
        if self.backoff_min_secs == 0 || self.backoff_min_secs > self.backoff_max_secs {
            return Err(anyhow::anyhow!(
                "backoff-min-secs ({}) must be greater than 0 and not exceed backoff-max-secs ({})",
                self.backoff_min_secs,
                self.backoff_max_secs
            ));
        }
        Ok(())
    }
}
