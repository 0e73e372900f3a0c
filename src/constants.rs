//! # Constants
//!
//! Shared constants used throughout the controller.
//!
//! Defaults can be overridden through flags or environment variables, see
//! [`crate::config::ControllerConfig`].

/// Finalizer marker registered on every managed resource
pub const FINALIZER_NAME: &str = "finalizer.ory.keto.sh";

/// API group of the Policy and Role custom resources
pub const API_GROUP: &str = "keto.ory.sh";

/// Field manager used for status and metadata patches
pub const FIELD_MANAGER: &str = "keto-maester";

/// Default port of the Keto admin API
pub const DEFAULT_KETO_PORT: u16 = 4456;

/// Default minimum interval at which every resource is re-reconciled
pub const DEFAULT_SYNC_PERIOD: &str = "10h";

/// Default HTTP server port for metrics and health probes
pub const DEFAULT_METRICS_PORT: u16 = 8080;

/// Default timeout for a single request to the Keto admin API (seconds)
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Default maximum number of reconciliations running at the same time, per kind
pub const DEFAULT_MAX_CONCURRENT_RECONCILIATIONS: u16 = 10;

/// Default Fibonacci backoff floor after a failed reconciliation (seconds)
pub const DEFAULT_BACKOFF_MIN_SECS: u64 = 5;

/// Default Fibonacci backoff ceiling after a failed reconciliation (seconds)
pub const DEFAULT_BACKOFF_MAX_SECS: u64 = 300;

/// How many times a reconcile re-reads and retries after a write conflict
pub const MAX_CONFLICT_RETRIES: u32 = 3;

/// Requeue delay when conflicts persist beyond [`MAX_CONFLICT_RETRIES`] (seconds)
pub const CONFLICT_REQUEUE_SECS: u64 = 1;

/// Default HTTP server startup timeout (how long to wait for server to be ready)
pub const DEFAULT_SERVER_STARTUP_TIMEOUT_SECS: u64 = 10;

/// Default HTTP server readiness poll interval
pub const DEFAULT_SERVER_POLL_INTERVAL_MS: u64 = 50;

/// Default name of the `Lease` held by the active replica
pub const DEFAULT_LEADER_ELECTION_LEASE_NAME: &str = "keto-maester-leader";

/// Default namespace of the leader election `Lease`
pub const DEFAULT_LEADER_ELECTION_NAMESPACE: &str = "default";

/// How long a lease stays valid without renewal (seconds)
pub const DEFAULT_LEASE_DURATION_SECS: u64 = 15;

/// Interval between lease renewals and acquisition attempts (seconds)
pub const DEFAULT_LEASE_RENEW_INTERVAL_SECS: u64 = 5;
