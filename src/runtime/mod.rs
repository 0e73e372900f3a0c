//! # Runtime
//!
//! Controller startup and the watch loops of both managed kinds.
//!
//! - `initialization`: tracing, metrics, HTTP server and client setup
//! - `watch_loop`: one kube-runtime `Controller` per kind
//! - `leader_election`: `Lease` gate in front of the watch loops
//! - `error_policy`: backoff after failed reconciliations

pub mod error_policy;
pub mod initialization;
pub mod leader_election;
pub mod watch_loop;
