//! # Controller
//!
//! Core controller modules for Keto Maester.
//!
//! - `backoff`: Fibonacci backoff mechanism for retries
//! - `finalizer`: deletion lifecycle guard
//! - `mapper`: resource to Keto document translation
//! - `reconciler`: core reconciliation logic
//! - `server`: HTTP server for metrics and health checks

pub mod backoff;
pub mod finalizer;
pub mod mapper;
pub mod reconciler;
pub mod server;
