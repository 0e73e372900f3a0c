//! keto-maester library
//!
//! Core functionality of the Keto Maester controller: the `Policy` and `Role`
//! custom resources, the ORY Keto ACP engine client and the reconciler that
//! keeps the two in sync.
//!
//! ## Quick Start
//!
//! ```rust
//! use keto_maester::prelude::*;
//! ```

pub mod config;
pub mod constants;
pub mod controller;
pub mod crd;
pub mod keto;
pub mod observability;
pub mod prelude;
pub mod runtime;
