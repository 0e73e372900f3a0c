//! # Configuration
//!
//! Controller settings, read from flags or the environment.

mod controller;
mod duration;

pub use controller::ControllerConfig;
pub use duration::parse_kubernetes_duration;
