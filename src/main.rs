//! # Keto Maester
//!
//! A Kubernetes controller that keeps ORY Keto ACP engine policies and roles
//! in sync with `Policy` and `Role` custom resources.
//!
//! ## Overview
//!
//! 1. **Watching resources** - Watches `Policy` and `Role` resources in all namespaces
//! 2. **Finalizers** - Registers a finalizer so Keto is cleaned up before a resource disappears
//! 3. **Keto sync** - Upserts each resource as `<namespace>:<name>` in the ACP engine
//! 4. **Status** - Reports the observed generation and the last error on every resource
//!
//! Every flag can be set through the environment, see `keto-maester --help`.

use anyhow::Result;
use clap::Parser;
use keto_maester::config::ControllerConfig;
use keto_maester::runtime::{initialization::initialize, watch_loop::run_watch_loop};

#[tokio::main]
async fn main() -> Result<()> {
    let config = ControllerConfig::parse();
    let init = initialize(&config).await?;
    run_watch_loop(init).await
}
