//! # CRD Generator
//!
//! Prints the `Policy` and `Role` CustomResourceDefinitions as YAML.
//!
//! ## Usage
//!
//! ```bash
//! # Generate CRD YAML
//! cargo run --bin crdgen > config/crd/bases/keto.ory.sh.yaml
//!
//! # Generate and apply directly
//! cargo run --bin crdgen | kubectl apply -f -
//! ```

use keto_maester::crd::{Policy, Role};
use kube::core::CustomResourceExt;

fn main() {
    let documents = [Policy::crd(), Role::crd()]
        .iter()
        .map(serde_yaml::to_string)
        .collect::<Result<Vec<_>, _>>();

    match documents {
        Ok(documents) => {
            println!("# This file is auto-generated by crdgen");
            println!("# DO NOT EDIT THIS FILE MANUALLY");
            println!("# Change the resource types in src/crd/ instead");
            println!("#");
            for yaml in documents {
                println!("---");
                print!("{yaml}");
            }
        }
        Err(e) => {
            eprintln!("Failed to serialize CRD to YAML: {e}");
            std::process::exit(1);
        }
    }
}
