//! Stackwright — declarative resource composition for serverless stacks.
//!
//! Typed resources, attribute references resolved at materialization time,
//! leveled topological creation with automatic rollback, and reverse-order
//! best-effort teardown. Provisioning is delegated to a [`provider::Provisioner`].

pub mod cli;
pub mod core;
pub mod provider;
pub mod resources;
pub mod tripwire;
