//! SW-010: Provisioning collaborator seam.
//!
//! The core decides what to create or delete and in which order; a
//! [`Provisioner`] decides how the call reaches the cloud.

pub mod hook;
pub mod simulated;

use crate::core::types::{Outputs, ResourceKind};
use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

pub use hook::HookProvisioner;
pub use simulated::{Call, SimulatedProvisioner};

/// Resolved configuration handed to the provider.
pub type ResolvedConfig = serde_json::Map<String, serde_json::Value>;

/// Errors reported by a provisioning collaborator.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("provider rejected request: {0}")]
    Rejected(String),

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("provider did not return output '{attribute}'")]
    MissingOutput { attribute: String },

    #[error("resource not found: {0}")]
    NotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("protocol error: {0}")]
    Protocol(String),
}

/// Creates and deletes resources of every kind.
#[async_trait]
pub trait Provisioner: Send + Sync {
    /// Provider name for logs (e.g. "simulated", "hook").
    fn name(&self) -> &str;

    /// Create a resource; returns its outputs.
    async fn create(
        &self,
        kind: ResourceKind,
        name: &str,
        config: &ResolvedConfig,
    ) -> Result<Outputs, ProviderError>;

    /// Delete a previously created resource given its recorded outputs.
    async fn delete(
        &self,
        kind: ResourceKind,
        name: &str,
        outputs: &Outputs,
    ) -> Result<(), ProviderError>;
}
