//! SW-006: Stack error taxonomy.

use super::types::{AttrRef, ResourceKind};
use crate::provider::ProviderError;
use std::fmt;
use thiserror::Error;

/// What an automatic rollback achieved after a failed apply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RollbackOutcome {
    /// Nothing had been created yet.
    NothingToRollBack,
    /// Every created resource was deleted.
    Complete { deleted: Vec<String> },
    /// Some deletes failed; `leftover` must be cleaned up manually.
    Partial {
        deleted: Vec<String>,
        leftover: Vec<String>,
    },
}

impl RollbackOutcome {
    pub fn is_complete(&self) -> bool {
        !matches!(self, Self::Partial { .. })
    }

    pub fn leftover(&self) -> &[String] {
        match self {
            Self::Partial { leftover, .. } => leftover,
            _ => &[],
        }
    }
}

impl fmt::Display for RollbackOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NothingToRollBack => write!(f, "nothing to roll back"),
            Self::Complete { deleted } => {
                write!(f, "fully rolled back ({} resource(s) deleted)", deleted.len())
            }
            Self::Partial { leftover, .. } => write!(
                f,
                "rollback incomplete, manual cleanup required for: {}",
                leftover.join(", ")
            ),
        }
    }
}

/// One resource that could not be deleted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteFailure {
    pub resource: String,
    pub error: String,
}

/// Errors raised while building, planning, applying or destroying a stack.
#[derive(Debug, Error)]
pub enum StackError {
    #[error("duplicate resource name: {0}")]
    DuplicateName(String),

    #[error("unknown resource '{name}' (referenced by '{referenced_by}')")]
    UnknownResource { name: String, referenced_by: String },

    #[error("dependency cycle: {}", .path.join(" -> "))]
    Cycle { path: Vec<String> },

    /// Scheduler invariant violation: a reference was resolved before its
    /// target was materialized.
    #[error("unresolved reference {reference} in '{resource}': target not materialized; {rollback}")]
    UnresolvedReference {
        resource: String,
        reference: AttrRef,
        rollback: RollbackOutcome,
    },

    #[error("creation of '{resource}' ({kind}) failed: {source}{}; {rollback}", also_failed_suffix(.also_failed))]
    CreationFailed {
        resource: String,
        kind: ResourceKind,
        #[source]
        source: ProviderError,
        also_failed: Vec<String>,
        rollback: RollbackOutcome,
    },

    #[error("partial teardown: {} resource(s) survived: {}", .failures.len(), surviving_names(.failures))]
    PartialTeardown {
        deleted: Vec<String>,
        failures: Vec<DeleteFailure>,
    },

    #[error("invalid stack definition: {0}")]
    Invalid(String),

    #[error("state error: {0}")]
    State(String),
}

impl StackError {
    /// True for errors raised before any provider call was made.
    pub fn is_plan_time(&self) -> bool {
        matches!(
            self,
            Self::DuplicateName(_)
                | Self::UnknownResource { .. }
                | Self::Cycle { .. }
                | Self::Invalid(_)
        )
    }

    /// Resources that still exist after this error.
    pub fn surviving_resources(&self) -> Vec<String> {
        match self {
            Self::CreationFailed { rollback, .. } | Self::UnresolvedReference { rollback, .. } => {
                rollback.leftover().to_vec()
            }
            Self::PartialTeardown { failures, .. } => {
                failures.iter().map(|f| f.resource.clone()).collect()
            }
            _ => Vec::new(),
        }
    }
}

fn also_failed_suffix(also_failed: &[String]) -> String {
    if also_failed.is_empty() {
        String::new()
    } else {
        format!(" (also failed: {})", also_failed.join(", "))
    }
}

fn surviving_names(failures: &[DeleteFailure]) -> String {
    failures
        .iter()
        .map(|f| format!("{} ({})", f.resource, f.error))
        .collect::<Vec<_>>()
        .join(", ")
}
