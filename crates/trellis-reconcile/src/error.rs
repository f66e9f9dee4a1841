//! Reconciler error types.

use thiserror::Error;

use trellis_state::{ResourceKind, StateError};

/// Errors that can occur during a reconcile pass.
#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("failed to ensure {kind} {name}: {source}")]
    Ensure {
        kind: ResourceKind,
        name: String,
        source: StateError,
    },

    #[error("substrate error: {0}")]
    State(#[from] StateError),
}

pub type ReconcileResult<T> = Result<T, ReconcileError>;
