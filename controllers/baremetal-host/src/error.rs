//! Controller-specific error types.
//!
//! `ReconcileError` is what a single reconcile invocation can fail with;
//! every variant is reported to the dispatch loop, which retries with
//! backoff. `ControllerError` covers process bootstrap and the watch loop.

use host_store::StoreError;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur during process startup or while watching.
#[derive(Debug, Error)]
pub enum ControllerError {
    /// Kubernetes API error
    #[error("Kubernetes error: {0}")]
    Kube(#[from] kube::Error),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Resource watch failed
    #[error("Resource watch failed: {0}")]
    Watch(String),
}

/// Out-of-band cleanup failed; the finalizer stays in place.
#[derive(Debug, Error)]
#[error("Cleanup of BareMetalHost {host} failed: {reason}")]
pub struct CleanupError {
    /// `namespace/name` of the host
    pub host: String,
    /// What went wrong
    pub reason: String,
}

/// Errors from one reconcile invocation.
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// A fetch or persist against the record store failed
    #[error("Failed to {action}: {source}")]
    Store {
        /// What the reconciler was doing
        action: &'static str,
        /// Underlying store error
        #[source]
        source: StoreError,
    },

    /// Out-of-band cleanup failed
    #[error(transparent)]
    Cleanup(#[from] CleanupError),

    /// The invocation deadline elapsed before it finished
    #[error("Reconcile timed out after {0:?}")]
    Timeout(Duration),
}

impl ReconcileError {
    pub(crate) fn store(action: &'static str) -> impl FnOnce(StoreError) -> Self {
        move |source| ReconcileError::Store { action, source }
    }

    /// Whether the store reported the host as gone.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            ReconcileError::Store {
                source: StoreError::NotFound(_),
                ..
            }
        )
    }

    /// Whether retrying can help. Non-retryable errors indicate a bug and
    /// are logged loudly by the dispatch loop, but are still requeued so the
    /// record is never silently dropped.
    pub fn is_retryable(&self) -> bool {
        match self {
            ReconcileError::Store { source, .. } => source.is_retryable(),
            ReconcileError::Cleanup(_) | ReconcileError::Timeout(_) => true,
        }
    }
}
