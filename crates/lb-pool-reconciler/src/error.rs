//! Reconciler error taxonomy.
//!
//! Variants identify the phase that failed: `DependencyNotReady` is the
//! precondition wait, `Mutation` the retry-wrapped remote call,
//! `Stabilization`/`CreatedNotConverged` the convergence waits. Only the
//! retry wrapper absorbs errors locally; everything else propagates on first
//! occurrence.

use thiserror::Error;

use crate::client::ClientError;
use crate::pool::SpecError;
use crate::retry::RetryError;
use crate::status::WaitError;

#[derive(Debug, Error)]
pub enum ReconcileError {
    /// Declared spec violated an invariant; no remote call was made.
    #[error("invalid pool spec: {0}")]
    Validation(#[from] SpecError),

    /// The parent listener or load balancer did not reach a stable status
    /// before the mutation could be attempted. Safe to retry the whole
    /// operation later.
    #[error("{kind} {id} not ready: {source}")]
    DependencyNotReady {
        kind: &'static str,
        id: String,
        #[source]
        source: WaitError,
    },

    /// The retry-wrapped mutating call failed.
    #[error("mutation failed: {0}")]
    Mutation(#[source] RetryError),

    /// The pool failed to stabilize before or after a mutation.
    #[error("pool failed to stabilize: {0}")]
    Stabilization(#[source] WaitError),

    /// The create call succeeded and assigned an ID, but the pool never
    /// converged. The ID is reported so the caller does not lose track of
    /// the orphaned resource.
    #[error("pool {id} was created but did not converge: {source}")]
    CreatedNotConverged {
        id: String,
        #[source]
        source: WaitError,
    },

    /// The pool does not exist where its existence was required.
    #[error("pool {id} not found")]
    NotFound { id: String },

    /// A non-retryable remote failure outside the wait/retry paths.
    #[error(transparent)]
    Remote(#[from] ClientError),

    /// Neither back-reference list identifies a parent, so the pool cannot
    /// be adopted.
    #[error("pool {id} reports neither a listener nor a load balancer reference")]
    ImportUnresolvable { id: String },

    /// The caller abandoned the operation.
    #[error("operation cancelled")]
    Cancelled,
}

// Cancellation observed inside the retry loop is the same abandonment as
// cancellation observed anywhere else, so it folds into the one variant
// callers match on.
impl From<RetryError> for ReconcileError {
    fn from(error: RetryError) -> Self {
        match error {
            RetryError::Cancelled { .. } => ReconcileError::Cancelled,
            other => ReconcileError::Mutation(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_created_not_converged_reports_assigned_id() {
        let err = ReconcileError::CreatedNotConverged {
            id: "P1".to_string(),
            source: WaitError::UnexpectedStatus {
                status: "ERROR".to_string(),
                target: vec!["ACTIVE".to_string()],
            },
        };
        let message = err.to_string();
        assert!(message.contains("P1"));
        assert!(message.contains("did not converge"));
    }

    #[test]
    fn test_dependency_not_ready_names_the_dependency() {
        let err = ReconcileError::DependencyNotReady {
            kind: "listener",
            id: "L1".to_string(),
            source: WaitError::DeadlineExceeded {
                target: vec!["ACTIVE".to_string()],
                last: "PENDING_UPDATE".to_string(),
            },
        };
        let message = err.to_string();
        assert!(message.contains("listener L1"));
        assert!(message.contains("deadline exceeded"));
    }

    #[test]
    fn test_retry_cancellation_folds_into_cancelled() {
        let err = ReconcileError::from(RetryError::Cancelled {
            operation: "update_pool",
        });
        assert!(matches!(err, ReconcileError::Cancelled));

        let err = ReconcileError::from(RetryError::Fatal {
            operation: "update_pool",
            source: ClientError::BadRequest("invalid field".to_string()),
        });
        assert!(matches!(err, ReconcileError::Mutation(_)));
    }

    #[test]
    fn test_validation_wraps_spec_error() {
        let err = ReconcileError::from(SpecError::MissingCookieName);
        assert!(err.to_string().contains("cookie_name"));
    }
}
