//! Transient-error classification and deadline-bounded retry.
//!
//! The control plane rejects mutations while the target or a related
//! resource is locked by an in-flight operation. Those rejections resolve on
//! their own, so mutating calls are wrapped in a retry loop with capped
//! exponential backoff. Everything else fails fast.

use std::future::Future;
use std::time::Instant;

use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::client::ClientError;
use crate::config::BackoffConfig;

/// Error classification for retry behavior
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Expected to resolve if the call is retried
    Transient,
    /// Will not recover without intervention
    Fatal,
}

/// Classify a normalized control-plane error.
///
/// Conservative on purpose: only a conflict (resource locked by another
/// in-flight operation) is worth retrying. Treating a truly fatal error as
/// transient would loop until the deadline; the reverse merely surfaces a
/// spurious failure the caller can retry wholesale.
pub fn classify(error: &ClientError) -> ErrorKind {
    match error {
        ClientError::Conflict(_) => ErrorKind::Transient,
        ClientError::NotFound(_)
        | ClientError::BadRequest(_)
        | ClientError::Unauthorized(_)
        | ClientError::Transport(_) => ErrorKind::Fatal,
    }
}

/// Failure modes of [`retry_mutation`].
#[derive(Debug, Error)]
pub enum RetryError {
    #[error("{operation} failed: {source}")]
    Fatal {
        operation: &'static str,
        #[source]
        source: ClientError,
    },
    #[error("deadline exceeded retrying {operation}; last error: {last}")]
    DeadlineExceeded {
        operation: &'static str,
        #[source]
        last: ClientError,
    },
    #[error("{operation} cancelled")]
    Cancelled { operation: &'static str },
}

impl RetryError {
    /// The underlying control-plane error, when one was observed.
    pub fn client_error(&self) -> Option<&ClientError> {
        match self {
            RetryError::Fatal { source, .. } => Some(source),
            RetryError::DeadlineExceeded { last, .. } => Some(last),
            RetryError::Cancelled { .. } => None,
        }
    }
}

/// Invoke a mutating operation until it succeeds, fails fatally, or the
/// deadline elapses.
///
/// The operation must be safe to invoke more than once for the same logical
/// intent; the control plane's own idempotency is relied upon and no
/// deduplication happens here. Each backoff sleep observes the cancellation
/// token, so an abandoned caller stops within one interval.
pub async fn retry_mutation<T, F, Fut>(
    deadline: Instant,
    cancel: &CancellationToken,
    backoff: &BackoffConfig,
    operation: &'static str,
    mut op: F,
) -> Result<T, RetryError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ClientError>>,
{
    let mut delay = backoff.initial_delay();
    let mut attempt = 1u32;

    loop {
        let error = match op().await {
            Ok(value) => {
                if attempt > 1 {
                    debug!(operation, attempt, "Operation succeeded after retries");
                }
                return Ok(value);
            }
            Err(error) => error,
        };

        match classify(&error) {
            ErrorKind::Fatal => {
                return Err(RetryError::Fatal {
                    operation,
                    source: error,
                })
            }
            ErrorKind::Transient => {
                let now = Instant::now();
                if now >= deadline {
                    return Err(RetryError::DeadlineExceeded {
                        operation,
                        last: error,
                    });
                }

                let sleep_for = delay.min(deadline - now);
                warn!(
                    operation,
                    attempt,
                    error = %error,
                    delay_ms = sleep_for.as_millis() as u64,
                    "Transient failure, retrying"
                );

                tokio::select! {
                    _ = cancel.cancelled() => return Err(RetryError::Cancelled { operation }),
                    _ = tokio::time::sleep(sleep_for) => {}
                }

                delay = (delay * backoff.multiplier).min(backoff.max_delay());
                attempt = attempt.saturating_add(1);
            }
        }
    }
}
