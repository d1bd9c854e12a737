//! State-convergence polling.
//!
//! The control plane offers no push notifications, so convergence is
//! observed by fetching the resource's provisioning status on a fixed
//! interval. The loop is a three-class state machine: pending statuses keep
//! polling, target statuses succeed, anything else fails immediately. It
//! never polls past a terminal classification, and every sleep observes the
//! cancellation token.

use std::future::Future;
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::client::ClientError;
use crate::pool::HasStatus;

/// Failure modes of a convergence wait.
#[derive(Debug, Error)]
pub enum WaitError {
    /// The resource reached a status outside both the pending and target
    /// sets, e.g. a remote-reported ERROR state.
    #[error("unexpected status {status:?} while waiting for one of {target:?}")]
    UnexpectedStatus { status: String, target: Vec<String> },
    /// Deadline elapsed while the resource was still pending.
    #[error("deadline exceeded waiting for one of {target:?}; last seen status {last:?}")]
    DeadlineExceeded { target: Vec<String>, last: String },
    #[error("wait cancelled")]
    Cancelled,
    /// The status fetch itself failed.
    #[error("status fetch failed: {0}")]
    Fetch(#[source] ClientError),
}

/// Poll until the resource reports one of the target statuses.
///
/// A fetch that fails with not-found is fatal here; use
/// [`wait_for_deletion`] when absence is the outcome being waited for.
pub async fn wait_for_status<T, F, Fut>(
    deadline: Instant,
    interval: Duration,
    cancel: &CancellationToken,
    fetch: F,
    target: &[&str],
    pending: &[&str],
) -> Result<T, WaitError>
where
    T: HasStatus,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ClientError>>,
{
    match poll(deadline, interval, cancel, fetch, target, pending, false).await? {
        Some(snapshot) => Ok(snapshot),
        // not_found_ok is false, so poll() never yields absence
        None => Err(WaitError::Fetch(ClientError::Transport(
            "poller yielded absence outside a deletion wait".to_string(),
        ))),
    }
}

/// Poll until the resource disappears (fetch returns not-found) or reports
/// one of the target statuses.
pub async fn wait_for_deletion<T, F, Fut>(
    deadline: Instant,
    interval: Duration,
    cancel: &CancellationToken,
    fetch: F,
    target: &[&str],
    pending: &[&str],
) -> Result<(), WaitError>
where
    T: HasStatus,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ClientError>>,
{
    poll(deadline, interval, cancel, fetch, target, pending, true)
        .await
        .map(drop)
}

async fn poll<T, F, Fut>(
    deadline: Instant,
    interval: Duration,
    cancel: &CancellationToken,
    mut fetch: F,
    target: &[&str],
    pending: &[&str],
    not_found_ok: bool,
) -> Result<Option<T>, WaitError>
where
    T: HasStatus,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ClientError>>,
{
    let mut last = String::new();

    loop {
        let fetched = tokio::select! {
            _ = cancel.cancelled() => return Err(WaitError::Cancelled),
            result = fetch() => result,
        };

        match fetched {
            Err(ClientError::NotFound(_)) if not_found_ok => {
                debug!("Resource gone, treating as converged");
                return Ok(None);
            }
            Err(error) => return Err(WaitError::Fetch(error)),
            Ok(snapshot) => {
                let status = snapshot.provisioning_status();
                if target.contains(&status) {
                    debug!(status, "Target status reached");
                    return Ok(Some(snapshot));
                }
                if !pending.contains(&status) {
                    warn!(status, ?target, "Unexpected terminal status");
                    return Err(WaitError::UnexpectedStatus {
                        status: status.to_string(),
                        target: owned(target),
                    });
                }
                status.clone_into(&mut last);
            }
        }

        let now = Instant::now();
        if now >= deadline {
            return Err(WaitError::DeadlineExceeded {
                target: owned(target),
                last,
            });
        }

        tokio::select! {
            _ = cancel.cancelled() => return Err(WaitError::Cancelled),
            _ = tokio::time::sleep(interval.min(deadline - now)) => {}
        }
    }
}

fn owned(statuses: &[&str]) -> Vec<String> {
    statuses.iter().map(|s| s.to_string()).collect()
}
