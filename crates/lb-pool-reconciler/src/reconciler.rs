//! Pool lifecycle orchestration.
//!
//! Composes the precondition wait, the retry wrapper, and the state poller
//! into the five lifecycle operations. Each operation is one synchronous
//! call bounded by the caller's deadline and cancellation token; the
//! reconciler holds no state between calls, and within one invocation the
//! precondition wait strictly precedes the mutating call, which strictly
//! precedes the postcondition wait.

use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

use crate::client::LoadBalancerApi;
use crate::config::ReconcilerConfig;
use crate::error::ReconcileError;
use crate::pool::{status, ParentRef, PoolSnapshot, PoolSpec, PoolUpdate};
use crate::retry::{retry_mutation, RetryError};
use crate::status::{wait_for_deletion, wait_for_status, WaitError};

/// Deadline and cancellation for a single reconciler invocation.
#[derive(Clone, Debug)]
pub struct OperationContext {
    pub deadline: Instant,
    pub cancel: CancellationToken,
}

impl OperationContext {
    /// Context with a fresh cancellation token and the given overall timeout.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            deadline: Instant::now() + timeout,
            cancel: CancellationToken::new(),
        }
    }

    /// Context sharing an externally owned cancellation token, e.g. one
    /// tripped on process shutdown.
    pub fn new(timeout: Duration, cancel: CancellationToken) -> Self {
        Self {
            deadline: Instant::now() + timeout,
            cancel,
        }
    }

    fn ensure_active(&self) -> Result<(), ReconcileError> {
        if self.cancel.is_cancelled() {
            return Err(ReconcileError::Cancelled);
        }
        Ok(())
    }
}

/// Reconciles a declared pool against the control plane.
///
/// The client is injected per instance; there is no ambient global lookup.
pub struct PoolReconciler<C> {
    client: C,
    config: ReconcilerConfig,
}

impl<C: LoadBalancerApi> PoolReconciler<C> {
    pub fn new(client: C) -> Self {
        Self::with_config(client, ReconcilerConfig::default())
    }

    pub fn with_config(client: C, config: ReconcilerConfig) -> Self {
        Self { client, config }
    }

    /// Create the pool and wait for it to become active.
    ///
    /// Validation and the parent precondition wait run before any mutation,
    /// so a failure there leaves nothing behind. If the create call assigned
    /// an ID but convergence failed, the error carries that ID.
    #[instrument(skip(self, ctx, spec), fields(name = %spec.name, parent = %spec.parent.id()))]
    pub async fn create(
        &self,
        ctx: &OperationContext,
        spec: &PoolSpec,
    ) -> Result<PoolSnapshot, ReconcileError> {
        ctx.ensure_active()?;
        spec.validate()?;

        self.wait_for_parent(ctx, &spec.parent).await?;

        debug!("Parent active, creating pool");
        let created = retry_mutation(
            ctx.deadline,
            &ctx.cancel,
            &self.config.backoff,
            "create_pool",
            || self.client.create_pool(spec),
        )
        .await?;

        let id = created.id.clone();
        info!(pool_id = %id, "Pool created, waiting for it to become active");

        wait_for_status(
            ctx.deadline,
            self.config.poll_interval(),
            &ctx.cancel,
            || self.client.get_pool(&id),
            &[status::ACTIVE],
            status::PENDING,
        )
        .await
        .map_err(|source| ReconcileError::CreatedNotConverged {
            id: id.clone(),
            source,
        })
    }

    /// Fetch the pool. `Ok(None)` means the resource no longer exists and
    /// the caller should drop it from its desired-state tracking.
    #[instrument(skip(self, ctx))]
    pub async fn read(
        &self,
        ctx: &OperationContext,
        id: &str,
    ) -> Result<Option<PoolSnapshot>, ReconcileError> {
        ctx.ensure_active()?;
        match self.client.get_pool(id).await {
            Ok(snapshot) => Ok(Some(snapshot)),
            Err(error) if error.is_not_found() => {
                debug!(pool_id = %id, "Pool gone, caller should forget it");
                Ok(None)
            }
            Err(error) => Err(error.into()),
        }
    }

    /// Apply the minimal diff of mutable fields and wait for the pool to
    /// settle.
    ///
    /// The pool's own status is stabilized both before and after the
    /// mutation; a concurrent operation may have left it pending. The parent
    /// dependency is deliberately not re-verified here, only at create time.
    #[instrument(skip(self, ctx, desired), fields(pool_id = %id))]
    pub async fn update(
        &self,
        ctx: &OperationContext,
        id: &str,
        desired: &PoolSpec,
    ) -> Result<PoolSnapshot, ReconcileError> {
        ctx.ensure_active()?;

        let current = match self.client.get_pool(id).await {
            Ok(snapshot) => snapshot,
            Err(error) if error.is_not_found() => {
                return Err(ReconcileError::NotFound { id: id.to_string() })
            }
            Err(error) => return Err(error.into()),
        };

        let update = PoolUpdate::diff(&current, desired);

        let stable = self
            .wait_for_pool_active(ctx, id)
            .await
            .map_err(ReconcileError::Stabilization)?;

        if update.is_empty() {
            debug!("No mutable fields changed");
            return Ok(stable);
        }

        info!(?update, "Updating pool");
        retry_mutation(
            ctx.deadline,
            &ctx.cancel,
            &self.config.backoff,
            "update_pool",
            || self.client.update_pool(id, &update),
        )
        .await?;

        self.wait_for_pool_active(ctx, id)
            .await
            .map_err(ReconcileError::Stabilization)
    }

    /// Delete the pool and wait for it to disappear. A pool that is already
    /// gone, at any step, counts as success.
    #[instrument(skip(self, ctx), fields(pool_id = %id))]
    pub async fn delete(&self, ctx: &OperationContext, id: &str) -> Result<(), ReconcileError> {
        ctx.ensure_active()?;

        match self.client.get_pool(id).await {
            Ok(_) => {}
            Err(error) if error.is_not_found() => {
                debug!("Pool already gone");
                return Ok(());
            }
            Err(error) => return Err(error.into()),
        }

        let deleted = retry_mutation(
            ctx.deadline,
            &ctx.cancel,
            &self.config.backoff,
            "delete_pool",
            || self.client.delete_pool(id),
        )
        .await;

        match deleted {
            Ok(()) => {}
            Err(RetryError::Fatal { source, .. }) if source.is_not_found() => {
                debug!("Pool deleted concurrently");
                return Ok(());
            }
            Err(error) => return Err(error.into()),
        }

        info!("Delete accepted, waiting for pool to disappear");
        wait_for_deletion(
            ctx.deadline,
            self.config.poll_interval(),
            &ctx.cancel,
            || self.client.get_pool(id),
            &[status::DELETED],
            status::PENDING_DELETE_SET,
        )
        .await
        .map_err(ReconcileError::Stabilization)
    }

    /// Adopt a pool created elsewhere, deriving the parent reference from
    /// the reported back-reference lists. A listener reference is preferred;
    /// without either, the pool cannot be adopted because future mutations
    /// would have no precondition to wait on.
    #[instrument(skip(self, ctx), fields(pool_id = %id))]
    pub async fn import(
        &self,
        ctx: &OperationContext,
        id: &str,
    ) -> Result<(PoolSnapshot, ParentRef), ReconcileError> {
        ctx.ensure_active()?;

        let snapshot = match self.client.get_pool(id).await {
            Ok(snapshot) => snapshot,
            Err(error) if error.is_not_found() => {
                return Err(ReconcileError::NotFound { id: id.to_string() })
            }
            Err(error) => return Err(error.into()),
        };

        let parent = snapshot
            .listeners
            .first()
            .filter(|r| !r.id.is_empty())
            .map(|r| ParentRef::Listener(r.id.clone()))
            .or_else(|| {
                snapshot
                    .loadbalancers
                    .first()
                    .filter(|r| !r.id.is_empty())
                    .map(|r| ParentRef::LoadBalancer(r.id.clone()))
            })
            .ok_or_else(|| ReconcileError::ImportUnresolvable { id: id.to_string() })?;

        info!(parent_kind = parent.kind(), parent_id = %parent.id(), "Imported pool");
        Ok((snapshot, parent))
    }

    /// Wait for the parent listener or load balancer to become active. The
    /// control plane rejects pool mutations while the parent is itself
    /// transitioning.
    async fn wait_for_parent(
        &self,
        ctx: &OperationContext,
        parent: &ParentRef,
    ) -> Result<(), ReconcileError> {
        debug!(kind = parent.kind(), id = %parent.id(), "Waiting for parent to become active");

        let waited = match parent {
            ParentRef::Listener(id) => wait_for_status(
                ctx.deadline,
                self.config.poll_interval(),
                &ctx.cancel,
                || self.client.get_listener(id),
                &[status::ACTIVE],
                status::PENDING,
            )
            .await
            .map(drop),
            ParentRef::LoadBalancer(id) => wait_for_status(
                ctx.deadline,
                self.config.poll_interval(),
                &ctx.cancel,
                || self.client.get_load_balancer(id),
                &[status::ACTIVE],
                status::PENDING,
            )
            .await
            .map(drop),
        };

        waited.map_err(|source| ReconcileError::DependencyNotReady {
            kind: parent.kind(),
            id: parent.id().to_string(),
            source,
        })
    }

    async fn wait_for_pool_active(
        &self,
        ctx: &OperationContext,
        id: &str,
    ) -> Result<PoolSnapshot, WaitError> {
        wait_for_status(
            ctx.deadline,
            self.config.poll_interval(),
            &ctx.cancel,
            || self.client.get_pool(id),
            &[status::ACTIVE],
            status::PENDING,
        )
        .await
    }
}
