//! Control-plane client seam.
//!
//! The reconciler only ever talks to the remote API through
//! [`LoadBalancerApi`], which allows mocking in tests while keeping the
//! concrete HTTP implementation for production use. Errors are normalized
//! into [`ClientError`] kinds so that retry classification never has to
//! inspect a transport library's error types.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::pool::{ListenerSnapshot, LoadBalancerSnapshot, PoolSnapshot, PoolSpec, PoolUpdate};

/// Normalized control-plane errors.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The addressed resource does not exist.
    #[error("resource not found: {0}")]
    NotFound(String),
    /// The resource or a related resource is locked by an in-flight
    /// operation. The only kind the retry wrapper considers transient.
    #[error("conflicting operation in progress: {0}")]
    Conflict(String),
    /// The control plane rejected the request as malformed or invalid.
    #[error("request rejected by control plane: {0}")]
    BadRequest(String),
    /// Authentication or authorization failure.
    #[error("authorization failed: {0}")]
    Unauthorized(String),
    /// Connection, protocol, or server-side failure.
    #[error("transport failure: {0}")]
    Transport(String),
}

impl ClientError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, ClientError::NotFound(_))
    }
}

/// Operations the reconciler needs from the control plane.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LoadBalancerApi: Send + Sync {
    /// Create a pool from the declared spec. Returns the remote record,
    /// including the assigned ID, typically still in a pending status.
    async fn create_pool(&self, spec: &PoolSpec) -> Result<PoolSnapshot, ClientError>;

    /// Fetch a pool by ID.
    async fn get_pool(&self, id: &str) -> Result<PoolSnapshot, ClientError>;

    /// Apply a partial update to a pool.
    async fn update_pool(&self, id: &str, update: &PoolUpdate)
        -> Result<PoolSnapshot, ClientError>;

    /// Delete a pool by ID.
    async fn delete_pool(&self, id: &str) -> Result<(), ClientError>;

    /// Fetch a listener's identity and status.
    async fn get_listener(&self, id: &str) -> Result<ListenerSnapshot, ClientError>;

    /// Fetch a load balancer's identity and status.
    async fn get_load_balancer(&self, id: &str) -> Result<LoadBalancerSnapshot, ClientError>;
}

/// Implement the trait for Arc-wrapped clients to support shared ownership
#[async_trait]
impl<T: LoadBalancerApi + ?Sized> LoadBalancerApi for Arc<T> {
    async fn create_pool(&self, spec: &PoolSpec) -> Result<PoolSnapshot, ClientError> {
        (**self).create_pool(spec).await
    }

    async fn get_pool(&self, id: &str) -> Result<PoolSnapshot, ClientError> {
        (**self).get_pool(id).await
    }

    async fn update_pool(
        &self,
        id: &str,
        update: &PoolUpdate,
    ) -> Result<PoolSnapshot, ClientError> {
        (**self).update_pool(id, update).await
    }

    async fn delete_pool(&self, id: &str) -> Result<(), ClientError> {
        (**self).delete_pool(id).await
    }

    async fn get_listener(&self, id: &str) -> Result<ListenerSnapshot, ClientError> {
        (**self).get_listener(id).await
    }

    async fn get_load_balancer(&self, id: &str) -> Result<LoadBalancerSnapshot, ClientError> {
        (**self).get_load_balancer(id).await
    }
}
