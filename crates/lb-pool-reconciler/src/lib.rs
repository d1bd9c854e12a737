//! Lifecycle reconciler for load-balancer pools.
//!
//! Translates a single declared pool into the correct sequence of calls
//! against an asynchronous, eventually consistent control-plane API: wait
//! for the parent dependency to settle, apply the mutation with transient
//! failures retried, then poll until the resource converges. The reconciler
//! is stateless between invocations; the caller owns durable state and
//! supplies a deadline and cancellation token per operation.

pub mod client;
pub mod config;
pub mod error;
pub mod http;
pub mod pool;
pub mod reconciler;
pub mod retry;
pub mod status;

pub use client::{ClientError, LoadBalancerApi};
pub use config::{BackoffConfig, ReconcilerConfig};
pub use error::ReconcileError;
pub use http::HttpLoadBalancerClient;
pub use pool::{ParentRef, PoolSnapshot, PoolSpec, PoolUpdate};
pub use reconciler::{OperationContext, PoolReconciler};
