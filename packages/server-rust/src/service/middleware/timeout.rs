//! Deadline middleware for operations.
//!
//! Fails operations that outlive their call context's deadline with
//! `RpcError::DeadlineExceeded`. The inner future is dropped at that point,
//! which cancels any outbound call it was awaiting.

use std::task::{Context, Poll};

use tower::{Layer, Service};

use crate::service::operation::{Operation, OperationResponse, RpcError, RpcFuture};

// ---------------------------------------------------------------------------
// TimeoutLayer
// ---------------------------------------------------------------------------

/// Tower layer that wraps services with per-call deadline enforcement.
///
/// The budget is read from each operation's `ctx.timeout`, so a caller's
/// `grpc-timeout` shortens it for that call only.
#[derive(Debug, Clone, Copy, Default)]
pub struct TimeoutLayer;

impl<S> Layer<S> for TimeoutLayer {
    type Service = TimeoutService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        TimeoutService { inner }
    }
}

// ---------------------------------------------------------------------------
// TimeoutService
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct TimeoutService<S> {
    inner: S,
}

impl<S> Service<Operation> for TimeoutService<S>
where
    S: Service<Operation, Response = OperationResponse, Error = RpcError> + Send,
    S::Future: Send + 'static,
{
    type Response = OperationResponse;
    type Error = RpcError;
    type Future = RpcFuture;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, op: Operation) -> Self::Future {
        let deadline = op.ctx().deadline();
        let timeout = op.ctx().timeout;
        let fut = self.inner.call(op);
        Box::pin(async move {
            match tokio::time::timeout_at(deadline.into(), fut).await {
                Ok(result) => result,
                Err(_elapsed) => Err(RpcError::DeadlineExceeded {
                    timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
                }),
            }
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
