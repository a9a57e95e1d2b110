//! Metrics middleware for operations.
//!
//! Records `grpc_server_*` counters, the handling-time histogram and the
//! in-flight gauge through the `metrics` facade. Every call produces exactly
//! one handled observation, including calls whose future is dropped.

use std::task::{Context, Poll};

use tower::{Layer, Service};

use crate::observability::{CallObservation, SERVER_METRICS};
use crate::service::operation::{outcome_code, Operation, OperationResponse, RpcError, RpcFuture};

// ---------------------------------------------------------------------------
// MetricsLayer
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default)]
pub struct MetricsLayer;

impl<S> Layer<S> for MetricsLayer {
    type Service = MetricsService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        MetricsService { inner }
    }
}

// ---------------------------------------------------------------------------
// MetricsService
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct MetricsService<S> {
    inner: S,
}

impl<S> Service<Operation> for MetricsService<S>
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
        let method = op.ctx().method;
        let observation = CallObservation::start(&SERVER_METRICS, method.service(), method.name());
        let fut = self.inner.call(op);

        Box::pin(async move {
            let result = fut.await;
            observation.finish(outcome_code(&result));
            result
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
