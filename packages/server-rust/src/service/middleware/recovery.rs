//! Panic recovery middleware.
//!
//! A panic in the inner service, whether raised while building its future or
//! while polling it, becomes `RpcError::Internal` carrying only the
//! correlation id. The panic message is logged at `error`.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::task::{Context, Poll};

use futures_util::FutureExt;
use tower::{Layer, Service};
use tracing::error;

use crate::service::context::RpcMethod;
use crate::service::operation::{Operation, OperationResponse, RpcError, RpcFuture};

#[derive(Debug, Clone, Copy, Default)]
pub struct RecoveryLayer;

impl<S> Layer<S> for RecoveryLayer {
    type Service = RecoveryService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RecoveryService { inner }
    }
}

#[derive(Debug, Clone)]
pub struct RecoveryService<S> {
    inner: S,
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&'static str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}

fn recovered(method: RpcMethod, correlation_id: String, payload: &(dyn Any + Send)) -> RpcError {
    error!(
        grpc.method = method.name(),
        correlation_id = %correlation_id,
        panic = panic_message(payload),
        "recovered from panic in handler"
    );
    RpcError::Internal { correlation_id }
}

impl<S> Service<Operation> for RecoveryService<S>
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
        let correlation_id = op.ctx().correlation_id.clone();

        let fut = match std::panic::catch_unwind(AssertUnwindSafe(|| self.inner.call(op))) {
            Ok(fut) => fut,
            Err(payload) => {
                let err = recovered(method, correlation_id, payload.as_ref());
                return Box::pin(async move { Err(err) });
            }
        };

        Box::pin(async move {
            match AssertUnwindSafe(fut).catch_unwind().await {
                Ok(result) => result,
                Err(payload) => Err(recovered(method, correlation_id, payload.as_ref())),
            }
        })
    }
}
