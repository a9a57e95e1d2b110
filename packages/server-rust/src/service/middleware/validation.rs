//! Request validation middleware.
//!
//! Runs `Validate::validate` on the request message and fails the call with
//! `InvalidArgument` before any business logic sees it.

use std::task::{Context, Poll};

use tower::{Layer, Service};
use tracing::debug;

use crate::service::operation::{Operation, OperationResponse, RpcError, RpcFuture};

#[derive(Debug, Clone, Copy, Default)]
pub struct ValidationLayer;

impl<S> Layer<S> for ValidationLayer {
    type Service = ValidationService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        ValidationService { inner }
    }
}

#[derive(Debug, Clone)]
pub struct ValidationService<S> {
    inner: S,
}

impl<S> Service<Operation> for ValidationService<S>
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
        if let Err(err) = op.validate() {
            debug!(
                call_id = op.ctx().call_id,
                field = %err.field,
                "request rejected by validation"
            );
            let err = RpcError::from(err);
            return Box::pin(async move { Err(err) });
        }
        Box::pin(self.inner.call(op))
    }
}

#[cfg(test)]
mod tests {
    use tonic::metadata::MetadataMap;
    use tower::ServiceExt;

    use super::*;
    use crate::service::middleware::test_support::{create_op, RecordingService};

    #[tokio::test]
    async fn valid_request_reaches_inner() {
        let inner = RecordingService::ok();
        let svc = ValidationLayer.layer(inner.clone());
        svc.oneshot(create_op(MetadataMap::new(), 3)).await.unwrap();
        assert_eq!(inner.call_count(), 1);
    }

    #[tokio::test]
    async fn invalid_request_short_circuits() {
        let inner = RecordingService::ok();
        let svc = ValidationLayer.layer(inner.clone());
        let err = svc.oneshot(create_op(MetadataMap::new(), 0)).await.unwrap_err();
        assert_eq!(err.code(), tonic::Code::InvalidArgument);
        assert!(err.to_string().contains("items[0].quantity"));
        assert_eq!(inner.call_count(), 0);
    }
}
