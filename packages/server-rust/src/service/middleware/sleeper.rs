//! Latency injection middleware.
//!
//! Delays every call by a fixed duration before handing it to the next
//! stage. The delay is an async timer, so concurrent calls sleep in
//! parallel. A zero delay makes the layer a pass-through.

use std::task::{Context, Poll};
use std::time::Duration;

use tower::{Layer, Service};

use crate::service::operation::{Operation, OperationResponse, RpcError, RpcFuture};

#[derive(Debug, Clone, Copy, Default)]
pub struct SleeperLayer {
    delay: Duration,
}

impl SleeperLayer {
    #[must_use]
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

impl<S> Layer<S> for SleeperLayer {
    type Service = SleeperService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        SleeperService {
            inner,
            delay: self.delay,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SleeperService<S> {
    inner: S,
    delay: Duration,
}

impl<S> Service<Operation> for SleeperService<S>
where
    S: Service<Operation, Response = OperationResponse, Error = RpcError> + Clone + Send + 'static,
    S::Future: Send + 'static,
{
    type Response = OperationResponse;
    type Error = RpcError;
    type Future = RpcFuture;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, op: Operation) -> Self::Future {
        if self.delay.is_zero() {
            return Box::pin(self.inner.call(op));
        }
        // Later stages must not run before the delay, so the readied inner
        // service is moved into the future and called after the sleep.
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);
        let delay = self.delay;
        Box::pin(async move {
            tokio::time::sleep(delay).await;
            inner.call(op).await
        })
    }
}
