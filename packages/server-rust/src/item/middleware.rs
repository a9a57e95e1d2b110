//! Outbound chain applied to every item-service call.
//!
//! Order (outermost first): [`ClientIdentityLayer`] then [`ClientMetricsLayer`].

use std::task::{Context, Poll};

use tower::{Layer, Service};

use super::call::{ItemCall, ItemError, ItemFuture, ItemReply};
use crate::observability::{CallObservation, CLIENT_METRICS};
use crate::service::context::PROPAGATED_HEADERS;

// ---------------------------------------------------------------------------
// ClientIdentityLayer
// ---------------------------------------------------------------------------

/// Copies the inbound call's propagated headers and remaining deadline onto
/// the outbound call.
#[derive(Debug, Clone, Copy, Default)]
pub struct ClientIdentityLayer;

impl<S> Layer<S> for ClientIdentityLayer {
    type Service = ClientIdentityService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        ClientIdentityService { inner }
    }
}

#[derive(Debug, Clone)]
pub struct ClientIdentityService<S> {
    inner: S,
}

impl<S> Service<ItemCall> for ClientIdentityService<S>
where
    S: Service<ItemCall, Response = ItemReply, Error = ItemError, Future = ItemFuture>,
{
    type Response = ItemReply;
    type Error = ItemError;
    type Future = ItemFuture;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut call: ItemCall) -> Self::Future {
        for key in PROPAGATED_HEADERS {
            if let Some(value) = call.inbound.get(*key) {
                call.metadata.insert(*key, value.clone());
            }
        }
        call.timeout = Some(call.remaining);
        self.inner.call(call)
    }
}

// ---------------------------------------------------------------------------
// ClientMetricsLayer
// ---------------------------------------------------------------------------

/// Records `grpc_client_*` metrics for every outbound call.
#[derive(Debug, Clone, Copy, Default)]
pub struct ClientMetricsLayer;

impl<S> Layer<S> for ClientMetricsLayer {
    type Service = ClientMetricsService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        ClientMetricsService { inner }
    }
}

#[derive(Debug, Clone)]
pub struct ClientMetricsService<S> {
    inner: S,
}

impl<S> Service<ItemCall> for ClientMetricsService<S>
where
    S: Service<ItemCall, Response = ItemReply, Error = ItemError, Future = ItemFuture>,
{
    type Response = ItemReply;
    type Error = ItemError;
    type Future = ItemFuture;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, call: ItemCall) -> Self::Future {
        let observation = CallObservation::start(
            &CLIENT_METRICS,
            call.request.service(),
            call.request.method(),
        );
        let fut = self.inner.call(call);
        Box::pin(async move {
            let result = fut.await;
            observation.finish(result.as_ref().map_or_else(ItemError::code, |_| tonic::Code::Ok));
            result
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
