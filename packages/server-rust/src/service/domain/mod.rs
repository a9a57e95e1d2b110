//! Order domain service: the innermost stage of the RPC pipeline.
//!
//! Translates each [`Operation`] into an [`OrderStore`] call and classifies
//! store errors into [`RpcError`].

use std::sync::Arc;
use std::task::{Context, Poll};

use order_core::{DeleteOrderResponse, ListOrdersResponse};
use tower::Service;
use tracing::error;

use crate::service::context::CallContext;
use crate::service::operation::{Operation, OperationResponse, RpcError, RpcFuture};
use crate::store::{OrderStore, StoreError};

#[derive(Clone)]
pub struct OrderDomainService {
    store: Arc<OrderStore>,
}

impl OrderDomainService {
    #[must_use]
    pub fn new(store: Arc<OrderStore>) -> Self {
        Self { store }
    }
}

/// Maps a store failure to the status the caller sees. Unexpected lookup
/// failures are logged here and reported as a bare `Internal`.
fn classify(err: StoreError, ctx: &CallContext) -> RpcError {
    match err {
        StoreError::UnknownItems(_) => RpcError::InvalidArgument(err.to_string()),
        StoreError::NotFound(_) => RpcError::NotFound(err.to_string()),
        StoreError::AlreadyExists(_) => RpcError::AlreadyExists(err.to_string()),
        StoreError::ItemServiceUnavailable(_) => RpcError::Unavailable(err.to_string()),
        StoreError::ItemLookup(_) => {
            error!(
                correlation_id = %ctx.correlation_id,
                error = %err,
                "item lookup failed"
            );
            RpcError::internal(ctx)
        }
    }
}

impl Service<Operation> for OrderDomainService {
    type Response = OperationResponse;
    type Error = RpcError;
    type Future = RpcFuture;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, op: Operation) -> Self::Future {
        let store = Arc::clone(&self.store);
        Box::pin(async move {
            match op {
                Operation::CreateOrder { ctx, request } => store
                    .create_order(&ctx, request)
                    .await
                    .map(OperationResponse::Order)
                    .map_err(|err| classify(err, &ctx)),
                Operation::GetOrder { ctx, request } => store
                    .get_order(&request.id)
                    .map(OperationResponse::Order)
                    .map_err(|err| classify(err, &ctx)),
                Operation::ListOrders { .. } => Ok(OperationResponse::Orders(ListOrdersResponse {
                    orders: store.list_orders(),
                })),
                Operation::DeleteOrder { ctx, request } => store
                    .delete_order(&request.id)
                    .map(|_| OperationResponse::Deleted(DeleteOrderResponse {}))
                    .map_err(|err| classify(err, &ctx)),
            }
        })
    }
}
