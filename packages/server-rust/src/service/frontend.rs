//! gRPC entry point: turns tonic requests into [`Operation`]s and runs them
//! through the pipeline.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use order_core::api::order::order_service_server::OrderService;
use order_core::{
    CreateOrderRequest, DeleteOrderRequest, DeleteOrderResponse, GetOrderRequest,
    ListOrdersRequest, ListOrdersResponse, Order,
};
use tonic::{Request, Response, Status};
use tower::{Service, ServiceExt};

use super::context::{CallContext, RpcMethod, REQUEST_ID_HEADER};
use super::operation::{Operation, OperationResponse, RpcError, RpcFuture};

/// Implements `order.OrderService` on top of an RPC pipeline.
#[derive(Debug, Clone)]
pub struct RpcFrontend<S> {
    pipeline: S,
    next_call_id: Arc<AtomicU64>,
    default_timeout: Duration,
}

impl<S> RpcFrontend<S>
where
    S: Service<Operation, Response = OperationResponse, Error = RpcError, Future = RpcFuture>
        + Clone
        + Send
        + Sync
        + 'static,
{
    #[must_use]
    pub fn new(pipeline: S, default_timeout: Duration) -> Self {
        Self {
            pipeline,
            next_call_id: Arc::new(AtomicU64::new(1)),
            default_timeout,
        }
    }

    fn context(&self, method: RpcMethod, metadata: tonic::metadata::MetadataMap) -> CallContext {
        let call_id = self.next_call_id.fetch_add(1, Ordering::Relaxed);
        CallContext::new(call_id, method, metadata, self.default_timeout)
    }

    /// Runs `op` and answers with `extract`'s view of the response. The
    /// correlation id is echoed back as `x-request-id`.
    async fn dispatch<T>(
        &self,
        op: Operation,
        extract: fn(OperationResponse) -> Option<T>,
    ) -> Result<Response<T>, Status> {
        let correlation_id = op.ctx().correlation_id.clone();
        let internal = || {
            Status::from(RpcError::Internal {
                correlation_id: correlation_id.clone(),
            })
        };

        let response = self.pipeline.clone().oneshot(op).await?;
        let message = extract(response).ok_or_else(internal)?;

        let mut response = Response::new(message);
        if let Ok(value) = correlation_id.parse() {
            response.metadata_mut().insert(REQUEST_ID_HEADER, value);
        }
        Ok(response)
    }
}

fn as_order(response: OperationResponse) -> Option<Order> {
    match response {
        OperationResponse::Order(order) => Some(order),
        _ => None,
    }
}

fn as_orders(response: OperationResponse) -> Option<ListOrdersResponse> {
    match response {
        OperationResponse::Orders(orders) => Some(orders),
        _ => None,
    }
}

fn as_deleted(response: OperationResponse) -> Option<DeleteOrderResponse> {
    match response {
        OperationResponse::Deleted(deleted) => Some(deleted),
        _ => None,
    }
}

#[tonic::async_trait]
impl<S> OrderService for RpcFrontend<S>
where
    S: Service<Operation, Response = OperationResponse, Error = RpcError, Future = RpcFuture>
        + Clone
        + Send
        + Sync
        + 'static,
{
    async fn create_order(
        &self,
        request: Request<CreateOrderRequest>,
    ) -> Result<Response<Order>, Status> {
        let (metadata, _, request) = request.into_parts();
        let ctx = self.context(RpcMethod::CreateOrder, metadata);
        self.dispatch(Operation::CreateOrder { ctx, request }, as_order).await
    }

    async fn get_order(
        &self,
        request: Request<GetOrderRequest>,
    ) -> Result<Response<Order>, Status> {
        let (metadata, _, request) = request.into_parts();
        let ctx = self.context(RpcMethod::GetOrder, metadata);
        self.dispatch(Operation::GetOrder { ctx, request }, as_order).await
    }

    async fn list_orders(
        &self,
        request: Request<ListOrdersRequest>,
    ) -> Result<Response<ListOrdersResponse>, Status> {
        let (metadata, _, request) = request.into_parts();
        let ctx = self.context(RpcMethod::ListOrders, metadata);
        self.dispatch(Operation::ListOrders { ctx, request }, as_orders).await
    }

    async fn delete_order(
        &self,
        request: Request<DeleteOrderRequest>,
    ) -> Result<Response<DeleteOrderResponse>, Status> {
        let (metadata, _, request) = request.into_parts();
        let ctx = self.context(RpcMethod::DeleteOrder, metadata);
        self.dispatch(Operation::DeleteOrder { ctx, request }, as_deleted).await
    }
}
