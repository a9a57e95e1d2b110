//! Stub services shared by the middleware tests.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use order_core::{CreateOrderRequest, LineItem, ListOrdersRequest, ListOrdersResponse};
use parking_lot::Mutex;
use tonic::metadata::MetadataMap;
use tower::Service;

use crate::service::context::{CallContext, RpcMethod};
use crate::service::operation::{Operation, OperationResponse, RpcError, RpcFuture};

pub fn ctx_with(method: RpcMethod, metadata: MetadataMap, timeout: Duration) -> CallContext {
    CallContext::new(1, method, metadata, timeout)
}

/// A `ListOrders` operation with the given deadline.
pub fn make_op(timeout: Duration) -> Operation {
    Operation::ListOrders {
        ctx: ctx_with(RpcMethod::ListOrders, MetadataMap::new(), timeout),
        request: ListOrdersRequest {},
    }
}

pub fn create_op(metadata: MetadataMap, quantity: i32) -> Operation {
    Operation::CreateOrder {
        ctx: ctx_with(RpcMethod::CreateOrder, metadata, Duration::from_secs(5)),
        request: CreateOrderRequest {
            id: String::new(),
            items: vec![LineItem {
                item_id: "item-1".to_string(),
                quantity,
            }],
        },
    }
}

pub fn empty_list() -> OperationResponse {
    OperationResponse::Orders(ListOrdersResponse::default())
}

// ---------------------------------------------------------------------------
// SlowService
// ---------------------------------------------------------------------------

/// Answers with an empty order list after a delay.
#[derive(Clone)]
pub struct SlowService {
    delay: Duration,
    finished: Option<Arc<AtomicBool>>,
}

impl SlowService {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            finished: None,
        }
    }

    /// Sets `flag` once the delay has fully elapsed.
    pub fn flag_on_finish(mut self, flag: Arc<AtomicBool>) -> Self {
        self.finished = Some(flag);
        self
    }
}

impl Service<Operation> for SlowService {
    type Response = OperationResponse;
    type Error = RpcError;
    type Future = RpcFuture;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, _op: Operation) -> Self::Future {
        let delay = self.delay;
        let finished = self.finished.clone();
        Box::pin(async move {
            tokio::time::sleep(delay).await;
            if let Some(flag) = finished {
                flag.store(true, Ordering::SeqCst);
            }
            Ok(empty_list())
        })
    }
}

// ---------------------------------------------------------------------------
// RecordingService
// ---------------------------------------------------------------------------

/// Records the context of every operation it sees and answers with `outcome`.
#[derive(Clone)]
pub struct RecordingService {
    pub seen: Arc<Mutex<Vec<CallContext>>>,
    pub calls: Arc<AtomicUsize>,
    outcome: Result<OperationResponse, RpcError>,
}

impl RecordingService {
    pub fn ok() -> Self {
        Self::with_outcome(Ok(empty_list()))
    }

    pub fn with_outcome(outcome: Result<OperationResponse, RpcError>) -> Self {
        Self {
            seen: Arc::new(Mutex::new(Vec::new())),
            calls: Arc::new(AtomicUsize::new(0)),
            outcome,
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Service<Operation> for RecordingService {
    type Response = OperationResponse;
    type Error = RpcError;
    type Future = RpcFuture;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, op: Operation) -> Self::Future {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen.lock().push(op.ctx().clone());
        let outcome = self.outcome.clone();
        Box::pin(async move { outcome })
    }
}

// ---------------------------------------------------------------------------
// PanickingService
// ---------------------------------------------------------------------------

/// Panics either while building its future or while it is polled.
#[derive(Clone, Copy)]
pub enum PanickingService {
    InCall,
    InFuture,
}

fn explode() -> Result<OperationResponse, RpcError> {
    panic!("boom in future")
}

impl Service<Operation> for PanickingService {
    type Response = OperationResponse;
    type Error = RpcError;
    type Future = RpcFuture;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, _op: Operation) -> Self::Future {
        match self {
            Self::InCall => panic!("boom in call"),
            Self::InFuture => Box::pin(async { explode() }),
        }
    }
}
