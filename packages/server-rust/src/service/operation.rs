//! Typed operations dispatched through the RPC pipeline, and the error
//! taxonomy every stage returns.

use std::future::Future;
use std::pin::Pin;

use order_core::{
    CreateOrderRequest, DeleteOrderRequest, DeleteOrderResponse, GetOrderRequest,
    ListOrdersRequest, ListOrdersResponse, Order, Validate, ValidationError,
};
use tonic::{Code, Status};

use super::context::CallContext;

/// Boxed future returned by every pipeline stage.
pub type RpcFuture = Pin<Box<dyn Future<Output = Result<OperationResponse, RpcError>> + Send>>;

// ---------------------------------------------------------------------------
// Operation
// ---------------------------------------------------------------------------

/// One inbound RPC call: its context plus the decoded request message.
#[derive(Debug)]
pub enum Operation {
    CreateOrder {
        ctx: CallContext,
        request: CreateOrderRequest,
    },
    GetOrder {
        ctx: CallContext,
        request: GetOrderRequest,
    },
    ListOrders {
        ctx: CallContext,
        request: ListOrdersRequest,
    },
    DeleteOrder {
        ctx: CallContext,
        request: DeleteOrderRequest,
    },
}

impl Operation {
    #[must_use]
    pub fn ctx(&self) -> &CallContext {
        match self {
            Self::CreateOrder { ctx, .. }
            | Self::GetOrder { ctx, .. }
            | Self::ListOrders { ctx, .. }
            | Self::DeleteOrder { ctx, .. } => ctx,
        }
    }

    pub fn ctx_mut(&mut self) -> &mut CallContext {
        match self {
            Self::CreateOrder { ctx, .. }
            | Self::GetOrder { ctx, .. }
            | Self::ListOrders { ctx, .. }
            | Self::DeleteOrder { ctx, .. } => ctx,
        }
    }

    /// Runs schema validation on the request message.
    ///
    /// # Errors
    ///
    /// Returns the first field that violates the message's constraints.
    pub fn validate(&self) -> Result<(), ValidationError> {
        match self {
            Self::CreateOrder { request, .. } => request.validate(),
            Self::GetOrder { request, .. } => request.validate(),
            Self::ListOrders { request, .. } => request.validate(),
            Self::DeleteOrder { request, .. } => request.validate(),
        }
    }
}

/// Successful result of an operation.
#[derive(Debug, Clone, PartialEq)]
pub enum OperationResponse {
    Order(Order),
    Orders(ListOrdersResponse),
    Deleted(DeleteOrderResponse),
}

// ---------------------------------------------------------------------------
// RpcError
// ---------------------------------------------------------------------------

/// Errors returned by pipeline stages and the order service.
///
/// Each variant maps to exactly one gRPC status code.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RpcError {
    #[error("{0}")]
    InvalidArgument(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    AlreadyExists(String),
    #[error("{0}")]
    Unauthenticated(String),
    #[error("{0}")]
    Unavailable(String),
    #[error("call exceeded its deadline of {timeout_ms}ms")]
    DeadlineExceeded { timeout_ms: u64 },
    #[error("internal error (correlation id: {correlation_id})")]
    Internal { correlation_id: String },
}

impl RpcError {
    #[must_use]
    pub fn code(&self) -> Code {
        match self {
            Self::InvalidArgument(_) => Code::InvalidArgument,
            Self::NotFound(_) => Code::NotFound,
            Self::AlreadyExists(_) => Code::AlreadyExists,
            Self::Unauthenticated(_) => Code::Unauthenticated,
            Self::Unavailable(_) => Code::Unavailable,
            Self::DeadlineExceeded { .. } => Code::DeadlineExceeded,
            Self::Internal { .. } => Code::Internal,
        }
    }

    #[must_use]
    pub fn internal(ctx: &CallContext) -> Self {
        Self::Internal {
            correlation_id: ctx.correlation_id.clone(),
        }
    }
}

impl From<ValidationError> for RpcError {
    fn from(err: ValidationError) -> Self {
        Self::InvalidArgument(err.to_string())
    }
}

impl From<RpcError> for Status {
    fn from(err: RpcError) -> Self {
        Status::new(err.code(), err.to_string())
    }
}

/// The gRPC code an outcome is reported under.
#[must_use]
pub fn outcome_code(result: &Result<OperationResponse, RpcError>) -> Code {
    result.as_ref().map_or_else(RpcError::code, |_| Code::Ok)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
