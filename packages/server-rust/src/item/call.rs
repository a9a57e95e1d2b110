//! Outbound item-service calls as they travel through the client chain.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use order_core::api::item::SERVICE_NAME;
use order_core::{GetItemRequest, Item, ListItemsRequest, ListItemsResponse};
use tonic::metadata::MetadataMap;
use tonic::{Code, Status};

use crate::service::context::CallContext;

/// Boxed future returned by every client chain stage.
pub type ItemFuture = Pin<Box<dyn Future<Output = Result<ItemReply, ItemError>> + Send>>;

/// Request message of an outbound call.
#[derive(Debug, Clone, PartialEq)]
pub enum ItemRequest {
    Get(GetItemRequest),
    List(ListItemsRequest),
}

impl ItemRequest {
    #[must_use]
    pub fn method(&self) -> &'static str {
        match self {
            Self::Get(_) => "GetItem",
            Self::List(_) => "ListItems",
        }
    }

    #[must_use]
    pub fn service(&self) -> &'static str {
        SERVICE_NAME
    }
}

/// Successful reply of an outbound call.
#[derive(Debug, Clone, PartialEq)]
pub enum ItemReply {
    Item(Item),
    Items(ListItemsResponse),
}

/// One outbound call to the item service.
#[derive(Debug, Clone)]
pub struct ItemCall {
    pub request: ItemRequest,
    /// Headers of the inbound call this one is made on behalf of.
    pub inbound: MetadataMap,
    /// Time left on the inbound call's deadline.
    pub remaining: Duration,
    /// Metadata sent on the wire. Filled by the identity stage.
    pub metadata: MetadataMap,
    /// Deadline sent on the wire. Filled by the identity stage.
    pub timeout: Option<Duration>,
}

impl ItemCall {
    #[must_use]
    pub fn new(ctx: &CallContext, request: ItemRequest) -> Self {
        Self {
            request,
            inbound: ctx.propagated.clone(),
            remaining: ctx.remaining(),
            metadata: MetadataMap::new(),
            timeout: None,
        }
    }
}

// ---------------------------------------------------------------------------
// ItemError
// ---------------------------------------------------------------------------

/// Classified outcome of a failed item-service call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ItemError {
    #[error("item {0} not found")]
    NotFound(String),
    #[error("item service unavailable: {0}")]
    Unavailable(String),
    #[error("item service call exceeded its deadline")]
    DeadlineExceeded,
    #[error("item service rejected the call ({code:?}): {message}")]
    Rejected { code: Code, message: String },
}

impl ItemError {
    /// Classifies a status returned for a call concerning `id`.
    #[must_use]
    pub fn from_status(status: &Status, id: &str) -> Self {
        match status.code() {
            Code::NotFound => Self::NotFound(id.to_string()),
            Code::Unavailable | Code::Unknown | Code::Aborted | Code::ResourceExhausted => {
                Self::Unavailable(status.message().to_string())
            }
            Code::DeadlineExceeded | Code::Cancelled => Self::DeadlineExceeded,
            code => Self::Rejected {
                code,
                message: status.message().to_string(),
            },
        }
    }

    /// The code this outcome is reported under in client metrics.
    #[must_use]
    pub fn code(&self) -> Code {
        match self {
            Self::NotFound(_) => Code::NotFound,
            Self::Unavailable(_) => Code::Unavailable,
            Self::DeadlineExceeded => Code::DeadlineExceeded,
            Self::Rejected { code, .. } => *code,
        }
    }

    /// Whether a later attempt of the same call may succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}
