//! Per-call context carried through the RPC pipeline.

use std::time::{Duration, Instant};

use order_core::api::order::{paths, SERVICE_NAME};
use tonic::metadata::MetadataMap;

/// Header carrying the caller's correlation id.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Header carrying the caller's bearer credential.
pub const AUTHORIZATION_HEADER: &str = "authorization";

/// Header carrying the caller's deadline (gRPC wire format).
pub const GRPC_TIMEOUT_HEADER: &str = "grpc-timeout";

/// Headers copied from an inbound call onto every outbound call it makes.
///
/// The set covers request correlation, Zipkin B3 and `OpenTracing` span
/// context, and the caller's credential.
pub const PROPAGATED_HEADERS: &[&str] = &[
    REQUEST_ID_HEADER,
    "x-b3-traceid",
    "x-b3-spanid",
    "x-b3-parentspanid",
    "x-b3-sampled",
    "x-b3-flags",
    "x-ot-span-context",
    AUTHORIZATION_HEADER,
];

// ---------------------------------------------------------------------------
// RpcMethod
// ---------------------------------------------------------------------------

/// The methods of `order.OrderService`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RpcMethod {
    CreateOrder,
    GetOrder,
    ListOrders,
    DeleteOrder,
}

impl RpcMethod {
    /// Fully-qualified service name, used as the `grpc_service` label.
    #[must_use]
    pub fn service(self) -> &'static str {
        SERVICE_NAME
    }

    /// Bare method name, used as the `grpc_method` label.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::CreateOrder => "CreateOrder",
            Self::GetOrder => "GetOrder",
            Self::ListOrders => "ListOrders",
            Self::DeleteOrder => "DeleteOrder",
        }
    }

    /// HTTP/2 path the method is served on.
    #[must_use]
    pub fn path(self) -> &'static str {
        match self {
            Self::CreateOrder => paths::CREATE_ORDER,
            Self::GetOrder => paths::GET_ORDER,
            Self::ListOrders => paths::LIST_ORDERS,
            Self::DeleteOrder => paths::DELETE_ORDER,
        }
    }
}

// ---------------------------------------------------------------------------
// Identity
// ---------------------------------------------------------------------------

/// Caller identity established by the identity stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Identity {
    /// No credential was presented.
    Anonymous,
    /// A well-formed `Bearer` credential was presented.
    Bearer(String),
}

// ---------------------------------------------------------------------------
// CallContext
// ---------------------------------------------------------------------------

/// Metadata for a single RPC call, created when the call enters the pipeline
/// and dropped when it completes.
#[derive(Debug, Clone)]
pub struct CallContext {
    /// Process-unique, monotonically increasing call id.
    pub call_id: u64,
    /// Caller-supplied `x-request-id`, or a generated UUID.
    pub correlation_id: String,
    pub method: RpcMethod,
    pub started_at: Instant,
    /// Time budget for the whole call, measured from `started_at`.
    pub timeout: Duration,
    /// Inbound request metadata as received.
    pub metadata: MetadataMap,
    /// Headers to forward on outbound calls. Filled by the identity stage.
    pub propagated: MetadataMap,
    pub identity: Identity,
}

impl CallContext {
    /// Builds the context for an inbound call.
    ///
    /// The deadline comes from the `grpc-timeout` header when the caller sent
    /// one, capped at `default_timeout`.
    #[must_use]
    pub fn new(
        call_id: u64,
        method: RpcMethod,
        metadata: MetadataMap,
        default_timeout: Duration,
    ) -> Self {
        let correlation_id = metadata
            .get(REQUEST_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.is_empty())
            .map_or_else(|| uuid::Uuid::new_v4().to_string(), str::to_string);

        let timeout = metadata
            .get(GRPC_TIMEOUT_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_grpc_timeout)
            .map_or(default_timeout, |t| t.min(default_timeout));

        Self {
            call_id,
            correlation_id,
            method,
            started_at: Instant::now(),
            timeout,
            metadata,
            propagated: MetadataMap::new(),
            identity: Identity::Anonymous,
        }
    }

    #[must_use]
    pub fn deadline(&self) -> Instant {
        self.started_at + self.timeout
    }

    /// Time left before the deadline; zero once it has passed.
    #[must_use]
    pub fn remaining(&self) -> Duration {
        self.deadline().saturating_duration_since(Instant::now())
    }
}

/// Parses a `grpc-timeout` header value: up to eight ASCII digits followed by
/// one of the units `H`, `M`, `S`, `m`, `u`, `n`.
#[must_use]
pub fn parse_grpc_timeout(value: &str) -> Option<Duration> {
    if value.len() < 2 || !value.is_ascii() {
        return None;
    }
    let (digits, unit) = value.split_at(value.len() - 1);
    if digits.len() > 8 || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let amount: u64 = digits.parse().ok()?;
    let duration = match unit {
        "H" => Duration::from_secs(amount * 3600),
        "M" => Duration::from_secs(amount * 60),
        "S" => Duration::from_secs(amount),
        "m" => Duration::from_millis(amount),
        "u" => Duration::from_micros(amount),
        "n" => Duration::from_nanos(amount),
        _ => return None,
    };
    Some(duration)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
