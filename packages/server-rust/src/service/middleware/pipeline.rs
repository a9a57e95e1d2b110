//! Pipeline composition: combines all middleware layers into a single service stack.

use tower::{Service, ServiceBuilder};

use super::identity::IdentityLayer;
use super::logging::LoggingLayer;
use super::metrics::MetricsLayer;
use super::recovery::RecoveryLayer;
use super::sleeper::SleeperLayer;
use super::timeout::TimeoutLayer;
use super::validation::ValidationLayer;
use crate::service::config::ServiceConfig;
use crate::service::operation::{Operation, OperationResponse, RpcError, RpcFuture};

/// Build the RPC pipeline by wrapping the order service with middleware layers.
///
/// Layer order (outermost to innermost):
/// 1. `MetricsLayer` -- one observation per call, whatever the outcome
/// 2. `LoggingLayer` -- per-call span and completion event
/// 3. `TimeoutLayer` -- enforce the call deadline
/// 4. `IdentityLayer` -- propagate headers, check the bearer credential
/// 5. `SleeperLayer` -- injected latency (pass-through when zero)
/// 6. `ValidationLayer` -- reject malformed requests
/// 7. `RecoveryLayer` -- turn handler panics into `Internal`
///
/// Any stage may short-circuit; metrics and logging still observe the result.
#[must_use]
pub fn build_rpc_pipeline<S>(
    service: S,
    config: &ServiceConfig,
) -> impl Service<Operation, Response = OperationResponse, Error = RpcError, Future = RpcFuture>
       + Clone
       + Send
       + Sync
       + 'static
where
    S: Service<Operation, Response = OperationResponse, Error = RpcError>
        + Clone
        + Send
        + Sync
        + 'static,
    S::Future: Send + 'static,
{
    ServiceBuilder::new()
        .layer(MetricsLayer)
        .layer(LoggingLayer)
        .layer(TimeoutLayer)
        .layer(IdentityLayer::new(config.require_auth))
        .layer(SleeperLayer::new(config.sleeper_delay))
        .layer(ValidationLayer)
        .layer(RecoveryLayer)
        .service(service)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
