//! Structured logging middleware.
//!
//! Opens one `rpc` span per call and emits one completion event inside it.
//! Client-side outcomes log at `info`, capacity and deadline problems at
//! `warn`, server faults at `error`.

use std::task::{Context, Poll};
use tonic::Code;
use tower::{Layer, Service};
use tracing::{info_span, Instrument};

use crate::observability::metrics::code_label;
use crate::service::operation::{outcome_code, Operation, OperationResponse, RpcError, RpcFuture};

#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingLayer;

impl<S> Layer<S> for LoggingLayer {
    type Service = LoggingService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        LoggingService { inner }
    }
}

#[derive(Debug, Clone)]
pub struct LoggingService<S> {
    inner: S,
}

impl<S> Service<Operation> for LoggingService<S>
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
        let ctx = op.ctx();
        let method = ctx.method;
        let started_at = ctx.started_at;
        let span = info_span!(
            "rpc",
            grpc.service = method.service(),
            grpc.method = method.name(),
            call_id = ctx.call_id,
            correlation_id = %ctx.correlation_id,
            grpc.code = tracing::field::Empty,
            duration_ms = tracing::field::Empty,
        );

        let fut = span.in_scope(|| self.inner.call(op));

        Box::pin(
            async move {
                let result = fut.await;
                let code = outcome_code(&result);
                let label = code_label(code);

                // Measured from call entry, so time spent waiting for
                // readiness counts too.
                let duration_ms =
                    u64::try_from(started_at.elapsed().as_millis()).unwrap_or(u64::MAX);
                let span = tracing::Span::current();
                span.record("grpc.code", label);
                span.record("duration_ms", duration_ms);

                match (&result, code) {
                    (Ok(_), _) => tracing::info!(duration_ms, "finished unary call with code OK"),
                    (
                        Err(err),
                        Code::Internal | Code::Unknown | Code::DataLoss | Code::Unimplemented,
                    ) => {
                        tracing::error!(
                            duration_ms,
                            error = %err,
                            grpc.code = label,
                            "finished unary call"
                        );
                    }
                    (
                        Err(err),
                        Code::DeadlineExceeded | Code::Unavailable | Code::ResourceExhausted,
                    ) => {
                        tracing::warn!(
                            duration_ms,
                            error = %err,
                            grpc.code = label,
                            "finished unary call"
                        );
                    }
                    (Err(err), _) => {
                        tracing::info!(
                            duration_ms,
                            error = %err,
                            grpc.code = label,
                            "finished unary call"
                        );
                    }
                }

                result
            }
            .instrument(span),
        )
    }
}
