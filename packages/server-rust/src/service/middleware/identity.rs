//! Identity and context propagation middleware.
//!
//! Copies the propagated header set from the inbound metadata into the call
//! context, makes sure the correlation id travels as `x-request-id`, and
//! checks the `authorization` header.

use std::task::{Context, Poll};

use tower::{Layer, Service};

use crate::service::context::{
    CallContext, Identity, AUTHORIZATION_HEADER, PROPAGATED_HEADERS, REQUEST_ID_HEADER,
};
use crate::service::operation::{Operation, OperationResponse, RpcError, RpcFuture};

#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityLayer {
    require_auth: bool,
}

impl IdentityLayer {
    #[must_use]
    pub fn new(require_auth: bool) -> Self {
        Self { require_auth }
    }
}

impl<S> Layer<S> for IdentityLayer {
    type Service = IdentityService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        IdentityService {
            inner,
            require_auth: self.require_auth,
        }
    }
}

#[derive(Debug, Clone)]
pub struct IdentityService<S> {
    inner: S,
    require_auth: bool,
}

/// Fills `ctx.propagated` and `ctx.identity`.
///
/// # Errors
///
/// Returns `Unauthenticated` for a malformed `authorization` header, or for a
/// missing one when `require_auth` is set.
pub fn establish_identity(ctx: &mut CallContext, require_auth: bool) -> Result<(), RpcError> {
    for key in PROPAGATED_HEADERS {
        if let Some(value) = ctx.metadata.get(*key) {
            ctx.propagated.insert(*key, value.clone());
        }
    }
    if !ctx.propagated.contains_key(REQUEST_ID_HEADER) {
        if let Ok(value) = ctx.correlation_id.parse() {
            ctx.propagated.insert(REQUEST_ID_HEADER, value);
        }
    }

    ctx.identity = match ctx.metadata.get(AUTHORIZATION_HEADER) {
        None if require_auth => {
            return Err(RpcError::Unauthenticated("missing bearer token".into()));
        }
        None => Identity::Anonymous,
        Some(value) => {
            let token = value
                .to_str()
                .ok()
                .and_then(|v| v.strip_prefix("Bearer "))
                .filter(|t| !t.is_empty() && !t.chars().any(char::is_whitespace))
                .ok_or_else(|| RpcError::Unauthenticated("malformed authorization header".into()))?;
            Identity::Bearer(token.to_string())
        }
    };
    Ok(())
}

impl<S> Service<Operation> for IdentityService<S>
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

    fn call(&mut self, mut op: Operation) -> Self::Future {
        match establish_identity(op.ctx_mut(), self.require_auth) {
            Ok(()) => Box::pin(self.inner.call(op)),
            Err(err) => Box::pin(async move { Err(err) }),
        }
    }
}
