//! Per-request protocol routing for the shared listener.
//!
//! Every accepted connection gets a [`Multiplexer`] from [`MakeMultiplexer`].
//! Each request on it is classified on its own and handed either to the gRPC
//! server or to the HTTP router; earlier requests on the same connection
//! never influence the decision.

use std::convert::Infallible;
use std::future::{ready, Ready};
use std::sync::Arc;
use std::task::{Context, Poll};

use axum::body::Body;
use axum::extract::Request;
use axum::http::header::CONTENT_TYPE;
use axum::http::Version;
use axum::response::Response;
use axum::serve::IncomingStream;
use futures_util::future::BoxFuture;
use tokio::net::TcpListener;
use tower::{Service, ServiceExt};

use super::connection::{ConnectionGuard, ConnectionRegistry};
use super::shutdown::ShutdownController;

/// Which handler a request belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    /// Native gRPC call.
    Rpc,
    /// Anything else: metrics, health, gateway.
    Http,
}

/// Decides where a request goes.
///
/// A request is `Rpc` iff it arrived over HTTP/2 and its `content-type`
/// starts with `application/grpc` (which covers `+proto` and other
/// suffixes). Depends on nothing but the request itself.
pub fn classify<B>(request: &http::Request<B>) -> Protocol {
    let grpc_content = request
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|ct| ct.starts_with("application/grpc"));

    if request.version() == Version::HTTP_2 && grpc_content {
        Protocol::Rpc
    } else {
        Protocol::Http
    }
}

// ---------------------------------------------------------------------------
// Multiplexer
// ---------------------------------------------------------------------------

/// Routes each request on one connection to `grpc` or `http`.
#[derive(Debug, Clone)]
pub struct Multiplexer<G, H> {
    grpc: G,
    http: H,
    shutdown: Arc<ShutdownController>,
    connection: Option<Arc<ConnectionGuard>>,
}

impl<G, H> Multiplexer<G, H> {
    /// A multiplexer not tied to any registered connection.
    pub fn new(grpc: G, http: H, shutdown: Arc<ShutdownController>) -> Self {
        Self {
            grpc,
            http,
            shutdown,
            connection: None,
        }
    }
}

impl<G, H> Service<Request> for Multiplexer<G, H>
where
    G: Service<Request, Response = http::Response<tonic::body::BoxBody>, Error = Infallible>
        + Clone
        + Send
        + 'static,
    G::Future: Send + 'static,
    H: Service<Request, Response = Response, Error = Infallible> + Clone + Send + 'static,
    H::Future: Send + 'static,
{
    type Response = Response;
    type Error = Infallible;
    type Future = BoxFuture<'static, Result<Response, Infallible>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        // Both sides are cloned per request and driven with oneshot.
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, request: Request) -> Self::Future {
        let guard = self.shutdown.in_flight_guard();
        if let Some(connection) = &self.connection {
            connection.record_request();
        }

        match classify(&request) {
            Protocol::Rpc => {
                let grpc = self.grpc.clone();
                Box::pin(async move {
                    let response = grpc.oneshot(request).await?;
                    drop(guard);
                    Ok(response.map(Body::new))
                })
            }
            Protocol::Http => {
                let http = self.http.clone();
                Box::pin(async move {
                    let response = http.oneshot(request).await?;
                    drop(guard);
                    Ok(response)
                })
            }
        }
    }
}

// ---------------------------------------------------------------------------
// MakeMultiplexer
// ---------------------------------------------------------------------------

/// Produces one [`Multiplexer`] per accepted connection and registers the
/// connection for as long as that multiplexer lives.
#[derive(Debug, Clone)]
pub struct MakeMultiplexer<G, H> {
    grpc: G,
    http: H,
    shutdown: Arc<ShutdownController>,
    registry: Arc<ConnectionRegistry>,
}

impl<G, H> MakeMultiplexer<G, H> {
    pub fn new(
        grpc: G,
        http: H,
        shutdown: Arc<ShutdownController>,
        registry: Arc<ConnectionRegistry>,
    ) -> Self {
        Self {
            grpc,
            http,
            shutdown,
            registry,
        }
    }
}

impl<G, H> Service<IncomingStream<'_, TcpListener>> for MakeMultiplexer<G, H>
where
    G: Clone,
    H: Clone,
{
    type Response = Multiplexer<G, H>;
    type Error = Infallible;
    type Future = Ready<Result<Self::Response, Infallible>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, stream: IncomingStream<'_, TcpListener>) -> Self::Future {
        let connection = self.registry.register(*stream.remote_addr());
        ready(Ok(Multiplexer {
            grpc: self.grpc.clone(),
            http: self.http.clone(),
            shutdown: Arc::clone(&self.shutdown),
            connection: Some(Arc::new(connection)),
        }))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
