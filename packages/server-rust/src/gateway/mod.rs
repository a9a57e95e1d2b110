//! HTTP/JSON gateway in front of `order.OrderService`.
//!
//! Every route is translated into a native RPC sent over a loopback channel
//! to the server's own port, so gateway calls run through the same
//! interceptor chain (and the same metrics) as direct gRPC calls.

pub mod error;
pub mod json;

pub use error::{http_status, GatewayError};
pub use json::{CreateOrderBody, LineItemJson, OrderJson, OrderListJson};

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, Method, Uri};
use axum::routing::get;
use axum::{Json, Router};
use order_core::api::order::order_service_client::OrderServiceClient;
use order_core::{CreateOrderRequest, DeleteOrderRequest, GetOrderRequest, ListOrdersRequest};
use tonic::metadata::MetadataValue;
use tonic::transport::{Channel, Endpoint};

use crate::service::context::{parse_grpc_timeout, GRPC_TIMEOUT_HEADER, PROPAGATED_HEADERS};

/// Shared state of the gateway routes: a client for the loopback channel.
#[derive(Debug, Clone)]
pub struct Gateway {
    client: OrderServiceClient<Channel>,
}

impl Gateway {
    /// Creates a gateway that calls the RPC server listening on `local`.
    ///
    /// The channel connects lazily on first use. An unspecified bind address
    /// (`0.0.0.0`, `::`) is reached through the matching loopback address.
    ///
    /// # Errors
    ///
    /// Returns the transport error if the address does not form a valid URI.
    pub fn loopback(local: SocketAddr) -> Result<Self, tonic::transport::Error> {
        let ip = match local.ip() {
            IpAddr::V4(ip) if ip.is_unspecified() => IpAddr::V4(Ipv4Addr::LOCALHOST),
            IpAddr::V6(ip) if ip.is_unspecified() => IpAddr::V6(Ipv6Addr::LOCALHOST),
            ip => ip,
        };
        let target = SocketAddr::new(ip, local.port());
        let channel = Endpoint::from_shared(format!("http://{target}"))?.connect_lazy();
        Ok(Self::new(OrderServiceClient::new(channel)))
    }

    #[must_use]
    pub fn new(client: OrderServiceClient<Channel>) -> Self {
        Self { client }
    }

    /// Routes:
    /// - `POST /v1/orders` -- `CreateOrder`
    /// - `GET /v1/orders` -- `ListOrders`
    /// - `GET /v1/orders/{id}` -- `GetOrder`
    /// - `DELETE /v1/orders/{id}` -- `DeleteOrder`
    ///
    /// Any other path answers 404, and any other verb on these paths 405,
    /// both with a JSON error body.
    pub fn router(self) -> Router {
        Router::new()
            .route("/v1/orders", get(list_orders).post(create_order))
            .route("/v1/orders/{id}", get(get_order).delete(delete_order))
            .method_not_allowed_fallback(wrong_verb)
            .fallback(no_route)
            .with_state(self)
    }
}

/// Wraps `message` in a tonic request carrying the propagated HTTP headers
/// as metadata. A `grpc-timeout` header becomes the call's deadline.
fn outbound<T>(headers: &HeaderMap, message: T) -> tonic::Request<T> {
    let mut request = tonic::Request::new(message);
    for name in PROPAGATED_HEADERS {
        let value = headers
            .get(*name)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| MetadataValue::try_from(value).ok());
        if let Some(value) = value {
            request.metadata_mut().insert(*name, value);
        }
    }
    let timeout = headers
        .get(GRPC_TIMEOUT_HEADER)
        .and_then(|value| value.to_str().ok())
        .and_then(parse_grpc_timeout);
    if let Some(timeout) = timeout {
        request.set_timeout(timeout);
    }
    request
}

async fn create_order(
    State(gateway): State<Gateway>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<OrderJson>, GatewayError> {
    let body: CreateOrderBody = serde_json::from_slice(&body)
        .map_err(|err| GatewayError::MalformedBody(err.to_string()))?;
    let request = outbound(&headers, CreateOrderRequest::from(body));
    let order = gateway.client.clone().create_order(request).await?;
    Ok(Json(order.into_inner().into()))
}

async fn list_orders(
    State(gateway): State<Gateway>,
    headers: HeaderMap,
) -> Result<Json<OrderListJson>, GatewayError> {
    let request = outbound(&headers, ListOrdersRequest {});
    let orders = gateway.client.clone().list_orders(request).await?;
    Ok(Json(orders.into_inner().into()))
}

async fn get_order(
    State(gateway): State<Gateway>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<OrderJson>, GatewayError> {
    let request = outbound(&headers, GetOrderRequest { id });
    let order = gateway.client.clone().get_order(request).await?;
    Ok(Json(order.into_inner().into()))
}

async fn delete_order(
    State(gateway): State<Gateway>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, GatewayError> {
    let request = outbound(&headers, DeleteOrderRequest { id });
    gateway.client.clone().delete_order(request).await?;
    Ok(Json(serde_json::json!({})))
}

async fn no_route(method: Method, uri: Uri) -> GatewayError {
    GatewayError::NoRoute {
        method: method.to_string(),
        path: uri.path().to_string(),
    }
}

async fn wrong_verb(method: Method, uri: Uri) -> GatewayError {
    GatewayError::MethodNotAllowed {
        method: method.to_string(),
        path: uri.path().to_string(),
    }
}
