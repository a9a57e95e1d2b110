use std::task::{Context, Poll};
use std::time::Duration;

use async_trait::async_trait;
use order_core::api::item::item_service_client::ItemServiceClient;
use order_core::{GetItemRequest, Item, ListItemsRequest};
use tonic::metadata::MetadataMap;
use tonic::transport::{Channel, Endpoint};
use tower::{Service, ServiceBuilder, ServiceExt};
use tracing::debug;

use super::call::{ItemCall, ItemError, ItemFuture, ItemReply, ItemRequest};
use super::middleware::{
    ClientIdentityLayer, ClientIdentityService, ClientMetricsLayer, ClientMetricsService,
};
use crate::service::context::CallContext;
use crate::traits::ItemCatalog;

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

/// Where and how to reach the item service.
#[derive(Debug, Clone)]
pub struct ItemClientConfig {
    /// `host:port` or a full `http://` URI.
    pub endpoint: String,
    pub connect_timeout: Duration,
}

impl Default for ItemClientConfig {
    fn default() -> Self {
        Self {
            endpoint: "127.0.0.1:9090".to_string(),
            connect_timeout: Duration::from_secs(5),
        }
    }
}

/// The item endpoint could not be turned into a channel.
#[derive(Debug, thiserror::Error)]
#[error("invalid item service endpoint {endpoint:?}: {source}")]
pub struct DialError {
    pub endpoint: String,
    #[source]
    pub source: tonic::transport::Error,
}

// ---------------------------------------------------------------------------
// ItemTransport
// ---------------------------------------------------------------------------

/// Innermost stage: issues the call on the tonic channel.
#[derive(Debug, Clone)]
pub struct ItemTransport {
    client: ItemServiceClient<Channel>,
}

impl ItemTransport {
    #[must_use]
    pub fn new(channel: Channel) -> Self {
        Self {
            client: ItemServiceClient::new(channel),
        }
    }
}

fn wire_request<T>(
    message: T,
    metadata: MetadataMap,
    timeout: Option<Duration>,
) -> tonic::Request<T> {
    let mut request = tonic::Request::new(message);
    *request.metadata_mut() = metadata;
    if let Some(timeout) = timeout {
        request.set_timeout(timeout);
    }
    request
}

impl Service<ItemCall> for ItemTransport {
    type Response = ItemReply;
    type Error = ItemError;
    type Future = ItemFuture;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, call: ItemCall) -> Self::Future {
        let mut client = self.client.clone();
        let ItemCall {
            request,
            metadata,
            timeout,
            ..
        } = call;
        Box::pin(async move {
            match request {
                ItemRequest::Get(req) => {
                    let id = req.id.clone();
                    client
                        .get_item(wire_request(req, metadata, timeout))
                        .await
                        .map(|resp| ItemReply::Item(resp.into_inner()))
                        .map_err(|status| ItemError::from_status(&status, &id))
                }
                ItemRequest::List(req) => client
                    .list_items(wire_request(req, metadata, timeout))
                    .await
                    .map(|resp| ItemReply::Items(resp.into_inner()))
                    .map_err(|status| ItemError::from_status(&status, "")),
            }
        })
    }
}

// ---------------------------------------------------------------------------
// ItemClient
// ---------------------------------------------------------------------------

/// The full outbound stack produced by [`ItemClient::dial`].
pub type ItemStack = ClientIdentityService<ClientMetricsService<ItemTransport>>;

/// Typed item-service client. Cheap to clone; immutable after dial.
#[derive(Debug, Clone)]
pub struct ItemClient<S = ItemStack> {
    service: S,
}

impl ItemClient {
    /// Builds a lazily-connecting client for `config.endpoint`. No network
    /// I/O happens until the first call. Must be called inside a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`DialError`] if the endpoint is not a valid URI.
    pub fn dial(config: &ItemClientConfig) -> Result<Self, DialError> {
        let uri = if config.endpoint.contains("://") {
            config.endpoint.clone()
        } else {
            format!("http://{}", config.endpoint)
        };
        let endpoint = Endpoint::from_shared(uri).map_err(|source| DialError {
            endpoint: config.endpoint.clone(),
            source,
        })?;
        let channel = endpoint.connect_timeout(config.connect_timeout).connect_lazy();
        debug!(endpoint = %config.endpoint, "item service channel created");
        Ok(Self::from_service(ItemTransport::new(channel)))
    }
}

impl<T> ItemClient<ClientIdentityService<ClientMetricsService<T>>>
where
    T: Service<ItemCall, Response = ItemReply, Error = ItemError, Future = ItemFuture>,
{
    /// Wraps `transport` in the outbound chain.
    pub fn from_service(transport: T) -> Self {
        let service = ServiceBuilder::new()
            .layer(ClientIdentityLayer)
            .layer(ClientMetricsLayer)
            .service(transport);
        Self { service }
    }
}

impl<S> ItemClient<S>
where
    S: Service<ItemCall, Response = ItemReply, Error = ItemError, Future = ItemFuture>
        + Clone
        + Send
        + Sync,
{
    async fn send(&self, ctx: &CallContext, request: ItemRequest) -> Result<ItemReply, ItemError> {
        self.service.clone().oneshot(ItemCall::new(ctx, request)).await
    }
}

#[async_trait]
impl<S> ItemCatalog for ItemClient<S>
where
    S: Service<ItemCall, Response = ItemReply, Error = ItemError, Future = ItemFuture>
        + Clone
        + Send
        + Sync,
{
    async fn get_item(&self, ctx: &CallContext, id: &str) -> Result<Item, ItemError> {
        let request = ItemRequest::Get(GetItemRequest { id: id.to_string() });
        match self.send(ctx, request).await? {
            ItemReply::Item(item) => Ok(item),
            ItemReply::Items(_) => Err(unexpected_reply("GetItem")),
        }
    }

    async fn list_items(
        &self,
        ctx: &CallContext,
        filter: ListItemsRequest,
    ) -> Result<Vec<Item>, ItemError> {
        match self.send(ctx, ItemRequest::List(filter)).await? {
            ItemReply::Items(list) => Ok(list.items),
            ItemReply::Item(_) => Err(unexpected_reply("ListItems")),
        }
    }
}

fn unexpected_reply(method: &str) -> ItemError {
    ItemError::Rejected {
        code: tonic::Code::Internal,
        message: format!("unexpected reply type for {method}"),
    }
}
