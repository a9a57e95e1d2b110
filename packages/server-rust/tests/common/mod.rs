//! Shared harness: an in-process item service and a server on port 0.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use order_core::api::item::item_service_server::{ItemService, ItemServiceServer};
use order_core::api::order::order_service_client::OrderServiceClient;
use order_core::{GetItemRequest, Item, ListItemsRequest, ListItemsResponse};
use order_server::item::ItemClientConfig;
use order_server::network::{HealthState, NetworkConfig};
use order_server::service::ServiceConfig;
use order_server::store::OrderStore;
use order_server::{AppConfig, OrderServer, ServerError, ServerHandle};
use parking_lot::Mutex;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::TcpListenerStream;
use tonic::metadata::MetadataMap;
use tonic::transport::Channel;
use tonic::{Request, Response, Status};

// ---------------------------------------------------------------------------
// Fake item service
// ---------------------------------------------------------------------------

/// Knows `item-1` through `item-4` and remembers the metadata of every call.
#[derive(Clone, Default)]
pub struct FakeItems {
    seen: Arc<Mutex<Vec<MetadataMap>>>,
}

impl FakeItems {
    pub fn seen(&self) -> Vec<MetadataMap> {
        self.seen.lock().clone()
    }

    fn item(id: &str) -> Option<Item> {
        let known = ["item-1", "item-2", "item-3", "item-4"];
        known.contains(&id).then(|| Item {
            id: id.to_string(),
            name: format!("Item {id}"),
            description: String::new(),
            price_cents: 100,
            available: true,
        })
    }
}

#[tonic::async_trait]
impl ItemService for FakeItems {
    async fn get_item(&self, request: Request<GetItemRequest>) -> Result<Response<Item>, Status> {
        self.seen.lock().push(request.metadata().clone());
        let id = request.into_inner().id;
        Self::item(&id)
            .map(Response::new)
            .ok_or_else(|| Status::not_found(format!("item {id} not found")))
    }

    async fn list_items(
        &self,
        request: Request<ListItemsRequest>,
    ) -> Result<Response<ListItemsResponse>, Status> {
        self.seen.lock().push(request.metadata().clone());
        let items = request
            .into_inner()
            .ids
            .iter()
            .filter_map(|id| Self::item(id))
            .collect();
        Ok(Response::new(ListItemsResponse { items }))
    }
}

/// Serves `items` on an ephemeral local port.
pub async fn spawn_item_service(items: FakeItems) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(
        tonic::transport::Server::builder()
            .add_service(ItemServiceServer::new(items))
            .serve_with_incoming(TcpListenerStream::new(listener)),
    );
    addr
}

// ---------------------------------------------------------------------------
// Metrics
// ---------------------------------------------------------------------------

/// Sums every sample of `metric` in a `/metrics` rendering whose line carries
/// all of `labels`.
pub fn sum_samples(rendered: &str, metric: &str, labels: &[&str]) -> f64 {
    rendered
        .lines()
        .filter(|line| !line.starts_with('#'))
        .filter(|line| {
            line.strip_prefix(metric)
                .is_some_and(|rest| rest.starts_with('{') || rest.starts_with(' '))
        })
        .filter(|line| labels.iter().all(|label| line.contains(label)))
        .filter_map(|line| line.rsplit(' ').next()?.parse::<f64>().ok())
        .sum()
}

// ---------------------------------------------------------------------------
// Order server
// ---------------------------------------------------------------------------

pub struct TestServer {
    pub addr: SocketAddr,
    pub handle: ServerHandle,
    pub items: FakeItems,
    pub store: Arc<OrderStore>,
    serving: JoinHandle<Result<(), ServerError>>,
}

impl TestServer {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub async fn grpc(&self) -> OrderServiceClient<Channel> {
        OrderServiceClient::connect(format!("http://{}", self.addr))
            .await
            .unwrap()
    }

    /// Stops the server and waits for `serve()` to return.
    pub async fn shutdown(self) {
        assert!(self.handle.stop().await);
        self.serving.await.unwrap().unwrap();
    }
}

/// Service settings used unless a test needs something else: no sample
/// data, so the order book starts empty.
pub fn test_service_config() -> ServiceConfig {
    ServiceConfig {
        load_sample_data: false,
        ..ServiceConfig::default()
    }
}

/// Starts a fake item service and an order server wired to it, and waits
/// until the server reports ready.
pub async fn spawn_server(service: ServiceConfig) -> TestServer {
    let items = FakeItems::default();
    let item_addr = spawn_item_service(items.clone()).await;

    let config = AppConfig {
        network: NetworkConfig {
            host: "127.0.0.1".into(),
            port: 0,
            shutdown_grace: Duration::from_secs(2),
            ..NetworkConfig::default()
        },
        service,
        items: ItemClientConfig {
            endpoint: item_addr.to_string(),
            ..ItemClientConfig::default()
        },
    };

    let metrics = order_server::observability::install_metrics();
    let mut server = OrderServer::new(config, metrics).unwrap();
    server.start().await.unwrap();
    let addr = server.local_addr().unwrap();
    let handle = server.handle();
    let store = server.store();
    let serving = tokio::spawn(server.serve());

    while handle.health_state() != HealthState::Ready {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    TestServer {
        addr,
        handle,
        items,
        store,
        serving,
    }
}
