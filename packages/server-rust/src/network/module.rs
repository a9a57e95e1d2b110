//! Order server with deferred startup lifecycle.
//!
//! Implements the deferred startup pattern: `new()` creates resources,
//! `start()` binds the TCP listener, and `serve()` starts accepting
//! connections. The split lets callers learn the bound port (port 0) and
//! grab a [`ServerHandle`] before serving begins.

use std::future::IntoFuture;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::routing::get;
use axum::Router;
use metrics_exporter_prometheus::PrometheusHandle;
use order_core::api::order::order_service_server::OrderServiceServer;
use tokio::net::TcpListener;
use tracing::{info, warn};

use super::connection::ConnectionRegistry;
use super::handlers::{liveness_handler, metrics_handler, readiness_handler, AppState};
use super::middleware::with_http_layers;
use super::multiplexer::MakeMultiplexer;
use super::shutdown::{stop_requested, HealthState, ShutdownController};
use crate::config::AppConfig;
use crate::gateway::Gateway;
use crate::item::{DialError, ItemClient};
use crate::service::{build_rpc_pipeline, OrderDomainService, RpcFrontend};
use crate::store::OrderStore;

/// How much longer than the grace period `stop()` waits for serving to end.
const STOP_MARGIN: Duration = Duration::from_secs(1);

/// Server lifecycle failures.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("server terminated: {0}")]
    Serve(#[source] std::io::Error),

    #[error(transparent)]
    Dial(#[from] DialError),

    #[error("serve() called before start()")]
    NotStarted,

    #[error("invalid address: {0}")]
    InvalidAddress(String),
}

/// Cloneable handle for stopping a server from another task.
#[derive(Debug, Clone)]
pub struct ServerHandle {
    shutdown: Arc<ShutdownController>,
    grace: Duration,
}

impl ServerHandle {
    /// Requests graceful shutdown and waits for serving to end.
    ///
    /// The listener stops accepting at once; in-flight requests get the
    /// configured grace period, after which they are abandoned. Idempotent,
    /// and returns within the grace period plus a one second margin.
    /// Returns `true` if the server reached `Stopped` in that time.
    pub async fn stop(&self) -> bool {
        if !self.shutdown.is_shutdown_requested() {
            let grace_ms = u64::try_from(self.grace.as_millis()).unwrap_or(u64::MAX);
            info!(grace_ms, "stop requested");
        }
        self.shutdown.trigger_shutdown();
        self.shutdown.wait_until_stopped(self.grace + STOP_MARGIN).await
    }

    #[must_use]
    pub fn health_state(&self) -> HealthState {
        self.shutdown.health_state()
    }
}

/// Serves `order.OrderService` over gRPC and its HTTP/JSON gateway, plus
/// `/metrics`, `/healthz` and `/readyz`, on a single port.
///
/// Follows the deferred startup pattern:
/// 1. `new()` -- dials the item service (lazily) and builds the order store
/// 2. `start()` -- binds the TCP listener to the configured address
/// 3. `serve()` -- accepts connections until [`ServerHandle::stop`]
pub struct OrderServer {
    config: AppConfig,
    metrics: PrometheusHandle,
    store: Arc<OrderStore>,
    registry: Arc<ConnectionRegistry>,
    shutdown: Arc<ShutdownController>,
    listener: Option<TcpListener>,
    start_time: Instant,
}

impl OrderServer {
    /// Creates the server without binding any port. Must be called inside
    /// a Tokio runtime (the item channel spawns its worker there).
    ///
    /// Sample orders are loaded here when `config.service.load_sample_data`
    /// is set.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Dial`] if the item endpoint is not a valid URI.
    pub fn new(config: AppConfig, metrics: PrometheusHandle) -> Result<Self, ServerError> {
        let items = ItemClient::dial(&config.items)?;
        let store = Arc::new(OrderStore::new(Arc::new(items), config.service.item_retry));
        if config.service.load_sample_data {
            let loaded = store.load_sample_data();
            info!(loaded, "sample orders loaded");
        }

        Ok(Self {
            config,
            metrics,
            store,
            registry: Arc::new(ConnectionRegistry::new()),
            shutdown: Arc::new(ShutdownController::new()),
            listener: None,
            start_time: Instant::now(),
        })
    }

    /// Returns a shared reference to the order store.
    #[must_use]
    pub fn store(&self) -> Arc<OrderStore> {
        Arc::clone(&self.store)
    }

    /// Returns a shared reference to the connection registry.
    #[must_use]
    pub fn registry(&self) -> Arc<ConnectionRegistry> {
        Arc::clone(&self.registry)
    }

    #[must_use]
    pub fn handle(&self) -> ServerHandle {
        ServerHandle {
            shutdown: Arc::clone(&self.shutdown),
            grace: self.config.network.shutdown_grace,
        }
    }

    /// Address of the bound listener, once `start()` has succeeded.
    #[must_use]
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.listener.as_ref().and_then(|l| l.local_addr().ok())
    }

    /// Binds the TCP listener to the configured host and port.
    ///
    /// Returns the actual bound port, which may differ from the configured
    /// port when port 0 is used (OS-assigned ephemeral port).
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Bind`] if the address cannot be bound.
    pub async fn start(&mut self) -> Result<u16, ServerError> {
        let addr = self.config.network.bind_address();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| ServerError::Bind {
                addr: addr.clone(),
                source,
            })?;
        let local = listener
            .local_addr()
            .map_err(|source| ServerError::Bind { addr, source })?;

        info!(%local, "TCP listener bound");

        self.shutdown.hold_listener();
        self.listener = Some(listener);
        Ok(local.port())
    }

    /// Assembles the HTTP side: operational routes, then the gateway for
    /// everything else, under the HTTP middleware stack.
    fn http_router(&self, gateway: Gateway) -> Router {
        let state = AppState {
            registry: Arc::clone(&self.registry),
            shutdown: Arc::clone(&self.shutdown),
            metrics: self.metrics.clone(),
            start_time: self.start_time,
        };

        let routes = Router::new()
            .route("/metrics", get(metrics_handler))
            .route("/healthz", get(liveness_handler))
            .route("/readyz", get(readiness_handler))
            .with_state(state)
            .merge(gateway.router());
        with_http_layers(routes, &self.config.network)
    }

    /// Serves connections until [`ServerHandle::stop`] is called.
    ///
    /// After the stop signal the listener is closed and open connections
    /// are asked to finish. Whatever is still running when the grace period
    /// ends is abandoned. Health state reaches `Stopped` before this returns.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::NotStarted`] if `start()` was not called,
    /// [`ServerError::InvalidAddress`] if the loopback channel cannot be
    /// built and [`ServerError::Serve`] on a fatal I/O error.
    pub async fn serve(mut self) -> Result<(), ServerError> {
        let listener = self.listener.take().ok_or(ServerError::NotStarted)?;

        // Ready only if no stop came first; either way the listener is
        // dropped before the phase reads Stopped.
        let result = if self.shutdown.set_ready() {
            self.serve_listener(listener).await
        } else {
            drop(listener);
            Ok(())
        };

        self.shutdown.mark_stopped();
        info!("server stopped");
        result
    }

    /// Runs the multiplexer on `listener` until stopped. Everything that
    /// holds the socket is gone when this returns.
    async fn serve_listener(&self, listener: TcpListener) -> Result<(), ServerError> {
        let local = listener.local_addr().map_err(ServerError::Serve)?;
        let gateway =
            Gateway::loopback(local).map_err(|err| ServerError::InvalidAddress(err.to_string()))?;
        let pipeline = build_rpc_pipeline(
            OrderDomainService::new(Arc::clone(&self.store)),
            &self.config.service,
        );
        let grpc = OrderServiceServer::new(RpcFrontend::new(
            pipeline,
            self.config.service.default_call_timeout,
        ));
        let http = self.http_router(gateway);
        let make = MakeMultiplexer::new(
            grpc,
            http,
            Arc::clone(&self.shutdown),
            Arc::clone(&self.registry),
        );

        let mut serving = Box::pin(
            axum::serve(listener, make)
                .with_graceful_shutdown(stop_requested(self.shutdown.subscribe()))
                .into_future(),
        );
        info!(%local, "serving gRPC and HTTP/JSON");

        let grace = self.config.network.shutdown_grace;
        let result = tokio::select! {
            result = &mut serving => result,
            () = stop_requested(self.shutdown.subscribe()) => {
                info!(
                    connections = self.registry.count(),
                    in_flight = self.shutdown.in_flight_count(),
                    "draining"
                );
                if let Ok(result) = tokio::time::timeout(grace, &mut serving).await {
                    result
                } else {
                    warn!(
                        connections = self.registry.count(),
                        in_flight = self.shutdown.in_flight_count(),
                        "grace period expired, abandoning in-flight requests"
                    );
                    Ok(())
                }
            }
        };

        // Releases the listener along with anything still being served.
        drop(serving);
        result.map_err(ServerError::Serve)
    }
}

impl Drop for OrderServer {
    /// A server dropped with its listener still bound (never served)
    /// releases it here.
    fn drop(&mut self) {
        if let Some(listener) = self.listener.take() {
            drop(listener);
            self.shutdown.mark_stopped();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item::ItemClientConfig;
    use crate::network::NetworkConfig;
    use crate::observability::metrics::build_recorder;

    fn local_config() -> AppConfig {
        AppConfig {
            network: NetworkConfig {
                host: "127.0.0.1".into(),
                port: 0,
                shutdown_grace: Duration::from_millis(500),
                ..NetworkConfig::default()
            },
            ..AppConfig::default()
        }
    }

    fn server(config: AppConfig) -> OrderServer {
        OrderServer::new(config, build_recorder().handle()).unwrap()
    }

    #[tokio::test]
    async fn new_loads_sample_data_without_binding() {
        let server = server(local_config());
        assert!(server.local_addr().is_none());
        assert_eq!(server.store().len(), 3);

        let config = AppConfig {
            service: crate::service::ServiceConfig {
                load_sample_data: false,
                ..Default::default()
            },
            ..local_config()
        };
        assert!(self::server(config).store().is_empty());
    }

    #[tokio::test]
    async fn invalid_item_endpoint_is_dial_error() {
        let config = AppConfig {
            items: ItemClientConfig {
                endpoint: "http://not a host".into(),
                ..ItemClientConfig::default()
            },
            ..local_config()
        };
        let err = OrderServer::new(config, build_recorder().handle())
            .err()
            .unwrap();
        assert!(matches!(err, ServerError::Dial(_)));
    }

    #[tokio::test]
    async fn start_binds_to_os_assigned_port() {
        let mut server = server(local_config());
        let port = server.start().await.unwrap();
        assert!(port > 0, "OS-assigned port should be > 0");
        assert_eq!(server.local_addr().unwrap().port(), port);
    }

    #[tokio::test]
    async fn start_on_taken_port_is_bind_error() {
        let mut first = server(local_config());
        let port = first.start().await.unwrap();

        let mut config = local_config();
        config.network.port = port;
        let err = server(config).start().await.unwrap_err();
        assert!(matches!(err, ServerError::Bind { .. }));
    }

    #[tokio::test]
    async fn serve_without_start_is_not_started() {
        let err = server(local_config()).serve().await.unwrap_err();
        assert!(matches!(err, ServerError::NotStarted));
    }

    #[tokio::test]
    async fn stop_before_start_returns_immediately() {
        let server = server(local_config());
        let handle = server.handle();

        assert!(handle.stop().await);
        assert!(handle.stop().await);
        assert_eq!(handle.health_state(), HealthState::Stopped);
    }

    #[tokio::test]
    async fn stop_before_serve_waits_for_the_listener() {
        let mut server = server(local_config());
        server.start().await.unwrap();
        let addr = server.local_addr().unwrap();
        let handle = server.handle();

        let stopping = tokio::spawn({
            let handle = handle.clone();
            async move { handle.stop().await }
        });
        while handle.health_state() != HealthState::Draining {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(!stopping.is_finished());

        // serve() after stop() releases the port without serving.
        server.serve().await.unwrap();
        assert!(stopping.await.unwrap());
        assert_eq!(handle.health_state(), HealthState::Stopped);
        drop(TcpListener::bind(addr).await.unwrap());
    }

    #[tokio::test]
    async fn dropping_an_unserved_server_releases_the_port() {
        let mut server = server(local_config());
        server.start().await.unwrap();
        let addr = server.local_addr().unwrap();
        let handle = server.handle();

        drop(server);
        assert_eq!(handle.health_state(), HealthState::Stopped);
        assert!(handle.stop().await);
        drop(TcpListener::bind(addr).await.unwrap());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn stop_racing_serve_only_reports_stopped_once_the_port_is_free() {
        for _ in 0..20 {
            let mut server = server(local_config());
            server.start().await.unwrap();
            let addr = server.local_addr().unwrap();
            let handle = server.handle();

            let serving = tokio::spawn(server.serve());
            assert!(handle.stop().await);
            drop(TcpListener::bind(addr).await.unwrap());
            serving.await.unwrap().unwrap();
        }
    }

    #[tokio::test]
    async fn stop_ends_serve_and_releases_listener() {
        let mut server = server(local_config());
        server.start().await.unwrap();
        let addr = server.local_addr().unwrap();
        let handle = server.handle();
        let serving = tokio::spawn(server.serve());

        while handle.health_state() != HealthState::Ready {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        let started = Instant::now();
        assert!(handle.stop().await);
        assert!(handle.stop().await);
        assert!(started.elapsed() < Duration::from_millis(500) + STOP_MARGIN);

        serving.await.unwrap().unwrap();
        assert!(tokio::net::TcpStream::connect(addr).await.is_err());
    }
}
