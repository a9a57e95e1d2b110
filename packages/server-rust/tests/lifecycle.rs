//! One port, two protocols, and a bounded stop.

mod common;

use std::time::{Duration, Instant};

use order_core::ListOrdersRequest;
use order_server::network::HealthState;
use reqwest::StatusCode;

use common::{spawn_server, test_service_config};

#[tokio::test]
async fn grpc_and_http_share_the_port() {
    let server = spawn_server(test_service_config()).await;
    let mut grpc = server.grpc().await;
    let http = reqwest::Client::new();

    for _ in 0..3 {
        grpc.list_orders(ListOrdersRequest {}).await.unwrap();
        let response = http.get(server.url("/healthz")).send().await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    server.shutdown().await;
}

#[tokio::test]
async fn stop_is_idempotent_and_releases_the_port() {
    let server = spawn_server(test_service_config()).await;
    let addr = server.addr;
    let handle = server.handle.clone();

    let started = Instant::now();
    assert!(handle.stop().await);
    assert!(handle.stop().await);
    assert!(started.elapsed() < Duration::from_secs(3));
    assert_eq!(handle.health_state(), HealthState::Stopped);

    server.shutdown().await;
    assert!(tokio::net::TcpStream::connect(addr).await.is_err());
}

#[tokio::test]
async fn stop_is_bounded_with_a_call_in_flight() {
    let server = spawn_server(order_server::service::ServiceConfig {
        sleeper_delay: Duration::from_secs(30),
        ..test_service_config()
    })
    .await;
    let mut grpc = server.grpc().await;
    let stuck = tokio::spawn(async move { grpc.list_orders(ListOrdersRequest {}).await });

    // Let the call reach the sleeper.
    tokio::time::sleep(Duration::from_millis(100)).await;

    let started = Instant::now();
    server.handle.stop().await;
    // Grace is 2s in the harness; stop adds at most a one second margin.
    assert!(started.elapsed() < Duration::from_secs(4));
    assert_eq!(server.handle.health_state(), HealthState::Stopped);

    stuck.abort();
    server.shutdown().await;
}
