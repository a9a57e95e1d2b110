use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use order_server::item::ItemClientConfig;
use order_server::network::NetworkConfig;
use order_server::observability::{init_tracing, install_metrics, LogFormat};
use order_server::service::ServiceConfig;
use order_server::store::RetryPolicy;
use order_server::{AppConfig, OrderServer, ServerHandle};
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "order-server")]
#[command(about = "Order service: gRPC and HTTP/JSON on one port", long_about = None)]
struct Args {
    /// Address to listen on.
    #[arg(long, env = "ORDER_HOST", default_value = "0.0.0.0")]
    host: String,

    /// Port for both gRPC and HTTP. 0 picks a free port.
    #[arg(long, env = "ORDER_PORT", default_value_t = 8080)]
    port: u16,

    /// Item service endpoint (`host:port` or `http://host:port`).
    #[arg(long, env = "ITEM_ENDPOINT", default_value = "127.0.0.1:9090")]
    item_endpoint: String,

    /// Delay added to every RPC, in milliseconds. 0 disables it.
    #[arg(long, env = "ORDER_SLEEPER_MS", default_value_t = 0)]
    sleeper_ms: u64,

    /// Seed the order book with sample orders.
    #[arg(long, env = "ORDER_SAMPLE_DATA", default_value_t = true, action = clap::ArgAction::Set)]
    sample_data: bool,

    /// Reject RPCs without a bearer token.
    #[arg(long, env = "ORDER_REQUIRE_AUTH")]
    require_auth: bool,

    /// Deadline for calls that carry none, in seconds.
    #[arg(long, env = "ORDER_CALL_TIMEOUT_SECS", default_value_t = 30)]
    call_timeout_secs: u64,

    /// Maximum HTTP request duration, in seconds.
    #[arg(long, env = "ORDER_HTTP_TIMEOUT_SECS", default_value_t = 30)]
    http_timeout_secs: u64,

    /// How long stop waits for in-flight requests, in seconds.
    #[arg(long, env = "ORDER_SHUTDOWN_GRACE_SECS", default_value_t = 10)]
    shutdown_grace_secs: u64,

    /// Attempts per item lookup, including the first.
    #[arg(long, env = "ORDER_ITEM_ATTEMPTS", default_value_t = 3)]
    item_attempts: u32,

    #[arg(long, env = "ORDER_LOG_FORMAT", value_enum, default_value = "text")]
    log_format: LogFormat,
}

impl Args {
    fn into_config(self) -> AppConfig {
        AppConfig {
            network: NetworkConfig {
                host: self.host,
                port: self.port,
                request_timeout: Duration::from_secs(self.http_timeout_secs),
                shutdown_grace: Duration::from_secs(self.shutdown_grace_secs),
                ..NetworkConfig::default()
            },
            service: ServiceConfig {
                sleeper_delay: Duration::from_millis(self.sleeper_ms),
                default_call_timeout: Duration::from_secs(self.call_timeout_secs),
                require_auth: self.require_auth,
                load_sample_data: self.sample_data,
                item_retry: RetryPolicy {
                    max_attempts: self.item_attempts,
                    ..RetryPolicy::default()
                },
            },
            items: ItemClientConfig {
                endpoint: self.item_endpoint,
                ..ItemClientConfig::default()
            },
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(args.log_format);
    let metrics = install_metrics();

    let config = args.into_config();
    info!(?config, "starting order server");

    let mut server = OrderServer::new(config, metrics).context("failed to build server")?;
    let port = server.start().await.context("failed to start listener")?;
    info!(port, "listening");

    tokio::spawn(stop_on_signal(server.handle()));

    server.serve().await.context("server failed")?;
    Ok(())
}

/// Stops the server on Ctrl-C or SIGTERM.
async fn stop_on_signal(handle: ServerHandle) {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(%err, "cannot listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                warn!(%err, "cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("received Ctrl-C"),
        () = terminate => info!("received SIGTERM"),
    }

    if !handle.stop().await {
        warn!("server did not stop within the grace period");
    }
}
