//! Tower middleware layers for the RPC pipeline.
//!
//! - [`metrics`]: `grpc_server_*` counters, histogram and in-flight gauge
//! - [`logging`]: Per-call span and completion event
//! - [`timeout`]: Per-call deadline enforcement
//! - [`identity`]: Header propagation and bearer credential checks
//! - [`sleeper`]: Injected latency
//! - [`validation`]: Schema validation of request messages
//! - [`recovery`]: Panic to `Internal` conversion
//! - [`pipeline`]: Composes all layers into a single service stack

pub mod identity;
pub mod logging;
pub mod metrics;
pub mod pipeline;
pub mod recovery;
pub mod sleeper;
pub mod timeout;
pub mod validation;

#[cfg(test)]
pub(crate) mod test_support;

pub use self::identity::IdentityLayer;
pub use self::logging::LoggingLayer;
pub use self::metrics::MetricsLayer;
pub use self::pipeline::build_rpc_pipeline;
pub use self::recovery::RecoveryLayer;
pub use self::sleeper::SleeperLayer;
pub use self::timeout::TimeoutLayer;
pub use self::validation::ValidationLayer;
