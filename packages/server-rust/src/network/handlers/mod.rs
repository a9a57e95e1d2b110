//! Operational HTTP handlers served next to the gateway.
//!
//! This module defines `AppState` (the shared state carried through axum
//! extractors) and re-exports the handler functions for building the
//! router.

pub mod health;
pub mod metrics;

pub use health::{liveness_handler, readiness_handler};
pub use self::metrics::metrics_handler;

use std::sync::Arc;
use std::time::Instant;

use metrics_exporter_prometheus::PrometheusHandle;

use super::{ConnectionRegistry, ShutdownController};

/// Shared application state passed to the operational handlers via `State`
/// extraction.
///
/// Holds `Arc` references to shared resources so cloning is cheap.
#[derive(Clone)]
pub struct AppState {
    /// Registry of all open connections on the shared listener.
    pub registry: Arc<ConnectionRegistry>,
    /// Graceful shutdown controller with health state and in-flight tracking.
    pub shutdown: Arc<ShutdownController>,
    /// Handle of the Prometheus recorder rendered at `/metrics`.
    pub metrics: PrometheusHandle,
    /// Server process start time, used for uptime calculation.
    pub start_time: Instant,
}

#[cfg(test)]
pub(crate) fn test_state() -> AppState {
    AppState {
        registry: Arc::new(ConnectionRegistry::new()),
        shutdown: Arc::new(ShutdownController::new()),
        metrics: crate::observability::metrics::build_recorder().handle(),
        start_time: Instant::now(),
    }
}
