//! Liveness and readiness endpoint handlers.
//!
//! These handlers expose server health for orchestrators (Kubernetes, load
//! balancers). Neither touches the item service or the order store.

use axum::extract::State;
use axum::http::StatusCode;
use tracing::debug;

use super::AppState;
use crate::network::HealthState;

/// `GET /healthz` -- always returns 200 with body `OK\n`.
///
/// The liveness probe only checks whether the process is running and
/// responsive. It intentionally does not check downstream dependencies
/// or health state, because a failed liveness probe triggers a pod restart.
pub async fn liveness_handler() -> (StatusCode, &'static str) {
    (StatusCode::OK, "OK\n")
}

/// `GET /readyz` -- returns 200 when ready, 503 otherwise.
///
/// Returns 503 during startup (before `set_ready()` is called), during
/// graceful shutdown (Draining state), and after stop. This removes the
/// pod from the Service's endpoint list so no new traffic is routed to it.
pub async fn readiness_handler(State(state): State<AppState>) -> (StatusCode, &'static str) {
    let health = state.shutdown.health_state();
    debug!(
        state = health.as_str(),
        connections = state.registry.count(),
        in_flight = state.shutdown.in_flight_count(),
        uptime_secs = state.start_time.elapsed().as_secs(),
        "readiness probe"
    );

    if health == HealthState::Ready {
        (StatusCode::OK, "ready\n")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, health.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::handlers::test_state;

    #[tokio::test]
    async fn liveness_handler_always_returns_ok() {
        let (status, body) = liveness_handler().await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "OK\n");
    }

    #[tokio::test]
    async fn readiness_handler_returns_200_when_ready() {
        let state = test_state();
        assert!(state.shutdown.set_ready());

        let (status, _) = readiness_handler(State(state)).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn readiness_handler_returns_503_when_starting() {
        let state = test_state();
        let (status, body) = readiness_handler(State(state)).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body, "starting");
    }

    #[tokio::test]
    async fn readiness_handler_returns_503_when_draining() {
        let state = test_state();
        assert!(state.shutdown.set_ready());
        state.shutdown.trigger_shutdown();

        let (status, body) = readiness_handler(State(state)).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body, "draining");
    }
}
