//! Health phases and the stop signal, shared by the serve loop, the
//! readiness probe, and every [`ServerHandle`](super::ServerHandle).
//!
//! The phase lives in a single `watch` channel: moving past `Ready` is the
//! stop signal, and reaching `Stopped` wakes whoever is waiting in `stop()`.
//! `Stopped` is only ever reported while no listener is held.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

/// Lifecycle phase reported by `/readyz`.
///
/// `Starting -> Ready -> Draining -> Stopped`, or `Starting -> Stopped` for
/// a server stopped before it bound a listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthState {
    Starting,
    Ready,
    /// Listener closed, in-flight requests finishing.
    Draining,
    /// Serving ended; the port is free again.
    Stopped,
}

impl HealthState {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Starting => "starting",
            Self::Ready => "ready",
            Self::Draining => "draining",
            Self::Stopped => "stopped",
        }
    }

    /// Whether a stop has been requested at some point.
    #[must_use]
    pub fn is_stopping(self) -> bool {
        matches!(self, Self::Draining | Self::Stopped)
    }
}

/// Value carried by the phase channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Phase {
    state: HealthState,
    listener_held: bool,
}

impl Phase {
    #[must_use]
    pub fn state(self) -> HealthState {
        self.state
    }
}

#[derive(Debug)]
pub struct ShutdownController {
    phase: watch::Sender<Phase>,
    requests: Arc<AtomicU64>,
}

impl ShutdownController {
    #[must_use]
    pub fn new() -> Self {
        Self {
            phase: watch::Sender::new(Phase {
                state: HealthState::Starting,
                listener_held: false,
            }),
            requests: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Records that a listener is bound. From now on a stop request waits
    /// in `Draining` until [`mark_stopped`](Self::mark_stopped).
    pub fn hold_listener(&self) {
        self.phase.send_if_modified(|phase| {
            phase.listener_held = true;
            if phase.state == HealthState::Stopped {
                phase.state = HealthState::Draining;
            }
            true
        });
    }

    /// `Starting -> Ready`. Returns `false`, changing nothing, once a stop
    /// was requested; the caller must then release its listener.
    #[must_use]
    pub fn set_ready(&self) -> bool {
        self.phase.send_if_modified(|phase| {
            let starting = phase.state == HealthState::Starting;
            if starting {
                phase.state = HealthState::Ready;
            }
            starting
        })
    }

    /// A receiver of phase changes; see [`stop_requested`].
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Phase> {
        self.phase.subscribe()
    }

    #[must_use]
    pub fn is_shutdown_requested(&self) -> bool {
        self.phase.borrow().state.is_stopping()
    }

    /// Requests a stop. Idempotent.
    pub fn trigger_shutdown(&self) {
        self.phase.send_if_modified(|phase| {
            phase.state = match phase.state {
                HealthState::Starting if !phase.listener_held => HealthState::Stopped,
                HealthState::Starting | HealthState::Ready => HealthState::Draining,
                HealthState::Draining | HealthState::Stopped => return false,
            };
            true
        });
    }

    /// Called once the listener has been dropped.
    pub fn mark_stopped(&self) {
        self.phase.send_replace(Phase {
            state: HealthState::Stopped,
            listener_held: false,
        });
    }

    #[must_use]
    pub fn health_state(&self) -> HealthState {
        self.phase.borrow().state
    }

    /// Counts one request as in flight until the guard drops.
    #[must_use]
    pub fn in_flight_guard(&self) -> InFlightGuard {
        self.requests.fetch_add(1, Ordering::Relaxed);
        InFlightGuard {
            requests: Arc::clone(&self.requests),
        }
    }

    #[must_use]
    pub fn in_flight_count(&self) -> u64 {
        self.requests.load(Ordering::Relaxed)
    }

    /// Waits up to `timeout` for `Stopped`. Returns whether it was reached.
    pub async fn wait_until_stopped(&self, timeout: Duration) -> bool {
        let mut phase = self.subscribe();
        let stopped = phase.wait_for(|phase| phase.state == HealthState::Stopped);
        let reached = matches!(tokio::time::timeout(timeout, stopped).await, Ok(Ok(_)));
        reached
    }
}

impl Default for ShutdownController {
    fn default() -> Self {
        Self::new()
    }
}

/// Resolves once a stop has been requested.
pub async fn stop_requested(mut phase: watch::Receiver<Phase>) {
    // Err: the controller is gone, which ends serving as well.
    let _ = phase.wait_for(|phase| phase.state.is_stopping()).await;
}

#[derive(Debug)]
pub struct InFlightGuard {
    requests: Arc<AtomicU64>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.requests.fetch_sub(1, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_lifecycle() {
        let shutdown = ShutdownController::default();
        assert_eq!(shutdown.health_state(), HealthState::Starting);
        assert!(!shutdown.is_shutdown_requested());

        shutdown.hold_listener();
        assert!(shutdown.set_ready());
        assert_eq!(shutdown.health_state(), HealthState::Ready);

        shutdown.trigger_shutdown();
        shutdown.trigger_shutdown();
        assert_eq!(shutdown.health_state(), HealthState::Draining);
        assert!(shutdown.is_shutdown_requested());

        shutdown.mark_stopped();
        assert_eq!(shutdown.health_state(), HealthState::Stopped);
    }

    #[test]
    fn stop_without_listener_skips_draining() {
        let shutdown = ShutdownController::default();
        shutdown.trigger_shutdown();
        assert_eq!(shutdown.health_state(), HealthState::Stopped);

        assert!(!shutdown.set_ready());
        assert_eq!(shutdown.health_state(), HealthState::Stopped);
    }

    #[test]
    fn stop_with_listener_held_waits_for_release() {
        let shutdown = ShutdownController::default();
        shutdown.hold_listener();
        shutdown.trigger_shutdown();
        assert_eq!(shutdown.health_state(), HealthState::Draining);

        // Serving never starts once a stop is pending.
        assert!(!shutdown.set_ready());
        assert_eq!(shutdown.health_state(), HealthState::Draining);

        shutdown.mark_stopped();
        assert_eq!(shutdown.health_state(), HealthState::Stopped);
    }

    #[test]
    fn binding_after_stop_is_not_reported_stopped() {
        let shutdown = ShutdownController::default();
        shutdown.trigger_shutdown();
        shutdown.hold_listener();
        assert_eq!(shutdown.health_state(), HealthState::Draining);
        assert!(!shutdown.set_ready());
    }

    #[test]
    fn guards_track_requests() {
        let shutdown = ShutdownController::default();
        let guards: Vec<_> = (0..3).map(|_| shutdown.in_flight_guard()).collect();
        assert_eq!(shutdown.in_flight_count(), 3);
        drop(guards);
        assert_eq!(shutdown.in_flight_count(), 0);
    }

    #[tokio::test]
    async fn stop_requested_waits_for_trigger() {
        let shutdown = ShutdownController::default();
        assert!(shutdown.set_ready());
        let waiter = tokio::spawn(stop_requested(shutdown.subscribe()));

        tokio::task::yield_now().await;
        assert!(!waiter.is_finished());

        shutdown.trigger_shutdown();
        waiter.await.unwrap();

        // Late subscribers see the request immediately.
        stop_requested(shutdown.subscribe()).await;
    }

    #[tokio::test]
    async fn wait_until_stopped_is_bounded() {
        let shutdown = Arc::new(ShutdownController::default());
        assert!(shutdown.set_ready());
        shutdown.trigger_shutdown();
        assert!(!shutdown.wait_until_stopped(Duration::from_millis(20)).await);

        let marker = Arc::clone(&shutdown);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            marker.mark_stopped();
        });
        assert!(shutdown.wait_until_stopped(Duration::from_secs(1)).await);
    }
}
