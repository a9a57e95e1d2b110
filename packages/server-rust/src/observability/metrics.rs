//! Prometheus recorder installation and per-call RPC metrics.

use std::sync::OnceLock;
use std::time::Instant;

use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle, PrometheusRecorder};
use tonic::Code;
use tracing::warn;

/// Histogram buckets (seconds) for RPC and HTTP latencies.
const LATENCY_BUCKETS: &[f64] = &[
    0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
];

pub const HTTP_REQUESTS_TOTAL: &str = "http_requests_total";
pub const HTTP_REQUEST_DURATION_SECONDS: &str = "http_request_duration_seconds";
pub const OPEN_CONNECTIONS: &str = "server_open_connections";

static HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Installs the process-wide Prometheus recorder and returns its handle.
///
/// Idempotent: later calls return the handle installed by the first one.
pub fn install_metrics() -> PrometheusHandle {
    HANDLE
        .get_or_init(|| {
            let recorder = build_recorder();
            let handle = recorder.handle();
            if metrics::set_global_recorder(recorder).is_err() {
                warn!("a global metrics recorder is already installed; /metrics will stay empty");
            }
            handle
        })
        .clone()
}

/// Builds a recorder with the latency buckets used across the server.
#[must_use]
pub fn build_recorder() -> PrometheusRecorder {
    match PrometheusBuilder::new()
        .set_buckets_for_metric(Matcher::Suffix("_seconds".to_string()), LATENCY_BUCKETS)
    {
        Ok(builder) => builder.build_recorder(),
        Err(err) => {
            warn!(%err, "falling back to summary latencies");
            PrometheusBuilder::new().build_recorder()
        }
    }
}

// ---------------------------------------------------------------------------
// RPC metric families
// ---------------------------------------------------------------------------

/// Names of one side's (server or client) RPC metric family.
#[derive(Debug)]
pub struct RpcMetricNames {
    pub started: &'static str,
    pub handled: &'static str,
    pub handling_seconds: &'static str,
    pub in_flight: Option<&'static str>,
}

pub const SERVER_METRICS: RpcMetricNames = RpcMetricNames {
    started: "grpc_server_started_total",
    handled: "grpc_server_handled_total",
    handling_seconds: "grpc_server_handling_seconds",
    in_flight: Some("grpc_server_in_flight"),
};

pub const CLIENT_METRICS: RpcMetricNames = RpcMetricNames {
    started: "grpc_client_started_total",
    handled: "grpc_client_handled_total",
    handling_seconds: "grpc_client_handling_seconds",
    in_flight: None,
};

/// Prometheus label value for a gRPC status code.
#[must_use]
pub fn code_label(code: Code) -> &'static str {
    match code {
        Code::Ok => "OK",
        Code::Cancelled => "Canceled",
        Code::Unknown => "Unknown",
        Code::InvalidArgument => "InvalidArgument",
        Code::DeadlineExceeded => "DeadlineExceeded",
        Code::NotFound => "NotFound",
        Code::AlreadyExists => "AlreadyExists",
        Code::PermissionDenied => "PermissionDenied",
        Code::ResourceExhausted => "ResourceExhausted",
        Code::FailedPrecondition => "FailedPrecondition",
        Code::Aborted => "Aborted",
        Code::OutOfRange => "OutOfRange",
        Code::Unimplemented => "Unimplemented",
        Code::Internal => "Internal",
        Code::Unavailable => "Unavailable",
        Code::DataLoss => "DataLoss",
        Code::Unauthenticated => "Unauthenticated",
    }
}

// ---------------------------------------------------------------------------
// CallObservation
// ---------------------------------------------------------------------------

/// Records exactly one handled observation for a unary call.
///
/// Counts the call as started on creation. [`finish`](Self::finish) records
/// the outcome; dropping the observation unfinished records `Canceled`.
#[derive(Debug)]
pub struct CallObservation {
    names: &'static RpcMetricNames,
    service: &'static str,
    method: &'static str,
    started_at: Instant,
    finished: bool,
}

impl CallObservation {
    #[must_use]
    pub fn start(
        names: &'static RpcMetricNames,
        service: &'static str,
        method: &'static str,
    ) -> Self {
        metrics::counter!(
            names.started,
            "grpc_type" => "unary",
            "grpc_service" => service,
            "grpc_method" => method
        )
        .increment(1);
        if let Some(in_flight) = names.in_flight {
            metrics::gauge!(in_flight, "grpc_service" => service, "grpc_method" => method)
                .increment(1.0);
        }
        Self {
            names,
            service,
            method,
            started_at: Instant::now(),
            finished: false,
        }
    }

    pub fn finish(mut self, code: Code) {
        self.record(code);
    }

    fn record(&mut self, code: Code) {
        if self.finished {
            return;
        }
        self.finished = true;
        let (service, method) = (self.service, self.method);
        metrics::counter!(
            self.names.handled,
            "grpc_type" => "unary",
            "grpc_service" => service,
            "grpc_method" => method,
            "grpc_code" => code_label(code)
        )
        .increment(1);
        metrics::histogram!(
            self.names.handling_seconds,
            "grpc_type" => "unary",
            "grpc_service" => service,
            "grpc_method" => method
        )
        .record(self.started_at.elapsed().as_secs_f64());
        if let Some(in_flight) = self.names.in_flight {
            metrics::gauge!(in_flight, "grpc_service" => service, "grpc_method" => method)
                .decrement(1.0);
        }
    }
}

impl Drop for CallObservation {
    fn drop(&mut self) {
        self.record(Code::Cancelled);
    }
}

// ---------------------------------------------------------------------------
// Exposition parsing
// ---------------------------------------------------------------------------

/// Sums every sample of `metric` in a Prometheus text rendering whose line
/// contains all of `labels` (e.g. `grpc_code="OK"`). Test-only; the
/// integration tests carry their own copy in `tests/common`.
#[cfg(test)]
pub(crate) fn sum_samples(rendered: &str, metric: &str, labels: &[&str]) -> f64 {
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finished_call_records_once() {
        let recorder = build_recorder();
        let handle = recorder.handle();
        metrics::with_local_recorder(&recorder, || {
            let obs = CallObservation::start(&SERVER_METRICS, "order.OrderService", "GetOrder");
            obs.finish(Code::NotFound);
        });
        let rendered = handle.render();
        assert_eq!(
            sum_samples(&rendered, "grpc_server_started_total", &[r#"grpc_method="GetOrder""#]),
            1.0
        );
        assert_eq!(
            sum_samples(&rendered, "grpc_server_handled_total", &[r#"grpc_code="NotFound""#]),
            1.0
        );
        assert_eq!(
            sum_samples(&rendered, "grpc_server_handling_seconds_count", &[]),
            1.0
        );
    }

    #[test]
    fn dropped_call_records_canceled() {
        let recorder = build_recorder();
        let handle = recorder.handle();
        metrics::with_local_recorder(&recorder, || {
            let _obs = CallObservation::start(&CLIENT_METRICS, "item.ItemService", "GetItem");
        });
        let rendered = handle.render();
        assert_eq!(
            sum_samples(&rendered, "grpc_client_handled_total", &[r#"grpc_code="Canceled""#]),
            1.0
        );
    }

    #[test]
    fn sum_samples_ignores_prefixed_families() {
        let rendered = concat!(
            "# TYPE x counter\n",
            "x_total{a=\"1\"} 2\n",
            "x_total{a=\"2\"} 3\n",
            "x_total_other 9\n",
        );
        assert_eq!(sum_samples(rendered, "x_total", &[]), 5.0);
        assert_eq!(sum_samples(rendered, "x_total", &["a=\"2\""]), 3.0);
    }

    #[test]
    fn install_is_idempotent() {
        let a = install_metrics();
        let b = install_metrics();
        metrics::counter!("install_twice_total").increment(1);
        assert!(a.render().contains("install_twice_total"));
        assert!(b.render().contains("install_twice_total"));
    }
}
