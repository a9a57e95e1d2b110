//! HTTP-side middleware. gRPC requests never pass through here; they get
//! the RPC pipeline instead.

use std::time::Instant;

use axum::extract::{MatchedPath, Request};
use axum::http::header::HeaderName;
use axum::http::{HeaderValue, Method, StatusCode};
use axum::middleware::{from_fn, Next};
use axum::response::Response;
use axum::Router;
use tower_http::compression::CompressionLayer;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use super::config::NetworkConfig;
use crate::observability::metrics::{HTTP_REQUESTS_TOTAL, HTTP_REQUEST_DURATION_SECONDS};
use crate::service::context::REQUEST_ID_HEADER;

/// Wraps every route of `router` (fallback included) in the HTTP stack.
///
/// From the outside in: request id assignment and echo, trace span, CORS,
/// gzip, request metrics, and the 408 timeout. The id is assigned before
/// the gateway runs, so the loopback call carries it as its correlation id.
/// Metrics sit outside the timeout and therefore count 408s too.
pub fn with_http_layers(router: Router, config: &NetworkConfig) -> Router {
    let request_id = HeaderName::from_static(REQUEST_ID_HEADER);

    // Router::layer wraps what is already there: innermost first.
    router
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            config.request_timeout,
        ))
        .layer(from_fn(track_http_metrics))
        .layer(CompressionLayer::new())
        .layer(cors(&config.cors_origins))
        .layer(TraceLayer::new_for_http())
        .layer(PropagateRequestIdLayer::new(request_id.clone()))
        .layer(SetRequestIdLayer::new(request_id, MakeRequestUuid))
}

/// `"*"` anywhere in `origins` opens CORS to every origin; otherwise only
/// the entries that parse as header values are allowed.
fn cors(origins: &[String]) -> CorsLayer {
    let allow_origin = if origins.iter().any(|origin| origin == "*") {
        AllowOrigin::any()
    } else {
        AllowOrigin::list(
            origins
                .iter()
                .filter_map(|origin| HeaderValue::from_str(origin).ok()),
        )
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET, Method::POST, Method::DELETE])
        .allow_headers(Any)
}

/// Records `http_requests_total` and `http_request_duration_seconds` for
/// every HTTP request, labelled by method, route template and status.
///
/// Requests that matched no route are labelled `path="unmatched"` so
/// arbitrary URLs cannot blow up label cardinality.
pub async fn track_http_metrics(request: Request, next: Next) -> Response {
    let method = request.method().to_string();
    let path = request
        .extensions()
        .get::<MatchedPath>()
        .map_or_else(|| "unmatched".to_string(), |matched| matched.as_str().to_string());
    let started = Instant::now();

    let response = next.run(request).await;

    let status = response.status().as_u16().to_string();
    metrics::counter!(
        HTTP_REQUESTS_TOTAL,
        "method" => method.clone(),
        "path" => path.clone(),
        "status" => status.clone()
    )
    .increment(1);
    metrics::histogram!(
        HTTP_REQUEST_DURATION_SECONDS,
        "method" => method,
        "path" => path,
        "status" => status
    )
    .record(started.elapsed().as_secs_f64());

    response
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use axum::body::Body;
    use axum::routing::get;
    use axum::Router;
    use tower::ServiceExt;

    use super::*;
    use crate::observability::metrics::{build_recorder, sum_samples};

    fn app(config: &NetworkConfig) -> Router {
        with_http_layers(Router::new().route("/ping", get(|| async { "pong" })), config)
    }

    #[tokio::test]
    async fn cors_allows_only_listed_origins() {
        let config = NetworkConfig {
            cors_origins: vec!["https://shop.example".to_string(), "not a header\n".to_string()],
            ..NetworkConfig::default()
        };
        let preflight = |origin: &'static str| {
            Request::builder()
                .method(Method::OPTIONS)
                .uri("/ping")
                .header("origin", origin)
                .header("access-control-request-method", "DELETE")
                .body(Body::empty())
                .unwrap()
        };

        let response = app(&config).oneshot(preflight("https://shop.example")).await.unwrap();
        assert_eq!(
            response.headers().get("access-control-allow-origin").unwrap(),
            "https://shop.example"
        );

        let response = app(&config).oneshot(preflight("https://evil.example")).await.unwrap();
        assert!(response.headers().get("access-control-allow-origin").is_none());
    }

    #[tokio::test]
    async fn request_id_is_generated_and_echoed() {
        let config = NetworkConfig {
            request_timeout: Duration::from_secs(5),
            ..NetworkConfig::default()
        };
        let app = app(&config);

        let response = app
            .clone()
            .oneshot(Request::builder().uri("/ping").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert!(response.headers().contains_key(REQUEST_ID_HEADER));

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/ping")
                    .header(REQUEST_ID_HEADER, "req-7")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.headers().get(REQUEST_ID_HEADER).unwrap(), "req-7");
    }

    #[test]
    fn http_metrics_use_route_templates() {
        let recorder = build_recorder();
        let handle = recorder.handle();
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        let _guard = metrics::set_default_local_recorder(&recorder);
        rt.block_on(async {
            let app = Router::new()
                .route("/v1/orders/{id}", get(|| async { "order" }))
                .layer(from_fn(track_http_metrics));
            for uri in ["/v1/orders/a", "/v1/orders/b", "/nowhere"] {
                app.clone()
                    .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
                    .await
                    .unwrap();
            }
        });

        let rendered = handle.render();
        assert_eq!(
            sum_samples(
                &rendered,
                HTTP_REQUESTS_TOTAL,
                &[r#"path="/v1/orders/{id}""#, r#"status="200""#]
            ),
            2.0
        );
        assert_eq!(
            sum_samples(
                &rendered,
                HTTP_REQUESTS_TOTAL,
                &[r#"path="unmatched""#, r#"status="404""#],
            ),
            1.0
        );
    }
}
