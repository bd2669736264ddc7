//! HTTP metrics interceptor.
//!
//! Installed with `route_layer`, so it only sees requests that matched a
//! todo route. For each one it tracks the active-request gauge, times the
//! handler, and records counters and summaries labeled by the route
//! template rather than the concrete path.

use std::sync::Arc;
use std::time::Instant;

use axum::body::HttpBody;
use axum::extract::{MatchedPath, Request, State};
use axum::http::header::CONTENT_LENGTH;
use axum::middleware::Next;
use axum::response::Response;

use todo_metrics::AppMetrics;

use crate::METRICS_PATH;
use crate::handlers::ErrorCategory;

/// Category for error responses that did not come from the service
/// (extractor rejections inside axum, method mismatches).
const HTTP_ERROR: &str = "http_error";

/// Decrements the active-request gauge when dropped, so the gauge also
/// recovers when the request future is cancelled.
struct ActiveRequest {
    metrics: Arc<AppMetrics>,
    method: String,
}

impl ActiveRequest {
    fn start(metrics: Arc<AppMetrics>, method: String) -> Self {
        metrics.http_request_started(&method);
        Self { metrics, method }
    }
}

impl Drop for ActiveRequest {
    fn drop(&mut self) {
        self.metrics.http_request_finished(&self.method);
    }
}

/// `from_fn_with_state` middleware recording the HTTP series.
pub async fn track_http(
    State(metrics): State<Arc<AppMetrics>>,
    request: Request,
    next: Next,
) -> Response {
    if request.uri().path() == METRICS_PATH {
        return next.run(request).await;
    }

    let method = request.method().as_str().to_string();
    let route = request
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| request.uri().path().to_string());
    let request_size = content_length(&request);

    let _active = ActiveRequest::start(Arc::clone(&metrics), method.clone());
    let start = Instant::now();

    let response = next.run(request).await;

    let status = response.status();
    let response_size = response.body().size_hint().exact();
    metrics.record_http_request(
        &method,
        &route,
        status.as_u16(),
        start.elapsed(),
        Some(request_size),
        response_size,
    );

    if status.is_client_error() || status.is_server_error() {
        let category = response.extensions().get::<ErrorCategory>().map(|c| c.0);
        metrics.record_http_error(category.unwrap_or(HTTP_ERROR), &route);
        if category.is_none() && status.is_server_error() {
            metrics.record_unhandled_exception(HTTP_ERROR);
        }
    }

    response
}

/// Declared body size; absent or unparsable headers count as zero.
fn content_length(request: &Request) -> u64 {
    request
        .headers()
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok())
        .unwrap_or(0)
}
