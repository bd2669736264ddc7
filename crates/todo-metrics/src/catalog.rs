//! The application's metric catalogue.
//!
//! `AppMetrics` registers every HTTP, todo and database series once at
//! startup and exposes recording helpers with fixed label sets, so call
//! sites never spell label names themselves.

use std::time::Duration;

use tracing::warn;

use crate::error::MetricsResult;
use crate::registry::{Counter, Gauge, Histogram, Registry, Summary};
use crate::summary::SummaryOpts;

const HTTP_DURATION_BUCKETS: &[f64] = &[
    0.001, 0.005, 0.015, 0.05, 0.1, 0.2, 0.3, 0.4, 0.5, 1.0, 2.0, 5.0,
];

const DB_DURATION_BUCKETS: &[f64] = &[0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0];

/// Every application series, backed by one shared [`Registry`].
pub struct AppMetrics {
    registry: Registry,

    // HTTP
    http_requests_total: Counter,
    http_request_duration: Histogram,
    http_request_size: Summary,
    http_response_size: Summary,
    http_active_requests: Gauge,

    // Todos
    todos_total: Gauge,
    todos_created: Counter,
    todos_completed: Counter,
    todos_deleted: Counter,

    // Database
    db_query_duration: Histogram,
    db_connections_active: Gauge,
    db_errors: Counter,

    // Errors
    errors_total: Counter,
    unhandled_exceptions: Counter,

    api_latency: Summary,
}

impl AppMetrics {
    /// Register the catalogue into `registry`. Fails if any name is taken.
    pub fn new(registry: &Registry) -> MetricsResult<Self> {
        Ok(Self {
            http_requests_total: registry.counter(
                "http_requests_total",
                "Total number of HTTP requests",
                &["method", "route", "status_code"],
            )?,
            http_request_duration: registry.histogram(
                "http_request_duration_seconds",
                "Duration of HTTP requests in seconds",
                &["method", "route", "status_code"],
                HTTP_DURATION_BUCKETS,
            )?,
            http_request_size: registry.summary(
                "http_request_size_bytes",
                "Size of HTTP requests in bytes",
                &["method", "route"],
                SummaryOpts::default(),
            )?,
            http_response_size: registry.summary(
                "http_response_size_bytes",
                "Size of HTTP responses in bytes",
                &["method", "route"],
                SummaryOpts::default(),
            )?,
            http_active_requests: registry.gauge(
                "http_active_requests",
                "Number of active HTTP requests",
                &["method"],
            )?,
            todos_total: registry.gauge(
                "todos_total",
                "Total number of todos in the system",
                &["status"],
            )?,
            todos_created: registry.counter(
                "todos_created_total",
                "Total number of todos created",
                &[],
            )?,
            todos_completed: registry.counter(
                "todos_completed_total",
                "Total number of todos marked as completed",
                &[],
            )?,
            todos_deleted: registry.counter(
                "todos_deleted_total",
                "Total number of todos deleted",
                &[],
            )?,
            db_query_duration: registry.histogram(
                "db_query_duration_seconds",
                "Duration of database queries in seconds",
                &["operation", "table"],
                DB_DURATION_BUCKETS,
            )?,
            db_connections_active: registry.gauge(
                "db_connections_active",
                "Number of active database connections",
                &[],
            )?,
            db_errors: registry.counter(
                "db_errors_total",
                "Total number of database errors",
                &["operation", "error_type"],
            )?,
            errors_total: registry.counter(
                "errors_total",
                "Total number of errors",
                &["type", "route"],
            )?,
            unhandled_exceptions: registry.counter(
                "unhandled_exceptions_total",
                "Total number of unhandled exceptions",
                &["exception_type"],
            )?,
            api_latency: registry.summary(
                "api_latency_seconds",
                "API latency per endpoint in seconds",
                &["method", "route"],
                SummaryOpts {
                    max_age: Duration::from_secs(600),
                    age_buckets: 5,
                    ..Default::default()
                },
            )?,
            registry: registry.clone(),
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Text exposition of the whole registry.
    pub fn render(&self) -> String {
        self.registry.render()
    }

    // ── HTTP ───────────────────────────────────────────────────

    pub fn http_request_started(&self, method: &str) {
        report(self.http_active_requests.inc(&[("method", method)]));
    }

    pub fn http_request_finished(&self, method: &str) {
        report(self.http_active_requests.dec(&[("method", method)]));
    }

    /// Record a completed request/response cycle.
    pub fn record_http_request(
        &self,
        method: &str,
        route: &str,
        status_code: u16,
        duration: Duration,
        request_size: Option<u64>,
        response_size: Option<u64>,
    ) {
        let status = status_code.to_string();
        let labels = [("method", method), ("route", route), ("status_code", status.as_str())];
        let endpoint = [("method", method), ("route", route)];
        let seconds = duration.as_secs_f64();

        report(self.http_requests_total.inc(&labels));
        report(self.http_request_duration.observe(&labels, seconds));
        if let Some(size) = request_size {
            report(self.http_request_size.observe(&endpoint, size as f64));
        }
        if let Some(size) = response_size {
            report(self.http_response_size.observe(&endpoint, size as f64));
        }
        report(self.api_latency.observe(&endpoint, seconds));
    }

    pub fn record_http_error(&self, category: &str, route: &str) {
        report(self.errors_total.inc(&[("type", category), ("route", route)]));
    }

    /// A failure nothing upstream turned into a handled error, such as a
    /// panicked task or a server error produced outside the service.
    pub fn record_unhandled_exception(&self, exception_type: &str) {
        report(
            self.unhandled_exceptions
                .inc(&[("exception_type", exception_type)]),
        );
    }

    // ── Todos ──────────────────────────────────────────────────

    pub fn todo_created(&self) {
        report(self.todos_created.inc(&[]));
    }

    pub fn todo_completed(&self) {
        report(self.todos_completed.inc(&[]));
    }

    pub fn todo_deleted(&self) {
        report(self.todos_deleted.inc(&[]));
    }

    /// Publish the live active/completed split.
    pub fn update_todo_counts(&self, active: u64, completed: u64) {
        report(self.todos_total.set(&[("status", "active")], active as f64));
        report(self.todos_total.set(&[("status", "completed")], completed as f64));
    }

    /// Reset the lifetime counters and re-seed them from durable totals.
    pub fn sync_counters(&self, total_created: u64, total_completed: u64) {
        self.todos_created.reset();
        self.todos_completed.reset();
        report(self.todos_created.inc_by(&[], total_created as f64));
        report(self.todos_completed.inc_by(&[], total_completed as f64));
    }

    // ── Database ───────────────────────────────────────────────

    pub fn record_db_query(&self, operation: &str, table: &str, duration: Duration) {
        report(
            self.db_query_duration
                .observe(&[("operation", operation), ("table", table)], duration.as_secs_f64()),
        );
    }

    pub fn record_db_error(&self, operation: &str, error_type: &str) {
        report(
            self.db_errors
                .inc(&[("operation", operation), ("error_type", error_type)]),
        );
    }

    pub fn set_db_connections_active(&self, connections: u32) {
        report(self.db_connections_active.set(&[], connections as f64));
    }

    // ── Reads ──────────────────────────────────────────────────

    pub fn todos_created_total(&self) -> f64 {
        self.todos_created.get(&[]).unwrap_or_default()
    }

    pub fn todos_completed_total(&self) -> f64 {
        self.todos_completed.get(&[]).unwrap_or_default()
    }

    pub fn todos_deleted_total(&self) -> f64 {
        self.todos_deleted.get(&[]).unwrap_or_default()
    }

    /// Current `(active, completed)` gauge values.
    pub fn todo_counts(&self) -> (f64, f64) {
        (
            self.todos_total.get(&[("status", "active")]).unwrap_or_default(),
            self.todos_total.get(&[("status", "completed")]).unwrap_or_default(),
        )
    }

    pub fn http_requests(&self, method: &str, route: &str, status_code: u16) -> f64 {
        let status = status_code.to_string();
        self.http_requests_total
            .get(&[("method", method), ("route", route), ("status_code", status.as_str())])
            .unwrap_or_default()
    }

    pub fn active_requests(&self, method: &str) -> f64 {
        self.http_active_requests
            .get(&[("method", method)])
            .unwrap_or_default()
    }

    pub fn db_errors(&self, operation: &str, error_type: &str) -> f64 {
        self.db_errors
            .get(&[("operation", operation), ("error_type", error_type)])
            .unwrap_or_default()
    }

    pub fn db_queries(&self, operation: &str, table: &str) -> u64 {
        self.db_query_duration
            .count(&[("operation", operation), ("table", table)])
            .unwrap_or_default()
    }

    pub fn http_errors(&self, category: &str, route: &str) -> f64 {
        self.errors_total
            .get(&[("type", category), ("route", route)])
            .unwrap_or_default()
    }

    pub fn unhandled_exceptions(&self, exception_type: &str) -> f64 {
        self.unhandled_exceptions
            .get(&[("exception_type", exception_type)])
            .unwrap_or_default()
    }

    pub fn db_connections_active(&self) -> f64 {
        self.db_connections_active.get(&[]).unwrap_or_default()
    }
}

/// Catalogue label sets are fixed, so a failure here is a bug worth logging
/// but never worth failing a request over.
fn report(result: MetricsResult<()>) {
    if let Err(e) = result {
        warn!(error = %e, "metric update rejected");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metrics() -> AppMetrics {
        AppMetrics::new(&Registry::new()).unwrap()
    }

    #[test]
    fn catalogue_registers_every_series_once() {
        let registry = Registry::new();
        AppMetrics::new(&registry).unwrap();

        let names = registry.names();
        for name in [
            "http_requests_total",
            "http_request_duration_seconds",
            "http_request_size_bytes",
            "http_response_size_bytes",
            "http_active_requests",
            "todos_total",
            "todos_created_total",
            "todos_completed_total",
            "todos_deleted_total",
            "db_query_duration_seconds",
            "db_connections_active",
            "db_errors_total",
            "errors_total",
            "unhandled_exceptions_total",
            "api_latency_seconds",
        ] {
            assert!(names.iter().any(|n| n == name), "missing {name}");
        }

        // A second catalogue on the same registry collides.
        assert!(AppMetrics::new(&registry).is_err());
    }

    #[test]
    fn record_http_request_updates_all_http_series() {
        let m = metrics();
        m.record_http_request("GET", "/todos", 200, Duration::from_millis(12), Some(0), Some(128));
        m.record_http_request("GET", "/todos", 200, Duration::from_millis(8), Some(0), None);

        assert_eq!(m.http_requests("GET", "/todos", 200), 2.0);
        let output = m.render();
        assert!(output.contains(
            "http_request_duration_seconds_count{method=\"GET\",route=\"/todos\",status_code=\"200\"} 2"
        ));
        assert!(output.contains("http_request_size_bytes_count{method=\"GET\",route=\"/todos\"} 2"));
        assert!(output.contains("http_response_size_bytes_count{method=\"GET\",route=\"/todos\"} 1"));
        assert!(output.contains("api_latency_seconds_count{method=\"GET\",route=\"/todos\"} 2"));
    }

    #[test]
    fn active_requests_balance() {
        let m = metrics();
        m.http_request_started("POST");
        m.http_request_started("POST");
        m.http_request_finished("POST");
        assert_eq!(m.active_requests("POST"), 1.0);
    }

    #[test]
    fn sync_counters_replaces_lifetime_values() {
        let m = metrics();
        m.todo_created();
        m.todo_created();
        m.todo_completed();

        m.sync_counters(10, 4);
        assert_eq!(m.todos_created_total(), 10.0);
        assert_eq!(m.todos_completed_total(), 4.0);
    }

    #[test]
    fn todo_counts_are_published_by_status() {
        let m = metrics();
        m.update_todo_counts(3, 2);
        assert_eq!(m.todo_counts(), (3.0, 2.0));

        let output = m.render();
        assert!(output.contains("todos_total{status=\"active\"} 3"));
        assert!(output.contains("todos_total{status=\"completed\"} 2"));
    }

    #[test]
    fn unhandled_exceptions_by_type() {
        let m = metrics();
        m.record_unhandled_exception("panic");
        m.record_unhandled_exception("panic");
        assert_eq!(m.unhandled_exceptions("panic"), 2.0);
        assert!(m
            .render()
            .contains("unhandled_exceptions_total{exception_type=\"panic\"} 2"));
    }

    #[test]
    fn db_helpers_label_by_operation() {
        let m = metrics();
        m.record_db_query("select", "todos", Duration::from_millis(3));
        m.record_db_error("insert", "constraint");
        m.set_db_connections_active(4);

        assert_eq!(m.db_queries("select", "todos"), 1);
        assert_eq!(m.db_errors("insert", "constraint"), 1.0);
        assert_eq!(m.db_connections_active(), 4.0);
    }
}
