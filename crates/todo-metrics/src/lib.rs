//! todo-metrics — observability for the todo service.
//!
//! A process-wide [`Registry`] of labeled counters, gauges, histograms and
//! sliding-window summaries, rendered on demand in the Prometheus text
//! exposition format.
//!
//! # Architecture
//!
//! ```text
//! Registry (one per process, shared by clone)
//!   ├── Counter / Gauge / Histogram / Summary handles
//!   ├── gather() → Vec<FamilySnapshot>
//!   └── render() → text/plain for the /metrics endpoint
//!
//! AppMetrics      ← fixed catalogue of HTTP, todo and database series
//! RuntimeCollector ← periodic process/tokio gauges under `runtime_`
//! ```

pub mod catalog;
pub mod collector;
pub mod error;
pub mod prometheus;
pub mod registry;
pub mod summary;

pub use catalog::AppMetrics;
pub use collector::{DEFAULT_PREFIX, RuntimeCollector, TickHook};
pub use error::{MetricsError, MetricsResult};
pub use prometheus::{CONTENT_TYPE, render_prometheus};
pub use registry::{
    Counter, FamilySnapshot, Gauge, Histogram, Labels, MetricKind, Registry, SampleValue,
    SeriesSnapshot, Summary,
};
pub use summary::SummaryOpts;
