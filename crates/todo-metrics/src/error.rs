//! Registry usage errors.

use thiserror::Error;

pub type MetricsResult<T> = Result<T, MetricsError>;

/// Misuse of the metrics registry. These are programming or configuration
/// errors, never runtime conditions of the measured system.
#[derive(Debug, Error, PartialEq)]
pub enum MetricsError {
    #[error("metric {0} is already registered")]
    Duplicate(String),

    #[error("invalid metric name: {0:?}")]
    InvalidName(String),

    #[error("invalid label name {label:?} on metric {metric}")]
    InvalidLabel { metric: String, label: String },

    #[error("labels for {metric} do not match: expected {expected:?}, got {got:?}")]
    LabelMismatch {
        metric: String,
        expected: Vec<String>,
        got: Vec<String>,
    },

    #[error("counter {metric} cannot be decreased (amount {amount})")]
    NegativeIncrement { metric: String, amount: f64 },

    #[error("histogram {metric} buckets must be non-empty, finite and strictly increasing")]
    InvalidBuckets { metric: String },

    #[error("summary {metric} options are invalid: {reason}")]
    InvalidSummary { metric: String, reason: String },

    #[error("collection interval must be non-zero")]
    ZeroInterval,
}
