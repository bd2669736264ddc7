//! Metrics registry — the single owner of every metric family.
//!
//! A family is a name, help text, an ordered list of label names, and one
//! accumulator per label-value combination. Families are registered once
//! and handed out as cheap cloneable handles ([`Counter`], [`Gauge`],
//! [`Histogram`], [`Summary`]). Each family guards its series map with its
//! own mutex; lock hold time is a map lookup plus an arithmetic update.
//!
//! Label pairs passed to handle operations must name exactly the declared
//! labels (in any order). Anything else is a [`MetricsError::LabelMismatch`].

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::Instant;

use tracing::debug;

use crate::error::{MetricsError, MetricsResult};
use crate::prometheus;
use crate::summary::{SlidingQuantiles, SummaryOpts, quantile_of_sorted};

/// Label key/value pairs for one series, e.g. `&[("method", "GET")]`.
pub type Labels<'a> = &'a [(&'a str, &'a str)];

/// Kind of accumulator a family holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricKind {
    Counter,
    Gauge,
    Histogram,
    Summary,
}

impl MetricKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricKind::Counter => "counter",
            MetricKind::Gauge => "gauge",
            MetricKind::Histogram => "histogram",
            MetricKind::Summary => "summary",
        }
    }
}

// ── Snapshots ──────────────────────────────────────────────────

/// Point-in-time copy of one family.
#[derive(Debug, Clone, PartialEq)]
pub struct FamilySnapshot {
    pub name: String,
    pub help: String,
    pub kind: MetricKind,
    pub label_names: Vec<String>,
    /// Series sorted by label values.
    pub series: Vec<SeriesSnapshot>,
}

/// Point-in-time copy of one label combination.
#[derive(Debug, Clone, PartialEq)]
pub struct SeriesSnapshot {
    pub label_values: Vec<String>,
    pub value: SampleValue,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SampleValue {
    /// Counter or gauge value.
    Scalar(f64),
    /// `(upper bound, cumulative count)` per bucket, excluding `+Inf`.
    Histogram {
        buckets: Vec<(f64, u64)>,
        sum: f64,
        count: u64,
    },
    /// `(quantile, value)` over the current window.
    Summary {
        quantiles: Vec<(f64, f64)>,
        sum: f64,
        count: u64,
    },
}

// ── Family internals ───────────────────────────────────────────

#[derive(Debug, Clone, Default)]
struct HistogramState {
    /// Cumulative counts aligned with the family's bounds.
    counts: Vec<u64>,
    sum: f64,
    count: u64,
}

enum Accumulators {
    Scalar(BTreeMap<Vec<String>, f64>),
    Histogram {
        bounds: Vec<f64>,
        series: BTreeMap<Vec<String>, HistogramState>,
    },
    Summary {
        opts: SummaryOpts,
        series: BTreeMap<Vec<String>, SlidingQuantiles>,
    },
}

struct Family {
    name: String,
    help: String,
    kind: MetricKind,
    label_names: Vec<String>,
    data: Mutex<Accumulators>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Family {
    /// Resolve label pairs into declared-order values.
    fn key(&self, labels: Labels<'_>) -> MetricsResult<Vec<String>> {
        let mismatch = || MetricsError::LabelMismatch {
            metric: self.name.clone(),
            expected: self.label_names.clone(),
            got: labels.iter().map(|(k, _)| k.to_string()).collect(),
        };
        if labels.len() != self.label_names.len() {
            return Err(mismatch());
        }
        self.label_names
            .iter()
            .map(|name| {
                labels
                    .iter()
                    .find(|(k, _)| *k == name.as_str())
                    .map(|(_, v)| v.to_string())
                    .ok_or_else(mismatch)
            })
            .collect()
    }

    fn update_scalar(&self, labels: Labels<'_>, f: impl FnOnce(&mut f64)) -> MetricsResult<()> {
        let key = self.key(labels)?;
        let mut data = lock(&self.data);
        if let Accumulators::Scalar(series) = &mut *data {
            f(series.entry(key).or_insert(0.0));
        }
        Ok(())
    }

    fn scalar(&self, labels: Labels<'_>) -> MetricsResult<f64> {
        let key = self.key(labels)?;
        let data = lock(&self.data);
        Ok(match &*data {
            Accumulators::Scalar(series) => series.get(&key).copied().unwrap_or(0.0),
            _ => 0.0,
        })
    }

    /// Copy the family's state. Summary windows are copied under the lock
    /// and sorted after it is released, so scrapes do not stall `observe`.
    fn snapshot(&self, now: Instant) -> FamilySnapshot {
        let series = match &mut *lock(&self.data) {
            Accumulators::Scalar(series) => Pending::Ready(
                series
                    .iter()
                    .map(|(key, value)| SeriesSnapshot {
                        label_values: key.clone(),
                        value: SampleValue::Scalar(*value),
                    })
                    .collect(),
            ),
            Accumulators::Histogram { bounds, series } => Pending::Ready(
                series
                    .iter()
                    .map(|(key, state)| SeriesSnapshot {
                        label_values: key.clone(),
                        value: SampleValue::Histogram {
                            buckets: bounds
                                .iter()
                                .copied()
                                .zip(state.counts.iter().copied())
                                .collect(),
                            sum: state.sum,
                            count: state.count,
                        },
                    })
                    .collect(),
            ),
            Accumulators::Summary { opts, series } => Pending::Windows {
                quantiles: opts.quantiles.clone(),
                windows: series
                    .iter_mut()
                    .map(|(key, window)| {
                        (key.clone(), window.window(now), window.sum(), window.count())
                    })
                    .collect(),
            },
        };

        let series = match series {
            Pending::Ready(series) => series,
            Pending::Windows { quantiles, windows } => windows
                .into_iter()
                .map(|(label_values, mut samples, sum, count)| {
                    samples.sort_unstable_by(f64::total_cmp);
                    SeriesSnapshot {
                        label_values,
                        value: SampleValue::Summary {
                            quantiles: quantiles
                                .iter()
                                .map(|q| (*q, quantile_of_sorted(&samples, *q)))
                                .collect(),
                            sum,
                            count,
                        },
                    }
                })
                .collect(),
        };

        FamilySnapshot {
            name: self.name.clone(),
            help: self.help.clone(),
            kind: self.kind,
            label_names: self.label_names.clone(),
            series,
        }
    }
}

/// Snapshot data taken under a family lock.
enum Pending {
    Ready(Vec<SeriesSnapshot>),
    Windows {
        quantiles: Vec<f64>,
        windows: Vec<(Vec<String>, Vec<f64>, f64, u64)>,
    },
}

// ── Handles ────────────────────────────────────────────────────

/// Monotonic counter family.
#[derive(Clone)]
pub struct Counter(Arc<Family>);

impl Counter {
    pub fn inc(&self, labels: Labels<'_>) -> MetricsResult<()> {
        self.inc_by(labels, 1.0)
    }

    pub fn inc_by(&self, labels: Labels<'_>, amount: f64) -> MetricsResult<()> {
        if amount < 0.0 || amount.is_nan() {
            return Err(MetricsError::NegativeIncrement {
                metric: self.0.name.clone(),
                amount,
            });
        }
        self.0.update_scalar(labels, |v| *v += amount)
    }

    /// Zero every series. Only meant for re-seeding from durable state.
    pub fn reset(&self) {
        let mut data = lock(&self.0.data);
        if let Accumulators::Scalar(series) = &mut *data {
            if self.0.label_names.is_empty() {
                series.insert(Vec::new(), 0.0);
            } else {
                series.clear();
            }
        }
    }

    pub fn get(&self, labels: Labels<'_>) -> MetricsResult<f64> {
        self.0.scalar(labels)
    }
}

/// Settable gauge family.
#[derive(Clone)]
pub struct Gauge(Arc<Family>);

impl Gauge {
    pub fn set(&self, labels: Labels<'_>, value: f64) -> MetricsResult<()> {
        self.0.update_scalar(labels, |v| *v = value)
    }

    pub fn add(&self, labels: Labels<'_>, delta: f64) -> MetricsResult<()> {
        self.0.update_scalar(labels, |v| *v += delta)
    }

    pub fn inc(&self, labels: Labels<'_>) -> MetricsResult<()> {
        self.add(labels, 1.0)
    }

    pub fn dec(&self, labels: Labels<'_>) -> MetricsResult<()> {
        self.add(labels, -1.0)
    }

    pub fn get(&self, labels: Labels<'_>) -> MetricsResult<f64> {
        self.0.scalar(labels)
    }
}

/// Fixed-bucket histogram family. Bucket bounds are inclusive upper bounds.
#[derive(Clone)]
pub struct Histogram(Arc<Family>);

impl Histogram {
    pub fn observe(&self, labels: Labels<'_>, value: f64) -> MetricsResult<()> {
        let key = self.0.key(labels)?;
        let mut data = lock(&self.0.data);
        if let Accumulators::Histogram { bounds, series } = &mut *data {
            let state = series.entry(key).or_insert_with(|| HistogramState {
                counts: vec![0; bounds.len()],
                ..Default::default()
            });
            for (bound, count) in bounds.iter().zip(state.counts.iter_mut()) {
                if value <= *bound {
                    *count += 1;
                }
            }
            state.sum += value;
            state.count += 1;
        }
        Ok(())
    }

    /// Number of observations for a label combination.
    pub fn count(&self, labels: Labels<'_>) -> MetricsResult<u64> {
        let key = self.0.key(labels)?;
        let data = lock(&self.0.data);
        Ok(match &*data {
            Accumulators::Histogram { series, .. } => {
                series.get(&key).map(|s| s.count).unwrap_or(0)
            }
            _ => 0,
        })
    }
}

/// Sliding-window summary family.
#[derive(Clone)]
pub struct Summary(Arc<Family>);

impl Summary {
    pub fn observe(&self, labels: Labels<'_>, value: f64) -> MetricsResult<()> {
        self.observe_at(labels, value, Instant::now())
    }

    pub(crate) fn observe_at(
        &self,
        labels: Labels<'_>,
        value: f64,
        now: Instant,
    ) -> MetricsResult<()> {
        let key = self.0.key(labels)?;
        let mut data = lock(&self.0.data);
        if let Accumulators::Summary { opts, series } = &mut *data {
            series
                .entry(key)
                .or_insert_with(|| SlidingQuantiles::new(opts, now))
                .observe(value, now);
        }
        Ok(())
    }

    /// Current windowed quantile, `None` if the combination was never observed.
    pub fn quantile(&self, labels: Labels<'_>, q: f64) -> MetricsResult<Option<f64>> {
        self.quantile_at(labels, q, Instant::now())
    }

    pub(crate) fn quantile_at(
        &self,
        labels: Labels<'_>,
        q: f64,
        now: Instant,
    ) -> MetricsResult<Option<f64>> {
        let key = self.0.key(labels)?;
        let mut data = lock(&self.0.data);
        Ok(match &mut *data {
            Accumulators::Summary { series, .. } => {
                series.get_mut(&key).map(|window| window.quantile(q, now))
            }
            _ => None,
        })
    }

    pub fn count(&self, labels: Labels<'_>) -> MetricsResult<u64> {
        let key = self.0.key(labels)?;
        let data = lock(&self.0.data);
        Ok(match &*data {
            Accumulators::Summary { series, .. } => {
                series.get(&key).map(|w| w.count()).unwrap_or(0)
            }
            _ => 0,
        })
    }
}

// ── Registry ───────────────────────────────────────────────────

/// Process-wide metric registry. Cloning shares the same families.
#[derive(Clone, Default)]
pub struct Registry {
    families: Arc<RwLock<Vec<Arc<Family>>>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn counter(&self, name: &str, help: &str, labels: &[&str]) -> MetricsResult<Counter> {
        let data = Accumulators::Scalar(BTreeMap::new());
        self.register(name, help, MetricKind::Counter, labels, data)
            .map(Counter)
    }

    pub fn gauge(&self, name: &str, help: &str, labels: &[&str]) -> MetricsResult<Gauge> {
        let data = Accumulators::Scalar(BTreeMap::new());
        self.register(name, help, MetricKind::Gauge, labels, data)
            .map(Gauge)
    }

    pub fn histogram(
        &self,
        name: &str,
        help: &str,
        labels: &[&str],
        buckets: &[f64],
    ) -> MetricsResult<Histogram> {
        let valid = !buckets.is_empty()
            && buckets.iter().all(|b| b.is_finite())
            && buckets.windows(2).all(|w| w[0] < w[1]);
        if !valid {
            return Err(MetricsError::InvalidBuckets {
                metric: name.to_string(),
            });
        }
        let data = Accumulators::Histogram {
            bounds: buckets.to_vec(),
            series: BTreeMap::new(),
        };
        self.register(name, help, MetricKind::Histogram, labels, data)
            .map(Histogram)
    }

    pub fn summary(
        &self,
        name: &str,
        help: &str,
        labels: &[&str],
        opts: SummaryOpts,
    ) -> MetricsResult<Summary> {
        opts.validate()
            .map_err(|reason| MetricsError::InvalidSummary {
                metric: name.to_string(),
                reason,
            })?;
        let data = Accumulators::Summary {
            opts,
            series: BTreeMap::new(),
        };
        self.register(name, help, MetricKind::Summary, labels, data)
            .map(Summary)
    }

    fn register(
        &self,
        name: &str,
        help: &str,
        kind: MetricKind,
        labels: &[&str],
        mut data: Accumulators,
    ) -> MetricsResult<Arc<Family>> {
        if !is_valid_metric_name(name) {
            return Err(MetricsError::InvalidName(name.to_string()));
        }
        for label in labels {
            let reserved = match kind {
                MetricKind::Histogram => *label == "le",
                MetricKind::Summary => *label == "quantile",
                _ => false,
            };
            if !is_valid_label_name(label) || reserved {
                return Err(MetricsError::InvalidLabel {
                    metric: name.to_string(),
                    label: label.to_string(),
                });
            }
        }

        // Label-less scalars always expose a value, even before first use.
        if labels.is_empty() {
            if let Accumulators::Scalar(series) = &mut data {
                series.insert(Vec::new(), 0.0);
            }
        }

        let mut families = self
            .families
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if families.iter().any(|f| f.name == name) {
            return Err(MetricsError::Duplicate(name.to_string()));
        }
        let family = Arc::new(Family {
            name: name.to_string(),
            help: help.to_string(),
            kind,
            label_names: labels.iter().map(|l| l.to_string()).collect(),
            data: Mutex::new(data),
        });
        families.push(Arc::clone(&family));
        debug!(metric = name, kind = kind.as_str(), "metric registered");
        Ok(family)
    }

    /// Names of all registered families, in registration order.
    pub fn names(&self) -> Vec<String> {
        self.families
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|f| f.name.clone())
            .collect()
    }

    /// Copy every family's current state, in registration order.
    pub fn gather(&self) -> Vec<FamilySnapshot> {
        let families = self
            .families
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        let now = Instant::now();
        families.iter().map(|f| f.snapshot(now)).collect()
    }

    /// Render the current state in the Prometheus text exposition format.
    pub fn render(&self) -> String {
        prometheus::render_prometheus(&self.gather())
    }
}

fn is_valid_metric_name(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_' || c == ':')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == ':')
}

fn is_valid_label_name(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        && !name.starts_with("__")
}
