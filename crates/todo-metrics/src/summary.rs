//! Sliding time-window quantile estimation for summary metrics.
//!
//! Samples are kept in a ring of `age_buckets` sample sets. Each
//! observation is stored once, in the current set; every
//! `max_age / age_buckets` the ring advances and the set it lands on is
//! cleared. Quantiles are read from the union of all sets, which covers at
//! most `max_age` of traffic, so old samples age out instead of dominating
//! all-time history.
//!
//! `sum` and `count` are lifetime totals, matching the exposition format's
//! `_sum` / `_count` semantics.

use std::time::{Duration, Instant};

/// Configuration for a summary family.
#[derive(Debug, Clone, PartialEq)]
pub struct SummaryOpts {
    /// Quantiles to report, each in `[0, 1]`.
    pub quantiles: Vec<f64>,
    /// Length of the sliding window.
    pub max_age: Duration,
    /// Number of rotating sample sets covering the window.
    pub age_buckets: usize,
}

impl Default for SummaryOpts {
    fn default() -> Self {
        Self {
            quantiles: vec![0.5, 0.9, 0.95, 0.99],
            max_age: Duration::from_secs(600),
            age_buckets: 5,
        }
    }
}

impl SummaryOpts {
    pub(crate) fn validate(&self) -> Result<(), String> {
        if self.age_buckets == 0 {
            return Err("age_buckets must be at least 1".to_string());
        }
        if self.max_age.is_zero() {
            return Err("max_age must be positive".to_string());
        }
        if let Some(q) = self
            .quantiles
            .iter()
            .find(|q| !q.is_finite() || **q < 0.0 || **q > 1.0)
        {
            return Err(format!("quantile {q} is outside [0, 1]"));
        }
        Ok(())
    }
}

/// Per-label-set window state.
#[derive(Debug)]
pub(crate) struct SlidingQuantiles {
    ring: Vec<Vec<f64>>,
    current: usize,
    rotate_every: Duration,
    max_age: Duration,
    last_rotation: Instant,
    sum: f64,
    count: u64,
}

impl SlidingQuantiles {
    pub(crate) fn new(opts: &SummaryOpts, now: Instant) -> Self {
        let buckets = opts.age_buckets.max(1);
        Self {
            ring: vec![Vec::new(); buckets],
            current: 0,
            rotate_every: opts.max_age / buckets as u32,
            max_age: opts.max_age,
            last_rotation: now,
            sum: 0.0,
            count: 0,
        }
    }

    pub(crate) fn observe(&mut self, value: f64, now: Instant) {
        self.rotate(now);
        self.ring[self.current].push(value);
        self.sum += value;
        self.count += 1;
    }

    /// Copy of every sample still inside the window, unsorted.
    pub(crate) fn window(&mut self, now: Instant) -> Vec<f64> {
        self.rotate(now);
        let len = self.ring.iter().map(Vec::len).sum();
        let mut samples = Vec::with_capacity(len);
        for set in &self.ring {
            samples.extend_from_slice(set);
        }
        samples
    }

    /// Quantile over the current window. `NaN` when the window is empty.
    pub(crate) fn quantile(&mut self, q: f64, now: Instant) -> f64 {
        let mut samples = self.window(now);
        samples.sort_unstable_by(f64::total_cmp);
        quantile_of_sorted(&samples, q)
    }

    /// Samples held across the ring.
    pub(crate) fn stored(&self) -> usize {
        self.ring.iter().map(Vec::len).sum()
    }

    pub(crate) fn sum(&self) -> f64 {
        self.sum
    }

    pub(crate) fn count(&self) -> u64 {
        self.count
    }

    fn rotate(&mut self, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last_rotation);
        if elapsed >= self.max_age {
            for set in &mut self.ring {
                set.clear();
            }
            self.current = 0;
            self.last_rotation = now;
            return;
        }
        let mut elapsed = elapsed;
        while elapsed >= self.rotate_every && !self.rotate_every.is_zero() {
            self.current = (self.current + 1) % self.ring.len();
            self.ring[self.current].clear();
            self.last_rotation += self.rotate_every;
            elapsed -= self.rotate_every;
        }
    }
}

/// Nearest-rank quantile of an ascending slice. `NaN` when empty.
pub(crate) fn quantile_of_sorted(sorted: &[f64], q: f64) -> f64 {
    if sorted.is_empty() {
        return f64::NAN;
    }
    let rank = (q * sorted.len() as f64).ceil() as usize;
    sorted[rank.saturating_sub(1).min(sorted.len() - 1)]
}
