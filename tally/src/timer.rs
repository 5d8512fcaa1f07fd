//! Timer aggregation: quantiles, moments and optional histogram buckets.
//!
//! A [`QuantileEstimator`] combines three views of the same sample stream:
//!
//! - a [`QuantileSummary`] answering rank queries within `eps * n`,
//! - [`OnlineMoments`] over the observed values,
//! - fixed [`Histogram`] bucket counts when the timer's name matched a
//!   configured prefix at creation time.
//!
//! Sub-sampled values (`sample_rate < 1`) are weighted by `1 / sample_rate` in
//! the summary and the histogram so that ranks and bucket counts estimate the
//! full population. The moments count what was actually observed.

use std::sync::Arc;

use crate::histogram::HistogramConfig;
use crate::moments::OnlineMoments;
use crate::quantile::{QuantileSummary, QuantileTargets};

/// Bucket counts for one timer.
#[derive(Debug, Clone)]
pub struct Histogram {
    config: HistogramConfig,
    counts: Box<[f64]>,
}

impl Histogram {
    fn new(config: HistogramConfig) -> Self {
        let counts = vec![0.0; config.bucket_count()].into_boxed_slice();
        Self { config, counts }
    }

    #[inline]
    fn record(&mut self, value: f64, weight: f64) {
        let index = self.config.bucket_index(value);
        self.counts[index] += weight;
    }

    fn reset(&mut self) {
        self.counts.fill(0.0);
    }

    /// The prefix whose layout this histogram uses.
    pub fn prefix(&self) -> &str {
        self.config.prefix()
    }

    /// The bucket boundaries.
    pub fn boundaries(&self) -> &[f64] {
        self.config.boundaries()
    }

    /// Weighted count per bucket; `boundaries().len() + 1` entries.
    ///
    /// Entry `0` is the underflow bucket and the last entry the overflow bucket.
    pub fn counts(&self) -> &[f64] {
        &self.counts
    }

    /// Sum of all bucket counts.
    pub fn total(&self) -> f64 {
        self.counts.iter().sum()
    }
}

/// Streaming timer aggregate.
///
/// # Example
///
/// ```rust
/// use tally::{QuantileEstimator, QuantileTargets};
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let targets = QuantileTargets::new(0.01, &[0.5, 0.99])?.shared();
/// let mut timer = QuantileEstimator::new(targets, None);
/// for ms in 1..=1000 {
///     timer.add_sample(f64::from(ms), 1.0);
/// }
///
/// let p50 = timer.quantile(0.5).unwrap();
/// assert!((485.0..=515.0).contains(&p50));
/// assert_eq!(timer.moments().count(), 1000);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct QuantileEstimator {
    targets: Arc<QuantileTargets>,
    summary: QuantileSummary,
    moments: OnlineMoments,
    estimated_count: f64,
    histogram: Option<Histogram>,
}

impl QuantileEstimator {
    /// Creates an empty timer, with bucket counts if `histogram` is given.
    pub fn new(targets: Arc<QuantileTargets>, histogram: Option<HistogramConfig>) -> Self {
        Self {
            targets,
            summary: QuantileSummary::new(),
            moments: OnlineMoments::new(),
            estimated_count: 0.0,
            histogram: histogram.map(Histogram::new),
        }
    }

    /// Folds one observed value.
    ///
    /// `sample_rate` must be in `(0, 1]` for sub-sampled streams; the engine
    /// rejects non-positive rates before they reach the timer.
    pub fn add_sample(&mut self, value: f64, sample_rate: f64) {
        debug_assert!(sample_rate > 0.0);
        let weight = 1.0 / sample_rate;

        self.summary.insert(value, weight, &self.targets);
        self.moments.add_sample(value);
        self.estimated_count += weight;
        if let Some(histogram) = &mut self.histogram {
            histogram.record(value, weight);
        }
    }

    /// Value at quantile `phi`, or `None` before the first sample.
    ///
    /// The true rank of the result is within `eps * count` of `phi * count`
    /// for every `phi`.
    pub fn quantile(&self, phi: f64) -> Option<f64> {
        self.summary.query(phi, &self.targets)
    }

    /// `(phi, value)` for every configured target, in increasing `phi` order.
    ///
    /// Values are clamped to be non-decreasing. Empty before the first sample.
    pub fn quantiles(&self) -> impl Iterator<Item = (f64, f64)> + '_ {
        let mut floor = f64::NEG_INFINITY;
        self.targets.quantiles().iter().filter_map(move |&phi| {
            let value = self.quantile(phi)?.max(floor);
            floor = value;
            Some((phi, value))
        })
    }

    /// Moments of the observed values.
    pub fn moments(&self) -> &OnlineMoments {
        &self.moments
    }

    /// Sum of sample weights; the population size the observations stand for.
    pub fn estimated_count(&self) -> f64 {
        self.estimated_count
    }

    /// Bucket counts, if a histogram layout matched this timer.
    pub fn histogram(&self) -> Option<&Histogram> {
        self.histogram.as_ref()
    }

    /// The shared quantile targets.
    pub fn targets(&self) -> &QuantileTargets {
        &self.targets
    }

    /// Tuples retained by the quantile summary.
    pub fn summary_len(&self) -> usize {
        self.summary.len()
    }

    /// Drops every sample, keeping the histogram layout.
    pub fn reset(&mut self) {
        self.summary.clear();
        self.moments = OnlineMoments::new();
        self.estimated_count = 0.0;
        if let Some(histogram) = &mut self.histogram {
            histogram.reset();
        }
    }
}
