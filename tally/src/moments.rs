//! Streaming count/sum/min/max accumulator used for counters and timers.
//!
//! [`OnlineMoments`] is a fixed-size struct: folding a sample touches five
//! fields and never allocates. Mean and sample standard deviation are derived
//! on demand from the running sums.

use serde::{Deserialize, Serialize};

/// Streaming first and second moments of a sample sequence.
///
/// While `count == 0` the extrema hold sentinels (`min = +inf`,
/// `max = -inf`); after the first sample every field is finite and
/// `min <= max`.
///
/// # Example
///
/// ```rust
/// use tally::OnlineMoments;
///
/// let mut moments = OnlineMoments::new();
/// for v in [1.0, 2.0, 3.0, 4.0, 5.0] {
///     moments.add_sample(v);
/// }
/// assert_eq!(moments.count(), 5);
/// assert_eq!(moments.mean(), 3.0);
/// assert!((moments.sample_stddev() - 2.5f64.sqrt()).abs() < 1e-12);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OnlineMoments {
    count: u64,
    sum: f64,
    sum_sq: f64,
    min: f64,
    max: f64,
}

impl OnlineMoments {
    /// Creates an empty accumulator.
    pub const fn new() -> Self {
        Self {
            count: 0,
            sum: 0.0,
            sum_sq: 0.0,
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
        }
    }

    /// Folds one sample into the accumulator.
    #[inline]
    pub fn add_sample(&mut self, value: f64) {
        self.count += 1;
        self.sum += value;
        self.sum_sq += value * value;
        self.min = self.min.min(value);
        self.max = self.max.max(value);
    }

    /// Number of samples folded so far.
    pub fn count(&self) -> u64 {
        self.count
    }

    /// Sum of all samples.
    pub fn sum(&self) -> f64 {
        self.sum
    }

    /// Sum of the squared samples.
    pub fn sum_sq(&self) -> f64 {
        self.sum_sq
    }

    /// Smallest sample, or `+inf` when empty.
    pub fn min(&self) -> f64 {
        self.min
    }

    /// Largest sample, or `-inf` when empty.
    pub fn max(&self) -> f64 {
        self.max
    }

    /// Returns `true` if no sample has been folded.
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Arithmetic mean, or `0.0` when empty.
    #[allow(clippy::cast_precision_loss)] // counts beyond 2^53 are not a practical concern
    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            return 0.0;
        }
        self.sum / self.count as f64
    }

    /// Sample (Bessel-corrected) standard deviation, or `0.0` below two samples.
    ///
    /// Floating-point cancellation can push the variance slightly negative
    /// for near-constant streams; it is clamped at zero.
    #[allow(clippy::cast_precision_loss)]
    pub fn sample_stddev(&self) -> f64 {
        if self.count < 2 {
            return 0.0;
        }
        let n = self.count as f64;
        let variance = (self.sum_sq - self.sum * self.sum / n) / (n - 1.0);
        variance.max(0.0).sqrt()
    }
}

impl Default for OnlineMoments {
    fn default() -> Self {
        Self::new()
    }
}
