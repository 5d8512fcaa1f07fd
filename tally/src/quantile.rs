//! Bounded-error streaming quantile summary for timers.
//!
//! Implements the targeted-quantile variant of the Cormode, Korn,
//! Muthukrishnan and Srivastava (CKMS) biased-quantile summary. The summary
//! keeps a sorted list of tuples `(value, g, delta)` where `g` is the weight
//! the tuple absorbed and `delta` bounds the uncertainty of its rank. Tuples
//! are merged whenever the merged uncertainty stays under the allowed error
//! function `f(r, n)`, which is smallest around the configured targets and
//! never exceeds the uniform bound `2 * eps * n`.
//!
//! # Error Contract
//!
//! For every `phi` in `[0, 1]`, [`QuantileSummary::query`] returns a value
//! whose true rank lies within `eps * n` of `phi * n`, where `n` is the total
//! weight folded so far. The configured targets are held more tightly.
//!
//! # Weights
//!
//! Each insert carries a weight (`1 / sample_rate` for sub-sampled timers).
//! Weights are real numbers so that ranks estimate the full population.

use std::sync::Arc;

use crate::error::{ConfigError, Result};

/// Default rank error tolerance.
pub const DEFAULT_EPS: f64 = 0.01;

/// Default target quantiles.
pub const DEFAULT_QUANTILES: [f64; 3] = [0.5, 0.95, 0.99];

/// Error tolerance and target quantiles shared by every timer of an engine.
///
/// Built once at engine construction and shared behind an [`Arc`].
#[derive(Debug, Clone, PartialEq)]
pub struct QuantileTargets {
    eps: f64,
    quantiles: Box<[f64]>,
}

impl QuantileTargets {
    /// Validates and builds a target set.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if `eps` is outside `(0, 1)`, the list is
    /// empty, any quantile is outside `(0, 1)`, or the list is not strictly
    /// increasing.
    pub fn new(eps: f64, quantiles: &[f64]) -> Result<Self> {
        if !(eps > 0.0 && eps < 1.0) {
            return Err(ConfigError::InvalidEpsilon { eps }.into());
        }
        if quantiles.is_empty() {
            return Err(ConfigError::NoQuantiles.into());
        }
        for &quantile in quantiles {
            if !(quantile > 0.0 && quantile < 1.0) {
                return Err(ConfigError::InvalidQuantile { quantile }.into());
            }
        }
        if quantiles.windows(2).any(|w| w[0] >= w[1]) {
            return Err(ConfigError::QuantilesNotSorted.into());
        }

        Ok(Self {
            eps,
            quantiles: quantiles.into(),
        })
    }

    /// Wraps the targets for sharing across timers.
    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    /// The rank error tolerance.
    pub fn eps(&self) -> f64 {
        self.eps
    }

    /// The sorted target quantiles.
    pub fn quantiles(&self) -> &[f64] {
        &self.quantiles
    }

    /// Number of inserts between compression passes.
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)] // eps in (0, 1)
    fn compress_interval(&self) -> u32 {
        ((1.0 / (2.0 * self.eps)).floor() as u32).max(1)
    }

    /// Allowed rank uncertainty `f(r, n)` at rank `r` of a stream of weight `n`.
    ///
    /// Capped at `2 * eps * n` so untargeted ranks keep the `eps * n` bound.
    fn allowed_error(&self, rank: f64, n: f64) -> f64 {
        let targeted = self
            .quantiles
            .iter()
            .map(|&phi| {
                if phi * n <= rank {
                    2.0 * self.eps * rank / phi
                } else {
                    2.0 * self.eps * (n - rank) / (1.0 - phi)
                }
            })
            .fold(f64::INFINITY, f64::min);
        targeted.min(2.0 * self.eps * n)
    }
}

impl Default for QuantileTargets {
    fn default() -> Self {
        Self {
            eps: DEFAULT_EPS,
            quantiles: DEFAULT_QUANTILES.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Tuple {
    value: f64,
    g: f64,
    delta: f64,
}

/// CKMS targeted-quantile summary.
///
/// The summary does not own its [`QuantileTargets`]; the caller passes the
/// same targets to every insert and query.
#[derive(Debug, Clone, Default)]
pub struct QuantileSummary {
    tuples: Vec<Tuple>,
    total_weight: f64,
    since_compress: u32,
}

impl QuantileSummary {
    /// Creates an empty summary.
    pub const fn new() -> Self {
        Self {
            tuples: Vec::new(),
            total_weight: 0.0,
            since_compress: 0,
        }
    }

    /// Folds `value` with the given positive `weight`.
    pub fn insert(&mut self, value: f64, weight: f64, targets: &QuantileTargets) {
        debug_assert!(weight > 0.0);

        let index = self.tuples.partition_point(|t| t.value <= value);
        let delta = if index == 0 || index == self.tuples.len() {
            // New extremes are known exactly.
            0.0
        } else {
            let rank: f64 = self.tuples[..index].iter().map(|t| t.g).sum();
            (targets.allowed_error(rank, self.total_weight).floor() - weight).max(0.0)
        };

        self.tuples.insert(
            index,
            Tuple {
                value,
                g: weight,
                delta,
            },
        );
        self.total_weight += weight;

        self.since_compress += 1;
        if self.since_compress >= targets.compress_interval() {
            self.compress(targets);
        }
    }

    /// Merges adjacent tuples whose combined uncertainty stays within bounds.
    ///
    /// The first and last tuples are never absorbed, so the exact minimum and
    /// maximum survive compression.
    pub fn compress(&mut self, targets: &QuantileTargets) {
        self.since_compress = 0;
        if self.tuples.len() < 3 {
            return;
        }

        let n = self.total_weight;
        let mut keep = self.tuples.len() - 1;
        let mut rank = n - self.tuples[keep].g;
        let mut i = keep - 1;
        while i >= 1 {
            let current = self.tuples[i];
            rank -= current.g;
            let next = self.tuples[keep];
            if current.g + next.g + next.delta <= targets.allowed_error(rank, n) {
                self.tuples[keep].g += current.g;
                self.tuples.remove(i);
                keep -= 1;
            } else {
                keep = i;
            }
            i -= 1;
        }
    }

    /// Returns the value at quantile `phi`, or `None` if the summary is empty.
    ///
    /// `phi` is clamped into `[0, 1]`.
    pub fn query(&self, phi: f64, targets: &QuantileTargets) -> Option<f64> {
        let first = self.tuples.first()?;
        let n = self.total_weight;
        let rank = phi.clamp(0.0, 1.0) * n;
        let threshold = rank + targets.allowed_error(rank, n) / 2.0;

        let mut previous = first;
        let mut cumulative = 0.0;
        for tuple in &self.tuples[1..] {
            cumulative += previous.g;
            if cumulative + tuple.g + tuple.delta > threshold {
                return Some(previous.value);
            }
            previous = tuple;
        }
        Some(previous.value)
    }

    /// Total weight folded so far.
    pub fn total_weight(&self) -> f64 {
        self.total_weight
    }

    /// Number of tuples currently retained.
    pub fn len(&self) -> usize {
        self.tuples.len()
    }

    /// Returns `true` if nothing has been folded.
    pub fn is_empty(&self) -> bool {
        self.tuples.is_empty()
    }

    /// Discards every tuple and releases the backing storage.
    pub fn clear(&mut self) {
        self.tuples = Vec::new();
        self.total_weight = 0.0;
        self.since_compress = 0;
    }
}
