//! Distinct-count estimator for set metrics.
//!
//! A [`CardinalityEstimator`] counts exactly while the number of distinct
//! items stays below its threshold, then converts once and for all to a
//! [`HyperLogLog`] sketch. Small sets therefore report exact counts and large
//! sets use bounded memory.

use std::collections::HashSet;

use crate::error::Result;
use crate::hll::{self, HyperLogLog};

/// The estimator's current representation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetMode {
    /// Distinct item hashes are stored and counted exactly.
    Exact,
    /// Items are folded into HyperLogLog registers.
    Approximate,
}

#[derive(Debug, Clone)]
enum State {
    Exact(HashSet<u64>),
    Approximate(HyperLogLog),
}

/// Exact-then-approximate distinct counter.
///
/// # Example
///
/// ```rust
/// use tally::{CardinalityEstimator, SetMode};
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let mut users = CardinalityEstimator::new(12, 100)?;
/// users.add("alice");
/// users.add("bob");
/// users.add("alice");
/// assert_eq!(users.cardinality(), 2);
/// assert_eq!(users.mode(), SetMode::Exact);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct CardinalityEstimator {
    state: State,
    precision: u8,
    max_exact: u64,
}

impl CardinalityEstimator {
    /// Creates an estimator that stays exact below `max_exact` distinct items.
    ///
    /// A `max_exact` of zero starts directly in approximate mode.
    ///
    /// # Errors
    ///
    /// Returns [`crate::ConfigError::InvalidPrecision`] if `precision` is
    /// outside the supported register range.
    pub fn new(precision: u8, max_exact: u64) -> Result<Self> {
        hll::validate_precision(precision)?;
        let state = if max_exact == 0 {
            State::Approximate(HyperLogLog::with_checked_precision(precision))
        } else {
            State::Exact(HashSet::new())
        };
        Ok(Self {
            state,
            precision,
            max_exact,
        })
    }

    /// Adds `value` to the set.
    pub fn add(&mut self, value: &str) {
        self.add_hash(hll::hash_bytes(value.as_bytes()));
    }

    /// Adds an already hashed item.
    pub fn add_hash(&mut self, hash: u64) {
        match &mut self.state {
            State::Exact(items) => {
                items.insert(hash);
                if items.len() as u64 >= self.max_exact {
                    self.convert();
                }
            }
            State::Approximate(sketch) => sketch.add_hash(hash),
        }
    }

    /// Exact count in exact mode, HyperLogLog estimate afterwards.
    pub fn cardinality(&self) -> u64 {
        match &self.state {
            State::Exact(items) => items.len() as u64,
            State::Approximate(sketch) => sketch.cardinality(),
        }
    }

    /// The current representation.
    pub fn mode(&self) -> SetMode {
        match self.state {
            State::Exact(_) => SetMode::Exact,
            State::Approximate(_) => SetMode::Approximate,
        }
    }

    /// Relative standard error of [`cardinality`](Self::cardinality); zero while exact.
    pub fn standard_error(&self) -> f64 {
        match &self.state {
            State::Exact(_) => 0.0,
            State::Approximate(sketch) => sketch.standard_error(),
        }
    }

    /// The HyperLogLog precision used after conversion.
    pub fn precision(&self) -> u8 {
        self.precision
    }

    /// The exact-mode threshold.
    pub fn max_exact(&self) -> u64 {
        self.max_exact
    }

    fn convert(&mut self) {
        let State::Exact(items) = &self.state else {
            return;
        };
        // Precision was validated in `new`.
        let mut sketch = HyperLogLog::with_checked_precision(self.precision);
        for &hash in items {
            sketch.add_hash(hash);
        }
        tracing::debug!(
            exact = items.len(),
            precision = self.precision,
            "set converted to approximate counting"
        );
        self.state = State::Approximate(sketch);
    }
}
