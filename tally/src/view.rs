//! Typed read-only views handed to export visitors.
//!
//! Iterating an [`AggregationEngine`](crate::AggregationEngine) yields one
//! [`Metric`] per aggregate. Each carries its name and a [`MetricValue`]
//! borrowing the underlying aggregator, so exporters read counters, timers,
//! sets and gauges in place without copying.
//!
//! # Example
//!
//! ```rust
//! use tally::{AggregationEngine, MetricKind, MetricValue};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut engine = AggregationEngine::with_defaults();
//! engine.add_sample(MetricKind::Counter, "requests", 1.0, 1.0)?;
//! engine.add_sample(MetricKind::Counter, "requests", 1.0, 1.0)?;
//!
//! for metric in engine.iter() {
//!     if let MetricValue::Counter(moments) = metric.value {
//!         assert_eq!(metric.name, "requests");
//!         assert_eq!(moments.sum(), 2.0);
//!     }
//! }
//! # Ok(())
//! # }
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::gauge::GaugeCell;
use crate::moments::OnlineMoments;
use crate::set::CardinalityEstimator;
use crate::timer::QuantileEstimator;

/// The metric families an engine aggregates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricKind {
    /// Streaming count/sum/min/max moments.
    Counter,
    /// Bounded-error quantiles with optional histogram buckets.
    Timer,
    /// Distinct-item counts.
    Set,
    /// Last value with delta support.
    Gauge,
    /// One-shot name/value pairs, never aggregated.
    KeyVal,
}

impl MetricKind {
    /// The four registry-backed families, in iteration order.
    pub const AGGREGATED: [Self; 4] = [Self::Counter, Self::Timer, Self::Set, Self::Gauge];

    /// Lowercase name of the family.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Counter => "counter",
            Self::Timer => "timer",
            Self::Set => "set",
            Self::Gauge => "gauge",
            Self::KeyVal => "key_val",
        }
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Borrowed aggregate for one metric.
#[derive(Debug, Clone, Copy)]
pub enum MetricValue<'a> {
    /// A key-value pair, verbatim.
    KeyVal(f64),
    /// Counter moments.
    Counter(&'a OnlineMoments),
    /// Timer quantiles, moments and histogram.
    Timer(&'a QuantileEstimator),
    /// Set cardinality.
    Set(&'a CardinalityEstimator),
    /// Gauge cell.
    Gauge(&'a GaugeCell),
}

impl MetricValue<'_> {
    /// The family this value belongs to.
    pub fn kind(&self) -> MetricKind {
        match self {
            Self::KeyVal(_) => MetricKind::KeyVal,
            Self::Counter(_) => MetricKind::Counter,
            Self::Timer(_) => MetricKind::Timer,
            Self::Set(_) => MetricKind::Set,
            Self::Gauge(_) => MetricKind::Gauge,
        }
    }
}

/// One metric yielded by engine iteration.
#[derive(Debug, Clone, Copy)]
pub struct Metric<'a> {
    /// The metric name.
    pub name: &'a str,
    /// The aggregate.
    pub value: MetricValue<'a>,
}

impl Metric<'_> {
    /// The family of this metric.
    pub fn kind(&self) -> MetricKind {
        self.value.kind()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_display() {
        assert_eq!(MetricKind::Counter.to_string(), "counter");
        assert_eq!(MetricKind::KeyVal.to_string(), "key_val");
        assert_eq!(
            serde_json::to_string(&MetricKind::Timer).unwrap(),
            "\"timer\""
        );
    }

    #[test]
    fn test_value_kind() {
        let moments = OnlineMoments::new();
        let cell = GaugeCell::default();
        assert_eq!(MetricValue::Counter(&moments).kind(), MetricKind::Counter);
        assert_eq!(MetricValue::Gauge(&cell).kind(), MetricKind::Gauge);

        let metric = Metric {
            name: "build.id",
            value: MetricValue::KeyVal(42.0),
        };
        assert_eq!(metric.kind(), MetricKind::KeyVal);
    }
}
