//! The aggregation engine: ingestion entry points and export iteration.
//!
//! An [`AggregationEngine`] owns one [`MetricRegistry`] and the key-value
//! sequence for a single epoch. Ingestion calls validate their arguments,
//! resolve the aggregator through the registry, and fold the sample. A failed
//! call leaves the engine exactly as it was.
//!
//! # Iteration
//!
//! [`AggregationEngine::iter`] yields every aggregate once as a [`Metric`];
//! [`AggregationEngine::iterate`] drives a visitor over the same sequence and
//! stops as soon as the visitor returns [`ControlFlow::Break`]. Order across
//! and within families is unspecified.
//!
//! # Example
//!
//! ```rust
//! use std::ops::ControlFlow;
//!
//! use tally::{AggregationEngine, MetricKind, MetricValue};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut engine = AggregationEngine::with_defaults();
//! engine.add_sample(MetricKind::Timer, "api.latency", 12.5, 1.0)?;
//! engine.set_gauge("queue.depth", 7.0, false, 0)?;
//! engine.set_update("users", "alice")?;
//! engine.append_kv("build", 1234.0);
//!
//! let mut seen = 0;
//! let _ = engine.iterate(|metric| {
//!     if let MetricValue::Gauge(cell) = metric.value {
//!         assert_eq!(cell.value(), 7.0);
//!     }
//!     seen += 1;
//!     ControlFlow::Continue(())
//! });
//! assert_eq!(seen, 4);
//! # Ok(())
//! # }
//! ```

use std::ops::ControlFlow;
use std::sync::Arc;

use crate::config::EngineConfig;
use crate::error::{Result, SampleError};
use crate::gauge::{GaugeCell, GaugeWrite, StalePolicy};
use crate::hll;
use crate::quantile::QuantileTargets;
use crate::radix::PrefixResolver;
use crate::registry::MetricRegistry;
use crate::view::{Metric, MetricKind, MetricValue};

/// Default HyperLogLog precision for sets.
pub const DEFAULT_SET_PRECISION: u8 = 12;

/// Default number of distinct items a set counts exactly.
pub const DEFAULT_SET_MAX_EXACT: u64 = 64;

/// Validated, immutable settings every aggregator of an engine is built with.
///
/// Cloning is cheap; the quantile targets are shared.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineSettings {
    targets: Arc<QuantileTargets>,
    set_precision: u8,
    set_max_exact: u64,
    gauge_policy: StalePolicy,
}

impl EngineSettings {
    /// Builds settings from validated targets.
    ///
    /// # Errors
    ///
    /// Returns [`crate::ConfigError::InvalidPrecision`] if `set_precision` is
    /// out of range.
    pub fn new(
        targets: QuantileTargets,
        set_precision: u8,
        set_max_exact: u64,
        gauge_policy: StalePolicy,
    ) -> Result<Self> {
        hll::validate_precision(set_precision)?;
        Ok(Self {
            targets: targets.shared(),
            set_precision,
            set_max_exact,
            gauge_policy,
        })
    }

    /// Quantile targets shared by every timer.
    pub fn targets(&self) -> &Arc<QuantileTargets> {
        &self.targets
    }

    /// HyperLogLog precision for sets.
    pub fn set_precision(&self) -> u8 {
        self.set_precision
    }

    /// Distinct items a set counts exactly before converting.
    pub fn set_max_exact(&self) -> u64 {
        self.set_max_exact
    }

    /// How out-of-order gauge timestamps are handled.
    pub fn gauge_policy(&self) -> StalePolicy {
        self.gauge_policy
    }
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            targets: QuantileTargets::default().shared(),
            set_precision: DEFAULT_SET_PRECISION,
            set_max_exact: DEFAULT_SET_MAX_EXACT,
            gauge_policy: StalePolicy::default(),
        }
    }
}

/// Resolver for engines built without histogram configuration.
static EMPTY_RESOLVER: PrefixResolver = PrefixResolver::new();

/// Aggregates for one epoch.
///
/// The engine borrows its [`PrefixResolver`] for `'r` and never frees it.
/// It carries no internal locking; see [`crate::ActiveEngine`] for sharing
/// across threads.
#[derive(Debug)]
pub struct AggregationEngine<'r> {
    registry: MetricRegistry<'r>,
    key_vals: Vec<(String, f64)>,
}

impl<'r> AggregationEngine<'r> {
    /// Creates an engine from a configuration.
    ///
    /// `resolver` is usually built once with [`EngineConfig::build_resolver`]
    /// and shared by every engine of the process.
    ///
    /// # Errors
    ///
    /// Returns [`crate::ConfigError`] if the configuration is invalid.
    pub fn new(config: &EngineConfig, resolver: &'r PrefixResolver) -> Result<Self> {
        Ok(Self::from_settings(config.settings()?, resolver))
    }

    /// Creates an engine from already validated settings.
    pub fn from_settings(settings: EngineSettings, resolver: &'r PrefixResolver) -> Self {
        Self {
            registry: MetricRegistry::new(settings, resolver),
            key_vals: Vec::new(),
        }
    }

    /// Folds one counter or timer sample.
    ///
    /// Counters fold `value / sample_rate`. Timers fold `value` weighted by
    /// `1 / sample_rate`.
    ///
    /// # Errors
    ///
    /// - [`SampleError::EmptyName`] if `name` is empty
    /// - [`SampleError::InvalidSampleRate`] unless `sample_rate` is positive and finite
    /// - [`SampleError::InvalidValue`] if `value` is not finite
    /// - [`SampleError::UnsupportedKind`] for sets, gauges and key-values
    /// - [`SampleError::TypeConflict`] if `name` belongs to another family
    pub fn add_sample(
        &mut self,
        kind: MetricKind,
        name: &str,
        value: f64,
        sample_rate: f64,
    ) -> Result<()> {
        let result = self.fold_sample(kind, name, value, sample_rate);
        log_rejected(kind, name, &result);
        result
    }

    fn fold_sample(
        &mut self,
        kind: MetricKind,
        name: &str,
        value: f64,
        sample_rate: f64,
    ) -> Result<()> {
        validate_name(name)?;
        if !(sample_rate > 0.0 && sample_rate.is_finite()) {
            return Err(SampleError::InvalidSampleRate { rate: sample_rate }.into());
        }
        validate_value(value)?;

        match kind {
            MetricKind::Counter => self.registry.counter(name)?.add_sample(value / sample_rate),
            MetricKind::Timer => self.registry.timer(name)?.add_sample(value, sample_rate),
            MetricKind::Set | MetricKind::Gauge | MetricKind::KeyVal => {
                return Err(SampleError::UnsupportedKind { kind }.into());
            }
        }
        Ok(())
    }

    /// Writes a gauge stamped with the current wall-clock time.
    ///
    /// With `delta` set, `value` is added to the current value. The first
    /// write for a name is always absolute.
    ///
    /// # Errors
    ///
    /// See [`set_gauge_with`](Self::set_gauge_with).
    pub fn set_gauge(&mut self, name: &str, value: f64, delta: bool, user: u64) -> Result<()> {
        let write = GaugeWrite {
            delta,
            ..GaugeWrite::absolute(value)
        };
        self.set_gauge_with(name, write.with_user(user, 0))
    }

    /// Writes a gauge with explicit metadata.
    ///
    /// # Errors
    ///
    /// - [`SampleError::EmptyName`] if `name` is empty
    /// - [`SampleError::InvalidValue`] if the value is not finite
    /// - [`SampleError::TypeConflict`] if `name` belongs to another family
    /// - [`SampleError::StaleGauge`] if the engine rejects stale writes and
    ///   `write` is older than the last accepted one
    pub fn set_gauge_with(&mut self, name: &str, write: GaugeWrite) -> Result<()> {
        let result = self.write_gauge(name, write);
        log_rejected(MetricKind::Gauge, name, &result);
        result
    }

    fn write_gauge(&mut self, name: &str, write: GaugeWrite) -> Result<()> {
        validate_name(name)?;
        validate_value(write.value)?;

        let policy = self.registry.settings().gauge_policy();
        let (cell, created) = self.registry.gauge(name)?;
        if created {
            *cell = GaugeCell::first(write);
            return Ok(());
        }
        if policy == StalePolicy::RejectStale && cell.is_stale(&write) {
            tracing::warn!(
                name,
                timestamp_ms = write.timestamp_ms,
                current_ms = cell.timestamp_ms(),
                "rejected stale gauge write"
            );
            return Err(SampleError::StaleGauge {
                name: name.to_owned(),
                timestamp_ms: write.timestamp_ms,
                current_ms: cell.timestamp_ms(),
            }
            .into());
        }
        cell.apply(write);
        Ok(())
    }

    /// Adds `value` to the set `name`.
    ///
    /// # Errors
    ///
    /// Returns [`SampleError::EmptyName`] if `name` is empty or
    /// [`SampleError::TypeConflict`] if `name` belongs to another family.
    pub fn set_update(&mut self, name: &str, value: &str) -> Result<()> {
        let result = validate_name(name).and_then(|()| {
            self.registry.set(name)?.add(value);
            Ok(())
        });
        log_rejected(MetricKind::Set, name, &result);
        result
    }

    /// Appends a one-shot key-value pair.
    ///
    /// Pairs are appended unconditionally and kept in insertion order. Names
    /// are not validated, deduplicated or checked against the other families.
    pub fn append_kv(&mut self, name: &str, value: f64) {
        self.key_vals.push((name.to_owned(), value));
    }

    /// Lazily yields every aggregate once: counters, timers, sets, gauges,
    /// then key-values in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = Metric<'_>> {
        let registry = &self.registry;
        let counters = registry.counters().map(|(name, moments)| Metric {
            name,
            value: MetricValue::Counter(moments),
        });
        let timers = registry.timers().map(|(name, timer)| Metric {
            name,
            value: MetricValue::Timer(timer),
        });
        let sets = registry.sets().map(|(name, set)| Metric {
            name,
            value: MetricValue::Set(set),
        });
        let gauges = registry.gauges().map(|(name, cell)| Metric {
            name,
            value: MetricValue::Gauge(cell),
        });
        let key_vals = self.key_vals.iter().map(|(name, value)| Metric {
            name: name.as_str(),
            value: MetricValue::KeyVal(*value),
        });

        counters.chain(timers).chain(sets).chain(gauges).chain(key_vals)
    }

    /// Calls `visitor` once per aggregate until it breaks.
    ///
    /// Returns [`ControlFlow::Break`] if the visitor stopped the pass early.
    pub fn iterate<F>(&self, visitor: F) -> ControlFlow<()>
    where
        F: FnMut(Metric<'_>) -> ControlFlow<()>,
    {
        self.iter().try_for_each(visitor)
    }

    /// Number of aggregates in one family.
    pub fn len(&self, kind: MetricKind) -> usize {
        match kind {
            MetricKind::KeyVal => self.key_vals.len(),
            _ => self.registry.len(kind),
        }
    }

    /// Number of aggregates [`iter`](Self::iter) would yield.
    pub fn metric_count(&self) -> usize {
        self.registry.total_len() + self.key_vals.len()
    }

    /// Returns `true` if nothing has been ingested.
    pub fn is_empty(&self) -> bool {
        self.metric_count() == 0
    }

    /// Drops every aggregate of one family.
    pub fn clear(&mut self, kind: MetricKind) {
        match kind {
            MetricKind::KeyVal => self.key_vals.clear(),
            _ => self.registry.clear(kind),
        }
    }

    /// Drops every aggregate, keeping map capacity for the next epoch.
    pub fn reset(&mut self) {
        for kind in MetricKind::AGGREGATED {
            self.registry.clear(kind);
        }
        self.key_vals.clear();
    }

    /// Releases every aggregate. The borrowed resolver is left alone.
    pub fn destroy(self) {
        tracing::debug!(metrics = self.metric_count(), "engine destroyed");
    }

    /// The registry backing this engine.
    pub fn registry(&self) -> &MetricRegistry<'r> {
        &self.registry
    }

    /// The settings aggregators are built with.
    pub fn settings(&self) -> &EngineSettings {
        self.registry.settings()
    }

    /// The borrowed histogram resolver.
    pub fn resolver(&self) -> &'r PrefixResolver {
        self.registry.resolver()
    }
}

impl AggregationEngine<'static> {
    /// Creates an engine with default settings and no histograms.
    pub fn with_defaults() -> Self {
        Self::from_settings(EngineSettings::default(), &EMPTY_RESOLVER)
    }
}

fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(SampleError::EmptyName.into());
    }
    Ok(())
}

fn validate_value(value: f64) -> Result<()> {
    if !value.is_finite() {
        return Err(SampleError::InvalidValue {
            value,
            reason: "not finite",
        }
        .into());
    }
    Ok(())
}

fn log_rejected<T>(kind: MetricKind, name: &str, result: &Result<T>) {
    if let Err(error) = result {
        tracing::debug!(%kind, name, %error, "rejected sample");
    }
}
