//! Name-keyed storage for every aggregator of one engine.
//!
//! The registry keeps one map per metric family. Aggregators are created
//! lazily on the first sample for a name and live until the family is
//! cleared or the registry is dropped.
//!
//! # Type Conflicts
//!
//! A name belongs to at most one family. Creating an aggregator for a name
//! already present in another family fails with
//! [`SampleError::TypeConflict`] and leaves the existing aggregator untouched.
//! The check runs only when an entry would be created, so repeated samples
//! for a known name cost a single map lookup.
//!
//! # Example
//!
//! ```rust
//! use tally::{EngineSettings, MetricKind, MetricRegistry, PrefixResolver};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let resolver = PrefixResolver::new();
//! let mut registry = MetricRegistry::new(EngineSettings::default(), &resolver);
//!
//! registry.counter("foo")?.add_sample(1.0);
//! let err = registry.timer("foo").unwrap_err();
//! assert!(err.is_type_conflict());
//! assert_eq!(registry.kind_of("foo"), Some(MetricKind::Counter));
//! # Ok(())
//! # }
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use crate::engine::EngineSettings;
use crate::error::{Result, SampleError};
use crate::gauge::GaugeCell;
use crate::moments::OnlineMoments;
use crate::radix::PrefixResolver;
use crate::set::CardinalityEstimator;
use crate::timer::QuantileEstimator;
use crate::view::MetricKind;

/// Mutable handle to one aggregator, tagged by family.
#[derive(Debug)]
pub enum AggregatorMut<'a> {
    /// Counter moments.
    Counter(&'a mut OnlineMoments),
    /// Timer estimator.
    Timer(&'a mut QuantileEstimator),
    /// Set estimator.
    Set(&'a mut CardinalityEstimator),
    /// Gauge cell.
    Gauge(&'a mut GaugeCell),
}

impl AggregatorMut<'_> {
    /// The family of the handle.
    pub fn kind(&self) -> MetricKind {
        match self {
            Self::Counter(_) => MetricKind::Counter,
            Self::Timer(_) => MetricKind::Timer,
            Self::Set(_) => MetricKind::Set,
            Self::Gauge(_) => MetricKind::Gauge,
        }
    }
}

/// Per-family maps from metric name to aggregator.
///
/// The registry borrows the [`PrefixResolver`] used to attach histogram
/// layouts to new timers; the resolver must outlive the registry.
#[derive(Debug)]
pub struct MetricRegistry<'r> {
    counters: HashMap<String, OnlineMoments>,
    timers: HashMap<String, QuantileEstimator>,
    sets: HashMap<String, CardinalityEstimator>,
    gauges: HashMap<String, GaugeCell>,
    settings: EngineSettings,
    resolver: &'r PrefixResolver,
}

impl<'r> MetricRegistry<'r> {
    /// Creates an empty registry.
    pub fn new(settings: EngineSettings, resolver: &'r PrefixResolver) -> Self {
        Self {
            counters: HashMap::new(),
            timers: HashMap::new(),
            sets: HashMap::new(),
            gauges: HashMap::new(),
            settings,
            resolver,
        }
    }

    /// Returns the counter for `name`, creating it on first use.
    ///
    /// # Errors
    ///
    /// Returns [`SampleError::TypeConflict`] if `name` belongs to another family.
    pub fn counter(&mut self, name: &str) -> Result<&mut OnlineMoments> {
        if !self.counters.contains_key(name) {
            self.check_conflict(name, MetricKind::Counter)?;
            tracing::debug!(name, kind = "counter", "created metric");
            self.counters.insert(name.to_owned(), OnlineMoments::new());
        }
        Ok(present(&mut self.counters, name))
    }

    /// Returns the timer for `name`, creating it on first use.
    ///
    /// A new timer gets histogram buckets when its name matches a prefix in
    /// the resolver. The match is made once, at creation.
    ///
    /// # Errors
    ///
    /// Returns [`SampleError::TypeConflict`] if `name` belongs to another family.
    pub fn timer(&mut self, name: &str) -> Result<&mut QuantileEstimator> {
        if !self.timers.contains_key(name) {
            self.check_conflict(name, MetricKind::Timer)?;
            let histogram = self.resolver.lookup(name).cloned();
            tracing::debug!(
                name,
                kind = "timer",
                histogram = histogram.as_ref().map(|config| config.prefix()),
                "created metric"
            );
            let timer = QuantileEstimator::new(Arc::clone(self.settings.targets()), histogram);
            self.timers.insert(name.to_owned(), timer);
        }
        Ok(present(&mut self.timers, name))
    }

    /// Returns the set for `name`, creating it on first use.
    ///
    /// # Errors
    ///
    /// Returns [`SampleError::TypeConflict`] if `name` belongs to another family.
    pub fn set(&mut self, name: &str) -> Result<&mut CardinalityEstimator> {
        if !self.sets.contains_key(name) {
            self.check_conflict(name, MetricKind::Set)?;
            let set =
                CardinalityEstimator::new(self.settings.set_precision(), self.settings.set_max_exact())?;
            tracing::debug!(name, kind = "set", "created metric");
            self.sets.insert(name.to_owned(), set);
        }
        Ok(present(&mut self.sets, name))
    }

    /// Returns the gauge for `name` and whether it was just created.
    ///
    /// A freshly created cell is zeroed; the caller applies the first write
    /// as absolute.
    ///
    /// # Errors
    ///
    /// Returns [`SampleError::TypeConflict`] if `name` belongs to another family.
    pub fn gauge(&mut self, name: &str) -> Result<(&mut GaugeCell, bool)> {
        let created = !self.gauges.contains_key(name);
        if created {
            self.check_conflict(name, MetricKind::Gauge)?;
            tracing::debug!(name, kind = "gauge", "created metric");
            self.gauges.insert(name.to_owned(), GaugeCell::default());
        }
        let cell = present(&mut self.gauges, name);
        Ok((cell, created))
    }

    /// Returns the aggregator for `name` in `kind`'s family, creating it on miss.
    ///
    /// # Errors
    ///
    /// Returns [`SampleError::TypeConflict`] if `name` belongs to another
    /// family, or [`SampleError::UnsupportedKind`] for [`MetricKind::KeyVal`],
    /// which has no registry entry.
    pub fn resolve_or_create(&mut self, name: &str, kind: MetricKind) -> Result<AggregatorMut<'_>> {
        Ok(match kind {
            MetricKind::Counter => AggregatorMut::Counter(self.counter(name)?),
            MetricKind::Timer => AggregatorMut::Timer(self.timer(name)?),
            MetricKind::Set => AggregatorMut::Set(self.set(name)?),
            MetricKind::Gauge => AggregatorMut::Gauge(self.gauge(name)?.0),
            MetricKind::KeyVal => return Err(SampleError::UnsupportedKind { kind }.into()),
        })
    }

    /// The family `name` is registered in, if any.
    pub fn kind_of(&self, name: &str) -> Option<MetricKind> {
        if self.counters.contains_key(name) {
            Some(MetricKind::Counter)
        } else if self.timers.contains_key(name) {
            Some(MetricKind::Timer)
        } else if self.sets.contains_key(name) {
            Some(MetricKind::Set)
        } else if self.gauges.contains_key(name) {
            Some(MetricKind::Gauge)
        } else {
            None
        }
    }

    fn check_conflict(&self, name: &str, requested: MetricKind) -> Result<()> {
        match self.kind_of(name) {
            Some(existing) if existing != requested => Err(SampleError::TypeConflict {
                name: name.to_owned(),
                existing,
                requested,
            }
            .into()),
            _ => Ok(()),
        }
    }

    /// Number of entries in one family; always zero for key-values.
    pub fn len(&self, kind: MetricKind) -> usize {
        match kind {
            MetricKind::Counter => self.counters.len(),
            MetricKind::Timer => self.timers.len(),
            MetricKind::Set => self.sets.len(),
            MetricKind::Gauge => self.gauges.len(),
            MetricKind::KeyVal => 0,
        }
    }

    /// Number of entries across all families.
    pub fn total_len(&self) -> usize {
        MetricKind::AGGREGATED.iter().map(|&kind| self.len(kind)).sum()
    }

    /// Returns `true` if no family holds an entry.
    pub fn is_empty(&self) -> bool {
        self.total_len() == 0
    }

    /// Removes every entry of one family.
    pub fn clear(&mut self, kind: MetricKind) {
        match kind {
            MetricKind::Counter => self.counters.clear(),
            MetricKind::Timer => self.timers.clear(),
            MetricKind::Set => self.sets.clear(),
            MetricKind::Gauge => self.gauges.clear(),
            MetricKind::KeyVal => {}
        }
    }

    /// Counters by name, in map order.
    pub fn counters(&self) -> impl Iterator<Item = (&str, &OnlineMoments)> {
        self.counters.iter().map(|(name, value)| (name.as_str(), value))
    }

    /// Timers by name, in map order.
    pub fn timers(&self) -> impl Iterator<Item = (&str, &QuantileEstimator)> {
        self.timers.iter().map(|(name, value)| (name.as_str(), value))
    }

    /// Sets by name, in map order.
    pub fn sets(&self) -> impl Iterator<Item = (&str, &CardinalityEstimator)> {
        self.sets.iter().map(|(name, value)| (name.as_str(), value))
    }

    /// Gauges by name, in map order.
    pub fn gauges(&self) -> impl Iterator<Item = (&str, &GaugeCell)> {
        self.gauges.iter().map(|(name, value)| (name.as_str(), value))
    }

    /// The settings new aggregators are built with.
    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// The borrowed histogram resolver.
    pub fn resolver(&self) -> &'r PrefixResolver {
        self.resolver
    }
}

/// Entry for `name`, which the caller has just found or inserted.
///
/// `HashMap::entry` would need an owned key on every hit.
fn present<'m, V>(map: &'m mut HashMap<String, V>, name: &str) -> &'m mut V {
    map.get_mut(name).expect("entry found or inserted by caller")
}
