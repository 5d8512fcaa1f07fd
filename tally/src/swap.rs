//! Swap-and-hand-off of the active engine at flush boundaries.
//!
//! Ingestion threads write into the engine held by an [`ActiveEngine`]. At
//! each flush the scheduler calls [`ActiveEngine::swap`], which substitutes a
//! fresh engine under the lock and returns the detached one. The detached
//! engine is no longer reachable by writers, so the exporter iterates it
//! without any locking and then destroys it.
//!
//! # Example
//!
//! ```rust
//! use std::ops::ControlFlow;
//!
//! use tally::{ActiveEngine, EngineConfig, MetricKind};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = EngineConfig::default();
//! let resolver = config.build_resolver()?;
//! let active = ActiveEngine::new(&config, &resolver)?;
//!
//! std::thread::scope(|scope| {
//!     for worker in 0..4 {
//!         let active = &active;
//!         scope.spawn(move || {
//!             for i in 0..100 {
//!                 let name = format!("worker.{worker}");
//!                 active.add_sample(MetricKind::Counter, &name, f64::from(i), 1.0).ok();
//!             }
//!         });
//!     }
//! });
//!
//! let epoch = active.swap();
//! assert_eq!(epoch.metric_count(), 4);
//! let _ = epoch.iterate(|metric| {
//!     println!("{} {}", metric.kind(), metric.name);
//!     ControlFlow::Continue(())
//! });
//! epoch.destroy();
//! # Ok(())
//! # }
//! ```

use std::mem;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::config::EngineConfig;
use crate::engine::{AggregationEngine, EngineSettings};
use crate::error::Result;
use crate::gauge::GaugeWrite;
use crate::radix::PrefixResolver;
use crate::view::MetricKind;

/// The engine currently receiving samples, behind a single lock.
///
/// Only the pointer swap and each individual ingestion call hold the lock;
/// aggregation state inside an engine is never locked on its own.
#[derive(Debug)]
pub struct ActiveEngine<'r> {
    active: Mutex<AggregationEngine<'r>>,
    settings: EngineSettings,
    resolver: &'r PrefixResolver,
}

impl<'r> ActiveEngine<'r> {
    /// Creates the first active engine from a configuration.
    ///
    /// # Errors
    ///
    /// Returns [`crate::ConfigError`] if the configuration is invalid.
    pub fn new(config: &EngineConfig, resolver: &'r PrefixResolver) -> Result<Self> {
        Ok(Self::from_settings(config.settings()?, resolver))
    }

    /// Creates the first active engine from validated settings.
    pub fn from_settings(settings: EngineSettings, resolver: &'r PrefixResolver) -> Self {
        let engine = AggregationEngine::from_settings(settings.clone(), resolver);
        Self {
            active: Mutex::new(engine),
            settings,
            resolver,
        }
    }

    fn lock(&self) -> MutexGuard<'_, AggregationEngine<'r>> {
        // Aggregators are consistent between calls; a panicking caller cannot
        // leave one half-updated.
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Runs `f` against the active engine while holding the lock.
    pub fn with<T>(&self, f: impl FnOnce(&mut AggregationEngine<'r>) -> T) -> T {
        f(&mut self.lock())
    }

    /// Locked [`AggregationEngine::add_sample`].
    ///
    /// # Errors
    ///
    /// See [`AggregationEngine::add_sample`].
    pub fn add_sample(&self, kind: MetricKind, name: &str, value: f64, sample_rate: f64) -> Result<()> {
        self.lock().add_sample(kind, name, value, sample_rate)
    }

    /// Locked [`AggregationEngine::set_gauge`].
    ///
    /// # Errors
    ///
    /// See [`AggregationEngine::set_gauge_with`].
    pub fn set_gauge(&self, name: &str, value: f64, delta: bool, user: u64) -> Result<()> {
        self.lock().set_gauge(name, value, delta, user)
    }

    /// Locked [`AggregationEngine::set_gauge_with`].
    ///
    /// # Errors
    ///
    /// See [`AggregationEngine::set_gauge_with`].
    pub fn set_gauge_with(&self, name: &str, write: GaugeWrite) -> Result<()> {
        self.lock().set_gauge_with(name, write)
    }

    /// Locked [`AggregationEngine::set_update`].
    ///
    /// # Errors
    ///
    /// See [`AggregationEngine::set_update`].
    pub fn set_update(&self, name: &str, value: &str) -> Result<()> {
        self.lock().set_update(name, value)
    }

    /// Locked [`AggregationEngine::append_kv`].
    pub fn append_kv(&self, name: &str, value: f64) {
        self.lock().append_kv(name, value);
    }

    /// Replaces the active engine with an empty one and returns the old engine.
    ///
    /// The fresh engine is built before the lock is taken, so writers are
    /// blocked only for the pointer exchange.
    pub fn swap(&self) -> AggregationEngine<'r> {
        let fresh = AggregationEngine::from_settings(self.settings.clone(), self.resolver);
        let detached = mem::replace(&mut *self.lock(), fresh);
        tracing::debug!(metrics = detached.metric_count(), "swapped active engine");
        detached
    }

    /// The settings every swapped-in engine is built with.
    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }
}
