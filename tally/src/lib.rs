//! # tally
//!
//! In-memory aggregation core for statsd-style metrics daemons.
//!
//! tally ingests individual samples (counters, timers, gauges, set members
//! and one-shot key-values) tagged by name, keeps one streaming aggregate per
//! name with bounded memory and bounded error, and exposes a single iteration
//! pass that hands the finished aggregates to an exporter.
//!
//! **Status**: This crate is in early development. The API is not yet stable.
//!
//! ## Key Properties
//!
//! - Timer quantiles with a guaranteed rank error of at most `eps * n`
//! - Exact set counts below a threshold, HyperLogLog estimates above it
//! - Per-prefix histogram buckets resolved by longest-prefix match
//! - Type conflicts between metric families rejected, never coerced
//! - Epoch-based swap-and-hand-off: exporters iterate without locking
//!
//! ## Quick Start
//!
//! ```rust
//! use std::ops::ControlFlow;
//!
//! use tally::{ActiveEngine, EngineConfig, HistogramConfig, MetricKind, MetricValue};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = EngineConfig {
//!     histograms: vec![HistogramConfig::new("api.", vec![10.0, 100.0])?],
//!     ..EngineConfig::default()
//! };
//! // The resolver must outlive every engine built against it.
//! let resolver = config.build_resolver()?;
//! let active = ActiveEngine::new(&config, &resolver)?;
//!
//! // Ingestion path
//! active.add_sample(MetricKind::Timer, "api.latency", 42.0, 1.0)?;
//! active.add_sample(MetricKind::Counter, "api.requests", 1.0, 0.1)?;
//! active.set_gauge("queue.depth", 12.0, false, 0)?;
//! active.set_update("api.users", "alice")?;
//!
//! // Flush: detach the epoch and export it
//! let epoch = active.swap();
//! let _ = epoch.iterate(|metric| {
//!     match metric.value {
//!         MetricValue::Timer(timer) => {
//!             for (phi, value) in timer.quantiles() {
//!                 println!("{}.p{} {value}", metric.name, phi * 100.0);
//!             }
//!         }
//!         MetricValue::Counter(moments) => println!("{} {}", metric.name, moments.sum()),
//!         _ => {}
//!     }
//!     ControlFlow::Continue(())
//! });
//! epoch.destroy();
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - [`AggregationEngine`]: One epoch of aggregates; ingestion and iteration
//! - [`ActiveEngine`]: Locked active engine with swap-and-hand-off
//! - [`MetricRegistry`]: Name-keyed aggregators with type-conflict detection
//! - [`PrefixResolver`]: Longest-prefix histogram lookup, borrowed by engines
//! - [`EngineConfig`]: Serializable configuration and validation
//!
//! ## Modules
//!
//! For lower-level access, the individual modules are also public:
//!
//! - [`engine`]: Engine façade and settings
//! - [`swap`]: Active engine and epoch swap
//! - [`registry`]: Per-family aggregator maps
//! - [`moments`]: Counter moments
//! - [`quantile`]: Bounded-error quantile summary
//! - [`timer`]: Timer aggregate with histogram buckets
//! - [`hll`]: HyperLogLog registers
//! - [`set`]: Exact-then-approximate set cardinality
//! - [`gauge`]: Gauge cells
//! - [`histogram`]: Histogram bucket layouts
//! - [`radix`]: Prefix radix tree
//! - [`view`]: Iteration views
//! - [`config`]: Configuration loading
//! - [`error`]: Error types

pub mod config;
pub mod engine;
pub mod error;
pub mod gauge;
pub mod histogram;
pub mod hll;
pub mod moments;
pub mod quantile;
pub mod radix;
pub mod registry;
pub mod set;
pub mod swap;
pub mod timer;
pub mod view;

// Re-export primary API types at crate root for convenience.
pub use config::EngineConfig;
pub use engine::{AggregationEngine, EngineSettings};
pub use error::{ConfigError, Result, SampleError, TallyError};
pub use gauge::{GaugeCell, GaugeWrite, StalePolicy};
pub use histogram::{BucketLayout, HistogramConfig};
pub use moments::OnlineMoments;
pub use quantile::QuantileTargets;
pub use radix::PrefixResolver;
pub use registry::{AggregatorMut, MetricRegistry};
pub use set::{CardinalityEstimator, SetMode};
pub use swap::ActiveEngine;
pub use timer::{Histogram, QuantileEstimator};
pub use view::{Metric, MetricKind, MetricValue};
