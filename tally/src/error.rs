//! Error types for the tally aggregation core.

use std::path::PathBuf;

use thiserror::Error;

use crate::view::MetricKind;

/// The main error type for all tally operations.
///
/// Construction-time problems surface as [`ConfigError`] before any sample is
/// accepted. Ingestion problems surface as [`SampleError`] and reject only the
/// offending call; the engine state is left unchanged.
#[derive(Error, Debug)]
pub enum TallyError {
    /// Invalid engine or histogram configuration.
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// A single ingestion call was rejected.
    #[error("sample error: {0}")]
    Sample(#[from] SampleError),
}

impl TallyError {
    /// Returns `true` if this error is a metric-family conflict.
    pub fn is_type_conflict(&self) -> bool {
        matches!(self, Self::Sample(SampleError::TypeConflict { .. }))
    }
}

/// Errors raised while validating or loading configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The timer error tolerance is outside `(0, 1)`.
    #[error("invalid timer eps {eps}: must be in (0, 1)")]
    InvalidEpsilon {
        /// The rejected tolerance.
        eps: f64,
    },

    /// A target quantile is outside `(0, 1)`.
    #[error("invalid quantile {quantile}: must be in (0, 1)")]
    InvalidQuantile {
        /// The rejected quantile.
        quantile: f64,
    },

    /// The quantile list is not strictly increasing.
    #[error("quantiles must be sorted in strictly increasing order")]
    QuantilesNotSorted,

    /// No target quantiles were configured.
    #[error("at least one quantile must be configured")]
    NoQuantiles,

    /// The set precision is outside the supported register range.
    #[error("invalid set precision {precision}: must be in {min}..={max}")]
    InvalidPrecision {
        /// The rejected precision.
        precision: u8,
        /// Smallest supported precision.
        min: u8,
        /// Largest supported precision.
        max: u8,
    },

    /// A histogram bucket layout is invalid.
    #[error("invalid histogram for prefix '{prefix}': {reason}")]
    InvalidHistogram {
        /// The prefix the histogram was configured for.
        prefix: String,
        /// Why the layout is invalid.
        reason: String,
    },

    /// Two histogram configurations share the same prefix.
    #[error("duplicate histogram prefix '{prefix}'")]
    DuplicatePrefix {
        /// The repeated prefix.
        prefix: String,
    },

    /// The configuration file could not be read.
    #[error("failed to read config '{}': {source}", path.display())]
    Read {
        /// The config file path.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The configuration file is not valid JSON for [`crate::EngineConfig`].
    #[error("failed to parse config '{}': {source}", path.display())]
    Parse {
        /// The config file path.
        path: PathBuf,
        /// The underlying JSON error.
        #[source]
        source: serde_json::Error,
    },
}

/// Errors that reject a single ingestion call.
#[derive(Error, Debug)]
pub enum SampleError {
    /// The metric name is empty.
    #[error("metric name must not be empty")]
    EmptyName,

    /// The sample rate is not a positive finite number.
    #[error("invalid sample rate {rate}: must be > 0")]
    InvalidSampleRate {
        /// The rejected rate.
        rate: f64,
    },

    /// The sample value cannot be aggregated.
    #[error("invalid value {value} ({reason})")]
    InvalidValue {
        /// The rejected value.
        value: f64,
        /// Why the value was rejected.
        reason: &'static str,
    },

    /// The metric kind cannot be ingested through this entry point.
    #[error("{kind} metrics cannot be sampled through add_sample")]
    UnsupportedKind {
        /// The requested kind.
        kind: MetricKind,
    },

    /// The name is already bound to a different metric family.
    #[error("metric '{name}' is a {existing}, cannot record it as a {requested}")]
    TypeConflict {
        /// The conflicting metric name.
        name: String,
        /// The family the name is already bound to.
        existing: MetricKind,
        /// The family the caller asked for.
        requested: MetricKind,
    },

    /// A gauge write carried a timestamp older than the cell's current one.
    #[error("stale gauge write for '{name}': timestamp {timestamp_ms} < current {current_ms}")]
    StaleGauge {
        /// The gauge name.
        name: String,
        /// Timestamp carried by the rejected write.
        timestamp_ms: u64,
        /// Timestamp of the last accepted write.
        current_ms: u64,
    },
}

/// Type alias for `Result<T, TallyError>`.
pub type Result<T> = std::result::Result<T, TallyError>;
