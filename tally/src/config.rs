//! Engine configuration: quantile targets, set sizing, gauge policy and
//! histogram prefixes.
//!
//! An [`EngineConfig`] is plain data that deserializes from JSON. Every field
//! has a default, so an empty object is a valid configuration:
//!
//! ```json
//! {
//!   "timer_eps": 0.01,
//!   "quantiles": [0.5, 0.95, 0.99],
//!   "set_precision": 12,
//!   "set_max_exact": 64,
//!   "gauge_timestamps": "apply",
//!   "histograms": [
//!     { "prefix": "api.", "boundaries": [5, 10, 50, 100, 500] },
//!     { "prefix": "db.", "min": 0, "max": 200, "width": 20 }
//!   ]
//! }
//! ```
//!
//! Validation happens once, when the configuration is turned into
//! [`EngineSettings`] and a [`PrefixResolver`]. Engines never re-validate.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::engine::{DEFAULT_SET_MAX_EXACT, DEFAULT_SET_PRECISION, EngineSettings};
use crate::error::{ConfigError, Result};
use crate::gauge::StalePolicy;
use crate::histogram::HistogramConfig;
use crate::quantile::{DEFAULT_EPS, DEFAULT_QUANTILES, QuantileTargets};
use crate::radix::PrefixResolver;

/// Construction-time configuration for aggregation engines.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Timer rank error tolerance, in `(0, 1)`.
    pub timer_eps: f64,

    /// Target quantiles reported for every timer, strictly increasing in `(0, 1)`.
    pub quantiles: Vec<f64>,

    /// HyperLogLog precision for sets.
    pub set_precision: u8,

    /// Distinct items a set counts exactly before switching to HyperLogLog.
    pub set_max_exact: u64,

    /// Handling of gauge writes older than the last accepted write.
    pub gauge_timestamps: StalePolicy,

    /// Histogram layouts keyed by metric-name prefix.
    pub histograms: Vec<HistogramConfig>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            timer_eps: DEFAULT_EPS,
            quantiles: DEFAULT_QUANTILES.to_vec(),
            set_precision: DEFAULT_SET_PRECISION,
            set_max_exact: DEFAULT_SET_MAX_EXACT,
            gauge_timestamps: StalePolicy::default(),
            histograms: Vec::new(),
        }
    }
}

impl EngineConfig {
    /// Reads and validates a JSON configuration file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Read`] if the file cannot be read,
    /// [`ConfigError::Parse`] if it is not a valid configuration, or any
    /// validation error from [`validate`](Self::validate).
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;

        tracing::info!(
            path = %path.display(),
            quantiles = config.quantiles.len(),
            histograms = config.histograms.len(),
            "loaded engine config"
        );
        Ok(config)
    }

    /// Checks every field.
    ///
    /// # Errors
    ///
    /// Returns the first [`ConfigError`] found.
    pub fn validate(&self) -> Result<()> {
        self.settings()?;
        self.build_resolver()?;
        Ok(())
    }

    /// Builds the settings engines are constructed with.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] for an invalid tolerance, quantile list or
    /// set precision.
    pub fn settings(&self) -> Result<EngineSettings> {
        let targets = QuantileTargets::new(self.timer_eps, &self.quantiles)?;
        EngineSettings::new(
            targets,
            self.set_precision,
            self.set_max_exact,
            self.gauge_timestamps,
        )
    }

    /// Builds the histogram resolver engines borrow.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::DuplicatePrefix`] if two histograms share a prefix.
    pub fn build_resolver(&self) -> Result<PrefixResolver> {
        let mut resolver = PrefixResolver::new();
        for histogram in &self.histograms {
            if resolver.insert(histogram.clone()).is_some() {
                return Err(ConfigError::DuplicatePrefix {
                    prefix: histogram.prefix().to_owned(),
                }
                .into());
            }
        }
        Ok(resolver)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;
    use crate::TallyError;

    #[test]
    fn test_default_is_valid() {
        let config = EngineConfig::default();
        config.validate().unwrap();
        assert_eq!(config.settings().unwrap(), EngineSettings::default());
    }

    #[test]
    fn test_empty_object_uses_defaults() {
        let config: EngineConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, EngineConfig::default());
    }

    #[test]
    fn test_invalid_fields() {
        let config = EngineConfig {
            timer_eps: 1.5,
            ..EngineConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(TallyError::Config(ConfigError::InvalidEpsilon { .. }))
        ));

        let config = EngineConfig {
            quantiles: vec![0.99, 0.5],
            ..EngineConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(TallyError::Config(ConfigError::QuantilesNotSorted))
        ));

        let config = EngineConfig {
            set_precision: 2,
            ..EngineConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(TallyError::Config(ConfigError::InvalidPrecision { precision: 2, .. }))
        ));
    }

    #[test]
    fn test_duplicate_prefix() {
        let config = EngineConfig {
            histograms: vec![
                HistogramConfig::new("api.", vec![1.0]).unwrap(),
                HistogramConfig::new("api.", vec![2.0]).unwrap(),
            ],
            ..EngineConfig::default()
        };
        assert!(matches!(
            config.build_resolver(),
            Err(TallyError::Config(ConfigError::DuplicatePrefix { .. }))
        ));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{
                "timer_eps": 0.005,
                "quantiles": [0.5, 0.9],
                "gauge_timestamps": "reject_stale",
                "histograms": [{{"prefix": "db.", "min": 0, "max": 100, "width": 50}}]
            }}"#
        )
        .unwrap();

        let config = EngineConfig::load(file.path()).unwrap();
        assert_eq!(config.timer_eps, 0.005);
        assert_eq!(config.set_precision, DEFAULT_SET_PRECISION);
        assert_eq!(config.gauge_timestamps, StalePolicy::RejectStale);

        let resolver = config.build_resolver().unwrap();
        let histogram = resolver.lookup("db.query").unwrap();
        assert_eq!(histogram.boundaries(), &[0.0, 50.0, 100.0]);
    }

    #[test]
    fn test_load_errors() {
        let missing = EngineConfig::load("/nonexistent/tally.json").unwrap_err();
        assert!(matches!(missing, TallyError::Config(ConfigError::Read { .. })));

        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"unknown_field": 1}}"#).unwrap();
        let bad = EngineConfig::load(file.path()).unwrap_err();
        assert!(matches!(bad, TallyError::Config(ConfigError::Parse { .. })));
    }
}
