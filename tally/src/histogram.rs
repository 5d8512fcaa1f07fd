//! Histogram bucket configuration for timers.
//!
//! A [`HistogramConfig`] attaches a fixed bucket layout to every timer whose
//! name starts with its prefix. Bucket `0` holds values below the first
//! boundary, bucket `i` holds `[boundaries[i-1], boundaries[i])`, and the last
//! bucket holds everything at or above the final boundary, so a layout with
//! `k` boundaries has `k + 1` buckets.
//!
//! Layouts can be written either as explicit boundaries or as a linear
//! `min`/`max`/`width` range:
//!
//! ```json
//! { "prefix": "api.", "boundaries": [10, 50, 100, 500] }
//! { "prefix": "db.",  "min": 0, "max": 200, "width": 20 }
//! ```

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, Result};

/// Upper bound on the number of boundaries in one layout.
///
/// Every timer under the prefix carries one counter per bucket.
pub const MAX_BOUNDARIES: usize = 10_000;

/// How bucket boundaries are specified.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BucketLayout {
    /// Explicit, strictly increasing boundaries.
    Explicit {
        /// The bucket boundaries.
        boundaries: Vec<f64>,
    },

    /// Evenly spaced boundaries `min, min + width, ..., max`.
    Linear {
        /// First boundary.
        min: f64,
        /// Last boundary.
        max: f64,
        /// Distance between consecutive boundaries.
        width: f64,
    },
}

/// Histogram bucket configuration bound to a metric-name prefix.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawHistogramConfig", into = "RawHistogramConfig")]
pub struct HistogramConfig {
    prefix: String,
    /// Shared with every timer that resolves to this layout.
    boundaries: Arc<[f64]>,
}

/// Wire shape of [`HistogramConfig`] before boundary expansion.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct RawHistogramConfig {
    prefix: String,
    #[serde(flatten)]
    layout: BucketLayout,
}

impl HistogramConfig {
    /// Creates a configuration from explicit boundaries.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidHistogram`] if the boundaries are empty,
    /// non-finite, not strictly increasing, or too many.
    pub fn new(prefix: impl Into<String>, boundaries: Vec<f64>) -> Result<Self> {
        let prefix = prefix.into();
        validate_boundaries(&prefix, &boundaries)?;
        Ok(Self {
            prefix,
            boundaries: boundaries.into(),
        })
    }

    /// Creates a configuration with evenly spaced boundaries from `min` to `max`.
    ///
    /// The last boundary is always `max`, so a range that is not a whole
    /// multiple of `width` ends in a narrower bucket.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidHistogram`] if `width` is not positive,
    /// `max <= min`, or the range would need more than [`MAX_BOUNDARIES`].
    ///
    /// # Examples
    ///
    /// ```rust
    /// use tally::HistogramConfig;
    ///
    /// let config = HistogramConfig::linear("api.", 0.0, 100.0, 25.0)?;
    /// assert_eq!(config.boundaries(), &[0.0, 25.0, 50.0, 75.0, 100.0]);
    /// assert_eq!(config.bucket_count(), 6);
    /// # Ok::<(), tally::TallyError>(())
    /// ```
    pub fn linear(prefix: impl Into<String>, min: f64, max: f64, width: f64) -> Result<Self> {
        let prefix = prefix.into();
        let boundaries = linear_boundaries(&prefix, min, max, width)?;
        Self::new(prefix, boundaries)
    }

    /// Builds a configuration from a prefix and a layout.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidHistogram`] if the layout is invalid.
    pub fn from_layout(prefix: impl Into<String>, layout: BucketLayout) -> Result<Self> {
        match layout {
            BucketLayout::Explicit { boundaries } => Self::new(prefix, boundaries),
            BucketLayout::Linear { min, max, width } => Self::linear(prefix, min, max, width),
        }
    }

    /// The metric-name prefix this layout applies to.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// The sorted bucket boundaries.
    pub fn boundaries(&self) -> &[f64] {
        &self.boundaries
    }

    /// Number of buckets, including the underflow and overflow buckets.
    pub fn bucket_count(&self) -> usize {
        self.boundaries.len() + 1
    }

    /// Index of the bucket whose half-open interval contains `value`.
    #[inline]
    pub fn bucket_index(&self, value: f64) -> usize {
        self.boundaries.partition_point(|&b| b <= value)
    }
}

impl TryFrom<RawHistogramConfig> for HistogramConfig {
    type Error = crate::error::TallyError;

    fn try_from(raw: RawHistogramConfig) -> Result<Self> {
        Self::from_layout(raw.prefix, raw.layout)
    }
}

impl From<HistogramConfig> for RawHistogramConfig {
    fn from(config: HistogramConfig) -> Self {
        Self {
            prefix: config.prefix,
            layout: BucketLayout::Explicit {
                boundaries: config.boundaries.to_vec(),
            },
        }
    }
}

fn invalid(prefix: &str, reason: impl Into<String>) -> crate::error::TallyError {
    ConfigError::InvalidHistogram {
        prefix: prefix.to_string(),
        reason: reason.into(),
    }
    .into()
}

fn validate_boundaries(prefix: &str, boundaries: &[f64]) -> Result<()> {
    if boundaries.is_empty() {
        return Err(invalid(prefix, "at least one boundary is required"));
    }
    if boundaries.len() > MAX_BOUNDARIES {
        return Err(invalid(
            prefix,
            format!("{} boundaries exceeds the limit of {MAX_BOUNDARIES}", boundaries.len()),
        ));
    }
    if let Some(bad) = boundaries.iter().find(|b| !b.is_finite()) {
        return Err(invalid(prefix, format!("boundary {bad} is not finite")));
    }
    if boundaries.windows(2).any(|w| w[0] >= w[1]) {
        return Err(invalid(prefix, "boundaries must be strictly increasing"));
    }
    Ok(())
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
fn linear_boundaries(prefix: &str, min: f64, max: f64, width: f64) -> Result<Vec<f64>> {
    if !(min.is_finite() && max.is_finite() && width.is_finite()) {
        return Err(invalid(prefix, "min, max and width must be finite"));
    }
    if width <= 0.0 {
        return Err(invalid(prefix, format!("width {width} must be > 0")));
    }
    if max <= min {
        return Err(invalid(prefix, format!("max {max} must be > min {min}")));
    }

    let steps = ((max - min) / width).floor();
    if steps >= MAX_BOUNDARIES as f64 {
        return Err(invalid(
            prefix,
            format!("range needs {steps} buckets, limit is {MAX_BOUNDARIES}"),
        ));
    }

    // Multiply rather than accumulate so boundaries do not drift. `max` is
    // always the last boundary, so an off-grid range ends in a short bucket.
    let limit = max - width * 1e-9;
    let steps = steps as usize;
    let mut boundaries: Vec<f64> = (0..=steps)
        .map(|i| min + i as f64 * width)
        .take_while(|&b| b < limit)
        .collect();
    boundaries.push(max);
    Ok(boundaries)
}
