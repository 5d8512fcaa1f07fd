//! HyperLogLog registers for approximate set cardinality.
//!
//! Standard error is `1.04 / sqrt(m)` where `m = 2^precision`:
//!
//! | precision | registers | memory | std. error |
//! |-----------|-----------|--------|------------|
//! | 10        | 1024      | 1 KiB  | ~3.25%     |
//! | 12        | 4096      | 4 KiB  | ~1.63%     |
//! | 14        | 16384     | 16 KiB | ~0.81%     |
//!
//! Items are hashed to 64 bits with xxHash64. The top `precision` bits pick a
//! register; the register keeps the largest observed position of the first
//! set bit in the remaining bits. With 64-bit hashes no large-range correction
//! is needed; small cardinalities fall back to linear counting.

use std::hash::Hasher;

use twox_hash::XxHash64;

use crate::error::{ConfigError, Result};

/// Smallest supported precision.
pub const MIN_PRECISION: u8 = 4;

/// Largest supported precision.
pub const MAX_PRECISION: u8 = 18;

/// Hashes raw bytes to the 64-bit value used by both set modes.
#[inline]
pub fn hash_bytes(bytes: &[u8]) -> u64 {
    let mut hasher = XxHash64::with_seed(0);
    hasher.write(bytes);
    hasher.finish()
}

/// Dense HyperLogLog sketch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HyperLogLog {
    precision: u8,
    registers: Box<[u8]>,
}

impl HyperLogLog {
    /// Creates an empty sketch with `2^precision` registers.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidPrecision`] outside
    /// [`MIN_PRECISION`]`..=`[`MAX_PRECISION`].
    pub fn new(precision: u8) -> Result<Self> {
        validate_precision(precision)?;
        Ok(Self::with_checked_precision(precision))
    }

    /// Builds a sketch from a precision that already passed
    /// [`validate_precision`].
    pub(crate) fn with_checked_precision(precision: u8) -> Self {
        debug_assert!((MIN_PRECISION..=MAX_PRECISION).contains(&precision));
        Self {
            precision,
            registers: vec![0; 1 << precision].into_boxed_slice(),
        }
    }

    /// Folds a pre-computed 64-bit hash into the registers.
    #[inline]
    pub fn add_hash(&mut self, hash: u64) {
        let p = u32::from(self.precision);
        #[allow(clippy::cast_possible_truncation)] // at most 18 bits
        let index = (hash >> (64 - p)) as usize;
        // Guard bit keeps rho bounded at 64 - p + 1 when the tail is all zeros.
        let tail = (hash << p) | (1 << (p - 1));
        #[allow(clippy::cast_possible_truncation)] // leading_zeros <= 64
        let rho = tail.leading_zeros() as u8 + 1;
        let register = &mut self.registers[index];
        if rho > *register {
            *register = rho;
        }
    }

    /// Hashes and folds raw bytes.
    pub fn add_bytes(&mut self, bytes: &[u8]) {
        self.add_hash(hash_bytes(bytes));
    }

    /// Estimated number of distinct items folded.
    #[allow(
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss
    )]
    pub fn cardinality(&self) -> u64 {
        let m = self.registers.len() as f64;
        let alpha = match self.precision {
            4 => 0.673,
            5 => 0.697,
            6 => 0.709,
            _ => 0.7213 / (1.0 + 1.079 / m),
        };

        let mut sum = 0.0_f64;
        let mut zeros = 0_u32;
        for &register in &*self.registers {
            sum += 2.0_f64.powi(-i32::from(register));
            if register == 0 {
                zeros += 1;
            }
        }

        let raw = alpha * m * m / sum;
        let estimate = if raw <= 2.5 * m && zeros > 0 {
            m * (m / f64::from(zeros)).ln()
        } else {
            raw
        };
        estimate.round() as u64
    }

    /// Relative standard error of [`cardinality`](Self::cardinality).
    #[allow(clippy::cast_precision_loss)]
    pub fn standard_error(&self) -> f64 {
        1.04 / (self.registers.len() as f64).sqrt()
    }

    /// The configured precision.
    pub fn precision(&self) -> u8 {
        self.precision
    }

    /// Memory held by the registers, in bytes.
    pub fn memory_usage(&self) -> usize {
        self.registers.len()
    }
}

/// Checks that `precision` is in the supported range.
///
/// # Errors
///
/// Returns [`ConfigError::InvalidPrecision`] outside the supported range.
pub fn validate_precision(precision: u8) -> Result<()> {
    if !(MIN_PRECISION..=MAX_PRECISION).contains(&precision) {
        return Err(ConfigError::InvalidPrecision {
            precision,
            min: MIN_PRECISION,
            max: MAX_PRECISION,
        }
        .into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn relative_error(estimate: u64, actual: u64) -> f64 {
        (estimate as f64 - actual as f64).abs() / actual as f64
    }

    #[test]
    fn test_precision_bounds() {
        assert!(HyperLogLog::new(3).is_err());
        assert!(HyperLogLog::new(19).is_err());
        assert_eq!(HyperLogLog::new(4).unwrap().memory_usage(), 16);
        assert_eq!(HyperLogLog::new(12).unwrap().memory_usage(), 4096);
    }

    #[test]
    fn test_empty_is_zero() {
        assert_eq!(HyperLogLog::new(12).unwrap().cardinality(), 0);
    }

    #[test]
    fn test_duplicates_count_once() {
        let mut hll = HyperLogLog::new(14).unwrap();
        for _ in 0..1000 {
            hll.add_bytes(b"same-user");
        }
        assert_eq!(hll.cardinality(), 1);
    }

    #[test]
    fn test_estimate_within_bound() {
        for (precision, actual) in [(10, 5_000u64), (12, 20_000), (14, 100_000)] {
            let mut hll = HyperLogLog::new(precision).unwrap();
            for i in 0..actual {
                hll.add_bytes(format!("user-{i}").as_bytes());
            }
            let bound = 4.0 * hll.standard_error();
            let error = relative_error(hll.cardinality(), actual);
            assert!(error < bound, "p={precision}: error {error} >= {bound}");
        }
    }

    #[test]
    fn test_small_range_linear_counting() {
        let mut hll = HyperLogLog::new(12).unwrap();
        for i in 0..100u32 {
            hll.add_bytes(&i.to_le_bytes());
        }
        let error = relative_error(hll.cardinality(), 100);
        assert!(error < 0.05, "error {error}");
    }

    #[test]
    fn test_hash_is_stable() {
        assert_eq!(hash_bytes(b"abc"), hash_bytes(b"abc"));
        assert_ne!(hash_bytes(b"abc"), hash_bytes(b"abd"));
    }
}
