//! Last-value gauge cells with absolute and delta writes.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// What to do with a gauge write whose timestamp is older than the cell's.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StalePolicy {
    /// Apply writes in call order; the timestamp is metadata only.
    #[default]
    Apply,
    /// Reject writes carrying a timestamp older than the last accepted one.
    RejectStale,
}

/// One gauge write with its metadata.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GaugeWrite {
    /// The new value, or the delta to add when `delta` is set.
    pub value: f64,
    /// Treat `value` as a delta against the current value.
    pub delta: bool,
    /// Opaque caller metadata.
    pub user: u64,
    /// Opaque caller flags.
    pub user_flags: u64,
    /// Wall-clock time of the write, in milliseconds since the Unix epoch.
    pub timestamp_ms: u64,
}

impl GaugeWrite {
    /// An absolute write stamped with the current wall clock.
    pub fn absolute(value: f64) -> Self {
        Self {
            value,
            delta: false,
            user: 0,
            user_flags: 0,
            timestamp_ms: now_ms(),
        }
    }

    /// A delta write stamped with the current wall clock.
    pub fn delta(delta: f64) -> Self {
        Self {
            delta: true,
            ..Self::absolute(delta)
        }
    }

    /// Sets the user metadata.
    pub fn with_user(mut self, user: u64, user_flags: u64) -> Self {
        self.user = user;
        self.user_flags = user_flags;
        self
    }

    /// Overrides the timestamp.
    pub fn at(mut self, timestamp_ms: u64) -> Self {
        self.timestamp_ms = timestamp_ms;
        self
    }
}

/// Current wall-clock time in milliseconds since the Unix epoch.
#[allow(clippy::cast_possible_truncation)] // u64 millis cover ~584 million years
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or(0)
}

/// Last-value cell with the value it replaced.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct GaugeCell {
    value: f64,
    prev_value: f64,
    user: u64,
    user_flags: u64,
    timestamp_ms: u64,
}

impl GaugeCell {
    /// Creates a cell from its first write.
    ///
    /// The first write is always absolute: there is no prior value to apply
    /// a delta against, so a delta of `d` sets the value to `d`.
    pub fn first(write: GaugeWrite) -> Self {
        let mut cell = Self::default();
        cell.set_absolute(write.value, write.user, write.user_flags, write.timestamp_ms);
        cell
    }

    /// Replaces the value.
    pub fn set_absolute(&mut self, value: f64, user: u64, user_flags: u64, timestamp_ms: u64) {
        self.prev_value = self.value;
        self.value = value;
        self.stamp(user, user_flags, timestamp_ms);
    }

    /// Adds `delta` to the value.
    pub fn set_delta(&mut self, delta: f64, user: u64, user_flags: u64, timestamp_ms: u64) {
        self.prev_value = self.value;
        self.value += delta;
        self.stamp(user, user_flags, timestamp_ms);
    }

    /// Applies a write to an existing cell.
    pub fn apply(&mut self, write: GaugeWrite) {
        if write.delta {
            self.set_delta(write.value, write.user, write.user_flags, write.timestamp_ms);
        } else {
            self.set_absolute(write.value, write.user, write.user_flags, write.timestamp_ms);
        }
    }

    /// Returns `true` if `write` is older than the last accepted write.
    pub fn is_stale(&self, write: &GaugeWrite) -> bool {
        write.timestamp_ms < self.timestamp_ms
    }

    fn stamp(&mut self, user: u64, user_flags: u64, timestamp_ms: u64) {
        self.user = user;
        self.user_flags = user_flags;
        self.timestamp_ms = timestamp_ms;
    }

    /// The current value.
    pub fn value(&self) -> f64 {
        self.value
    }

    /// The value before the last write.
    pub fn prev_value(&self) -> f64 {
        self.prev_value
    }

    /// User metadata of the last write.
    pub fn user(&self) -> u64 {
        self.user
    }

    /// User flags of the last write.
    pub fn user_flags(&self) -> u64 {
        self.user_flags
    }

    /// Timestamp of the last write, in milliseconds.
    pub fn timestamp_ms(&self) -> u64 {
        self.timestamp_ms
    }
}
