//! Integer-millisecond durations.
//!
//! Budgets and retry intervals appear in config files and in requests that
//! cross process boundaries. `std::time::Duration` serializes as a
//! `{secs, nanos}` struct; [`DurationMs`] is a bare integer instead.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// A non-negative number of milliseconds.
///
/// ```
/// use stage0::DurationMs;
///
/// let budget: DurationMs = serde_json::from_str("1500").unwrap();
/// assert_eq!(budget, DurationMs::from_millis(1500));
/// assert_eq!(budget.to_string(), "1500ms");
/// ```
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct DurationMs(u64);

impl DurationMs {
    /// No time at all.
    pub const ZERO: Self = Self(0);

    /// From milliseconds.
    pub const fn from_millis(ms: u64) -> Self {
        Self(ms)
    }

    /// From whole seconds, saturating.
    pub const fn from_secs(secs: u64) -> Self {
        Self(secs.saturating_mul(1_000))
    }

    /// Milliseconds.
    pub const fn as_millis(&self) -> u64 {
        self.0
    }

    /// For `tokio::time`.
    pub const fn to_std(&self) -> Duration {
        Duration::from_millis(self.0)
    }

    /// Multiply by `factor`. Negative factors count as zero; overflow
    /// saturates at `u64::MAX` milliseconds.
    pub fn scale(&self, factor: f64) -> Self {
        let scaled = self.0 as f64 * factor.max(0.0);
        // `as` saturates float-to-int conversions.
        Self(scaled as u64)
    }
}

impl From<Duration> for DurationMs {
    fn from(d: Duration) -> Self {
        Self(u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
    }
}

impl From<DurationMs> for Duration {
    fn from(d: DurationMs) -> Self {
        d.to_std()
    }
}

impl fmt::Display for DurationMs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}ms", self.0)
    }
}
