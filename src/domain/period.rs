//! Durations used by `at_most_every`.

use std::fmt;

/// Unit of a rate limit period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimeUnit {
    /// 1ns
    Nanoseconds,
    /// 1,000ns
    Microseconds,
    /// 1,000,000ns
    Milliseconds,
    /// 1s
    Seconds,
    /// 60s
    Minutes,
    /// 3,600s
    Hours,
    /// 86,400s
    Days,
}

impl TimeUnit {
    fn nanos_per_unit(self) -> u64 {
        match self {
            TimeUnit::Nanoseconds => 1,
            TimeUnit::Microseconds => 1_000,
            TimeUnit::Milliseconds => 1_000_000,
            TimeUnit::Seconds => 1_000_000_000,
            TimeUnit::Minutes => 60 * 1_000_000_000,
            TimeUnit::Hours => 60 * 60 * 1_000_000_000,
            TimeUnit::Days => 24 * 60 * 60 * 1_000_000_000,
        }
    }

    /// Convert `n` units to nanoseconds, saturating at `u64::MAX`.
    pub fn to_nanos(self, n: u64) -> u64 {
        n.saturating_mul(self.nanos_per_unit())
    }

    fn suffix(self) -> &'static str {
        match self {
            TimeUnit::Nanoseconds => "ns",
            TimeUnit::Microseconds => "us",
            TimeUnit::Milliseconds => "ms",
            TimeUnit::Seconds => "s",
            TimeUnit::Minutes => "min",
            TimeUnit::Hours => "h",
            TimeUnit::Days => "d",
        }
    }
}

/// A non-zero period configured with `at_most_every`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RateLimitPeriod {
    n: u64,
    unit: TimeUnit,
}

impl RateLimitPeriod {
    pub(crate) fn new(n: u64, unit: TimeUnit) -> Self {
        Self { n, unit }
    }

    /// Period length in nanoseconds.
    pub fn to_nanos(&self) -> u64 {
        self.unit.to_nanos(self.n)
    }

    /// Number of units.
    pub fn count(&self) -> u64 {
        self.n
    }

    /// The unit.
    pub fn unit(&self) -> TimeUnit {
        self.unit
    }
}

impl fmt::Display for RateLimitPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.n, self.unit.suffix())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_nanos() {
        assert_eq!(TimeUnit::Milliseconds.to_nanos(600), 600_000_000);
        assert_eq!(RateLimitPeriod::new(2, TimeUnit::Seconds).to_nanos(), 2_000_000_000);
        assert_eq!(TimeUnit::Days.to_nanos(u64::MAX), u64::MAX);

        let second = TimeUnit::Seconds.to_nanos(1);
        assert_eq!(TimeUnit::Nanoseconds.to_nanos(1), 1);
        assert_eq!(TimeUnit::Microseconds.to_nanos(1), 1_000);
        assert_eq!(TimeUnit::Minutes.to_nanos(1), 60 * second);
        assert_eq!(TimeUnit::Hours.to_nanos(1), 3_600 * second);
        assert_eq!(TimeUnit::Days.to_nanos(1), 86_400 * second);
    }

    #[test]
    fn test_display() {
        assert_eq!(RateLimitPeriod::new(30, TimeUnit::Seconds).to_string(), "30s");
        assert_eq!(RateLimitPeriod::new(5, TimeUnit::Minutes).to_string(), "5min");
    }
}
