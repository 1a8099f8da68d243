use std::time::Duration;

const NANOS_PER_SEC: u128 = 1_000_000_000;

/// Constant-rate schedule: hit `i` is due `i / rate` seconds after the start.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pacer {
    rate: u64,
    duration: Duration,
}

impl Pacer {
    /// `rate` is hits per second; a zero `duration` means "until stopped".
    #[must_use]
    pub const fn new(rate: u64, duration: Duration) -> Self {
        Self { rate, duration }
    }

    #[must_use]
    pub const fn rate(&self) -> u64 {
        self.rate
    }

    /// Number of hits the schedule produces, or `None` when it is unbounded.
    #[must_use]
    pub fn total_hits(&self) -> Option<u64> {
        if self.rate == 0 {
            return Some(0);
        }
        if self.duration.is_zero() {
            return None;
        }
        let scaled = u128::from(self.rate).saturating_mul(self.duration.as_nanos());
        let hits = scaled.div_ceil(NANOS_PER_SEC);
        Some(u64::try_from(hits).unwrap_or(u64::MAX))
    }

    /// Offset of `hit` from the start of the attack.
    #[must_use]
    pub fn offset(&self, hit: u64) -> Duration {
        let nanos = u128::from(hit)
            .saturating_mul(NANOS_PER_SEC)
            .checked_div(u128::from(self.rate))
            .unwrap_or(0);
        Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX))
    }
}
