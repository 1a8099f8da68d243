use std::time::Duration;

use hdrhistogram::Histogram;

use crate::error::{AppError, AppResult, AttackError};

/// Latency distribution recorded in microseconds.
#[derive(Debug)]
pub struct LatencyHistogram {
    hist: Histogram<u64>,
}

impl LatencyHistogram {
    /// Create a new latency histogram.
    ///
    /// # Errors
    ///
    /// Returns an error if the histogram cannot be created.
    pub fn new() -> AppResult<Self> {
        let hist = Histogram::<u64>::new(3).map_err(|err| {
            AppError::attack(AttackError::Histogram {
                context: "create",
                message: err.to_string(),
            })
        })?;
        Ok(Self { hist })
    }

    /// Record a latency. Values beyond the trackable range are clamped.
    pub fn record(&mut self, latency: Duration) {
        let micros = u64::try_from(latency.as_micros()).unwrap_or(u64::MAX);
        self.hist.saturating_record(micros.max(1));
    }

    #[must_use]
    pub fn quantile(&self, quantile: f64) -> Duration {
        if self.count() == 0 {
            return Duration::ZERO;
        }
        Duration::from_micros(self.hist.value_at_quantile(quantile))
    }

    #[must_use]
    pub fn count(&self) -> u64 {
        self.hist.len()
    }

    pub fn reset(&mut self) {
        self.hist.reset();
    }
}
