use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use tokio::time::Instant;

use crate::distributed::protocol::{ByteMetrics, LatencyMetrics, WorkerLoadTestMetrics};
use crate::error::AppResult;
use crate::http::AttackResult;

use super::LatencyHistogram;

const NANOS_PER_SEC: f64 = 1_000_000_000.0;

/// Folds attack results into the figures reported by a worker.
///
/// `add` is cheap and runs once per result; `close` derives the ratios and
/// percentiles and refreshes the cached snapshot.
#[derive(Debug)]
pub struct MetricsAccumulator {
    histogram: LatencyHistogram,
    requests: u64,
    successes: u64,
    latency_total: Duration,
    latency_min: Option<Duration>,
    latency_max: Duration,
    bytes_in: u64,
    bytes_out: u64,
    earliest: Option<Instant>,
    latest: Option<Instant>,
    end: Option<Instant>,
    status_codes: BTreeMap<String, u64>,
    errors: BTreeSet<String>,
    snapshot: WorkerLoadTestMetrics,
}

impl MetricsAccumulator {
    /// Create an empty accumulator.
    ///
    /// # Errors
    ///
    /// Returns an error if the latency histogram cannot be created.
    pub fn new() -> AppResult<Self> {
        Ok(Self {
            histogram: LatencyHistogram::new()?,
            requests: 0,
            successes: 0,
            latency_total: Duration::ZERO,
            latency_min: None,
            latency_max: Duration::ZERO,
            bytes_in: 0,
            bytes_out: 0,
            earliest: None,
            latest: None,
            end: None,
            status_codes: BTreeMap::new(),
            errors: BTreeSet::new(),
            snapshot: WorkerLoadTestMetrics::default(),
        })
    }

    pub fn add(&mut self, result: &AttackResult) {
        self.requests = self.requests.saturating_add(1);
        if result.is_success() {
            self.successes = self.successes.saturating_add(1);
        }

        self.latency_total = self.latency_total.saturating_add(result.latency);
        self.latency_max = self.latency_max.max(result.latency);
        self.latency_min = Some(
            self.latency_min
                .map_or(result.latency, |min| min.min(result.latency)),
        );
        self.histogram.record(result.latency);

        self.bytes_in = self.bytes_in.saturating_add(result.bytes_in);
        self.bytes_out = self.bytes_out.saturating_add(result.bytes_out);

        self.earliest = Some(
            self.earliest
                .map_or(result.started_at, |earliest| earliest.min(result.started_at)),
        );
        self.latest = Some(
            self.latest
                .map_or(result.started_at, |latest| latest.max(result.started_at)),
        );
        let finished_at = result.finished_at();
        self.end = Some(self.end.map_or(finished_at, |end| end.max(finished_at)));

        let count = self
            .status_codes
            .entry(result.status_code.to_string())
            .or_insert(0);
        *count = count.saturating_add(1);

        if let Some(error) = result.error.as_ref() {
            self.errors.insert(error.clone());
        }
    }

    /// Recompute derived figures and return the refreshed snapshot.
    pub fn close(&mut self) -> &WorkerLoadTestMetrics {
        let duration = match (self.earliest, self.latest) {
            (Some(earliest), Some(latest)) => latest.saturating_duration_since(earliest),
            _ => Duration::ZERO,
        };
        let wait = match (self.latest, self.end) {
            (Some(latest), Some(end)) => end.saturating_duration_since(latest),
            _ => Duration::ZERO,
        };

        let requests = self.requests as f64;
        let rate = per_second(requests, duration);
        let throughput = per_second(self.successes as f64, duration.saturating_add(wait));
        let success = if self.requests == 0 {
            0.0
        } else {
            self.successes as f64 / requests
        };

        let mean = mean_duration(self.latency_total, self.requests);
        let latencies = LatencyMetrics {
            total: self.latency_total,
            mean,
            p50: self.histogram.quantile(0.50),
            p90: self.histogram.quantile(0.90),
            p95: self.histogram.quantile(0.95),
            p99: self.histogram.quantile(0.99),
            max: self.latency_max,
            min: self.latency_min.unwrap_or(Duration::ZERO),
        };

        self.snapshot = WorkerLoadTestMetrics {
            duration,
            wait,
            requests: self.requests,
            rate,
            throughput,
            success,
            latencies,
            bytes_in: byte_metrics(self.bytes_in, self.requests),
            bytes_out: byte_metrics(self.bytes_out, self.requests),
            status_codes: self.status_codes.clone(),
            errors: self.errors.clone(),
        };
        &self.snapshot
    }

    /// The snapshot computed by the last `close`.
    #[must_use]
    pub const fn snapshot(&self) -> &WorkerLoadTestMetrics {
        &self.snapshot
    }

    #[must_use]
    pub const fn requests(&self) -> u64 {
        self.requests
    }

    /// Drop everything recorded so far.
    pub fn reset(&mut self) {
        self.histogram.reset();
        self.requests = 0;
        self.successes = 0;
        self.latency_total = Duration::ZERO;
        self.latency_min = None;
        self.latency_max = Duration::ZERO;
        self.bytes_in = 0;
        self.bytes_out = 0;
        self.earliest = None;
        self.latest = None;
        self.end = None;
        self.status_codes.clear();
        self.errors.clear();
        self.snapshot = WorkerLoadTestMetrics::default();
    }
}

fn per_second(count: f64, window: Duration) -> f64 {
    let nanos = window.as_nanos() as f64;
    if nanos <= 0.0 {
        return 0.0;
    }
    count / (nanos / NANOS_PER_SEC)
}

fn mean_duration(total: Duration, count: u64) -> Duration {
    if count == 0 {
        return Duration::ZERO;
    }
    let nanos = total.as_nanos().checked_div(u128::from(count)).unwrap_or(0);
    Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX))
}

fn byte_metrics(total: u64, requests: u64) -> ByteMetrics {
    let mean = if requests == 0 {
        0.0
    } else {
        total as f64 / requests as f64
    };
    ByteMetrics { total, mean }
}
