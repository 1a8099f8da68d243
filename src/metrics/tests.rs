use std::time::Duration;

use tokio::time::Instant;

use crate::error::{AppError, AppResult};
use crate::http::AttackResult;

use super::{LatencyHistogram, MetricsAccumulator};

fn result_at(
    base: Instant,
    offset_ms: u64,
    latency_ms: u64,
    status_code: u16,
) -> AppResult<AttackResult> {
    let started_at = base
        .checked_add(Duration::from_millis(offset_ms))
        .ok_or_else(|| AppError::cluster("Instant overflow"))?;
    Ok(AttackResult {
        started_at,
        latency: Duration::from_millis(latency_ms),
        bytes_in: 10,
        bytes_out: 4,
        status_code,
        error: if status_code == 0 {
            Some("connection refused".to_owned())
        } else {
            None
        },
    })
}

#[test]
fn histogram_reports_zero_when_empty() -> AppResult<()> {
    let mut histogram = LatencyHistogram::new()?;
    if histogram.quantile(0.99) != Duration::ZERO {
        return Err(AppError::cluster("Expected empty histogram to report zero"));
    }
    histogram.record(Duration::from_millis(5));
    if histogram.count() != 1 {
        return Err(AppError::cluster("Expected one recorded value"));
    }
    histogram.reset();
    if histogram.count() != 0 {
        return Err(AppError::cluster("Expected reset to clear the histogram"));
    }
    Ok(())
}

#[test]
fn close_derives_rate_wait_and_success() -> AppResult<()> {
    let base = Instant::now();
    let mut accumulator = MetricsAccumulator::new()?;
    accumulator.add(&result_at(base, 0, 100, 200)?);
    accumulator.add(&result_at(base, 500, 50, 302)?);
    accumulator.add(&result_at(base, 1000, 200, 500)?);
    accumulator.add(&result_at(base, 2000, 100, 0)?);

    let metrics = accumulator.close().clone();
    if metrics.requests != 4 {
        return Err(AppError::cluster(format!("Unexpected requests: {}", metrics.requests)));
    }
    if metrics.duration != Duration::from_secs(2) || metrics.wait != Duration::from_millis(100) {
        return Err(AppError::cluster(format!(
            "Unexpected duration/wait: {:?}/{:?}",
            metrics.duration, metrics.wait
        )));
    }
    if (metrics.rate - 2.0).abs() > 1e-9 {
        return Err(AppError::cluster(format!("Unexpected rate: {}", metrics.rate)));
    }
    if (metrics.success - 0.5).abs() > 1e-9 {
        return Err(AppError::cluster(format!("Unexpected success: {}", metrics.success)));
    }
    let expected_throughput = 2.0 / 2.1;
    if (metrics.throughput - expected_throughput).abs() > 1e-9 {
        return Err(AppError::cluster(format!(
            "Unexpected throughput: {}",
            metrics.throughput
        )));
    }
    if metrics.latencies.max != Duration::from_millis(200)
        || metrics.latencies.min != Duration::from_millis(50)
        || metrics.latencies.mean != Duration::from_micros(112_500)
    {
        return Err(AppError::cluster(format!(
            "Unexpected latencies: {:?}",
            metrics.latencies
        )));
    }
    if metrics.bytes_in.total != 40 || (metrics.bytes_out.mean - 4.0).abs() > 1e-9 {
        return Err(AppError::cluster("Unexpected byte metrics"));
    }
    if metrics.status_codes.get("0") != Some(&1) || metrics.status_codes.get("200") != Some(&1) {
        return Err(AppError::cluster(format!(
            "Unexpected status codes: {:?}",
            metrics.status_codes
        )));
    }
    if !metrics.errors.contains("connection refused") || metrics.errors.len() != 1 {
        return Err(AppError::cluster("Expected the transport error to be kept"));
    }
    Ok(())
}

#[test]
fn snapshot_only_changes_on_close() -> AppResult<()> {
    let base = Instant::now();
    let mut accumulator = MetricsAccumulator::new()?;
    accumulator.add(&result_at(base, 0, 10, 200)?);
    if accumulator.snapshot().requests != 0 {
        return Err(AppError::cluster("Expected snapshot to lag until close"));
    }
    accumulator.close();
    if accumulator.snapshot().requests != 1 {
        return Err(AppError::cluster("Expected snapshot after close"));
    }
    Ok(())
}

#[test]
fn single_result_has_zero_rate() -> AppResult<()> {
    let mut accumulator = MetricsAccumulator::new()?;
    accumulator.add(&result_at(Instant::now(), 0, 10, 200)?);
    let metrics = accumulator.close();
    if metrics.duration != Duration::ZERO {
        return Err(AppError::cluster("Expected zero duration"));
    }
    if metrics.rate > 0.0 {
        return Err(AppError::cluster(format!("Unexpected rate: {}", metrics.rate)));
    }
    if metrics.throughput <= 0.0 {
        return Err(AppError::cluster("Expected throughput over the wait window"));
    }
    Ok(())
}

#[test]
fn reset_clears_everything() -> AppResult<()> {
    let mut accumulator = MetricsAccumulator::new()?;
    accumulator.add(&result_at(Instant::now(), 0, 10, 0)?);
    accumulator.close();
    accumulator.reset();
    if accumulator.requests() != 0 || accumulator.snapshot().requests != 0 {
        return Err(AppError::cluster("Expected counters to reset"));
    }
    let metrics = accumulator.close();
    if !metrics.errors.is_empty() || !metrics.status_codes.is_empty() {
        return Err(AppError::cluster("Expected maps to reset"));
    }
    if metrics.success > 0.0 {
        return Err(AppError::cluster("Expected zero success"));
    }
    Ok(())
}
