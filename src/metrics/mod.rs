//! Per-worker metrics accumulation and histogram utilities.
mod accumulator;
mod histogram;

#[cfg(test)]
mod tests;

pub use accumulator::MetricsAccumulator;
pub use histogram::LatencyHistogram;
