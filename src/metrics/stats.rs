use hdrhistogram::Histogram;
use std::time::{Duration, Instant};

/// Round-trip latency and throughput for one run.
///
/// Owned by the collector, so no locking: workers report timings through the
/// completion channel.
pub struct LatencyStats {
    // Batch round-trip histogram (microsecond precision)
    latency_hist: Histogram<u64>,

    pub records: u64,
    pub batches: u64,

    start_time: Instant,
    last_snapshot: Instant,
    last_records: u64,
}

impl LatencyStats {
    pub fn new() -> Self {
        let now = Instant::now();
        Self {
            // 1us to 1h range, 3 significant digits
            latency_hist: Histogram::new_with_bounds(1, 3_600_000_000, 3)
                .expect("static histogram bounds"),
            records: 0,
            batches: 0,
            start_time: now,
            last_snapshot: now,
            last_records: 0,
        }
    }

    /// Record one completed record.
    pub fn record_query(&mut self) {
        self.records += 1;
    }

    /// Record one compound request's round trip.
    pub fn record_batch(&mut self, latency: Duration) {
        self.batches += 1;
        let us = (latency.as_micros() as u64).max(1);
        let _ = self.latency_hist.record(us.min(self.latency_hist.high()));
    }

    pub fn snapshot(&mut self) -> StatsSnapshot {
        let now = Instant::now();
        let interval_duration = now.duration_since(self.last_snapshot);
        let interval_records = self.records - self.last_records;
        self.last_snapshot = now;
        self.last_records = self.records;

        let hist = &self.latency_hist;
        let empty = hist.is_empty();
        StatsSnapshot {
            records: self.records,
            batches: self.batches,
            interval_records,
            total_duration: now.duration_since(self.start_time),
            interval_duration,
            latency_us_p50: if empty { 0 } else { hist.value_at_quantile(0.5) },
            latency_us_p95: if empty { 0 } else { hist.value_at_quantile(0.95) },
            latency_us_p99: if empty { 0 } else { hist.value_at_quantile(0.99) },
            latency_us_min: if empty { 0 } else { hist.min() },
            latency_us_max: if empty { 0 } else { hist.max() },
            latency_us_mean: if empty { 0.0 } else { hist.mean() },
        }
    }
}

impl Default for LatencyStats {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Default)]
pub struct StatsSnapshot {
    pub records: u64,
    pub batches: u64,
    pub interval_records: u64,
    pub total_duration: Duration,
    pub interval_duration: Duration,
    pub latency_us_p50: u64,
    pub latency_us_p95: u64,
    pub latency_us_p99: u64,
    pub latency_us_min: u64,
    pub latency_us_max: u64,
    pub latency_us_mean: f64,
}

impl StatsSnapshot {
    /// Queries per second since the previous snapshot
    pub fn interval_throughput(&self) -> f64 {
        let secs = self.interval_duration.as_secs_f64();
        if secs > 0.0 {
            self.interval_records as f64 / secs
        } else {
            0.0
        }
    }

    /// Queries per second since the run started
    pub fn total_throughput(&self) -> f64 {
        let secs = self.total_duration.as_secs_f64();
        if secs > 0.0 {
            self.records as f64 / secs
        } else {
            0.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_snapshot_is_zeroed() {
        let mut stats = LatencyStats::new();
        let snap = stats.snapshot();
        assert_eq!(snap.records, 0);
        assert_eq!(snap.latency_us_max, 0);
        assert_eq!(snap.interval_throughput(), 0.0);
    }

    #[test]
    fn tracks_batches_and_percentiles() {
        let mut stats = LatencyStats::new();
        for ms in 1..=100u64 {
            stats.record_batch(Duration::from_millis(ms));
            stats.record_query();
        }
        let snap = stats.snapshot();
        assert_eq!(snap.batches, 100);
        assert_eq!(snap.records, 100);
        assert!(snap.latency_us_p50 >= 49_000 && snap.latency_us_p50 <= 51_000);
        assert!(snap.latency_us_max >= 99_000);
        let again = stats.snapshot();
        assert_eq!(again.interval_records, 0);
    }
}
