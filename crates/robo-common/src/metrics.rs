//! Control loop timing statistics.
//!
//! Samples are microseconds derived from calibrated tick deltas. Recording
//! never allocates, so it is safe inside the control loop.

use std::time::Duration;

/// Ring buffer of loop iteration times with running min/max/mean.
#[derive(Debug)]
pub struct LoopMetrics {
    samples_us: Box<[u64]>,
    write_pos: usize,
    sample_count: usize,
    iterations: u64,
    min_us: u64,
    max_us: u64,
    sum_us: u64,
    overrun_count: u64,
    deadline_us: u64,
}

impl LoopMetrics {
    /// Create a collector keeping `histogram_size` samples; iterations longer
    /// than `deadline` count as overruns.
    #[must_use]
    pub fn new(histogram_size: usize, deadline: Duration) -> Self {
        let size = histogram_size.max(1);
        Self {
            samples_us: vec![0u64; size].into_boxed_slice(),
            write_pos: 0,
            sample_count: 0,
            iterations: 0,
            min_us: u64::MAX,
            max_us: 0,
            sum_us: 0,
            overrun_count: 0,
            deadline_us: u64::try_from(deadline.as_micros()).unwrap_or(u64::MAX),
        }
    }

    /// Record one iteration time in microseconds.
    pub fn record_us(&mut self, us: u64) {
        self.samples_us[self.write_pos] = us;
        self.write_pos = (self.write_pos + 1) % self.samples_us.len();
        self.sample_count = (self.sample_count + 1).min(self.samples_us.len());

        self.iterations += 1;
        self.min_us = self.min_us.min(us);
        self.max_us = self.max_us.max(us);
        self.sum_us = self.sum_us.wrapping_add(us);

        if us > self.deadline_us {
            self.overrun_count += 1;
        }
    }

    /// Total iterations recorded.
    #[must_use]
    pub fn iterations(&self) -> u64 {
        self.iterations
    }

    /// Iterations that exceeded the deadline.
    #[must_use]
    pub fn overrun_count(&self) -> u64 {
        self.overrun_count
    }

    /// Shortest iteration seen.
    #[must_use]
    pub fn min(&self) -> Option<Duration> {
        (self.iterations > 0).then(|| Duration::from_micros(self.min_us))
    }

    /// Longest iteration seen.
    #[must_use]
    pub fn max(&self) -> Option<Duration> {
        (self.iterations > 0).then(|| Duration::from_micros(self.max_us))
    }

    /// Mean iteration time.
    #[must_use]
    pub fn mean(&self) -> Option<Duration> {
        (self.iterations > 0).then(|| Duration::from_micros(self.sum_us / self.iterations))
    }

    /// Percentile (0.0 to 100.0) over the retained samples.
    ///
    /// Returns `None` with no samples or an out-of-range percentile. Sorts a
    /// copy of the buffer, so keep it out of the loop body.
    #[must_use]
    pub fn percentile(&self, percentile: f64) -> Option<Duration> {
        if self.sample_count == 0 || !(0.0..=100.0).contains(&percentile) {
            return None;
        }

        let mut sorted = self.samples_us[..self.sample_count].to_vec();
        sorted.sort_unstable();

        let idx = ((percentile / 100.0) * (sorted.len() - 1) as f64).round() as usize;
        Some(Duration::from_micros(sorted[idx.min(sorted.len() - 1)]))
    }

    /// Max minus min, if anything was recorded.
    #[must_use]
    pub fn jitter(&self) -> Option<Duration> {
        (self.iterations > 0).then(|| Duration::from_micros(self.max_us - self.min_us))
    }
}
