//! Periodic progress logging for long scans.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use log::info;

use crate::logging::{format_count, format_duration, format_rate};

/// Default number of records between progress lines.
pub const DEFAULT_PROGRESS_INTERVAL: u64 = 1_000_000;

/// Counts records and logs a line each time the count crosses a multiple of the interval.
///
/// The counter is atomic so a tracker can be shared between threads behind an `Arc`.
///
/// ```
/// use fgmate_lib::progress::ProgressTracker;
///
/// let tracker = ProgressTracker::new("Read").with_interval(100);
/// for _ in 0..250 {
///     tracker.record(1, || None); // logs at 100 and 200
/// }
/// tracker.finish(); // logs the final 250
/// assert_eq!(tracker.count(), 250);
/// ```
pub struct ProgressTracker {
    label: String,
    interval: u64,
    count: AtomicU64,
    started: Instant,
}

impl ProgressTracker {
    /// Creates a tracker whose lines start with `label`.
    #[must_use]
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            interval: DEFAULT_PROGRESS_INTERVAL,
            count: AtomicU64::new(0),
            started: Instant::now(),
        }
    }

    /// Sets the logging interval; zero is treated as one.
    #[must_use]
    pub fn with_interval(mut self, interval: u64) -> Self {
        self.interval = interval.max(1);
        self
    }

    /// Adds `n` records, logging once per interval boundary crossed.
    ///
    /// `locus` is only called when a line is logged; its result is appended so coordinate-sorted
    /// scans show how far along the genome they are. Returns true if a line was logged.
    pub fn record(&self, n: u64, locus: impl FnOnce() -> Option<String>) -> bool {
        if n == 0 {
            return false;
        }
        let before = self.count.fetch_add(n, Ordering::Relaxed);
        let after = before + n;
        let crossed = after / self.interval - before / self.interval;
        if crossed == 0 {
            return false;
        }
        let milestone = (after / self.interval) * self.interval;
        let elapsed = self.started.elapsed();
        match locus() {
            Some(locus) => info!(
                "{} {} records in {} ({}), last at {locus}",
                self.label,
                format_count(milestone),
                format_duration(elapsed),
                format_rate(milestone, elapsed)
            ),
            None => info!(
                "{} {} records in {} ({})",
                self.label,
                format_count(milestone),
                format_duration(elapsed),
                format_rate(milestone, elapsed)
            ),
        }
        true
    }

    /// Logs the final count unless the last call already landed exactly on it.
    pub fn finish(&self) {
        let count = self.count();
        if count > 0 && count % self.interval != 0 {
            info!("{} {} records (complete)", self.label, format_count(count));
        }
    }

    /// Records counted so far.
    #[must_use]
    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }
}
