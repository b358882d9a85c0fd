//! Formatting helpers and summaries for log output.
//!
//! Counts, rates and durations are rendered the same way everywhere so that a scan's progress
//! lines and its final summary read consistently.

use std::time::{Duration, Instant};

use crate::scanner::ScanReport;

/// Maximum number of residual reads listed by name in the scan summary.
const RESIDUAL_EXAMPLES: usize = 10;

/// Formats an integer with thousands separators.
///
/// ```
/// use fgmate_lib::logging::format_count;
///
/// assert_eq!(format_count(0), "0");
/// assert_eq!(format_count(1234567), "1,234,567");
/// ```
#[must_use]
pub fn format_count(count: u64) -> String {
    let digits = count.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

/// Formats a fraction (0.0-1.0) as a percentage with `decimals` places.
///
/// ```
/// use fgmate_lib::logging::format_percent;
///
/// assert_eq!(format_percent(0.9543, 2), "95.43%");
/// assert_eq!(format_percent(1.0, 0), "100%");
/// ```
#[must_use]
pub fn format_percent(value: f64, decimals: usize) -> String {
    format!("{:.decimals$}%", value * 100.0)
}

/// Formats a duration as `45s`, `2m 15s` or `1h 30m`.
#[must_use]
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    match secs {
        0..60 => format!("{secs}s"),
        60..3600 => match (secs / 60, secs % 60) {
            (mins, 0) => format!("{mins}m"),
            (mins, rest) => format!("{mins}m {rest}s"),
        },
        _ => match (secs / 3600, (secs % 3600) / 60) {
            (hours, 0) => format!("{hours}h"),
            (hours, mins) => format!("{hours}h {mins}m"),
        },
    }
}

/// Formats a throughput as records per second, or per minute when below one per second.
#[must_use]
#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn format_rate(count: u64, duration: Duration) -> String {
    let secs = duration.as_secs_f64();
    if secs < 0.001 {
        return format!("{} records/s", format_count(count));
    }
    let rate = count as f64 / secs;
    if rate >= 1.0 {
        format!("{} records/s", format_count(rate as u64))
    } else {
        format!("{:.1} records/min", rate * 60.0)
    }
}

/// Logs the start of an operation and, later, its completion with count and rate.
///
/// ```no_run
/// use fgmate_lib::logging::OperationTimer;
///
/// let timer = OperationTimer::new("Pairing reads");
/// timer.log_completion(10_000);
/// ```
pub struct OperationTimer {
    operation: String,
    started: Instant,
}

impl OperationTimer {
    /// Starts the timer and logs `"<operation> ..."`.
    #[must_use]
    pub fn new(operation: &str) -> Self {
        log::info!("{operation} ...");
        Self { operation: operation.to_string(), started: Instant::now() }
    }

    /// Time since the timer started.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Logs completion with the number of records processed.
    pub fn log_completion(&self, count: u64) {
        let elapsed = self.elapsed();
        log::info!(
            "{} completed: {} records in {} ({})",
            self.operation,
            format_count(count),
            format_duration(elapsed),
            format_rate(count, elapsed)
        );
    }
}

/// Logs the outcome of a scan: counters, duplicate examples and residual reads.
#[allow(clippy::cast_precision_loss)]
pub fn log_scan_summary(report: &ScanReport) {
    let counts = &report.diagnostics.counts;

    log::info!("Pairing Summary:");
    log::info!("  Records read: {}", format_count(counts.records_read));
    log::info!("  Excluded by flags: {}", format_count(counts.flag_filtered));
    if counts.outside_region > 0 {
        log::info!("  Outside region: {}", format_count(counts.outside_region));
    }
    if counts.filtered > 0 || counts.pairs_filtered > 0 {
        log::info!(
            "  Failed filter: {} records ({} pairs dropped)",
            format_count(counts.filtered),
            format_count(counts.pairs_filtered)
        );
    }
    if counts.unpaired_skipped > 0 || counts.unpaired_emitted > 0 {
        log::info!(
            "  Unpaired reads: {} skipped, {} emitted",
            format_count(counts.unpaired_skipped),
            format_count(counts.unpaired_emitted)
        );
    }
    log::info!("  Pairs matched: {}", format_count(counts.pairs_matched));
    log::info!("  Pairs emitted: {}", format_count(counts.pairs_emitted));
    if report.shard.is_sharded() {
        log::info!(
            "  Pairs left to other shards: {} (this is shard {})",
            format_count(counts.pairs_other_shard),
            report.shard
        );
    }
    if counts.records_read > 0 {
        let paired = (2 * counts.pairs_matched) as f64 / counts.records_read as f64;
        log::info!("  Records paired: {}", format_percent(paired, 2));
    }

    if counts.duplicates > 0 {
        log::warn!("Found {} duplicate mates, for example:", format_count(counts.duplicates));
        for dup in report.diagnostics.duplicate_examples.iter().take(RESIDUAL_EXAMPLES) {
            log::warn!("  {dup}");
        }
    }

    if report.residuals.is_empty() {
        log::info!("No unmatched mates remained at end of input.");
    } else {
        log::warn!(
            "{} reads had no mate by end of input, for example:",
            format_count(report.residuals.len() as u64)
        );
        for residual in report.residuals.iter().take(RESIDUAL_EXAMPLES) {
            log::warn!("  {residual}");
        }
    }

    if report.cancelled {
        log::warn!("Scan was cancelled before the end of input; outputs are incomplete.");
    }
}
