//! Metrics and residual-read reports written as TSV.

use std::path::Path;

use anyhow::{Context, Result};
use fgoxide::io::DelimFile;
use serde::{Deserialize, Serialize};

use crate::diagnostics::ResidualRead;
use crate::scanner::ScanReport;

/// Number of decimal places used for fractional metrics.
pub const FLOAT_PRECISION: usize = 6;

/// Formats a fraction with [`FLOAT_PRECISION`] decimal places.
#[must_use]
pub fn format_float(value: f64) -> String {
    format!("{value:.FLOAT_PRECISION$}")
}

/// A metric row type that can be written to and read from TSV.
pub trait Metric: Serialize + for<'de> Deserialize<'de> + Clone + Default {
    /// Human-readable name used in error messages.
    fn metric_name() -> &'static str;
}

/// Summary of one pairing scan, one row per run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PairScanMetrics {
    /// Shard scanned, as `ID,COUNT`
    pub shard: String,
    /// Worker threads used
    pub workers: usize,
    /// Records read from the input
    pub records_read: u64,
    /// Records excluded by the flag filter
    pub flag_filtered: u64,
    /// Records outside the region of interest
    pub outside_region: u64,
    /// Records failing the filter expression
    pub filtered: u64,
    /// Unpaired records skipped
    pub unpaired_skipped: u64,
    /// Unpaired records written as single reads
    pub unpaired_emitted: u64,
    /// Mates seen more than once
    pub duplicates: u64,
    /// Pairs completed
    pub pairs_matched: u64,
    /// Pairs written by this shard
    pub pairs_emitted: u64,
    /// Pairs completed but owned by another shard
    pub pairs_other_shard: u64,
    /// Pairs dropped because a mate failed the filter
    pub pairs_filtered: u64,
    /// Records still waiting for a mate at the end
    pub residual_reads: u64,
    /// Fraction of records read that ended up in a completed pair
    pub frac_paired: String,
    /// True if the scan was cancelled before the end of input
    pub cancelled: bool,
}

impl Metric for PairScanMetrics {
    fn metric_name() -> &'static str {
        "pairing"
    }
}

impl From<&ScanReport> for PairScanMetrics {
    #[allow(clippy::cast_precision_loss)]
    fn from(report: &ScanReport) -> Self {
        let counts = &report.diagnostics.counts;
        let frac_paired = if counts.records_read == 0 {
            0.0
        } else {
            (2 * counts.pairs_matched) as f64 / counts.records_read as f64
        };
        Self {
            shard: report.shard.to_string(),
            workers: report.workers,
            records_read: counts.records_read,
            flag_filtered: counts.flag_filtered,
            outside_region: counts.outside_region,
            filtered: counts.filtered,
            unpaired_skipped: counts.unpaired_skipped,
            unpaired_emitted: counts.unpaired_emitted,
            duplicates: counts.duplicates,
            pairs_matched: counts.pairs_matched,
            pairs_emitted: counts.pairs_emitted,
            pairs_other_shard: counts.pairs_other_shard,
            pairs_filtered: counts.pairs_filtered,
            residual_reads: report.residuals.len() as u64,
            frac_paired: format_float(frac_paired),
            cancelled: report.cancelled,
        }
    }
}

/// Writes rows to a TSV file with a header line.
///
/// # Errors
///
/// Returns an error if the file cannot be created or written to.
pub fn write_metrics<P: AsRef<Path>, T: Serialize>(
    path: P,
    metrics: &[T],
    description: &str,
) -> Result<()> {
    let path = path.as_ref();
    DelimFile::default()
        .write_tsv(&path, metrics)
        .with_context(|| format!("Failed to write {description} metrics: {}", path.display()))
}

/// Writes a [`Metric`] type, naming it in errors by [`Metric::metric_name`].
///
/// # Errors
///
/// Returns an error if the file cannot be created or written to.
pub fn write_metrics_auto<P: AsRef<Path>, T: Metric>(path: P, metrics: &[T]) -> Result<()> {
    write_metrics(path, metrics, T::metric_name())
}

/// Writes residual reads, one row each, in the order given.
///
/// # Errors
///
/// Returns an error if the file cannot be created or written to.
pub fn write_residuals<P: AsRef<Path>>(path: P, residuals: &[ResidualRead]) -> Result<()> {
    write_metrics(path, residuals, "residual read")
}
