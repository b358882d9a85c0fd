//! Extract mate pairs from a coordinate-sorted BAM as FASTQ.

use anyhow::{Context, Result};
use clap::Parser;
use fgmate_lib::bam_io::{open_bam, records_from_bam};
use fgmate_lib::fastq::PairFormatter;
use fgmate_lib::filter::{FilterExpression, FlagFilter, parse_flags};
use fgmate_lib::genome::GenomeInfo;
use fgmate_lib::locator::DuplicatePolicy;
use fgmate_lib::logging::{OperationTimer, log_scan_summary};
use fgmate_lib::metrics::{PairScanMetrics, write_metrics_auto, write_residuals};
use fgmate_lib::scanner::{GateOrder, PairScanner, ScanOptions};
use fgmate_lib::shard::ShardSpec;
use fgmate_lib::validation::validate_positive;
use log::info;

use crate::commands::command::Command;
use crate::commands::common::{BamInputOptions, FastqOutputOptions, RegionOptions, ReportOptions};

/// Extract read pairs from a coordinate-sorted BAM.
#[derive(Debug, Parser)]
#[command(
    name = "pairs",
    about = "\x1b[38;5;72m[EXTRACTION]\x1b[0m     \x1b[36mExtract mate pairs from a coordinate-sorted BAM as FASTQ\x1b[0m",
    long_about = r#"
Extract mate pairs from a coordinate-sorted BAM as paired FASTQ.

Mates of a coordinate-sorted BAM can be arbitrarily far apart. Each first-seen mate is held
in memory until its partner arrives, so memory grows with the number of outstanding mates,
not with the size of the file. Buffering is spread over `--workers` threads by read name.

Reads whose mate never appears are reported at the end (and written to `--residuals` when
given). Secondary and supplementary alignments are excluded by default.

With `--region`, `--regions-bed` or `--gene`, a pair is extracted when either mate overlaps
the regions; the other mate is always kept with it. With `--filter`, both mates must pass.

Large inputs can be split across processes with `--shard ID,COUNT`: every process reads
the whole BAM, and each writes the pairs whose read name hashes to its shard.

EXAMPLES:

  # Interleaved FASTQ to stdout, ready for an aligner
  fgmate pairs -i sorted.bam | bwa mem -p ref.fa -

  # Split, gzipped outputs for a gene with 500bp of padding
  fgmate pairs -i sorted.bam -o r1.fq.gz -2 r2.fq.gz -g BRCA1 --gene-table genes.bed --padding 500

  # Shard 2 of 4, high-quality proper pairs only
  fgmate pairs -i sorted.bam -o r1.fq.gz -2 r2.fq.gz -s 2,4 -e 'proper_pair && mapq >= 20'
"#
)]
pub struct Pairs {
    #[command(flatten)]
    pub io: BamInputOptions,

    #[command(flatten)]
    pub output: FastqOutputOptions,

    #[command(flatten)]
    pub regions: RegionOptions,

    #[command(flatten)]
    pub reports: ReportOptions,

    /// Keep only pairs where both mates match this expression, e.g. `mapq >= 20 && !duplicate`.
    #[arg(short = 'e', long = "filter")]
    pub filter: Option<String>,

    /// Exclude reads with any of these flags present [0x900 = secondary|supplementary].
    #[arg(short = 'F', long = "exclude-flags", default_value_t = FlagFilter::DEFAULT_EXCLUDE, value_parser = parse_flags)]
    pub exclude_flags: u16,

    /// Only include reads with all of these flags present.
    #[arg(short = 'f', long = "require-flags", default_value_t = 0, value_parser = parse_flags)]
    pub require_flags: u16,

    /// Number of pairing worker threads.
    #[arg(short = 'w', long = "workers", default_value = "4")]
    pub workers: usize,

    /// Horizontal shard to extract, as `ID,COUNT` or `ID/COUNT` with 1 <= ID <= COUNT.
    #[arg(short = 's', long = "shard", default_value = "1,1")]
    pub shard: ShardSpec,

    /// Log every step taken for the read with this name.
    #[arg(long = "debug-read")]
    pub debug_read: Option<String>,

    /// Append the original alignment positions to read names (`name|chr1:100|chr1:300`).
    #[arg(long = "annotate-positions", default_value = "false")]
    pub annotate_positions: bool,

    /// Don't append /1 and /2 to read names.
    #[arg(short = 'n', long = "no-read-suffix", default_value = "false")]
    pub no_suffix: bool,

    /// Also write reads that are not paired, as single records to the first output.
    #[arg(long = "include-unpaired", default_value = "false")]
    pub include_unpaired: bool,

    /// What to do when the same mate of a read appears twice.
    #[arg(long = "duplicate-policy", value_enum, default_value_t = DuplicatePolicy::KeepFirst)]
    pub duplicate_policy: DuplicatePolicy,

    /// Which gate decides the drop reason when a read fails both the region and the filter.
    #[arg(long = "gate-order", value_enum, default_value_t = GateOrder::RegionThenFilter)]
    pub gate_order: GateOrder,
}

impl Pairs {
    /// Checks every option before any input is read.
    fn validate(&self) -> Result<Option<FilterExpression>> {
        self.io.validate()?;
        self.output.validate()?;
        self.regions.validate()?;
        validate_positive(self.workers, "workers")?;
        self.filter
            .as_deref()
            .map(FilterExpression::parse)
            .transpose()
            .context("Failed to compile --filter")
    }

    fn scan_options(&self) -> ScanOptions {
        ScanOptions {
            workers: self.workers,
            shard: self.shard,
            flag_filter: FlagFilter::new(self.require_flags, self.exclude_flags),
            include_unpaired: self.include_unpaired,
            duplicate_policy: self.duplicate_policy,
            gate_order: self.gate_order,
            debug_read: self.debug_read.clone(),
            ..ScanOptions::default()
        }
    }
}

impl Command for Pairs {
    fn execute(&self, _command_line: &str) -> Result<()> {
        let filter = self.validate()?;

        let timer = OperationTimer::new("Extracting pairs");

        info!("Input: {}", self.io.input.display());
        match &self.output.output2 {
            Some(output2) => {
                info!("Output: {} and {}", self.output.output.display(), output2.display());
            }
            None => info!("Output (interleaved): {}", self.output.output.display()),
        }
        info!("Workers: {}", self.workers);
        info!("Shard: {}", self.shard);
        info!("Exclude flags: 0x{:X}", self.exclude_flags);
        info!("Require flags: 0x{:X}", self.require_flags);
        if let Some(filter) = &filter {
            info!("Filter: {filter}");
        }
        info!("Duplicate policy: {}", self.duplicate_policy);

        let (reader, header) = open_bam(&self.io.input, self.io.threads)?;
        let genome = GenomeInfo::sniff(&header);
        info!("Reference: {genome}");
        let regions = self.regions.build(genome.naming)?;

        let formatter = PairFormatter::new(self.output.layout())
            .with_no_suffix(self.no_suffix)
            .with_annotate_positions(self.annotate_positions);
        let mut scanner = PairScanner::new(self.scan_options(), formatter)?;
        if let Some(regions) = regions {
            scanner = scanner.with_regions(regions);
        }
        if let Some(filter) = filter {
            scanner = scanner.with_filter(filter);
        }

        let sink = self.output.open_sink()?;
        let source = self.io.input.display().to_string();
        let report = scanner.scan(records_from_bam(reader, header, &source), &sink)?;
        sink.finish().context("Failed to close FASTQ output")?;

        log_scan_summary(&report);
        if let Some(path) = &self.reports.metrics {
            write_metrics_auto(path, &[PairScanMetrics::from(&report)])?;
            info!("Wrote metrics to {}", path.display());
        }
        if let Some(path) = &self.reports.residuals {
            write_residuals(path, &report.residuals)?;
            info!("Wrote {} residual reads to {}", report.residuals.len(), path.display());
        }

        timer.log_completion(report.diagnostics.counts.records_read);
        Ok(())
    }
}
