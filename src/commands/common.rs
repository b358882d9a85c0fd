//! Common CLI options shared across commands.
//!
//! This module provides shared argument structures that can be composed into
//! command structs using `#[command(flatten)]`.

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::Args;
use log::info;

use fgmate_lib::fastq::OutputLayout;
use fgmate_lib::genome::ContigNaming;
use fgmate_lib::logging::format_count;
use fgmate_lib::regions::{GeneTable, RegionSet};
use fgmate_lib::sink::{FastqSink, SinkWriter};
use fgmate_lib::validation::{
    validate_compression_level, validate_distinct_outputs, validate_file_exists,
    validate_positive,
};

/// Input BAM and decompression options.
#[derive(Debug, Clone, Args)]
pub struct BamInputOptions {
    /// Input BAM file, coordinate sorted (`-` for stdin)
    #[arg(short = 'i', long = "input")]
    pub input: PathBuf,

    /// Number of threads for BAM decompression
    #[arg(short = '@', short_alias = 't', long = "threads", default_value = "1")]
    pub threads: usize,
}

impl BamInputOptions {
    /// Validates that the input file exists (skipped for stdin paths) and threads is positive.
    ///
    /// # Errors
    ///
    /// Returns an error if the input file does not exist.
    pub fn validate(&self) -> Result<()> {
        validate_file_exists(&self.input, "Input BAM")?;
        validate_positive(self.threads, "threads")?;
        Ok(())
    }
}

/// FASTQ destinations.
#[derive(Debug, Clone, Args)]
pub struct FastqOutputOptions {
    /// Output FASTQ for first mates, or for both mates interleaved when `--output2` is not
    /// given (`-` for stdout, `.gz` to compress)
    #[arg(short = 'o', long = "output", default_value = "-")]
    pub output: PathBuf,

    /// Output FASTQ for second mates; enables split output
    #[arg(short = '2', long = "output2")]
    pub output2: Option<PathBuf>,

    /// Gzip compression level for `.gz` outputs
    #[arg(long = "compression-level", default_value = "6")]
    pub compression_level: u32,
}

impl FastqOutputOptions {
    /// Validates the compression level and that the two outputs differ.
    ///
    /// # Errors
    ///
    /// Returns an error for a level above 9 or when both outputs name the same file.
    pub fn validate(&self) -> Result<()> {
        validate_compression_level(self.compression_level, "compression-level")?;
        if let Some(output2) = &self.output2 {
            validate_distinct_outputs(&self.output, output2)?;
        }
        Ok(())
    }

    /// Split when a second output is given, interleaved otherwise.
    #[must_use]
    pub fn layout(&self) -> OutputLayout {
        if self.output2.is_some() { OutputLayout::Split } else { OutputLayout::Interleaved }
    }

    /// Opens the destinations.
    ///
    /// # Errors
    ///
    /// Returns an error if an output file cannot be created.
    pub fn open_sink(&self) -> Result<FastqSink<SinkWriter>> {
        let first = SinkWriter::create(&self.output, self.compression_level)?;
        Ok(match &self.output2 {
            Some(output2) => {
                FastqSink::split(first, SinkWriter::create(output2, self.compression_level)?)
            }
            None => FastqSink::interleaved(first),
        })
    }
}

/// Region restriction.
#[derive(Debug, Clone, Default, Args)]
pub struct RegionOptions {
    /// Region to extract, `chr`, `chr:pos` or `chr:start-end` (1-based, inclusive); repeatable
    #[arg(short = 'r', long = "region")]
    pub region: Vec<String>,

    /// BED file of regions to extract (plain or gzipped)
    #[arg(short = 'L', long = "regions-bed")]
    pub regions_bed: Option<PathBuf>,

    /// Gene whose locus to extract; repeatable, requires `--gene-table`
    #[arg(short = 'g', long = "gene")]
    pub gene: Vec<String>,

    /// BED4 file mapping gene names (4th column) to loci
    #[arg(long = "gene-table")]
    pub gene_table: Option<PathBuf>,

    /// Bases of padding added to both sides of every region
    #[arg(long = "padding", default_value = "0")]
    pub padding: u64,
}

impl RegionOptions {
    /// Returns true if any region source was given.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        !self.region.is_empty() || self.regions_bed.is_some() || !self.gene.is_empty()
    }

    /// Checks that region files exist and that genes come with a gene table.
    ///
    /// # Errors
    ///
    /// Returns an error if a file is missing or `--gene` is given without `--gene-table`.
    pub fn validate(&self) -> Result<()> {
        if let Some(bed) = &self.regions_bed {
            validate_file_exists(bed, "Regions BED")?;
        }
        match &self.gene_table {
            Some(table) => validate_file_exists(table, "Gene table")?,
            None if !self.gene.is_empty() => bail!("--gene requires --gene-table"),
            None => {}
        }
        if self.padding > 0 && !self.is_enabled() {
            bail!("--padding requires --region, --regions-bed or --gene");
        }
        Ok(())
    }

    /// Builds the padded region set, renamed to the BAM's contig naming.
    ///
    /// Returns `None` when no region was requested.
    ///
    /// # Errors
    ///
    /// Returns an error for an unparseable region, unreadable BED file or unknown gene.
    pub fn build(&self, naming: ContigNaming) -> Result<Option<RegionSet>> {
        if !self.is_enabled() {
            return Ok(None);
        }

        let mut regions = RegionSet::new();
        for literal in &self.region {
            regions.extend(literal.parse::<RegionSet>()?);
        }
        if let Some(bed) = &self.regions_bed {
            regions.extend(
                RegionSet::from_bed(bed)
                    .with_context(|| format!("Failed to read regions BED: {}", bed.display()))?,
            );
        }
        if let Some(table) = &self.gene_table {
            let genes = GeneTable::from_bed(table)?;
            for gene in &self.gene {
                regions.extend(genes.region(gene)?);
            }
        }

        let regions = regions.pad(self.padding).conform_to(naming);
        let coverage = match regions.total_length() {
            u64::MAX => "whole contigs".to_string(),
            bases => format!("{} bp", format_count(bases)),
        };
        info!(
            "Restricting to {} intervals covering {coverage} on {} contigs",
            format_count(regions.interval_count() as u64),
            regions.contig_names().len()
        );
        Ok(Some(regions))
    }
}

/// Optional report files.
#[derive(Debug, Clone, Default, Args)]
pub struct ReportOptions {
    /// Optional output TSV of pairing metrics
    #[arg(long = "metrics")]
    pub metrics: Option<PathBuf>,

    /// Optional output TSV of reads whose mate was never found
    #[arg(long = "residuals")]
    pub residuals: Option<PathBuf>,
}
