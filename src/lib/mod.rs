#![deny(unsafe_code)]
// Clippy lint configuration for CI
// These lints are allowed because:
// - cast_*: Counters and coordinates are cast between integer widths and to f64 for reporting
// - missing_*_doc: Documentation improvements tracked separately
// - needless_pass_by_value: Reads are moved through the engine by value
// - items_after_statements: Some test code uses late item declarations
// - module_name_repetitions: Types such as FastqSink read better with the module name
#![allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_possible_wrap,
    clippy::cast_sign_loss,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::needless_pass_by_value,
    clippy::items_after_statements,
    clippy::module_name_repetitions,
    clippy::struct_excessive_bools,
    clippy::uninlined_format_args
)]

//! # fgmate - mate-pair extraction from coordinate-sorted alignments
//!
//! Coordinate-sorted BAM files separate the two reads of a pair by arbitrary distances. This
//! library pairs them back up in a single forward pass, buffering each first-seen mate until
//! its partner arrives, and writes the pairs as FASTQ.
//!
//! ## Overview
//!
//! ### Pairing Engine
//!
//! - **[`scanner`]** - [`PairScanner`](scanner::PairScanner): reader thread, worker pool,
//!   region/filter/shard gates
//! - **[`locator`]** - [`PairLocator`](locator::PairLocator): the per-worker mate buffer
//! - **[`shard`]** - stable read-name hashing and horizontal shard specs
//! - **[`diagnostics`]** - counters, duplicate examples, debug-read traces, residual reads
//!
//! ### Inputs and Outputs
//!
//! - **[`record`]** - [`AlignedRead`](record::AlignedRead) and [`ReadPair`](record::ReadPair)
//! - **[`bam_io`]** - opening BAM files and adapting records
//! - **[`fastq`]** - FASTQ rendering of pairs
//! - **[`sink`]** - shared, mutex-guarded FASTQ destinations
//! - **[`metrics`]** - metrics and residual TSV files
//!
//! ### Gates
//!
//! - **[`regions`]** - interval sets from literals, BED files and gene tables
//! - **[`genome`]** - genome build and contig naming detection
//! - **[`filter`]** - flag filters and filter expressions
//!
//! ### Utilities
//!
//! - **[`validation`]** - input validation for parameters and files
//! - **[`progress`]** - progress tracking and logging
//! - **[`logging`]** - formatting helpers and the scan summary
//! - **[`errors`]** - the library error type
//!
//! ## Quick Start
//!
//! ```no_run
//! use fgmate_lib::bam_io::{open_bam, records_from_bam};
//! use fgmate_lib::fastq::{OutputLayout, PairFormatter};
//! use fgmate_lib::scanner::{PairScanner, ScanOptions};
//! use fgmate_lib::sink::{FastqSink, SinkWriter};
//!
//! # fn main() -> anyhow::Result<()> {
//! let (reader, header) = open_bam("input.bam", 2)?;
//! let reads = records_from_bam(reader, header, "input.bam");
//!
//! let sink = FastqSink::split(SinkWriter::create("r1.fq.gz", 6)?, SinkWriter::create("r2.fq.gz", 6)?);
//! let scanner = PairScanner::new(ScanOptions::default(), PairFormatter::new(OutputLayout::Split))?;
//! let report = scanner.scan(reads, &sink)?;
//! sink.finish()?;
//! println!("{} pairs, {} residual reads", report.diagnostics.counts.pairs_emitted, report.residuals.len());
//! # Ok(())
//! # }
//! ```

pub mod bam_io;
pub mod diagnostics;
pub mod errors;
pub mod fastq;
pub mod filter;
pub mod genome;
pub mod locator;
pub mod logging;
pub mod metrics;
pub mod progress;
pub mod record;
pub mod regions;
pub mod scanner;
pub mod shard;
pub mod sink;
pub mod validation;

pub use errors::{FgmateError, Result};
