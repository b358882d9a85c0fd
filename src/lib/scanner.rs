//! The pairing engine: one reader, a fixed pool of workers, one [`PairLocator`] per worker.
//!
//! The calling thread reads records, drops those rejected by the [`FlagFilter`] and routes the
//! rest to a worker chosen by [`ReadNameHash::worker`]. Both mates of a name always land on the
//! same worker, so locators never share state. Reads travel in batches over bounded channels.
//!
//! Each worker applies, in order:
//!
//! 1. a tombstone check for names whose other mate already failed the filter;
//! 2. the region and filter gates, in the configured [`GateOrder`];
//! 3. [`PairLocator::accept`];
//! 4. the horizontal shard gate on each completed pair;
//! 5. rendering into a private [`FastqBatch`] that is flushed to the shared [`PairSink`].
//!
//! At end of input (or on cancellation) the workers hand back their locators and whatever is
//! still buffered is reported as residual.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use ahash::AHashMap;
use anyhow::{Context, Result, anyhow, bail};
use bstr::{BString, ByteSlice};
use clap::ValueEnum;
use crossbeam_channel::{Receiver, Sender, bounded};
use log::{debug, info};

use crate::diagnostics::{LocatorDiagnostics, ResidualRead, ScanDiagnostics, TraceKind};
use crate::fastq::{FastqBatch, PairFormatter};
use crate::filter::{FlagFilter, ReadPredicate};
use crate::locator::{DuplicatePolicy, PairLocator};
use crate::logging::OperationTimer;
use crate::progress::{DEFAULT_PROGRESS_INTERVAL, ProgressTracker};
use crate::record::{AlignedRead, MateOrder};
use crate::regions::RegionPredicate;
use crate::shard::{ReadNameHash, ShardSpec};
use crate::sink::PairSink;

/// Default number of worker threads.
pub const DEFAULT_WORKERS: usize = 4;

/// Default number of reads sent to a worker at once.
pub const DEFAULT_BATCH_SIZE: usize = 256;

/// Default number of batches that may queue per worker.
pub const DEFAULT_CHANNEL_DEPTH: usize = 16;

/// Default rendered bytes a worker accumulates before writing to the sink.
pub const DEFAULT_FLUSH_BYTES: usize = 1024 * 1024;

/// Order in which the region and filter gates are evaluated.
///
/// Only the recorded drop reason changes when a read would fail both.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum GateOrder {
    /// Region gate first
    #[default]
    #[value(name = "region-then-filter")]
    RegionThenFilter,
    /// Filter gate first
    #[value(name = "filter-then-region")]
    FilterThenRegion,
}

#[derive(Debug, Clone, Copy)]
enum Gate {
    Region,
    Filter,
}

impl GateOrder {
    fn gates(self) -> [Gate; 2] {
        match self {
            Self::RegionThenFilter => [Gate::Region, Gate::Filter],
            Self::FilterThenRegion => [Gate::Filter, Gate::Region],
        }
    }
}

/// Configuration for a [`PairScanner`].
#[derive(Debug, Clone)]
pub struct ScanOptions {
    /// Number of worker threads, each owning one locator
    pub workers: usize,
    /// Horizontal shard this process is responsible for
    pub shard: ShardSpec,
    /// Flag pre-filter applied on the reader thread
    pub flag_filter: FlagFilter,
    /// Emit reads without a mate as single records
    pub include_unpaired: bool,
    /// Handling of a mate seen twice
    pub duplicate_policy: DuplicatePolicy,
    /// Order of the region and filter gates
    pub gate_order: GateOrder,
    /// Read name whose every transition is logged
    pub debug_read: Option<String>,
    /// Reads per batch sent to a worker
    pub batch_size: usize,
    /// Batches that may queue per worker
    pub channel_depth: usize,
    /// Rendered bytes a worker buffers before writing
    pub flush_bytes: usize,
    /// Records between progress lines
    pub progress_interval: u64,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            shard: ShardSpec::UNSHARDED,
            flag_filter: FlagFilter::default(),
            include_unpaired: false,
            duplicate_policy: DuplicatePolicy::default(),
            gate_order: GateOrder::default(),
            debug_read: None,
            batch_size: DEFAULT_BATCH_SIZE,
            channel_depth: DEFAULT_CHANNEL_DEPTH,
            flush_bytes: DEFAULT_FLUSH_BYTES,
            progress_interval: DEFAULT_PROGRESS_INTERVAL,
        }
    }
}

/// Outcome of a scan.
#[derive(Debug)]
pub struct ScanReport {
    /// Merged counters, duplicate examples and trace events
    pub diagnostics: ScanDiagnostics,
    /// Reads still waiting for a mate when the scan ended, sorted by name
    pub residuals: Vec<ResidualRead>,
    /// True if the scan stopped early because it was cancelled
    pub cancelled: bool,
    /// Worker threads used
    pub workers: usize,
    /// Horizontal shard scanned
    pub shard: ShardSpec,
    /// Wall time of the scan
    pub elapsed: Duration,
}

/// A read and its name hash, computed once on the reader thread.
struct RoutedRead {
    read: AlignedRead,
    hash: ReadNameHash,
}

/// What a worker hands back when its channel closes.
struct WorkerOutput {
    locator: PairLocator,
    peak_pending: usize,
}

/// Extracts mate pairs from a coordinate-sorted read stream.
///
/// ```
/// use fgmate_lib::fastq::{OutputLayout, PairFormatter};
/// use fgmate_lib::record::{AlignedRead, MateOrder};
/// use fgmate_lib::scanner::{PairScanner, ScanOptions};
/// use fgmate_lib::sink::FastqSink;
///
/// let reads = vec![
///     AlignedRead::builder("q1", MateOrder::First).position("chr1", 10).bases("AC", &[30, 30]).build(),
///     AlignedRead::builder("q1", MateOrder::Second).position("chr1", 90).bases("GT", &[30, 30]).build(),
/// ];
/// let scanner = PairScanner::new(ScanOptions::default(), PairFormatter::new(OutputLayout::Interleaved)).unwrap();
/// let sink = FastqSink::interleaved(Vec::new());
/// let report = scanner.scan(reads.into_iter().map(Ok), &sink).unwrap();
/// assert_eq!(report.diagnostics.counts.pairs_emitted, 1);
/// assert!(report.residuals.is_empty());
/// ```
pub struct PairScanner {
    options: ScanOptions,
    formatter: PairFormatter,
    region: Option<Box<dyn RegionPredicate>>,
    filter: Option<Box<dyn ReadPredicate>>,
    cancel: Arc<AtomicBool>,
}

impl PairScanner {
    /// Creates a scanner with no region or filter gate.
    ///
    /// # Errors
    ///
    /// Returns an error if `workers`, `batch_size` or `channel_depth` is zero.
    pub fn new(options: ScanOptions, formatter: PairFormatter) -> Result<Self> {
        if options.workers == 0 {
            bail!("workers must be at least 1");
        }
        if options.batch_size == 0 || options.channel_depth == 0 {
            bail!("batch size and channel depth must be at least 1");
        }
        Ok(Self { options, formatter, region: None, filter: None, cancel: Arc::default() })
    }

    /// Restricts output to pairs with at least one mate admitted by `region`.
    #[must_use]
    pub fn with_regions(mut self, region: impl RegionPredicate + 'static) -> Self {
        self.region = Some(Box::new(region));
        self
    }

    /// Drops pairs unless both mates match `filter`.
    #[must_use]
    pub fn with_filter(mut self, filter: impl ReadPredicate + 'static) -> Self {
        self.filter = Some(Box::new(filter));
        self
    }

    /// The configuration in use.
    #[must_use]
    pub fn options(&self) -> &ScanOptions {
        &self.options
    }

    /// A flag that stops the scan at the next record once set.
    ///
    /// Reads already buffered are still reported as residuals.
    #[must_use]
    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    /// Scans `reads` to completion, writing pairs to `sink`.
    ///
    /// # Errors
    ///
    /// Returns the first error from the source, a worker or the sink. The sink may already
    /// hold output written before the error.
    pub fn scan<I, S>(&self, reads: I, sink: &S) -> Result<ScanReport>
    where
        I: IntoIterator<Item = Result<AlignedRead>>,
        S: PairSink + ?Sized,
    {
        let layout = self.formatter.layout();
        if layout.destinations() > sink.destinations() {
            bail!(
                "{layout} output needs {} destinations but the sink has {}",
                layout.destinations(),
                sink.destinations()
            );
        }

        let timer = OperationTimer::new("Pairing mates");
        let workers = self.options.workers;
        let debug_read = self.options.debug_read.as_deref();
        info!(
            "Pairing mates with {workers} workers, shard {}, duplicate policy {}",
            self.options.shard, self.options.duplicate_policy
        );

        let abort = AtomicBool::new(false);
        let mut reader_diagnostics = LocatorDiagnostics::new(debug_read);
        let mut cancelled = false;

        let (source_result, worker_results) = std::thread::scope(|scope| {
            let mut senders = Vec::with_capacity(workers);
            let mut handles = Vec::with_capacity(workers);
            for index in 0..workers {
                let (tx, rx) = bounded(self.options.channel_depth);
                senders.push(tx);
                let abort = &abort;
                handles.push(scope.spawn(move || self.run_worker(index, &rx, sink, abort)));
            }

            let source_result = self.read_and_route(
                reads,
                &senders,
                &abort,
                &mut reader_diagnostics,
                &mut cancelled,
            );
            drop(senders);

            let worker_results: Vec<Result<WorkerOutput>> = handles
                .into_iter()
                .map(|handle| {
                    handle.join().unwrap_or_else(|_| Err(anyhow!("Worker thread panicked")))
                })
                .collect();
            (source_result, worker_results)
        });

        source_result?;

        let mut diagnostics = ScanDiagnostics::default();
        diagnostics.merge(reader_diagnostics);
        let mut residuals = Vec::new();
        let mut peak_pending = 0;
        for result in worker_results {
            let output = result?;
            peak_pending += output.peak_pending;
            let (reads, worker_diagnostics) = output.locator.into_parts();
            diagnostics.merge(worker_diagnostics);
            residuals.extend(reads.iter().map(ResidualRead::from));
        }
        residuals.sort_by(|a, b| a.name.cmp(&b.name));

        sink.flush().context("Failed to flush FASTQ output")?;
        debug!("Peak buffered mates across workers: {peak_pending}");
        timer.log_completion(diagnostics.counts.records_read);

        Ok(ScanReport {
            diagnostics,
            residuals,
            cancelled,
            workers,
            shard: self.options.shard,
            elapsed: timer.elapsed(),
        })
    }

    /// Reader side: pre-filter by flags, route by name hash, batch and send.
    ///
    /// Stops early on cancellation, on a worker abort, or when a worker has hung up.
    fn read_and_route<I>(
        &self,
        reads: I,
        senders: &[Sender<Vec<RoutedRead>>],
        abort: &AtomicBool,
        diagnostics: &mut LocatorDiagnostics,
        cancelled: &mut bool,
    ) -> Result<()>
    where
        I: IntoIterator<Item = Result<AlignedRead>>,
    {
        let workers = senders.len();
        let batch_size = self.options.batch_size;
        let progress =
            ProgressTracker::new("Read").with_interval(self.options.progress_interval);
        let mut batches: Vec<Vec<RoutedRead>> =
            (0..workers).map(|_| Vec::with_capacity(batch_size)).collect();

        for result in reads {
            if self.cancel.load(Ordering::Relaxed) {
                info!("Scan cancelled after {} records", progress.count());
                *cancelled = true;
                break;
            }
            if abort.load(Ordering::Relaxed) {
                return Ok(());
            }

            let read = result.context("Failed to read input record")?;
            diagnostics.counts.records_read += 1;
            progress.record(1, || Some(read.locus()));

            if !self.options.flag_filter.passes(read.flags()) {
                diagnostics.counts.flag_filtered += 1;
                continue;
            }

            let hash = read.name_hash();
            let worker = hash.worker(workers);
            diagnostics.trace(TraceKind::Routed, &read);
            batches[worker].push(RoutedRead { read, hash });

            if batches[worker].len() >= batch_size {
                let batch =
                    std::mem::replace(&mut batches[worker], Vec::with_capacity(batch_size));
                if senders[worker].send(batch).is_err() {
                    // The worker only hangs up after failing; its error is reported on join.
                    return Ok(());
                }
            }
        }

        for (sender, batch) in senders.iter().zip(batches) {
            if !batch.is_empty() && sender.send(batch).is_err() {
                break;
            }
        }
        progress.finish();
        Ok(())
    }

    /// Worker side: drains batches into this worker's locator until the channel closes.
    fn run_worker<S>(
        &self,
        index: usize,
        rx: &Receiver<Vec<RoutedRead>>,
        sink: &S,
        abort: &AtomicBool,
    ) -> Result<WorkerOutput>
    where
        S: PairSink + ?Sized,
    {
        let diagnostics =
            LocatorDiagnostics::new(self.options.debug_read.as_deref()).for_worker(index);
        let mut worker = Worker {
            scanner: self,
            locator: PairLocator::new(self.options.duplicate_policy, diagnostics),
            rejected: AHashMap::new(),
            out: FastqBatch::new(),
        };

        let result = worker.drain(rx, sink, abort);
        if let Err(e) = result {
            abort.store(true, Ordering::Relaxed);
            return Err(e.context(format!("Worker {index} failed")));
        }

        if !worker.rejected.is_empty() {
            debug!(
                "Worker {index}: {} filtered reads never saw their mate",
                worker.rejected.len()
            );
        }
        let peak_pending = worker.locator.peak_len();
        Ok(WorkerOutput { locator: worker.locator, peak_pending })
    }
}

/// A first-seen mate that failed the filter.
struct RejectedMate {
    mate: MateOrder,
    locus: String,
}

/// State owned by one worker thread.
struct Worker<'a> {
    scanner: &'a PairScanner,
    locator: PairLocator,
    /// Names whose first-seen mate failed the filter; the other mate is dropped on arrival.
    rejected: AHashMap<BString, RejectedMate>,
    out: FastqBatch,
}

impl Worker<'_> {
    fn drain<S>(&mut self, rx: &Receiver<Vec<RoutedRead>>, sink: &S, abort: &AtomicBool) -> Result<()>
    where
        S: PairSink + ?Sized,
    {
        let flush_bytes = self.scanner.options.flush_bytes;
        for batch in rx {
            if abort.load(Ordering::Relaxed) {
                return Ok(());
            }
            for routed in batch {
                self.process(routed)?;
                if self.out.len_bytes() >= flush_bytes {
                    sink.write_batch(&self.out).context("Failed to write FASTQ output")?;
                    self.out.clear();
                }
            }
        }
        sink.write_batch(&self.out).context("Failed to write FASTQ output")?;
        self.out.clear();
        Ok(())
    }

    fn process(&mut self, routed: RoutedRead) -> Result<()> {
        let RoutedRead { read, hash } = routed;
        let scanner = self.scanner;
        let options = &scanner.options;

        if !read.mate().is_paired() {
            if !options.include_unpaired {
                self.locator.accept(read)?;
                return Ok(());
            }
            if self.passes_gates(&read)? {
                if options.shard.owns(hash) {
                    scanner.formatter.render_single(&read, &mut self.out);
                    self.locator.diagnostics_mut().counts.unpaired_emitted += 1;
                    self.locator.diagnostics_mut().trace(TraceKind::Emitted, &read);
                } else {
                    self.locator.diagnostics_mut().trace(TraceKind::OtherShard, &read);
                }
            }
            return Ok(());
        }

        if let Some(rejected) = self.rejected.get(read.name()) {
            if rejected.mate == read.mate() {
                let kept = rejected.locus.clone();
                self.locator.drop_duplicate(&read, kept)?;
            } else {
                self.rejected.remove(read.name());
                let diagnostics = self.locator.diagnostics_mut();
                diagnostics.counts.pairs_filtered += 1;
                diagnostics.trace(TraceKind::Discarded, &read);
            }
            return Ok(());
        }

        if !self.passes_gates(&read)? {
            return Ok(());
        }

        if let Some(pair) = self.locator.accept(read)? {
            let diagnostics = self.locator.diagnostics_mut();
            if options.shard.owns(hash) {
                scanner.formatter.render_pair(&pair, &mut self.out);
                diagnostics.counts.pairs_emitted += 1;
                diagnostics.trace(TraceKind::Emitted, pair.first());
            } else {
                diagnostics.counts.pairs_other_shard += 1;
                diagnostics.trace(TraceKind::OtherShard, pair.first());
            }
        }
        Ok(())
    }

    /// Applies the region and filter gates, recording why a read was dropped.
    fn passes_gates(&mut self, read: &AlignedRead) -> Result<bool> {
        let scanner = self.scanner;
        for gate in scanner.options.gate_order.gates() {
            match gate {
                Gate::Region => {
                    let Some(region) = &scanner.region else { continue };
                    if !self.locator.contains(read.name()) && !region.admits(read) {
                        let diagnostics = self.locator.diagnostics_mut();
                        diagnostics.counts.outside_region += 1;
                        diagnostics.trace(TraceKind::OutsideRegion, read);
                        return Ok(false);
                    }
                }
                Gate::Filter => {
                    let Some(filter) = &scanner.filter else { continue };
                    if !filter.matches(read) {
                        let diagnostics = self.locator.diagnostics_mut();
                        diagnostics.counts.filtered += 1;
                        diagnostics.trace(TraceKind::Filtered, read);
                        if read.mate().is_paired() {
                            self.reject(read)?;
                        }
                        return Ok(false);
                    }
                }
            }
        }
        Ok(true)
    }

    /// Drops the whole pair of a mate that failed the filter.
    ///
    /// A buffered partner is discarded. A buffered copy of the same mate stays put and `read`
    /// counts as its duplicate. Otherwise the name is remembered so the partner is dropped on
    /// arrival.
    fn reject(&mut self, read: &AlignedRead) -> Result<()> {
        match self.locator.buffered(read.name()) {
            Some(buffered) if buffered.mate() == read.mate() => {
                let kept = buffered.locus();
                self.locator.drop_duplicate(read, kept)?;
            }
            Some(_) => {
                self.locator.discard(read.name());
                self.locator.diagnostics_mut().counts.pairs_filtered += 1;
            }
            None => {
                let rejected = RejectedMate { mate: read.mate(), locus: read.locus() };
                self.rejected.insert(BString::from(read.name().as_bytes()), rejected);
            }
        }
        Ok(())
    }
}
